use crate::media::MediaError;
use crate::store::StoreError;

/// Errors surfaced by the membership, vote, and client operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("room is full ({max} members)")]
    CapacityExceeded { max: usize },

    #[error("microphone unavailable: {0}")]
    MediaUnavailable(String),

    #[error("a vote ended too recently, retry in {remaining_ms} ms")]
    Cooldown { remaining_ms: i64 },

    #[error("you already started a vote since the room last grew")]
    AlreadyInitiated,

    #[error("a vote is already in progress")]
    VoteInProgress,

    #[error("you already voted in this round")]
    AlreadyVoted,

    #[error("invalid vote target: {0}")]
    InvalidTarget(String),

    #[error("no vote is open")]
    NoActiveVote,

    #[error("participant {0} is not in the room")]
    NotAMember(String),

    #[error("participants may only change their own record")]
    NotOwnRecord,

    #[error("invalid display name: {0}")]
    InvalidDisplayName(String),

    #[error("display name {0:?} is already used in this room")]
    NameTaken(String),

    #[error("store rejected the transaction")]
    TransactionAborted,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Media(MediaError),
}

impl From<MediaError> for RoomError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::Unavailable(msg) => RoomError::MediaUnavailable(msg),
            other => RoomError::Media(other),
        }
    }
}

impl From<RoomError> for huddle_common::HuddleError {
    fn from(err: RoomError) -> Self {
        match err {
            RoomError::MediaUnavailable(_) | RoomError::Media(_) => {
                huddle_common::HuddleError::Media(err.to_string())
            }
            other => huddle_common::HuddleError::Room(other.to_string()),
        }
    }
}

impl RoomError {
    /// Whether the local client can keep going after this error.
    ///
    /// Only losing the microphone or the store connection ends the local
    /// session; nothing here is fatal to the room itself.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            RoomError::MediaUnavailable(_) | RoomError::Store(StoreError::Disconnected)
        )
    }
}
