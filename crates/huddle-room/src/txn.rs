//! Typed read-modify-write on top of [`SharedStore::transaction`].

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::RoomError;
use crate::store::{SharedStore, StoreError, TxDecision, Value};

/// One initial attempt plus a single retry.
const MAX_ATTEMPTS: u32 = 2;

/// What an update closure wants done with the state it was shown.
pub(crate) enum Step<R> {
    /// Commit the mutated state and return `R`.
    Write(R),
    /// Leave the store untouched and return `R`.
    Keep(R),
}

fn decode<T: DeserializeOwned + Default>(value: Option<Value>) -> Result<T, RoomError> {
    match value {
        None | Some(Value::Null) => Ok(T::default()),
        Some(v) => serde_json::from_value(v)
            .map_err(|e| RoomError::Store(StoreError::Serialization(e.to_string()))),
    }
}

fn encode<T: Serialize>(state: &T) -> Result<Option<Value>, RoomError> {
    match serde_json::to_value(state) {
        Ok(Value::Null) => Ok(None),
        Ok(v) => Ok(Some(v)),
        Err(e) => Err(RoomError::Store(StoreError::Serialization(e.to_string()))),
    }
}

/// Run `apply` against the typed value at `path` inside a store transaction.
///
/// An error returned by `apply` aborts the transaction and is returned as-is.
/// If the store declines to commit for any other reason the whole thing is
/// retried once, then reported as [`RoomError::TransactionAborted`].
pub(crate) async fn transact<T, R, F>(
    store: &dyn SharedStore,
    path: &str,
    mut apply: F,
) -> Result<R, RoomError>
where
    T: DeserializeOwned + Serialize + Default,
    R: Send,
    F: FnMut(&mut T) -> Result<Step<R>, RoomError> + Send,
{
    for attempt in 1..=MAX_ATTEMPTS {
        let mut outcome: Option<Result<Step<R>, RoomError>> = None;

        let result = store
            .transaction(path, &mut |current| {
                let mut state: T = match decode(current) {
                    Ok(state) => state,
                    Err(e) => {
                        outcome = Some(Err(e));
                        return TxDecision::Abort;
                    }
                };
                let step = apply(&mut state);
                let decision = match &step {
                    Ok(Step::Write(_)) => match encode(&state) {
                        Ok(value) => TxDecision::Commit(value),
                        Err(e) => {
                            outcome = Some(Err(e));
                            return TxDecision::Abort;
                        }
                    },
                    _ => TxDecision::Abort,
                };
                outcome = Some(step);
                decision
            })
            .await?;

        match outcome {
            Some(Err(e)) => return Err(e),
            Some(Ok(Step::Keep(r))) => return Ok(r),
            Some(Ok(Step::Write(r))) if result.committed => return Ok(r),
            _ => warn!(path, attempt, "transaction not committed"),
        }
    }
    Err(RoomError::TransactionAborted)
}
