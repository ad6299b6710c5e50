use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

#[derive(Debug, thiserror::Error)]
pub enum HuddleError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("room error: {0}")]
    Room(String),

    #[error("media error: {0}")]
    Media(String),

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::FileNotFound(PathBuf::from("/tmp/missing.toml"));
        assert_eq!(err.to_string(), "config file not found: /tmp/missing.toml");

        let err = ConfigError::ParseError("unexpected token".into());
        assert_eq!(err.to_string(), "config parse error: unexpected token");

        let err = ConfigError::ValidationError("room.max_members = 1 is out of range".into());
        assert_eq!(
            err.to_string(),
            "config validation error: room.max_members = 1 is out of range"
        );
    }

    #[test]
    fn huddle_error_from_config() {
        let config_err = ConfigError::ParseError("bad toml".into());
        let err: HuddleError = config_err.into();
        assert!(matches!(err, HuddleError::Config(_)));
        assert!(err.to_string().contains("bad toml"));
    }

    #[test]
    fn huddle_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: HuddleError = io_err.into();
        assert!(matches!(err, HuddleError::Io(_)));
        assert!(err.to_string().contains("file missing"));
    }

    #[test]
    fn huddle_error_other_variants() {
        let err = HuddleError::Room("room is full".into());
        assert_eq!(err.to_string(), "room error: room is full");

        let err = HuddleError::Media("no microphone".into());
        assert_eq!(err.to_string(), "media error: no microphone");

        let err = HuddleError::Other("something went wrong".into());
        assert_eq!(err.to_string(), "something went wrong");
    }
}
