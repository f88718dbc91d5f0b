use thiserror::Error;

/// Errors surfaced by the synchronizer.
///
/// Only local misconfiguration and lifecycle misuse are ever returned to the
/// caller. Anything that originates from another peer (malformed frames,
/// conflicting writes, a silent leader) is handled in place and at most
/// logged; a buggy peer must not be able to crash the others.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Synchronizer is not running")]
    NotRunning,

    #[error("Synchronizer is already running")]
    AlreadyRunning,

    #[error("Peer channel closed")]
    ChannelClosed,

    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = SyncError::InvalidConfig("channel name is empty".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid configuration: channel name is empty"
        );

        let err = SyncError::NotRunning;
        assert_eq!(err.to_string(), "Synchronizer is not running");

        let err = SyncError::AlreadyRunning;
        assert_eq!(err.to_string(), "Synchronizer is already running");

        let err = SyncError::ChannelClosed;
        assert_eq!(err.to_string(), "Peer channel closed");
    }

    #[test]
    fn test_codec_error_from_serde() {
        let parse_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: SyncError = parse_err.into();
        assert!(matches!(err, SyncError::Codec(_)));
    }

    #[test]
    fn test_sync_result_type() {
        let ok: SyncResult<u32> = Ok(7);
        assert_eq!(ok.unwrap(), 7);

        let err: SyncResult<u32> = Err(SyncError::NotRunning);
        assert!(err.is_err());
    }
}
