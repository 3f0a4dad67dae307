use thiserror::Error;

/// Everything that can go wrong between the user's text and the player.
///
/// Parse failures are produced by the caller of `input` (the parser itself
/// only returns `None`), so the first two variants carry the offending text
/// for the validation message.
#[derive(Debug, Error)]
pub enum LoopError {
    #[error("invalid video reference: {0:?}")]
    InvalidReference(String),

    #[error("invalid time: {0:?} (use seconds or m:ss)")]
    InvalidTime(String),

    #[error("start time {start}s must be before end time {end}s")]
    InvalidRange { start: u32, end: u32 },

    #[error("no player attached yet")]
    NoPlayerAttached,

    #[error("no loop loaded")]
    NoSession,

    #[error("stored collection is unreadable: {0}")]
    PersistenceCorrupt(#[from] serde_json::Error),

    #[error("failed to write collection: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("player command failed: {0:#}")]
    Player(anyhow::Error),
}

impl LoopError {
    /// True for errors caused by what the user typed, as opposed to the
    /// environment (disk, player).
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidReference(_) | Self::InvalidTime(_) | Self::InvalidRange { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_classification() {
        assert!(LoopError::InvalidTime("1:5".into()).is_validation());
        assert!(LoopError::InvalidRange { start: 90, end: 30 }.is_validation());
        assert!(!LoopError::NoPlayerAttached.is_validation());
    }

    #[test]
    fn test_range_message() {
        let e = LoopError::InvalidRange { start: 90, end: 30 };
        assert_eq!(e.to_string(), "start time 90s must be before end time 30s");
    }
}
