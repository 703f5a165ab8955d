//! Transaction queue error types

use thiserror::Error;

/// Transaction queue errors
///
/// Both variants are control-flow signals, callers are expected to branch on
/// them (retry, drop or exit).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// Non-blocking call found the queue full or empty
    #[error("operation would block")]
    WouldBlock,

    /// The queue has been aborted
    #[error("queue aborted")]
    Aborted,
}

/// Result type for transaction queue operations
pub type QueueResult<T> = Result<T, QueueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert!(QueueError::WouldBlock.to_string().contains("block"));
        assert!(QueueError::Aborted.to_string().contains("aborted"));
    }
}
