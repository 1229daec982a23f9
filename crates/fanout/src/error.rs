use thiserror::Error;

/// Returned when a fan-out is cancelled before every operation has settled.
///
/// Cancellation comes from the group's signal: an external token registered
/// with [`FanOut::with_cancel`](crate::FanOut::with_cancel), a cancel task, or
/// a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("fan-out was cancelled")]
pub struct Cancelled;

/// The single error produced by a failed fan-out.
///
/// Either the error of the lowest-index operation that failed, or
/// [`FanOutError::Cancelled`]. Partial results are never returned alongside it.
#[derive(Debug, Error)]
pub enum FanOutError<E> {
    /// The operation at `index` failed with `error`, which is passed through unmodified.
    #[error("operation {index} failed: {error}")]
    OperationFailed { index: usize, error: E },

    #[error("fan-out was cancelled")]
    Cancelled,
}

impl<E> FanOutError<E> {
    /// Index of the failing operation, `None` when cancelled.
    pub fn index(&self) -> Option<usize> {
        match self {
            FanOutError::OperationFailed { index, .. } => Some(*index),
            FanOutError::Cancelled => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FanOutError::Cancelled)
    }

    /// Returns the error raised by the operation itself, `None` when cancelled.
    pub fn into_error(self) -> Option<E> {
        match self {
            FanOutError::OperationFailed { error, .. } => Some(error),
            FanOutError::Cancelled => None,
        }
    }
}

impl<E> From<Cancelled> for FanOutError<E> {
    fn from(_: Cancelled) -> Self {
        FanOutError::Cancelled
    }
}

#[cfg(test)]
mod test {
    use crate::*;

    #[test]
    fn test_operation_failed_names_index() {
        let err: FanOutError<std::io::Error> = FanOutError::OperationFailed {
            index: 3,
            error: std::io::Error::other("connection reset"),
        };

        assert_eq!(err.to_string(), "operation 3 failed: connection reset");
        assert_eq!(err.index(), Some(3));
        assert!(!err.is_cancelled());
        assert_eq!(
            err.into_error().map(|e| e.to_string()).as_deref(),
            Some("connection reset")
        );
    }

    #[test]
    fn test_cancelled_converts() {
        let err: FanOutError<std::io::Error> = Cancelled.into();

        assert!(err.is_cancelled());
        assert_eq!(err.index(), None);
        assert!(err.into_error().is_none());
    }

    #[test]
    fn test_converts_into_anyhow() {
        fn fail() -> anyhow::Result<()> {
            let failed: Result<(), FanOutError<anyhow::Error>> =
                Err(FanOutError::OperationFailed {
                    index: 0,
                    error: anyhow::anyhow!("boom"),
                });
            failed?;
            Ok(())
        }

        let err = fail().unwrap_err();
        assert_eq!(err.to_string(), "operation 0 failed: boom");
    }
}
