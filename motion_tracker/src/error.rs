// THEORY:
// Every failure the engine can produce funnels into `VisionError`. Argument and
// geometry problems are raised at the exact call that violates them and are
// never recovered: they abort the stage that made the call. Concurrency failures
// (a panicked worker, a dropped result channel, a join that never finished)
// surface the same way so a run either completes fully or reports why it didn't.

use std::time::Duration;

/// Errors produced by the detection and tracking pipeline.
#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("coordinate ({x}, {y}) is outside the {width}x{height} buffer")]
    OutOfRange {
        x: i64,
        y: i64,
        width: u32,
        height: u32,
    },

    #[error("dimension mismatch: {left_width}x{left_height} vs {right_width}x{right_height}")]
    DimensionMismatch {
        left_width: u32,
        left_height: u32,
        right_width: u32,
        right_height: u32,
    },

    #[error("frame {0} is not part of the sequence")]
    UnknownFrame(usize),

    #[error("candidates for frame {0} were already published")]
    AlreadyPublished(usize),

    #[error("candidates for frame {0} have not been published")]
    MissingCandidates(usize),

    #[error("output buffer for frame {0} was poisoned by a panicked writer")]
    PoisonedFrame(usize),

    #[error("worker task failed: {0}")]
    TaskFailed(String),

    #[error("worker tasks did not finish within {0:?}")]
    TaskTimedOut(Duration),
}

impl VisionError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        VisionError::InvalidArgument(message.into())
    }
}

pub type Result<T> = std::result::Result<T, VisionError>;

/// Validates a wide channel value and narrows it to a byte.
pub fn channel_value(value: i64) -> Result<u8> {
    u8::try_from(value).map_err(|_| {
        VisionError::invalid(format!("channel value {value} must be between 0 and 255"))
    })
}

/// Validates a morphological mask size: odd and at least one.
pub(crate) fn validate_mask_size(mask_size: usize) -> Result<()> {
    if mask_size < 1 {
        return Err(VisionError::invalid("mask size must be at least 1"));
    }
    if mask_size % 2 == 0 {
        return Err(VisionError::invalid(format!(
            "mask size must be an odd number, got {mask_size}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_value_accepts_byte_range() {
        assert_eq!(channel_value(0).unwrap(), 0);
        assert_eq!(channel_value(255).unwrap(), 255);
    }

    #[test]
    fn channel_value_rejects_out_of_range() {
        assert!(matches!(channel_value(-1), Err(VisionError::InvalidArgument(_))));
        assert!(matches!(channel_value(256), Err(VisionError::InvalidArgument(_))));
    }

    #[test]
    fn mask_size_must_be_odd_and_positive() {
        assert!(validate_mask_size(1).is_ok());
        assert!(validate_mask_size(15).is_ok());
        assert!(validate_mask_size(0).is_err());
        assert!(validate_mask_size(4).is_err());
    }
}
