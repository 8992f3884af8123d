//! Common error types.

use thiserror::Error;

/// Main error type for the layer engine.
///
/// An `Err` always means an unmet precondition or a failed resource: the
/// operation that returned it left every layer untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CanvasError {
    #[error("Allocation failed for a {width}x{height} buffer")]
    AllocationFailure { width: u32, height: u32 },

    #[error("Index {index} out of range for {len} layers")]
    InvalidIndex { index: usize, len: usize },

    #[error("Layer handle does not refer to a live layer")]
    UnknownLayer,

    #[error("Effects renderer produced no result")]
    EffectsUnavailable,

    #[error("Text renderer produced no result")]
    TextUnavailable,

    #[error("Layer has no mask")]
    MaskAbsent,

    #[error("Layer is locked")]
    LayerLocked,

    #[error("Cannot remove the last layer")]
    LastLayer,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Image error: {0}")]
    Image(String),
}

pub type CanvasResult<T> = Result<T, CanvasError>;

impl CanvasError {
    pub fn allocation(width: u32, height: u32) -> Self {
        Self::AllocationFailure { width, height }
    }

    pub fn index(index: usize, len: usize) -> Self {
        Self::InvalidIndex { index, len }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn image(msg: impl Into<String>) -> Self {
        Self::Image(msg.into())
    }
}

/// What a successful mutating call did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// State changed.
    Applied,
    /// Preconditions held but there was nothing to change.
    Unchanged,
}

impl Outcome {
    /// `Applied` when `changed`, `Unchanged` otherwise.
    #[inline]
    pub fn from_changed(changed: bool) -> Self {
        if changed {
            Self::Applied
        } else {
            Self::Unchanged
        }
    }

    #[inline]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            CanvasError::index(5, 2).to_string(),
            "Index 5 out of range for 2 layers"
        );
        assert_eq!(
            CanvasError::allocation(10, 20).to_string(),
            "Allocation failed for a 10x20 buffer"
        );
    }

    #[test]
    fn test_outcome_from_changed() {
        assert_eq!(Outcome::from_changed(true), Outcome::Applied);
        assert_eq!(Outcome::from_changed(false), Outcome::Unchanged);
        assert!(!Outcome::Unchanged.is_applied());
    }
}
