//! Builder error types.

use thiserror::Error;

/// Errors raised when finishing a transition build.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("transition has no event matcher")]
    MissingEventMatcher,
}
