/// Error type shared by every engine operation.

use thiserror::Error;

/// Errors raised by factor algebra, structural edits, queries and persistence.
///
/// Every failure is reported synchronously to the caller of the operation
/// that detected it. Structural edits validate before mutating, so a returned
/// error leaves the network as it was.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BayesError {
    /// A value array does not match the product of the dimension sizes.
    #[error("invalid distribution shape: expected {expected} values, got {got}")]
    InvalidShape { expected: usize, got: usize },

    /// The strict normalize path found a sum too far from one.
    #[error("denormalized distribution: sum {sum} deviates from 1 by more than {tolerance}")]
    Denormalized { sum: f64, tolerance: f64 },

    #[error("unknown variable: {0}")]
    UnknownVariable(String),

    #[error("variable {variable} has no state named {state}")]
    UnknownState { variable: String, state: String },

    /// A factor operation named a variable outside the factor's scope.
    #[error("variable {0} is not in the factor's scope")]
    NotInScope(String),

    #[error("variable {0} appears more than once")]
    DuplicateVariable(String),

    #[error("cannot remove the last remaining state of {0}")]
    LastState(String),

    #[error("{parent} is not a parent of {child}")]
    NotAParent { child: String, parent: String },

    #[error("adding {parent} -> {child} would create a cycle")]
    Cycle { parent: String, child: String },

    #[error("a node named {0} already exists")]
    DuplicateNode(String),

    /// A query listed a variable as observed but the network holds no state for it.
    #[error("variable {0} is marked observed but has no observed state")]
    MissingEvidence(String),

    /// The evidence has probability zero under the model.
    #[error("evidence has zero probability under the current model")]
    ImpossibleEvidence,

    #[error("no snapshot recorded under {0}")]
    UnknownSnapshot(String),

    #[error("malformed network data: {0}")]
    Format(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offender() {
        let err = BayesError::UnknownState {
            variable: "Weather".to_string(),
            state: "Foggy".to_string(),
        };
        assert_eq!(err.to_string(), "variable Weather has no state named Foggy");

        let err = BayesError::InvalidShape {
            expected: 4,
            got: 3,
        };
        assert!(err.to_string().contains("expected 4"));
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let err: BayesError = io.into();
        assert!(matches!(err, BayesError::Io(_)));
    }
}
