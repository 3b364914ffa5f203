use std::fmt;

use super::{ExperimentId, MethodId};

/// Why a repository operation was refused.
///
/// The `Display` text is the human-readable reason carried by `*Failed` events.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RepositoryError {
    #[error("{}", .0.join(" "))]
    Invalid(Vec<String>),

    #[error("The method you are trying to {action} does not exist: {id}")]
    MethodNotFound { id: MethodId, action: Action },

    #[error("None of the methods you are trying to delete exist")]
    NoneExist,

    #[error("Some of the methods you provided do not exist: {}", join_ids(.0))]
    SomeMissing(Vec<MethodId>),

    #[error("'Experiment Id' must be greater than '0' (was {0})")]
    InvalidExperiment(ExperimentId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Delete,
    Update,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Delete => write!(f, "delete"),
            Action::Update => write!(f, "update"),
        }
    }
}

fn join_ids(ids: &[MethodId]) -> String {
    ids.iter()
        .map(MethodId::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
