// Typed errors for the analysis core.
//
// Two failure classes: PipelineError is fatal for an invocation and goes back
// to the caller; StageError is scoped to one batch and the orchestrator decides
// whether to skip the batch or abort. Adapters and the CLI use anyhow.

use std::path::PathBuf;

use thiserror::Error;

/// Effectiveness validation failures. The scorer never degrades silently.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScoreError {
    #[error("Expected a sequence of role-tagged records")]
    NotASequence,

    #[error("Record {index} has no role/type field")]
    MissingRole { index: usize },

    #[error("Record {index} has unknown role {value:?}")]
    UnknownRole { index: usize, value: String },
}

/// A batch-scoped failure inside one inference stage.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("Embedding failed: {0}")]
    Embedding(#[source] anyhow::Error),

    #[error("Classification failed: {0}")]
    Classification(#[source] anyhow::Error),

    #[error("Invalid classifier input: {0}")]
    InvalidInput(String),

    #[error("Stage returned {got} results for a batch of {expected}")]
    MisalignedBatch { expected: usize, got: usize },

    #[error("Summarization failed: {0}")]
    Summarization(#[source] anyhow::Error),
}

/// Fatal errors that abort a whole pipeline invocation.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("No valid topics remain after normalization")]
    NoTopics,

    #[error("Cannot read input {}: {reason}", path.display())]
    Source { path: PathBuf, reason: String },

    #[error("Effectiveness scoring failed: {0}")]
    Scoring(#[from] ScoreError),
}
