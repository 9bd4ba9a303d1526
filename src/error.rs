//! Error types for the analysis pipeline.
//!
//! The pipeline is fail-loud: any gateway failure aborts the unit of work it
//! occurred in, and under the fail-fast policy a Stage-2 unit failure aborts
//! the whole run. The single recover-and-continue case — a returned code name
//! or chunk boundary id that matches nothing — is absorbed where it occurs
//! (see [`crate::chunking`] and [`crate::coding`]) and never surfaces here.

use std::path::PathBuf;

use thiserror::Error;

use crate::llm::LlmError;

/// Errors that terminate an analysis run.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The input directory contained no documents. Raised before any model
    /// call is made.
    #[error("no documents found in {0}")]
    NoDocuments(PathBuf),

    /// Invalid caller input: bad mode, bad hierarchy policy, or a code book
    /// that cannot be used for the requested run.
    #[error("{0}")]
    InvalidInput(String),

    /// A model call failed during the reading stage.
    #[error("reading stage failed")]
    Llm(#[from] LlmError),

    /// A Stage-2 unit of work failed. Under fail-fast, sibling units are
    /// aborted and their partial work discarded.
    #[error("analysis of document '{document}' failed")]
    Document {
        document: String,
        #[source]
        source: LlmError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
