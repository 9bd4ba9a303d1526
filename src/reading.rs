//! Stage 1: sequential, memory-carrying reading pass.
//!
//! Walks the document sequence in order with one evolving notes value. Each
//! step's prompt embeds the previous step's notes, and the response
//! **replaces** them — the model synthesizes prior notes plus new
//! observations into one updated memory. This data dependency is why reading
//! is sequential, never parallel.
//!
//! After the last document, one schema-constrained call turns the final notes
//! into the code book.

use std::path::Path;

use serde::Deserialize;

use crate::error::AnalysisError;
use crate::llm::{generate_structured, ClientRegistry, Stage};
use crate::models::{AnalysisMode, Code, CodeBook, Document, HierarchyDepth};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::prompts;

#[derive(Debug, Deserialize)]
struct CodeEntry {
    name: String,
    description: String,
    #[serde(default)]
    criteria: String,
    #[serde(default)]
    parent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CodeBookResponse {
    codes: Vec<CodeEntry>,
}

const STAGE_NAME: &str = "reading";

/// Read all documents and derive a code book.
///
/// `notes_path`, when set, receives the evolving notes after every document —
/// advisory output only; write failures are reported but never fatal.
pub async fn derive_code_book(
    registry: &ClientRegistry,
    mode: AnalysisMode,
    documents: &[Document],
    user_context: &str,
    hierarchy: HierarchyDepth,
    progress: &dyn ProgressReporter,
    notes_path: Option<&Path>,
) -> Result<CodeBook, AnalysisError> {
    if documents.is_empty() {
        return Err(AnalysisError::InvalidInput(
            "cannot derive a code book from an empty document sequence".to_string(),
        ));
    }

    let total = documents.len() as u64;
    progress.report(ProgressEvent::StageStarted {
        stage: STAGE_NAME.to_string(),
        total,
    });

    let reader = registry.for_stage(Stage::Reading);
    let mut notes = String::new();

    for (idx, document) in documents.iter().enumerate() {
        let (system, user) = prompts::read_document(
            mode.label(),
            user_context,
            &document.name,
            &document.content,
            &notes,
        );

        notes = reader.generate(&user, Some(&system)).await?;

        if let Some(path) = notes_path {
            if let Err(e) = std::fs::write(path, &notes) {
                eprintln!("Warning: could not write notes to {}: {}", path.display(), e);
            }
        }

        progress.report(ProgressEvent::UnitCompleted {
            stage: STAGE_NAME.to_string(),
            completed: idx as u64 + 1,
            total,
        });
    }

    let codebook_client = registry.for_stage(Stage::Codebook);
    let (system, user) = prompts::create_codebook(mode.label(), user_context, &notes, hierarchy);

    let response: CodeBookResponse = generate_structured(
        codebook_client.as_ref(),
        &user,
        prompts::CODEBOOK_SCHEMA,
        Some(&system),
    )
    .await?;

    let candidates: Vec<Code> = response
        .codes
        .into_iter()
        .map(|c| Code {
            name: c.name,
            description: c.description,
            criteria: c.criteria,
            parent: c.parent,
        })
        .collect();

    progress.report(ProgressEvent::StageFinished {
        stage: STAGE_NAME.to_string(),
        total,
    });

    Ok(CodeBook::from_candidates(
        candidates,
        mode,
        user_context.to_string(),
        hierarchy,
    ))
}
