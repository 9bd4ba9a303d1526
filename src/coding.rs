//! Code application: sentence-level coding and document-level categorization.
//!
//! Both operations resolve model-returned code names against the code book
//! and silently drop anything that does not resolve — the model is not
//! constrained to emit only declared names, so unknown names are expected,
//! not exceptional. Multiple codes may land on the same sentence or document;
//! none is ever excluded because another is present.

use serde::Deserialize;
use std::collections::HashMap;

use crate::llm::{generate_structured, LlmClient, LlmError};
use crate::models::{Chunk, CodeBook, Document, DocumentCode, SentenceCode};
use crate::prompts;

#[derive(Debug, Deserialize)]
struct SentenceCodeEntry {
    sentence_id: String,
    code_name: String,
    #[serde(default)]
    rationale: String,
}

#[derive(Debug, Deserialize)]
struct SentenceCodesResponse {
    codes: Vec<SentenceCodeEntry>,
}

#[derive(Debug, Deserialize)]
struct DocumentCodesResponse {
    code_names: Vec<String>,
    #[serde(default)]
    rationales: HashMap<String, String>,
}

/// Apply codes to one chunk's sentences.
///
/// Chunks flagged `should_code = false` return no facts without issuing a
/// model call.
pub async fn code_chunk(
    llm: &dyn LlmClient,
    chunk: &Chunk,
    code_book: &CodeBook,
) -> Result<Vec<SentenceCode>, LlmError> {
    if !chunk.should_code {
        return Ok(Vec::new());
    }

    let sentence_listing = prompts::sentence_list(&chunk.sentences);
    let code_listing = prompts::code_list(&code_book.codes, true);

    let (system, user) = prompts::code_chunk(&sentence_listing, &code_listing);

    let response: SentenceCodesResponse =
        generate_structured(llm, &user, prompts::SENTENCE_CODES_SCHEMA, Some(&system)).await?;

    let mut facts = Vec::new();
    for entry in response.codes {
        // Unknown code names are dropped, not fatal.
        let Some(code) = code_book.get_code(&entry.code_name) else {
            continue;
        };
        facts.push(SentenceCode {
            sentence_id: entry.sentence_id,
            code: code.clone(),
            rationale: non_empty(entry.rationale),
        });
    }

    Ok(facts)
}

/// Apply codes to one whole document (categorization mode).
pub async fn categorize_document(
    llm: &dyn LlmClient,
    document: &Document,
    code_book: &CodeBook,
) -> Result<Vec<DocumentCode>, LlmError> {
    let code_listing = prompts::code_list(&code_book.codes, true);

    let (system, user) = prompts::categorize_document(&document.name, &document.content, &code_listing);

    let response: DocumentCodesResponse =
        generate_structured(llm, &user, prompts::DOCUMENT_CODES_SCHEMA, Some(&system)).await?;

    let mut facts = Vec::new();
    for code_name in response.code_names {
        let Some(code) = code_book.get_code(&code_name) else {
            continue;
        };
        let rationale = response.rationales.get(&code_name).cloned();
        facts.push(DocumentCode {
            document: document.name.clone(),
            code: code.clone(),
            rationale: rationale.and_then(non_empty),
        });
    }

    Ok(facts)
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
