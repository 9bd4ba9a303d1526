//! Per-document chunk decision.
//!
//! Asks the model whether a document should be split into contiguous
//! sentence ranges before code application, and matches the declared ranges
//! back onto the document's sentence ordering. Chunking exists purely as a
//! cost/relevance filter: ranges marked `should_code = false` are skipped in
//! the code-application stage without any model call.
//!
//! Range matching is deliberately lenient:
//! - a start id that appears nowhere in the document drops the range;
//! - an end id that never appears after the start id leaves the range open —
//!   the scan runs to the end of the document;
//! - empty ranges are discarded.

use crate::llm::{generate_structured, LlmClient, LlmError};
use crate::models::{Chunk, CodeBook, Document};
use crate::prompts;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ChunkRange {
    start_sentence_id: String,
    end_sentence_id: String,
    should_code: bool,
}

#[derive(Debug, Deserialize)]
struct ChunkingDecision {
    should_chunk: bool,
    #[serde(default)]
    chunks: Vec<ChunkRange>,
}

/// Decide how to split one document, returning its chunks in declared order.
///
/// If the model declines to chunk, the whole document becomes a single chunk
/// with `should_code = true`. A document without sentences yields no chunks.
pub async fn decide_chunks(
    llm: &dyn LlmClient,
    document: &Document,
    code_book: &CodeBook,
) -> Result<Vec<Chunk>, LlmError> {
    let sentence_listing = prompts::sentence_list(&document.sentences);
    let code_listing = prompts::code_list(&code_book.codes, false);

    let (system, user) = prompts::chunking_decision(&document.name, &sentence_listing, &code_listing);

    let decision: ChunkingDecision =
        generate_structured(llm, &user, prompts::CHUNKING_SCHEMA, Some(&system)).await?;

    if !decision.should_chunk {
        return Ok(whole_document_chunk(document));
    }

    let mut chunks = Vec::new();
    for range in &decision.chunks {
        if let Some(chunk) = collect_range(
            document,
            &range.start_sentence_id,
            &range.end_sentence_id,
            range.should_code,
        ) {
            chunks.push(chunk);
        }
    }

    Ok(chunks)
}

/// The no-chunking fallback: one chunk spanning every sentence.
fn whole_document_chunk(document: &Document) -> Vec<Chunk> {
    let (Some(first), Some(last)) = (document.sentences.first(), document.sentences.last()) else {
        return Vec::new();
    };
    vec![Chunk {
        start_sentence_id: first.id.clone(),
        end_sentence_id: last.id.clone(),
        sentences: document.sentences.clone(),
        should_code: true,
    }]
}

/// Collect the contiguous sentence run for one declared range.
///
/// Scans the document's sentence sequence in order, collecting from the
/// first sentence whose id equals `start_id` up to and including the first
/// subsequent sentence whose id equals `end_id`. Returns `None` if the start
/// id is never found or the range is empty.
pub fn collect_range(
    document: &Document,
    start_id: &str,
    end_id: &str,
    should_code: bool,
) -> Option<Chunk> {
    let mut sentences = Vec::new();
    let mut in_range = false;

    for sentence in &document.sentences {
        if sentence.id == start_id {
            in_range = true;
        }
        if in_range {
            sentences.push(sentence.clone());
        }
        if in_range && sentence.id == end_id {
            break;
        }
    }

    if sentences.is_empty() {
        return None;
    }

    Some(Chunk {
        start_sentence_id: start_id.to_string(),
        end_sentence_id: end_id.to_string(),
        sentences,
        should_code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn doc() -> Document {
        Document::new(
            PathBuf::from("notes.txt"),
            "alpha\nbeta\ngamma\ndelta\nepsilon".to_string(),
        )
    }

    #[test]
    fn test_range_is_contiguous_and_inclusive() {
        let doc = doc();
        let chunk = collect_range(&doc, "notes_2", "notes_4", true).unwrap();
        let ids: Vec<&str> = chunk.sentences.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["notes_2", "notes_3", "notes_4"]);
        assert_eq!(chunk.start_sentence_id, "notes_2");
        assert_eq!(chunk.end_sentence_id, "notes_4");
    }

    #[test]
    fn test_missing_start_drops_range() {
        let doc = doc();
        assert!(collect_range(&doc, "notes_99", "notes_4", true).is_none());
    }

    #[test]
    fn test_open_range_runs_to_document_end() {
        let doc = doc();
        // End id never appears after the start: scan runs to the last sentence.
        let chunk = collect_range(&doc, "notes_3", "notes_99", true).unwrap();
        let ids: Vec<&str> = chunk.sentences.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["notes_3", "notes_4", "notes_5"]);
    }

    #[test]
    fn test_end_before_start_runs_open() {
        let doc = doc();
        // An end id positioned before the start is never seen once the scan
        // begins, so the range behaves like an open range.
        let chunk = collect_range(&doc, "notes_4", "notes_2", false).unwrap();
        let ids: Vec<&str> = chunk.sentences.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["notes_4", "notes_5"]);
        assert!(!chunk.should_code);
    }

    #[test]
    fn test_single_sentence_range() {
        let doc = doc();
        let chunk = collect_range(&doc, "notes_3", "notes_3", true).unwrap();
        assert_eq!(chunk.len(), 1);
        assert_eq!(chunk.sentences[0].text, "gamma");
    }

    #[test]
    fn test_whole_document_fallback() {
        let doc = doc();
        let chunks = whole_document_chunk(&doc);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 5);
        assert!(chunks[0].should_code);
        assert_eq!(chunks[0].start_sentence_id, "notes_1");
        assert_eq!(chunks[0].end_sentence_id, "notes_5");
    }

    #[test]
    fn test_whole_document_fallback_empty_doc() {
        let empty = Document::new(PathBuf::from("empty.txt"), String::new());
        assert!(whole_document_chunk(&empty).is_empty());
    }
}
