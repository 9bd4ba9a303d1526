//! Pipeline behavior tests driven by a scripted gateway.
//!
//! These tests exercise the real stages — reading, chunk decision, code
//! application, and the fan-out runner — against a mock [`LlmClient`] that
//! returns scripted responses and records every call.

use std::collections::{BTreeSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use inductive_coder::error::AnalysisError;
use inductive_coder::llm::{ClientRegistry, LlmClient, LlmError};
use inductive_coder::models::{AnalysisMode, Code, CodeBook, Document, HierarchyDepth};
use inductive_coder::progress::{NoProgress, ProgressEvent, ProgressReporter};
use inductive_coder::reading;
use inductive_coder::runner::AnalysisRunner;

#[derive(Debug)]
struct RecordedCall {
    kind: &'static str,
    prompt: String,
    system: Option<String>,
}

/// Scripted gateway: pops queued responses, tracks concurrency, and can
/// inject a failure at a chosen structured-call index.
///
/// Prompts may carry a `sleepms:<n>` marker (planted in document content) to
/// give individual calls distinct latencies.
#[derive(Default)]
struct MockClient {
    text: Mutex<VecDeque<String>>,
    json: Mutex<VecDeque<Value>>,
    json_default: Option<Value>,
    fail_json_at: Option<usize>,
    delay: Duration,
    calls: Mutex<Vec<RecordedCall>>,
    active: AtomicUsize,
    peak: AtomicUsize,
    json_calls: AtomicUsize,
}

impl MockClient {
    fn recorded(&self) -> Vec<RecordedCall> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }

    fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn json_call_count(&self) -> usize {
        self.json_calls.load(Ordering::SeqCst)
    }
}

fn scripted_delay(prompt: &str) -> Option<Duration> {
    let rest = &prompt[prompt.find("sleepms:")? + "sleepms:".len()..];
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse::<u64>().ok().map(Duration::from_millis)
}

#[async_trait]
impl LlmClient for MockClient {
    fn model_name(&self) -> &str {
        "mock"
    }

    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<String, LlmError> {
        self.calls.lock().unwrap().push(RecordedCall {
            kind: "generate",
            prompt: prompt.to_string(),
            system: system_prompt.map(|s| s.to_string()),
        });

        self.text
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::Generation("mock: no scripted text response".to_string()))
    }

    async fn generate_json(
        &self,
        prompt: &str,
        _schema_hint: &str,
        system_prompt: Option<&str>,
    ) -> Result<Value, LlmError> {
        let call_index = self.json_calls.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(RecordedCall {
            kind: "generate_json",
            prompt: prompt.to_string(),
            system: system_prompt.map(|s| s.to_string()),
        });

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_active, Ordering::SeqCst);

        let delay = scripted_delay(prompt).unwrap_or(self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.fail_json_at == Some(call_index) {
            return Err(LlmError::Generation("mock failure".to_string()));
        }

        let scripted = self.json.lock().unwrap().pop_front();
        scripted
            .or_else(|| self.json_default.clone())
            .ok_or_else(|| LlmError::Schema("mock: no scripted json response".to_string()))
    }
}

/// Collects progress events for assertions.
#[derive(Default)]
struct CollectingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl ProgressReporter for CollectingProgress {
    fn report(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn doc(name: &str, content: &str) -> Document {
    Document::new(PathBuf::from(name), content.to_string())
}

fn sentiment_book(mode: AnalysisMode) -> CodeBook {
    let mut book = CodeBook::new(mode, "How do users feel?".to_string(), HierarchyDepth::Flat);
    book.add_code(Code {
        name: "Positive".to_string(),
        description: "Positive sentiment".to_string(),
        criteria: "Mentions satisfaction or happiness".to_string(),
        parent: None,
    });
    book.add_code(Code {
        name: "Negative".to_string(),
        description: "Negative sentiment".to_string(),
        criteria: "Mentions dissatisfaction or problems".to_string(),
        parent: None,
    });
    book
}

fn categorize_response() -> Value {
    json!({
        "code_names": ["Positive"],
        "rationales": {"Positive": "upbeat throughout"}
    })
}

// ============ Reading stage ============

#[tokio::test]
async fn reading_notes_are_replaced_and_threaded() {
    let mock = Arc::new(MockClient {
        text: Mutex::new(VecDeque::from([
            "NOTES-AFTER-FIRST".to_string(),
            "NOTES-AFTER-SECOND".to_string(),
        ])),
        json: Mutex::new(VecDeque::from([json!({
            "codes": [
                {
                    "name": "Trust",
                    "description": "Expressions of trust",
                    "criteria": "Mentions reliance on others",
                    "parent": null
                },
                {
                    "name": "Dependence",
                    "description": "Leaning on the system",
                    "criteria": "Mentions needing the tool",
                    "parent": "Ghost"
                }
            ]
        })])),
        ..MockClient::default()
    });
    let registry = ClientRegistry::single(mock.clone());

    let tmp = tempfile::TempDir::new().unwrap();
    let notes_path = tmp.path().join("reading_notes.md");

    let docs = vec![doc("first.txt", "I rely on it."), doc("second.txt", "It never fails.")];
    let book = reading::derive_code_book(
        &registry,
        AnalysisMode::Coding,
        &docs,
        "How do users talk about trust?",
        HierarchyDepth::TwoLevel,
        &NoProgress,
        Some(notes_path.as_path()),
    )
    .await
    .unwrap();

    let calls = mock.recorded();
    let reads: Vec<&RecordedCall> = calls.iter().filter(|c| c.kind == "generate").collect();
    assert_eq!(reads.len(), 2);

    // The first read starts with empty memory.
    assert!(!reads[0].system.as_ref().unwrap().contains("NOTES-AFTER"));
    // The second read observes exactly the first response as memory.
    assert!(reads[1].system.as_ref().unwrap().contains("NOTES-AFTER-FIRST"));

    // The code-book call consumes the final notes only: replaced, not appended.
    let codebook_call = calls.iter().find(|c| c.kind == "generate_json").unwrap();
    assert!(codebook_call.prompt.contains("NOTES-AFTER-SECOND"));
    assert!(!codebook_call.prompt.contains("NOTES-AFTER-FIRST"));

    // The notes file carries the final memory.
    let written = std::fs::read_to_string(&notes_path).unwrap();
    assert_eq!(written, "NOTES-AFTER-SECOND");

    // Lenient parent policy: the unknown parent is cleared, not rejected.
    assert_eq!(book.len(), 2);
    assert_eq!(book.get_code("Dependence").unwrap().parent, None);
    assert_eq!(book.mode, AnalysisMode::Coding);
    assert_eq!(book.context, "How do users talk about trust?");
}

#[tokio::test]
async fn reading_fails_fast_without_documents() {
    let mock = Arc::new(MockClient::default());
    let registry = ClientRegistry::single(mock.clone());

    let err = reading::derive_code_book(
        &registry,
        AnalysisMode::Coding,
        &[],
        "context",
        HierarchyDepth::Flat,
        &NoProgress,
        None,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AnalysisError::InvalidInput(_)));
    // No model call was made.
    assert!(mock.recorded().is_empty());
}

// ============ Fan-out runner ============

#[tokio::test]
async fn concurrency_never_exceeds_the_admission_gate() {
    let mock = Arc::new(MockClient {
        json_default: Some(categorize_response()),
        delay: Duration::from_millis(30),
        ..MockClient::default()
    });
    let registry = ClientRegistry::single(mock.clone());

    let docs: Vec<Document> = (0..9)
        .map(|i| doc(&format!("doc_{i}.txt"), "Content line."))
        .collect();
    let book = sentiment_book(AnalysisMode::Categorization);

    let runner = AnalysisRunner::new(&registry, &NoProgress, 3);
    let facts = runner.categorize_documents(docs, &book).await.unwrap();

    // All nine units completed, never more than three in flight.
    assert_eq!(facts.len(), 9);
    assert!(
        mock.peak_concurrency() <= 3,
        "peak concurrency {} exceeded the gate",
        mock.peak_concurrency()
    );
}

#[tokio::test]
async fn aggregation_is_complete_and_order_independent() {
    let names = ["a.txt", "b.txt", "c.txt", "d.txt", "e.txt"];

    // Two runs with opposite latency profiles, so completion order differs.
    let mut aggregates = Vec::new();
    for reversed in [false, true] {
        let mock = Arc::new(MockClient {
            json_default: Some(categorize_response()),
            ..MockClient::default()
        });
        let registry = ClientRegistry::single(mock.clone());

        let docs: Vec<Document> = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let ms = if reversed { (5 - i) * 20 } else { i * 20 };
                doc(name, &format!("Content. sleepms:{ms}"))
            })
            .collect();

        let book = sentiment_book(AnalysisMode::Categorization);
        let runner = AnalysisRunner::new(&registry, &NoProgress, 5);
        aggregates.push(runner.categorize_documents(docs, &book).await.unwrap());
    }

    let as_set = |facts: &[inductive_coder::models::DocumentCode]| -> BTreeSet<(String, String)> {
        facts
            .iter()
            .map(|f| (f.document.clone(), f.code.name.clone()))
            .collect()
    };

    assert_eq!(aggregates[0].len(), names.len());
    assert_eq!(as_set(&aggregates[0]), as_set(&aggregates[1]));

    // Merging by document index makes the aggregate identical, not merely
    // set-equal, regardless of completion order.
    let ordered: Vec<&str> = aggregates[0].iter().map(|f| f.document.as_str()).collect();
    let ordered_again: Vec<&str> = aggregates[1].iter().map(|f| f.document.as_str()).collect();
    assert_eq!(ordered, ordered_again);
    assert_eq!(ordered, names.to_vec());
}

#[tokio::test]
async fn first_failure_aborts_the_run() {
    let mock = Arc::new(MockClient {
        json_default: Some(categorize_response()),
        fail_json_at: Some(1),
        delay: Duration::from_millis(20),
        ..MockClient::default()
    });
    let registry = ClientRegistry::single(mock.clone());

    let docs: Vec<Document> = (0..4)
        .map(|i| doc(&format!("doc_{i}.txt"), "Content line."))
        .collect();
    let book = sentiment_book(AnalysisMode::Categorization);

    let runner = AnalysisRunner::new(&registry, &NoProgress, 2);
    let err = runner.categorize_documents(docs, &book).await.unwrap_err();

    match err {
        AnalysisError::Document { document, source } => {
            assert!(document.starts_with("doc_"));
            assert!(matches!(source, LlmError::Generation(_)));
        }
        other => panic!("expected a document failure, got {other:?}"),
    }
}

#[tokio::test]
async fn progress_reports_start_units_and_finish() {
    let mock = Arc::new(MockClient {
        json_default: Some(categorize_response()),
        ..MockClient::default()
    });
    let registry = ClientRegistry::single(mock.clone());
    let progress = CollectingProgress::default();

    let docs: Vec<Document> = (0..3)
        .map(|i| doc(&format!("doc_{i}.txt"), "Content line."))
        .collect();
    let book = sentiment_book(AnalysisMode::Categorization);

    let runner = AnalysisRunner::new(&registry, &progress, 2);
    runner.categorize_documents(docs, &book).await.unwrap();

    let events = progress.events.lock().unwrap();
    assert!(matches!(
        events.first(),
        Some(ProgressEvent::StageStarted { total: 3, .. })
    ));
    let units = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::UnitCompleted { .. }))
        .count();
    assert_eq!(units, 3);
    assert!(matches!(
        events.last(),
        Some(ProgressEvent::StageFinished { total: 3, .. })
    ));
}

// ============ Coding mode: chunk decision + code application ============

#[tokio::test]
async fn irrelevant_chunks_are_skipped_without_a_model_call() {
    let mock = Arc::new(MockClient {
        json: Mutex::new(VecDeque::from([
            // Chunk decision: one irrelevant chunk, one relevant chunk.
            json!({
                "should_chunk": true,
                "chunks": [
                    {
                        "start_sentence_id": "review_1",
                        "end_sentence_id": "review_2",
                        "should_code": false
                    },
                    {
                        "start_sentence_id": "review_3",
                        "end_sentence_id": "review_4",
                        "should_code": true
                    }
                ]
            }),
            // Coding call for the relevant chunk only. One triple names an
            // undeclared code and must be dropped silently.
            json!({
                "codes": [
                    {
                        "sentence_id": "review_3",
                        "code_name": "Positive",
                        "rationale": "praise"
                    },
                    {
                        "sentence_id": "review_4",
                        "code_name": "NotInTheBook",
                        "rationale": "should vanish"
                    }
                ]
            }),
        ])),
        ..MockClient::default()
    });
    let registry = ClientRegistry::single(mock.clone());

    let docs = vec![doc(
        "review.txt",
        "Boilerplate header\nLegal disclaimer\nGreat product\nWorks perfectly",
    )];
    let book = sentiment_book(AnalysisMode::Coding);

    let runner = AnalysisRunner::new(&registry, &NoProgress, 1);
    let facts = runner.code_documents(docs, &book).await.unwrap();

    // Two structured calls total: the decision and one coding call — the
    // irrelevant chunk cost nothing.
    assert_eq!(mock.json_call_count(), 2);

    // Only the resolvable triple survives.
    assert_eq!(facts.len(), 1);
    assert_eq!(facts[0].sentence_id, "review_3");
    assert_eq!(facts[0].code.name, "Positive");
    assert_eq!(facts[0].rationale.as_deref(), Some("praise"));
}

#[tokio::test]
async fn no_chunking_fallback_codes_the_whole_document() {
    let mock = Arc::new(MockClient {
        json: Mutex::new(VecDeque::from([
            json!({"should_chunk": false, "chunks": []}),
            json!({
                "codes": [
                    {"sentence_id": "memo_1", "code_name": "Negative", "rationale": ""}
                ]
            }),
        ])),
        ..MockClient::default()
    });
    let registry = ClientRegistry::single(mock.clone());

    let docs = vec![doc("memo.txt", "The rollout was a mess.\nNobody was told.")];
    let book = sentiment_book(AnalysisMode::Coding);

    let runner = AnalysisRunner::new(&registry, &NoProgress, 1);
    let facts = runner.code_documents(docs, &book).await.unwrap();

    // The fallback chunk spans the whole document, so the coding call saw
    // every sentence.
    let calls = mock.recorded();
    let coding_call = calls.iter().filter(|c| c.kind == "generate_json").nth(1).unwrap();
    assert!(coding_call.prompt.contains("memo_1"));
    assert!(coding_call.prompt.contains("memo_2"));

    assert_eq!(facts.len(), 1);
    // An empty rationale is normalized away.
    assert_eq!(facts[0].rationale, None);
}
