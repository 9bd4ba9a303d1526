//! Fan-out/fan-in execution of per-document work.
//!
//! Stage 2's per-document units are independent of each other, so the runner
//! launches all of them at once and lets a counting admission gate
//! ([`tokio::sync::Semaphore`]) bound how many are simultaneously in flight.
//! Each unit holds one slot from before its first model call until it
//! finishes, success or failure.
//!
//! Failure policy is fail-fast: the first unit error aborts every remaining
//! unit and propagates, tagged with the failing document. Partial work from
//! aborted siblings is discarded.
//!
//! Results are tagged with their document index and merged in document order,
//! so the aggregate is reproducible even though merge order is semantically
//! irrelevant (every fact carries its own sentence/document identity).

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::chunking;
use crate::coding;
use crate::error::AnalysisError;
use crate::llm::{ClientRegistry, LlmError, Stage};
use crate::models::{CodeBook, Document, DocumentCode, SentenceCode};
use crate::progress::{ProgressEvent, ProgressReporter};

/// Executes Stage 2 over a document set with bounded concurrency.
pub struct AnalysisRunner<'a> {
    registry: &'a ClientRegistry,
    progress: &'a dyn ProgressReporter,
    max_concurrent: usize,
}

impl<'a> AnalysisRunner<'a> {
    pub fn new(
        registry: &'a ClientRegistry,
        progress: &'a dyn ProgressReporter,
        max_concurrent: usize,
    ) -> Self {
        Self {
            registry,
            progress,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Coding mode: decide chunks for each document, then code its relevant
    /// chunks in declared order.
    pub async fn code_documents(
        &self,
        documents: Vec<Document>,
        code_book: &CodeBook,
    ) -> Result<Vec<SentenceCode>, AnalysisError> {
        let book = Arc::new(code_book.clone());
        let gate = Arc::new(Semaphore::new(self.max_concurrent));
        let chunking_client = self.registry.for_stage(Stage::Chunking);
        let coding_client = self.registry.for_stage(Stage::Coding);

        let mut units = Vec::with_capacity(documents.len());
        for (idx, document) in documents.into_iter().enumerate() {
            let gate = Arc::clone(&gate);
            let book = Arc::clone(&book);
            let chunking_client = Arc::clone(&chunking_client);
            let coding_client = Arc::clone(&coding_client);

            units.push(async move {
                let _permit = acquire(&document.name, gate).await?;

                let chunks = chunking::decide_chunks(chunking_client.as_ref(), &document, &book)
                    .await
                    .map_err(|source| AnalysisError::Document {
                        document: document.name.clone(),
                        source,
                    })?;

                let mut facts = Vec::new();
                // Chunks are visited in declared order for reproducibility.
                for chunk in &chunks {
                    let mut chunk_facts = coding::code_chunk(coding_client.as_ref(), chunk, &book)
                        .await
                        .map_err(|source| AnalysisError::Document {
                            document: document.name.clone(),
                            source,
                        })?;
                    facts.append(&mut chunk_facts);
                }

                Ok((idx, facts))
            });
        }

        self.fan_out("coding", units).await
    }

    /// Categorization mode: one structured call per whole document.
    pub async fn categorize_documents(
        &self,
        documents: Vec<Document>,
        code_book: &CodeBook,
    ) -> Result<Vec<DocumentCode>, AnalysisError> {
        let book = Arc::new(code_book.clone());
        let gate = Arc::new(Semaphore::new(self.max_concurrent));
        let client = self.registry.for_stage(Stage::Coding);

        let mut units = Vec::with_capacity(documents.len());
        for (idx, document) in documents.into_iter().enumerate() {
            let gate = Arc::clone(&gate);
            let book = Arc::clone(&book);
            let client = Arc::clone(&client);

            units.push(async move {
                let _permit = acquire(&document.name, gate).await?;

                let facts = coding::categorize_document(client.as_ref(), &document, &book)
                    .await
                    .map_err(|source| AnalysisError::Document {
                        document: document.name.clone(),
                        source,
                    })?;

                Ok((idx, facts))
            });
        }

        self.fan_out("categorization", units).await
    }

    /// Launch all units on a [`JoinSet`], collect in completion order, merge
    /// in document order. First error aborts the rest.
    async fn fan_out<T, Fut>(&self, stage: &str, units: Vec<Fut>) -> Result<Vec<T>, AnalysisError>
    where
        T: Send + 'static,
        Fut: Future<Output = Result<(usize, Vec<T>), AnalysisError>> + Send + 'static,
    {
        let total = units.len() as u64;
        self.progress.report(ProgressEvent::StageStarted {
            stage: stage.to_string(),
            total,
        });

        let mut set = JoinSet::new();
        for unit in units {
            set.spawn(unit);
        }

        let mut indexed: Vec<(usize, Vec<T>)> = Vec::with_capacity(total as usize);
        let mut completed = 0u64;

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(result)) => {
                    indexed.push(result);
                    completed += 1;
                    self.progress.report(ProgressEvent::UnitCompleted {
                        stage: stage.to_string(),
                        completed,
                        total,
                    });
                }
                Ok(Err(error)) => {
                    set.abort_all();
                    while set.join_next().await.is_some() {}
                    return Err(error);
                }
                Err(join_error) => {
                    if join_error.is_cancelled() {
                        continue;
                    }
                    set.abort_all();
                    while set.join_next().await.is_some() {}
                    std::panic::resume_unwind(join_error.into_panic());
                }
            }
        }

        indexed.sort_by_key(|(idx, _)| *idx);

        self.progress.report(ProgressEvent::StageFinished {
            stage: stage.to_string(),
            total,
        });

        Ok(indexed.into_iter().flat_map(|(_, facts)| facts).collect())
    }
}

/// Take one slot from the admission gate.
///
/// The gate is never closed during a run, so failure here means the runtime
/// is tearing down; surface it as a unit failure rather than panicking.
async fn acquire(
    document: &str,
    gate: Arc<Semaphore>,
) -> Result<tokio::sync::OwnedSemaphorePermit, AnalysisError> {
    gate.acquire_owned()
        .await
        .map_err(|_| AnalysisError::Document {
            document: document.to_string(),
            source: LlmError::Generation("admission gate closed".to_string()),
        })
}
