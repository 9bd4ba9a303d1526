//! Command-level orchestration for the CLI.
//!
//! Sequences the full analysis flow: load documents → derive (or load) the
//! code book → apply codes with bounded concurrency → persist everything and
//! print a summary. Counters and summaries go to stdout; progress and
//! warnings stay on stderr.

use anyhow::Result;
use std::path::Path;

use crate::config::Config;
use crate::documents;
use crate::error::AnalysisError;
use crate::llm::ClientRegistry;
use crate::models::{AnalysisMode, AnalysisResult, CodeBook, HierarchyDepth};
use crate::progress::ProgressReporter;
use crate::reading;
use crate::runner::AnalysisRunner;
use crate::store;

/// Run the full analysis: Stage 1 (or an existing code book) plus Stage 2.
#[allow(clippy::too_many_arguments)]
pub async fn run_analyze(
    config: &Config,
    mode: AnalysisMode,
    input_dir: &Path,
    user_context: &str,
    code_book_path: Option<&Path>,
    hierarchy: HierarchyDepth,
    output_dir: &Path,
    max_concurrent: Option<usize>,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    let docs = documents::load_documents(input_dir, &config.documents)?;
    if docs.is_empty() {
        return Err(AnalysisError::NoDocuments(input_dir.to_path_buf()).into());
    }

    std::fs::create_dir_all(output_dir)?;

    let registry = ClientRegistry::from_config(&config.llm)?;

    let code_book = match code_book_path {
        Some(path) => {
            let book = store::load_code_book(path)?;
            if book.mode != mode {
                return Err(AnalysisError::InvalidInput(format!(
                    "code book {} was built for {} mode, not {}",
                    path.display(),
                    book.mode.label(),
                    mode.label()
                ))
                .into());
            }
            book
        }
        None => {
            let notes_path = output_dir.join("reading_notes.md");
            let book = reading::derive_code_book(
                &registry,
                mode,
                &docs,
                user_context,
                hierarchy,
                progress,
                Some(notes_path.as_path()),
            )
            .await?;
            store::save_code_book(&book, &output_dir.join("code_book.json"))?;
            book
        }
    };

    let result = apply_codes(
        &registry,
        config,
        mode,
        docs,
        &code_book,
        max_concurrent,
        progress,
    )
    .await?;

    store::save_result(&result, output_dir)?;

    println!("analyze {}", mode.label());
    println!("  codes: {}", result.code_book.len());
    println!("  facts: {}", result.fact_count());
    println!("  output: {}", output_dir.display());
    println!("ok");

    Ok(())
}

/// Run Stage 1 only and save the code book.
pub async fn run_codebook(
    config: &Config,
    mode: AnalysisMode,
    input_dir: &Path,
    user_context: &str,
    hierarchy: HierarchyDepth,
    output_path: &Path,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    let docs = documents::load_documents(input_dir, &config.documents)?;
    if docs.is_empty() {
        return Err(AnalysisError::NoDocuments(input_dir.to_path_buf()).into());
    }

    let registry = ClientRegistry::from_config(&config.llm)?;

    let book = reading::derive_code_book(
        &registry, mode, &docs, user_context, hierarchy, progress, None,
    )
    .await?;

    store::save_code_book(&book, output_path)?;

    println!("codebook {}", mode.label());
    println!("  documents read: {}", docs.len());
    println!("  codes: {}", book.len());
    println!("  output: {}", output_path.display());
    println!("ok");

    Ok(())
}

/// Load a saved result and print it with its derived groupings.
pub fn run_show(output_dir: &Path) -> Result<()> {
    let result = store::load_result(output_dir)?;

    println!("{}", store::render_summary(&result));

    match result.mode {
        AnalysisMode::Coding => {
            println!("Facts by document:");
            for (document, facts) in store::sentence_facts_by_document(&result.sentence_codes) {
                println!("  {}", document);
                for fact in facts {
                    match &fact.rationale {
                        Some(rationale) => {
                            println!("    {} -> {}  ({})", fact.sentence_id, fact.code.name, rationale)
                        }
                        None => println!("    {} -> {}", fact.sentence_id, fact.code.name),
                    }
                }
            }
        }
        AnalysisMode::Categorization => {
            println!("Facts by document:");
            for (document, facts) in store::document_facts_by_document(&result.document_codes) {
                println!("  {}", document);
                for fact in facts {
                    match &fact.rationale {
                        Some(rationale) => println!("    {}  ({})", fact.code.name, rationale),
                        None => println!("    {}", fact.code.name),
                    }
                }
            }
        }
    }

    Ok(())
}

async fn apply_codes(
    registry: &ClientRegistry,
    config: &Config,
    mode: AnalysisMode,
    docs: Vec<crate::models::Document>,
    code_book: &CodeBook,
    max_concurrent: Option<usize>,
    progress: &dyn ProgressReporter,
) -> Result<AnalysisResult, AnalysisError> {
    let limit = max_concurrent.unwrap_or(config.analysis.max_concurrent_requests);
    let runner = AnalysisRunner::new(registry, progress, limit);

    let mut result = AnalysisResult::new(mode, code_book.clone());
    match mode {
        AnalysisMode::Coding => {
            result.sentence_codes = runner.code_documents(docs, code_book).await?;
        }
        AnalysisMode::Categorization => {
            result.document_codes = runner.categorize_documents(docs, code_book).await?;
        }
    }
    Ok(result)
}
