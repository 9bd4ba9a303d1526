//! Code-book and result persistence.
//!
//! Everything is stored as plain JSON in an output directory:
//!
//! | File | Contents |
//! |------|----------|
//! | `code_book.json` | mode, context, hierarchy, ordered code list |
//! | `sentence_codes.json` | flat sentence-level fact list (coding mode) |
//! | `document_codes.json` | flat document-level fact list (categorization mode) |
//! | `summary.txt` | human-readable code book + per-code counts |
//!
//! Facts are stored once, as a flat list; the by-code and by-document
//! groupings used for display are derived views computed on demand, never
//! separate storage. Code-book round-trips are lossless: saving then loading
//! reproduces the same codes, parent links, mode, context, and hierarchy
//! policy.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::{
    AnalysisMode, AnalysisResult, Code, CodeBook, DocumentCode, HierarchyDepth, SentenceCode,
};

#[derive(Serialize, Deserialize)]
struct CodeBookFile {
    mode: AnalysisMode,
    context: String,
    hierarchy: HierarchyDepth,
    codes: Vec<Code>,
}

#[derive(Serialize, Deserialize)]
struct SentenceFactRecord {
    sentence_id: String,
    code: String,
    #[serde(default)]
    rationale: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct SentenceCodesFile {
    mode: AnalysisMode,
    generated_at: String,
    total_facts: usize,
    facts: Vec<SentenceFactRecord>,
}

#[derive(Serialize, Deserialize)]
struct DocumentFactRecord {
    document: String,
    code: String,
    #[serde(default)]
    rationale: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct DocumentCodesFile {
    mode: AnalysisMode,
    generated_at: String,
    total_facts: usize,
    facts: Vec<DocumentFactRecord>,
}

/// Save a code book as JSON.
pub fn save_code_book(code_book: &CodeBook, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = CodeBookFile {
        mode: code_book.mode,
        context: code_book.context.clone(),
        hierarchy: code_book.hierarchy,
        codes: code_book.codes.clone(),
    };

    let json = serde_json::to_string_pretty(&file)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write code book: {}", path.display()))?;
    Ok(())
}

/// Load a code book from JSON.
pub fn load_code_book(path: &Path) -> Result<CodeBook> {
    if !path.exists() {
        bail!("Code book not found: {}", path.display());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read code book: {}", path.display()))?;
    let file: CodeBookFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse code book: {}", path.display()))?;

    let mut book = CodeBook::new(file.mode, file.context, file.hierarchy);
    for code in file.codes {
        book.add_code(code);
    }
    Ok(book)
}

/// Save a full analysis result into `output_dir`: the code book, the flat
/// fact list for the active mode, and the summary.
pub fn save_result(result: &AnalysisResult, output_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(output_dir)?;

    save_code_book(&result.code_book, &output_dir.join("code_book.json"))?;

    let generated_at = chrono::Utc::now().to_rfc3339();

    match result.mode {
        AnalysisMode::Coding => {
            let file = SentenceCodesFile {
                mode: result.mode,
                generated_at,
                total_facts: result.sentence_codes.len(),
                facts: result
                    .sentence_codes
                    .iter()
                    .map(|sc| SentenceFactRecord {
                        sentence_id: sc.sentence_id.clone(),
                        code: sc.code.name.clone(),
                        rationale: sc.rationale.clone(),
                    })
                    .collect(),
            };
            let path = output_dir.join("sentence_codes.json");
            std::fs::write(&path, serde_json::to_string_pretty(&file)?)?;
        }
        AnalysisMode::Categorization => {
            let file = DocumentCodesFile {
                mode: result.mode,
                generated_at,
                total_facts: result.document_codes.len(),
                facts: result
                    .document_codes
                    .iter()
                    .map(|dc| DocumentFactRecord {
                        document: dc.document.clone(),
                        code: dc.code.name.clone(),
                        rationale: dc.rationale.clone(),
                    })
                    .collect(),
            };
            let path = output_dir.join("document_codes.json");
            std::fs::write(&path, serde_json::to_string_pretty(&file)?)?;
        }
    }

    std::fs::write(output_dir.join("summary.txt"), render_summary(result))?;

    Ok(())
}

/// Load an analysis result from an output directory.
///
/// Facts are joined back to codes by name through the saved code book; a
/// fact whose code name no longer resolves is dropped.
pub fn load_result(output_dir: &Path) -> Result<AnalysisResult> {
    let code_book = load_code_book(&output_dir.join("code_book.json"))?;
    let mode = code_book.mode;
    let mut result = AnalysisResult::new(mode, code_book);

    match mode {
        AnalysisMode::Coding => {
            let path = output_dir.join("sentence_codes.json");
            if path.exists() {
                let content = std::fs::read_to_string(&path)?;
                let file: SentenceCodesFile = serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse {}", path.display()))?;
                for record in file.facts {
                    let Some(code) = result.code_book.get_code(&record.code).cloned() else {
                        continue;
                    };
                    result.add_sentence_code(SentenceCode {
                        sentence_id: record.sentence_id,
                        code,
                        rationale: record.rationale,
                    });
                }
            }
        }
        AnalysisMode::Categorization => {
            let path = output_dir.join("document_codes.json");
            if path.exists() {
                let content = std::fs::read_to_string(&path)?;
                let file: DocumentCodesFile = serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse {}", path.display()))?;
                for record in file.facts {
                    let Some(code) = result.code_book.get_code(&record.code).cloned() else {
                        continue;
                    };
                    result.add_document_code(DocumentCode {
                        document: record.document,
                        code,
                        rationale: record.rationale,
                    });
                }
            }
        }
    }

    Ok(result)
}

// ============ Derived grouping views ============

/// Sentence facts grouped by code name.
pub fn sentence_facts_by_code(facts: &[SentenceCode]) -> BTreeMap<&str, Vec<&SentenceCode>> {
    let mut grouped: BTreeMap<&str, Vec<&SentenceCode>> = BTreeMap::new();
    for fact in facts {
        grouped.entry(fact.code.name.as_str()).or_default().push(fact);
    }
    grouped
}

/// Sentence facts grouped by source document.
///
/// The document is recovered from the sentence id (`stem_line`), so this
/// works on loaded results where sentences themselves are gone.
pub fn sentence_facts_by_document(facts: &[SentenceCode]) -> BTreeMap<String, Vec<&SentenceCode>> {
    let mut grouped: BTreeMap<String, Vec<&SentenceCode>> = BTreeMap::new();
    for fact in facts {
        let stem = fact
            .sentence_id
            .rsplit_once('_')
            .map(|(stem, _)| stem)
            .unwrap_or(fact.sentence_id.as_str());
        grouped.entry(stem.to_string()).or_default().push(fact);
    }
    grouped
}

/// Document facts grouped by code name.
pub fn document_facts_by_code(facts: &[DocumentCode]) -> BTreeMap<&str, Vec<&DocumentCode>> {
    let mut grouped: BTreeMap<&str, Vec<&DocumentCode>> = BTreeMap::new();
    for fact in facts {
        grouped.entry(fact.code.name.as_str()).or_default().push(fact);
    }
    grouped
}

/// Document facts grouped by document.
pub fn document_facts_by_document(facts: &[DocumentCode]) -> BTreeMap<&str, Vec<&DocumentCode>> {
    let mut grouped: BTreeMap<&str, Vec<&DocumentCode>> = BTreeMap::new();
    for fact in facts {
        grouped.entry(fact.document.as_str()).or_default().push(fact);
    }
    grouped
}

/// Render the human-readable run summary.
pub fn render_summary(result: &AnalysisResult) -> String {
    let rule = "=".repeat(80);
    let mut lines = vec![
        rule.clone(),
        "INDUCTIVE CODING ANALYSIS SUMMARY".to_string(),
        rule.clone(),
        String::new(),
        format!("Mode: {}", result.mode.label()),
        format!("Number of codes: {}", result.code_book.len()),
        String::new(),
        "CODES:".to_string(),
    ];

    for code in &result.code_book.codes {
        lines.push(String::new());
        match &code.parent {
            Some(parent) => lines.push(format!("{} (under {})", code.name, parent)),
            None => lines.push(code.name.clone()),
        }
        lines.push(format!("  Description: {}", code.description));
        lines.push(format!("  Criteria: {}", code.criteria));
    }

    lines.push(String::new());
    lines.push(rule.clone());
    lines.push("RESULTS:".to_string());
    lines.push(rule);

    match result.mode {
        AnalysisMode::Coding => {
            lines.push(String::new());
            lines.push(format!(
                "Total coded sentences: {}",
                result.sentence_codes.len()
            ));
            lines.push(String::new());
            lines.push("Sentences per code:".to_string());
            for (code, facts) in sentence_facts_by_code(&result.sentence_codes) {
                lines.push(format!("  {}: {}", code, facts.len()));
            }
        }
        AnalysisMode::Categorization => {
            lines.push(String::new());
            lines.push(format!(
                "Total coded documents: {}",
                document_facts_by_document(&result.document_codes).len()
            ));
            lines.push(String::new());
            lines.push("Documents per code:".to_string());
            for (code, facts) in document_facts_by_code(&result.document_codes) {
                lines.push(format!("  {}: {}", code, facts.len()));
            }
        }
    }

    lines.push(String::new());
    lines.join("\n")
}
