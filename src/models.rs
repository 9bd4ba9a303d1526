//! Core data models for the inductive coding pipeline.
//!
//! These types represent the documents, sentences, codes, and applied-code
//! facts that flow through the two analysis rounds. Everything here is plain
//! data: documents and sentences are immutable after load, a [`CodeBook`] is
//! immutable after the reading stage builds it, and the fact types
//! ([`SentenceCode`], [`DocumentCode`]) are immutable once created.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Granularity at which codes are applied.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    /// Codes are applied to individual sentences.
    Coding,
    /// Codes are applied to whole documents.
    Categorization,
}

impl AnalysisMode {
    /// Lowercase label used in prompts and output files.
    pub fn label(&self) -> &'static str {
        match self {
            AnalysisMode::Coding => "coding",
            AnalysisMode::Categorization => "categorization",
        }
    }
}

/// How deep the code hierarchy may grow.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum HierarchyDepth {
    /// No hierarchy — every code is a root code.
    Flat,
    /// At most parent → child (depth 2).
    TwoLevel,
    /// Unlimited depth (the model decides).
    Arbitrary,
}

/// A single non-blank line of a document, addressable by a stable id.
///
/// The id is `"{file_stem}_{line_number}"` with a 1-based line number counted
/// over the raw content, so ids are reproducible from identical content and
/// blank lines leave gaps rather than shifting later ids.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Sentence {
    pub id: String,
    pub text: String,
    pub line_number: usize,
    /// Display name of the owning document.
    pub document: String,
}

/// A document to be analyzed, with its derived sentence sequence.
#[derive(Clone, Debug)]
pub struct Document {
    /// Display name (file name including extension).
    pub name: String,
    pub path: PathBuf,
    pub content: String,
    pub sentences: Vec<Sentence>,
}

impl Document {
    /// Build a document from raw content, deriving the sentence sequence.
    ///
    /// Re-parsing identical content always yields identical ids, text, and
    /// ordering.
    pub fn new(path: PathBuf, content: String) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| name.clone());

        let mut sentences = Vec::new();
        for (idx, line) in content.split('\n').enumerate() {
            let line_number = idx + 1;
            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            sentences.push(Sentence {
                id: format!("{}_{}", stem, line_number),
                text: text.to_string(),
                line_number,
                document: name.clone(),
            });
        }

        Self {
            name,
            path,
            content,
            sentences,
        }
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }
}

/// A named category with a description and application criteria.
///
/// `name` is the join key everywhere codes are referenced — applied-code
/// facts and parent links both refer to codes by name.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Code {
    pub name: String,
    pub description: String,
    /// Free text guiding when to apply this code.
    pub criteria: String,
    /// Name of the parent code within the same book, if any.
    #[serde(default)]
    pub parent: Option<String>,
}

/// The full set of codes produced for one run, plus the mode and research
/// context they were derived for.
///
/// Built once by the reading stage (or loaded from a prior run), then
/// read-only. Insertion order is preserved for display; lookup is by name.
#[derive(Clone, Debug)]
pub struct CodeBook {
    pub codes: Vec<Code>,
    pub mode: AnalysisMode,
    /// The user's research question, threaded through every prompt.
    pub context: String,
    pub hierarchy: HierarchyDepth,
}

impl CodeBook {
    pub fn new(mode: AnalysisMode, context: String, hierarchy: HierarchyDepth) -> Self {
        Self {
            codes: Vec::new(),
            mode,
            context,
            hierarchy,
        }
    }

    /// Build a code book from model-proposed candidate codes, normalizing
    /// parent links so the hierarchy invariant holds unconditionally:
    ///
    /// - a parent name that matches no code in the same set is cleared
    ///   (the code becomes a root code — lenient policy);
    /// - self-references are cleared;
    /// - `Flat` strips all parent links;
    /// - `TwoLevel` clears any link whose parent is itself a child;
    /// - `Arbitrary` keeps arbitrary depth but breaks parent cycles.
    pub fn from_candidates(
        mut codes: Vec<Code>,
        mode: AnalysisMode,
        context: String,
        hierarchy: HierarchyDepth,
    ) -> Self {
        let names: HashSet<String> = codes.iter().map(|c| c.name.clone()).collect();

        for code in &mut codes {
            let unknown = code
                .parent
                .as_ref()
                .map(|p| !names.contains(p) || *p == code.name)
                .unwrap_or(false);
            if unknown {
                code.parent = None;
            }
        }

        match hierarchy {
            HierarchyDepth::Flat => {
                for code in &mut codes {
                    code.parent = None;
                }
            }
            HierarchyDepth::TwoLevel => {
                // Snapshot links first so clearing is order-independent.
                let parent_of: HashMap<String, Option<String>> = codes
                    .iter()
                    .map(|c| (c.name.clone(), c.parent.clone()))
                    .collect();
                for code in &mut codes {
                    if let Some(parent) = &code.parent {
                        let grandparent = parent_of.get(parent).and_then(|p| p.as_ref());
                        if grandparent.is_some() {
                            code.parent = None;
                        }
                    }
                }
            }
            HierarchyDepth::Arbitrary => {
                // Walk each code's parent chain; the first code found to
                // close a cycle loses its link. Processing in insertion
                // order makes the outcome deterministic.
                for i in 0..codes.len() {
                    let mut seen = HashSet::new();
                    seen.insert(codes[i].name.clone());
                    let mut current = codes[i].parent.clone();
                    while let Some(parent_name) = current {
                        if !seen.insert(parent_name.clone()) {
                            codes[i].parent = None;
                            break;
                        }
                        current = codes
                            .iter()
                            .find(|c| c.name == parent_name)
                            .and_then(|c| c.parent.clone());
                    }
                }
            }
        }

        Self {
            codes,
            mode,
            context,
            hierarchy,
        }
    }

    pub fn add_code(&mut self, code: Code) {
        self.codes.push(code);
    }

    /// Look up a code by name.
    pub fn get_code(&self, name: &str) -> Option<&Code> {
        self.codes.iter().find(|c| c.name == name)
    }

    /// Codes with no parent.
    pub fn get_root_codes(&self) -> Vec<&Code> {
        self.codes.iter().filter(|c| c.parent.is_none()).collect()
    }

    /// Codes whose parent is `parent_name`.
    pub fn get_children(&self, parent_name: &str) -> Vec<&Code> {
        self.codes
            .iter()
            .filter(|c| c.parent.as_deref() == Some(parent_name))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// A contiguous run of one document's sentences, flagged relevant or not.
///
/// Created per document per run by the chunk-decision stage and discarded
/// after the code-application pass over it completes.
#[derive(Clone, Debug)]
pub struct Chunk {
    pub start_sentence_id: String,
    pub end_sentence_id: String,
    pub sentences: Vec<Sentence>,
    /// Whether this chunk is relevant for code application.
    pub should_code: bool,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }
}

/// A code applied to a specific sentence.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SentenceCode {
    pub sentence_id: String,
    pub code: Code,
    pub rationale: Option<String>,
}

/// A code applied to an entire document.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DocumentCode {
    /// Display name of the document.
    pub document: String,
    pub code: Code,
    pub rationale: Option<String>,
}

/// Aggregate result of one analysis run.
///
/// Exactly one fact collection is populated, selected by `mode`. Facts are
/// append-only during the run and queryable afterwards.
#[derive(Clone, Debug)]
pub struct AnalysisResult {
    pub mode: AnalysisMode,
    pub code_book: CodeBook,
    pub sentence_codes: Vec<SentenceCode>,
    pub document_codes: Vec<DocumentCode>,
}

impl AnalysisResult {
    pub fn new(mode: AnalysisMode, code_book: CodeBook) -> Self {
        Self {
            mode,
            code_book,
            sentence_codes: Vec::new(),
            document_codes: Vec::new(),
        }
    }

    pub fn add_sentence_code(&mut self, fact: SentenceCode) {
        self.sentence_codes.push(fact);
    }

    pub fn add_document_code(&mut self, fact: DocumentCode) {
        self.document_codes.push(fact);
    }

    /// All codes applied to one sentence.
    pub fn codes_for_sentence(&self, sentence_id: &str) -> Vec<&SentenceCode> {
        self.sentence_codes
            .iter()
            .filter(|sc| sc.sentence_id == sentence_id)
            .collect()
    }

    /// All codes applied to one document.
    pub fn codes_for_document(&self, document: &str) -> Vec<&DocumentCode> {
        self.document_codes
            .iter()
            .filter(|dc| dc.document == document)
            .collect()
    }

    /// All sentence-level facts carrying a given code.
    pub fn sentences_for_code(&self, code_name: &str) -> Vec<&SentenceCode> {
        self.sentence_codes
            .iter()
            .filter(|sc| sc.code.name == code_name)
            .collect()
    }

    /// Number of facts for the active mode.
    pub fn fact_count(&self) -> usize {
        match self.mode {
            AnalysisMode::Coding => self.sentence_codes.len(),
            AnalysisMode::Categorization => self.document_codes.len(),
        }
    }
}
