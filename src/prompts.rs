//! Prompt templates for every model-calling stage.
//!
//! Each builder returns a `(system_prompt, user_prompt)` pair. The schema
//! hints describe the JSON object expected from schema-constrained calls and
//! are passed alongside the user prompt (see [`crate::llm::generate_json`]).

use crate::models::{Code, HierarchyDepth, Sentence};

/// Format a sentence listing as `id: text` lines.
pub fn sentence_list(sentences: &[Sentence]) -> String {
    sentences
        .iter()
        .map(|s| format!("{}: {}", s.id, s.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Format a code listing; `with_criteria` adds each code's application
/// criteria on an indented line.
pub fn code_list(codes: &[Code], with_criteria: bool) -> String {
    codes
        .iter()
        .map(|c| {
            if with_criteria {
                format!("- {}: {}\n  Criteria: {}", c.name, c.description, c.criteria)
            } else {
                format!("- {}: {}", c.name, c.description)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prompts for reading one document and updating the working notes.
pub fn read_document(
    mode: &str,
    user_context: &str,
    doc_name: &str,
    doc_content: &str,
    current_notes: &str,
) -> (String, String) {
    let mut system = format!(
        "You are analyzing documents for inductive {mode}.\n\n\
         Your task is to read documents carefully and take notes about:\n\
         1. Key themes, patterns, or categories that emerge\n\
         2. Important concepts or ideas relevant to the research question\n\
         3. Potential codes that could be used to categorize this content\n\n\
         Provide your notes in a clear, structured format. These notes will \
         serve as your long-term memory for synthesizing a code book later."
    );

    if !current_notes.is_empty() {
        system.push_str(&format!(
            "\n\nYour current notes (long-term memory):\n{current_notes}\n\n\
             You can update or expand these notes based on the new document. \
             Return the full updated notes, not just additions."
        ));
    }

    let user = format!(
        "Research question and context:\n{user_context}\n\n\
         Document to analyze: {doc_name}\n\nContent:\n{doc_content}"
    );

    (system, user)
}

/// Prompts for deriving the code book from the final notes.
pub fn create_codebook(
    mode: &str,
    user_context: &str,
    all_notes: &str,
    hierarchy: HierarchyDepth,
) -> (String, String) {
    let hierarchy_instruction = match hierarchy {
        HierarchyDepth::Flat => "Produce a flat list of codes with no parent codes.",
        HierarchyDepth::TwoLevel => {
            "You may group codes under parent codes, at most two levels deep \
             (a parent code and its direct children). Set \"parent\" to the \
             parent code's name, or null for top-level codes."
        }
        HierarchyDepth::Arbitrary => {
            "You may organize codes into a hierarchy of any depth. Set \
             \"parent\" to the parent code's name, or null for top-level codes."
        }
    };

    let system = format!(
        "You are creating a code book for inductive {mode} analysis.\n\n\
         Create a comprehensive code book with codes that:\n\
         1. Capture the key themes, patterns, and categories in the data\n\
         2. Are relevant to the user's research question\n\
         3. Have clear criteria for when to apply each code\n\
         4. Are mutually exclusive where possible but can overlap when necessary\n\n\
         {hierarchy_instruction}\n\n\
         Provide 5-10 codes that will be most useful for analyzing this data."
    );

    let user = format!(
        "Research question and context:\n{user_context}\n\n\
         Your notes from reading all documents:\n{all_notes}"
    );

    (system, user)
}

pub const CODEBOOK_SCHEMA: &str = r#"{
  "codes": [
    {
      "name": "short descriptive name",
      "description": "what this code represents",
      "criteria": "when to apply this code",
      "parent": "name of the parent code, or null"
    }
  ]
}"#;

/// Prompts for the per-document chunking decision.
pub fn chunking_decision(
    doc_name: &str,
    sentence_listing: &str,
    code_listing: &str,
) -> (String, String) {
    let system = "You are analyzing a document for coding.\n\n\
                  Decide whether to:\n\
                  1. Process the entire document at once (if it is short or highly cohesive)\n\
                  2. Divide it into chunks (if it is long or covers multiple topics)\n\n\
                  If chunking, specify the start and end sentence IDs for each chunk and \
                  whether each chunk is relevant for coding based on the code book. \
                  Irrelevant sections can be skipped entirely, which saves analysis effort."
        .to_string();

    let user = format!(
        "Code book:\n{code_listing}\n\n\
         Document: {doc_name}\nSentences:\n{sentence_listing}"
    );

    (system, user)
}

pub const CHUNKING_SCHEMA: &str = r#"{
  "should_chunk": true,
  "chunks": [
    {
      "start_sentence_id": "id of the first sentence in the chunk",
      "end_sentence_id": "id of the last sentence in the chunk",
      "should_code": true
    }
  ]
}"#;

/// Prompts for applying codes to one chunk's sentences.
pub fn code_chunk(sentence_listing: &str, code_listing: &str) -> (String, String) {
    let system = "Apply codes to sentences in this chunk.\n\n\
                  For each sentence that matches one or more codes:\n\
                  1. Identify the sentence ID\n\
                  2. Apply the appropriate code(s)\n\
                  3. Provide a brief rationale\n\n\
                  A sentence may carry several codes; apply every code that fits. \
                  Return all sentence-code pairs for this chunk."
        .to_string();

    let user = format!("Code book:\n{code_listing}\n\nSentences:\n{sentence_listing}");

    (system, user)
}

pub const SENTENCE_CODES_SCHEMA: &str = r#"{
  "codes": [
    {
      "sentence_id": "id of the sentence",
      "code_name": "name of the code to apply",
      "rationale": "why this code was applied"
    }
  ]
}"#;

/// Prompts for categorizing one whole document.
pub fn categorize_document(
    doc_name: &str,
    doc_content: &str,
    code_listing: &str,
) -> (String, String) {
    let system = "Categorize this document using the code book.\n\n\
                  Apply all relevant codes to the document. You can apply multiple \
                  codes if appropriate. For each code applied, provide a brief rationale."
        .to_string();

    let user = format!(
        "Code book:\n{code_listing}\n\n\
         Document: {doc_name}\nContent:\n{doc_content}"
    );

    (system, user)
}

pub const DOCUMENT_CODES_SCHEMA: &str = r#"{
  "code_names": ["names of codes that apply to this document"],
  "rationales": {"code name": "why this code applies"}
}"#;
