//! Filesystem document loading.
//!
//! Walks an input directory, filters files through include/exclude glob sets,
//! and parses each match into a [`Document`] with its derived sentence
//! sequence. Ordering is lexicographic by relative path so repeated runs over
//! the same directory see the same document sequence — the reading stage's
//! notes depend on it.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use crate::config::DocumentsConfig;
use crate::models::Document;

/// Load all matching documents under `dir`, in deterministic order.
///
/// Fails if the directory does not exist. An empty result is not an error
/// here; the pipeline fails fast on it before any model call.
pub fn load_documents(dir: &Path, config: &DocumentsConfig) -> Result<Vec<Document>> {
    if !dir.exists() {
        bail!("Input directory not found: {}", dir.display());
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut entries = Vec::new();

    for entry in WalkDir::new(dir) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(dir).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) {
            continue;
        }
        if !include_set.is_match(&rel_str) {
            continue;
        }

        entries.push((rel_str, path.to_path_buf()));
    }

    // Sort for deterministic ordering
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut documents = Vec::with_capacity(entries.len());
    for (_, path) in entries {
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                eprintln!("Warning: skipping unreadable file {}: {}", path.display(), e);
                continue;
            }
        };
        documents.push(Document::new(path, content));
    }

    Ok(documents)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_documents_deterministic_order() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("gamma.txt"), "third").unwrap();
        fs::write(tmp.path().join("alpha.txt"), "first").unwrap();
        fs::write(tmp.path().join("beta.md"), "second").unwrap();
        fs::write(tmp.path().join("ignored.csv"), "not a document").unwrap();

        let docs = load_documents(tmp.path(), &DocumentsConfig::default()).unwrap();
        let names: Vec<&str> = docs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["alpha.txt", "beta.md", "gamma.txt"]);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        assert!(load_documents(&missing, &DocumentsConfig::default()).is_err());
    }

    #[test]
    fn test_empty_directory_yields_no_documents() {
        let tmp = TempDir::new().unwrap();
        let docs = load_documents(tmp.path(), &DocumentsConfig::default()).unwrap();
        assert!(docs.is_empty());
    }

    #[test]
    fn test_exclude_globs_apply() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("drafts")).unwrap();
        fs::write(tmp.path().join("keep.txt"), "keep").unwrap();
        fs::write(tmp.path().join("drafts/skip.txt"), "skip").unwrap();

        let config = DocumentsConfig {
            exclude_globs: vec!["drafts/**".to_string()],
            ..DocumentsConfig::default()
        };
        let docs = load_documents(tmp.path(), &config).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].name, "keep.txt");
    }

    #[test]
    fn test_sentences_parsed_at_load() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("interview.txt"), "Line one.\n\nLine three.").unwrap();

        let docs = load_documents(tmp.path(), &DocumentsConfig::default()).unwrap();
        assert_eq!(docs[0].sentences.len(), 2);
        assert_eq!(docs[0].sentences[1].id, "interview_3");
    }
}
