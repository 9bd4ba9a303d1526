//! # Inductive Coder
//!
//! An LLM-driven inductive coding tool for qualitative text analysis.
//!
//! Inductive Coder reads a corpus of text documents against a free-text
//! research question, derives a code book (named categories with
//! descriptions and application criteria), and applies those codes either at
//! sentence granularity ("coding") or whole-document granularity
//! ("categorization").
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌─────────────────┐   ┌──────────────────┐
//! │ Documents │──▶│ Reading (seq.)  │──▶│    Code book     │
//! │ load+sort │   │ notes ⟳ per doc │   │  (one per run)   │
//! └───────────┘   └─────────────────┘   └────────┬─────────┘
//!                                                │
//!                     ┌──────────────────────────┤
//!                     ▼ fan-out (≤ N in flight)  ▼
//!               ┌───────────────┐        ┌───────────────┐
//!               │ chunk-decide  │        │  categorize   │
//!               │ then code     │        │  whole doc    │
//!               └───────┬───────┘        └───────┬───────┘
//!                       └──────────┬─────────────┘
//!                                  ▼ fan-in
//!                          ┌──────────────┐
//!                          │ JSON results │
//!                          └──────────────┘
//! ```
//!
//! Stage 1 is strictly sequential: each document's prompt embeds the notes
//! produced by the previous document, a true data dependency. Stage 2's
//! per-document units are independent and run concurrently under a bounded
//! admission gate.
//!
//! ## Quick Start
//!
//! ```bash
//! export OPENAI_API_KEY=sk-...
//! icode analyze --mode coding --input ./interviews --context-file ./question.txt
//! icode show --output ./output
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`documents`] | Filesystem document loading |
//! | [`llm`] | Model-call gateway (trait + OpenAI implementation) |
//! | [`prompts`] | Prompt templates |
//! | [`reading`] | Stage 1: sequential reading and code-book derivation |
//! | [`chunking`] | Per-document chunk decision |
//! | [`coding`] | Code application (both modes) |
//! | [`runner`] | Fan-out/fan-in concurrency controller |
//! | [`store`] | Code-book and result persistence |
//! | [`progress`] | Stage progress reporting |
//! | [`error`] | Error taxonomy |

pub mod analyze;
pub mod chunking;
pub mod coding;
pub mod config;
pub mod documents;
pub mod error;
pub mod llm;
pub mod models;
pub mod progress;
pub mod prompts;
pub mod reading;
pub mod runner;
pub mod store;
