//! # Inductive Coder CLI (`icode`)
//!
//! The `icode` binary runs LLM-driven inductive coding over a directory of
//! text documents.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `icode analyze` | Full run: derive a code book (or load one), apply codes, save results |
//! | `icode codebook` | Stage 1 only: derive and save a code book |
//! | `icode show` | Print a saved result with its derived groupings |
//!
//! ## Examples
//!
//! ```bash
//! # Full coding run over a directory of interviews
//! icode analyze --mode coding --input ./interviews --context-file ./question.txt
//!
//! # Categorize documents against an existing code book
//! icode analyze --mode categorization --input ./tickets \
//!     --code-book ./output/code_book.json
//!
//! # Derive a two-level code book without applying it
//! icode codebook --mode coding --input ./interviews \
//!     --context-file ./question.txt --hierarchy two-level
//!
//! # Inspect a finished run
//! icode show --output ./output
//! ```
//!
//! All commands accept `--config` pointing to a TOML configuration file; a
//! missing file falls back to defaults, so only `OPENAI_API_KEY` is required.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use inductive_coder::analyze;
use inductive_coder::config;
use inductive_coder::models::{AnalysisMode, HierarchyDepth};
use inductive_coder::progress::ProgressMode;

/// Inductive Coder — LLM-based inductive coding for qualitative research.
#[derive(Parser)]
#[command(
    name = "icode",
    about = "Inductive Coder — LLM-based inductive coding for qualitative research",
    version,
    long_about = "Inductive Coder reads a corpus of text documents against a research \
    question, derives a code book with an LLM, and applies the codes at sentence \
    granularity (coding) or document granularity (categorization)."
)]
struct Cli {
    /// Path to configuration file (TOML). Missing file falls back to defaults.
    #[arg(long, global = true, default_value = "./icode.toml")]
    config: PathBuf,

    /// Progress output on stderr. Defaults to human when stderr is a TTY.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Run the full analysis and save results.
    ///
    /// Derives a code book from the documents (or loads an existing one with
    /// `--code-book`, skipping the reading stage), applies codes per the
    /// chosen mode, and writes the code book, fact list, and summary to the
    /// output directory.
    Analyze {
        /// Analysis mode: coding (sentence-level) or categorization (document-level).
        #[arg(long, short, value_enum)]
        mode: AnalysisMode,

        /// Directory containing documents to analyze (*.txt, *.md by default).
        #[arg(long, short)]
        input: PathBuf,

        /// File containing the research question and context.
        #[arg(long, short = 'p')]
        context_file: Option<PathBuf>,

        /// Existing code book JSON — skips the reading stage.
        #[arg(long, short)]
        code_book: Option<PathBuf>,

        /// Code hierarchy policy for a newly derived code book.
        #[arg(long, value_enum, default_value = "flat")]
        hierarchy: HierarchyDepth,

        /// Output directory for results.
        #[arg(long, short, default_value = "./output")]
        output: PathBuf,

        /// Override the configured maximum concurrent document units.
        #[arg(long)]
        max_concurrent: Option<usize>,
    },

    /// Derive and save a code book without applying it.
    Codebook {
        /// Analysis mode the code book is intended for.
        #[arg(long, short, value_enum)]
        mode: AnalysisMode,

        /// Directory containing documents to read.
        #[arg(long, short)]
        input: PathBuf,

        /// File containing the research question and context.
        #[arg(long, short = 'p')]
        context_file: Option<PathBuf>,

        /// Code hierarchy policy.
        #[arg(long, value_enum, default_value = "flat")]
        hierarchy: HierarchyDepth,

        /// Where to write the code book JSON.
        #[arg(long, short, default_value = "./output/code_book.json")]
        output: PathBuf,
    },

    /// Print a saved analysis result.
    Show {
        /// Output directory of a previous run.
        #[arg(long, short, default_value = "./output")]
        output: PathBuf,
    },
}

/// Read the research context from a file, or fall back to a generic default.
fn load_user_context(context_file: Option<&PathBuf>) -> Result<String> {
    match context_file {
        Some(path) => {
            let content = std::fs::read_to_string(path).map_err(|e| {
                anyhow::anyhow!("Failed to read context file {}: {}", path.display(), e)
            })?;
            Ok(content)
        }
        None => {
            eprintln!("Warning: no context file specified, using a generic research context.");
            Ok("Analyze the documents and identify key themes and patterns.".to_string())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_or_default(&cli.config)?;
    let progress_mode = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);
    let reporter = progress_mode.reporter();

    match cli.command {
        Commands::Analyze {
            mode,
            input,
            context_file,
            code_book,
            hierarchy,
            output,
            max_concurrent,
        } => {
            let user_context = load_user_context(context_file.as_ref())?;
            analyze::run_analyze(
                &cfg,
                mode,
                &input,
                &user_context,
                code_book.as_deref(),
                hierarchy,
                &output,
                max_concurrent,
                reporter.as_ref(),
            )
            .await?;
        }
        Commands::Codebook {
            mode,
            input,
            context_file,
            hierarchy,
            output,
        } => {
            let user_context = load_user_context(context_file.as_ref())?;
            analyze::run_codebook(
                &cfg,
                mode,
                &input,
                &user_context,
                hierarchy,
                &output,
                reporter.as_ref(),
            )
            .await?;
        }
        Commands::Show { output } => {
            analyze::run_show(&output)?;
        }
    }

    Ok(())
}
