//! Command-line interface for the annotator.

use std::path::PathBuf;

use clap::Parser;
use console::style;

use crate::annotator::{AnnotationSummary, Annotator};
use crate::client::OpenAiClient;
use crate::config::{validate_model_tag, ExtractorConfig, DEFAULT_MODEL};
use crate::error::Result;
use crate::extractor::{CriteriaExtractor, LlmCriteriaExtractor};

/// Policy Annotator - Extract ALL/ANY criteria trees from harvested policies.
#[derive(Parser)]
#[command(name = "policy-annotator")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Records file, or a directory of `*.json` record files, to annotate in place
    #[arg(short, long, conflicts_with = "text", required_unless_present = "text")]
    pub data: Option<PathBuf>,

    /// Extract criteria from a single position statement and print them
    #[arg(short, long)]
    pub text: Option<String>,

    /// Model used for extraction
    #[arg(short, long, default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Log progress at debug level
    #[arg(short, long)]
    pub verbose: bool,
}

/// Run the CLI.
pub async fn run(cli: Cli) -> Result<()> {
    // Validate inputs before any request is made
    validate_model_tag(&cli.model)?;
    let config = ExtractorConfig::from_env()?;
    let client = OpenAiClient::new(&config)?;
    let extractor = LlmCriteriaExtractor::new(&client, &config);

    if let Some(text) = &cli.text {
        let criteria = extractor.extract(text, &cli.model).await?;
        println!("{}", serde_json::to_string_pretty(&criteria)?);
        return Ok(());
    }

    if let Some(data) = &cli.data {
        println!(
            "{} {} with {}",
            style("Annotating").bold(),
            style(data.display()).cyan(),
            style(&cli.model).green()
        );
        let summary = Annotator::new(&extractor, cli.model.as_str())
            .annotate_path(data)
            .await?;
        print_summary(&summary);
    }

    Ok(())
}

fn print_summary(summary: &AnnotationSummary) {
    println!();
    println!("  Files: {}", summary.files);
    println!("  Records: {}", summary.total);
    println!("  Annotated: {}", style(summary.annotated).green());
    if summary.failed > 0 {
        println!("  Failed: {}", style(summary.failed).yellow().bold());
    }
    if summary.skipped > 0 {
        println!("  Skipped (no body): {}", style(summary.skipped).dim());
    }
    if summary.failed_files > 0 {
        println!(
            "  Unreadable files: {}",
            style(summary.failed_files).yellow().bold()
        );
    }
}
