//! Command-line interface for the harvester.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::completeness::Completeness;
use crate::config::{Category, HarvestConfig, Mode, ALL_CATEGORIES};
use crate::error::{HarvesterError, Result};
use crate::harvester::{HarvestEngine, HarvestReport};
use crate::listing::HttpListing;
use crate::sink::{JsonFileSink, ResultSink};
use crate::visitor::HttpItemFetcher;

/// Policy Harvester - Collect clinical policy bulletins from a paginated listing.
#[derive(Parser)]
#[command(name = "policy-harvester")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log progress at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Harvest every policy of a category (or `all`) into JSON.
    Harvest {
        /// Category to harvest, or `all`
        #[arg(short, long, default_value = "surgery")]
        category: String,

        /// Use the fixed interactive pacing instead of randomized delays
        #[arg(short, long)]
        interactive: bool,

        /// Output directory
        #[arg(short, long, default_value = "data/policies")]
        output: PathBuf,

        /// Number of concurrent item visits
        #[arg(short, long, default_value_t = 1)]
        workers: usize,
    },

    /// List the categories that can be harvested.
    Categories,
}

/// Run the CLI.
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Harvest {
            category,
            interactive,
            output,
            workers,
        } => harvest_command(&category, interactive, &output, workers),
        Commands::Categories => {
            categories_command();
            Ok(())
        }
    }
}

fn categories_command() {
    let config = HarvestConfig::default();
    for category in &config.categories {
        println!("{category}");
    }
    println!("{} (every category above)", style(ALL_CATEGORIES).dim());
}

/// Execute the harvest command.
fn harvest_command(
    selector: &str,
    interactive: bool,
    output: &Path,
    workers: usize,
) -> Result<()> {
    let mode = if interactive {
        Mode::Interactive
    } else {
        Mode::Automated
    };
    let config = HarvestConfig::builder().mode(mode).workers(workers).build()?;

    // Validate inputs before making HTTP requests
    let categories = config.select_categories(selector)?;
    if output.exists() && !output.is_dir() {
        return Err(HarvesterError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("Output path is not a directory: {}", output.display()),
        )));
    }

    let mut engine = HarvestEngine::http(&config)?;
    let mut sink = JsonFileSink::new(output);
    let mut first_error = None;

    for category in &categories {
        if let Err(e) = harvest_category(&mut engine, &mut sink, category) {
            eprintln!(
                "{} {}: {e}",
                style("Failed").red().bold(),
                style(category).cyan()
            );
            first_error.get_or_insert(e);
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn harvest_category<S: ResultSink>(
    engine: &mut HarvestEngine<HttpListing, HttpItemFetcher>,
    sink: &mut S,
    category: &Category,
) -> Result<()> {
    println!("{} {}", style("Harvesting").bold(), style(category).cyan());

    let pb = ProgressBar::new_spinner();
    #[allow(clippy::expect_used)] // Static template string that is guaranteed to be valid
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .expect("valid template"),
    );
    pb.set_message("Walking listing pages...");
    pb.enable_steady_tick(std::time::Duration::from_millis(100));

    let report = match engine.harvest(category) {
        Ok(report) => report,
        Err(e) => {
            pb.finish_and_clear();
            return Err(e);
        }
    };

    pb.set_message("Saving records...");
    let saved = sink.append(category, &report.records);
    pb.finish_and_clear();

    print_report(&report);
    let path = saved?;
    println!(
        "{} {}",
        style("Saved to:").green().bold(),
        path.display()
    );
    println!();

    match report.aborted {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn print_report(report: &HarvestReport) {
    println!("  Declared: {}", report.declared_count);
    println!("  Pages: {}", report.pages_seen);
    println!("  Visited: {}", report.visited.len());
    println!("  Records: {}", style(report.records.len()).green());
    if !report.failures.is_empty() {
        println!(
            "  Failed visits: {}",
            style(report.failures.len()).yellow().bold()
        );
        for failed in &report.failures {
            println!("    {} ({})", failed.identifier, failed.failure);
        }
    }
    match &report.completeness {
        Completeness::Completed => println!("  Completeness: {}", style("complete").green()),
        gap => println!("  Completeness: {}", style(gap).yellow().bold()),
    }
    if let Some(e) = &report.aborted {
        println!("  {} {e}", style("Aborted:").red().bold());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_harvest_defaults() {
        let cli = Cli::parse_from(["policy-harvester", "harvest"]);

        let Commands::Harvest {
            category,
            interactive,
            output,
            workers,
        } = cli.command
        else {
            panic!("expected harvest command");
        };
        assert_eq!(category, "surgery");
        assert!(!interactive);
        assert_eq!(output, PathBuf::from("data/policies"));
        assert_eq!(workers, 1);
        assert!(!cli.verbose);
    }

    #[test]
    fn test_cli_parse_harvest_all_interactive() {
        let cli = Cli::parse_from([
            "policy-harvester",
            "--verbose",
            "harvest",
            "--category",
            "all",
            "--interactive",
            "--workers",
            "4",
        ]);

        assert!(cli.verbose);
        let Commands::Harvest {
            category,
            interactive,
            workers,
            ..
        } = cli.command
        else {
            panic!("expected harvest command");
        };
        assert_eq!(category, "all");
        assert!(interactive);
        assert_eq!(workers, 4);
    }

    #[test]
    fn test_invalid_category_rejected_before_requests() {
        let dir = tempfile::tempdir().unwrap();
        let result = harvest_command("dentistry", false, dir.path(), 1);
        assert!(matches!(
            result,
            Err(HarvesterError::InvalidCategory { .. })
        ));
    }
}
