mod check;
mod config;
mod plan;
mod script;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Course plan validation toolchain.
#[derive(Parser)]
#[command(name = "courseplan", version, about = "Course plan validation toolchain")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a catalog document: ids, path lists and requirement trees
    Check {
        /// Path to the catalog JSON file
        catalog: PathBuf,
    },

    /// Replay a plan script against a catalog and print the outcomes
    Plan {
        /// Path to the catalog JSON file
        catalog: PathBuf,
        /// Programme to load (repeatable; exactly one must be a major)
        #[arg(long = "programme", required = true)]
        programmes: Vec<String>,
        /// Path to the plan script JSON file
        #[arg(long)]
        script: PathBuf,
        /// Engine configuration TOML file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Commands::Check { catalog } => {
            check::cmd_check(&catalog, cli.output, cli.quiet);
        }
        Commands::Plan {
            catalog,
            programmes,
            script,
            config,
        } => {
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    report_error(&format!("failed to start runtime: {}", e), cli.output, cli.quiet);
                    process::exit(1);
                }
            };
            rt.block_on(plan::cmd_plan(plan::PlanOptions {
                catalog: &catalog,
                programmes: &programmes,
                script: &script,
                config: config.as_deref(),
                output: cli.output,
                quiet: cli.quiet,
            }));
        }
    }
}

/// Log to stderr so stdout stays machine-readable. `COURSEPLAN_LOG` takes
/// an `EnvFilter` directive; the default is `warn`.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("COURSEPLAN_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}

pub(crate) fn exit_with(msg: &str, output: OutputFormat, quiet: bool) -> ! {
    report_error(msg, output, quiet);
    process::exit(1);
}

/// Read and parse a catalog document, exiting on failure.
pub(crate) fn read_catalog(
    path: &std::path::Path,
    output: OutputFormat,
    quiet: bool,
) -> courseplan_catalog::CatalogDocument {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            report_error(
                &format!("error reading file '{}': {}", path.display(), e),
                output,
                quiet,
            );
            process::exit(1);
        }
    };
    match courseplan_catalog::CatalogDocument::parse(&text) {
        Ok(doc) => doc,
        Err(e) => {
            report_error(&format!("{}: {}", path.display(), e), output, quiet);
            process::exit(1);
        }
    }
}
