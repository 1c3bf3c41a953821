//! accredit CLI — the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "accredit",
    version,
    about = "Marks workflow and outcome attainment engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate dataset TOML files
    Validate {
        /// Path to a dataset file or directory
        #[arg(long)]
        dataset: PathBuf,
    },

    /// Compute CO and PO attainment for a dataset
    Attainment {
        /// Path to a dataset file
        #[arg(long)]
        dataset: PathBuf,

        /// Only this subject assignment's COs
        #[arg(long)]
        subject: Option<String>,

        /// Only this department's subjects and POs
        #[arg(long)]
        department: Option<String>,

        /// Directory to save the JSON report in
        #[arg(long)]
        output: Option<PathBuf>,

        /// Output format: text, json, markdown
        #[arg(long, default_value = "text")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Compute final marks, and SGPA/CGPA once published
    Results {
        /// Path to a dataset file
        #[arg(long)]
        dataset: PathBuf,

        /// Only this student
        #[arg(long)]
        student: Option<String>,

        /// Publish the computed final marks and report grade-point averages
        #[arg(long)]
        publish: bool,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Compare two attainment reports
    Compare {
        /// Baseline report JSON
        #[arg(long)]
        baseline: PathBuf,

        /// Current report JSON
        #[arg(long)]
        current: PathBuf,

        /// Regression threshold in percentage points
        #[arg(long, default_value = "5.0")]
        threshold: f64,

        /// Exit code 1 if regressions found
        #[arg(long)]
        fail_on_regression: bool,

        /// Output format: text, json, markdown
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Print the active grading scale
    Scale {
        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create starter config and example dataset
    Init,
}

#[tokio::main]
async fn main() {
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    let filter = match "accredit=info".parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { dataset } => commands::validate::execute(dataset),
        Commands::Attainment {
            dataset,
            subject,
            department,
            output,
            format,
            config,
        } => {
            commands::attainment::execute(dataset, subject, department, output, format, config)
                .await
        }
        Commands::Results {
            dataset,
            student,
            publish,
            config,
        } => commands::results::execute(dataset, student, publish, config).await,
        Commands::Compare {
            baseline,
            current,
            threshold,
            fail_on_regression,
            format,
        } => commands::compare::execute(baseline, current, threshold, fail_on_regression, format),
        Commands::Scale { config } => commands::scale::execute(config),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
