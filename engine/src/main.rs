//! Trackflow CLI - run declarative playlist pipelines
//!
//! # Commands
//!
//! ```bash
//! trackflow run weekly.yaml                      # Run against Spotify
//! trackflow run weekly.yaml --catalog lib.json   # Run against a local catalog
//! trackflow validate weekly.yaml                 # Check a definition
//! trackflow steps                                # List available steps
//! trackflow schema                               # Print the definition schema
//! trackflow serve --port 3000                    # Start HTTP server
//! ```

use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trackflow::{
    api::logs::{log_info, log_success},
    compose_pipeline_schema, load_pipeline, run_pipeline, Executor, FileSink, MemoryProvider, PipelineValidator,
    Provider, RunOptions, SpotifyProvider, StepRegistry,
};

#[derive(Parser)]
#[command(name = "trackflow")]
#[command(about = "Run declarative playlist pipelines", long_about = None)]
struct Cli {
    /// Log level (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate and run a pipeline definition
    Run {
        /// Pipeline definition (JSON or YAML)
        pipeline: PathBuf,

        /// Serve tracks from a local catalog file instead of Spotify
        #[arg(short, long)]
        catalog: Option<PathBuf>,

        /// Directory export files are written to
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Seed for reproducible shuffles
        #[arg(short, long)]
        seed: Option<u64>,

        /// Write the run report (JSON) to this file
        #[arg(short, long)]
        report: Option<PathBuf>,
    },

    /// Validate a pipeline definition without running it
    Validate {
        /// Pipeline definition (JSON or YAML)
        pipeline: PathBuf,
    },

    /// List available steps and their config fields
    Steps,

    /// Print the JSON Schema for pipeline definitions
    Schema,

    /// Start HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("trackflow={}", cli.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = match cli.command {
        Commands::Run {
            pipeline,
            catalog,
            output_dir,
            seed,
            report,
        } => {
            let options = RunOptions::from_env().map(|o| {
                o.with_catalog(catalog)
                    .with_output_dir(output_dir)
                    .with_seed(seed)
                    .with_report(report)
            });
            match options {
                Ok(options) => cmd_run(&pipeline, &options).await,
                Err(e) => Err(e.into()),
            }
        }

        Commands::Validate { pipeline } => cmd_validate(&pipeline),

        Commands::Steps => cmd_steps(),

        Commands::Schema => cmd_schema(),

        Commands::Serve { port } => match RunOptions::from_env() {
            Ok(options) => cmd_serve(options.with_port(port).port).await,
            Err(e) => Err(e.into()),
        },
    };

    if let Err(e) = result {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn cmd_run(pipeline: &Path, options: &RunOptions) -> Result<(), Box<dyn std::error::Error>> {
    log_info(format!("Loading pipeline: {}", pipeline.display()));
    let document = load_pipeline(pipeline)?;

    let provider: Box<dyn Provider> = match &options.catalog {
        Some(catalog) => {
            log_info(format!("Using catalog: {}", catalog.display()));
            Box::new(MemoryProvider::from_file(catalog).await?)
        }
        None => Box::new(SpotifyProvider::from_env()?),
    };
    let sink = FileSink::new(&options.output_dir);
    let registry = StepRegistry::builtin();

    let mut executor = Executor::new(provider.as_ref(), &sink);
    if let Some(seed) = options.seed {
        executor = executor.with_seed(seed);
    }

    let report = run_pipeline(&document, &registry, &mut executor).await?;
    for step in &report.steps {
        match step.produced {
            Some(count) => log_info(format!("  {} ({}): {} tracks", step.key, step.step_type, count)),
            None => log_info(format!("  {} ({}): done", step.key, step.step_type)),
        }
    }

    if let Some(path) = &options.report {
        fs::write(path, serde_json::to_string_pretty(&report)?)?;
        log_success(format!("Report written to: {}", path.display()));
    }

    Ok(())
}

fn cmd_validate(pipeline: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let document = load_pipeline(pipeline)?;
    let validator = PipelineValidator::new(&StepRegistry::builtin())?;

    match validator.validate(&document) {
        Ok(()) => {
            log_success(format!("{} is valid", pipeline.display()));
            Ok(())
        }
        Err(errors) => {
            for violation in errors.violations() {
                eprintln!("  {}", violation);
            }
            Err(format!("{} has {} violation(s)", pipeline.display(), errors.violations().len()).into())
        }
    }
}

fn cmd_steps() -> Result<(), Box<dyn std::error::Error>> {
    for info in StepRegistry::builtin().describe() {
        println!("{}", info.id);
        println!("    {}", info.description);
        for field in info.config.fields() {
            let marker = if field.required { " (required)" } else { "" };
            println!("    - {}{}", field.name, marker);
        }
        if !info.config.any_of().is_empty() {
            println!("    at least one of: {}", info.config.any_of().join(", "));
        }
        println!();
    }
    Ok(())
}

fn cmd_schema() -> Result<(), Box<dyn std::error::Error>> {
    let schema = compose_pipeline_schema(&StepRegistry::builtin());
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

async fn cmd_serve(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    trackflow::server::start_server(port).await
}
