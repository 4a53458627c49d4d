mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_FAILURE, EXIT_MANIFEST_ERROR};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "skarv",
    version,
    about = "Concurrent batch uploader for simulation case results"
)]
struct Cli {
    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Discover result files and upload them to the case in the archive.
    Upload {
        /// Path to the case manifest YAML file.
        manifest: PathBuf,
        /// Glob pattern for result files, relative to the case directory (repeatable).
        #[arg(long = "search", required = true)]
        search: Vec<String>,
        /// Number of parallel upload workers.
        #[arg(long, default_value_t = skarv_core::DEFAULT_WORKERS)]
        workers: usize,
        /// Batch passes over still-failing files before giving up.
        #[arg(long, default_value_t = skarv_core::DEFAULT_MAX_ATTEMPTS)]
        attempts: usize,
        /// Register the case first if the archive does not know it yet.
        #[arg(long, default_value_t = false)]
        register: bool,
        /// Archive URL (overrides SKARV_ARCHIVE_URL and the config file).
        #[arg(long)]
        remote: Option<String>,
    },
    /// Register the case with the archive without uploading anything.
    Register {
        /// Path to the case manifest YAML file.
        manifest: PathBuf,
        /// Register even when the case already resolves remotely.
        #[arg(long, default_value_t = false)]
        force: bool,
        /// Archive URL (overrides SKARV_ARCHIVE_URL and the config file).
        #[arg(long)]
        remote: Option<String>,
    },
    /// List the files a pattern would upload, without touching the network.
    Scan {
        /// Path to the case manifest YAML file.
        manifest: PathBuf,
        /// Glob pattern for result files, relative to the case directory (repeatable).
        #[arg(long = "search", required = true)]
        search: Vec<String>,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("SKARV_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .init();

    let json_output = cli.json;

    let result = match cli.command {
        Commands::Upload {
            manifest,
            search,
            workers,
            attempts,
            register,
            remote,
        } => commands::upload::run(
            &manifest,
            &search,
            workers,
            attempts,
            register,
            remote.as_deref(),
            json_output,
        ),
        Commands::Register {
            manifest,
            force,
            remote,
        } => commands::register::run(&manifest, force, remote.as_deref(), json_output),
        Commands::Scan { manifest, search } => commands::scan::run(&manifest, &search, json_output),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("manifest error:") {
                EXIT_MANIFEST_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}
