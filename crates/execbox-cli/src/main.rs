//! Execbox CLI
//!
//! Runs code snippets locally or serves the remote code execution API.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use execbox::{Config, EXAMPLE_CONFIG, ExecutionRequest, Executor, Language};
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;

mod server;

#[derive(Parser)]
#[command(name = "execbox")]
#[command(about = "Compile and run code snippets in throwaway, time-bounded processes")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:5000")]
        bind: SocketAddr,

        /// How many higher ports to try if the port is taken
        #[arg(long, default_value_t = 10)]
        port_retries: u16,
    },

    /// Run a source file (compile if needed, then execute)
    Run {
        /// Source file to run
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Language (cpp, java, javascript, python)
        #[arg(short, long)]
        language: String,

        /// File whose contents are fed to stdin
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Expected entry type name (Java)
        #[arg(short, long)]
        entrypoint: Option<String>,
    },

    /// List supported languages and toolchain availability
    Languages,

    /// Initialize a new configuration file
    Init {
        /// Output path
        #[arg(short, long, default_value = "execbox.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Show the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
    } else {
        debug!("using default configuration");
    }
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Serve { bind, port_retries } => {
            let executor = Arc::new(Executor::new(config));
            server::serve(executor, bind, port_retries).await
        }
        Commands::Run {
            source,
            language,
            input,
            entrypoint,
        } => {
            run_file(
                config,
                &source,
                &language,
                input.as_deref(),
                entrypoint,
            )
            .await
        }
        Commands::Languages => {
            list_languages(&Executor::new(config));
            Ok(())
        }
        Commands::Init { output, force } => init_config(&output, force).await,
        Commands::ShowConfig => {
            show_config(&config);
            Ok(())
        }
    }
}

async fn run_file(
    config: Config,
    source: &Path,
    language: &str,
    input: Option<&Path>,
    entrypoint: Option<String>,
) -> Result<()> {
    let language: Language = language.parse()?;

    let code = tokio::fs::read_to_string(source)
        .await
        .context("failed to read source file")?;

    let mut request = ExecutionRequest::new(language, code);
    if let Some(path) = input {
        let stdin = tokio::fs::read_to_string(path)
            .await
            .context("failed to read input file")?;
        request = request.with_stdin(stdin);
    }
    if let Some(name) = entrypoint {
        request = request.with_entrypoint_hint(name);
    }

    info!(%language, "running program");
    let result = Executor::new(config)
        .execute(request)
        .await
        .context("execution failed")?;

    if !result.stdout.is_empty() {
        println!("{}", result.stdout);
    }
    if !result.stderr.is_empty() {
        eprintln!("{}", result.stderr);
    }

    // Log execution info via tracing (stderr), keeping stdout clean for piping
    info!(
        exit_status = result.exit_status,
        signal = result.signal,
        timed_out = result.timed_out,
        diagnostic = ?result.diagnostic.as_ref().map(|d| d.kind),
        "execution result"
    );

    if result.is_success() {
        Ok(())
    } else {
        std::process::exit(result.exit_status.filter(|code| *code != 0).unwrap_or(1));
    }
}

fn list_languages(executor: &Executor) {
    println!("Supported languages:\n");

    for status in executor.toolchains() {
        let binaries: Vec<String> = status
            .binaries
            .iter()
            .map(|binary| match binary.path {
                Some(ref path) => format!("{} ({})", binary.name, path.display()),
                None => format!("{} (missing)", binary.name),
            })
            .collect();
        println!(
            "  {:<12} {:<12} {:<22} {}",
            status.language.tag(),
            status.language.display_name(),
            status.kind,
            binaries.join(", ")
        );
    }
}

fn show_config(config: &Config) {
    println!("Workspace root: {}", config.workspace_root().display());
    println!("Run timeout: {} ms", config.timeout_ms);
    println!("Compile timeout: {} ms", config.compile_timeout_ms);
    println!("Max output per stream: {} bytes", config.max_output_bytes);
    match config.concurrency_limit() {
        Some(limit) => println!("Max concurrent requests: {limit}"),
        None => println!("Max concurrent requests: unbounded"),
    }
    println!();
    if config.cache.enabled {
        println!(
            "Artifact cache: {} (ttl {} s)",
            config.cache.cache_dir().display(),
            config.cache.ttl_secs
        );
    } else {
        println!("Artifact cache: disabled");
    }
    println!();

    let toolchains = &config.toolchains;
    println!(
        "C++:        {} -std={} {}",
        toolchains.native.compiler, toolchains.native.standard, toolchains.native.source_name
    );
    println!(
        "Java:       {} / {} (default entry {})",
        toolchains.jvm.compiler, toolchains.jvm.runtime, toolchains.jvm.default_entry
    );
    println!(
        "JavaScript: {} {}",
        toolchains.scripting.interpreter, toolchains.scripting.source_name
    );
    println!(
        "Python:     {} {}",
        toolchains.dynamic.interpreter, toolchains.dynamic.source_name
    );
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
