//! Terracarta CLI entry point.
//!
//! This binary provides the command-line interface for Terracarta.

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::process::ExitCode;
use std::time::Duration;
use terracarta::cli::{Cli, Commands, ScanArgs, WatchArgs};
use terracarta::graph::{export_graph, DependencyGraph};
use terracarta::report::Reporter;
use terracarta::watch::{diff_snapshots, snapshot, Debouncer};
use terracarta::{discovery, Config, IndexSession};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.quiet);

    // Run the appropriate command
    match run(cli).await {
        Ok(exit_code) => exit_code,
        Err(e) => {
            tracing::error!(error = %e, "Fatal error");

            // Print error with full chain
            eprintln!("Error: {e}");

            let mut source = e.source();
            if source.is_some() {
                eprintln!("\nCaused by:");
                let mut i = 0;
                while let Some(cause) = source {
                    eprintln!("  {i}: {cause}");
                    source = cause.source();
                    i += 1;
                }
            }

            ExitCode::from(1)
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        // First try to use RUST_LOG from environment, otherwise use verbose flag
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let base_level = match verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            };
            // Filter string: terracarta at specified level, everything else at warn
            EnvFilter::new(format!("warn,terracarta={base_level}"))
        })
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    tracing::debug!("Loading configuration");
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Scan(args) => scan(config, args).await,

        Commands::Graph(args) => {
            let mut session = IndexSession::new(config);
            let files = collect_files(&session, &args.paths)?;
            let result = session.build(files, None).await?;

            let graph = DependencyGraph::from_index(&result.index);
            let rendered = export_graph(&graph, args.format)?;

            if let Some(output_path) = args.output {
                std::fs::write(&output_path, &rendered)?;
                tracing::info!(path = %output_path.display(), "Graph written");
            } else {
                println!("{rendered}");
            }

            Ok(ExitCode::from(0))
        }

        Commands::Watch(args) => watch(config, args).await,

        Commands::Init => {
            // Generate example configuration file
            let example_config = Config::example_yaml();
            let config_path = std::path::Path::new("terracarta.yaml");

            if config_path.exists() {
                anyhow::bail!(
                    "Configuration file already exists: {}",
                    config_path.display()
                );
            }

            std::fs::write(config_path, example_config)?;
            println!("Created example configuration: terracarta.yaml");
            Ok(ExitCode::from(0))
        }

        Commands::Validate(args) => {
            let config_content = std::fs::read_to_string(&args.config)?;
            match Config::from_yaml(&config_content) {
                Ok(_) => {
                    println!("Configuration is valid: {}", args.config.display());
                    Ok(ExitCode::from(0))
                }
                Err(e) => {
                    eprintln!("Configuration error: {e}");
                    Ok(ExitCode::from(1))
                }
            }
        }
    }
}

async fn scan(mut config: Config, args: ScanArgs) -> anyhow::Result<ExitCode> {
    config.merge_cli_args(&args);
    let mut session = IndexSession::new(config.clone());

    let files = collect_files(&session, &args.paths)?;
    tracing::info!(files = files.len(), "Discovered files");

    let progress = ProgressBar::new(files.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );

    let bar = progress.clone();
    let on_progress = move |processed: usize, _total: usize, current: &std::path::Path| {
        bar.set_position(processed as u64);
        if let Some(name) = current.file_name() {
            bar.set_message(name.to_string_lossy().to_string());
        }
    };
    let result = session.build(files, Some(&on_progress)).await?;
    progress.finish_and_clear();

    let reporter = Reporter::new(&config);
    let report = reporter.generate(&result, args.format)?;

    if let Some(output_path) = args.output {
        std::fs::write(&output_path, &report)?;
        tracing::info!(path = %output_path.display(), "Report written");
    } else {
        println!("{report}");
    }

    let exit_code = if args.strict && !result.errors.is_empty() {
        1
    } else {
        0
    };
    Ok(ExitCode::from(exit_code))
}

async fn watch(mut config: Config, args: WatchArgs) -> anyhow::Result<ExitCode> {
    if let Some(debounce) = args.debounce_ms {
        config.watch.debounce_ms = debounce;
    }
    let quiet = Duration::from_millis(config.watch.debounce_ms);

    let mut session = IndexSession::new(config.clone());
    let result = session.build_dir(&args.path, None).await?;
    println!(
        "Watching {} ({} blocks indexed, {} edges)",
        args.path.display(),
        result.stats.total_blocks,
        result.index.refs.as_ref().map_or(0, Vec::len)
    );

    let (debouncer, mut batches) = Debouncer::new(quiet);
    let mut current = snapshot(&discovery::find_files(&args.path, &config.scan));
    let mut poll = tokio::time::interval(quiet.max(Duration::from_millis(100)));

    loop {
        tokio::select! {
            _ = poll.tick() => {
                let files = discovery::find_files(&args.path, &config.scan);
                let next = snapshot(&files);
                for event in diff_snapshots(&current, &next) {
                    debouncer.notify(event);
                }
                current = next;
            }
            Some(batch) = batches.recv() => {
                let outcome = session.apply_changes(&batch);
                println!(
                    "updated: {} added: {} deleted: {} ({} blocks, {} edges)",
                    outcome.updated_files.len(),
                    outcome.added_files.len(),
                    outcome.deleted_files.len(),
                    session.index().len(),
                    session.index().refs.as_ref().map_or(0, Vec::len)
                );
                for error in &outcome.errors {
                    eprintln!("  parse error in {}: {}", error.file.display(), error.message);
                }
            }
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    if let Some(ref config_path) = cli.config {
        tracing::debug!(path = %config_path.display(), "Loading configuration from explicit path");
        let content = std::fs::read_to_string(config_path)?;
        return Ok(Config::from_yaml(&content)?);
    }

    let default_paths = ["terracarta.yaml", "terracarta.yml", ".terracarta.yaml"];
    for path in &default_paths {
        if std::path::Path::new(path).exists() {
            tracing::debug!(path = %path, "Found configuration file");
            let content = std::fs::read_to_string(path)?;
            return Ok(Config::from_yaml(&content)?);
        }
    }

    tracing::debug!("No configuration file found, using default configuration");
    Ok(Config::default())
}

fn collect_files(
    session: &IndexSession,
    paths: &[std::path::PathBuf],
) -> anyhow::Result<Vec<std::path::PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if !path.exists() {
            anyhow::bail!("path does not exist: {}", path.display());
        }
        files.extend(discovery::find_files(path, &session.config().scan));
    }
    files.sort();
    files.dedup();
    Ok(files)
}
