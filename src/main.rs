mod cli;

use clipforged::{config, dataset::Dataset, server};
use clipforged_av::MediaTool;
use clipforged_common::PathSandbox;
use clipforged_store::reconcile::dangling;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::{Path, PathBuf};

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    tracing::info!("Starting Clipforged server");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    server::start_server(config).await
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise the verbose flag picks the default filter
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "clipforged=trace,clipforged_store=trace,clipforged_av=trace,clipforged_common=debug,tower_http=debug".to_string()
        } else {
            "clipforged=debug,clipforged_store=info,clipforged_av=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::List { meta, json } => list_entries(&meta, cli.config.as_deref(), json),
        Commands::Verify { meta } => verify_dataset(&meta, cli.config.as_deref()),
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("clipforged {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Open a dataset named on the command line. Relative paths are taken
/// from the working directory, then checked against the sandbox root.
fn open_dataset(meta: &Path, config_path: Option<&Path>) -> Result<(PathSandbox, Dataset)> {
    let config = config::load_config_or_default(config_path)?;
    let sandbox = PathSandbox::new(&config.dataset.root).context("Invalid dataset root")?;
    let meta: PathBuf = if meta.is_absolute() {
        meta.to_path_buf()
    } else {
        std::env::current_dir()?.join(meta)
    };
    let dataset = Dataset::open(&sandbox, &meta, &config.dataset.derived_file_name)
        .with_context(|| format!("Cannot open dataset {:?}", meta))?;
    Ok((sandbox, dataset))
}

fn list_entries(meta: &Path, config_path: Option<&Path>, json: bool) -> Result<()> {
    let (sandbox, dataset) = open_dataset(meta, config_path)?;
    let items = dataset.listing(&sandbox)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    println!("Meta store: {}", dataset.meta_path().display());
    println!("Entries: {}\n", items.len());
    for item in &items {
        let marker = if item.entry.processed { "✓" } else { " " };
        print!(
            "{} [{}] {}",
            marker,
            item.meta_index,
            item.entry.media_path.as_deref().unwrap_or("<no media>")
        );
        if let Some(from) = item.entry.copied_from {
            print!(" (copy of {})", from);
        }
        println!();
        if let Some(caption) = item.entry.caption.as_deref().filter(|c| !c.is_empty()) {
            println!("      {}", caption);
        }
        if let Some([start, end]) = item.processed_audio_pos {
            println!("      reference audio {:.3}-{:.3}s", start, end);
        }
    }

    Ok(())
}

fn verify_dataset(meta: &Path, config_path: Option<&Path>) -> Result<()> {
    let (_, dataset) = open_dataset(meta, config_path)?;
    let meta_len = dataset.store().len()?;
    let derived = dataset.store().derived().load()?;
    let broken = dangling(&derived, meta_len);

    println!(
        "{} meta entries, {} derived entries",
        meta_len,
        derived.len()
    );

    if broken.is_empty() {
        println!("✓ All derived entries reference live meta entries");
        return Ok(());
    }

    for reference in &broken {
        println!(
            "✗ derived entry {} references meta index {} (store has {})",
            reference.position, reference.meta_index, meta_len
        );
    }
    anyhow::bail!("{} dangling derived entries", broken.len())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = config::load_config_or_default(config_path)?;
    let mut missing = Vec::new();

    for tool in MediaTool::ALL {
        let configured = match tool {
            MediaTool::Ffmpeg => config.tools.ffmpeg_path.as_deref(),
            MediaTool::YtDlp => config.tools.ytdlp_path.as_deref(),
        };
        let status = tool.probe(configured);

        print!(
            "{} {}",
            if status.available() { "✓" } else { "✗" },
            tool.binary()
        );
        if let Some(ref version) = status.version {
            print!(" ({})", version);
        }
        if let Some(ref path) = status.path {
            print!(" - {}", path.display());
        }
        println!();

        if !status.available() {
            missing.push(tool);
        }
    }

    println!();
    if missing.is_empty() {
        println!("All required tools are available!");
    }
    for tool in missing {
        println!("{} is missing; it is needed for {}.", tool.binary(), tool.purpose());
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!("  Dataset root: {}", config.dataset.root.display());
            if let Some(ref meta) = config.dataset.default_meta_path {
                println!("  Default meta store: {}", meta.display());
            }
            println!("  Derived store: {}", config.dataset.derived_file_name);
            println!("  Replace on re-trim: {}", config.trim.replace_existing);
            println!(
                "  Assist token: {}",
                if config.assist.api_token.is_some() {
                    "configured"
                } else {
                    "missing"
                }
            );
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  Server: {}:{}", config.server.host, config.server.port);
        }
    }

    Ok(())
}
