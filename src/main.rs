// src/main.rs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use title_installer::storage::{fetch_content, DirContentSource, DirStore};
use title_installer::{
    installer, Archive, CliProgress, HandoffMode, HostPlatform, InstallerConfig, TitleId,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "title-installer")]
#[command(author, version, about = "First-run title migration, emulated on a workstation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full migration against directory-backed storage
    Run {
        /// Directory holding the title's content slots (00000003.app, ...)
        #[arg(long)]
        content_dir: PathBuf,
        /// Directory emulating the privileged title store
        #[arg(long)]
        store_dir: PathBuf,
        /// Title id of the running package, in hex
        #[arg(long, value_parser = parse_title_id)]
        title_id: TitleId,
        /// Directory emulating the SD card
        #[arg(long)]
        sd: Option<PathBuf>,
        /// Directory emulating USB storage
        #[arg(long)]
        usb: Option<PathBuf>,
        /// Installer config (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Override the handoff mode from the config
        #[arg(long, value_parser = parse_mode)]
        mode: Option<HandoffMode>,
        /// Device prefix written into handoff paths
        #[arg(long, default_value = title_installer::platform::DEFAULT_DEVICE)]
        device: String,
        /// Skip the countdown and frame delays
        #[arg(long)]
        no_delay: bool,
    },
    /// List the entries of the archive content without extracting
    List {
        /// Directory holding the title's content slots
        #[arg(long)]
        content_dir: PathBuf,
        /// Content slot holding the archive
        #[arg(long, default_value_t = 3)]
        index: u32,
    },
}

fn parse_title_id(s: &str) -> Result<TitleId, String> {
    let digits = s.trim_start_matches("0x").replace('-', "");
    u64::from_str_radix(&digits, 16)
        .map(TitleId)
        .map_err(|e| format!("invalid title id {:?}: {}", s, e))
}

fn parse_mode(s: &str) -> Result<HandoffMode, String> {
    match s {
        "external" => Ok(HandoffMode::External),
        "replace-executable" => Ok(HandoffMode::ReplaceExecutable),
        _ => Err(format!("unknown mode {:?} (external, replace-executable)", s)),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            content_dir,
            store_dir,
            title_id,
            sd,
            usb,
            config,
            mode,
            device,
            no_delay,
        } => {
            let mut config = match config {
                Some(path) => InstallerConfig::load(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => InstallerConfig::default(),
            };
            if let Some(mode) = mode {
                config = config.with_mode(mode);
                config.validate()?;
            }

            let mut platform = HostPlatform::new(sd, usb).with_device(device);
            if no_delay {
                platform = platform.without_delays();
            }
            let mut content = DirContentSource::new(&content_dir, title_id);
            let mut store = DirStore::new(&store_dir);
            let progress = CliProgress::new("Extracting");

            info!("Installing title {} ({} mode)", title_id, config.mode);
            let report = installer::run(
                &mut platform,
                &mut content,
                &mut store,
                &config,
                Some(&progress),
            );
            info!(
                "Migration complete: {} files, {} directories, handoff at {}",
                report.extraction.files,
                report.extraction.directories,
                report.handoff.key()
            );
            Ok(())
        }
        Commands::List { content_dir, index } => {
            let mut content = DirContentSource::new(&content_dir, TitleId(0));
            let blob = fetch_content(&mut content, index)?;
            let mut archive = Archive::open(blob.as_bytes())?;
            println!(
                "Content {}: {} bytes ({} aligned), {} entries",
                index,
                blob.len(),
                blob.padded_len(),
                archive.len()
            );
            for entry in archive.entries()? {
                if entry.is_directory {
                    println!("  {:>10}  {}", "<dir>", entry.name);
                } else {
                    println!("  {:>10}  {}", entry.uncompressed_size, entry.name);
                }
            }
            Ok(())
        }
    }
}
