use std::fs::File;
use std::io::Read;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::Context, Report, Result};
use serde::Serialize;

mod descriptor;
mod error;
mod manager;
mod pool;
mod progress;
mod source;
mod utils;

use manager::{VolumeManager, DEFAULT_IMAGE_FORMAT};
use pool::virsh::VirshBackend;

/// Manage virtual machine disk images in a libvirt storage pool.
///
/// vmdisk imports base images from local files or HTTP(S) URLs, derives
/// copy-on-write instance disks from them, and uploads small configuration
/// ISOs (e.g. cloud-init seeds) as volumes.
#[derive(Parser)]
struct Cli {
    /// Hypervisor connection URI (e.g., qemu:///system, qemu+ssh://host/system)
    #[clap(short = 'c', long = "connect", global = true)]
    connect: Option<String>,

    /// Libvirt storage pool name
    #[clap(long, default_value = "default", global = true)]
    pool: String,

    #[command(subcommand)]
    command: Commands,
}

/// Available vmdisk commands.
#[derive(Subcommand)]
enum Commands {
    /// Import a base image into the pool from a file:// or http(s):// URI
    Import {
        /// Name of the volume to create
        name: String,

        /// Source URI of the image
        uri: String,

        /// Volume format tag, passed through to libvirt unchanged
        #[clap(long, default_value = DEFAULT_IMAGE_FORMAT)]
        format: String,

        /// Do not display upload progress
        #[clap(long, short = 'q')]
        quiet: bool,
    },

    /// List the volumes in the pool
    List {
        /// Output as structured JSON instead of plain names
        #[clap(long)]
        json: bool,
    },

    /// Remove a volume from the pool
    Rm {
        /// Name of the volume to remove
        name: String,
    },

    /// Create a copy-on-write volume backed by a qcow2 base image
    Clone {
        /// Name of the volume to create
        name: String,

        /// Name of the qcow2 base image volume
        base: String,

        /// Capacity of the new volume (e.g., '20G', '10240M'). Defaults to the base image capacity.
        #[clap(long)]
        size: Option<String>,
    },

    /// Upload a configuration ISO (at most 10MB) as a volume
    #[clap(name = "config-volume")]
    ConfigVolume {
        /// Name of the volume to create
        name: String,

        /// ISO file to upload, or '-' to read from stdin
        file: String,
    },

    /// Print the on-disk path of a volume
    Path {
        /// Name of the volume
        name: String,
    },
}

#[derive(Serialize)]
struct ListOutput<'a> {
    pool: &'a str,
    volume_count: usize,
    volumes: &'a [String],
}

/// Install and configure the tracing/logging system.
///
/// Logs are filtered by RUST_LOG environment variable, defaulting to 'info'.
fn install_tracing() {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let fmt_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let filter_layer = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();
}

fn open_payload(file: &str) -> Result<Box<dyn Read>> {
    if file == "-" {
        return Ok(Box::new(std::io::stdin().lock()));
    }
    let f = File::open(file).wrap_err_with(|| format!("Opening {file}"))?;
    Ok(Box::new(f))
}

fn main() -> Result<(), Report> {
    install_tracing();
    color_eyre::install()?;

    let cli = Cli::parse();
    let manager = VolumeManager::new(VirshBackend::new(cli.connect), &cli.pool);

    match cli.command {
        Commands::Import {
            name,
            uri,
            format,
            quiet,
        } => {
            manager.import_base_image(&name, &uri, &format, quiet)?;
        }
        Commands::List { json } => {
            let volumes = manager.list()?;
            if json {
                let output = ListOutput {
                    pool: manager.pool(),
                    volume_count: volumes.len(),
                    volumes: &volumes,
                };
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                for name in volumes {
                    println!("{name}");
                }
            }
        }
        Commands::Rm { name } => {
            manager.remove(&name)?;
        }
        Commands::Clone { name, base, size } => {
            let size = size.as_deref().map(utils::parse_size).transpose()?;
            manager.clone_base_image(&name, &base, size)?;
        }
        Commands::ConfigVolume { name, file } => {
            let payload = open_payload(&file)?;
            manager.create_config_volume(&name, payload)?;
        }
        Commands::Path { name } => {
            println!("{}", manager.volume_path(&name)?);
        }
    }
    Ok(())
}
