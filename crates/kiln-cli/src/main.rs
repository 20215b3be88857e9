//! `kiln` — command line interface to the resource store.

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use kiln_platform::Platform;
use kiln_types::ResourceId;

#[derive(Parser)]
#[command(name = "kiln", version, about = "Resource pipeline store tool")]
struct Cli {
    /// Store root directory.
    #[arg(long, global = true, default_value = ".kiln")]
    store: PathBuf,

    /// Store configuration file; command line flags win over it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Address of a remote sourced service to consult first.
    #[arg(long, global = true)]
    remote: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the resolved value of a resource key.
    Get {
        uuid: ResourceId,
        key: String,
        /// Platform spec: hex bits or tokens like "windows x86-64".
        #[arg(long)]
        platform: Option<Platform>,
    },
    /// Set a resource key to a string value.
    Set {
        uuid: ResourceId,
        key: String,
        value: String,
        #[arg(long)]
        platform: Option<Platform>,
        /// Persist the source in the binary encoding.
        #[arg(long)]
        binary: bool,
    },
    /// Tombstone a resource key.
    Unset {
        uuid: ResourceId,
        key: String,
        #[arg(long)]
        platform: Option<Platform>,
        /// Persist the source in the binary encoding.
        #[arg(long)]
        binary: bool,
    },
    /// Print the transitive content hash of a resource.
    Hash {
        uuid: ResourceId,
        #[arg(long)]
        platform: Option<Platform>,
    },
    /// Compact a resource's change history.
    Collapse { uuid: ResourceId },
    /// Delete blob files no change record references.
    ClearBlobs { uuid: ResourceId },
    /// List forward dependencies.
    Deps {
        uuid: ResourceId,
        #[arg(long)]
        platform: Option<Platform>,
    },
    /// List reverse dependencies.
    Revdeps {
        uuid: ResourceId,
        #[arg(long)]
        platform: Option<Platform>,
    },
    /// Replace the forward dependency list of a resource.
    SetDeps {
        uuid: ResourceId,
        #[arg(long)]
        platform: Option<Platform>,
        /// Dependency uuids; empty clears the list.
        deps: Vec<ResourceId>,
    },
    /// Resolve a source file path to its resource signature.
    Lookup { path: PathBuf },
    /// Record a source file in the import map.
    MapStore { path: PathBuf },
    /// Run the sourced service.
    Serve {
        /// Listen address.
        #[arg(long, default_value = "127.0.0.1:7780")]
        bind: String,
        /// Base directory of raw assets.
        #[arg(long)]
        import_base: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    commands::run(cli)
}
