use std::sync::Arc;

use anyhow::{bail, Context, Result};
use colored::Colorize;

use kiln_import::ImportMap;
use kiln_platform::Platform;
use kiln_remote::RemoteSourcedClient;
use kiln_server::{ServerConfig, SourcedServer};
use kiln_source::{ChangeLog, ChangeOp, SourceFormat};
use kiln_store::{LocalStore, StoreConfig};
use kiln_types::{tick_now, ContentHash, KeyHash, ResourceId};

use crate::{Cli, Command};

pub(crate) fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => StoreConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => StoreConfig {
            path: cli.store.clone(),
            ..StoreConfig::default()
        },
    };
    if let Some(remote) = &cli.remote {
        config.remote_sourced = Some(remote.clone());
    }

    let remote = config
        .remote_sourced
        .as_ref()
        .map(|addr| Arc::new(RemoteSourcedClient::connect(addr.clone())));

    let mut store = LocalStore::from_config(&config);
    if let Some(client) = &remote {
        store = store.with_remote(client.clone());
    }

    match cli.command {
        Command::Get {
            uuid,
            key,
            platform,
        } => get(&store, uuid, &key, platform.unwrap_or(Platform::WILDCARD)),
        Command::Set {
            uuid,
            key,
            value,
            platform,
            binary,
        } => set(
            &store,
            uuid,
            &key,
            Some(&value),
            platform.unwrap_or(Platform::WILDCARD),
            binary,
        ),
        Command::Unset {
            uuid,
            key,
            platform,
            binary,
        } => set(
            &store,
            uuid,
            &key,
            None,
            platform.unwrap_or(Platform::WILDCARD),
            binary,
        ),
        Command::Hash { uuid, platform } => {
            hash(&store, uuid, platform.unwrap_or(Platform::WILDCARD))
        }
        Command::Collapse { uuid } => {
            if store.collapse_source(uuid)? {
                println!("{} {uuid}", "collapsed".green());
            } else {
                bail!("no source for {uuid}");
            }
            Ok(())
        }
        Command::ClearBlobs { uuid } => {
            let deleted = store.clear_blob_history(uuid)?;
            println!("{} {deleted} blob file(s)", "deleted".green());
            Ok(())
        }
        Command::Deps { uuid, platform } => {
            list_deps(&store, uuid, platform.unwrap_or(Platform::WILDCARD), false)
        }
        Command::Revdeps { uuid, platform } => {
            list_deps(&store, uuid, platform.unwrap_or(Platform::WILDCARD), true)
        }
        Command::SetDeps {
            uuid,
            platform,
            deps,
        } => {
            store.set_dependencies(uuid, platform.unwrap_or(Platform::WILDCARD), &deps)?;
            println!("{} {} dependencies for {uuid}", "set".green(), deps.len());
            Ok(())
        }
        Command::Lookup { path } => {
            let mut map = ImportMap::new();
            if let Some(client) = &remote {
                map = map.with_remote(client.clone());
            }
            match map.lookup(&path)? {
                Some(sig) => {
                    println!("{} {}", sig.uuid.to_string().cyan(), sig.hash);
                    Ok(())
                }
                None => bail!("{} is not mapped", path.display()),
            }
        }
        Command::MapStore { path } => {
            let data = std::fs::read(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let map = ImportMap::new();
            let uuid = map.store(&path, ResourceId::generate(), ContentHash::of(&data))?;
            println!("{}", uuid.to_string().cyan());
            Ok(())
        }
        Command::Serve { bind, import_base } => {
            let server_config = ServerConfig {
                bind,
                store_path: config.path.clone(),
                import_base,
            };
            let runtime = tokio::runtime::Runtime::new()?;
            let server = Arc::new(SourcedServer::new(&server_config));
            runtime.block_on(server.run(&server_config.bind))?;
            Ok(())
        }
    }
}

fn get(store: &LocalStore, uuid: ResourceId, key: &str, platform: Platform) -> Result<()> {
    let Some(log) = store.read_source(uuid)? else {
        bail!("no source for {uuid}");
    };
    match log.get_best(KeyHash::of(key), platform) {
        Some(change) => match &change.op {
            ChangeOp::Value(value) => println!("{value}"),
            ChangeOp::Blob(blob) => println!(
                "{} checksum {:x} size {}",
                "blob".yellow(),
                blob.checksum,
                blob.size
            ),
            // Resolution never hands back a tombstone.
            ChangeOp::Unset => println!("{}", "(not set)".dimmed()),
        },
        None => println!("{}", "(not set)".dimmed()),
    }
    Ok(())
}

fn set(
    store: &LocalStore,
    uuid: ResourceId,
    key: &str,
    value: Option<&str>,
    platform: Platform,
    binary: bool,
) -> Result<()> {
    let mut log = store.read_local_source(uuid)?.unwrap_or_else(ChangeLog::new);
    let format = if binary || log.read_binary() {
        SourceFormat::Binary
    } else {
        SourceFormat::Text
    };
    match value {
        Some(value) => log.set(tick_now(), KeyHash::of(key), platform, value),
        None => log.unset(tick_now(), KeyHash::of(key), platform),
    }
    let hash = store.write_source(uuid, &log, format)?;
    println!("{} {uuid} {}", "wrote".green(), hash);
    Ok(())
}

fn hash(store: &LocalStore, uuid: ResourceId, platform: Platform) -> Result<()> {
    match store.signature_hash(uuid, platform)? {
        Some(hash) => {
            println!("{hash}");
            Ok(())
        }
        None => bail!("no hash for {uuid}"),
    }
}

fn list_deps(
    store: &LocalStore,
    uuid: ResourceId,
    platform: Platform,
    reverse: bool,
) -> Result<()> {
    let deps = if reverse {
        store.reverse_dependencies(uuid, platform)?
    } else {
        store.dependencies(uuid, platform)?
    };
    if deps.is_empty() {
        println!("{}", "(none)".dimmed());
        return Ok(());
    }
    for dep in deps {
        println!("{} {:x}", dep.uuid.to_string().cyan(), dep.platform.bits());
    }
    Ok(())
}
