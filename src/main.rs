use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use workplace_sync::config;
use workplace_sync::db::EntityStore;
use workplace_sync::places::{GooglePlacesClient, PlaceLookup};
use workplace_sync::remote::{FirebaseClient, RemoteWorkPlaces};
use workplace_sync::{WorkPlace, WorkPlaceRepository};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch every workplace, falling back to the local cache
    Fetch,
    /// Fetch a user's saved workplaces
    Saved {
        #[arg(long)]
        uid: String,
    },
    /// Look a place up by name and create it as a workplace
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        outside: bool,
    },
    /// Add a cached workplace to a user's saved-set
    Save {
        #[arg(long)]
        uid: String,
        #[arg(long)]
        key: String,
    },
    /// Remove a cached workplace from a user's saved-set
    Remove {
        #[arg(long)]
        uid: String,
        #[arg(long)]
        key: String,
    },
}

/// What gets printed: the workplace fields plus the cached saved flag.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Printed<'a> {
    #[serde(flatten)]
    place: &'a WorkPlace,
    saved: bool,
}

fn print_places(places: &[WorkPlace]) -> Result<()> {
    let printed: Vec<Printed<'_>> = places
        .iter()
        .map(|place| Printed {
            place,
            saved: place.saved,
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&printed)?);
    Ok(())
}

async fn cached(repository: &WorkPlaceRepository, key: &str) -> Result<WorkPlace> {
    repository
        .local()
        .find(key)
        .await?
        .ok_or_else(|| anyhow!("work place '{key}' is not in the local cache; run `fetch` first"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let local = EntityStore::open(&cfg.database_url())
        .await
        .context("failed to open local cache")?;
    let remote = RemoteWorkPlaces::new(Arc::new(FirebaseClient::from_config(&cfg)?))
        .with_timeouts(cfg.remote.fetch_timeout(), cfg.remote.saved_fetch_timeout());
    let lookup = PlaceLookup::new(Arc::new(GooglePlacesClient::from_config(&cfg)?))
        .with_photo_bounds(cfg.places.photo_max_width, cfg.places.photo_max_height);
    let repository =
        WorkPlaceRepository::new(remote, local, lookup).with_reconcile_mode(cfg.sync.reconcile);

    match args.command {
        Command::Fetch => {
            let places = repository.fetch_all().await?;
            info!(count = places.len(), "fetch complete");
            print_places(&places)?;
        }
        Command::Saved { uid } => {
            let places = repository.fetch_saved(&uid).await?;
            print_places(&places)?;
        }
        Command::Create { name, outside } => {
            let place = repository.create(&name, outside).await?;
            print_places(std::slice::from_ref(&place))?;
        }
        Command::Save { uid, key } => {
            let place = cached(&repository, &key).await?;
            let saved = repository.save(&uid, &place).await?;
            print_places(std::slice::from_ref(&saved))?;
        }
        Command::Remove { uid, key } => {
            let place = cached(&repository, &key).await?;
            match repository.remove(&uid, &place).await? {
                Some(removed) => print_places(std::slice::from_ref(&removed))?,
                None => info!(key = %key, "work place was not in the saved-set"),
            }
        }
    }

    Ok(())
}
