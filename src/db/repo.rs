use super::StoreError;
use crate::model::WorkPlace;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::path::Path;
use std::str::FromStr;
use tracing::instrument;

pub type Pool = SqlitePool;

const SELECT_ALL: &str = "SELECT key, name, address, latitude, longitude, outside, saved, photo_encoding \
     FROM work_places ORDER BY key";

const SELECT_SAVED: &str = "SELECT key, name, address, latitude, longitude, outside, saved, photo_encoding \
     FROM work_places WHERE saved = 1 ORDER BY key";

const SELECT_ONE: &str = "SELECT key, name, address, latitude, longitude, outside, saved, photo_encoding \
     FROM work_places WHERE key = ?";

// `saved` is only written on first insert; later upserts keep the cached flag.
const UPSERT: &str = "INSERT INTO work_places \
     (key, name, address, latitude, longitude, outside, saved, photo_encoding) \
     VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
     ON CONFLICT(key) DO UPDATE SET \
     name = excluded.name, address = excluded.address, \
     latitude = excluded.latitude, longitude = excluded.longitude, \
     outside = excluded.outside, photo_encoding = excluded.photo_encoding, \
     updated_at = CURRENT_TIMESTAMP";

/// Number of pooled connections: one per logical core.
pub fn worker_count() -> u32 {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
        .try_into()
        .unwrap_or(u32::MAX)
}

pub async fn init_pool(database_url: &str) -> Result<Pool, StoreError> {
    let normalized = prepare_sqlite_url(database_url);
    let options = SqliteConnectOptions::from_str(&normalized)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full);
    let pool = SqlitePoolOptions::new()
        .max_connections(worker_count())
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Expand a leading `~/` in file-backed SQLite URLs and make sure the parent
/// directory exists. In-memory and non-sqlite URLs pass through untouched.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if rest.starts_with(":memory") {
        return url.to_string();
    }

    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let (path, query) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path.is_empty() {
        return url.to_string();
    }

    let path = match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), tail),
        _ => path.to_string(),
    };

    if let Some(parent) = Path::new(&path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    match query {
        Some(q) => format!("sqlite://{}?{}", path, q),
        None => format!("sqlite://{}", path),
    }
}

pub async fn run_migrations(pool: &Pool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn row_to_work_place(row: &SqliteRow) -> Result<WorkPlace, sqlx::Error> {
    Ok(WorkPlace {
        key: Some(row.try_get("key")?),
        name: row.try_get("name")?,
        address: row.try_get("address")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        outside: row.try_get("outside")?,
        photo_encoding: row.try_get("photo_encoding")?,
        saved: row.try_get("saved")?,
    })
}

#[instrument(skip_all)]
pub async fn all_work_places(pool: &Pool) -> Result<Vec<WorkPlace>, StoreError> {
    let rows = sqlx::query(SELECT_ALL).fetch_all(pool).await?;
    let places = rows
        .iter()
        .map(row_to_work_place)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(places)
}

#[instrument(skip_all)]
pub async fn saved_work_places(pool: &Pool) -> Result<Vec<WorkPlace>, StoreError> {
    let rows = sqlx::query(SELECT_SAVED).fetch_all(pool).await?;
    let places = rows
        .iter()
        .map(row_to_work_place)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(places)
}

#[instrument(skip_all)]
pub async fn find_work_place(pool: &Pool, key: &str) -> Result<Option<WorkPlace>, StoreError> {
    let row = sqlx::query(SELECT_ONE)
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(row_to_work_place).transpose()?)
}

async fn upsert_tx(tx: &mut Transaction<'_, Sqlite>, place: &WorkPlace) -> Result<bool, StoreError> {
    let key = place.key().ok_or(StoreError::MissingKey)?;
    sqlx::query(UPSERT)
        .bind(key)
        .bind(&place.name)
        .bind(&place.address)
        .bind(place.latitude)
        .bind(place.longitude)
        .bind(place.outside)
        .bind(place.saved)
        .bind(place.photo_encoding.as_deref())
        .execute(&mut **tx)
        .await?;
    let saved: bool = sqlx::query_scalar("SELECT saved FROM work_places WHERE key = ?")
        .bind(key)
        .fetch_one(&mut **tx)
        .await?;
    Ok(saved)
}

/// Upsert every workplace in one transaction. Returns the rows as persisted,
/// i.e. carrying the cached `saved` flag.
#[instrument(skip_all, fields(count = places.len()))]
pub async fn upsert_work_places(
    pool: &Pool,
    places: &[WorkPlace],
) -> Result<Vec<WorkPlace>, StoreError> {
    let mut tx = pool.begin().await?;
    let mut persisted = Vec::with_capacity(places.len());
    for place in places {
        let saved = upsert_tx(&mut tx, place).await?;
        persisted.push(place.clone().with_saved(saved));
    }
    tx.commit().await?;
    Ok(persisted)
}

#[instrument(skip_all)]
pub async fn upsert_work_place(pool: &Pool, place: &WorkPlace) -> Result<WorkPlace, StoreError> {
    let mut tx = pool.begin().await?;
    let saved = upsert_tx(&mut tx, place).await?;
    tx.commit().await?;
    Ok(place.clone().with_saved(saved))
}

#[instrument(skip_all)]
pub async fn set_saved_flag(pool: &Pool, key: &str, saved: bool) -> Result<u64, StoreError> {
    let res = sqlx::query(
        "UPDATE work_places SET saved = ?, updated_at = CURRENT_TIMESTAMP WHERE key = ?",
    )
    .bind(saved)
    .bind(key)
    .execute(pool)
    .await?;
    Ok(res.rows_affected())
}

async fn stamp_tx(tx: &mut Transaction<'_, Sqlite>, keys: &[String]) -> Result<u64, StoreError> {
    let unique: BTreeSet<&str> = keys.iter().map(String::as_str).collect();
    let mut stamped = 0;
    for key in unique {
        stamped += sqlx::query(
            "UPDATE work_places SET saved = 1, updated_at = CURRENT_TIMESTAMP WHERE key = ? AND saved = 0",
        )
        .bind(key)
        .execute(&mut **tx)
        .await?
        .rows_affected();
    }
    Ok(stamped)
}

/// Turn `saved` on for every cached row whose key is listed. Never clears.
/// Returns the number of rows whose flag changed.
#[instrument(skip_all, fields(keys = keys.len()))]
pub async fn stamp_saved_keys(pool: &Pool, keys: &[String]) -> Result<u64, StoreError> {
    let mut tx = pool.begin().await?;
    let stamped = stamp_tx(&mut tx, keys).await?;
    tx.commit().await?;
    Ok(stamped)
}

/// Make the cached flags match `keys` exactly: clear all, then stamp.
#[instrument(skip_all, fields(keys = keys.len()))]
pub async fn replace_saved_keys(pool: &Pool, keys: &[String]) -> Result<u64, StoreError> {
    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE work_places SET saved = 0, updated_at = CURRENT_TIMESTAMP WHERE saved = 1")
        .execute(&mut *tx)
        .await?;
    let stamped = stamp_tx(&mut tx, keys).await?;
    tx.commit().await?;
    Ok(stamped)
}

#[instrument(skip_all)]
pub async fn clear_work_places(pool: &Pool) -> Result<u64, StoreError> {
    let res = sqlx::query("DELETE FROM work_places").execute(pool).await?;
    Ok(res.rows_affected())
}

#[instrument(skip_all)]
pub async fn count_work_places(pool: &Pool) -> Result<i64, StoreError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM work_places")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
