//! SQLite-backed catalog store.
//!
//! Items are stored one JSON document per row. The selection projection is
//! derived with `json_extract`, so documents keep every field the catalog
//! served while reads only touch the columns selection needs.

use std::{
    collections::HashSet,
    fmt,
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use camino::Utf8Path;
use log::debug;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};

use crate::{
    AreaGeometry, CatalogItem, CatalogProjection, GeometryError, ImagePath, ItemId,
    ProjectedItem,
};

use super::{CatalogStore, CatalogStoreError};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS items (
        id INTEGER PRIMARY KEY,
        data TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS snapshot_meta (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        item_count INTEGER NOT NULL,
        installed_at_ms INTEGER NOT NULL
    );
";

const PROJECTION_QUERY: &str = "
    SELECT id,
           json_extract(data, '$.name'),
           json_extract(data, '$.areas'),
           json_extract(data, '$.max_rate'),
           json_extract(data, '$.is_active'),
           json_extract(data, '$.images')
    FROM items
    ORDER BY id
";

/// Metadata about the committed snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotInfo {
    /// Number of items in the snapshot.
    pub item_count: u64,
    /// When the snapshot was committed, to millisecond precision.
    pub installed_at: SystemTime,
}

/// Catalog store persisted in a SQLite database.
pub struct SqliteCatalogStore {
    connection: Mutex<Connection>,
}

impl fmt::Debug for SqliteCatalogStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteCatalogStore").finish_non_exhaustive()
    }
}

impl SqliteCatalogStore {
    /// Open or create the catalog database at `path`.
    ///
    /// Missing parent directories are created.
    pub fn open(path: &Utf8Path) -> Result<Self, CatalogStoreError> {
        xside_fs::ensure_parent_dir(path).map_err(|source| CatalogStoreError::Directory {
            path: path.to_path_buf(),
            source,
        })?;
        let connection = Connection::open(path).map_err(|source| CatalogStoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        // WAL lets readers proceed while a snapshot replacement is committing.
        let mode: String =
            connection.pragma_update_and_check(None, "journal_mode", "wal", |row| row.get(0))?;
        debug!("opened catalog database at {path} (journal mode {mode})");
        Self::initialise(connection)
    }

    /// Create a store backed by a private in-memory database.
    pub fn open_in_memory() -> Result<Self, CatalogStoreError> {
        Self::initialise(Connection::open_in_memory()?)
    }

    fn initialise(connection: Connection) -> Result<Self, CatalogStoreError> {
        connection.busy_timeout(Duration::from_secs(5))?;
        connection.execute_batch(SCHEMA)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.connection.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Metadata of the committed snapshot, or `None` before the first install.
    pub fn snapshot_info(&self) -> Result<Option<SnapshotInfo>, CatalogStoreError> {
        let connection = self.lock();
        let info = connection
            .query_row(
                "SELECT item_count, installed_at_ms FROM snapshot_meta WHERE id = 1",
                [],
                |row| {
                    let item_count: u64 = row.get(0)?;
                    let installed_at_ms: u64 = row.get(1)?;
                    Ok(SnapshotInfo {
                        item_count,
                        installed_at: UNIX_EPOCH + Duration::from_millis(installed_at_ms),
                    })
                },
            )
            .optional()?;
        Ok(info)
    }
}

impl CatalogStore for SqliteCatalogStore {
    fn replace_snapshot(&self, items: &[CatalogItem]) -> Result<(), CatalogStoreError> {
        let documents = encode_documents(items)?;
        let installed_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));

        let mut connection = self.lock();
        let transaction = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
        transaction.execute("DELETE FROM items", [])?;
        {
            let mut insert = transaction.prepare("INSERT INTO items (id, data) VALUES (?1, ?2)")?;
            for (id, document) in &documents {
                insert.execute(params![id, document])?;
            }
        }
        transaction.execute(
            "INSERT OR REPLACE INTO snapshot_meta (id, item_count, installed_at_ms)
             VALUES (1, ?1, ?2)",
            params![documents.len(), installed_at_ms],
        )?;
        transaction.commit()?;
        debug!("committed catalog snapshot with {} items", documents.len());
        Ok(())
    }

    fn load_projection(&self) -> Result<CatalogProjection, CatalogStoreError> {
        let connection = self.lock();
        let mut statement = connection.prepare(PROJECTION_QUERY)?;
        let mut rows = statement.query([])?;
        let mut items = Vec::new();

        while let Some(row) = rows.next()? {
            let id: ItemId = row.get(0)?;
            let name: Option<String> = row.get(1)?;
            let areas_json: Option<String> = row.get(2)?;
            let max_rate: Option<f64> = row.get(3)?;
            let is_active: Option<bool> = row.get(4)?;
            let images_json: Option<String> = row.get(5)?;

            let areas = decode_areas(areas_json.as_deref())
                .map_err(|source| CatalogStoreError::InvalidGeometry { id, source })?;
            let images = match images_json {
                Some(json) => serde_json::from_str::<Vec<ImagePath>>(&json)
                    .map_err(|source| CatalogStoreError::InvalidImages { id, source })?,
                None => Vec::new(),
            };

            items.push(ProjectedItem {
                id,
                name: name.unwrap_or_default(),
                areas,
                max_rate: max_rate.unwrap_or_default(),
                is_active: is_active.unwrap_or(true),
                images,
            });
        }

        Ok(CatalogProjection::new(items))
    }
}

fn encode_documents(items: &[CatalogItem]) -> Result<Vec<(ItemId, String)>, CatalogStoreError> {
    let mut seen = HashSet::with_capacity(items.len());
    items
        .iter()
        .map(|item| {
            if !seen.insert(item.id) {
                return Err(CatalogStoreError::DuplicateId { id: item.id });
            }
            let document = serde_json::to_string(item)
                .map_err(|source| CatalogStoreError::Encode { id: item.id, source })?;
            Ok((item.id, document))
        })
        .collect()
}

fn decode_areas(stored: Option<&str>) -> Result<geo::MultiPolygon<f64>, GeometryError> {
    let json = stored.ok_or(GeometryError::Missing)?;
    AreaGeometry::from_json_str(json)?.to_multi_polygon()
}
