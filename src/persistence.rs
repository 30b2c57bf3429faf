//! RocksDB-backed serving store.
//!
//! A publish writes the generation payload and the current-generation
//! pointer in one `WriteBatch`. Readers follow the pointer, so they see the
//! previous generation until that batch commits. The superseded payload is
//! deleted afterwards.

use crate::publish::{Generation, ServingStore};
use anyhow::{anyhow, Result};
use parking_lot::{Mutex, RwLock};
use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

const CF_GENERATIONS: &str = "generations";
const CF_METADATA: &str = "metadata";

const KEY_MANIFEST: &[u8] = b"manifest";
const KEY_CURRENT_GENERATION: &[u8] = b"current_generation";

const STORAGE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct StorageManifest {
    format_version: u32,
    app_version: String,
}

pub struct PersistentServingStore {
    db: DB,
    /// Serializes publishers; readers never take it.
    publish_lock: Mutex<()>,
    cache: RwLock<Option<Arc<Generation>>>,
}

impl PersistentServingStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = open_db(path)?;
        validate_or_init_manifest(&db)?;
        Ok(Self {
            db,
            publish_lock: Mutex::new(()),
            cache: RwLock::new(None),
        })
    }

    /// Number of the live generation, if any.
    pub fn current_number(&self) -> Result<Option<u64>> {
        load_metadata::<u64>(&self.db, KEY_CURRENT_GENERATION)
    }

    /// Numbers of all stored generation payloads, ascending.
    pub fn stored_generations(&self) -> Result<Vec<u64>> {
        let cf = self
            .db
            .cf_handle(CF_GENERATIONS)
            .ok_or_else(|| anyhow!("missing generations column family"))?;
        let mut numbers = Vec::new();
        for entry in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = entry?;
            numbers.push(decode_generation_key(&key)?);
        }
        Ok(numbers)
    }

    fn load_generation(&self, number: u64) -> Result<Generation> {
        let cf = self
            .db
            .cf_handle(CF_GENERATIONS)
            .ok_or_else(|| anyhow!("missing generations column family"))?;
        let bytes = self
            .db
            .get_cf(cf, number.to_be_bytes())?
            .ok_or_else(|| anyhow!("generation {number} is referenced but missing"))?;
        Ok(bincode::deserialize(&bytes)?)
    }

    fn remove_generation(&self, number: u64) -> Result<()> {
        let cf = self
            .db
            .cf_handle(CF_GENERATIONS)
            .ok_or_else(|| anyhow!("missing generations column family"))?;
        self.db.delete_cf(cf, number.to_be_bytes())?;
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

impl ServingStore for PersistentServingStore {
    fn publish(&self, mut generation: Generation) -> Result<u64> {
        let _publishing = self.publish_lock.lock();
        let previous = self.current_number()?;
        let number = previous.unwrap_or(0) + 1;
        generation.number = number;

        let generations_cf = self
            .db
            .cf_handle(CF_GENERATIONS)
            .ok_or_else(|| anyhow!("missing generations column family"))?;
        let metadata_cf = self
            .db
            .cf_handle(CF_METADATA)
            .ok_or_else(|| anyhow!("missing metadata column family"))?;

        let payload = bincode::serialize(&generation)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(generations_cf, number.to_be_bytes(), &payload);
        batch.put_cf(metadata_cf, KEY_CURRENT_GENERATION, bincode::serialize(&number)?);
        self.db.write(batch)?;

        *self.cache.write() = Some(Arc::new(generation));
        info!(
            generation = number,
            bytes = payload.len(),
            "Published generation to persistent store"
        );

        if let Some(previous) = previous {
            if let Err(err) = self.remove_generation(previous) {
                warn!(generation = previous, error = %err, "Failed to remove superseded generation");
            }
        }
        Ok(number)
    }

    fn current(&self) -> Result<Option<Arc<Generation>>> {
        let Some(number) = self.current_number()? else {
            return Ok(None);
        };
        if let Some(cached) = self.cache.read().as_ref() {
            if cached.number == number {
                return Ok(Some(Arc::clone(cached)));
            }
        }
        let generation = Arc::new(self.load_generation(number)?);
        *self.cache.write() = Some(Arc::clone(&generation));
        Ok(Some(generation))
    }
}

impl Drop for PersistentServingStore {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            warn!(error = %err, "Failed to flush serving store on close");
        }
    }
}

fn open_db(path: impl AsRef<Path>) -> Result<DB> {
    let mut options = Options::default();
    options.create_if_missing(true);
    options.create_missing_column_families(true);
    options.set_paranoid_checks(true);
    let cfs = vec![
        ColumnFamilyDescriptor::new(CF_GENERATIONS, Options::default()),
        ColumnFamilyDescriptor::new(CF_METADATA, Options::default()),
    ];
    Ok(DB::open_cf_descriptors(&options, path, cfs)?)
}

fn decode_generation_key(key: &[u8]) -> Result<u64> {
    let bytes: [u8; 8] = key
        .try_into()
        .map_err(|_| anyhow!("malformed generation key of {} bytes", key.len()))?;
    Ok(u64::from_be_bytes(bytes))
}

fn validate_or_init_manifest(db: &DB) -> Result<()> {
    if let Some(manifest) = load_metadata::<StorageManifest>(db, KEY_MANIFEST)? {
        if manifest.format_version != STORAGE_FORMAT_VERSION {
            return Err(anyhow!(
                "storage format version mismatch: expected {}, found {}",
                STORAGE_FORMAT_VERSION,
                manifest.format_version
            ));
        }
        return Ok(());
    }

    let manifest = StorageManifest {
        format_version: STORAGE_FORMAT_VERSION,
        app_version: env!("CARGO_PKG_VERSION").to_string(),
    };
    let metadata_cf = db
        .cf_handle(CF_METADATA)
        .ok_or_else(|| anyhow!("missing metadata column family"))?;
    db.put_cf(metadata_cf, KEY_MANIFEST, bincode::serialize(&manifest)?)?;
    Ok(())
}

fn load_metadata<T: serde::de::DeserializeOwned>(db: &DB, key: &[u8]) -> Result<Option<T>> {
    let metadata_cf = db
        .cf_handle(CF_METADATA)
        .ok_or_else(|| anyhow!("missing metadata column family"))?;
    if let Some(bytes) = db.get_cf(metadata_cf, key)? {
        Ok(Some(bincode::deserialize(&bytes)?))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::{Leaderboards, RunSummary};
    use crate::scoring::References;
    use chrono::NaiveDate;

    fn generation(day: u32) -> Generation {
        Generation {
            number: 0,
            as_of: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            references: References {
                violation_density: 0.5,
                complaint_rate: 0.1,
                eviction_rate: 0.01,
                ownership_pressure: 1.0,
                days_to_close: 30.0,
            },
            buildings: Vec::new(),
            owners: Vec::new(),
            leaderboards: Leaderboards::default(),
            summary: RunSummary::default(),
        }
    }

    #[test]
    fn test_empty_store_has_no_generation() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistentServingStore::open(dir.path()).unwrap();
        assert!(store.current().unwrap().is_none());
        assert_eq!(store.current_number().unwrap(), None);
    }

    #[test]
    fn test_publish_swaps_and_removes_previous() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistentServingStore::open(dir.path()).unwrap();
        assert_eq!(store.publish(generation(1)).unwrap(), 1);
        assert_eq!(store.publish(generation(2)).unwrap(), 2);
        let current = store.current().unwrap().unwrap();
        assert_eq!(current.number, 2);
        assert_eq!(current.as_of, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(store.stored_generations().unwrap(), vec![2]);
    }

    #[test]
    fn test_generation_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = PersistentServingStore::open(dir.path()).unwrap();
            store.publish(generation(3)).unwrap();
        }
        let store = PersistentServingStore::open(dir.path()).unwrap();
        let current = store.current().unwrap().unwrap();
        assert_eq!(current.number, 1);
        assert_eq!(*current, {
            let mut expected = generation(3);
            expected.number = 1;
            expected
        });
        assert_eq!(store.publish(generation(4)).unwrap(), 2);
    }
}
