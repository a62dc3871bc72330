//! Main Store struct tying the log and the query engine together.

use crate::error::{Result, StoreError};
use crate::query::{compile, FieldMatch, FindOptions, Predicate, Query};
use crate::records::{RecordLog, StorageEngine};
use crate::types::{live_mask, Document, LogRecord, StoreStats};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Path of the log file.
    pub path: PathBuf,

    /// Fields searched by `$text` queries.
    pub text_fields: Vec<String>,

    /// How query objects with several field keys are evaluated.
    pub field_match: FieldMatch,

    /// Keep decoded records in memory between calls instead of re-reading
    /// the log every time.
    pub cache_records: bool,

    /// Whether to create an empty log if the file doesn't exist.
    pub create_if_missing: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./store.log"),
            text_fields: Vec::new(),
            field_match: FieldMatch::AllFields,
            cache_records: false,
            create_if_missing: true,
        }
    }
}

impl StoreConfig {
    pub fn builder() -> StoreConfigBuilder {
        StoreConfigBuilder::default()
    }
}

/// Builder for [`StoreConfig`].
#[derive(Default)]
pub struct StoreConfigBuilder {
    config: StoreConfig,
}

impl StoreConfigBuilder {
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.path = path.into();
        self
    }

    /// Add a field to the full-text search list.
    pub fn text_field(mut self, field: impl Into<String>) -> Self {
        self.config.text_fields.push(field.into());
        self
    }

    pub fn text_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.text_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn field_match(mut self, mode: FieldMatch) -> Self {
        self.config.field_match = mode;
        self
    }

    pub fn cache_records(mut self, enabled: bool) -> Self {
        self.config.cache_records = enabled;
        self
    }

    pub fn create_if_missing(mut self, enabled: bool) -> Self {
        self.config.create_if_missing = enabled;
        self
    }

    pub fn build(self) -> StoreConfig {
        self.config
    }
}

/// An embedded record store over a line log.
///
/// `T` is the record type accepted by [`Store::insert`]; it must serialize
/// to a JSON object. Queries always run over the decoded [`Document`]s.
///
/// Only one mutating call at a time is safe per file. Mutations through one
/// `Store` are serialized, but two handles (or two processes) on the same
/// file can still lose each other's writes.
pub struct Store<T = Document, E: StorageEngine = RecordLog> {
    /// Store configuration.
    config: StoreConfig,

    engine: E,

    /// Decoded records, when `cache_records` is on.
    cache: RwLock<Option<Vec<LogRecord>>>,

    /// Lock for write operations.
    write_lock: Mutex<()>,

    _record: PhantomData<fn(&T)>,
}

impl<T: Serialize> Store<T, RecordLog> {
    /// Open a store on the local filesystem.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let log = RecordLog::open(&config.path);
        if !log.exists() {
            if !config.create_if_missing {
                return Err(StoreError::NotInitialized);
            }
            log.create()?;
            info!(path = %config.path.display(), "created empty log");
        }
        info!(
            path = %config.path.display(),
            text_fields = ?config.text_fields,
            "opened store"
        );
        Ok(Self::with_engine(log, config))
    }

    pub fn path(&self) -> &Path {
        self.engine.path()
    }
}

impl<T: Serialize, E: StorageEngine> Store<T, E> {
    /// Build a store over any storage engine.
    pub fn with_engine(engine: E, config: StoreConfig) -> Self {
        Self {
            config,
            engine,
            cache: RwLock::new(None),
            write_lock: Mutex::new(()),
            _record: PhantomData,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    // --- Queries ---

    /// Records matching `query`, sorted then projected per `options`.
    ///
    /// Without options, records come back whole in log order.
    pub fn find(&self, query: &Query, options: Option<&FindOptions>) -> Result<Vec<Document>> {
        let predicate = self.compile(query);
        let records = self.records()?;
        let live = live_mask(&records);
        let matched: Vec<Document> = records
            .into_iter()
            .zip(live)
            .filter(|(_, live)| *live)
            .map(|(record, _)| record.into_data())
            .filter(|data| predicate(data))
            .collect();
        debug!(query = %query, matched = matched.len(), "find");

        Ok(match options {
            Some(options) => options.apply(matched),
            None => matched,
        })
    }

    /// [`Store::find`] with the query and options given as JSON.
    pub fn find_json(&self, query: &Value, options: Option<&Value>) -> Result<Vec<Document>> {
        let query = Query::from_json(query)?;
        let options = options.map(FindOptions::from_json).transpose()?;
        self.find(&query, options.as_ref())
    }

    /// Record counts, tombstones included.
    pub fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats::from_records(&self.records()?))
    }

    // --- Mutations ---

    /// Append a record to the end of the log.
    pub fn insert(&self, record: &T) -> Result<()> {
        let data = match serde_json::to_value(record)? {
            Value::Object(map) => map,
            other => {
                return Err(StoreError::InvalidOperation(format!(
                    "records must serialize to a JSON object, got {}",
                    other
                )))
            }
        };

        let _lock = self.write_lock.lock();
        // Locked until the appended line is reflected in the cache, so a fill
        // never reads it from the log as well.
        let mut cache = self.cache.write();
        self.engine.append(&data)?;

        if let Some(records) = cache.as_mut() {
            records.push(LogRecord::active(data));
        }
        Ok(())
    }

    /// Tombstone every live record matching `query` and rewrite the log.
    ///
    /// Returns how many records were newly deleted. Records that are
    /// already tombstoned, or shadowed by a later tombstone, are never
    /// tested again.
    pub fn delete(&self, query: &Query) -> Result<usize> {
        let predicate = self.compile(query);

        let _lock = self.write_lock.lock();
        let mut records = self.records()?;
        let live = live_mask(&records);

        let mut deleted = 0;
        for (record, _) in records.iter_mut().zip(live).filter(|(_, live)| *live) {
            if predicate(record.data()) && record.tombstone() {
                deleted += 1;
            }
        }

        self.engine.rewrite(&records)?;
        info!(query = %query, deleted, total = records.len(), "deleted records");

        if self.config.cache_records {
            *self.cache.write() = Some(records);
        }
        Ok(deleted)
    }

    /// [`Store::delete`] with the query given as JSON.
    pub fn delete_json(&self, query: &Value) -> Result<usize> {
        self.delete(&Query::from_json(query)?)
    }

    /// Drop cached records so the next call reads the log again.
    pub fn invalidate_cache(&self) {
        *self.cache.write() = None;
    }

    fn compile(&self, query: &Query) -> Predicate {
        compile(query, &self.config.text_fields, self.config.field_match)
    }

    /// All records, from the cache when enabled.
    fn records(&self) -> Result<Vec<LogRecord>> {
        if !self.config.cache_records {
            return self.engine.load();
        }

        if let Some(records) = self.cache.read().as_ref() {
            return Ok(records.clone());
        }

        let mut cache = self.cache.write();
        if let Some(records) = cache.as_ref() {
            return Ok(records.clone());
        }
        let records = self.engine.load()?;
        *cache = Some(records.clone());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Sort, SortDirection};
    use crate::records::{FileAccess, MemoryAccess};
    use serde_json::json;
    use std::io;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    type MemoryStore = Store<Value, RecordLog<Arc<MemoryAccess>>>;

    fn test_config(dir: &TempDir) -> StoreConfig {
        StoreConfig::builder()
            .path(dir.path().join("store.log"))
            .text_field("bio")
            .build()
    }

    fn memory_store(contents: &str) -> (Arc<MemoryAccess>, MemoryStore) {
        let access = Arc::new(MemoryAccess::new().with_file("store.log", contents));
        let log = RecordLog::with_access("store.log", Arc::clone(&access));
        let store = Store::with_engine(log, StoreConfig::builder().text_field("bio").build());
        (access, store)
    }

    #[test]
    fn test_create_store() {
        let dir = TempDir::new().unwrap();
        let store: Store = Store::open(test_config(&dir)).unwrap();

        assert!(store.path().exists());
        assert!(store.find(&Query::all(), None).unwrap().is_empty());
    }

    #[test]
    fn test_open_missing_without_create() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::builder()
            .path(dir.path().join("missing.log"))
            .create_if_missing(false)
            .build();

        let result: Result<Store> = Store::open(config);
        assert!(matches!(result, Err(StoreError::NotInitialized)));
    }

    #[test]
    fn test_insert_then_find() {
        let dir = TempDir::new().unwrap();
        let store: Store<Value> = Store::open(test_config(&dir)).unwrap();

        store.insert(&json!({"id": 1, "name": "a"})).unwrap();

        let found = store.find(&Query::all(), None).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(Value::Object(found[0].clone()), json!({"id": 1, "name": "a"}));
    }

    #[test]
    fn test_insert_rejects_non_objects() {
        let (_, store) = memory_store("");
        let result = store.insert(&json!([1, 2]));
        assert!(matches!(result, Err(StoreError::InvalidOperation(_))));
    }

    #[test]
    fn test_tombstoned_records_are_hidden() {
        let (_, store) = memory_store(
            "E{\"id\":1,\"name\":\"x\"}\nE{\"id\":2,\"name\":\"y\"}\nD{\"id\":1,\"name\":\"x\"}",
        );

        let first = store.find(&Query::eq("id", 1), None).unwrap();
        assert!(first.is_empty());

        let second = store.find(&Query::eq("id", 2), None).unwrap();
        assert_eq!(Value::Object(second[0].clone()), json!({"id": 2, "name": "y"}));
    }

    #[test]
    fn test_delete_rewrites_log() {
        let (access, store) = memory_store("E{\"id\":1}\nE{\"id\":2}\nE{\"id\":3}");

        let deleted = store.delete(&Query::is_in("id", [1, 3])).unwrap();
        assert_eq!(deleted, 2);

        let raw = access.contents(Path::new("store.log")).unwrap();
        assert_eq!(raw, b"D{\"id\":1}\nE{\"id\":2}\nD{\"id\":3}");
    }

    #[test]
    fn test_delete_is_monotonic() {
        let (access, store) = memory_store("D{\"id\":1}\nE{\"id\":2}");

        // Matching everything only touches the live record
        assert_eq!(store.delete(&Query::all()).unwrap(), 1);
        assert_eq!(store.delete(&Query::all()).unwrap(), 0);

        let raw = access.contents(Path::new("store.log")).unwrap();
        assert_eq!(raw, b"D{\"id\":1}\nD{\"id\":2}");
        assert!(store.find(&Query::all(), None).unwrap().is_empty());
    }

    #[test]
    fn test_find_with_options() {
        let (_, store) = memory_store(
            "E{\"id\":3,\"name\":\"c\"}\nE{\"id\":1,\"name\":\"a\"}\nE{\"id\":2,\"name\":\"b\"}",
        );

        let options = FindOptions::new()
            .project(["name"])
            .sort(Sort::new().by("id", SortDirection::Descending));
        let found = store.find(&Query::gt("id", 1), Some(&options)).unwrap();

        let found: Vec<Value> = found.into_iter().map(Value::Object).collect();
        assert_eq!(found, vec![json!({"name": "c"}), json!({"name": "b"})]);
    }

    #[test]
    fn test_find_json() {
        let (_, store) = memory_store(concat!(
            "E{\"id\":1,\"bio\":\"Loves Go and Rust\"}\n",
            "E{\"id\":2,\"bio\":\"Python\"}",
        ));

        let found = store
            .find_json(&json!({"$text": "go"}), Some(&json!({"projection": {"id": 1}})))
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["id"], json!(1));
    }

    #[test]
    fn test_cached_store_sees_its_own_writes() {
        let access = Arc::new(MemoryAccess::new().with_file("store.log", "E{\"id\":1}"));
        let log = RecordLog::with_access("store.log", Arc::clone(&access));
        let store: Store<Value, _> =
            Store::with_engine(log, StoreConfig::builder().cache_records(true).build());

        assert_eq!(store.find(&Query::all(), None).unwrap().len(), 1);

        store.insert(&json!({"id": 2})).unwrap();
        assert_eq!(store.find(&Query::all(), None).unwrap().len(), 2);

        store.delete(&Query::eq("id", 1)).unwrap();
        let found = store.find(&Query::all(), None).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["id"], json!(2));
    }

    #[test]
    fn test_cached_store_ignores_outside_changes_until_invalidated() {
        let access = Arc::new(MemoryAccess::new().with_file("store.log", "E{\"id\":1}"));
        let log = RecordLog::with_access("store.log", Arc::clone(&access));
        let store: Store<Value, _> =
            Store::with_engine(log, StoreConfig::builder().cache_records(true).build());

        assert_eq!(store.find(&Query::all(), None).unwrap().len(), 1);

        access
            .write(Path::new("store.log"), b"E{\"id\":1}\nE{\"id\":9}")
            .unwrap();
        assert_eq!(store.find(&Query::all(), None).unwrap().len(), 1);

        store.invalidate_cache();
        assert_eq!(store.find(&Query::all(), None).unwrap().len(), 2);
    }

    /// Memory files whose appends land immediately but return late.
    struct SlowAppend {
        inner: MemoryAccess,
        delay: Duration,
    }

    impl FileAccess for SlowAppend {
        fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
            self.inner.read(path)
        }

        fn append(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
            self.inner.append(path, bytes)?;
            thread::sleep(self.delay);
            Ok(())
        }

        fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
            self.inner.write(path, bytes)
        }

        fn exists(&self, path: &Path) -> bool {
            self.inner.exists(path)
        }
    }

    #[test]
    fn test_cached_store_find_during_insert() {
        let access = Arc::new(SlowAppend {
            inner: MemoryAccess::new().with_file("store.log", "E{\"id\":0}"),
            delay: Duration::from_millis(200),
        });
        let log = RecordLog::with_access("store.log", Arc::clone(&access));
        let store: Arc<Store<Value, _>> = Arc::new(Store::with_engine(
            log,
            StoreConfig::builder().cache_records(true).build(),
        ));

        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || store.insert(&json!({"id": 1})))
        };
        thread::sleep(Duration::from_millis(50));
        let during = store.find(&Query::all(), None).unwrap();
        writer.join().unwrap().unwrap();

        assert_eq!(during.len(), 2);
        assert_eq!(store.find(&Query::all(), None).unwrap().len(), 2);

        // The cached list is what delete writes back
        store.delete(&Query::eq("id", 0)).unwrap();
        let raw = access.inner.contents(Path::new("store.log")).unwrap();
        assert_eq!(raw, b"D{\"id\":0}\nE{\"id\":1}");
    }

    #[test]
    fn test_cached_store_concurrent_inserts_and_finds() {
        let access = Arc::new(MemoryAccess::new());
        let log = RecordLog::with_access("store.log", Arc::clone(&access));
        log.create().unwrap();
        let store: Arc<Store<Value, _>> = Arc::new(Store::with_engine(
            log,
            StoreConfig::builder().cache_records(true).build(),
        ));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..25 {
                        store.insert(&json!({"thread": t, "seq": i})).unwrap();
                        store.find(&Query::eq("thread", t), None).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.find(&Query::all(), None).unwrap().len(), 100);
        store.invalidate_cache();
        assert_eq!(store.find(&Query::all(), None).unwrap().len(), 100);
    }

    #[test]
    fn test_uncached_store_rereads() {
        let (access, store) = memory_store("E{\"id\":1}");
        access.append(Path::new("store.log"), b"\nE{\"id\":2}").unwrap();
        assert_eq!(store.find(&Query::all(), None).unwrap().len(), 2);
    }

    #[test]
    fn test_delete_skips_shadowed_entries() {
        let (access, store) = memory_store("E{\"id\":1}\nD{\"id\":1}\nE{\"id\":2}");

        assert_eq!(store.delete(&Query::all()).unwrap(), 1);
        let raw = access.contents(Path::new("store.log")).unwrap();
        assert_eq!(raw, b"E{\"id\":1}\nD{\"id\":1}\nD{\"id\":2}");
    }

    #[test]
    fn test_float_tombstone_hides_integer_entry() {
        let (_, store) = memory_store("E{\"id\":1}\nE{\"id\":2}\nD{\"id\":1.0}");

        let found = store.find(&Query::all(), None).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["id"], json!(2));
    }

    #[test]
    fn test_stats() {
        let (_, store) = memory_store("E{\"id\":1}\nD{\"id\":2}");
        store.insert(&json!({"id": 3})).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.active_records, 2);
        assert_eq!(stats.deleted_records, 1);
        assert_eq!(stats.total_records, 3);
    }

    #[test]
    fn test_persistence() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);

        {
            let store: Store<Value> = Store::open(config.clone()).unwrap();
            for i in 1..=5 {
                store.insert(&json!({"id": i})).unwrap();
            }
            store.delete(&Query::lt("id", 3)).unwrap();
        }

        {
            let store: Store<Value> = Store::open(config).unwrap();
            let stats = store.stats().unwrap();
            assert_eq!(stats.active_records, 3);
            assert_eq!(stats.deleted_records, 2);
        }
    }
}
