//! In-memory stand-ins for the object store and the warehouse
use crate::consts::STATUS_TAG;
use crate::manifest::LoadManifest;
use crate::s3::S3Location;
use crate::store::{ObjectStore, StoreError};
use crate::warehouse::{
    ConnectionError, LoadInstruction, Warehouse, WarehouseConnection, WarehouseError,
};
use futures_util::{stream, Stream};
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone, Debug)]
struct MemoryObject {
    location: S3Location,
    content: Vec<u8>,
    tags: BTreeMap<String, String>,
    tag_reads: usize,
    tag_writes: usize,
}

#[derive(Debug, Default)]
struct StoreState {
    /// Keyed by URL, so iteration order is listing order
    objects: BTreeMap<String, MemoryObject>,
    fail_listing: bool,
    fail_tag_reads: BTreeSet<String>,
    fail_tag_writes: BTreeSet<String>,
    fail_writes: BTreeSet<String>,
}

/// An [`ObjectStore`] that keeps everything in memory.  Clones share state.
#[derive(Clone, Debug, Default)]
pub(crate) struct MemoryStore(Arc<Mutex<StoreState>>);

impl MemoryObject {
    fn new(location: S3Location, content: Vec<u8>) -> MemoryObject {
        MemoryObject {
            location,
            content,
            tags: BTreeMap::new(),
            tag_reads: 0,
            tag_writes: 0,
        }
    }
}

impl MemoryStore {
    pub(crate) fn new() -> MemoryStore {
        MemoryStore::default()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.0.lock().unwrap()
    }

    pub(crate) fn insert(&self, url: &str, content: &[u8]) {
        let location = url.parse::<S3Location>().unwrap();
        self.state()
            .objects
            .insert(url.to_owned(), MemoryObject::new(location, content.to_vec()));
    }

    pub(crate) fn insert_tagged(&self, url: &str, content: &[u8], status: &str) {
        self.insert(url, content);
        self.set_tag(url, STATUS_TAG, status);
    }

    pub(crate) fn set_tag(&self, url: &str, name: &str, value: &str) {
        self.state()
            .objects
            .get_mut(url)
            .unwrap()
            .tags
            .insert(name.to_owned(), value.to_owned());
    }

    pub(crate) fn tag(&self, url: &str, name: &str) -> Option<String> {
        self.state().objects.get(url)?.tags.get(name).cloned()
    }

    pub(crate) fn status(&self, url: &str) -> Option<String> {
        self.tag(url, STATUS_TAG)
    }

    pub(crate) fn content(&self, url: &str) -> Option<Vec<u8>> {
        self.state().objects.get(url).map(|obj| obj.content.clone())
    }

    pub(crate) fn urls(&self) -> Vec<String> {
        self.state().objects.keys().cloned().collect()
    }

    pub(crate) fn tag_reads(&self, url: &str) -> usize {
        self.state().objects.get(url).map_or(0, |obj| obj.tag_reads)
    }

    pub(crate) fn tag_writes(&self, url: &str) -> usize {
        self.state().objects.get(url).map_or(0, |obj| obj.tag_writes)
    }

    pub(crate) fn fail_listing(&self) {
        self.state().fail_listing = true;
    }

    pub(crate) fn fail_tag_read_of(&self, url: &str) {
        self.state().fail_tag_reads.insert(url.to_owned());
    }

    pub(crate) fn fail_tag_write_of(&self, url: &str) {
        self.state().fail_tag_writes.insert(url.to_owned());
    }

    pub(crate) fn fail_write_of(&self, url: &str) {
        self.state().fail_writes.insert(url.to_owned());
    }
}

fn injected() -> io::Error {
    io::Error::other("injected failure")
}

impl ObjectStore for MemoryStore {
    fn list_objects(
        &self,
        namespace: &S3Location,
    ) -> impl Stream<Item = Result<S3Location, StoreError>> + Send {
        let state = self.state();
        let items = if state.fail_listing {
            vec![Err(StoreError::List {
                url: namespace.clone(),
                source: injected().into(),
            })]
        } else {
            let prefix = namespace.to_string();
            state
                .objects
                .iter()
                .filter(|(url, _)| url.starts_with(&prefix))
                .map(|(_, obj)| Ok(obj.location.clone()))
                .collect()
        };
        stream::iter(items)
    }

    async fn get_tag(&self, object: &S3Location, name: &str) -> Result<Option<String>, StoreError> {
        let url = object.to_string();
        let mut state = self.state();
        let get_error = |source: io::Error| StoreError::GetTag {
            url: object.clone(),
            source: source.into(),
        };
        if state.fail_tag_reads.contains(&url) {
            return Err(get_error(injected()));
        }
        let Some(obj) = state.objects.get_mut(&url) else {
            return Err(get_error(io::ErrorKind::NotFound.into()));
        };
        obj.tag_reads += 1;
        Ok(obj.tags.get(name).cloned())
    }

    async fn put_tag(&self, object: &S3Location, name: &str, value: &str) -> Result<(), StoreError> {
        let url = object.to_string();
        let mut state = self.state();
        let put_error = |source: io::Error| StoreError::PutTag {
            url: object.clone(),
            tag: name.to_owned(),
            source: source.into(),
        };
        if state.fail_tag_writes.contains(&url) {
            return Err(put_error(injected()));
        }
        let Some(obj) = state.objects.get_mut(&url) else {
            return Err(put_error(io::ErrorKind::NotFound.into()));
        };
        obj.tag_writes += 1;
        obj.tags.insert(name.to_owned(), value.to_owned());
        Ok(())
    }

    async fn read_object(&self, object: &S3Location) -> Result<Vec<u8>, StoreError> {
        self.content(&object.to_string())
            .ok_or_else(|| StoreError::Read {
                url: object.clone(),
                source: io::Error::from(io::ErrorKind::NotFound).into(),
            })
    }

    async fn write_object(&self, object: &S3Location, content: Vec<u8>) -> Result<(), StoreError> {
        let url = object.to_string();
        let mut state = self.state();
        if state.fail_writes.contains(&url) {
            return Err(StoreError::Write {
                url: object.clone(),
                source: injected().into(),
            });
        }
        state
            .objects
            .insert(url, MemoryObject::new(object.clone(), content));
        Ok(())
    }
}

#[derive(Debug, Default)]
struct WarehouseLog {
    connects: usize,
    closes: usize,
    statements: Vec<String>,
    loads: Vec<String>,
    ingested: Vec<String>,
}

/// A [`Warehouse`] that records what it is asked to do.  Clones share the
/// same log.
#[derive(Clone, Debug, Default)]
pub(crate) struct FakeWarehouse {
    log: Arc<Mutex<WarehouseLog>>,
    source: Option<MemoryStore>,
    fail_load_of: Option<String>,
    fail_statements: bool,
    refuse_connections: bool,
}

impl FakeWarehouse {
    pub(crate) fn new() -> FakeWarehouse {
        FakeWarehouse::default()
    }

    /// Resolve each bulk-load's manifest against `store` and record the
    /// objects it names, failing if the manifest or any mandatory entry is
    /// missing
    pub(crate) fn reading_from(mut self, store: &MemoryStore) -> FakeWarehouse {
        self.source = Some(store.clone());
        self
    }

    /// Make bulk-loads of the given object fail
    pub(crate) fn fail_load_of(mut self, url: &str) -> FakeWarehouse {
        self.fail_load_of = Some(url.to_owned());
        self
    }

    /// Make every plain SQL statement fail
    pub(crate) fn fail_statements(mut self) -> FakeWarehouse {
        self.fail_statements = true;
        self
    }

    pub(crate) fn refuse_connections(mut self) -> FakeWarehouse {
        self.refuse_connections = true;
        self
    }

    fn log(&self) -> MutexGuard<'_, WarehouseLog> {
        self.log.lock().unwrap()
    }

    /// URLs of all attempted bulk-loads, in order
    pub(crate) fn loads(&self) -> Vec<String> {
        self.log().loads.clone()
    }

    /// URLs of the objects whose content was ingested, in order.  Only
    /// populated when [`reading_from()`][FakeWarehouse::reading_from] is set.
    pub(crate) fn ingested(&self) -> Vec<String> {
        self.log().ingested.clone()
    }

    pub(crate) fn statements(&self) -> Vec<String> {
        self.log().statements.clone()
    }

    pub(crate) fn connects(&self) -> usize {
        self.log().connects
    }

    pub(crate) fn closes(&self) -> usize {
        self.log().closes
    }
}

impl Warehouse for FakeWarehouse {
    type Connection = FakeConnection;

    async fn connect(&self) -> Result<FakeConnection, ConnectionError> {
        if self.refuse_connections {
            return Err(ConnectionError {
                target: "localhost:5439/dev".into(),
                source: WarehouseError::new(io::Error::from(io::ErrorKind::ConnectionRefused)),
            });
        }
        self.log().connects += 1;
        Ok(FakeConnection {
            warehouse: self.clone(),
        })
    }
}

#[derive(Debug)]
pub(crate) struct FakeConnection {
    warehouse: FakeWarehouse,
}

impl WarehouseConnection for FakeConnection {
    async fn execute(&mut self, sql: &str) -> Result<u64, WarehouseError> {
        if self.warehouse.fail_statements {
            return Err(WarehouseError::new(injected()));
        }
        self.warehouse.log().statements.push(sql.to_owned());
        Ok(0)
    }

    async fn bulk_load(&mut self, instruction: &LoadInstruction<'_>) -> Result<(), WarehouseError> {
        let url = instruction.source().to_string();
        self.warehouse.log().loads.push(url.clone());
        if self.warehouse.fail_load_of.as_ref() == Some(&url) {
            return Err(WarehouseError::new(injected()));
        }
        let mut ingested = Vec::new();
        if let Some(store) = &self.warehouse.source {
            let Some(content) = store.content(&instruction.manifest().to_string()) else {
                return Err(WarehouseError::new(io::Error::from(io::ErrorKind::NotFound)));
            };
            let manifest =
                serde_json::from_slice::<LoadManifest>(&content).map_err(WarehouseError::new)?;
            for entry in manifest.entries {
                if store.content(&entry.url).is_none() && entry.mandatory {
                    return Err(WarehouseError::new(io::Error::from(io::ErrorKind::NotFound)));
                }
                ingested.push(entry.url);
            }
        }
        let mut log = self.warehouse.log();
        log.statements.push(instruction.to_sql());
        log.ingested.extend(ingested);
        Ok(())
    }

    async fn close(self) -> Result<(), WarehouseError> {
        self.warehouse.log().closes += 1;
        Ok(())
    }
}
