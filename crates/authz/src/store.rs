//! Storage port for permission records.

use crate::{Error, Permission, PermissionFilter, PermissionRecord, Result};
use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Persistence boundary of the engine.
///
/// Implementations own the uniqueness invariant: at most one record per
/// `(action, entity, role)` triple. The engine checks before inserting, but
/// only the store can guarantee it under concurrent writers.
pub trait PermissionStore {
    /// Records matching `filter`, in no particular order.
    fn query(&self, filter: &PermissionFilter) -> Result<Vec<PermissionRecord>>;

    /// Persist a new record.
    ///
    /// Fails with [`Error::DuplicateKey`] if its triple already exists.
    fn insert(&self, record: PermissionRecord) -> Result<PermissionRecord>;

    /// Replace the stored record with the same id.
    ///
    /// Fails with [`Error::NotFound`] if the id does not exist.
    fn update(&self, record: &PermissionRecord) -> Result<()>;

    /// Remove exactly the given records. Missing ones are ignored.
    ///
    /// Returns the number of records actually removed.
    fn delete(&self, records: &[PermissionRecord]) -> Result<usize>;
}

impl<S: PermissionStore + ?Sized> PermissionStore for &S {
    fn query(&self, filter: &PermissionFilter) -> Result<Vec<PermissionRecord>> {
        (**self).query(filter)
    }

    fn insert(&self, record: PermissionRecord) -> Result<PermissionRecord> {
        (**self).insert(record)
    }

    fn update(&self, record: &PermissionRecord) -> Result<()> {
        (**self).update(record)
    }

    fn delete(&self, records: &[PermissionRecord]) -> Result<usize> {
        (**self).delete(records)
    }
}

impl<S: PermissionStore + ?Sized> PermissionStore for std::sync::Arc<S> {
    fn query(&self, filter: &PermissionFilter) -> Result<Vec<PermissionRecord>> {
        (**self).query(filter)
    }

    fn insert(&self, record: PermissionRecord) -> Result<PermissionRecord> {
        (**self).insert(record)
    }

    fn update(&self, record: &PermissionRecord) -> Result<()> {
        (**self).update(record)
    }

    fn delete(&self, records: &[PermissionRecord]) -> Result<usize> {
        (**self).delete(records)
    }
}

/// In-memory permission store.
///
/// Safe to share between threads; each operation holds the lock for its
/// whole duration, so duplicate inserts are always rejected.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Vec<PermissionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl PermissionStore for MemoryStore {
    fn query(&self, filter: &PermissionFilter) -> Result<Vec<PermissionRecord>> {
        if filter.is_empty_match() {
            return Ok(Vec::new());
        }
        let records = self.records.read();
        Ok(records.iter().filter(|r| filter.matches(r)).cloned().collect())
    }

    fn insert(&self, record: PermissionRecord) -> Result<PermissionRecord> {
        reject_none(&record)?;
        let mut records = self.records.write();
        let key = record.key();
        if records.iter().any(|r| r.matches_key(&key) || r.id == record.id) {
            return Err(key.duplicate());
        }
        debug!(id = %record.id, action = %record.action, role = %record.role, "inserted permission");
        records.push(record.clone());
        Ok(record)
    }

    fn update(&self, record: &PermissionRecord) -> Result<()> {
        reject_none(record)?;
        let mut records = self.records.write();
        let key = record.key();
        if records.iter().any(|r| r.id != record.id && r.matches_key(&key)) {
            return Err(key.duplicate());
        }
        let existing = records
            .iter_mut()
            .find(|r| r.id == record.id)
            .ok_or(Error::NotFound(record.id))?;
        *existing = record.clone();
        Ok(())
    }

    fn delete(&self, records: &[PermissionRecord]) -> Result<usize> {
        let ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
        let mut stored = self.records.write();
        let before = stored.len();
        stored.retain(|r| !ids.contains(&r.id));
        Ok(before - stored.len())
    }
}

fn reject_none(record: &PermissionRecord) -> Result<()> {
    if record.permission == Permission::None {
        return Err(Error::Invalid(format!(
            "record {} has no verdict to store",
            record.id
        )));
    }
    Ok(())
}
