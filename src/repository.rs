//! Image metadata persistence seam.
//!
//! Relational persistence is an external collaborator: the pipeline only
//! needs to look up a source record, create the derived record, and (for the
//! delete path) remove one. The [`ImageRepository`] trait captures exactly
//! that surface, injected per request scope rather than reached through a
//! process-wide session.
//!
//! [`InMemoryRepository`] is the reference implementation used by tests and
//! single-process deployments; a SQL-backed implementation slots in behind
//! the same trait.

use crate::record::{ImageRecord, NewImage};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("storage name already in use: {0}")]
    DuplicateStorageName(String),
    #[error("repository backend error: {0}")]
    Backend(String),
}

/// Trait for image metadata stores.
pub trait ImageRepository: Sync {
    fn find_by_id(&self, id: i64) -> Result<Option<ImageRecord>, RepositoryError>;

    /// All records owned by `owner_id`, ordered by id.
    fn find_by_owner(&self, owner_id: i64) -> Result<Vec<ImageRecord>, RepositoryError>;

    /// Persist a new record, assigning its id and timestamps.
    ///
    /// Enforces the storage-name uniqueness invariant.
    fn create(&self, image: NewImage) -> Result<ImageRecord, RepositoryError>;

    /// Delete a record. Returns whether a record existed.
    fn delete(&self, id: i64) -> Result<bool, RepositoryError>;
}

/// Mutex-guarded in-process [`ImageRepository`].
#[derive(Default)]
pub struct InMemoryRepository {
    records: Mutex<HashMap<i64, ImageRecord>>,
    next_id: AtomicI64,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl ImageRepository for InMemoryRepository {
    fn find_by_id(&self, id: i64) -> Result<Option<ImageRecord>, RepositoryError> {
        Ok(self.records.lock().unwrap().get(&id).cloned())
    }

    fn find_by_owner(&self, owner_id: i64) -> Result<Vec<ImageRecord>, RepositoryError> {
        let mut records: Vec<ImageRecord> = self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.id);
        Ok(records)
    }

    fn create(&self, image: NewImage) -> Result<ImageRecord, RepositoryError> {
        let mut records = self.records.lock().unwrap();
        if records
            .values()
            .any(|r| r.storage_name == image.storage_name)
        {
            return Err(RepositoryError::DuplicateStorageName(image.storage_name));
        }
        let now = Utc::now();
        let record = ImageRecord {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            filename: image.filename,
            storage_name: image.storage_name,
            file_path: image.file_path,
            file_size: image.file_size,
            mime_type: image.mime_type,
            owner_id: image.owner_id,
            created_at: now,
            updated_at: now,
        };
        records.insert(record.id, record.clone());
        Ok(record)
    }

    fn delete(&self, id: i64) -> Result<bool, RepositoryError> {
        Ok(self.records.lock().unwrap().remove(&id).is_some())
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    /// Mock repository whose `create` always fails, for exercising the
    /// pipeline's partial-artifact cleanup. Lookups delegate to an inner
    /// in-memory repository.
    pub struct RejectingRepository {
        pub inner: InMemoryRepository,
    }

    impl ImageRepository for RejectingRepository {
        fn find_by_id(&self, id: i64) -> Result<Option<ImageRecord>, RepositoryError> {
            self.inner.find_by_id(id)
        }

        fn find_by_owner(&self, owner_id: i64) -> Result<Vec<ImageRecord>, RepositoryError> {
            self.inner.find_by_owner(owner_id)
        }

        fn create(&self, _image: NewImage) -> Result<ImageRecord, RepositoryError> {
            Err(RepositoryError::Backend("constraint violation".into()))
        }

        fn delete(&self, id: i64) -> Result<bool, RepositoryError> {
            self.inner.delete(id)
        }
    }

    fn new_image(storage_name: &str, owner_id: i64) -> NewImage {
        NewImage {
            filename: "photo.jpg".into(),
            storage_name: storage_name.into(),
            file_path: format!("uploads/2026/8/{storage_name}"),
            file_size: 100,
            mime_type: "image/jpeg".into(),
            owner_id,
        }
    }

    #[test]
    fn create_assigns_sequential_ids_and_timestamps() {
        let repo = InMemoryRepository::new();
        let a = repo.create(new_image("a.jpg", 1)).unwrap();
        let b = repo.create(new_image("b.jpg", 1)).unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(a.created_at, a.updated_at);
    }

    #[test]
    fn find_by_id_returns_created_record() {
        let repo = InMemoryRepository::new();
        let created = repo.create(new_image("a.jpg", 1)).unwrap();
        let found = repo.find_by_id(created.id).unwrap().unwrap();
        assert_eq!(found, created);
        assert_eq!(repo.find_by_id(999).unwrap(), None);
    }

    #[test]
    fn duplicate_storage_name_is_rejected() {
        let repo = InMemoryRepository::new();
        repo.create(new_image("same.jpg", 1)).unwrap();
        let err = repo.create(new_image("same.jpg", 2)).unwrap_err();
        assert!(matches!(err, RepositoryError::DuplicateStorageName(_)));
    }

    #[test]
    fn find_by_owner_filters_and_orders() {
        let repo = InMemoryRepository::new();
        repo.create(new_image("a.jpg", 1)).unwrap();
        repo.create(new_image("b.jpg", 2)).unwrap();
        repo.create(new_image("c.jpg", 1)).unwrap();

        let owned = repo.find_by_owner(1).unwrap();
        assert_eq!(owned.len(), 2);
        assert!(owned[0].id < owned[1].id);
        assert!(owned.iter().all(|r| r.owner_id == 1));
    }

    #[test]
    fn delete_reports_existence() {
        let repo = InMemoryRepository::new();
        let created = repo.create(new_image("a.jpg", 1)).unwrap();
        assert!(repo.delete(created.id).unwrap());
        assert!(!repo.delete(created.id).unwrap());
        assert_eq!(repo.find_by_id(created.id).unwrap(), None);
    }
}
