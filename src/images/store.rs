//! Record store seam for image records.
//!
//! Handlers and the upload service only see [`ImageStore`]; the SQLite
//! implementation is injected at startup so tests can substitute a store
//! that fails on demand.

use pixshare_common::{Error, ImageId, Result, UserId};
use pixshare_db::models::{ImageRecord, NewImage, StorageStats};
use pixshare_db::pool::{get_conn, DbPool};
use pixshare_db::queries::images;

/// Persistence collaborator for [`ImageRecord`]s.
pub trait ImageStore: Send + Sync {
    /// Fetch a record. `Err(Error::NotFound)` when the id is unknown.
    fn get(&self, id: ImageId) -> Result<ImageRecord>;

    /// Persist a new record and return it with its assigned id.
    fn put(&self, image: NewImage) -> Result<ImageRecord>;

    /// Remove a record. With `owner` set, only that user's record may be
    /// removed; a mismatch is `Err(Error::Forbidden)`.
    fn delete(&self, id: ImageId, owner: Option<UserId>) -> Result<()>;

    /// All records uploaded by `owner`, newest first.
    fn list_for_owner(&self, owner: UserId) -> Result<Vec<ImageRecord>>;

    /// Aggregate size and count over every record.
    fn stats(&self) -> Result<StorageStats>;
}

/// [`ImageStore`] backed by the `images` table.
#[derive(Clone)]
pub struct SqliteImageStore {
    pool: DbPool,
}

impl SqliteImageStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl ImageStore for SqliteImageStore {
    fn get(&self, id: ImageId) -> Result<ImageRecord> {
        let conn = get_conn(&self.pool)?;
        images::get_image(&conn, id)?.ok_or_else(|| Error::not_found(format!("image {}", id)))
    }

    fn put(&self, image: NewImage) -> Result<ImageRecord> {
        let conn = get_conn(&self.pool)?;
        images::insert_image(&conn, &image)
    }

    fn delete(&self, id: ImageId, owner: Option<UserId>) -> Result<()> {
        let conn = get_conn(&self.pool)?;

        let record = images::get_image(&conn, id)?
            .ok_or_else(|| Error::not_found(format!("image {}", id)))?;

        if let Some(owner) = owner {
            if record.owner_id != owner {
                return Err(Error::forbidden("image belongs to another user"));
            }
        }

        if !images::delete_image(&conn, id)? {
            return Err(Error::not_found(format!("image {}", id)));
        }
        Ok(())
    }

    fn list_for_owner(&self, owner: UserId) -> Result<Vec<ImageRecord>> {
        let conn = get_conn(&self.pool)?;
        images::list_images_for_owner(&conn, owner)
    }

    fn stats(&self) -> Result<StorageStats> {
        let conn = get_conn(&self.pool)?;
        images::storage_stats(&conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixshare_db::pool::init_memory_pool;
    use pixshare_db::queries::users::create_user;

    fn setup() -> (SqliteImageStore, UserId, UserId) {
        let pool = init_memory_pool().unwrap();
        let (alice, bob) = {
            let conn = pool.get().unwrap();
            let alice = create_user(&conn, "alice", "h", false).unwrap();
            let bob = create_user(&conn, "bob", "h", false).unwrap();
            (alice.id, bob.id)
        };
        (SqliteImageStore::new(pool), alice, bob)
    }

    fn new_image(owner: UserId) -> NewImage {
        NewImage {
            owner_id: owner,
            file_name: "photo.jpg".to_string(),
            mime_type: "image/jpeg".to_string(),
            width: 10,
            height: 10,
            payload: vec![0xFF, 0xD8, 0xFF],
        }
    }

    #[test]
    fn test_put_then_get() {
        let (store, alice, _) = setup();
        let record = store.put(new_image(alice)).unwrap();

        let fetched = store.get(record.id).unwrap();
        assert_eq!(fetched, record);
        assert_eq!(fetched.byte_size, 3);
    }

    #[test]
    fn test_get_unknown_is_not_found() {
        let (store, _, _) = setup();
        assert!(matches!(store.get(ImageId::new()), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_delete_checks_owner() {
        let (store, alice, bob) = setup();
        let record = store.put(new_image(alice)).unwrap();

        let err = store.delete(record.id, Some(bob)).unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
        assert!(store.get(record.id).is_ok());

        store.delete(record.id, Some(alice)).unwrap();
        assert!(matches!(store.get(record.id), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_delete_without_owner_check() {
        let (store, alice, _) = setup();
        let record = store.put(new_image(alice)).unwrap();

        store.delete(record.id, None).unwrap();
        assert!(matches!(
            store.delete(record.id, None),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_list_and_stats() {
        let (store, alice, bob) = setup();
        store.put(new_image(alice)).unwrap();
        store.put(new_image(alice)).unwrap();
        store.put(new_image(bob)).unwrap();

        assert_eq!(store.list_for_owner(alice).unwrap().len(), 2);
        assert_eq!(store.list_for_owner(bob).unwrap().len(), 1);

        let stats = store.stats().unwrap();
        assert_eq!(stats.file_count, 3);
        assert_eq!(stats.total_size, 9);
    }
}
