//! Image database queries.
//!
//! This module provides CRUD operations for image records with inline
//! payloads, plus the aggregate used by the admin statistics endpoint.

use chrono::{SecondsFormat, SubsecRound, Utc};
use pixshare_common::{Error, ImageId, Result, UserId};
use rusqlite::Connection;

use super::{timestamp_column, unsigned_column, uuid_column};
use crate::models::{ImageRecord, NewImage, StorageStats};

const IMAGE_COLUMNS: &str = "id, owner_id, file_name, mime_type, byte_size, width, height, \
                             upload_number, payload, created_at";

/// Parse an image from a database row.
///
/// Expects columns in the order of `IMAGE_COLUMNS`.
fn parse_image_row(row: &rusqlite::Row) -> rusqlite::Result<ImageRecord> {
    Ok(ImageRecord {
        id: ImageId::from(uuid_column(row, 0)?),
        owner_id: UserId::from(uuid_column(row, 1)?),
        file_name: row.get(2)?,
        mime_type: row.get(3)?,
        byte_size: unsigned_column(row, 4)?,
        width: unsigned_column(row, 5)?,
        height: unsigned_column(row, 6)?,
        upload_number: unsigned_column(row, 7)?,
        payload: row.get(8)?,
        created_at: timestamp_column(row, 9)?,
    })
}

/// Insert a new image record.
///
/// The store assigns the id, the creation time and the owner's next upload
/// number, and derives `byte_size` from the payload.
///
/// # Returns
///
/// * `Ok(ImageRecord)` - The record as persisted
/// * `Err(Error)` - If a database error occurs
pub fn insert_image(conn: &Connection, image: &NewImage) -> Result<ImageRecord> {
    let id = ImageId::new();
    // Fixed precision keeps the TEXT column lexicographically ordered
    let created_at = Utc::now().trunc_subsecs(6);
    let byte_size = image.payload.len() as u64;

    conn.execute(
        "INSERT INTO images (id, owner_id, file_name, mime_type, byte_size, width, height,
                             upload_number, payload, created_at)
         VALUES (:id, :owner_id, :file_name, :mime_type, :byte_size, :width, :height,
                 (SELECT COALESCE(MAX(upload_number), 0) + 1 FROM images WHERE owner_id = :owner_id),
                 :payload, :created_at)",
        rusqlite::named_params! {
            ":id": id.to_string(),
            ":owner_id": image.owner_id.to_string(),
            ":file_name": &image.file_name,
            ":mime_type": &image.mime_type,
            ":byte_size": byte_size as i64,
            ":width": image.width as i64,
            ":height": image.height as i64,
            ":payload": &image.payload,
            ":created_at": created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
        },
    )
    .map_err(|e| {
        if e.to_string().contains("FOREIGN KEY constraint failed") {
            Error::invalid_input(format!("Unknown owner {}", image.owner_id))
        } else {
            Error::database(e.to_string())
        }
    })?;

    let upload_number: i64 = conn
        .query_row(
            "SELECT upload_number FROM images WHERE id = :id",
            rusqlite::named_params! { ":id": id.to_string() },
            |row| row.get(0),
        )
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(ImageRecord {
        id,
        owner_id: image.owner_id,
        file_name: image.file_name.clone(),
        mime_type: image.mime_type.clone(),
        byte_size,
        width: image.width,
        height: image.height,
        upload_number: u32::try_from(upload_number).unwrap_or(u32::MAX),
        payload: image.payload.clone(),
        created_at,
    })
}

/// Get an image by ID.
///
/// # Returns
///
/// * `Ok(Some(ImageRecord))` - The image if found
/// * `Ok(None)` - If the image does not exist
/// * `Err(Error)` - If a database error occurs
pub fn get_image(conn: &Connection, id: ImageId) -> Result<Option<ImageRecord>> {
    let result = conn.query_row(
        &format!("SELECT {} FROM images WHERE id = :id", IMAGE_COLUMNS),
        rusqlite::named_params! { ":id": id.to_string() },
        parse_image_row,
    );

    match result {
        Ok(image) => Ok(Some(image)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Get all images uploaded by an owner, newest first.
pub fn list_images_for_owner(conn: &Connection, owner_id: UserId) -> Result<Vec<ImageRecord>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM images
             WHERE owner_id = :owner_id
             ORDER BY created_at DESC, upload_number DESC",
            IMAGE_COLUMNS
        ))
        .map_err(|e| Error::database(e.to_string()))?;

    let images = stmt
        .query_map(
            rusqlite::named_params! { ":owner_id": owner_id.to_string() },
            parse_image_row,
        )
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(images)
}

/// Delete an image by ID.
///
/// # Returns
///
/// * `Ok(true)` - If the image was deleted
/// * `Ok(false)` - If the image did not exist
/// * `Err(Error)` - If a database error occurs
pub fn delete_image(conn: &Connection, id: ImageId) -> Result<bool> {
    let rows_affected = conn
        .execute(
            "DELETE FROM images WHERE id = :id",
            rusqlite::named_params! { ":id": id.to_string() },
        )
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(rows_affected > 0)
}

/// Total bytes and number of stored images.
pub fn storage_stats(conn: &Connection) -> Result<StorageStats> {
    let (total, count): (i64, i64) = conn
        .query_row(
            "SELECT COALESCE(SUM(byte_size), 0), COUNT(*) FROM images",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(StorageStats {
        total_size: total.max(0) as u64,
        file_count: count.max(0) as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;
    use crate::pool::init_memory_pool;
    use crate::queries::users::create_user;

    fn new_image(owner: &User, name: &str, payload: Vec<u8>) -> NewImage {
        NewImage {
            owner_id: owner.id,
            file_name: name.to_string(),
            mime_type: "image/jpeg".to_string(),
            width: 640,
            height: 480,
            payload,
        }
    }

    #[test]
    fn test_insert_and_get_image() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let owner = create_user(&conn, "alice", "hash", false).unwrap();

        let record = insert_image(&conn, &new_image(&owner, "cat.jpg", vec![1, 2, 3, 4])).unwrap();
        assert_eq!(record.byte_size, 4);
        assert_eq!(record.upload_number, 1);

        let fetched = get_image(&conn, record.id).unwrap().unwrap();
        assert_eq!(fetched.file_name, "cat.jpg");
        assert_eq!(fetched.owner_id, owner.id);
        assert_eq!(fetched.payload, vec![1, 2, 3, 4]);
        assert_eq!(fetched.byte_size, fetched.payload.len() as u64);
        assert_eq!((fetched.width, fetched.height), (640, 480));
    }

    #[test]
    fn test_get_missing_image() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();

        assert!(get_image(&conn, ImageId::new()).unwrap().is_none());
    }

    #[test]
    fn test_upload_numbers_are_per_owner() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let alice = create_user(&conn, "alice", "hash", false).unwrap();
        let bob = create_user(&conn, "bob", "hash", false).unwrap();

        let a1 = insert_image(&conn, &new_image(&alice, "a1", vec![0])).unwrap();
        let a2 = insert_image(&conn, &new_image(&alice, "a2", vec![0])).unwrap();
        let b1 = insert_image(&conn, &new_image(&bob, "b1", vec![0])).unwrap();

        assert_eq!(a1.upload_number, 1);
        assert_eq!(a2.upload_number, 2);
        assert_eq!(b1.upload_number, 1);

        // Numbering continues from the owner's highest remaining number,
        // so deleting the newest image frees its number for the next upload
        delete_image(&conn, a2.id).unwrap();
        let a3 = insert_image(&conn, &new_image(&alice, "a3", vec![0])).unwrap();
        assert_eq!(a3.upload_number, 2);
    }

    #[test]
    fn test_unknown_owner_rejected() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let ghost = User {
            id: UserId::new(),
            username: "ghost".to_string(),
            password_hash: String::new(),
            is_admin: false,
            created_at: Utc::now(),
        };

        let err = insert_image(&conn, &new_image(&ghost, "x", vec![0])).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_list_images_newest_first() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let alice = create_user(&conn, "alice", "hash", false).unwrap();
        let bob = create_user(&conn, "bob", "hash", false).unwrap();

        insert_image(&conn, &new_image(&alice, "first", vec![0])).unwrap();
        insert_image(&conn, &new_image(&alice, "second", vec![0])).unwrap();
        insert_image(&conn, &new_image(&bob, "other", vec![0])).unwrap();

        let list = list_images_for_owner(&conn, alice.id).unwrap();
        let names: Vec<_> = list.iter().map(|i| i.file_name.as_str()).collect();
        assert_eq!(names, vec!["second", "first"]);
    }

    #[test]
    fn test_delete_image() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let alice = create_user(&conn, "alice", "hash", false).unwrap();
        let record = insert_image(&conn, &new_image(&alice, "x", vec![9])).unwrap();

        assert!(delete_image(&conn, record.id).unwrap());
        assert!(!delete_image(&conn, record.id).unwrap());
        assert!(get_image(&conn, record.id).unwrap().is_none());
    }

    #[test]
    fn test_storage_stats() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();

        assert_eq!(storage_stats(&conn).unwrap(), StorageStats::default());

        let alice = create_user(&conn, "alice", "hash", false).unwrap();
        insert_image(&conn, &new_image(&alice, "a", vec![0; 10])).unwrap();
        insert_image(&conn, &new_image(&alice, "b", vec![0; 32])).unwrap();

        let stats = storage_stats(&conn).unwrap();
        assert_eq!(stats.total_size, 42);
        assert_eq!(stats.file_count, 2);
    }
}
