use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use surveykit_common::{Error, Result};
use tracing::info;
use uuid::Uuid;

use crate::schema;

/// Storage for uploaded image metadata (`image_sql`) and the markers placing
/// those images on a site plan (`visual_positions`).
pub struct ImageStore {
    conn: Mutex<Connection>,
}

/// A persisted uploaded-image row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: String,
    pub filename: String,
    pub url: String,
    pub delete_url: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// A marker placed on a site plan, optionally backed by an uploaded image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerRecord {
    pub id: String,
    pub site_id: String,
    pub label: String,
    pub image_id: Option<String>,
    pub x: f64,
    pub y: f64,
}

impl ImageStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        info!("opening image store at {}", db_path.display());
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;
        schema::apply(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Database("image store lock poisoned".into()))
    }

    pub fn insert_image(
        &self,
        filename: &str,
        url: &str,
        delete_url: Option<&str>,
        width: Option<u32>,
        height: Option<u32>,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO image_sql (id, filename, url, delete_url, width, height)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, filename, url, delete_url, width, height],
        )
        .map_err(|e| Error::Database(format!("failed to insert image: {e}")))?;
        Ok(id)
    }

    pub fn get_image(&self, id: &str) -> Result<Option<ImageRecord>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, filename, url, delete_url, width, height
                 FROM image_sql WHERE id = ?1",
            )
            .map_err(|e| Error::Database(format!("failed to prepare query: {e}")))?;

        let result = stmt
            .query_row(params![id], |row| {
                Ok(ImageRecord {
                    id: row.get(0)?,
                    filename: row.get(1)?,
                    url: row.get(2)?,
                    delete_url: row.get(3)?,
                    width: row.get(4)?,
                    height: row.get(5)?,
                })
            })
            .ok();

        Ok(result)
    }

    pub fn delete_image(&self, id: &str) -> Result<()> {
        let conn = self.connection()?;
        conn.execute("DELETE FROM image_sql WHERE id = ?1", params![id])
            .map_err(|e| Error::Database(format!("failed to delete image: {e}")))?;
        Ok(())
    }

    /// Place (or move) a marker on a site plan. The (site, label) pair is
    /// unique, so placing the same label again updates the position.
    pub fn place_marker(
        &self,
        site_id: &str,
        label: &str,
        image_id: Option<&str>,
        x: f64,
        y: f64,
    ) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO visual_positions (id, site_id, label, image_id, x, y)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(site_id, label)
             DO UPDATE SET image_id = excluded.image_id, x = excluded.x, y = excluded.y",
            params![Uuid::new_v4().to_string(), site_id, label, image_id, x, y],
        )
        .map_err(|e| Error::Database(format!("failed to place marker: {e}")))?;
        Ok(())
    }

    pub fn list_markers(&self, site_id: &str) -> Result<Vec<MarkerRecord>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, site_id, label, image_id, x, y
                 FROM visual_positions WHERE site_id = ?1 ORDER BY label ASC",
            )
            .map_err(|e| Error::Database(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map(params![site_id], |row| {
                Ok(MarkerRecord {
                    id: row.get(0)?,
                    site_id: row.get(1)?,
                    label: row.get(2)?,
                    image_id: row.get(3)?,
                    x: row.get(4)?,
                    y: row.get(5)?,
                })
            })
            .map_err(|e| Error::Database(format!("failed to query markers: {e}")))?;

        let mut markers = Vec::new();
        for row in rows {
            markers
                .push(row.map_err(|e| Error::Database(format!("failed to read marker row: {e}")))?);
        }
        Ok(markers)
    }

    pub fn remove_marker(&self, site_id: &str, label: &str) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "DELETE FROM visual_positions WHERE site_id = ?1 AND label = ?2",
            params![site_id, label],
        )
        .map_err(|e| Error::Database(format!("failed to remove marker: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_site() -> (ImageStore, String) {
        let store = ImageStore::in_memory().unwrap();
        {
            let conn = store.connection().unwrap();
            conn.execute("INSERT INTO sites (id, name) VALUES ('s1', 'Depot')", [])
                .unwrap();
        }
        (store, "s1".to_string())
    }

    #[test]
    fn insert_and_get_image_round_trip() {
        let store = ImageStore::in_memory().unwrap();
        let id = store
            .insert_image(
                "plan-rdc.png",
                "https://i.ibb.co/abc/plan-rdc.png",
                Some("https://ibb.co/delete/abc"),
                Some(1920),
                Some(1080),
            )
            .unwrap();

        let image = store.get_image(&id).unwrap().unwrap();
        assert_eq!(image.filename, "plan-rdc.png");
        assert_eq!(image.width, Some(1920));
        assert_eq!(
            image.delete_url.as_deref(),
            Some("https://ibb.co/delete/abc")
        );
    }

    #[test]
    fn delete_image_removes_row() {
        let store = ImageStore::in_memory().unwrap();
        let id = store.insert_image("a.jpg", "http://x", None, None, None).unwrap();
        store.delete_image(&id).unwrap();
        assert!(store.get_image(&id).unwrap().is_none());
    }

    #[test]
    fn place_marker_then_move_it() {
        let (store, site_id) = store_with_site();
        store
            .place_marker(&site_id, "chaufferie", None, 0.25, 0.75)
            .unwrap();
        store
            .place_marker(&site_id, "chaufferie", None, 0.5, 0.5)
            .unwrap();

        let markers = store.list_markers(&site_id).unwrap();
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].label, "chaufferie");
        assert_eq!(markers[0].x, 0.5);
        assert_eq!(markers[0].y, 0.5);
    }

    #[test]
    fn markers_are_listed_per_site_sorted_by_label() {
        let (store, site_id) = store_with_site();
        store.place_marker(&site_id, "tgbt", None, 0.9, 0.1).unwrap();
        store
            .place_marker(&site_id, "accueil", None, 0.1, 0.1)
            .unwrap();

        let markers = store.list_markers(&site_id).unwrap();
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].label, "accueil");
        assert_eq!(markers[1].label, "tgbt");
    }

    #[test]
    fn remove_marker_by_label() {
        let (store, site_id) = store_with_site();
        store.place_marker(&site_id, "tgbt", None, 0.9, 0.1).unwrap();
        store.remove_marker(&site_id, "tgbt").unwrap();
        assert!(store.list_markers(&site_id).unwrap().is_empty());
    }
}
