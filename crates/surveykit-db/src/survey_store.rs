use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use surveykit_common::{Error, Result};
use tracing::info;
use uuid::Uuid;

use crate::schema;

/// Persistent storage for sites and the equipment rows surveyed at them.
pub struct SurveyStore {
    conn: Mutex<Connection>,
}

/// A persisted site record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteRecord {
    pub id: String,
    pub name: String,
    pub address: Option<String>,
    pub client: Option<String>,
    pub surveyed_at: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A persisted GTB module row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GtbModuleRecord {
    pub id: String,
    pub site_id: String,
    pub name: String,
    pub module_type: Option<String>,
    pub protocol: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
    pub image_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewAerotherme {
    pub brand: Option<String>,
    pub model: Option<String>,
    pub power_kw: Option<f64>,
    pub fuel: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewClimateUnit {
    pub unit_type: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub refrigerant: Option<String>,
    pub cooling_kw: Option<f64>,
    pub heating_kw: Option<f64>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewLightingZone {
    pub zone: String,
    pub fixture_type: Option<String>,
    pub fixture_count: u32,
    pub lamp_power_w: Option<f64>,
    pub control: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewGtbModule {
    pub name: String,
    pub module_type: Option<String>,
    pub protocol: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

impl SurveyStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        info!("opening survey store at {}", db_path.display());
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
            .map_err(|_| Error::Database("survey store lock poisoned".into()))
    }

    pub fn create_site(
        &self,
        name: &str,
        address: Option<&str>,
        client: Option<&str>,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO sites (id, name, address, client) VALUES (?1, ?2, ?3, ?4)",
            params![id, name, address, client],
        )
        .map_err(|e| Error::Database(format!("failed to create site: {e}")))?;
        Ok(id)
    }

    pub fn get_site(&self, id: &str) -> Result<Option<SiteRecord>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, name, address, client, surveyed_at, created_at, updated_at
                 FROM sites WHERE id = ?1",
            )
            .map_err(|e| Error::Database(format!("failed to prepare query: {e}")))?;

        let result = stmt
            .query_row(params![id], |row| {
                Ok(SiteRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    address: row.get(2)?,
                    client: row.get(3)?,
                    surveyed_at: row.get(4)?,
                    created_at: parse_datetime(row.get::<_, String>(5)?),
                    updated_at: parse_datetime(row.get::<_, String>(6)?),
                })
            })
            .ok();

        Ok(result)
    }

    pub fn list_sites(&self) -> Result<Vec<SiteRecord>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, name, address, client, surveyed_at, created_at, updated_at
                 FROM sites ORDER BY created_at ASC",
            )
            .map_err(|e| Error::Database(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(SiteRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    address: row.get(2)?,
                    client: row.get(3)?,
                    surveyed_at: row.get(4)?,
                    created_at: parse_datetime(row.get::<_, String>(5)?),
                    updated_at: parse_datetime(row.get::<_, String>(6)?),
                })
            })
            .map_err(|e| Error::Database(format!("failed to query sites: {e}")))?;

        let mut sites = Vec::new();
        for row in rows {
            sites.push(row.map_err(|e| Error::Database(format!("failed to read site row: {e}")))?);
        }
        Ok(sites)
    }

    pub fn update_site(
        &self,
        id: &str,
        name: &str,
        address: Option<&str>,
        client: Option<&str>,
    ) -> Result<()> {
        let conn = self.connection()?;
        let changed = conn
            .execute(
                "UPDATE sites SET name = ?2, address = ?3, client = ?4,
                        updated_at = datetime('now')
                 WHERE id = ?1",
                params![id, name, address, client],
            )
            .map_err(|e| Error::Database(format!("failed to update site: {e}")))?;
        if changed == 0 {
            return Err(Error::NotFound(format!("site {id}")));
        }
        Ok(())
    }

    pub fn mark_surveyed(&self, id: &str) -> Result<()> {
        let conn = self.connection()?;
        let changed = conn
            .execute(
                "UPDATE sites SET surveyed_at = datetime('now'),
                        updated_at = datetime('now')
                 WHERE id = ?1",
                params![id],
            )
            .map_err(|e| Error::Database(format!("failed to mark site surveyed: {e}")))?;
        if changed == 0 {
            return Err(Error::NotFound(format!("site {id}")));
        }
        Ok(())
    }

    pub fn delete_site(&self, id: &str) -> Result<()> {
        let conn = self.connection()?;
        conn.execute("DELETE FROM sites WHERE id = ?1", params![id])
            .map_err(|e| Error::Database(format!("failed to delete site: {e}")))?;
        Ok(())
    }

    pub fn site_count(&self) -> Result<usize> {
        let conn = self.connection()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM sites", [], |row| row.get(0))
            .map_err(|e| Error::Database(format!("failed to count sites: {e}")))?;
        Ok(count as usize)
    }

    pub fn add_aerotherme(&self, site_id: &str, unit: &NewAerotherme) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO aerothermes (id, site_id, brand, model, power_kw, fuel, location)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                site_id,
                unit.brand,
                unit.model,
                unit.power_kw,
                unit.fuel,
                unit.location
            ],
        )
        .map_err(|e| Error::Database(format!("failed to add aerotherme: {e}")))?;
        Ok(id)
    }

    pub fn add_climate_unit(&self, site_id: &str, unit: &NewClimateUnit) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO climate_units
                 (id, site_id, unit_type, brand, model, refrigerant,
                  cooling_kw, heating_kw, location)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                site_id,
                unit.unit_type,
                unit.brand,
                unit.model,
                unit.refrigerant,
                unit.cooling_kw,
                unit.heating_kw,
                unit.location
            ],
        )
        .map_err(|e| Error::Database(format!("failed to add climate unit: {e}")))?;
        Ok(id)
    }

    pub fn add_lighting_zone(&self, site_id: &str, zone: &NewLightingZone) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO lighting_zones
                 (id, site_id, zone, fixture_type, fixture_count, lamp_power_w, control)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                site_id,
                zone.zone,
                zone.fixture_type,
                zone.fixture_count,
                zone.lamp_power_w,
                zone.control
            ],
        )
        .map_err(|e| Error::Database(format!("failed to add lighting zone: {e}")))?;
        Ok(id)
    }

    pub fn add_gtb_module(&self, site_id: &str, module: &NewGtbModule) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO gtb_modules (id, site_id, name, module_type, protocol, address, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                site_id,
                module.name,
                module.module_type,
                module.protocol,
                module.address,
                module.notes
            ],
        )
        .map_err(|e| Error::Database(format!("failed to add gtb module: {e}")))?;
        Ok(id)
    }

    pub fn list_gtb_modules(&self, site_id: &str) -> Result<Vec<GtbModuleRecord>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, site_id, name, module_type, protocol, address, notes, image_id
                 FROM gtb_modules WHERE site_id = ?1 ORDER BY created_at ASC",
            )
            .map_err(|e| Error::Database(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map(params![site_id], |row| {
                Ok(GtbModuleRecord {
                    id: row.get(0)?,
                    site_id: row.get(1)?,
                    name: row.get(2)?,
                    module_type: row.get(3)?,
                    protocol: row.get(4)?,
                    address: row.get(5)?,
                    notes: row.get(6)?,
                    image_id: row.get(7)?,
                })
            })
            .map_err(|e| Error::Database(format!("failed to query gtb modules: {e}")))?;

        let mut modules = Vec::new();
        for row in rows {
            modules
                .push(row.map_err(|e| Error::Database(format!("failed to read module row: {e}")))?);
        }
        Ok(modules)
    }

    /// Attach an uploaded image to a GTB module.
    pub fn set_gtb_module_image(&self, module_id: &str, image_id: &str) -> Result<()> {
        let conn = self.connection()?;
        let changed = conn
            .execute(
                "UPDATE gtb_modules SET image_id = ?2 WHERE id = ?1",
                params![module_id, image_id],
            )
            .map_err(|e| Error::Database(format!("failed to set module image: {e}")))?;
        if changed == 0 {
            return Err(Error::NotFound(format!("gtb module {module_id}")));
        }
        Ok(())
    }

    pub fn equipment_counts(&self, site_id: &str) -> Result<(usize, usize, usize, usize)> {
        let conn = self.connection()?;
        let count = |table: &str| -> Result<usize> {
            let n: i64 = conn
                .query_row(
                    &format!("SELECT COUNT(*) FROM {table} WHERE site_id = ?1"),
                    params![site_id],
                    |row| row.get(0),
                )
                .map_err(|e| Error::Database(format!("failed to count {table}: {e}")))?;
            Ok(n as usize)
        };
        Ok((
            count("aerothermes")?,
            count("climate_units")?,
            count("lighting_zones")?,
            count("gtb_modules")?,
        ))
    }
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            // SQLite datetime('now') produces "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S")
                .map(|naive| naive.and_utc())
                .unwrap_or_else(|_| Utc::now())
        })
}
