use rusqlite::Connection;
use surveykit_common::Result;

use crate::migrate::{BenignError, MigrationReport, MigrationStep, run_steps};

/// All tables a survey database carries, in creation order.
pub const TABLES: &[&str] = &[
    "sites",
    "aerothermes",
    "climate_units",
    "lighting_zones",
    "gtb_modules",
    "visual_positions",
    "image_sql",
];

pub const BASELINE_SQL: &str = "
CREATE TABLE IF NOT EXISTS sites (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    address TEXT,
    client TEXT,
    surveyed_at TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS aerothermes (
    id TEXT PRIMARY KEY,
    site_id TEXT NOT NULL REFERENCES sites(id) ON DELETE CASCADE,
    brand TEXT,
    model TEXT,
    power_kw REAL,
    fuel TEXT,
    location TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS climate_units (
    id TEXT PRIMARY KEY,
    site_id TEXT NOT NULL REFERENCES sites(id) ON DELETE CASCADE,
    unit_type TEXT,
    brand TEXT,
    model TEXT,
    refrigerant TEXT,
    cooling_kw REAL,
    heating_kw REAL,
    location TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS lighting_zones (
    id TEXT PRIMARY KEY,
    site_id TEXT NOT NULL REFERENCES sites(id) ON DELETE CASCADE,
    zone TEXT NOT NULL,
    fixture_type TEXT,
    fixture_count INTEGER NOT NULL DEFAULT 0,
    lamp_power_w REAL,
    control TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS gtb_modules (
    id TEXT PRIMARY KEY,
    site_id TEXT NOT NULL REFERENCES sites(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    module_type TEXT,
    protocol TEXT,
    address TEXT,
    notes TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS visual_positions (
    id TEXT PRIMARY KEY,
    site_id TEXT NOT NULL REFERENCES sites(id) ON DELETE CASCADE,
    label TEXT NOT NULL,
    image_id TEXT,
    x REAL NOT NULL,
    y REAL NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS image_sql (
    id TEXT PRIMARY KEY,
    filename TEXT NOT NULL,
    url TEXT NOT NULL,
    delete_url TEXT,
    width INTEGER,
    height INTEGER,
    uploaded_at TEXT NOT NULL DEFAULT (datetime('now'))
);
";

/// The fixed, ordered step list. Later steps are the historical schema
/// alterations; they deliberately do not use IF NOT EXISTS so that a rerun
/// exercises the benign-error whitelist instead.
pub const STEPS: &[MigrationStep] = &[
    MigrationStep {
        label: "baseline survey tables",
        sql: BASELINE_SQL,
        benign: &[],
    },
    MigrationStep {
        label: "add image_id to gtb_modules",
        sql: "ALTER TABLE gtb_modules ADD COLUMN image_id TEXT REFERENCES image_sql(id)",
        benign: &[BenignError::DuplicateColumn],
    },
    MigrationStep {
        label: "unique position labels per site",
        sql: "CREATE UNIQUE INDEX idx_visual_positions_site_label
              ON visual_positions(site_id, label)",
        benign: &[BenignError::DuplicateObject],
    },
    MigrationStep {
        label: "drop legacy unique index on gtb module names",
        sql: "DROP INDEX idx_gtb_modules_name_unique",
        benign: &[BenignError::MissingObject],
    },
    MigrationStep {
        label: "site lookup indexes on equipment tables",
        sql: "CREATE INDEX IF NOT EXISTS idx_aerothermes_site ON aerothermes(site_id);
              CREATE INDEX IF NOT EXISTS idx_climate_units_site ON climate_units(site_id);
              CREATE INDEX IF NOT EXISTS idx_lighting_zones_site ON lighting_zones(site_id);
              CREATE INDEX IF NOT EXISTS idx_gtb_modules_site ON gtb_modules(site_id);",
        benign: &[],
    },
];

/// Bring a connection's schema up to date. Safe to call on every open.
pub fn apply(conn: &Connection) -> Result<MigrationReport> {
    run_steps(conn, STEPS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{TableSnapshot, column_exists, index_exists};

    #[test]
    fn apply_creates_all_tables() {
        let conn = Connection::open_in_memory().unwrap();
        let report = apply(&conn).unwrap();
        // Only the legacy-index drop has nothing to do on a fresh database.
        assert_eq!(report.applied(), STEPS.len() - 1);
        assert_eq!(report.skipped(), 1);

        for table in TABLES {
            TableSnapshot::capture(&conn, table).unwrap();
        }
        assert!(column_exists(&conn, "gtb_modules", "image_id").unwrap());
        assert!(index_exists(&conn, "idx_visual_positions_site_label").unwrap());
    }

    #[test]
    fn apply_twice_yields_identical_schema() {
        let conn = Connection::open_in_memory().unwrap();
        apply(&conn).unwrap();
        let before: Vec<_> = TABLES
            .iter()
            .map(|t| TableSnapshot::capture(&conn, t).unwrap())
            .collect();

        let report = apply(&conn).unwrap();
        let after: Vec<_> = TABLES
            .iter()
            .map(|t| TableSnapshot::capture(&conn, t).unwrap())
            .collect();

        assert_eq!(before, after);
        // Second run: the alter steps all report already-applied.
        assert_eq!(report.skipped(), 3);
    }

    #[test]
    fn rerun_preserves_existing_rows() {
        let conn = Connection::open_in_memory().unwrap();
        apply(&conn).unwrap();
        conn.execute(
            "INSERT INTO sites (id, name) VALUES ('s1', 'Depot Nord')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO gtb_modules (id, site_id, name, image_id) VALUES ('m1', 's1', 'CTA-1', NULL)",
            [],
        )
        .unwrap();

        apply(&conn).unwrap();

        let name: String = conn
            .query_row("SELECT name FROM gtb_modules WHERE id = 'm1'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(name, "CTA-1");
    }
}
