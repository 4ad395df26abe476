use rusqlite::Connection;
use serde::Serialize;
use surveykit_common::{Error, Result};

/// One column definition as reported by `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub not_null: bool,
    pub default_value: Option<String>,
    pub primary_key: bool,
}

/// One named index as reported by `PRAGMA index_list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexInfo {
    pub name: String,
    pub unique: bool,
}

/// The current column and index layout of one table, captured before and
/// after a migration run for diffing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSnapshot {
    pub table: String,
    pub columns: Vec<ColumnInfo>,
    pub indexes: Vec<IndexInfo>,
}

/// Names added or removed between two snapshots of the same table.
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotDiff {
    pub added_columns: Vec<String>,
    pub removed_columns: Vec<String>,
    pub added_indexes: Vec<String>,
    pub removed_indexes: Vec<String>,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.added_columns.is_empty()
            && self.removed_columns.is_empty()
            && self.added_indexes.is_empty()
            && self.removed_indexes.is_empty()
    }
}

impl TableSnapshot {
    pub fn capture(conn: &Connection, table: &str) -> Result<Self> {
        let mut columns = Vec::new();
        conn.pragma(None, "table_info", table, |row| {
            columns.push(ColumnInfo {
                name: row.get(1)?,
                data_type: row.get(2)?,
                not_null: row.get::<_, i64>(3)? != 0,
                default_value: row.get(4)?,
                primary_key: row.get::<_, i64>(5)? != 0,
            });
            Ok(())
        })
        .map_err(|e| Error::Database(format!("failed to read columns of {table}: {e}")))?;

        if columns.is_empty() {
            return Err(Error::NotFound(format!("table {table}")));
        }

        let mut indexes = Vec::new();
        conn.pragma(None, "index_list", table, |row| {
            let name: String = row.get(1)?;
            // Implicit indexes backing PRIMARY KEY / UNIQUE clauses are not
            // part of the migratable surface.
            if !name.starts_with("sqlite_autoindex_") {
                indexes.push(IndexInfo {
                    name,
                    unique: row.get::<_, i64>(2)? != 0,
                });
            }
            Ok(())
        })
        .map_err(|e| Error::Database(format!("failed to read indexes of {table}: {e}")))?;
        indexes.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(Self {
            table: table.to_string(),
            columns,
            indexes,
        })
    }

    /// Column/index names present in `after` but not `self`, and vice versa.
    pub fn diff(&self, after: &TableSnapshot) -> SnapshotDiff {
        let names = |cols: &[ColumnInfo]| cols.iter().map(|c| c.name.clone()).collect::<Vec<_>>();
        let idx_names = |idx: &[IndexInfo]| idx.iter().map(|i| i.name.clone()).collect::<Vec<_>>();

        let before_cols = names(&self.columns);
        let after_cols = names(&after.columns);
        let before_idx = idx_names(&self.indexes);
        let after_idx = idx_names(&after.indexes);

        SnapshotDiff {
            added_columns: after_cols
                .iter()
                .filter(|c| !before_cols.contains(c))
                .cloned()
                .collect(),
            removed_columns: before_cols
                .iter()
                .filter(|c| !after_cols.contains(c))
                .cloned()
                .collect(),
            added_indexes: after_idx
                .iter()
                .filter(|i| !before_idx.contains(i))
                .cloned()
                .collect(),
            removed_indexes: before_idx
                .iter()
                .filter(|i| !after_idx.contains(i))
                .cloned()
                .collect(),
        }
    }
}

pub fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let snapshot = TableSnapshot::capture(conn, table)?;
    Ok(snapshot.columns.iter().any(|c| c.name == column))
}

pub fn index_exists(conn: &Connection, index: &str) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = ?1",
            [index],
            |row| row.get(0),
        )
        .map_err(|e| Error::Database(format!("failed to look up index {index}: {e}")))?;
    Ok(count > 0)
}
