use rusqlite::Connection;
use surveykit_common::{Error, Result};
use tracing::{info, warn};

/// Driver errors that mean a schema change was already applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BenignError {
    /// `ALTER TABLE ... ADD COLUMN` for a column that is already there.
    DuplicateColumn,
    /// `CREATE TABLE` / `CREATE INDEX` for an object that already exists.
    DuplicateObject,
    /// `DROP INDEX` / `DROP COLUMN` for an object that is already gone.
    MissingObject,
}

/// One ordered unit of schema change: a label for logs, the SQL to run, and
/// the benign error classes this step is allowed to shrug off.
pub struct MigrationStep {
    pub label: &'static str,
    pub sql: &'static str,
    pub benign: &'static [BenignError],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Applied,
    SkippedBenign(BenignError),
}

/// Per-step outcomes of a migration run.
#[derive(Debug, Default)]
pub struct MigrationReport {
    pub outcomes: Vec<(&'static str, StepOutcome)>,
}

impl MigrationReport {
    pub fn applied(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, StepOutcome::Applied))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.applied()
    }
}

/// Map a driver error onto a benign class, or `None` if it is fatal.
///
/// SQLite reports all of these conditions as plain `SQLITE_ERROR`; the
/// message text is the only discriminator the driver exposes, so the
/// matching lives here and nowhere else.
pub fn classify_error(err: &rusqlite::Error) -> Option<BenignError> {
    let msg = match err {
        rusqlite::Error::SqliteFailure(_, Some(msg)) => msg.as_str(),
        rusqlite::Error::SqlInputError { msg, .. } => msg.as_str(),
        _ => return None,
    };

    if msg.contains("duplicate column name") {
        Some(BenignError::DuplicateColumn)
    } else if msg.contains("already exists") {
        Some(BenignError::DuplicateObject)
    } else if msg.contains("no such index") || msg.contains("no such column") {
        Some(BenignError::MissingObject)
    } else {
        None
    }
}

/// Run `steps` strictly in order on `conn`.
///
/// A step that fails with a benign error listed in its own whitelist is
/// logged and skipped. Any other error aborts the run and no subsequent
/// step executes. Steps are not wrapped in a transaction: each one is
/// individually idempotent, so a run that aborts partway can simply be
/// re-run after the cause is fixed.
pub fn run_steps(conn: &Connection, steps: &[MigrationStep]) -> Result<MigrationReport> {
    let mut report = MigrationReport::default();

    for step in steps {
        match conn.execute_batch(step.sql) {
            Ok(()) => {
                info!("migration step applied: {}", step.label);
                report.outcomes.push((step.label, StepOutcome::Applied));
            }
            Err(err) => match classify_error(&err) {
                Some(benign) if step.benign.contains(&benign) => {
                    warn!(
                        "migration step '{}' already applied ({benign:?}), skipping: {err}",
                        step.label
                    );
                    report
                        .outcomes
                        .push((step.label, StepOutcome::SkippedBenign(benign)));
                }
                _ => {
                    return Err(Error::Migration(format!(
                        "step '{}' failed: {err}",
                        step.label
                    )));
                }
            },
        }
    }

    Ok(report)
}
