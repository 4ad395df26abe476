pub mod image_store;
pub mod migrate;
pub mod schema;
pub mod snapshot;
pub mod survey_store;

pub use image_store::{ImageRecord, ImageStore, MarkerRecord};
pub use migrate::{BenignError, MigrationReport, MigrationStep, StepOutcome, run_steps};
pub use snapshot::{ColumnInfo, IndexInfo, SnapshotDiff, TableSnapshot};
pub use survey_store::{
    GtbModuleRecord, NewAerotherme, NewClimateUnit, NewGtbModule, NewLightingZone, SiteRecord,
    SurveyStore,
};
