pub mod applicator;
pub mod loader;
pub mod schema;
pub mod settings;

pub use applicator::{apply_plan, ApplyOptions};
pub use loader::{load_from_path, load_from_str, load_plan, load_settings, ConfigError, Validate};
pub use schema::{EditPlan, PlanMeta, PlanOperation, PlannedEdit, ValidationError, ValidationIssue};
pub use settings::{ApprovalSettings, LayoutSettings, LogFormat, LoggingSettings, Settings};
