pub mod document;
pub mod error;
pub mod schema;
pub mod workspace;

pub use document::SqliteDocument;
pub use error::{Result, StoreError};
pub use workspace::{Workspace, default_base_dir, sanitize_name};
