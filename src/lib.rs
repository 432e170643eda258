pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use config::{ExtensionPolicy, IngestConfig};
pub use error::IngestError;
pub use models::{FileRecord, IngestOutcome, WatchEvent, WatchEventKind};
pub use services::pipeline::{Pipeline, PipelineHandle, PipelineReport};
