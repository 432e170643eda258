pub mod claim;
pub mod classifier;
pub mod commit;
pub mod identify;
pub mod pipeline;
pub mod watcher;
