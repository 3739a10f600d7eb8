pub mod app_stats;
pub mod classification;
pub mod cleanup;
pub mod duplicates;
pub mod file_state;
pub mod models;
pub mod settings;
pub mod similarity;
pub mod sqlite;

pub use cleanup::CleanupCounts;
pub use sqlite::Database;
