pub mod cache;
pub mod collaborators;
pub mod config;
pub mod engine;
pub mod error;
pub mod feature;
pub mod fingerprint;
pub mod invalidation;
pub mod paths;
pub mod policy;
pub mod progress;
pub mod query;
pub mod scanner;
pub mod storage;

pub use cache::MediaCache;
pub use config::MediaCacheConfig;
pub use engine::{AnalysisEngine, AnalysisSummary};
pub use error::{Error, ExtractError};
pub use feature::{ClassificationFlag, Feature, Predicate};
pub use invalidation::Cleanup;
pub use policy::PolicyEngine;
pub use progress::{ProgressReporter, SilentReporter};
pub use query::QueryLayer;
