use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "media-cache")]
#[command(about = "Media analysis and deduplication cache", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Discover media under the configured roots and analyze what is due
    Scan,
    /// List cached records matching a predicate (blur, meme, sad, distracted,
    /// sleeping, low_light, selfie, group_picture)
    List { predicate: String },
    /// Show exact-duplicate groups, largest wasted space first
    Duplicates,
    /// Show near-duplicate groups, optionally within one folder
    Similar {
        #[arg(long)]
        parent: Option<String>,
    },
    /// Clear one flag on the given paths, keeping the rest of each record
    Unset { flag: String, paths: Vec<String> },
    /// Manage per-feature directory rules
    Policy {
        #[command(subcommand)]
        action: PolicyAction,
    },
    /// Manage feature toggles and migration versions
    Feature {
        #[command(subcommand)]
        action: FeatureAction,
    },
    /// Forget every cached result under a path prefix
    Cleanup { prefix: String },
    /// Remove cached paths under a prefix that no longer exist on disk
    Prune { prefix: String },
    /// Move cached results from one path to another
    Rename { from: String, to: String },
    /// Record and query per-app storage samples
    App {
        #[command(subcommand)]
        action: AppAction,
    },
    /// Print configuration values
    PrintConfig,
    /// Truncate all analysis tables
    TruncateDb,
}

#[derive(Debug, Subcommand)]
pub enum PolicyAction {
    /// Include (or, with --exclude, exclude) a directory for a feature
    Add {
        feature: String,
        directory: String,
        #[arg(long)]
        exclude: bool,
    },
    Remove { feature: String, directory: String },
    /// List rules, for one feature or all
    List { feature: Option<String> },
    /// Insert the default include rules under the configured storage root
    Seed,
}

#[derive(Debug, Subcommand)]
pub enum FeatureAction {
    Enable { feature: String },
    Disable { feature: String },
    /// Bump the migration version so cached results are recomputed lazily
    Bump { feature: String },
    /// Show toggle and migration version of every feature
    Status,
}

#[derive(Debug, Subcommand)]
pub enum AppAction {
    Register { package: String },
    /// Record a size sample; the timestamp defaults to now (ms)
    Sample {
        package: String,
        size: i64,
        #[arg(long)]
        timestamp: Option<i64>,
    },
    /// Earliest sample within the last N days
    Delta {
        package: String,
        #[arg(long, default_value_t = 7)]
        days: i64,
    },
    /// Delete samples older than N days
    Retain {
        #[arg(long, default_value_t = 30)]
        days: i64,
    },
}
