mod commands;
mod logging;
mod progress;

use std::io::{self, Write};
use std::process;
use std::sync::atomic::AtomicBool;

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{AppAction, Cli, Commands, FeatureAction, PolicyAction};
use dotenv::dotenv;
use media_cache_core::{ClassificationFlag, Feature, MediaCache, MediaCacheConfig, Predicate};
use progress::CliReporter;
use tracing::{error, info};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

fn main() {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match media_cache_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();
    let Some(command) = args.command else {
        let _ = Cli::command().print_long_help();
        return;
    };

    if let Err(err) = run(command, config) {
        error!("Error: {:#}", err);
        process::exit(1);
    }
}

fn run(command: Commands, config: MediaCacheConfig) -> Result<()> {
    if let Commands::PrintConfig = command {
        println!("Configuration: {:?}", config);
        return Ok(());
    }

    let storage_root = config.storage_root.clone();
    let cache = MediaCache::open(config).context("opening the cache database")?;

    match command {
        Commands::Scan => run_scan(&cache)?,
        Commands::List { predicate } => {
            let predicate: Predicate = predicate.parse()?;
            let records = cache.query.all_of_feature(predicate)?;
            for record in &records {
                println!("{}", record.path);
            }
            info!("{} records match {}", format!("{}", records.len()).cyan(), predicate);
        }
        Commands::Duplicates => {
            let groups = cache.query.find_duplicate_groups()?;
            for entry in &groups {
                let group = &entry.group;
                let mut tags = Vec::new();
                if group.is_directory {
                    tags.push("directory");
                } else if group.is_empty {
                    tags.push("empty");
                }
                if group.is_junk {
                    tags.push("junk");
                }
                println!(
                    "{} ({} copies, {} bytes wasted) {}",
                    &group.checksum.as_str()[..group.checksum.as_str().len().min(12)],
                    group.member_count,
                    format!("{}", group.wasted_bytes).red(),
                    tags.join(",").dimmed()
                );
                for member in &entry.members {
                    println!("    {}", member);
                }
            }
            let wasted: i64 = groups.iter().map(|g| g.group.wasted_bytes).sum();
            info!(
                "{} duplicate groups, {} bytes wasted",
                format!("{}", groups.len()).red(),
                format!("{}", wasted).red()
            );
        }
        Commands::Similar { parent } => {
            let groups = match parent {
                Some(parent) => cache.query.find_similar_groups_under_parent(&parent)?,
                None => cache.query.find_similar_groups()?,
            };
            for group in &groups {
                println!("{} ({} images)", group.fingerprint, group.members.len());
                for member in &group.members {
                    println!("    {}", member);
                }
            }
            info!("{} similar groups", format!("{}", groups.len()).cyan());
        }
        Commands::Unset { flag, paths } => {
            let flag: ClassificationFlag = flag.parse()?;
            let updated = cache.cleanup.unset_flag(flag, &paths)?;
            info!("Cleared {} on {} records", flag, updated);
        }
        Commands::Policy { action } => run_policy(&cache, action, storage_root.as_deref())?,
        Commands::Feature { action } => run_feature(&cache, action)?,
        Commands::Cleanup { prefix } => {
            cache.cleanup.delete_by_path_prefix(&prefix)?;
        }
        Commands::Prune { prefix } => {
            let missing = cache.cleanup.prune_missing(&prefix)?;
            info!("Removed {} missing paths under {}", missing.len(), prefix);
        }
        Commands::Rename { from, to } => {
            cache.cleanup.rename_path(&from, &to)?;
        }
        Commands::App { action } => run_app(&cache, action)?,
        Commands::TruncateDb => {
            if prompt_confirm(
                "Are you SURE you want to delete every cached analysis result?",
                Some(false),
            )? {
                cache.db.truncate_all()?;
                println!("All analysis tables truncated");
            }
        }
        Commands::PrintConfig => {}
    }

    Ok(())
}

fn run_scan(cache: &MediaCache) -> Result<()> {
    let reporter = CliReporter::new();
    let cancel = AtomicBool::new(false);
    let summary = cache.engine.run(&reporter, &cancel)?;

    println!();
    info!(
        "Discover: {}, Analyze: {}",
        format!("{:.2}s", summary.discover_duration.as_secs_f64()).green(),
        format!("{:.2}s", summary.analyze_duration.as_secs_f64()).green(),
    );
    info!(
        "{} analyzed, {} up to date, {} failed",
        format!("{}", summary.files_analyzed).green(),
        format!("{}", summary.files_up_to_date).cyan(),
        format!("{}", summary.files_failed).red(),
    );
    info!(
        "{} classifications, {} checksums, {} similarity fingerprints written",
        summary.classifications_written, summary.checksums_recorded, summary.fingerprints_recorded,
    );
    Ok(())
}

fn run_policy(cache: &MediaCache, action: PolicyAction, storage_root: Option<&str>) -> Result<()> {
    match action {
        PolicyAction::Add {
            feature,
            directory,
            exclude,
        } => {
            let feature: Feature = feature.parse()?;
            let (id, dropped) = cache.add_policy(&directory, feature, exclude)?;
            info!("Rule {} saved; {} cached results dropped", id, dropped);
        }
        PolicyAction::Remove { feature, directory } => {
            let feature: Feature = feature.parse()?;
            let (removed, dropped) = cache.remove_policy(&directory, feature)?;
            if !removed {
                bail!("no {} rule for {}", feature, directory);
            }
            info!("Rule removed; {} cached results dropped", dropped);
        }
        PolicyAction::List { feature } => {
            let policies = match feature {
                Some(feature) => cache.policy.list_policies(feature.parse()?)?,
                None => cache.policy.list_all_policies()?,
            };
            for policy in policies {
                let kind = if policy.excludes {
                    "exclude".red()
                } else {
                    "include".green()
                };
                println!("{:>4}  {:<15} {} {}", policy.id, policy.feature, kind, policy.directory_path);
            }
        }
        PolicyAction::Seed => {
            let Some(root) = storage_root else {
                bail!("storage_root is not configured");
            };
            let seeded = cache.seed_default_policies(root)?;
            info!("{} default rules inserted", seeded);
        }
    }
    Ok(())
}

fn run_feature(cache: &MediaCache, action: FeatureAction) -> Result<()> {
    match action {
        FeatureAction::Enable { feature } => {
            cache.set_feature_enabled(feature.parse()?, true)?;
        }
        FeatureAction::Disable { feature } => {
            let dropped = cache.set_feature_enabled(feature.parse()?, false)?;
            info!("{} cached results dropped", dropped);
        }
        FeatureAction::Bump { feature } => {
            cache.policy.bump_migration_version(feature.parse()?)?;
        }
        FeatureAction::Status => {
            for feature in Feature::ALL {
                let setting = cache.db.feature_setting(feature)?;
                let state = if setting.enabled {
                    "enabled".green()
                } else {
                    "disabled".red()
                };
                println!("{:<15} {:<9} v{}", feature, state, setting.migration_version);
            }
        }
    }
    Ok(())
}

fn run_app(cache: &MediaCache, action: AppAction) -> Result<()> {
    let now = chrono::Utc::now().timestamp_millis();
    match action {
        AppAction::Register { package } => {
            cache.db.register_app(&package)?;
        }
        AppAction::Sample {
            package,
            size,
            timestamp,
        } => {
            if !cache
                .db
                .record_app_storage_sample(&package, timestamp.unwrap_or(now), size)?
            {
                bail!("{} is not registered", package);
            }
        }
        AppAction::Delta { package, days } => {
            match cache
                .query
                .storage_delta_for_app(&package, now - days * DAY_MS, now)?
            {
                Some(sample) => {
                    let latest = cache
                        .db
                        .samples_for_app(&package)?
                        .last()
                        .map(|s| s.package_size)
                        .unwrap_or(sample.package_size);
                    println!(
                        "{}: {} bytes at {} ({:+} bytes since)",
                        package,
                        sample.package_size,
                        sample.timestamp,
                        latest - sample.package_size
                    );
                }
                None => println!("{}: no samples in the last {} days", package, days),
            }
        }
        AppAction::Retain { days } => {
            let removed = cache.db.delete_samples_older_than(now - days * DAY_MS)?;
            info!("{} samples older than {} days removed", removed, days);
        }
    }
    Ok(())
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        io::stdin().read_line(&mut input)?;

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
