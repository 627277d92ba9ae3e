mod cli;
mod frontmatter;
mod vault;

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use propwright_core::settings::validate_settings_schema;
use propwright_core::{
    migrate, DocumentStore, MigrationReport, ScanScope, ScanSummary, Scanner, Settings,
};
use tracing::{info, warn};

use crate::cli::{Cli, Commands};
use crate::vault::{DryRun, FsVault};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "propwright_core=debug,info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    let settings_path = cli.settings_path();

    match &cli.command {
        Commands::Run {
            scope,
            count,
            rule,
            dry_run,
            json,
        } => {
            let mut settings = load_settings(&settings_path, !dry_run)?;
            let vault = FsVault::new(&cli.vault).with_inline_title(settings.use_inline_title);

            let mut scan_scope = settings.scan_scope();
            if let Some(scope) = scope {
                scan_scope = ScanScope::new((*scope).into(), scan_scope.count as u32);
            }
            if let Some(count) = count {
                scan_scope = ScanScope::new(scan_scope.mode, *count);
            }

            let rules = match rule {
                Some(index) => match settings.rules.get(*index) {
                    Some(rule) => std::slice::from_ref(rule),
                    None => bail!(
                        "rule {} does not exist ({} rules configured)",
                        index,
                        settings.rules.len()
                    ),
                },
                None => settings.rules.as_slice(),
            };

            let scanner = Scanner::from_settings(&settings);
            let summary = if *dry_run {
                scan(&scanner, &DryRun::new(vault), rules, &scan_scope)?
            } else {
                scan(&scanner, &vault, rules, &scan_scope)?
            };
            print_summary(&summary, *json)?;

            // Only a full, real scan counts as a run
            if rule.is_none() && !dry_run {
                settings.touch_last_run(Utc::now());
                settings
                    .save(&settings_path)
                    .with_context(|| format!("failed to save {}", settings_path.display()))?;
            }
        }

        Commands::RunFile { path, dry_run } => {
            let settings = load_settings(&settings_path, !dry_run)?;
            let vault = FsVault::new(&cli.vault).with_inline_title(settings.use_inline_title);
            let document = vault
                .document(path)
                .with_context(|| format!("cannot open {}", path.display()))?;

            let scanner = Scanner::from_settings(&settings);
            let outcome = if *dry_run {
                scanner.run_document(&DryRun::new(vault), &settings.rules, &document)?
            } else {
                scanner.run_document(&vault, &settings.rules, &document)?
            };

            for (index, rule_outcome) in outcome.evaluation.outcomes.iter().enumerate() {
                println!("rule {index}: {}", serde_json::to_string(rule_outcome)?);
            }
            if outcome.is_modified() {
                println!("{}: updated", document.id);
            } else {
                println!("{}: unchanged", document.id);
            }
        }

        Commands::Migrate => {
            if !settings_path.exists() {
                bail!("no settings file at {}", settings_path.display());
            }
            let (settings, report) = Settings::load(&settings_path)
                .with_context(|| format!("failed to migrate {}", settings_path.display()))?;
            print_report(&report);
            info!(rules = settings.rules.len(), "settings loaded");
        }

        Commands::Check => check(&settings_path)?,
    }

    Ok(())
}

fn scan<S: DocumentStore>(
    scanner: &Scanner,
    store: &S,
    rules: &[propwright_core::Rule],
    scope: &ScanScope,
) -> Result<ScanSummary> {
    scanner
        .run(store, rules, scope)
        .context("failed to select notes")
}

/// Load settings, migrating them. With `persist`, a migrated record is
/// written back; otherwise the file is left untouched.
fn load_settings(path: &Path, persist: bool) -> Result<Settings> {
    if !path.exists() {
        warn!(path = %path.display(), "no settings file, running with defaults");
        return Ok(Settings::default());
    }

    let loaded = if persist {
        Settings::load(path)
    } else {
        Settings::from_file(path)
    };
    let (settings, report) =
        loaded.with_context(|| format!("failed to load {}", path.display()))?;

    if report.advanced() {
        info!(
            from = report.from_version,
            to = report.to_version,
            "settings migrated"
        );
    }
    Ok(settings)
}

fn read_raw(path: &Path) -> Result<serde_json::Value> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    let value = if is_yaml {
        serde_yaml::from_str(&contents)?
    } else {
        serde_json::from_str(&contents)?
    };
    Ok(value)
}

fn check(path: &Path) -> Result<()> {
    let raw = read_raw(path)?;
    let (migrated, report) = migrate(raw)?;
    let mut problems = 0;

    if report.advanced() {
        println!(
            "settings are at version {}; `propwright migrate` will upgrade them to {}",
            report.from_version, report.to_version
        );
    }
    for dropped in &report.dropped {
        println!("rule {}: cannot be migrated: {}", dropped.index, dropped.reason);
        problems += 1;
    }

    if let Err(errors) = validate_settings_schema(&migrated) {
        for error in errors {
            println!("schema: {error}");
            problems += 1;
        }
    }

    let (settings, _) = Settings::from_value(migrated)?;
    for (index, rule) in settings.rules.iter().enumerate() {
        for defect in rule.defects() {
            println!("rule {index}: {defect}");
            problems += 1;
        }
        if let Some(value) = rule.ignored_value() {
            println!("rule {index}: ifValue {value:?} is ignored by {:?}", rule.operator);
        }
    }

    if problems > 0 {
        bail!("{problems} problem(s) found in {}", path.display());
    }
    println!("{}: {} rules, ok", path.display(), settings.rules.len());
    Ok(())
}

fn print_report(report: &MigrationReport) {
    if !report.advanced() {
        println!("settings already at version {}", report.to_version);
        return;
    }
    println!(
        "migrated settings from version {} to {} ({} rules changed, {} dropped)",
        report.from_version,
        report.to_version,
        report.rules_changed,
        report.dropped.len()
    );
    for dropped in &report.dropped {
        println!("  dropped rule {}: {}", dropped.index, dropped.reason);
    }
}

fn print_summary(summary: &ScanSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!(
        "scanned {} notes, modified {}, failed {}",
        summary.scanned,
        summary.modified,
        summary.failed.len()
    );
    for failure in &summary.failed {
        println!("  {}: {}", failure.id, failure.error);
    }
    Ok(())
}
