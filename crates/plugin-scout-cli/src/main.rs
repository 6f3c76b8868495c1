use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use clap_complete::generate;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use plugin_scout_core::backup::BackupTrigger;
use plugin_scout_core::config::Config;
use plugin_scout_core::validation::{ManifestSchema, ManifestValidator};
use plugin_scout_core::{
    DataIntegrityValidator, HealthStatus, Pipeline, Result, RunOptions, ScoutError,
};

mod args;
use args::{BackupAction, Cli, Commands, ConfigAction, SchemaArg, Shell};

/// Messages printed per list before eliding the rest
const MAX_LISTED: usize = 10;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let base_dir = resolve_base_dir(cli.base_dir);

    let result = match cli.command {
        Some(Commands::Collect {
            dry_run,
            force_refresh,
            strict,
            no_backup,
        }) => {
            let options = RunOptions {
                force_refresh,
                strict,
                no_backup,
            };
            handle_collect(&base_dir, dry_run, &options, cli.verbose)
        }
        Some(Commands::Validate {
            file,
            strict,
            schema,
            json,
        }) => handle_validate(&file, strict, schema, json),
        Some(Commands::Integrity { dir, json }) => handle_integrity(&base_dir, dir, json),
        Some(Commands::Backup { action }) => handle_backup(action, &base_dir),
        Some(Commands::Config { action }) => handle_config(action, &base_dir),
        Some(Commands::Completions { shell }) => {
            handle_completions(shell);
            Ok(())
        }
        None => {
            Cli::command().print_help().ok();
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "[ERROR]".red().bold(), e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn resolve_base_dir(cli_base: Option<PathBuf>) -> PathBuf {
    if let Some(base) = cli_base {
        return base;
    }

    if let Ok(base) = std::env::var("PLUGIN_SCOUT_BASE") {
        return PathBuf::from(base);
    }

    plugin_scout_core::default_base_dir().unwrap_or_else(|_| PathBuf::from(".plugin-scout"))
}

fn handle_collect(base_dir: &Path, dry_run: bool, options: &RunOptions, verbose: bool) -> Result<()> {
    let config = Config::load(base_dir)?;
    let pipeline = Pipeline::new(config, base_dir);

    if dry_run {
        let plan = pipeline.plan();
        println!();
        println!("{} (no network calls)", "Dry run".cyan().bold());
        println!();
        println!("Strategies:");
        for s in &plan.strategies {
            println!(
                "  {} [{}] {} page(s) x {}  {}",
                s.name.cyan(),
                s.mode.as_str().yellow(),
                s.pages,
                s.per_page,
                s.query.dimmed()
            );
        }
        println!();
        println!("  Seeds:               {}", plan.seeds);
        for seed in &plan.invalid_seeds {
            println!("  {} invalid seed '{}'", "[WARN]".yellow(), seed);
        }
        println!("  Result cap:          {}", plan.max_results);
        println!("  Batch size:          {}", plan.batch_size);
        println!("  Max search requests: {}", plan.max_search_requests);
        println!("  Max repositories:    {}", plan.max_repositories);
        println!("  Output:              {}", plan.output_dir.display());
        if !options.no_backup {
            println!("  Backups:             {}", plan.backup_dir.display());
        }
        println!();
        return Ok(());
    }

    let runtime = tokio::runtime::Runtime::new()?;
    let cancel = pipeline.cancel_flag();
    let summary = runtime.block_on(async {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, finishing the current batch");
                cancel.cancel();
            }
        });
        pipeline.run(options).await
    })?;

    let status = match summary.status {
        HealthStatus::Healthy => "[OK]".green().bold(),
        HealthStatus::Degraded => "[WARN]".yellow().bold(),
        HealthStatus::Failing => "[ERROR]".red().bold(),
    };

    println!();
    println!("{} Run {} {}", status, summary.run_id.cyan(), summary.status);
    println!(
        "  Marketplaces: {} ({} verified)",
        summary.marketplaces, summary.verified_marketplaces
    );
    println!(
        "  Plugins:      {} ({} valid)",
        summary.plugins, summary.valid_plugins
    );
    println!(
        "  Diagnostics:  {} errors, {} warnings{}",
        summary.errors.len(),
        summary.warnings.len(),
        if summary.from_cache { " (cached)" } else { "" }
    );
    println!(
        "  Artifacts:    {} files in {}",
        summary.files.len(),
        summary.output_dir.display()
    );
    println!(
        "  Integrity:    {} files checked",
        summary.integrity.files_checked
    );
    match (&summary.backup, &summary.backup_error) {
        (Some(snapshot), _) => println!("  Backup:       {}", snapshot.id.cyan()),
        (None, Some(e)) => println!("  {} backup failed: {}", "[WARN]".yellow(), e),
        (None, None) => {}
    }

    print_messages("[ERROR]".red().to_string(), &summary.errors);
    if verbose {
        print_messages("[WARN]".yellow().to_string(), &summary.warnings);
    }
    println!();
    Ok(())
}

fn print_messages(prefix: String, messages: &[String]) {
    if messages.is_empty() {
        return;
    }
    println!();
    for message in messages.iter().take(MAX_LISTED) {
        println!("  {} {}", prefix, message);
    }
    if messages.len() > MAX_LISTED {
        println!("  ... and {} more", messages.len() - MAX_LISTED);
    }
}

fn handle_validate(file: &Path, strict: bool, schema: Option<SchemaArg>, json: bool) -> Result<()> {
    let text = fs::read_to_string(file)?;
    let schema = match schema {
        Some(SchemaArg::Plugin) => ManifestSchema::Plugin,
        Some(SchemaArg::Marketplace) => ManifestSchema::Marketplace,
        None => guess_schema(&text),
    };
    let report = ManifestValidator::new(schema).strict(strict).validate(&text);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!();
        for error in &report.errors {
            println!("  {} {}", "[ERROR]".red(), error);
        }
        for warning in &report.warnings {
            println!("  {} {}", "[WARN]".yellow(), warning);
        }
        if report.is_valid {
            println!("{} {} is a valid {:?} manifest", "[OK]".green().bold(), file.display(), schema);
        }
        println!();
    }

    if report.is_valid {
        Ok(())
    } else {
        Err(ScoutError::InvalidManifest {
            path: file.to_path_buf(),
            errors: report.errors.len(),
        })
    }
}

fn guess_schema(text: &str) -> ManifestSchema {
    let is_marketplace = serde_json::from_str::<serde_json::Value>(text)
        .map(|doc| doc.get("plugins").is_some())
        .unwrap_or(false);
    if is_marketplace {
        ManifestSchema::Marketplace
    } else {
        ManifestSchema::Plugin
    }
}

fn handle_integrity(base_dir: &Path, dir: Option<PathBuf>, json: bool) -> Result<()> {
    let dir = match dir {
        Some(dir) => dir,
        None => Config::load(base_dir)?.output_dir(base_dir),
    };
    let report = DataIntegrityValidator::new(&dir).validate()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!();
        for issue in &report.issues {
            println!("  {} {}", "[ERROR]".red(), issue);
        }
        if report.passed {
            println!(
                "{} {} files checked in {}",
                "[OK]".green().bold(),
                report.files_checked,
                dir.display()
            );
        }
        println!();
    }

    report.into_result().map(|_| ())
}

fn handle_backup(action: BackupAction, base_dir: &Path) -> Result<()> {
    let config = Config::load(base_dir)?;
    let output_dir = config.output_dir(base_dir);
    let manager = Pipeline::new(config, base_dir).backup_manager();

    match action {
        BackupAction::Create => {
            let snapshot = manager.create(&output_dir, BackupTrigger::Manual)?;
            println!();
            println!("{} {}", "Snapshot saved:".green(), snapshot.id.cyan());
            println!("  Time: {}", snapshot.display_time());
            println!("  Files: {}", snapshot.files.len());
            println!();
        }
        BackupAction::List { tier } => {
            let snapshots = match tier {
                Some(tier) => {
                    let mut snapshots = manager.list_tier(tier)?;
                    snapshots.reverse();
                    snapshots
                }
                None => manager.list()?,
            };

            if snapshots.is_empty() {
                println!("No snapshots found.");
                println!();
                println!("Create one with: plugin-scout backup create");
                return Ok(());
            }

            println!();
            for snap in snapshots {
                println!(
                    "  {} {} [{}] {} ({} marketplaces, {} plugins)",
                    snap.id.cyan(),
                    snap.display_time(),
                    snap.tier.as_str().yellow(),
                    snap.trigger,
                    snap.counts.marketplaces,
                    snap.counts.plugins
                );
            }
            println!();
        }
        BackupAction::Verify { id } => {
            let snapshot = manager.verify(&id)?;
            println!(
                "{} {} ({} files, checksums match)",
                "[OK]".green().bold(),
                snapshot.id.cyan(),
                snapshot.files.len()
            );
        }
        BackupAction::Restore { id, target } => {
            let target = target.unwrap_or(output_dir);
            let outcome = manager.restore(&id, &target)?;
            println!();
            println!(
                "{} Restored {} files from {} into {}",
                "[OK]".green().bold(),
                outcome.restored,
                outcome.snapshot.id.cyan(),
                target.display()
            );
            if !outcome.removed.is_empty() {
                println!("  Removed: {}", outcome.removed.join(", "));
            }
            if let Some(pre) = outcome.pre_restore {
                println!("  Previous state saved as {}", pre.id.cyan());
            }
            println!();
        }
        BackupAction::Prune => {
            let report = manager.maintain(chrono::Utc::now())?;
            for (tier, id) in &report.promoted {
                println!("  {} {} -> {}", "Promoted:".green(), id.cyan(), tier);
            }
            for (tier, id) in &report.pruned {
                println!("  {} {} ({})", "Pruned:".yellow(), id, tier);
            }
            if report.promoted.is_empty() && report.pruned.is_empty() {
                println!("Nothing to do.");
            }
        }
    }

    Ok(())
}

fn handle_config(action: ConfigAction, base_dir: &Path) -> Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load(base_dir)?;
            match config.get(&key) {
                Some(value) => {
                    println!("{}", value);
                }
                None => {
                    return Err(ScoutError::ConfigKeyNotFound { key });
                }
            }
        }
        ConfigAction::List => {
            let config = Config::load(base_dir)?;
            println!();
            for (key, value) in config.list() {
                println!("{} = {}", key.cyan(), value);
            }
            println!();
        }
        ConfigAction::Path => {
            let path = Config::path(base_dir);
            println!("{}", path.display());
        }
        ConfigAction::Init => {
            let path = Config::init(base_dir)?;
            println!("{} {}", "Initialized:".green(), path.display());
        }
    }

    Ok(())
}

fn handle_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let shell = match shell {
        Shell::Bash => clap_complete::Shell::Bash,
        Shell::Zsh => clap_complete::Shell::Zsh,
        Shell::Fish => clap_complete::Shell::Fish,
        Shell::PowerShell => clap_complete::Shell::PowerShell,
        Shell::Elvish => clap_complete::Shell::Elvish,
    };
    generate(shell, &mut cmd, "plugin-scout", &mut io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guesses_marketplace_schema() {
        assert_eq!(
            guess_schema(r#"{"name": "m", "plugins": []}"#),
            ManifestSchema::Marketplace
        );
        assert_eq!(guess_schema(r#"{"name": "p"}"#), ManifestSchema::Plugin);
        assert_eq!(guess_schema("not json"), ManifestSchema::Plugin);
    }

    #[test]
    fn explicit_base_dir_wins() {
        let base = resolve_base_dir(Some(PathBuf::from("/tmp/scout")));
        assert_eq!(base, PathBuf::from("/tmp/scout"));
    }

    #[test]
    fn cli_parses_collect_flags() {
        let cli = Cli::try_parse_from([
            "plugin-scout",
            "collect",
            "--dry-run",
            "--strict",
            "--no-backup",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Collect {
                dry_run,
                strict,
                no_backup,
                force_refresh,
            }) => {
                assert!(dry_run && strict && no_backup);
                assert!(!force_refresh);
            }
            _ => panic!("expected collect"),
        }
    }

    #[test]
    fn cli_parses_backup_tier() {
        let cli =
            Cli::try_parse_from(["plugin-scout", "backup", "list", "--tier", "weekly"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Backup {
                action: BackupAction::List {
                    tier: Some(plugin_scout_core::Tier::Weekly)
                }
            })
        ));
    }
}
