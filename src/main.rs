//! sonar - local data cache CLI
//!
//! Main entry point for the sonar command-line tool.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use serde_json::{Value, json};
use std::io;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use sonar::cli::{ConfigCommand, DataCommand};
use sonar::config::normalize_key;
use sonar::logging::{OperationGuard, init_cli_logging};
use sonar::storage::LAST_SYNCED_AT;
use sonar::*;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_cli_logging(cli.quiet, cli.verbose);

    match run(&cli).await {
        Ok(code) => code,
        Err(err) => {
            report_error(cli.json, &err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> Result<ExitCode> {
    match &cli.command {
        Commands::Data(command) => {
            let workspace = Workspace::from_env()?;
            let settings = Settings::load(&workspace, cli.db.clone())?;
            match command {
                DataCommand::Download => cmd_sync(cli, &settings, true).await,
                DataCommand::Sync => cmd_sync(cli, &settings, false).await,
                DataCommand::Backup(args) => cmd_backup(cli, &settings, args),
                DataCommand::Restore(args) => cmd_restore(cli, &settings, args),
                DataCommand::Verify(args) => cmd_verify(cli, &settings, args),
                DataCommand::Path => cmd_path(cli, &settings),
                DataCommand::Stats => cmd_stats(cli, &settings),
                DataCommand::Sql => cmd_sql(&settings),
            }
        }
        Commands::Config(command) => {
            let workspace = Workspace::from_env()?;
            match command {
                ConfigCommand::Show => cmd_config_show(cli, &workspace),
                ConfigCommand::Set(args) => cmd_config_set(cli, &workspace, args),
                ConfigCommand::Nuke(args) => cmd_config_nuke(cli, &workspace, args),
            }
        }
        Commands::Completions(args) => cmd_completions(args),
    }
}

fn report_error(json: bool, err: &anyhow::Error) {
    if json {
        eprintln!("{}", json!({ "ok": false, "error": format!("{err:#}") }));
        return;
    }

    let sonar_err = err.downcast_ref::<SonarError>();
    let explanation = match sonar_err {
        Some(e) if e.destination_preserved() => "No database files were modified.",
        _ => "",
    };
    let suggestions: Vec<&str> = sonar_err.and_then(SonarError::suggestion).into_iter().collect();
    eprintln!("{}", format_error(&format!("{err:#}"), explanation, &suggestions));
}

/// Print `value` as a JSON object with `"ok": true` merged in.
fn print_ok<T: Serialize>(value: &T) -> Result<()> {
    let value = match serde_json::to_value(value)? {
        Value::Object(mut map) => {
            map.insert("ok".to_string(), Value::Bool(true));
            Value::Object(map)
        }
        other => json!({ "ok": true, "result": other }),
    };
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn spinner(cli: &Cli, message: &'static str) -> Result<Option<ProgressBar>> {
    if cli.json || cli.quiet {
        return Ok(None);
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed}]")?);
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(Some(pb))
}

async fn cmd_sync(cli: &Cli, settings: &Settings, full: bool) -> Result<ExitCode> {
    let gateway = GraphqlGateway::new(
        settings.api_url.as_str(),
        settings.token.clone().unwrap_or_default(),
    )
    .map_err(SonarError::from)?;
    let engine = SyncEngine::new(Arc::new(gateway), &settings.db_path);
    debug!(db = %settings.db_path.display(), full, "Sync requested");

    let pb = spinner(
        cli,
        if full {
            "Downloading data..."
        } else {
            "Syncing data..."
        },
    )?;
    let guard = OperationGuard::new(if full { "download" } else { "sync" });
    let result = if full {
        engine.download().await
    } else {
        engine.sync().await
    };
    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }
    let report = guard.finish(result)?;

    if cli.json {
        print_ok(&report)?;
        return Ok(ExitCode::SUCCESS);
    }

    match report.mode {
        SyncMode::Full => println!(
            "{} Downloaded {} feed items, {} suggestions, {} interests",
            "✓".green(),
            format_number(report.feed_count).bold(),
            format_number(report.suggestions_count).bold(),
            format_number(report.interests_count).bold(),
        ),
        SyncMode::Incremental => println!(
            "{} Synced {} feed items ({} total), {} suggestions ({} total) from the last {}h",
            "✓".green(),
            format!("+{}", report.delta_feed.unwrap_or(0)).bold(),
            format_number(report.feed_count),
            format!("+{}", report.delta_suggestions.unwrap_or(0)).bold(),
            format_number(report.suggestions_count),
            report.window_hours.unwrap_or(0),
        ),
    }
    println!("  Database: {}", settings.db_path.display().to_string().dimmed());
    Ok(ExitCode::SUCCESS)
}

fn cmd_backup(cli: &Cli, settings: &Settings, args: &sonar::cli::BackupArgs) -> Result<ExitCode> {
    let guard = OperationGuard::new("backup");
    let result = guard.finish(BackupManager::new().backup(&settings.db_path, args.out.as_deref()))?;

    if cli.json {
        print_ok(&result)?;
    } else {
        println!(
            "{} Backup written to {} ({})",
            "✓".green(),
            result.backup.display().to_string().bold(),
            format_bytes(result.bytes)
        );
        println!("  Source: {}", result.source.display().to_string().dimmed());
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_restore(
    cli: &Cli,
    settings: &Settings,
    args: &sonar::cli::RestoreArgs,
) -> Result<ExitCode> {
    let dest = args.to.as_deref().unwrap_or(&settings.db_path);
    let guard = OperationGuard::new("restore");
    let result = guard.finish(BackupManager::new().restore(&args.from, dest))?;

    if cli.json {
        print_ok(&result)?;
    } else {
        println!(
            "{} Restored {} from {}",
            "✓".green(),
            result.to.display().to_string().bold(),
            result.from.display()
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_verify(cli: &Cli, settings: &Settings, args: &sonar::cli::VerifyArgs) -> Result<ExitCode> {
    let path = args.path.as_deref().unwrap_or(&settings.db_path);
    if !path.exists() {
        return Err(SonarError::source_not_found(path).into());
    }
    let verdict = SqliteIntegrityChecker.verdict(path);
    let ok = verdict.is_ok();

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "ok": ok,
                "path": verdict.path,
                "integrity": verdict.integrity,
            }))?
        );
    } else if ok {
        println!("{} {}: {}", "✓".green(), verdict.path.display(), verdict.integrity);
    } else {
        eprintln!(
            "{} {}: {}",
            "✗".red().bold(),
            verdict.path.display(),
            verdict.integrity
        );
    }

    Ok(if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn cmd_path(cli: &Cli, settings: &Settings) -> Result<ExitCode> {
    if cli.json {
        print_ok(&json!({ "path": settings.db_path }))?;
    } else {
        println!("{}", settings.db_path.display());
    }
    Ok(ExitCode::SUCCESS)
}

#[derive(Serialize)]
struct DataStats {
    path: std::path::PathBuf,
    bytes: u64,
    counts: CacheCounts,
    last_synced_at: Option<String>,
}

fn cmd_stats(cli: &Cli, settings: &Settings) -> Result<ExitCode> {
    let path = &settings.db_path;
    if !path.exists() {
        return Err(SonarError::source_not_found(path).into());
    }

    let storage = Storage::open(path)?;
    let stats = DataStats {
        path: path.clone(),
        bytes: std::fs::metadata(path)
            .with_context(|| format!("Failed to stat {}", path.display()))?
            .len(),
        counts: storage.counts()?,
        last_synced_at: storage.get_sync_state(LAST_SYNCED_AT)?,
    };
    storage.close()?;

    if cli.json {
        print_ok(&stats)?;
        return Ok(ExitCode::SUCCESS);
    }

    println!("{}", "Local Data".bold().cyan());
    println!("  Database:     {} ({})", stats.path.display(), format_bytes(stats.bytes));
    println!("  Tweets:       {}", format_number(stats.counts.tweets));
    println!("  Feed items:   {}", format_number(stats.counts.feed_items));
    println!("  Suggestions:  {}", format_number(stats.counts.suggestions));
    println!("  Interests:    {}", format_number(stats.counts.interests));
    let last = stats.last_synced_at.as_deref().map_or_else(
        || "never".to_string(),
        |raw| {
            chrono::DateTime::parse_from_rfc3339(raw).map_or_else(
                |_| raw.to_string(),
                |dt| format_relative_date(dt.with_timezone(&chrono::Utc)),
            )
        },
    );
    println!("  Last sync:    {last}");
    Ok(ExitCode::SUCCESS)
}

fn cmd_sql(settings: &Settings) -> Result<ExitCode> {
    let path = &settings.db_path;
    if !path.exists() {
        return Err(SonarError::source_not_found(path).into());
    }

    let status = std::process::Command::new("sqlite3")
        .arg(path)
        .status()
        .context("Failed to launch sqlite3; is it installed and on PATH?")?;
    Ok(if status.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn cmd_config_show(cli: &Cli, workspace: &Workspace) -> Result<ExitCode> {
    let settings = Settings::load(workspace, cli.db.clone())?;

    if cli.json {
        print_ok(&json!({
            "api_url": settings.api_url,
            "vendor": settings.vendor,
            "feed_render": settings.feed_render,
            "feed_width": settings.feed_width,
            "db": settings.db_path,
            "config_path": settings.config_path,
            "has_token": settings.has_token(),
        }))?;
        return Ok(ExitCode::SUCCESS);
    }

    println!("{}", "Current Configuration".bold().cyan());
    println!("  API URL:      {}", settings.api_url);
    println!("  Vendor:       {}", settings.vendor);
    println!("  Feed render:  {}", settings.feed_render);
    println!("  Feed width:   {}", settings.feed_width);
    println!("  Database:     {}", settings.db_path.display());
    println!(
        "  Token:        {}",
        if settings.has_token() {
            "set".green()
        } else {
            "not set".yellow()
        }
    );
    println!("  Config file:  {}", settings.config_path.display().to_string().dimmed());
    Ok(ExitCode::SUCCESS)
}

fn cmd_config_set(
    cli: &Cli,
    workspace: &Workspace,
    args: &sonar::cli::SetArgs,
) -> Result<ExitCode> {
    let key = normalize_key(&args.key);
    if !VALID_CONFIG_KEYS.contains(&key.as_str()) {
        if cli.json {
            return Err(SonarError::invalid_argument(format!(
                "unknown config key \"{}\". Supported keys: {}",
                args.key,
                VALID_CONFIG_KEYS.join(", ")
            ))
            .into());
        }
        eprintln!(
            "{}",
            format_unknown_value_error("config key", &args.key, VALID_CONFIG_KEYS)
        );
        return Ok(ExitCode::FAILURE);
    }

    let path = workspace.config_path();
    let mut config = Config::load(&path)?;
    config.set_key(&key, &args.value)?;
    config.save(&path)?;

    let shown = if key == "token" { "********" } else { args.value.as_str() };
    if cli.json {
        print_ok(&json!({ "key": key, "value": shown, "path": path }))?;
    } else {
        println!(
            "{} Set {} = {} in {}",
            "✓".green(),
            key.bold(),
            shown,
            path.display()
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_config_nuke(
    cli: &Cli,
    workspace: &Workspace,
    args: &sonar::cli::NukeArgs,
) -> Result<ExitCode> {
    if !args.confirm {
        if cli.json {
            return Err(
                SonarError::invalid_argument("pass --confirm to delete the workspace").into(),
            );
        }
        println!(
            "{} (pass {} to nuke)",
            "Tip.".dimmed(),
            "--confirm".cyan()
        );
        return Ok(ExitCode::SUCCESS);
    }

    let db_path = Settings::load(workspace, cli.db.clone()).map_or_else(
        |_| cli.db.clone().unwrap_or_else(|| workspace.default_db_path()),
        |settings| settings.db_path,
    );
    let removed = workspace.nuke(&db_path)?;

    if cli.json {
        print_ok(&json!({ "removed": removed }))?;
    } else if removed.is_empty() {
        println!("Nothing to delete in {}", workspace.home().display());
    } else {
        for path in &removed {
            println!("{} Deleted {}", "✓".green(), path.display());
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_completions(args: &sonar::cli::CompletionsArgs) -> Result<ExitCode> {
    let mut cmd = Cli::command();
    generate(args.shell, &mut cmd, "sonar", &mut io::stdout());
    Ok(ExitCode::SUCCESS)
}
