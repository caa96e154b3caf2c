#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! `brewctl`: recipe checks, state-code tools and a console brewing session.

mod brew;
mod cli;
mod error_fmt;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use brew_core::{BrewingState, Recipe};
use clap::Parser;
use eyre::{Result, WrapErr};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use crate::brew::{BrewOpts, run_brew};
use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let _ = color_eyre::install();
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(err) = real_main(cli) {
        if cli::json_mode() {
            eprintln!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        std::process::exit(exit_code_for_error(&err));
    }
}

fn load_config(path: Option<&Path>) -> Result<brew_config::Config> {
    let Some(path) = path else {
        return Ok(brew_config::Config::default());
    };
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let cfg = brew_config::load_toml(&text)?;
    cfg.validate()?;
    Ok(cfg)
}

/// Console diagnostics on stderr, or JSON lines to `[logging].file` when set.
///
/// Filter precedence: `RUST_LOG`, then `--log-level`, then `[logging].level`.
fn init_tracing(cli: &Cli, logging: &brew_config::Logging) -> Result<()> {
    let level = cli
        .log_level
        .as_deref()
        .or(logging.level.as_deref())
        .unwrap_or("info");
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .wrap_err_with(|| format!("invalid log level {level:?}"))?;

    if let Some(file) = logging.file.as_deref() {
        let path = Path::new(file);
        let dir = path.parent().filter(|d| !d.as_os_str().is_empty()).unwrap_or(Path::new("."));
        let name = path.file_name().map_or_else(|| "brewctl.log".into(), |n| n.to_os_string());
        let appender = match logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(writer)
            .try_init()
            .map_err(|e| eyre::eyre!("install log subscriber: {e}"))?;
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init()
            .map_err(|e| eyre::eyre!("install log subscriber: {e}"))?;
    }
    Ok(())
}

fn real_main(cli: Cli) -> Result<()> {
    let cfg = load_config(cli.config.as_deref())?;
    init_tracing(&cli, &cfg.logging)?;
    let json = cli::json_mode();

    match cli.cmd {
        Commands::Validate { recipe } => {
            let file = brew_config::load_recipe_file(&recipe)?;
            let recipe = Recipe::from(&file);
            recipe.validate(cfg.temperature.room_temperature)?;
            if json {
                println!("{}", json!({ "valid": true, "id": recipe.id }));
            } else {
                println!("recipe {} ({}) is valid", recipe.id, recipe.name);
            }
        }
        Commands::Decode { code } => {
            let s = BrewingState::from_code(code);
            if json {
                println!(
                    "{}",
                    json!({ "code": s.code(), "type": s.kind, "phase": s.phase, "position": s.position })
                );
            } else {
                println!("{code} -> {s}");
            }
        }
        Commands::Encode {
            kind,
            phase,
            position,
        } => {
            let s = BrewingState::new(kind.into(), phase.into(), position.into());
            if json {
                println!("{}", json!({ "code": s.code() }));
            } else {
                println!("{}", s.code());
            }
        }
        Commands::Brew {
            recipe,
            auto_confirm,
            time_scale,
            log_dir,
        } => {
            let shutdown = Arc::new(AtomicBool::new(false));
            {
                let flag = Arc::clone(&shutdown);
                ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
                    .wrap_err("install Ctrl-C handler")?;
            }
            let opts = BrewOpts {
                recipe,
                auto_confirm,
                time_scale,
                log_dir,
            };
            let report = run_brew(&cfg, &opts, &shutdown)?;
            if json {
                println!(
                    "{}",
                    json!({
                        "outcome": "complete",
                        "process_id": report.process_id,
                        "recipe_id": report.recipe_id,
                        "confirmations": report.confirmations,
                        "log_entries": report.log_entries,
                    })
                );
            } else {
                println!(
                    "brewing complete: recipe {}, {} confirmations, {} log entries",
                    report.recipe_id, report.confirmations, report.log_entries
                );
            }
        }
    }
    Ok(())
}
