// src/lib.rs

pub mod api;
pub mod app;
pub mod cli;
pub mod config;
pub mod console;
pub mod errors;
pub mod fs;
pub mod hooks;
pub mod logging;
pub mod reporter;
pub mod runner;
pub mod server;
pub mod timeout;
pub mod types;
pub mod watch;

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::app::{App, Finish};
use crate::cli::CliArgs;
use crate::config::{load_optional, Config};
use crate::types::Mode;

/// High-level entry point used by `main.rs`.
///
/// Loads and settles the configuration, starts the app, wires Ctrl-C and
/// (in dev mode) the console, and returns once the app has exited.
pub async fn run(args: CliArgs) -> Result<Finish> {
    let mode = args.mode();
    let file = load_optional(&args.config)?;
    let config = Config::builder(mode)
        .file(file)
        .overrides(args.overrides())
        .build()?;

    if args.dry_run {
        print_dry_run(&config);
        return Ok(Finish {
            code: 0,
            error: None,
        });
    }

    let app = App::new(Arc::new(config));

    {
        let app = app.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!("interrupted");
            console::interrupt(&app).await;
        });
    }

    if mode == Mode::Dev {
        console::spawn_stdin(app.clone());
    }

    app.start().await;
    let finish = app.finished().await;
    if let Some(err) = &finish.error {
        info!(code = finish.code, error = %err, "finished");
    }
    Ok(finish)
}

/// Print the settled configuration without running anything.
fn print_dry_run(config: &Config) {
    println!("testloop dry-run");
    for key in config.keys() {
        if let Some(value) = config.get(&key) {
            println!("  {key} = {value}");
        }
    }
    if !config.launchers().is_empty() {
        println!();
        println!("launchers ({}):", config.launchers().len());
        for (name, launcher) in config.launchers() {
            match (&launcher.command, &launcher.exe) {
                (Some(cmd), _) => println!("  - {name}: {cmd}"),
                (None, Some(exe)) => println!("  - {name}: {exe} {}", launcher.args.join(" ")),
                (None, None) => println!("  - {name}: <no command>"),
            }
        }
    }
    debug!("dry-run complete (no execution)");
}
