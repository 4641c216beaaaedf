// src/console.rs

//! Dev-mode keyboard commands read line by line from stdin.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use crate::app::App;
use crate::errors::RunError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Restart,
    TogglePause,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "r" | "restart" => Some(Command::Restart),
            "p" | "pause" => Some(Command::TogglePause),
            "q" | "quit" => Some(Command::Quit),
            _ => None,
        }
    }
}

/// Apply one command to `app`. Returns false once the app should stop
/// reading input.
pub async fn apply(app: &App, command: Command) -> bool {
    match command {
        Command::Restart => {
            app.restart();
            true
        }
        Command::TogglePause => {
            app.toggle_pause();
            true
        }
        Command::Quit => {
            app.exit(None).await;
            false
        }
    }
}

/// Read commands from `input` until EOF, quit, or app exit.
pub async fn run<R>(app: App, input: R)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if app.is_exited() {
            break;
        }
        match Command::parse(&line) {
            Some(cmd) => {
                info!(?cmd, "console command");
                if !apply(&app, cmd).await {
                    break;
                }
            }
            None => debug!(%line, "unknown console input"),
        }
    }
}

/// Spawn the console on the process's stdin.
pub fn spawn_stdin(app: App) {
    tokio::spawn(run(app, BufReader::new(tokio::io::stdin())));
}

/// Exit with a user interrupt.
pub async fn interrupt(app: &App) {
    app.exit(Some(RunError::Infrastructure("Interrupted".to_string())))
        .await;
}
