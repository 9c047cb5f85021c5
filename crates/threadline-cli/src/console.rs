//! Line-mode console.
//!
//! Reads stdin a line at a time on a background task and writes each
//! rendered frame to stdout. Frames identical to the previous one are not
//! written again, so ticks do not scroll the terminal.

use std::{
    io::{self, Write},
    time::Duration,
};

use threadline_app::{App, AppAction, AppEvent};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
    task::JoinHandle,
};
use tracing::debug;

use crate::{input, render};

/// How long a poll waits for input before ticking.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Separator written above each frame.
const RULE: &str = "----------------------------------------";

/// Stdin reader and stdout renderer shared by the drivers.
pub struct Console {
    lines: mpsc::Receiver<String>,
    reader: JoinHandle<()>,
    last_frame: Vec<String>,
}

impl Console {
    /// Start reading stdin. Must be called within a tokio runtime.
    pub fn spawn() -> Self {
        let (tx, lines) = mpsc::channel(16);
        let reader = tokio::spawn(async move {
            let mut stdin = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match stdin.next_line().await {
                    Ok(Some(line)) => {
                        if tx.send(line).await.is_err() {
                            return;
                        }
                    },
                    Ok(None) => return,
                    Err(error) => {
                        debug!(%error, "stdin closed");
                        return;
                    },
                }
            }
        });
        Self { lines, reader, last_frame: Vec::new() }
    }

    /// Feed the next input line to the app, or tick if none arrives in time.
    ///
    /// End of input quits.
    pub async fn poll(&mut self, app: &mut App) -> Vec<AppAction> {
        tokio::select! {
            line = self.lines.recv() => match line {
                Some(line) => input::keys_for_line(&line)
                    .into_iter()
                    .flat_map(|key| app.handle(AppEvent::Key(key)))
                    .collect(),
                None => app.quit(),
            },
            () = tokio::time::sleep(POLL_INTERVAL) => app.handle(AppEvent::Tick),
        }
    }

    /// Write the app's frame to stdout if it changed.
    pub fn render(&mut self, app: &App) -> io::Result<()> {
        let frame = render::frame(app);
        if frame == self.last_frame {
            return Ok(());
        }

        let mut out = io::stdout().lock();
        writeln!(out, "{RULE}")?;
        for line in &frame {
            writeln!(out, "{line}")?;
        }
        out.flush()?;
        self.last_frame = frame;
        Ok(())
    }

    /// Stop reading stdin.
    pub fn stop(&self) {
        self.reader.abort();
    }
}
