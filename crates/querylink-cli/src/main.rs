//! # querylink
//!
//! Command-line driver: runs one SQL statement over the streaming query
//! protocol and prints rows as they arrive.

#![deny(unsafe_code)]

mod logging;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use querylink_client::{QueryClient, QueryResult, QuerySession, QueryStatus};
use querylink_settings::ClientSettings;

use crate::output::{Format, RowPrinter};

/// Exit code when a query ends canceled (128 + SIGINT).
const EXIT_CANCELED: u8 = 130;

/// Run a SQL query and stream its rows.
#[derive(Parser, Debug)]
#[command(name = "querylink", about = "Run a streaming SQL query")]
struct Cli {
    /// Server endpoint (`ws://` or `wss://`), overrides settings.
    #[arg(long)]
    endpoint: Option<String>,

    /// Auth token appended to the endpoint as `?token=`.
    #[arg(long)]
    token: Option<String>,

    /// Settings file (default `~/.querylink/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Time to wait for `queryAccepted`, in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Print rows as JSON lines instead of a tab-separated table.
    #[arg(long)]
    json: bool,

    /// SQL to run.
    sql: String,
}

impl Cli {
    fn load_settings(&self) -> Result<ClientSettings> {
        let mut settings = match &self.config {
            Some(path) => querylink_settings::load_settings_from_path(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => querylink_settings::load_settings().context("Failed to load settings")?,
        };
        if let Some(endpoint) = &self.endpoint {
            settings.endpoint.clone_from(endpoint);
        }
        if let Some(token) = &self.token {
            settings.token = Some(token.clone());
        }
        if let Some(ms) = self.timeout_ms {
            settings.request_timeout_ms = ms;
        }
        querylink_settings::validate(&settings).context("Invalid settings")?;
        Ok(settings)
    }

    fn format(&self) -> Format {
        if self.json {
            Format::JsonLines
        } else {
            Format::Table
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Cli::parse();
    let settings = args.load_settings()?;
    logging::init_subscriber(&settings.log_level);

    let client = QueryClient::from_settings(&settings);
    client
        .connect(settings.token.as_deref())
        .context("Failed to start connection")?;
    client
        .wait_connected()
        .await
        .with_context(|| format!("Could not connect to {}", settings.endpoint))?;
    tracing::info!(endpoint = %settings.endpoint, "connected");

    let session = client.session();
    let result = stream_query(&session, &args.sql, args.format()).await?;
    client.disconnect();

    Ok(report(&result))
}

/// What a Ctrl-C should do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Interrupt {
    /// Send `cancelQuery` now.
    Cancel,
    /// The query has no ID yet; cancel once it is accepted.
    Defer,
    /// Second Ctrl-C: stop waiting.
    Abort,
}

/// Tracks the user's cancel request across the start handshake.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum CancelState {
    #[default]
    Idle,
    Pending,
    Sent,
}

impl CancelState {
    fn interrupt(&mut self, status: QueryStatus) -> Interrupt {
        match self {
            Self::Idle if status == QueryStatus::Running => {
                *self = Self::Sent;
                Interrupt::Cancel
            }
            Self::Idle => {
                *self = Self::Pending;
                Interrupt::Defer
            }
            Self::Pending | Self::Sent => Interrupt::Abort,
        }
    }

    /// Whether a deferred cancel should go out now.
    fn due(&mut self, status: QueryStatus) -> bool {
        if *self == Self::Pending && status == QueryStatus::Running {
            *self = Self::Sent;
            return true;
        }
        false
    }
}

async fn send_cancel(session: &QuerySession) {
    if let Err(e) = session.cancel().await {
        tracing::warn!(error = %e, "cancel failed");
    }
}

/// Run `sql` on `session`, printing rows until the query reaches a terminal
/// state. The first Ctrl-C cancels the query, deferred until the server has
/// accepted it. A second one aborts.
async fn stream_query(session: &QuerySession, sql: &str, format: Format) -> Result<QueryResult> {
    let mut changes = session.changed();
    let runner = {
        let session = session.clone();
        let sql = sql.to_string();
        tokio::spawn(async move { session.run(&sql).await })
    };

    let mut printer = RowPrinter::new(format);
    let mut cancel = CancelState::default();
    loop {
        let snapshot = session.snapshot();
        printer
            .render(&mut std::io::stdout().lock(), &snapshot)
            .context("Failed to write rows")?;
        if snapshot.status.is_terminal() {
            // The start error (if any) is already reflected in the snapshot.
            let _ = runner.await;
            return Ok(snapshot);
        }
        if cancel.due(snapshot.status) {
            send_cancel(session).await;
        }

        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    anyhow::bail!("query session closed unexpectedly");
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                match cancel.interrupt(session.status()) {
                    Interrupt::Cancel => {
                        eprintln!("canceling...");
                        send_cancel(session).await;
                    }
                    Interrupt::Defer => eprintln!("canceling once the query starts..."),
                    Interrupt::Abort => anyhow::bail!("interrupted"),
                }
            }
        }
    }
}

fn report(result: &QueryResult) -> ExitCode {
    match result.status {
        QueryStatus::Done => {
            match result.stats.as_ref().map(|s| (s.row_count(), s.elapsed_ms)) {
                Some((Some(rows), elapsed_ms)) => eprintln!("({rows} rows, {elapsed_ms:.1} ms)"),
                Some((None, elapsed_ms)) => eprintln!("({elapsed_ms:.1} ms)"),
                None => {}
            }
            ExitCode::SUCCESS
        }
        QueryStatus::Canceled => {
            eprintln!("canceled after {} rows", result.loaded_rows());
            ExitCode::from(EXIT_CANCELED)
        }
        _ => {
            eprintln!(
                "error: {}",
                result.error.as_deref().unwrap_or("query did not complete")
            );
            ExitCode::FAILURE
        }
    }
}
