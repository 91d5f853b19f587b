//! Stdin/stdout JSON bridge to the browser shim.
//!
//! Reads newline-delimited [`Inbound`] envelopes from stdin, forwards events
//! to the [`Warden`] runtime and replies to the waiting [`HostBrowser`]
//! calls. Commands are written to stdout as newline-delimited [`Outbound`]
//! envelopes.
//!
//! Stdout is exclusively reserved for the JSON protocol; all diagnostic
//! output (tracing, logs) must be routed to stderr.

use crate::config::WardenConfig;
use crate::enforcer::{ActionEnforcer, EnforcerState};
use crate::error::{Result, WardenError};
use crate::host::channel::{DEFAULT_REPLY_TIMEOUT, HostBrowser, host_channel};
use crate::host::contract::{Inbound, Outbound, PROTOCOL_VERSION};
use crate::logger::ActivityLogger;
use crate::queue::FailedLogQueue;
use crate::runtime::{BrowserEvent, Warden};
use crate::storage::{self, JsonFileStore, LocalStore};
use std::sync::Arc;
use tabwarden_docstore::{DocumentClient, DocumentStore};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Outbound command channel capacity.
const OUTBOUND_CAPACITY: usize = 64;

/// Browser event channel capacity.
const EVENT_CAPACITY: usize = 128;

/// Run the worker against the process stdin/stdout until stdin closes.
///
/// # Errors
///
/// Returns an error if the document client cannot be built, local storage
/// is unusable, or stdin/stdout fail.
pub async fn run_stdio_bridge(config: WardenConfig) -> Result<()> {
    let store: Arc<dyn DocumentStore> = Arc::new(DocumentClient::new(config.remote.clone())?);
    let local: Arc<dyn LocalStore> = Arc::new(JsonFileStore::open_default());
    run_bridge(
        &config,
        store,
        local,
        tokio::io::stdin(),
        tokio::io::stdout(),
    )
    .await
}

/// Run the worker over an arbitrary reader/writer pair until `input` hits EOF.
///
/// Two tasks run next to the reader loop:
///
/// 1. **Writer** -- serializes [`Outbound`] envelopes from the host browser
///    and writes them as JSON lines.
/// 2. **Runtime** -- the [`Warden`] timers and event handlers.
///
/// On EOF the runtime is cancelled, calls still waiting for a reply fail,
/// and the writer is stopped once the runtime has drained.
///
/// # Errors
///
/// Returns an error if local storage is unusable, the splash URL does not
/// resolve, or reading/writing the stream fails.
pub async fn run_bridge<R, W>(
    config: &WardenConfig,
    store: Arc<dyn DocumentStore>,
    local: Arc<dyn LocalStore>,
    input: R,
    output: W,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let machine_id = storage::machine_id(local.as_ref()).await?;
    tracing::info!(machine_id = %machine_id, "starting host bridge");

    let (browser, mut outbound_rx) = host_channel(OUTBOUND_CAPACITY, DEFAULT_REPLY_TIMEOUT);
    let browser = Arc::new(browser);

    let queue = Arc::new(FailedLogQueue::new(Arc::clone(&local)));
    let logger = Arc::new(ActivityLogger::new(
        Arc::clone(&store),
        browser.clone(),
        queue,
        config.identity.clone(),
    ));
    let enforcer = Arc::new(ActionEnforcer::new(
        store,
        browser.clone(),
        Arc::new(EnforcerState::new()),
        &config.enforcement,
    )?);
    let warden = Warden::new(logger, enforcer, browser.clone(), config.schedule.clone());

    let mut writer = BufWriter::new(output);
    let hello = Outbound::Hello {
        version: PROTOCOL_VERSION,
        machine_id,
    };
    write_line(&mut writer, &serde_json::to_string(&hello)?).await?;

    let writer_handle = tokio::spawn(async move {
        while let Some(envelope) = outbound_rx.recv().await {
            let json = match serde_json::to_string(&envelope) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(error = %e, "failed to serialize command envelope; skipping");
                    continue;
                }
            };
            if let Err(e) = write_line(&mut writer, &json).await {
                tracing::warn!(error = %e, "failed to write command to stdout; stopping writer");
                break;
            }
        }
    });

    let (event_tx, event_rx) = mpsc::channel(EVENT_CAPACITY);
    let cancel = CancellationToken::new();
    let runtime = warden.run(event_rx, cancel.clone());

    let reader_result = run_reader(input, &browser, &event_tx).await;

    cancel.cancel();
    let failed = browser.fail_all();
    if failed > 0 {
        tracing::debug!(failed, "failed browser calls still waiting at shutdown");
    }
    drop(event_tx);
    if let Err(e) = runtime.await {
        tracing::error!(error = %e, "runtime task panicked");
    }
    writer_handle.abort();
    let _ = writer_handle.await;

    tracing::info!("host bridge stopped");
    reader_result
}

/// Read input line-by-line, routing events and replies.
async fn run_reader<R: AsyncRead + Unpin>(
    input: R,
    browser: &HostBrowser,
    events: &mpsc::Sender<BrowserEvent>,
) -> Result<()> {
    let mut reader = BufReader::new(input);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| WardenError::Host(format!("failed to read from stdin: {e}")))?;

        if bytes_read == 0 {
            tracing::info!("stdin closed (EOF); shutting down host bridge");
            return Ok(());
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match serde_json::from_str::<Inbound>(trimmed) {
            Ok(Inbound::Event { event }) => {
                tracing::debug!(?event, "browser event");
                if events.send(event).await.is_err() {
                    tracing::warn!("runtime stopped; shutting down host bridge");
                    return Ok(());
                }
            }
            Ok(Inbound::Reply(reply)) => {
                let id = reply.id;
                if !browser.resolve(reply) {
                    tracing::debug!(id, "reply for unknown or expired command");
                }
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    raw_line = %trimmed,
                    "failed to parse envelope from stdin"
                );
            }
        }
    }
}

/// Write a single JSON line to the buffered writer and flush.
async fn write_line<W: AsyncWrite + Unpin>(writer: &mut BufWriter<W>, json: &str) -> Result<()> {
    writer
        .write_all(json.as_bytes())
        .await
        .map_err(|e| WardenError::Host(format!("failed to write to stdout: {e}")))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| WardenError::Host(format!("failed to write newline to stdout: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| WardenError::Host(format!("failed to flush stdout: {e}")))?;
    Ok(())
}
