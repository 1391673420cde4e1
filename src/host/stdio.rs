//! Stdin/stdout JSON bridge for the update service.
//!
//! Reads newline-delimited JSON `CommandEnvelope` messages from stdin,
//! dispatches them through the [`UpdateCommandHandler`], and writes
//! `ResponseEnvelope` and `EventEnvelope` messages as newline-delimited
//! JSON to stdout.
//!
//! Stdout is exclusively reserved for the JSON protocol; all diagnostic
//! output (tracing, logs) must be routed to stderr.

use crate::events::UpdateEvent;
use crate::host::contract::{CommandEnvelope, CommandName, EventEnvelope, ResponseEnvelope};
use crate::host::handler::UpdateCommandHandler;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;

type SharedWriter<W> = Arc<Mutex<W>>;

/// Run the bridge on the process's stdin and stdout until stdin closes or a
/// `host.stop` command is received.
///
/// # Errors
///
/// Returns an error if stdin cannot be read or stdout cannot be written.
pub async fn run_stdio_bridge(
    handler: UpdateCommandHandler,
    events: mpsc::UnboundedReceiver<UpdateEvent>,
) -> crate::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::BufWriter::new(tokio::io::stdout());
    run_bridge(handler, events, stdin, stdout).await
}

/// Run the bridge over arbitrary line-oriented streams.
///
/// Two activities share the writer:
///
/// 1. **Event forwarder**: turns each [`UpdateEvent`] into an
///    `EventEnvelope` line.
/// 2. **Reader**: parses command lines and writes one response per command.
///    Long-running commands (check, download, install) run as separate
///    tasks so `update.cancel` can be answered while a download streams.
///
/// On exit the event forwarder and any in-flight commands are aborted.
///
/// # Errors
///
/// Returns an error if the reader fails or a write to `writer` fails.
pub async fn run_bridge<R, W>(
    handler: UpdateCommandHandler,
    mut events: mpsc::UnboundedReceiver<UpdateEvent>,
    reader: R,
    writer: W,
) -> crate::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let writer: SharedWriter<W> = Arc::new(Mutex::new(writer));

    let event_writer = Arc::clone(&writer);
    let event_handle = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let envelope = EventEnvelope::from(&event);
            match serde_json::to_string(&envelope) {
                Ok(json) => {
                    let mut w = event_writer.lock().await;
                    if let Err(e) = write_line(&mut *w, &json).await {
                        tracing::warn!(
                            error = %e,
                            "failed to write event envelope; stopping event forwarder"
                        );
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to serialize event envelope; skipping");
                }
            }
        }
    });

    let mut in_flight = JoinSet::new();
    let result = run_reader(&handler, reader, &writer, &mut in_flight).await;

    in_flight.shutdown().await;
    event_handle.abort();
    let _ = event_handle.await;

    result
}

/// Read commands line by line and write responses.
async fn run_reader<R, W>(
    handler: &UpdateCommandHandler,
    mut reader: R,
    writer: &SharedWriter<W>,
    in_flight: &mut JoinSet<()>,
) -> crate::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;

        if bytes_read == 0 {
            tracing::info!("input closed (EOF); shutting down bridge");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let envelope: CommandEnvelope = match serde_json::from_str(trimmed) {
            Ok(env) => env,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    raw_line = %trimmed,
                    "failed to parse command envelope"
                );
                let response = ResponseEnvelope::error(
                    "parse-error",
                    format!("failed to parse command envelope: {e}"),
                );
                send_response(writer, &response).await?;
                continue;
            }
        };

        // Reap finished commands so the set does not grow unbounded.
        while in_flight.try_join_next().is_some() {}

        if envelope.command.is_long_running() {
            let handler = handler.clone();
            let writer = Arc::clone(writer);
            in_flight.spawn(async move {
                let response = handler.route(&envelope).await;
                if let Err(e) = send_response(&writer, &response).await {
                    tracing::warn!(error = %e, "failed to write response");
                }
            });
            continue;
        }

        let response = handler.route(&envelope).await;
        send_response(writer, &response).await?;

        if envelope.command == CommandName::HostStop {
            tracing::info!("host.stop received; shutting down bridge");
            break;
        }
    }

    Ok(())
}

async fn send_response<W>(
    writer: &SharedWriter<W>,
    response: &ResponseEnvelope,
) -> crate::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_string(response).map_err(std::io::Error::from)?;
    let mut w = writer.lock().await;
    write_line(&mut *w, &json).await
}

/// Write a single JSON line and flush.
async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, json: &str) -> crate::Result<()> {
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
