//! Stdio transport.
//!
//! One sequential read-dispatch-write loop over stdin/stdout. The loop is
//! generic over the byte streams so tests can drive it with in-memory pipes.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::codec;
use crate::error::{Error, Result};

use super::{Framing, MessageHandler, StatCounters, Transport, TransportStats};

/// Transport over this process's stdin and stdout.
///
/// Logging must go to stderr; stdout belongs to the wire.
pub struct StdioTransport {
    framing: Framing,
    compress: bool,
    handler: Mutex<Option<Arc<dyn MessageHandler>>>,
    stats: Arc<StatCounters>,
    cancel: Mutex<CancellationToken>,
    done: Mutex<CancellationToken>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StdioTransport {
    /// Compression applies per frame and only with length-prefixed framing;
    /// it is ignored for newline framing.
    pub fn new(framing: Framing, compress: bool) -> Self {
        Self {
            framing,
            compress: compress && framing == Framing::LengthPrefixed,
            handler: Mutex::new(None),
            stats: StatCounters::new(),
            cancel: Mutex::new(CancellationToken::new()),
            done: Mutex::new(CancellationToken::new()),
            task: Mutex::new(None),
        }
    }

    fn current_handler(&self) -> Option<Arc<dyn MessageHandler>> {
        match self.handler.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        }
    }

    fn store_tokens(&self, cancel: &CancellationToken, done: &CancellationToken) {
        if let Ok(mut slot) = self.cancel.lock() {
            *slot = cancel.clone();
        }
        if let Ok(mut slot) = self.done.lock() {
            *slot = done.clone();
        }
    }

    fn cancel_token(&self) -> CancellationToken {
        match self.cancel.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => CancellationToken::new(),
        }
    }

    fn done_token(&self) -> CancellationToken {
        match self.done.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => CancellationToken::new(),
        }
    }

    fn take_task(&self) -> Option<JoinHandle<()>> {
        match self.task.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    fn name(&self) -> &str {
        "stdio"
    }

    fn set_handler(&self, handler: Arc<dyn MessageHandler>) {
        if let Ok(mut slot) = self.handler.lock() {
            *slot = Some(handler);
        }
    }

    async fn start(&self) -> Result<()> {
        if self.stats.is_connected() {
            return Err(Error::Transport(
                "stdio transport already running".to_string(),
            ));
        }
        let handler = self
            .current_handler()
            .ok_or_else(|| Error::Transport("no message handler set".to_string()))?;

        let cancel = CancellationToken::new();
        let done = CancellationToken::new();
        self.store_tokens(&cancel, &done);

        let stats = Arc::clone(&self.stats);
        let framing = self.framing;
        let compress = self.compress;
        stats.mark_connected();

        let task = tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let stdout = tokio::io::stdout();
            let result = match framing {
                Framing::NewlineDelimited => {
                    run_lines_loop(stdin, stdout, handler, Arc::clone(&stats), cancel).await
                }
                Framing::LengthPrefixed => {
                    run_length_prefixed_loop(
                        stdin,
                        stdout,
                        handler,
                        Arc::clone(&stats),
                        cancel,
                        compress,
                    )
                    .await
                }
            };
            if let Err(e) = result {
                error!("stdio transport loop failed: {}", e);
            }
            stats.mark_disconnected();
            done.cancel();
        });

        if let Ok(mut slot) = self.task.lock() {
            *slot = Some(task);
        }
        info!(framing = %self.framing, compress = self.compress, "stdio transport started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.cancel_token().cancel();
        if let Some(task) = self.take_task() {
            if let Err(e) = task.await {
                warn!("stdio transport task ended abnormally: {}", e);
            }
        }
        info!("stdio transport stopped");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stats.is_connected()
    }

    fn stats(&self) -> TransportStats {
        self.stats.snapshot()
    }

    async fn closed(&self) {
        self.done_token().cancelled_owned().await;
    }
}

/// Newline-delimited loop: one JSON document per line.
///
/// Blank lines are skipped. EOF or cancellation ends the loop; write errors
/// are fatal to it.
pub(crate) async fn run_lines_loop<R, W>(
    reader: R,
    writer: W,
    handler: Arc<dyn MessageHandler>,
    stats: Arc<StatCounters>,
    cancel: CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut incoming = FramedRead::new(reader, LinesCodec::new());
    let mut outgoing = FramedWrite::new(writer, LinesCodec::new());

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = incoming.next() => match frame {
                Some(Ok(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    stats.inc_received();
                    if let Some(response) = handler.handle(&line).await {
                        outgoing
                            .send(response)
                            .await
                            .map_err(|e| Error::Transport(format!("write failed: {}", e)))?;
                        stats.inc_sent();
                    }
                }
                Some(Err(e)) => {
                    stats.inc_errors();
                    return Err(Error::Transport(format!("read failed: {}", e)));
                }
                None => break,
            },
        }
    }

    // Every send already flushed; nothing is buffered here.
    Ok(())
}

/// Length-prefixed loop with optional per-frame gzip.
///
/// A frame that cannot be decompressed or is not UTF-8 is dropped with a
/// warning; the loop survives.
pub(crate) async fn run_length_prefixed_loop<R, W>(
    reader: R,
    writer: W,
    handler: Arc<dyn MessageHandler>,
    stats: Arc<StatCounters>,
    cancel: CancellationToken,
    compress: bool,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut incoming = FramedRead::new(reader, LengthDelimitedCodec::new());
    let mut outgoing = FramedWrite::new(writer, LengthDelimitedCodec::new());

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = incoming.next() => match frame {
                Some(Ok(payload)) => {
                    stats.inc_received();
                    let text = match decode_frame(&payload, compress).await {
                        Ok(text) => text,
                        Err(e) => {
                            stats.inc_errors();
                            warn!("dropping undecodable frame: {}", e);
                            continue;
                        }
                    };
                    if let Some(response) = handler.handle(&text).await {
                        match encode_frame(&response, compress).await {
                            Ok(bytes) => {
                                outgoing
                                    .send(bytes)
                                    .await
                                    .map_err(|e| {
                                        Error::Transport(format!("write failed: {}", e))
                                    })?;
                                stats.inc_sent();
                            }
                            Err(e) => {
                                stats.inc_errors();
                                warn!("failed to encode response frame: {}", e);
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    stats.inc_errors();
                    return Err(Error::Transport(format!("read failed: {}", e)));
                }
                None => break,
            },
        }
    }

    outgoing
        .flush()
        .await
        .map_err(|e| Error::Transport(format!("flush failed: {}", e)))?;
    Ok(())
}

async fn decode_frame(payload: &[u8], compress: bool) -> Result<String> {
    let bytes = if compress {
        codec::decompress(payload).await?
    } else {
        payload.to_vec()
    };
    String::from_utf8(bytes).map_err(|e| Error::Transport(format!("frame is not utf-8: {}", e)))
}

async fn encode_frame(text: &str, compress: bool) -> Result<Bytes> {
    let bytes = if compress {
        codec::compress(text.as_bytes()).await?
    } else {
        text.as_bytes().to_vec()
    };
    Ok(Bytes::from(bytes))
}
