//! Per-process output relay
//!
//! Adapters (and the node tooling under them) can emit non-UTF8 bytes, so
//! lines are read byte-wise and decoded lossily instead of with
//! `BufReader::lines()`, which would end the relay on the first bad byte.

use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// How long buffered output is still drained after the process exited
pub const DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

/// Destination for prefixed output lines
pub trait OutputSink: Send + Sync + 'static {
    fn emit(&self, line: String);
}

/// Writes relayed lines to the supervisor's stdout.
///
/// Lines are queued to a single writer task, so a stalled stdout never blocks
/// a relay or a runtime worker.
#[derive(Debug, Clone)]
pub struct StdoutSink {
    tx: mpsc::UnboundedSender<String>,
}

impl StdoutSink {
    /// Must be called from within a tokio runtime
    pub fn new() -> Self {
        Self::with_writer(tokio::io::stdout())
    }

    /// Sink that writes to any async writer
    pub fn with_writer<W>(mut writer: W) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            while let Some(mut line) = rx.recv().await {
                line.push('\n');
                if let Err(e) = writer.write_all(line.as_bytes()).await {
                    log::debug!("Output writer stopped: {}", e);
                    break;
                }
                if rx.is_empty() {
                    let _ = writer.flush().await;
                }
            }
            let _ = writer.flush().await;
        });
        Self { tx }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputSink for StdoutSink {
    fn emit(&self, line: String) {
        let _ = self.tx.send(line);
    }
}

impl OutputSink for mpsc::UnboundedSender<String> {
    fn emit(&self, line: String) {
        let _ = self.send(line);
    }
}

/// Spawn the relay task for one process.
///
/// Both pipes are read by the same task, so their lines interleave into a
/// single stream. The task ends when both pipes close, or shortly after
/// `exited` flips to `true`.
pub fn spawn_output_relay<O, E, S>(
    name: String,
    stdout: Option<O>,
    stderr: Option<E>,
    sink: std::sync::Arc<S>,
    mut exited: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    O: AsyncRead + Unpin + Send + 'static,
    E: AsyncRead + Unpin + Send + 'static,
    S: OutputSink + ?Sized,
{
    tokio::spawn(async move {
        let mut out = stdout.map(BufReader::new);
        let mut err = stderr.map(BufReader::new);
        let mut out_buf: Vec<u8> = Vec::with_capacity(1024);
        let mut err_buf: Vec<u8> = Vec::with_capacity(1024);
        let mut deadline: Option<tokio::time::Instant> = None;

        while out.is_some() || err.is_some() {
            let drain = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                result = read_line(&mut out, &mut out_buf) => {
                    if !relay(&name, result, &mut out_buf, sink.as_ref()) {
                        out = None;
                    }
                }
                result = read_line(&mut err, &mut err_buf) => {
                    if !relay(&name, result, &mut err_buf, sink.as_ref()) {
                        err = None;
                    }
                }
                changed = exited.changed(), if deadline.is_none() => {
                    // A closed notifier means the handle is gone; treat it as exited
                    if changed.is_err() || *exited.borrow() {
                        deadline = Some(tokio::time::Instant::now() + DRAIN_TIMEOUT);
                    }
                }
                _ = drain => {
                    log::debug!("[{}] Output relay stopped after process exit", name);
                    break;
                }
            }
        }

        // Unterminated output left behind by a cancelled read
        flush_partial(&name, &mut out_buf, sink.as_ref());
        flush_partial(&name, &mut err_buf, sink.as_ref());

        log::debug!("[{}] Output relay finished", name);
    })
}

/// Append up to the next newline to `buf`; pends forever when the pipe is closed.
///
/// `read_until` is not cancellation safe: when another `select!` branch wins,
/// the bytes read so far stay in `buf`. The buffer is therefore only cleared
/// by [`relay`] once a complete line has been emitted.
async fn read_line<R>(
    reader: &mut Option<BufReader<R>>,
    buf: &mut Vec<u8>,
) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    match reader {
        Some(reader) => reader.read_until(b'\n', buf).await,
        None => std::future::pending().await,
    }
}

/// Emit a completed line; returns `false` once the pipe is finished
fn relay<S>(name: &str, result: std::io::Result<usize>, buf: &mut Vec<u8>, sink: &S) -> bool
where
    S: OutputSink + ?Sized,
{
    match result {
        Ok(0) => {
            flush_partial(name, buf, sink);
            false
        }
        Ok(_) => {
            sink.emit(format!("[{}] {}", name, trim_line(buf)));
            buf.clear();
            true
        }
        Err(e) => {
            log::debug!("[{}] Output stream read error: {}", name, e);
            flush_partial(name, buf, sink);
            false
        }
    }
}

fn flush_partial<S>(name: &str, buf: &mut Vec<u8>, sink: &S)
where
    S: OutputSink + ?Sized,
{
    if !buf.is_empty() {
        sink.emit(format!("[{}] {}", name, trim_line(buf)));
        buf.clear();
    }
}

fn trim_line(buf: &[u8]) -> String {
    let mut end = buf.len();
    if end > 0 && buf[end - 1] == b'\n' {
        end -= 1;
        if end > 0 && buf[end - 1] == b'\r' {
            end -= 1;
        }
    }
    String::from_utf8_lossy(&buf[..end]).into_owned()
}
