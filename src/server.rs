//! Unix domain socket transport for the device channel.
//!
//! Every connection is one open handle with its own read position. Requests
//! are newline-delimited:
//!
//! - a non-empty line is written to the device; the reply is `OK <n>` or
//!   `ERR <errno> <NAME>`;
//! - an empty line reads the device; the reply is `DATA <len>` followed by
//!   exactly `<len>` bytes of snapshot.

use std::future::Future;
use std::path::Path;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

use crate::device::{Device, DeviceHandle};

/// Bytes a single connection may send before it is cut off.
const MAX_CONNECTION_BYTES: u64 = 1024 * 1024;

/// Bind `socket_path`, replacing a stale socket file.
///
/// # Errors
///
/// Returns an error if the parent directory cannot be created, a stale
/// file cannot be removed, or the bind fails.
pub fn bind(socket_path: &Path) -> anyhow::Result<UnixListener> {
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create socket dir {}", parent.display()))?;
    }

    match std::fs::remove_file(socket_path) {
        Ok(()) => debug!(path = %socket_path.display(), "removed stale socket"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(e).with_context(|| {
                format!("failed to remove stale socket {}", socket_path.display())
            })
        }
    }

    UnixListener::bind(socket_path)
        .with_context(|| format!("failed to bind unix socket at {}", socket_path.display()))
}

/// Accept connections until `shutdown` resolves.
///
/// Each connection runs in its own task. The socket file is not removed;
/// callers own its path.
///
/// # Errors
///
/// Currently infallible; accept errors are logged and skipped.
pub async fn serve(
    listener: UnixListener,
    device: Device,
    read_buffer_size: usize,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    tokio::pin!(shutdown);
    info!(read_buffer_size, "device socket server started");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let handle = device.open();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, handle, read_buffer_size).await {
                                debug!(error = %e, "device connection ended");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "unix socket accept error"),
                }
            }
            () = &mut shutdown => {
                info!("device socket server shutting down");
                break;
            }
        }
    }

    Ok(())
}

async fn handle_connection(
    stream: UnixStream,
    mut handle: DeviceHandle,
    read_buffer_size: usize,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader.take(MAX_CONNECTION_BYTES));
    let mut line = Vec::new();

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        // Bytes go to the device undecoded; it reports bad input as EFAULT.
        let request = line.strip_suffix(b"\n").unwrap_or(line.as_slice());
        let request = request.strip_suffix(b"\r").unwrap_or(request);
        if request.is_empty() {
            reply_read(&mut writer, &mut handle, read_buffer_size).await?;
            continue;
        }

        let reply = match handle.write(request) {
            Ok(accepted) => format!("OK {accepted}\n"),
            Err(errno) => format!("ERR {} {}\n", errno.code(), errno.name()),
        };
        writer.write_all(reply.as_bytes()).await?;
        writer.flush().await?;
    }

    Ok(())
}

async fn reply_read<W: AsyncWrite + Unpin>(
    writer: &mut W,
    handle: &mut DeviceHandle,
    read_buffer_size: usize,
) -> std::io::Result<()> {
    let mut buf = vec![0_u8; read_buffer_size];
    match handle.read(&mut buf) {
        Ok(n) => {
            let body = buf.get(..n).unwrap_or_default();
            writer.write_all(format!("DATA {n}\n").as_bytes()).await?;
            writer.write_all(body).await?;
        }
        Err(errno) => {
            let reply = format!("ERR {} {}\n", errno.code(), errno.name());
            writer.write_all(reply.as_bytes()).await?;
        }
    }
    writer.flush().await
}
