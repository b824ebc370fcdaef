//! Length-prefixed CBOR framing for byte-stream transports.
//!
//! Each frame is a 4-byte big-endian length followed by that many bytes of
//! CBOR-encoded [`WireMessage`]. Frames above the configured limit are
//! skipped without being buffered, and frames that fail to decode are
//! skipped too; both are reported in-band and the connection stays usable.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::config::SyncConfig;
use crate::error::TransportError;
use crate::messages::WireMessage;
use crate::transport::Channel;

const LEN_PREFIX: usize = 4;

/// Encode one message as a complete frame, prefix included.
pub fn encode_frame(msg: &WireMessage) -> Result<Vec<u8>, TransportError> {
    let mut frame = vec![0u8; LEN_PREFIX];
    ciborium::into_writer(msg, &mut frame)
        .map_err(|e| TransportError::Malformed(format!("encode: {}", e)))?;
    let len = u32::try_from(frame.len() - LEN_PREFIX).map_err(|_| TransportError::FrameTooLarge {
        len: frame.len() - LEN_PREFIX,
        max: u32::MAX as usize,
    })?;
    frame[..LEN_PREFIX].copy_from_slice(&len.to_be_bytes());
    Ok(frame)
}

/// Decode a frame body (without the length prefix).
pub fn decode_frame(body: &[u8]) -> Result<WireMessage, TransportError> {
    ciborium::from_reader(body).map_err(|e| TransportError::Malformed(e.to_string()))
}

/// Write one frame.
pub async fn write_frame<W>(writer: &mut W, msg: &WireMessage) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(msg)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame.
///
/// Returns `Ok(None)` when the peer closed the stream on a frame boundary.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Option<WireMessage>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LEN_PREFIX];
    let mut filled = 0;
    while filled < LEN_PREFIX {
        let n = reader.read(&mut prefix[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        filled += n;
    }

    let len = u32::from_be_bytes(prefix) as usize;
    if len > max_len {
        let mut rest = (&mut *reader).take(len as u64);
        let skipped = tokio::io::copy(&mut rest, &mut tokio::io::sink()).await?;
        if skipped < len as u64 {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        return Err(TransportError::FrameTooLarge { len, max: max_len });
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    decode_frame(&body).map(Some)
}

/// Run a byte stream as a message [`Channel`].
///
/// Spawns a reader task and a writer task. The writer shuts the stream down
/// once every sender for the returned channel is dropped.
pub fn framed<T>(io: T, config: &SyncConfig) -> Channel
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    let capacity = config.channel_capacity.max(1);
    let max_len = config.max_frame_len;
    let (mut reader, mut writer) = tokio::io::split(io);
    let (out_tx, mut out_rx) = mpsc::channel::<WireMessage>(capacity);
    let (in_tx, in_rx) = mpsc::channel(capacity);

    let fault_tx = in_tx.downgrade();
    tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if let Err(e) = write_frame(&mut writer, &msg).await {
                tracing::debug!(error = %e, "frame write failed");
                if let Some(tx) = fault_tx.upgrade() {
                    let _ = tx.send(Err(e)).await;
                }
                return;
            }
        }
        let _ = writer.shutdown().await;
    });

    tokio::spawn(async move {
        loop {
            match read_frame(&mut reader, max_len).await {
                Ok(Some(msg)) => {
                    if in_tx.send(Ok(msg)).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) if e.is_frame_error() => {
                    if in_tx.send(Err(e)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    let _ = in_tx.send(Err(e)).await;
                    break;
                }
            }
        }
    });

    Channel { tx: out_tx, rx: in_rx }
}
