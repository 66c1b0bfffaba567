//! Length-prefixed frame codec
//!
//! Each frame is a 4-byte big-endian length followed by a bincode payload.

use crate::error::{TransportError, TransportResult};
use serde::{de::DeserializeOwned, Serialize};
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Encode `value` and write it as one frame
pub async fn write_frame<W, T>(writer: &mut W, value: &T, max_frame_bytes: usize) -> TransportResult<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = bincode::serialize(value).map_err(|e| TransportError::Codec(e.to_string()))?;
    if payload.len() > max_frame_bytes || payload.len() > u32::MAX as usize {
        return Err(TransportError::FrameTooLarge {
            size: payload.len(),
            limit: max_frame_bytes,
        });
    }

    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame and decode it
///
/// A clean end of stream before the length prefix is reported as
/// [`TransportError::Closed`].
pub async fn read_frame<R, T>(reader: &mut R, max_frame_bytes: usize, endpoint: &str) -> TransportResult<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
            return Err(TransportError::closed(endpoint));
        }
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > max_frame_bytes {
        return Err(TransportError::FrameTooLarge {
            size: len,
            limit: max_frame_bytes,
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    bincode::deserialize(&payload).map_err(|e| TransportError::Codec(e.to_string()))
}
