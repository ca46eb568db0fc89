// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Length-prefixed framing.
//!
//! Wire format:
//! ```text
//! +----------------+-------------------+
//! | Length (4B BE) | Payload           |
//! +----------------+-------------------+
//! ```
//!
//! Zero-length frames are valid: a poll carries no payload.

use super::TransportError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Read one frame.
///
/// Returns `Ok(None)` if the peer closed the connection cleanly before a new
/// frame started.
pub async fn read_frame<R>(
    reader: &mut R,
    max_frame_size: usize,
) -> Result<Option<Vec<u8>>, TransportError>
where
    R: AsyncRead + Unpin,
{
    // Only EOF before the first prefix byte is a clean close.
    let mut len_buf = [0u8; 4];
    if reader.read(&mut len_buf[..1]).await? == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut len_buf[1..]).await?;

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_frame_size {
        return Err(TransportError::FrameTooLarge {
            len,
            max: max_frame_size,
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

/// Write one frame and flush it.
pub async fn write_frame<W>(
    writer: &mut W,
    payload: &[u8],
    max_frame_size: usize,
) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > max_frame_size {
        return Err(TransportError::FrameTooLarge {
            len: payload.len(),
            max: max_frame_size,
        });
    }

    let len = u32::try_from(payload.len()).map_err(|_| TransportError::FrameTooLarge {
        len: payload.len(),
        max: u32::MAX as usize,
    })?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_in_sequence() {
        let (mut a, mut b) = tokio::io::duplex(1024);

        write_frame(&mut a, b"client1", 64).await.unwrap();
        write_frame(&mut a, b"", 64).await.unwrap();
        write_frame(&mut a, b"client2|client3", 64).await.unwrap();
        drop(a);

        assert_eq!(read_frame(&mut b, 64).await.unwrap().unwrap(), b"client1");
        assert_eq!(read_frame(&mut b, 64).await.unwrap().unwrap(), b"");
        assert_eq!(
            read_frame(&mut b, 64).await.unwrap().unwrap(),
            b"client2|client3"
        );
        assert!(read_frame(&mut b, 64).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_write_rejected() {
        let (mut a, _b) = tokio::io::duplex(1024);
        let err = write_frame(&mut a, &[0u8; 17], 16).await.unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge { len: 17, max: 16 }));
    }

    #[tokio::test]
    async fn test_oversized_read_rejected() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        write_frame(&mut a, &[1u8; 32], 64).await.unwrap();

        let err = read_frame(&mut b, 16).await.unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge { len: 32, max: 16 }));
    }

    #[tokio::test]
    async fn test_truncated_prefix_is_error() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        a.write_all(&[0u8, 0]).await.unwrap();
        drop(a);

        assert!(matches!(
            read_frame(&mut b, 64).await,
            Err(TransportError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_truncated_body_is_error() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        a.write_all(&10u32.to_be_bytes()).await.unwrap();
        a.write_all(b"abc").await.unwrap();
        drop(a);

        assert!(matches!(
            read_frame(&mut b, 64).await,
            Err(TransportError::Io(_))
        ));
    }
}
