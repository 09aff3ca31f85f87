//! Wire framing: length-prefixed opaque payloads
//!
//! Wire format:  [4-byte big-endian length][payload bytes]
//!
//! The codec never looks inside the payload. A declared length above the
//! configured maximum is a protocol violation and the caller must drop the
//! connection; there is no resynchronization inside a corrupted stream.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// Size of the length prefix in bytes
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Default upper bound for a single frame (64 MB, room for model snapshots)
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 64 * 1024 * 1024;

/// Read one frame from `reader`.
///
/// Returns `Ok(None)` when the stream ends cleanly on a frame boundary.
/// EOF in the middle of a frame is a decode error.
pub async fn read_frame<R>(reader: &mut R, max_frame_size: u32) -> Result<Option<Bytes>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; LENGTH_PREFIX_LEN];
    let mut filled = 0;
    while filled < LENGTH_PREFIX_LEN {
        let n = reader.read(&mut len_buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(Error::Decode(format!(
                "stream ended after {} of {} length bytes",
                filled, LENGTH_PREFIX_LEN
            )));
        }
        filled += n;
    }

    let len = u32::from_be_bytes(len_buf);
    if len > max_frame_size {
        return Err(Error::FrameTooLarge {
            len: len as u64,
            max: max_frame_size,
        });
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::Decode(format!("stream ended inside a {} byte payload", len))
        } else {
            Error::Io(e)
        }
    })?;

    Ok(Some(Bytes::from(payload)))
}

/// Write one frame to `writer` and flush it.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8], max_frame_size: u32) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let len = check_len(payload.len(), max_frame_size)?;

    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;

    Ok(())
}

/// Encode a frame into a contiguous buffer (prefix + payload)
pub fn encode_frame(payload: &[u8], max_frame_size: u32) -> Result<Vec<u8>> {
    let len = check_len(payload.len(), max_frame_size)?;

    let mut frame = Vec::with_capacity(LENGTH_PREFIX_LEN + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

fn check_len(len: usize, max_frame_size: u32) -> Result<u32> {
    if len as u64 > max_frame_size as u64 {
        return Err(Error::FrameTooLarge {
            len: len as u64,
            max: max_frame_size,
        });
    }
    Ok(len as u32)
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_reads_frame_split_across_reads() {
        let mut mock = Builder::new()
            .read(&[0, 0])
            .read(&[0, 5, b'h', b'e'])
            .read(b"llo")
            .build();

        let frame = read_frame(&mut mock, 1024).await.unwrap().unwrap();
        assert_eq!(&frame[..], b"hello");
    }

    #[tokio::test]
    async fn test_clean_eof_returns_none() {
        let mut empty: &[u8] = &[];
        assert!(read_frame(&mut empty, 1024).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_eof_inside_prefix_is_decode_error() {
        let mut short: &[u8] = &[0, 0];
        let err = read_frame(&mut short, 1024).await.unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[tokio::test]
    async fn test_eof_inside_payload_is_decode_error() {
        let mut truncated: &[u8] = &[0, 0, 0, 10, 1, 2, 3];
        let err = read_frame(&mut truncated, 1024).await.unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[tokio::test]
    async fn test_oversized_prefix_rejected_before_payload() {
        // Only the prefix is available; the codec must not wait for the body.
        let mut mock = Builder::new().read(&2048u32.to_be_bytes()).build();
        let err = read_frame(&mut mock, 1024).await.unwrap_err();
        match err {
            Error::FrameTooLarge { len, max } => {
                assert_eq!(len, 2048);
                assert_eq!(max, 1024);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_write_frame_layout() {
        let mut mock = Builder::new().write(&[0, 0, 0, 3]).write(b"abc").build();
        write_frame(&mut mock, b"abc", 1024).await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_payload_is_a_valid_frame() {
        let (mut a, mut b) = tokio::io::duplex(64);
        write_frame(&mut a, b"", 16).await.unwrap();
        write_frame(&mut a, b"x", 16).await.unwrap();
        drop(a);

        assert_eq!(read_frame(&mut b, 16).await.unwrap().unwrap().len(), 0);
        assert_eq!(&read_frame(&mut b, 16).await.unwrap().unwrap()[..], b"x");
        assert!(read_frame(&mut b, 16).await.unwrap().is_none());
    }

    #[test]
    fn test_encode_frame_rejects_oversized_payload() {
        assert!(encode_frame(&[0u8; 5], 4).is_err());
        assert_eq!(encode_frame(&[7u8; 2], 4).unwrap(), vec![0, 0, 0, 2, 7, 7]);
    }
}
