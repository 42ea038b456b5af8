//! Length-prefixed frames.
//!
//! A frame is a 4-byte little-endian `u32` length followed by that many
//! bytes of JSON.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

pub const MAX_FRAME_LEN: usize = 100 * 1024 * 1024;

const HEADER_LEN: usize = 4;

pub async fn write_frame<W>(writer: &mut W, body: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if body.len() > MAX_FRAME_LEN {
        return Err(Error::FrameTooLarge(body.len()));
    }
    let len = body.len() as u32;
    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    read_full(reader, &mut header).await?;
    let len = u32::from_le_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(Error::FrameTooLarge(len));
    }

    let mut body = vec![0u8; len];
    read_full(reader, &mut body).await?;
    Ok(body)
}

/// Fills `buf` completely; a zero-byte read before that is a closed peer.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(Error::ConnectionClosed);
        }
        filled += n;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_frame_round_trip() {
        let (mut a, mut b) = duplex(64);
        let body = br#"{"type":7,"payload":null}"#.to_vec();

        let expected = body.clone();
        let writer = tokio::spawn(async move { write_frame(&mut a, &body).await });
        let got = read_frame(&mut b).await.unwrap();
        writer.await.unwrap().unwrap();

        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn test_empty_frame() {
        let (mut a, mut b) = duplex(64);
        write_frame(&mut a, &[]).await.unwrap();
        assert!(read_frame(&mut b).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_header_is_little_endian() {
        let (mut a, mut b) = duplex(64);
        write_frame(&mut a, b"abc").await.unwrap();
        let mut raw = [0u8; 7];
        b.read_exact(&mut raw).await.unwrap();
        assert_eq!(&raw[..4], &[3, 0, 0, 0]);
        assert_eq!(&raw[4..], b"abc");
    }

    #[tokio::test]
    async fn test_truncated_frame_is_connection_closed() {
        let (mut a, mut b) = duplex(64);
        a.write_all(&10u32.to_le_bytes()).await.unwrap();
        a.write_all(b"short").await.unwrap();
        drop(a);

        assert!(matches!(read_frame(&mut b).await, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_oversized_header_is_rejected() {
        let (mut a, mut b) = duplex(64);
        let len = (MAX_FRAME_LEN as u32) + 1;
        a.write_all(&len.to_le_bytes()).await.unwrap();

        assert!(matches!(read_frame(&mut b).await, Err(Error::FrameTooLarge(_))));
    }
}
