//! Frame packing and unpacking, in-memory and over async streams.
//!
//! [`pack`] and [`unpack`] work on complete buffers. [`read_frame`] is what
//! the connection reader uses: it reads exactly the 24 header bytes, then
//! exactly the announced number of body bytes, blocking until they arrive.
//! A frame is never handed out half-assembled.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::message::{FrameHeader, HEADER_LEN, Message};
use crate::ProtocolError;

/// Upper bound on how much body buffer is reserved ahead of the data.
const BODY_CHUNK: usize = 64 * 1024;

/// Encodes a message into one wire frame.
///
/// # Errors
/// Returns [`ProtocolError::BodyTooLarge`] if the body length does not fit
/// the `i32` size prefix.
pub fn pack(message: &Message) -> Result<Bytes, ProtocolError> {
    let len = message.body_len();
    let body_size = i32::try_from(len).map_err(|_| {
        ProtocolError::BodyTooLarge {
            size: len,
            limit: i32::MAX as usize,
        }
    })?;

    let mut buf = BytesMut::with_capacity(HEADER_LEN + len);
    message.header().write_to(body_size, &mut buf);
    buf.extend_from_slice(message.body());
    Ok(buf.freeze())
}

/// Decodes one frame from the start of `data`.
///
/// Bytes past the end of the frame are ignored.
///
/// # Errors
/// - [`ProtocolError::TruncatedHeader`] with fewer than 24 bytes.
/// - [`ProtocolError::NegativeBodySize`] for a negative size prefix.
/// - [`ProtocolError::TruncatedBody`] when the body is short.
pub fn unpack(data: &[u8]) -> Result<Message, ProtocolError> {
    let (body_size, header) = FrameHeader::parse(data)?;
    let rest = &data[HEADER_LEN..];
    if rest.len() < body_size {
        return Err(ProtocolError::TruncatedBody {
            need: body_size,
            got: rest.len(),
        });
    }
    Ok(Message::with_header(
        header,
        Bytes::copy_from_slice(&rest[..body_size]),
    ))
}

/// Reads exactly one frame from `reader`.
///
/// Returns `Ok(None)` when the stream ends cleanly on a frame boundary.
/// `max_body` caps the body allocation; `0` disables the cap.
///
/// # Errors
/// Any [`ProtocolError`] framing variant, or [`ProtocolError::Io`] when the
/// stream itself fails.
pub async fn read_frame<R>(
    reader: &mut R,
    max_body: usize,
) -> Result<Option<Message>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut header_buf = [0u8; HEADER_LEN];
    let got = fill(reader, &mut header_buf).await?;
    if got == 0 {
        return Ok(None);
    }
    if got < HEADER_LEN {
        return Err(ProtocolError::TruncatedHeader { got });
    }

    let (body_size, header) = FrameHeader::parse(&header_buf)?;
    if max_body > 0 && body_size > max_body {
        return Err(ProtocolError::BodyTooLarge {
            size: body_size,
            limit: max_body,
        });
    }

    // The buffer grows with the bytes that actually arrive, so a bogus
    // size prefix can't make us allocate up front.
    let mut body = BytesMut::with_capacity(body_size.min(BODY_CHUNK));
    let mut limited = (&mut *reader).take(body_size as u64);
    while body.len() < body_size {
        body.reserve((body_size - body.len()).min(BODY_CHUNK));
        if limited.read_buf(&mut body).await? == 0 {
            return Err(ProtocolError::TruncatedBody {
                need: body_size,
                got: body.len(),
            });
        }
    }

    Ok(Some(Message::with_header(header, body.freeze())))
}

/// Packs `message` and writes the whole frame to `writer`.
pub async fn write_frame<W>(
    writer: &mut W,
    message: &Message,
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let frame = pack(message)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads until `buf` is full or the stream ends; returns bytes read.
async fn fill<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Message {
        Message::with_header(
            FrameHeader {
                version: *b"1.02",
                compress: 1,
                client_type: 7,
                service_code: *b"gateway-000001",
            },
            &br#"{"cmd":"ping","seqno":"1"}"#[..],
        )
    }

    #[test]
    fn test_pack_unpack_preserves_every_field() {
        let msg = sample();
        let frame = pack(&msg).unwrap();
        assert_eq!(unpack(&frame).unwrap(), msg);
    }

    #[test]
    fn test_pack_unpack_empty_body() {
        let msg = Message::new(Bytes::new());
        let frame = pack(&msg).unwrap();
        assert_eq!(frame.len(), HEADER_LEN);
        assert_eq!(unpack(&frame).unwrap(), msg);
    }

    #[test]
    fn test_pack_length_is_header_plus_body() {
        for len in [0usize, 1, 23, 24, 25, 4096] {
            let msg = Message::new(vec![b'x'; len]);
            assert_eq!(pack(&msg).unwrap().len(), HEADER_LEN + len);
        }
    }

    #[test]
    fn test_pack_byte_layout() {
        let frame = pack(&sample()).unwrap();
        let body_len = sample().body_len() as i32;
        // Size prefix is little-endian, everything after is as-is.
        assert_eq!(&frame[0..4], &body_len.to_le_bytes());
        assert_eq!(&frame[4..8], b"1.02");
        assert_eq!(frame[8], 1);
        assert_eq!(frame[9], 7);
        assert_eq!(&frame[10..24], b"gateway-000001");
        assert_eq!(&frame[24..], &sample().body()[..]);
    }

    #[test]
    fn test_unpack_short_header_fails() {
        let frame = pack(&sample()).unwrap();
        assert!(matches!(
            unpack(&frame[..10]),
            Err(ProtocolError::TruncatedHeader { got: 10 })
        ));
    }

    #[test]
    fn test_unpack_short_body_fails() {
        let frame = pack(&sample()).unwrap();
        let cut = frame.len() - 2;
        let need = sample().body_len();
        match unpack(&frame[..cut]) {
            Err(ProtocolError::TruncatedBody { need: n, got }) => {
                assert_eq!(n, need);
                assert_eq!(got, need - 2);
            }
            other => panic!("expected TruncatedBody, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_read_frame_reads_consecutive_frames() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&pack(&Message::new(&b"one"[..])).unwrap());
        wire.extend_from_slice(&pack(&Message::new(&b"two"[..])).unwrap());
        let mut reader = wire.as_slice();

        let first = read_frame(&mut reader, 0).await.unwrap().unwrap();
        let second = read_frame(&mut reader, 0).await.unwrap().unwrap();
        assert_eq!(&first.body()[..], b"one");
        assert_eq!(&second.body()[..], b"two");
        assert!(read_frame(&mut reader, 0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_frame_waits_for_trickled_bytes() {
        let frame = pack(&sample()).unwrap();
        let (mut client, mut server) = tokio::io::duplex(64);

        let writer = tokio::spawn(async move {
            for chunk in frame.chunks(5) {
                client.write_all(chunk).await.unwrap();
                tokio::task::yield_now().await;
            }
            client
        });

        let msg = read_frame(&mut server, 0).await.unwrap().unwrap();
        assert_eq!(msg, sample());
        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn test_read_frame_eof_mid_header() {
        let frame = pack(&sample()).unwrap();
        let mut reader = &frame[..12];
        assert!(matches!(
            read_frame(&mut reader, 0).await,
            Err(ProtocolError::TruncatedHeader { got: 12 })
        ));
    }

    #[tokio::test]
    async fn test_read_frame_eof_mid_body() {
        let frame = pack(&sample()).unwrap();
        let mut reader = &frame[..HEADER_LEN + 3];
        assert!(matches!(
            read_frame(&mut reader, 0).await,
            Err(ProtocolError::TruncatedBody { got: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_read_frame_huge_size_prefix_then_eof() {
        // Unlimited body, a size prefix near 2 GiB, and only 10 body bytes.
        let mut frame = BytesMut::new();
        sample().header().write_to(i32::MAX, &mut frame);
        frame.extend_from_slice(&[7u8; 10]);
        let mut reader = &frame[..];
        assert!(matches!(
            read_frame(&mut reader, 0).await,
            Err(ProtocolError::TruncatedBody { need, got: 10 }) if need == i32::MAX as usize
        ));
    }

    #[tokio::test]
    async fn test_read_frame_body_larger_than_one_chunk() {
        let msg = Message::new(vec![3u8; BODY_CHUNK * 2 + 5]);
        let frame = pack(&msg).unwrap();
        let mut reader = &frame[..];
        assert_eq!(read_frame(&mut reader, 0).await.unwrap().unwrap(), msg);
    }

    #[tokio::test]
    async fn test_read_frame_enforces_body_limit() {
        let frame = pack(&Message::new(vec![0u8; 100])).unwrap();
        let mut reader = &frame[..];
        assert!(matches!(
            read_frame(&mut reader, 64).await,
            Err(ProtocolError::BodyTooLarge {
                size: 100,
                limit: 64
            })
        ));
    }

    #[tokio::test]
    async fn test_write_frame_then_read_frame() {
        let (mut client, mut server) = tokio::io::duplex(256);
        write_frame(&mut client, &sample()).await.unwrap();
        let msg = read_frame(&mut server, 4096).await.unwrap().unwrap();
        assert_eq!(msg, sample());
    }
}
