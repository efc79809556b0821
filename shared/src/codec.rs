//! Frame codec for the varint-framed protocol.
//!
//! ```text
//! plain:      varint length | varint id | payload
//! threshold:  varint length | varint data length | varint id | payload
//! ```
//!
//! `length` counts every byte after itself. The threshold layout is used
//! once a compression threshold has been announced to the peer; this codec
//! only ever produces and accepts the uncompressed form (`data length` 0).

use crate::error::ProtocolError;
use crate::varint::{get_varint, peek_varint, put_varint, read_varint, varint_len};
use crate::MAX_FRAME_SIZE;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};

/// One protocol message: packet id plus opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub id: u32,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(id: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }

    pub fn empty(id: u32) -> Self {
        Self::new(id, Bytes::new())
    }

    /// Encoded size of id plus payload, i.e. the plain `length` prefix.
    pub fn body_len(&self) -> usize {
        varint_len(self.id) + self.payload.len()
    }
}

/// tokio-util codec turning a byte stream into [`Frame`]s and back.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
    compression_threshold: Option<u32>,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
            compression_threshold: None,
        }
    }

    pub fn with_max_size(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            compression_threshold: None,
        }
    }

    /// Switches both directions to the threshold layout (or back with `None`).
    pub fn set_compression_threshold(&mut self, threshold: Option<u32>) {
        self.compression_threshold = threshold;
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some((length, header_len)) = peek_varint(src)? else {
            return Ok(None);
        };
        let length = length as usize;

        if length > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: length,
                max: self.max_frame_size,
            });
        }

        let total = header_len + length;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(header_len);
        let body = src.split_to(length).freeze();
        decode_body(body, self.compression_threshold).map(Some)
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body_len = frame.body_len();
        if body_len > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: body_len,
                max: self.max_frame_size,
            });
        }

        match self.compression_threshold {
            None => {
                dst.reserve(varint_len(body_len as u32) + body_len);
                put_varint(dst, body_len as u32);
            }
            Some(threshold) => {
                if body_len >= threshold as usize {
                    return Err(ProtocolError::CompressionRequired {
                        size: body_len,
                        threshold,
                    });
                }
                // data length 0 occupies one byte
                let packet_len = body_len + 1;
                dst.reserve(varint_len(packet_len as u32) + packet_len);
                put_varint(dst, packet_len as u32);
                put_varint(dst, 0);
            }
        }

        put_varint(dst, frame.id);
        dst.put_slice(&frame.payload);
        Ok(())
    }
}

fn decode_body(mut body: Bytes, compression_threshold: Option<u32>) -> Result<Frame, ProtocolError> {
    if let Some(threshold) = compression_threshold {
        let data_length = get_varint(&mut body)?;
        if data_length != 0 {
            return Err(ProtocolError::CompressionRequired {
                size: data_length as usize,
                threshold,
            });
        }
    }

    let id = get_varint(&mut body).map_err(|e| match e {
        ProtocolError::UnexpectedEof(_) => ProtocolError::UnexpectedEof("packet id"),
        other => other,
    })?;
    Ok(Frame { id, payload: body })
}

/// Reads a single plain-layout frame straight from an async reader.
///
/// Reads the length prefix, then exactly that many bytes; a short read is
/// reported as an `UnexpectedEof` i/o error.
pub async fn read_frame<R>(reader: &mut R, max_frame_size: usize) -> Result<Frame, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let length = read_varint(reader).await? as usize;
    if length > max_frame_size {
        return Err(ProtocolError::FrameTooLarge {
            size: length,
            max: max_frame_size,
        });
    }

    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).await?;
    decode_body(Bytes::from(body), None)
}

/// Writes a single plain-layout frame with one write call.
pub async fn write_frame<W>(writer: &mut W, id: u32, payload: &[u8]) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::new();
    FrameCodec::new().encode(Frame::new(id, Bytes::copy_from_slice(payload)), &mut buf)?;
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}
