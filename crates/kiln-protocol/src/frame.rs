//! Frame layer shared by both protocols.
//!
//! A frame is `{id: u32, size: u32}` little-endian followed by `size`
//! body bytes. The layer is available both blocking (for the dedicated
//! client worker thread) and async (for the tokio server).

use std::io::{Read, Write};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ProtocolError, ProtocolResult};

/// Version negotiated out of band; bumped on any incompatible change.
pub const PROTOCOL_VERSION: u32 = 1;

/// Upper bound on a frame body. Large enough for any change log or blob
/// the pipeline produces, small enough to bound a hostile peer.
pub const MAX_FRAME_SIZE: u32 = 64 * 1024 * 1024;

/// One raw frame: message id plus undecoded body bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub id: u32,
    pub body: Vec<u8>,
}

impl Frame {
    pub fn new(id: u32, body: Vec<u8>) -> Self {
        Self { id, body }
    }

    /// Serialized size including the header.
    pub fn wire_len(&self) -> usize {
        8 + self.body.len()
    }

    /// Encode into a contiguous buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(self.wire_len());
        buffer.extend_from_slice(&self.id.to_le_bytes());
        buffer.extend_from_slice(&(self.body.len() as u32).to_le_bytes());
        buffer.extend_from_slice(&self.body);
        buffer
    }

    /// Blocking read of one frame.
    pub fn read_from(reader: &mut impl Read) -> ProtocolResult<Self> {
        let mut header = [0u8; 8];
        reader.read_exact(&mut header)?;
        let id = u32::from_le_bytes(header[0..4].try_into().expect("header slice"));
        let size = u32::from_le_bytes(header[4..8].try_into().expect("header slice"));
        if size > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size,
                max: MAX_FRAME_SIZE,
            });
        }
        let mut body = vec![0u8; size as usize];
        reader.read_exact(&mut body)?;
        Ok(Self { id, body })
    }

    /// Blocking write of one frame.
    pub fn write_to(&self, writer: &mut impl Write) -> ProtocolResult<()> {
        writer.write_all(&self.encode())?;
        writer.flush()?;
        Ok(())
    }

    /// Async read of one frame.
    pub async fn read_async(reader: &mut (impl AsyncRead + Unpin)) -> ProtocolResult<Self> {
        let mut header = [0u8; 8];
        reader.read_exact(&mut header).await?;
        let id = u32::from_le_bytes(header[0..4].try_into().expect("header slice"));
        let size = u32::from_le_bytes(header[4..8].try_into().expect("header slice"));
        if size > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size,
                max: MAX_FRAME_SIZE,
            });
        }
        let mut body = vec![0u8; size as usize];
        reader.read_exact(&mut body).await?;
        Ok(Self { id, body })
    }

    /// Async write of one frame.
    pub async fn write_async(
        &self,
        writer: &mut (impl AsyncWrite + Unpin),
    ) -> ProtocolResult<()> {
        writer.write_all(&self.encode()).await?;
        writer.flush().await?;
        Ok(())
    }
}
