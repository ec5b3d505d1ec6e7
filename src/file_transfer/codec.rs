use bincode::config;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::types::{Chunk, Command, MAX_CHUNK, Outcome, WireMessage};
use crate::error::{FerryError, FerryResult};

/// Largest frame the codec will accept from a peer
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Codec for encoding/decoding wire messages.
///
/// Each frame is a 4-byte big-endian length prefix followed by the bincode
/// encoding of one [`WireMessage`]. Every write is flushed so the peer never
/// waits on buffered data.
#[derive(Default, Debug, Clone, Copy)]
pub struct WireCodec;

impl WireCodec {
    pub fn new() -> Self {
        Self
    }

    /// Serialize a message into a complete frame
    pub fn encode(&self, message: &WireMessage) -> FerryResult<Vec<u8>> {
        let data = bincode::encode_to_vec(message, config::standard())
            .map_err(|e| FerryError::ProtocolDecode(format!("cannot encode {}: {}", message.name(), e)))?;
        if data.len() > MAX_FRAME_LEN {
            return Err(FerryError::ProtocolDecode(format!(
                "{} frame of {} bytes exceeds limit",
                message.name(),
                data.len()
            )));
        }

        let mut frame = Vec::with_capacity(4 + data.len());
        frame.extend_from_slice(&(data.len() as u32).to_be_bytes());
        frame.extend_from_slice(&data);
        Ok(frame)
    }

    /// Deserialize the payload of one frame (without its length prefix)
    pub fn decode(&self, payload: &[u8]) -> FerryResult<WireMessage> {
        let (message, used): (WireMessage, usize) =
            bincode::decode_from_slice(payload, config::standard().with_limit::<MAX_FRAME_LEN>())
                .map_err(|e| FerryError::ProtocolDecode(e.to_string()))?;
        if used != payload.len() {
            return Err(FerryError::ProtocolDecode(format!(
                "{} trailing bytes after {}",
                payload.len() - used,
                message.name()
            )));
        }
        if let WireMessage::Chunk(chunk) = &message {
            if chunk.len() > MAX_CHUNK {
                return Err(FerryError::ProtocolDecode(format!(
                    "chunk of {} bytes exceeds maximum of {}",
                    chunk.len(),
                    MAX_CHUNK
                )));
            }
        }
        Ok(message)
    }

    pub async fn write_message<T>(&self, io: &mut T, message: &WireMessage) -> FerryResult<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        let frame = self.encode(message)?;
        io.write_all(&frame).await?;
        io.flush().await?;
        Ok(())
    }

    pub async fn read_message<T>(&self, io: &mut T) -> FerryResult<WireMessage>
    where
        T: AsyncRead + Unpin + Send,
    {
        // Read length prefix (4 bytes)
        let mut len_bytes = [0u8; 4];
        io.read_exact(&mut len_bytes).await?;
        let len = u32::from_be_bytes(len_bytes) as usize;
        if len > MAX_FRAME_LEN {
            return Err(FerryError::ProtocolDecode(format!(
                "frame length {} exceeds limit of {}",
                len, MAX_FRAME_LEN
            )));
        }

        let mut buffer = vec![0u8; len];
        io.read_exact(&mut buffer).await?;
        self.decode(&buffer)
    }

    pub async fn write_command<T>(&self, io: &mut T, command: &Command) -> FerryResult<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        self.write_message(io, &WireMessage::Command(command.clone())).await
    }

    pub async fn write_outcome<T>(&self, io: &mut T, outcome: &Outcome) -> FerryResult<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        self.write_message(io, &WireMessage::Outcome(outcome.clone())).await
    }

    pub async fn write_chunk<T>(&self, io: &mut T, data: &[u8]) -> FerryResult<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        self.write_message(io, &WireMessage::Chunk(Chunk::new(data.to_vec())))
            .await
    }

    pub async fn read_command<T>(&self, io: &mut T) -> FerryResult<Command>
    where
        T: AsyncRead + Unpin + Send,
    {
        match self.read_message(io).await? {
            WireMessage::Command(command) => Ok(command),
            other => Err(unexpected("command", &other)),
        }
    }

    pub async fn read_outcome<T>(&self, io: &mut T) -> FerryResult<Outcome>
    where
        T: AsyncRead + Unpin + Send,
    {
        match self.read_message(io).await? {
            WireMessage::Outcome(outcome) => Ok(outcome),
            other => Err(unexpected("outcome", &other)),
        }
    }

    /// Read the next chunk of a stream. An error outcome in its place means
    /// the sender gave up mid-transfer.
    pub async fn read_chunk<T>(&self, io: &mut T) -> FerryResult<Chunk>
    where
        T: AsyncRead + Unpin + Send,
    {
        match self.read_message(io).await? {
            WireMessage::Chunk(chunk) => Ok(chunk),
            WireMessage::Outcome(outcome) if !outcome.is_ok() => Err(FerryError::PeerAborted(
                outcome
                    .message
                    .unwrap_or_else(|| "no reason given".to_string()),
            )),
            other => Err(unexpected("chunk", &other)),
        }
    }
}

fn unexpected(expected: &'static str, found: &WireMessage) -> FerryError {
    FerryError::UnexpectedMessage {
        expected,
        found: found.name().to_string(),
    }
}
