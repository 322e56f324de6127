//! WebSocket transport.
//!
//! The socket is split once per connection attempt: the read loop owns the
//! [`FrameReader`], while the [`FrameWriter`] sits behind the shard's write
//! lock so replies and heartbeats never interleave.
//!
//! With `zstd-stream` compression every binary frame continues a single zstd
//! stream that lives as long as the connection; text frames pass through.

use futures::stream::{SplitSink, SplitStream};
use std::io;

use futures::{SinkExt, StreamExt};
use shardline_proto::CloseCode;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use zstd::stream::raw::{Decoder, InBuffer, Operation, OutBuffer};

use crate::error::ShardError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open a connection and split it into its read and write halves.
///
/// With `inflate` set, binary frames are decompressed as a zstd stream.
pub(crate) async fn dial(url: &str, inflate: bool) -> Result<(FrameReader, FrameWriter), ShardError> {
    let inflater = if inflate {
        Some(Inflater::new().map_err(|e| ShardError::Dial(e.to_string()))?)
    } else {
        None
    };

    let (ws_stream, _) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| ShardError::Dial(e.to_string()))?;

    let (sink, stream) = ws_stream.split();
    Ok((FrameReader { stream, inflater }, FrameWriter { sink }))
}

/// One data frame read from the socket.
#[derive(Debug)]
pub(crate) enum Frame {
    /// Text or binary frame as received.
    Raw(Message),
    /// Binary frame after decompression.
    Inflated(Vec<u8>),
}

impl Frame {
    pub(crate) fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Raw(Message::Text(text)) => text.as_bytes(),
            Self::Raw(Message::Binary(data)) => &data[..],
            Self::Raw(_) => &[],
            Self::Inflated(data) => data,
        }
    }
}

/// Streaming zstd decompressor shared by every frame of one connection.
pub(crate) struct Inflater {
    decoder: Decoder<'static>,
    chunk: Vec<u8>,
}

impl Inflater {
    const CHUNK: usize = 16 * 1024;

    pub(crate) fn new() -> io::Result<Self> {
        Ok(Self {
            decoder: Decoder::new()?,
            chunk: vec![0; Self::CHUNK],
        })
    }

    /// Decompress the next piece of the stream.
    pub(crate) fn inflate(&mut self, data: &[u8]) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(data.len() * 4);
        let mut input = InBuffer::around(data);
        loop {
            let written = {
                let mut output = OutBuffer::around(&mut self.chunk[..]);
                self.decoder.run(&mut input, &mut output)?;
                output.pos()
            };
            out.extend_from_slice(&self.chunk[..written]);

            // A full chunk may mean more output is buffered in the decoder.
            if input.pos() == data.len() && written < self.chunk.len() {
                return Ok(out);
            }
        }
    }
}

/// Read half of a connection.
pub(crate) struct FrameReader {
    stream: SplitStream<WsStream>,
    inflater: Option<Inflater>,
}

impl FrameReader {
    /// Next text or binary frame. Control frames are skipped.
    pub(crate) async fn read(&mut self) -> Result<Frame, ShardError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Binary(data))) => {
                    return match self.inflater.as_mut() {
                        Some(inflater) => inflater
                            .inflate(&data)
                            .map(Frame::Inflated)
                            .map_err(|e| ShardError::ConnectionLost(format!("inflate: {e}"))),
                        None => Ok(Frame::Raw(Message::Binary(data))),
                    };
                }
                Some(Ok(msg @ Message::Text(_))) => return Ok(Frame::Raw(msg)),
                Some(Ok(Message::Close(frame))) => {
                    return Err(match frame {
                        Some(frame) => ShardError::RemoteClosed {
                            code: CloseCode(u16::from(frame.code)),
                            reason: frame.reason.as_str().to_string(),
                        },
                        None => ShardError::RemoteClosed {
                            code: CloseCode::NO_STATUS,
                            reason: String::new(),
                        },
                    });
                }
                // Ping, pong and raw frames
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(ShardError::ConnectionLost(e.to_string())),
                None => return Err(ShardError::ConnectionLost("stream ended".to_string())),
            }
        }
    }
}

/// Write half of a connection.
pub(crate) struct FrameWriter {
    sink: SplitSink<WsStream, Message>,
}

impl FrameWriter {
    /// Send a text frame.
    pub(crate) async fn write(&mut self, frame: String) -> Result<(), ShardError> {
        self.sink
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| ShardError::Write(e.to_string()))
    }

    /// Send a close frame.
    pub(crate) async fn close(&mut self, code: CloseCode, reason: &str) -> Result<(), ShardError> {
        let frame = CloseFrame {
            code: code.0.into(),
            reason: reason.to_string().into(),
        };
        self.sink
            .send(Message::Close(Some(frame)))
            .await
            .map_err(|e| ShardError::Write(e.to_string()))
    }
}
