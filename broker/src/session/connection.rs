//! Individual client session handling

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::warn;
use tracker_shared::codec::{self, FrameDecoder};
use tracker_shared::Frame;

/// Handle to send frames to a specific client
#[derive(Clone)]
pub struct SessionHandle {
    pub client_id: String,
    /// Distinguishes a reconnect from the session it replaced
    pub session_id: u64,
    pub addr: SocketAddr,
    pub connected_at: Instant,
    writer: Arc<Mutex<WriteHalf<TcpStream>>>,
}

impl SessionHandle {
    /// Send a frame to this client
    pub async fn send(&self, frame: &Frame) -> Result<()> {
        let encoded = codec::encode(frame)?;
        let mut writer = self.writer.lock().await;
        writer.write_all(&encoded).await?;
        Ok(())
    }

    /// Close the write side; the client sees the session end
    pub async fn close(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

/// Active client session
pub struct ClientSession {
    pub handle: SessionHandle,
    reader: ReadHalf<TcpStream>,
    decoder: FrameDecoder,
    read_buf: Vec<u8>,
}

impl ClientSession {
    pub fn new(stream: TcpStream, addr: SocketAddr, session_id: u64) -> Self {
        let (reader, writer) = tokio::io::split(stream);

        let handle = SessionHandle {
            client_id: String::new(), // set from the Connect frame
            session_id,
            addr,
            connected_at: Instant::now(),
            writer: Arc::new(Mutex::new(writer)),
        };

        Self {
            handle,
            reader,
            decoder: FrameDecoder::new(),
            read_buf: vec![0u8; 4096],
        }
    }

    /// Read the next frame from this session
    /// Returns None if the connection is closed
    pub async fn recv(&mut self) -> Option<Frame> {
        loop {
            match self.decoder.decode_next() {
                Ok(Some(frame)) => return Some(frame),
                Ok(None) => {}
                Err(e) => {
                    warn!("decode error from {}: {}", self.handle.addr, e);
                    return None;
                }
            }

            match self.reader.read(&mut self.read_buf).await {
                Ok(0) => return None,
                Ok(n) => self.decoder.extend(&self.read_buf[..n]),
                Err(e) => {
                    warn!("read error from {}: {}", self.handle.addr, e);
                    return None;
                }
            }
        }
    }

    pub fn client_id(&self) -> &str {
        &self.handle.client_id
    }
}
