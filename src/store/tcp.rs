//! RESP2 over TCP.

use super::resp::{encode_command, FrameScanner, RespValue};
use crate::error::{KvError, KvResult};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

const READ_CHUNK: usize = 4096;

/// A single TCP connection to a Redis-compatible server.
pub struct TcpConnection {
    stream: TcpStream,
    read_buf: Vec<u8>,
    scanner: FrameScanner,
    write_buf: Vec<u8>,
    timeout: Duration,
}

impl TcpConnection {
    /// Connect, authenticate and name the connection.
    pub async fn connect(
        address: &str,
        password: Option<&str>,
        client_name: Option<&str>,
        timeout: Duration,
    ) -> KvResult<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(address))
            .await
            .map_err(|_| {
                KvError::connection(
                    format!("Timed out connecting to {}", address),
                    "Check that the store server is reachable or raise `timeout`",
                )
            })?
            .map_err(|e| {
                KvError::connection(
                    format!("Failed to connect to {}: {}", address, e),
                    "Check the host and port in the store URL",
                )
            })?;
        stream.set_nodelay(true)?;

        let mut conn = Self {
            stream,
            read_buf: Vec::with_capacity(READ_CHUNK),
            scanner: FrameScanner::default(),
            write_buf: Vec::new(),
            timeout,
        };

        if let Some(password) = password {
            conn.execute(&[b"AUTH".to_vec(), password.as_bytes().to_vec()])
                .await?
                .into_ok()
                .map_err(|e| {
                    KvError::connection(
                        format!("Authentication failed: {}", e),
                        "Check the password in the store URL",
                    )
                })?;
        }
        if let Some(name) = client_name {
            conn.execute(&[
                b"CLIENT".to_vec(),
                b"SETNAME".to_vec(),
                name.as_bytes().to_vec(),
            ])
            .await?
            .into_ok()?;
        }

        debug!(address, "Opened store connection");
        Ok(conn)
    }

    /// Write one command and wait for its reply, bounded by the I/O timeout.
    pub async fn execute(&mut self, args: &[Vec<u8>]) -> KvResult<RespValue> {
        self.write_buf.clear();
        encode_command(args, &mut self.write_buf);

        let timeout = self.timeout;
        tokio::time::timeout(timeout, self.round_trip())
            .await
            .map_err(|_| {
                KvError::connection(
                    format!("No reply within {}ms", timeout.as_millis()),
                    "Check store server load or raise `timeout`",
                )
            })?
    }

    /// Write one command without waiting for a reply.
    pub async fn send(&mut self, args: &[Vec<u8>]) -> KvResult<()> {
        self.write_buf.clear();
        encode_command(args, &mut self.write_buf);
        self.stream.write_all(&self.write_buf).await?;
        Ok(())
    }

    async fn round_trip(&mut self) -> KvResult<RespValue> {
        self.stream.write_all(&self.write_buf).await?;
        self.read_frame().await
    }

    /// Read the next complete frame, with no deadline.
    pub async fn read_frame(&mut self) -> KvResult<RespValue> {
        loop {
            if let Some((value, used)) = self.scanner.next_frame(&self.read_buf)? {
                self.read_buf.drain(..used);
                return Ok(value);
            }

            let mut chunk = [0u8; READ_CHUNK];
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(KvError::connection(
                    "Connection closed by server",
                    "Check store server status",
                ));
            }
            self.read_buf.extend_from_slice(&chunk[..n]);
        }
    }
}
