use bytes::{Buf, BytesMut};
use log::debug;
use thiserror::Error;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

/// The longest line we will buffer before calling it a protocol violation.
pub const MAX_LINE: usize = 2048;

#[derive(Error, Debug)]
pub enum LineError {
    #[error("line exceeded {MAX_LINE} bytes without a newline")]
    Oversized,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A newline-framed text connection. Frames are UTF-8 lines terminated by
/// `\n`; CR characters on the wire are tolerated and stripped on read.
pub struct Connection {
    stream: TcpStream,
    buffer: BytesMut,
    skipping: bool,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Connection {
        Connection {
            stream,
            buffer: BytesMut::with_capacity(4 * 1024),
            skipping: false,
        }
    }

    /// Read the next complete line, without its terminator. `Ok(None)` means
    /// the peer closed the connection. An oversized line is reported once and
    /// everything up to its terminating newline is discarded, so the caller
    /// can complain and keep reading.
    pub async fn read_line(&mut self) -> Result<Option<String>, LineError> {
        loop {
            if let Some(line) = self.parse_line()? {
                return Ok(Some(line));
            }

            // try and read more data
            if 0 == self.stream.read_buf(&mut self.buffer).await? {
                return Ok(None);
            }
        }
    }

    pub async fn write_line(&mut self, line: &str) -> Result<(), LineError> {
        debug!("writing {line:?}");
        self.stream.write_all(line.as_bytes()).await?;
        if !line.ends_with('\n') {
            self.stream.write_all(b"\n").await?;
        }
        Ok(())
    }

    fn parse_line(&mut self) -> Result<Option<String>, LineError> {
        loop {
            let newline = self.buffer.iter().position(|&b| b == b'\n');

            if self.skipping {
                // still discarding the tail of an oversized line
                match newline {
                    Some(index) => {
                        self.buffer.advance(index + 1);
                        self.skipping = false;
                        continue;
                    }
                    None => {
                        self.buffer.clear();
                        return Ok(None);
                    }
                }
            }

            return match newline {
                Some(index) if index > MAX_LINE => {
                    self.buffer.advance(index + 1);
                    Err(LineError::Oversized)
                }
                Some(index) => {
                    let raw = self.buffer.split_to(index + 1);
                    let mut line = String::from_utf8_lossy(&raw[..index]).into_owned();
                    line.retain(|c| c != '\r');
                    Ok(Some(line))
                }
                None if self.buffer.len() > MAX_LINE => {
                    self.buffer.clear();
                    self.skipping = true;
                    Err(LineError::Oversized)
                }
                None => Ok(None),
            };
        }
    }

    pub async fn shutdown(&mut self) -> Result<(), LineError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::{io::AsyncWriteExt, net::TcpListener};

    async fn pair() -> (TcpStream, Connection) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, Connection::new(server))
    }

    #[tokio::test]
    async fn splits_lines_and_strips_crlf() {
        let (mut client, mut conn) = pair().await;
        client.write_all(b"hello\r\nwor").await.unwrap();
        assert_eq!(conn.read_line().await.unwrap(), Some("hello".to_string()));
        client.write_all(b"ld\n").await.unwrap();
        assert_eq!(conn.read_line().await.unwrap(), Some("world".to_string()));
    }

    #[tokio::test]
    async fn reports_peer_close() {
        let (client, mut conn) = pair().await;
        drop(client);
        assert_eq!(conn.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn oversized_line_is_rejected_then_skipped() {
        let (mut client, mut conn) = pair().await;
        let mut big = vec![b'a'; MAX_LINE + 100];
        big.push(b'\n');
        client.write_all(&big).await.unwrap();
        client.write_all(b"ok\n").await.unwrap();

        assert!(matches!(
            conn.read_line().await,
            Err(LineError::Oversized)
        ));
        assert_eq!(conn.read_line().await.unwrap(), Some("ok".to_string()));
    }

    #[tokio::test]
    async fn write_appends_missing_newline() {
        let (client, mut conn) = pair().await;
        conn.write_line("one").await.unwrap();
        conn.write_line("two\n").await.unwrap();

        let mut peer = Connection::new(client);
        assert_eq!(peer.read_line().await.unwrap(), Some("one".to_string()));
        assert_eq!(peer.read_line().await.unwrap(), Some("two".to_string()));
    }

    #[tokio::test]
    async fn empty_frame_is_an_empty_string() {
        let (mut client, mut conn) = pair().await;
        client.write_all(b"\n").await.unwrap();
        assert_eq!(conn.read_line().await.unwrap(), Some(String::new()));
    }
}
