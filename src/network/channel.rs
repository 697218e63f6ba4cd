//! One message per connection: connect, write the JSON body, close the
//! write half. The receiver reads to EOF and decodes.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::protocol::Message;

pub const MAX_MESSAGE_BYTES: usize = 1024 * 1024;

pub async fn send(addr: SocketAddr, message: &Message, connect_timeout: Duration) -> Result<()> {
    let data = message.encode()?;
    if data.len() > MAX_MESSAGE_BYTES {
        return Err(Error::MessageTooLarge {
            size: data.len(),
            limit: MAX_MESSAGE_BYTES,
        });
    }

    let mut stream = match timeout(connect_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => return Err(Error::Channel { addr, source }),
        Err(_) => {
            return Err(Error::Channel {
                addr,
                source: io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
            });
        }
    };

    stream
        .write_all(&data)
        .await
        .map_err(|source| Error::Channel { addr, source })?;
    stream
        .shutdown()
        .await
        .map_err(|source| Error::Channel { addr, source })?;

    Ok(())
}

pub async fn receive(stream: TcpStream, read_timeout: Duration) -> Result<Message> {
    let addr = stream.peer_addr()?;
    let mut buf = Vec::new();
    // one byte past the limit tells an oversized body from one that fits exactly
    let mut reader = stream.take(MAX_MESSAGE_BYTES as u64 + 1);

    match timeout(read_timeout, reader.read_to_end(&mut buf)).await {
        Ok(Ok(_)) => {}
        Ok(Err(source)) => return Err(Error::Channel { addr, source }),
        Err(_) => {
            return Err(Error::Channel {
                addr,
                source: io::Error::new(io::ErrorKind::TimedOut, "read timed out"),
            });
        }
    }

    if buf.len() > MAX_MESSAGE_BYTES {
        return Err(Error::MessageTooLarge {
            size: buf.len(),
            limit: MAX_MESSAGE_BYTES,
        });
    }
    Ok(Message::decode(&buf)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::LinkState;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_send_and_receive() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let msg = Message::broadcast(3, 2, vec![LinkState::new(3, 1, 4.5)]);
        let receiver = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            receive(stream, Duration::from_secs(1)).await
        });

        send(addr, &msg, Duration::from_secs(1)).await.unwrap();
        assert_eq!(receiver.await.unwrap().unwrap(), msg);
    }

    #[tokio::test]
    async fn test_send_to_absent_listener_is_transient() {
        // grab a free port and release it so nothing is listening
        let addr = {
            let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            probe.local_addr().unwrap()
        };

        let msg = Message::broadcast(1, 1, vec![]);
        let err = send(addr, &msg, Duration::from_millis(500)).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_oversized_message_is_refused_before_connecting() {
        // nothing listens here; the size check must fire first
        let addr = {
            let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            probe.local_addr().unwrap()
        };
        let link_states = (0..MAX_MESSAGE_BYTES / 16)
            .map(|i| LinkState::new(1, i + 2, 1.0))
            .collect();
        let msg = Message::broadcast(1, 1, link_states);

        let err = send(addr, &msg, Duration::from_millis(500)).await.unwrap_err();
        assert!(matches!(err, Error::MessageTooLarge { limit: MAX_MESSAGE_BYTES, .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_oversized_body_is_not_truncated() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let receiver = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            receive(stream, Duration::from_secs(5)).await
        });

        let mut stream = TcpStream::connect(addr).await.unwrap();
        // the receiver may reset the connection once it has seen enough
        let _ = stream.write_all(&vec![b' '; MAX_MESSAGE_BYTES + 10]).await;
        let _ = stream.shutdown().await;

        let err = receiver.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::MessageTooLarge { size, .. } if size == MAX_MESSAGE_BYTES + 1));
    }

    #[tokio::test]
    async fn test_garbage_is_codec_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let receiver = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            receive(stream, Duration::from_secs(1)).await
        });

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"not json").await.unwrap();
        stream.shutdown().await.unwrap();

        let err = receiver.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Codec(_)));
    }
}
