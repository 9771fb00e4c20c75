//! Outbound transports

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

/// Where a connection's frames go
#[derive(Debug)]
pub enum Transport {
    /// Datagram to one client, sent from a socket shared by all UDP outputs
    Udp {
        socket: Arc<UdpSocket>,
        target: SocketAddr,
    },
    /// Write half of an accepted stream client
    Tcp(OwnedWriteHalf),
    /// Serial device opened for writing
    Serial(File),
    /// In-process consumer (e.g. a UI or recorder)
    Channel(mpsc::Sender<Bytes>),
}

impl Transport {
    /// Write one frame (or batch of frames)
    pub async fn write(&mut self, frame: &Bytes) -> io::Result<()> {
        match self {
            Transport::Udp { socket, target } => {
                socket.send_to(frame, *target).await?;
                Ok(())
            }
            Transport::Tcp(stream) => stream.write_all(frame).await,
            Transport::Serial(file) => {
                file.write_all(frame).await?;
                file.flush().await
            }
            Transport::Channel(tx) => match tx.try_send(frame.clone()) {
                Ok(()) => Ok(()),
                // Slow consumer: drop like a lossy link
                Err(mpsc::error::TrySendError::Full(_)) => Ok(()),
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    Err(io::Error::new(io::ErrorKind::BrokenPipe, "channel consumer dropped"))
                }
            },
        }
    }

    /// Whether a write error should close the connection
    pub fn errors_are_fatal(&self) -> bool {
        !matches!(self, Transport::Udp { .. })
    }

    /// Whether the link can sleep (datagram clients come and go silently)
    pub fn is_lossy(&self) -> bool {
        matches!(self, Transport::Udp { .. })
    }

    /// Whether a write waits on the peer draining its side (stream and
    /// serial links). Such links are only ever written from their own
    /// writer task.
    pub fn can_stall(&self) -> bool {
        matches!(self, Transport::Tcp(_) | Transport::Serial(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_udp_write() {
        let rx = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let tx = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let mut transport = Transport::Udp {
            socket: tx,
            target: rx.local_addr().unwrap(),
        };

        transport.write(&Bytes::from_static(&[0x7E, 0x00, 0x7E])).await.unwrap();

        let mut buf = [0u8; 16];
        let (n, _) = rx.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[0x7E, 0x00, 0x7E]);
        assert!(!transport.errors_are_fatal());
        assert!(!transport.can_stall());
    }

    #[tokio::test]
    async fn test_channel_write_and_close() {
        let (tx, mut rx) = mpsc::channel(1);
        let mut transport = Transport::Channel(tx);

        transport.write(&Bytes::from_static(b"a")).await.unwrap();
        // Full: silently dropped
        transport.write(&Bytes::from_static(b"b")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"a"));

        drop(rx);
        let err = transport.write(&Bytes::from_static(b"c")).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert!(transport.errors_are_fatal());
        assert!(!transport.can_stall());
    }

    #[tokio::test]
    async fn test_tcp_write() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut client = tokio::net::TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        let (_read, write) = server.into_split();
        let mut transport = Transport::Tcp(write);
        assert!(transport.can_stall());
        assert!(!transport.is_lossy());

        transport.write(&Bytes::from_static(b"gdl90")).await.unwrap();

        let mut buf = [0u8; 5];
        tokio::io::AsyncReadExt::read_exact(&mut client, &mut buf).await.unwrap();
        assert_eq!(&buf, b"gdl90");
    }
}
