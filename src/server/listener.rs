//! Network listeners
//!
//! Stream clients connect to a TCP output port and are registered as
//! destinations. EFB apps announce sleep/wake over a small UDP liveness
//! port.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream, UdpSocket};

use crate::error::Result;
use crate::server::capabilities::Capabilities;
use crate::server::connection::ConnectionKey;
use crate::server::link::LivenessEvent;
use crate::server::registry::ConnectionRegistry;
use crate::server::transport::Transport;

/// TCP output port
pub struct TcpOutputListener {
    listener: TcpListener,
    capabilities: Capabilities,
    registry: Arc<ConnectionRegistry>,
}

impl TcpOutputListener {
    pub async fn bind(
        addr: SocketAddr,
        capabilities: Capabilities,
        registry: Arc<ConnectionRegistry>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(addr = %listener.local_addr()?, capabilities = %capabilities, "TCP output listening");
        Ok(Self {
            listener,
            capabilities,
            registry,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept clients until the task is dropped
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((socket, peer_addr)) => self.handle_connection(socket, peer_addr).await,
                Err(e) => tracing::error!(error = %e, "Failed to accept connection"),
            }
        }
    }

    /// Accept clients until `shutdown` resolves
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.run() => result,
        }
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }

    async fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        if let Err(e) = socket.set_nodelay(true) {
            tracing::warn!(peer = %peer_addr, error = %e, "Failed to configure socket");
        }

        let (reader, writer) = socket.into_split();
        let key = ConnectionKey::Tcp(peer_addr);
        self.registry
            .register(key.clone(), self.capabilities, Transport::Tcp(writer))
            .await;

        let registry = Arc::clone(&self.registry);
        tokio::spawn(async move {
            watch_for_hangup(reader).await;
            if registry.remove(&key).await {
                tracing::debug!(client = %key, "Stream client hung up");
            }
        });
    }
}

/// Read and discard until the peer closes its side
async fn watch_for_hangup(mut reader: OwnedReadHalf) {
    let mut buf = [0u8; 256];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
    }
}

/// UDP port on which clients announce they can or cannot receive
pub struct LivenessListener {
    socket: UdpSocket,
    registry: Arc<ConnectionRegistry>,
}

impl LivenessListener {
    pub async fn bind(addr: SocketAddr, registry: Arc<ConnectionRegistry>) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        tracing::info!(addr = %socket.local_addr()?, "Liveness listening");
        Ok(Self { socket, registry })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub async fn run(&self) -> Result<()> {
        let mut buf = [0u8; 512];
        loop {
            let (n, peer) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    tracing::warn!(error = %e, "Liveness receive failed");
                    continue;
                }
            };
            let Some(event) = LivenessEvent::parse_datagram(&buf[..n]) else {
                tracing::trace!(peer = %peer, len = n, "Ignoring liveness datagram");
                continue;
            };
            let matched = self.registry.on_liveness(peer.ip(), None, event).await;
            tracing::debug!(peer = %peer, event = ?event, matched, "Liveness");
        }
    }

    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        tokio::select! {
            _ = shutdown => Ok(()),
            result = self.run() => result,
        }
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}
