//! Transport layer - accepts handset connections

use crate::application::switch::Switch;
use crate::interface::gateway::Gateway;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Transport already started")]
    AlreadyStarted,
}

/// Transport layer trait
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Start accepting connections
    async fn start(&mut self) -> Result<(), TransportError>;

    /// Stop accepting connections. Established sessions run until they close.
    async fn stop(&mut self) -> Result<(), TransportError>;

    /// Bound address, once started
    fn local_addr(&self) -> Option<SocketAddr>;
}

/// TCP transport implementation
pub struct TcpTransport {
    bind_addr: String,
    switch: Arc<Switch>,
    local_addr: Option<SocketAddr>,
    accept_task: Option<JoinHandle<()>>,
}

impl TcpTransport {
    pub fn new(bind_addr: impl Into<String>, switch: Arc<Switch>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            switch,
            local_addr: None,
            accept_task: None,
        }
    }

    async fn accept_loop(listener: TcpListener, switch: Arc<Switch>) {
        loop {
            match listener.accept().await {
                Ok((stream, source)) => {
                    info!("Accepted connection from {}", source);
                    if let Err(e) = stream.set_nodelay(true) {
                        error!("Failed to set TCP_NODELAY for {}: {}", source, e);
                    }
                    tokio::spawn(Gateway::serve(switch.clone(), stream, source));
                }
                Err(e) => {
                    // Typically fd exhaustion; keep serving the sessions we have.
                    error!("Failed to accept connection: {}", e);
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    async fn start(&mut self) -> Result<(), TransportError> {
        if self.accept_task.is_some() {
            return Err(TransportError::AlreadyStarted);
        }
        info!("Starting TCP transport on {}", self.bind_addr);

        let listener = TcpListener::bind(&self.bind_addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: self.bind_addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| TransportError::Bind {
            addr: self.bind_addr.clone(),
            source,
        })?;
        info!("TCP transport listening on {}", local_addr);
        self.local_addr = Some(local_addr);

        let switch = self.switch.clone();
        self.accept_task = Some(tokio::spawn(async move {
            Self::accept_loop(listener, switch).await;
        }));

        Ok(())
    }

    async fn stop(&mut self) -> Result<(), TransportError> {
        info!("Stopping TCP transport");
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
        self.local_addr = None;
        Ok(())
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}
