// src/server.rs

//! The listening resource held for the app's lifetime.
//!
//! Receiving results from pages is out of scope here; the server only
//! reserves `host:port` so that hooks and launchers can be pointed at it and
//! an address already in use is detected up front.

use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard};

use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::errors::{RunError, TestloopError};
use crate::types::BoxFuture;

pub trait Server: Send + Sync {
    /// Bind and return the actual address (port 0 picks a free port).
    fn start(&self) -> BoxFuture<'_, Result<SocketAddr, RunError>>;

    /// Release the listener. Safe to call repeatedly.
    fn stop(&self) -> BoxFuture<'_, ()>;
}

#[derive(Debug)]
pub struct ListenerServer {
    host: String,
    port: u16,
    listener: Mutex<Option<TcpListener>>,
}

impl ListenerServer {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            listener: Mutex::new(None),
        }
    }

    pub fn is_listening(&self) -> bool {
        self.slot().is_some()
    }

    fn slot(&self) -> MutexGuard<'_, Option<TcpListener>> {
        self.listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn bind(&self) -> std::result::Result<TcpListener, TestloopError> {
        let addr = format!("{}:{}", self.host, self.port);
        Ok(TcpListener::bind(&addr).await?)
    }
}

impl Server for ListenerServer {
    fn start(&self) -> BoxFuture<'_, Result<SocketAddr, RunError>> {
        Box::pin(async move {
            let listener = self.bind().await.map_err(|e| {
                RunError::Infrastructure(format!(
                    "could not listen on {}:{}: {e}",
                    self.host, self.port
                ))
            })?;
            let addr = listener
                .local_addr()
                .map_err(|e| RunError::Infrastructure(e.to_string()))?;
            info!(%addr, "server listening");
            *self.slot() = Some(listener);
            Ok(addr)
        })
    }

    fn stop(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let taken = self.slot().take();
            if taken.is_some() {
                info!(host = %self.host, "server stopped");
            } else {
                debug!("server already stopped");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ephemeral_port_and_address_in_use() {
        let first = ListenerServer::new("127.0.0.1", 0);
        let addr = first.start().await.unwrap();
        assert_ne!(addr.port(), 0);
        assert!(first.is_listening());

        let second = ListenerServer::new("127.0.0.1", addr.port());
        let err = second.start().await.unwrap_err();
        assert!(matches!(err, RunError::Infrastructure(_)));

        first.stop().await;
        first.stop().await;
        assert!(!first.is_listening());
    }

    #[tokio::test]
    async fn poisoned_slot_still_releases_the_port() {
        let server = ListenerServer::new("127.0.0.1", 0);
        let addr = server.start().await.unwrap();

        let poison = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _held = server.listener.lock();
            panic!("poison the slot");
        }));
        assert!(poison.is_err());
        assert!(server.is_listening());

        server.stop().await;
        assert!(!server.is_listening());
        let again = ListenerServer::new("127.0.0.1", addr.port());
        again.start().await.unwrap();
        again.stop().await;
    }
}
