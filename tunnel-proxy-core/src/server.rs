use std::net::SocketAddr;

use anyhow::Result;
use hyper_util::{
    rt::{TokioExecutor, TokioIo as HyperSocket},
    server::conn::auto::Builder,
};
use tokio::net::TcpListener;
use tracing::{debug, error};

use crate::{error::ProxyError, service::ProxyService};

/// HTTP listener handing every connection to a [`ProxyService`].
pub struct Server {
    /// The TCP listener for accepting incoming connections
    connection: TcpListener,
    /// Service cloned for each accepted connection
    service: ProxyService,
}

impl Server {
    /// Binds the listener. Use port 0 to let the OS pick one.
    pub async fn new(addr: SocketAddr, service: ProxyService) -> Result<Self, ProxyError> {
        Ok(Self {
            connection: TcpListener::bind(&addr).await?,
            service,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.connection.local_addr()?)
    }

    /// Accepts a new connection and spawns a task serving it.
    ///
    /// Returns once the task is spawned; connection errors are logged by the
    /// task and never reach the caller.
    pub async fn accept(&self) -> Result<()> {
        let (conn, address) = self.connection.accept().await?;
        debug!(peer = %address, "Accepted connection");

        let mut service = self.service.clone();
        service.from = address;

        let io = HyperSocket::new(conn);
        tokio::spawn(async move {
            if let Err(e) = Builder::new(TokioExecutor::new())
                .serve_connection(io, service)
                .await
            {
                error!(peer = %address, "Error serving connection: {:?}", e);
            }
        });
        Ok(())
    }
}
