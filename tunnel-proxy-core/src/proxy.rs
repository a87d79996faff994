//! Process startup: resolve the tunnel first, then listen and schedule.

use std::sync::Arc;

use tracing::info;

use crate::{
    client::HttpClient,
    config::ProxyConfig,
    error::Result,
    resolver::Resolver,
    sanitizer::HeaderSanitizer,
    scheduler::{RefreshScheduler, SchedulerHandle},
    server::Server,
    service::{Dispatcher, ProxyService},
    target::TargetStore,
};

/// A started proxy: the bound listener, the running refresh scheduler and
/// the store both of them share.
pub struct TunnelProxy {
    server: Server,
    scheduler: SchedulerHandle,
    store: Arc<TargetStore>,
}

impl TunnelProxy {
    /// Resolves the initial tunnel url, binds `config.listen` and starts the
    /// refresh scheduler, in that order.
    ///
    /// Fails with [`ProxyError::Resolve`](crate::ProxyError::Resolve) when the
    /// initial resolution runs out of attempts; nothing is bound or scheduled
    /// in that case.
    pub async fn start(
        config: &ProxyConfig,
        resolver: Arc<Resolver>,
        client: HttpClient,
    ) -> Result<Self> {
        let sanitizer = HeaderSanitizer::from_config(config)?;

        let initial = resolver.resolve().await?;
        info!(tunnel = %initial, "Initial tunnel url set");
        let store = Arc::new(TargetStore::with_target(initial));

        let dispatcher = Dispatcher::new(
            Arc::clone(&store),
            Arc::clone(&resolver),
            sanitizer,
            client,
            config.forward_timeout(),
        );
        let server = Server::new(config.listen, ProxyService::new(Arc::new(dispatcher))).await?;

        let scheduler =
            RefreshScheduler::new(resolver, Arc::clone(&store), config.refresh_interval()).start();

        Ok(Self {
            server,
            scheduler,
            store,
        })
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    pub fn scheduler(&self) -> &SchedulerHandle {
        &self.scheduler
    }

    pub fn store(&self) -> &Arc<TargetStore> {
        &self.store
    }

    /// Stops the scheduler. The listener closes when `self` is dropped.
    pub async fn shutdown(self) {
        self.scheduler.stop().await;
    }
}
