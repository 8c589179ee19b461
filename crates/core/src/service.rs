//! Long-lived, per-agent singleton services.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

use crate::runtime::Runtime;

#[async_trait]
pub trait Service: Send + Sync {
    fn service_name(&self) -> &str;

    /// Called on teardown. Default no-op; services owning external
    /// connections (sockets, background tasks) override this.
    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A plugin contributes services as factories rather than pre-built
/// instances, since construction is async and runtime-dependent (a
/// service typically dials out or spawns a background task using the
/// runtime it's handed). The loader calls each factory once at plugin
/// load time and registers the resulting singleton.
pub type ServiceFactory = Arc<dyn Fn(Arc<Runtime>) -> BoxFuture<'static, anyhow::Result<Arc<dyn Service>>> + Send + Sync>;
