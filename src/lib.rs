//! Taskflow - graph store, tree layout and background sync for taskflow canvases
//!
//! Re-exports the workspace crates and wires them together: pick a
//! persistence backend from [`TaskflowConfig`], start a [`BackgroundSync`]
//! for one graph and load the [`GraphStore`].

use anyhow::Context;
use std::sync::Arc;
use tracing::info;

pub use taskflow_core::*;
pub use taskflow_http::{HttpGraphPersistence, HttpPersistenceConfig};
pub use taskflow_monitoring::{init_test_tracing, LogExt, LogFormat, MonitoringConfig};
pub use taskflow_state_inmemory::{InMemoryGraphPersistence, PersistenceCall, PersistenceMethod};

/// Initialize logging at the configured level
pub fn init_logging(config: &TaskflowConfig) -> anyhow::Result<()> {
    taskflow_monitoring::init_logging(&MonitoringConfig::with_level(config.log_level.clone()))
}

/// Build the persistence backend selected by the configuration
pub fn build_persistence(config: &TaskflowConfig) -> anyhow::Result<Arc<dyn GraphPersistence>> {
    let persistence: Arc<dyn GraphPersistence> = match config.persistence.backend {
        PersistenceBackend::InMemory => Arc::new(InMemoryGraphPersistence::new()),
        PersistenceBackend::Http => {
            let http_config = HttpPersistenceConfig::try_from(&config.persistence)
                .context("Invalid HTTP persistence settings")?;
            Arc::new(
                HttpGraphPersistence::new(http_config).context("Failed to build HTTP persistence")?,
            )
        }
    };
    Ok(persistence)
}

/// Open a graph on an existing persistence backend
pub async fn open_taskflow_with(
    config: &TaskflowConfig,
    graph_id: GraphId,
    persistence: Arc<dyn GraphPersistence>,
) -> anyhow::Result<GraphStore> {
    config.validate().context("Invalid taskflow configuration")?;

    let sync = BackgroundSync::new(graph_id.clone(), persistence, config.sync.clone())
        .context("Failed to start background sync")?;
    let calculator = PositionCalculator::new(config.layout.clone());

    let store = GraphStore::load(sync, calculator)
        .await
        .log_err("Failed to load taskflow")
        .with_context(|| format!("Failed to load taskflow {}", graph_id))?;

    info!(
        graph_id = %graph_id,
        nodes = store.nodes().len(),
        edges = store.edges().len(),
        "Opened taskflow"
    );
    Ok(store)
}

/// Open a graph on the backend selected by the configuration
pub async fn open_taskflow(config: &TaskflowConfig, graph_id: GraphId) -> anyhow::Result<GraphStore> {
    let persistence = build_persistence(config)?;
    open_taskflow_with(config, graph_id, persistence).await
}
