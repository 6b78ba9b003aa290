use anyhow::Result;
use tracing::info;

use pgmirror_config::{DestinationKind, ProjectConfig};
use pgmirror_tp::{MockStore, TurbopufferStore};

use crate::runner::run_replication;

pub async fn cmd_run(config: ProjectConfig, once: bool) -> Result<()> {
    match config.destination.kind {
        DestinationKind::Turbopuffer => {
            let store = config
                .tables
                .iter()
                .fold(TurbopufferStore::new(config.destination_api_key()?), |store, t| {
                    store.with_namespace(&t.name, t.namespace())
                });
            run_replication(&config, store, once).await
        }
        DestinationKind::Memory => {
            info!("Using in-memory destination, rows are discarded on exit");
            run_replication(&config, MockStore::new(), once).await
        }
    }
}
