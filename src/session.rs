// src/session.rs

use anyhow::Result;
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::config::{DbConfig, SessionConfig};
use crate::db::{self, PgPool};

static SESSION: OnceCell<Arc<ComputeSession>> = OnceCell::const_new();

/// The shared compute context for a run: the application identity, the
/// resource sizing it was requested with, and the database connection
/// pool every data operation goes through. Collaborators receive it as
/// an explicit argument rather than looking it up ambiently.
pub struct ComputeSession {
    sizing: SessionConfig,
    pool: PgPool,
}

impl ComputeSession {
    pub fn new(sizing: SessionConfig, pool: PgPool) -> Self {
        Self { sizing, pool }
    }

    pub fn app_name(&self) -> &str {
        &self.sizing.app_name
    }

    pub fn sizing(&self) -> &SessionConfig {
        &self.sizing
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn log_resources(&self) {
        info!(
            "Compute session '{}' (mode={}): driver {} cores / {} MB, executor {} cores / {} MB",
            self.sizing.app_name,
            self.sizing.mode,
            self.sizing.driver_cores,
            self.sizing.driver_memory_mb,
            self.sizing.executor_cores,
            self.sizing.executor_memory_mb
        );
        let available_mb = get_available_memory();
        let requested_mb = self.sizing.driver_memory_mb + self.sizing.executor_memory_mb;
        if requested_mb > available_mb {
            warn!(
                "Configured memory ({} MB) exceeds available system memory ({} MB)",
                requested_mb, available_mb
            );
        }
    }
}

/// Returns the process-wide compute session, creating it on first use.
/// Repeated calls reuse the existing session; the sizing of the first
/// call wins.
pub async fn get_or_create(
    sizing: &SessionConfig,
    db_config: &DbConfig,
) -> Result<Arc<ComputeSession>> {
    let session = SESSION
        .get_or_try_init(|| async {
            let pool = db::connect(db_config, &sizing.app_name).await?;
            let session = Arc::new(ComputeSession::new(sizing.clone(), pool));
            session.log_resources();
            Ok::<_, anyhow::Error>(session)
        })
        .await?;
    Ok(session.clone())
}

/// Current process memory usage in MB.
pub fn get_memory_usage() -> u64 {
    use sysinfo::System;
    let mut sys = System::new_all();
    sys.refresh_memory();
    sys.used_memory() / (1024 * 1024)
}

fn get_available_memory() -> u64 {
    use sysinfo::System;
    let mut sys = System::new_all();
    sys.refresh_memory();
    sys.available_memory() / (1024 * 1024)
}
