// src/main.rs

use anyhow::{Context, Result};
use log::info;
use std::time::Instant;

use segmenter_lib::config::{self, TrainConfig};
use segmenter_lib::{session, train};

const DEFAULT_CONFIG_PATH: &str = "config/train.json";

fn main() -> Result<()> {
    env_logger::init();
    info!("Starting KMeans segmentation training pipeline");
    config::load_env_from_file(".env")?;

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = TrainConfig::from_file(&config_path)?;

    // The driver core count sizes the async runtime the run executes on.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.session.driver_cores)
        .thread_name("segmenter-worker")
        .enable_all()
        .build()
        .context("Failed to build async runtime")?;

    let started = Instant::now();
    runtime.block_on(train::run(&config))?;

    info!("Total execution time: {:.2?}", started.elapsed());
    info!("Final memory usage: {} MB", session::get_memory_usage());
    Ok(())
}
