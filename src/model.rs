// src/model.rs

use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use log::info;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::Path;

pub const MODEL_FILE: &str = "model.json";
const FORMAT_VERSION: u32 = 1;

/// The persisted form of a fitted KMeans model, with enough metadata
/// for a downstream consumer to assign new rows to segments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KMeansModel {
    pub format_version: u32,
    pub run_id: String,
    pub k: usize,
    pub feature_columns: Vec<String>,
    pub centroids: Vec<Vec<f64>>,
    pub trained_at: NaiveDateTime,
}

impl KMeansModel {
    pub fn new(
        run_id: String,
        feature_columns: Vec<String>,
        centroids: Vec<Vec<f64>>,
        trained_at: NaiveDateTime,
    ) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            run_id,
            k: centroids.len(),
            feature_columns,
            centroids,
            trained_at,
        }
    }

    /// Saves the model into `dir`, replacing any existing artifact at
    /// that location.
    pub fn save(&self, dir: &Path) -> Result<()> {
        if dir.exists() {
            fs::remove_dir_all(dir)
                .with_context(|| format!("Failed to remove existing model at {}", dir.display()))?;
        }
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create model directory {}", dir.display()))?;

        let path = dir.join(MODEL_FILE);
        let file = File::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(file, self)
            .with_context(|| format!("Failed to serialize model to {}", path.display()))?;
        info!("Saved model (k={}) to {}", self.k, dir.display());
        Ok(())
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(MODEL_FILE);
        let file = File::open(&path)
            .with_context(|| format!("Failed to open model file {}", path.display()))?;
        let model: KMeansModel = serde_json::from_reader(file)
            .with_context(|| format!("Failed to deserialize model from {}", path.display()))?;
        if model.format_version != FORMAT_VERSION {
            bail!(
                "Unsupported model format version {} in {}",
                model.format_version,
                path.display()
            );
        }
        Ok(model)
    }

    /// Assigns each row to its nearest centroid.
    pub fn predict(&self, features: &Array2<f64>) -> Result<Vec<usize>> {
        if self.centroids.is_empty() {
            bail!("Model has no centroids");
        }
        let dim = self.centroids[0].len();
        if features.ncols() != dim {
            bail!(
                "Feature dimension {} does not match model dimension {}",
                features.ncols(),
                dim
            );
        }

        let mut labels = Vec::with_capacity(features.nrows());
        for row in features.outer_iter() {
            let mut best = 0;
            let mut best_dist = f64::MAX;
            for (i, centroid) in self.centroids.iter().enumerate() {
                let dist: f64 = row
                    .iter()
                    .zip(centroid)
                    .map(|(x, c)| (x - c) * (x - c))
                    .sum();
                if dist < best_dist {
                    best_dist = dist;
                    best = i;
                }
            }
            labels.push(best);
        }
        Ok(labels)
    }
}
