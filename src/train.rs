// src/train.rs

use anyhow::{bail, Context, Result};
use chrono::Utc;
use linfa::traits::{Fit, Predict};
use linfa::DatasetBase;
use linfa_clustering::KMeans;
use log::info;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use uuid::Uuid;

use crate::config::{KMeansConfig, TrainConfig};
use crate::db::{DatabaseManager, WriteMode};
use crate::evaluate::{ClusteringEvaluator, DistanceMeasure};
use crate::frame::{Column, DataFrame};
use crate::model::KMeansModel;
use crate::preprocess::{Preprocessor, CODE_COLUMN, FEATURES_COLUMN, PREDICTION_COLUMN};
use crate::session;

/// End-to-end training orchestration: read, preprocess, fit, evaluate,
/// persist the model, write predictions back. Strictly sequential; any
/// failure propagates and aborts the run.
pub async fn run(config: &TrainConfig) -> Result<()> {
    let run_id = Uuid::new_v4().to_string();
    info!("Starting training run {}", run_id);

    let session = session::get_or_create(&config.session, &config.db).await?;
    let db_manager = DatabaseManager::new(config.db.clone());
    let preprocessor = Preprocessor::new(config.data.clone());

    let data = db_manager.read_data(&session).await?;
    let df = preprocessor.preprocess(data)?;

    info!("Using kmeans model with parameters: {:?}", config.kmeans);
    info!("Training");
    let features = feature_matrix(&df)?;
    let (centroids, labels) = fit_kmeans(&config.kmeans, &features)?;
    let model = KMeansModel::new(
        run_id,
        config.data.feature_columns.clone(),
        centroids,
        Utc::now().naive_utc(),
    );

    let predictions: Vec<i64> = labels.iter().map(|label| *label as i64).collect();
    let output = df.with_column(PREDICTION_COLUMN, Column::I64(predictions))?;
    output.show(20);

    info!("Evaluation");
    let evaluator = ClusteringEvaluator::new(DistanceMeasure::SquaredEuclidean);
    let score = evaluator.evaluate(&features, &labels)?;
    info!("Silhouette Score: {}", score);

    info!("Saving to {}", config.save_to.display());
    model.save(&config.save_to)?;

    info!("Writing result into DB");
    let result = prepare_output(&output)?;
    db_manager
        .write_data(&session, &result, WriteMode::Append)
        .await?;
    info!("Train successfully finished!");
    Ok(())
}

/// Fits KMeans with the configured hyperparameters and labels the
/// training rows. Returns the centroids and per-row cluster indices.
pub fn fit_kmeans(
    config: &KMeansConfig,
    features: &Array2<f64>,
) -> Result<(Vec<Vec<f64>>, Vec<usize>)> {
    let n = features.nrows();
    if config.k > n {
        bail!("kmeans.k ({}) exceeds the number of rows ({})", config.k, n);
    }

    let dataset = DatasetBase::from(features.to_owned());
    let rng = StdRng::seed_from_u64(config.seed);
    let model = KMeans::params_with_rng(config.k, rng)
        .max_n_iterations(config.max_iter)
        .tolerance(config.tolerance)
        .fit(&dataset)
        .context("KMeans training failed")?;

    let labels: Array1<usize> = model.predict(features);
    let centroids = model
        .centroids()
        .outer_iter()
        .map(|row| row.to_vec())
        .collect();
    Ok((centroids, labels.to_vec()))
}

/// Extracts the assembled feature column into a row-major matrix.
pub fn feature_matrix(frame: &DataFrame) -> Result<Array2<f64>> {
    let column = frame
        .column(FEATURES_COLUMN)
        .with_context(|| format!("Frame is missing the '{}' column", FEATURES_COLUMN))?;
    let vectors = match column {
        Column::Vector(v) => v,
        other => bail!(
            "Column '{}' has type {}, expected vector",
            FEATURES_COLUMN,
            other.type_name()
        ),
    };
    if vectors.is_empty() {
        bail!("Feature column '{}' is empty", FEATURES_COLUMN);
    }
    let dim = vectors[0].len();
    if dim == 0 {
        bail!("Feature vectors have zero dimensions");
    }

    let mut flat = Vec::with_capacity(vectors.len() * dim);
    for (i, vector) in vectors.iter().enumerate() {
        if vector.len() != dim {
            bail!(
                "Row {} has {} features, expected {}",
                i,
                vector.len(),
                dim
            );
        }
        flat.extend_from_slice(vector);
    }
    Array2::from_shape_vec((vectors.len(), dim), flat)
        .context("Failed to build feature matrix")
}

/// Reduces the annotated frame to the write-back shape: exactly
/// `{code, prediction}` with the prediction cast to a 32-bit integer.
pub fn prepare_output(output: &DataFrame) -> Result<DataFrame> {
    output
        .cast_to_i32(PREDICTION_COLUMN)?
        .select(&[CODE_COLUMN, PREDICTION_COLUMN])
}
