// src/preprocess.rs

use anyhow::{bail, Result};
use log::{info, warn};

use crate::config::DataConfig;
use crate::frame::{Column, DataFrame};

/// Shared column names. Both the preprocessing stage and the training
/// routine depend on these; they are deliberately constants rather than
/// configuration.
pub const CODE_COLUMN: &str = "code";
pub const FEATURES_COLUMN: &str = "features";
pub const PREDICTION_COLUMN: &str = "prediction";

/// Turns the raw table into a frame carrying a per-row feature vector
/// under [`FEATURES_COLUMN`].
pub struct Preprocessor {
    config: DataConfig,
}

impl Preprocessor {
    pub fn new(config: DataConfig) -> Self {
        Self { config }
    }

    pub fn preprocess(&self, frame: DataFrame) -> Result<DataFrame> {
        let mut feature_values: Vec<Vec<f64>> = Vec::with_capacity(self.config.feature_columns.len());
        for name in &self.config.feature_columns {
            let column = match frame.column(name) {
                Some(c) => c,
                None => bail!("Feature column '{}' not found in input data", name),
            };
            let values = match column {
                Column::F64(v) => v.clone(),
                Column::I32(v) => v.iter().map(|x| *x as f64).collect(),
                Column::I64(v) => v.iter().map(|x| *x as f64).collect(),
                other => bail!(
                    "Feature column '{}' has non-numeric type {}",
                    name,
                    other.type_name()
                ),
            };
            feature_values.push(values);
        }

        let frame = self.drop_incomplete_rows(frame, &mut feature_values)?;

        if self.config.standardize {
            for (name, values) in self.config.feature_columns.iter().zip(&mut feature_values) {
                standardize(name, values);
            }
        }

        let num_rows = frame.num_rows();
        let mut vectors = Vec::with_capacity(num_rows);
        for row in 0..num_rows {
            vectors.push(feature_values.iter().map(|col| col[row]).collect());
        }

        info!(
            "Assembled '{}' from {:?} ({} rows, standardize={})",
            FEATURES_COLUMN, self.config.feature_columns, num_rows, self.config.standardize
        );
        frame.with_column(FEATURES_COLUMN, Column::Vector(vectors))
    }

    fn drop_incomplete_rows(
        &self,
        frame: DataFrame,
        feature_values: &mut [Vec<f64>],
    ) -> Result<DataFrame> {
        let num_rows = frame.num_rows();
        let mask: Vec<bool> = (0..num_rows)
            .map(|row| feature_values.iter().all(|col| col[row].is_finite()))
            .collect();
        let dropped = mask.iter().filter(|keep| !**keep).count();

        if dropped == 0 {
            return Ok(frame);
        }
        if !self.config.drop_incomplete {
            bail!(
                "{} rows contain missing or non-finite feature values and drop_incomplete is disabled",
                dropped
            );
        }

        warn!("Dropping {} incomplete rows out of {}", dropped, num_rows);
        for col in feature_values.iter_mut() {
            let mut kept = Vec::with_capacity(num_rows - dropped);
            for (value, keep) in col.iter().zip(&mask) {
                if *keep {
                    kept.push(*value);
                }
            }
            *col = kept;
        }
        let frame = frame.filter_rows(&mask)?;
        if frame.num_rows() == 0 {
            bail!("No complete rows remain after dropping incomplete ones");
        }
        Ok(frame)
    }
}

/// Z-score standardization in place. Constant columns are centered only.
fn standardize(name: &str, values: &mut [f64]) {
    if values.is_empty() {
        return;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();
    if std_dev > 0.0 {
        for value in values.iter_mut() {
            *value = (*value - mean) / std_dev;
        }
    } else {
        warn!("Feature column '{}' is constant; centering only", name);
        for value in values.iter_mut() {
            *value -= mean;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_frame() -> DataFrame {
        DataFrame::new()
            .with_column(
                CODE_COLUMN,
                Column::Str(vec!["A".to_string(), "B".to_string(), "C".to_string()]),
            )
            .unwrap()
            .with_column("recency", Column::F64(vec![1.0, 2.0, 3.0]))
            .unwrap()
            .with_column("frequency", Column::I64(vec![10, 20, 30]))
            .unwrap()
    }

    fn data_config(standardize: bool, drop_incomplete: bool) -> DataConfig {
        DataConfig {
            feature_columns: vec!["recency".to_string(), "frequency".to_string()],
            standardize,
            drop_incomplete,
        }
    }

    #[test]
    fn test_assembles_feature_vectors() {
        let preprocessor = Preprocessor::new(data_config(false, true));
        let frame = preprocessor.preprocess(raw_frame()).unwrap();
        match frame.column(FEATURES_COLUMN).unwrap() {
            Column::Vector(v) => {
                assert_eq!(v.len(), 3);
                assert_eq!(v[1], vec![2.0, 20.0]);
            }
            other => panic!("Unexpected column type {}", other.type_name()),
        }
    }

    #[test]
    fn test_standardized_features_are_centered() {
        let preprocessor = Preprocessor::new(data_config(true, true));
        let frame = preprocessor.preprocess(raw_frame()).unwrap();
        match frame.column(FEATURES_COLUMN).unwrap() {
            Column::Vector(v) => {
                for dim in 0..2 {
                    let mean: f64 = v.iter().map(|row| row[dim]).sum::<f64>() / v.len() as f64;
                    assert!(mean.abs() < 1e-9);
                }
            }
            other => panic!("Unexpected column type {}", other.type_name()),
        }
    }

    #[test]
    fn test_drops_incomplete_rows() {
        let frame = raw_frame()
            .with_column("recency", Column::F64(vec![1.0, f64::NAN, 3.0]))
            .unwrap();
        let preprocessor = Preprocessor::new(data_config(false, true));
        let result = preprocessor.preprocess(frame).unwrap();
        assert_eq!(result.num_rows(), 2);
        assert_eq!(
            result.column(CODE_COLUMN).unwrap(),
            &Column::Str(vec!["A".to_string(), "C".to_string()])
        );
    }

    #[test]
    fn test_incomplete_rows_error_when_dropping_disabled() {
        let frame = raw_frame()
            .with_column("recency", Column::F64(vec![1.0, f64::NAN, 3.0]))
            .unwrap();
        let preprocessor = Preprocessor::new(data_config(false, false));
        assert!(preprocessor.preprocess(frame).is_err());
    }

    #[test]
    fn test_missing_feature_column_is_an_error() {
        let mut config = data_config(false, true);
        config.feature_columns.push("monetary".to_string());
        let preprocessor = Preprocessor::new(config);
        assert!(preprocessor.preprocess(raw_frame()).is_err());
    }

    #[test]
    fn test_rejects_text_feature_column() {
        let mut config = data_config(false, true);
        config.feature_columns = vec![CODE_COLUMN.to_string()];
        let preprocessor = Preprocessor::new(config);
        assert!(preprocessor.preprocess(raw_frame()).is_err());
    }
}
