// src/frame.rs
//
// A small column-oriented table standing in for the engine-side dataset.
// Only the operations the training pipeline needs are implemented:
// column replacement, projection, integer casts, row filtering and a
// printable rendering of the first rows.

use anyhow::{bail, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Str(Vec<String>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F64(Vec<f64>),
    /// A per-row numeric vector, the assembled feature representation.
    Vector(Vec<Vec<f64>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Str(v) => v.len(),
            Column::I32(v) => v.len(),
            Column::I64(v) => v.len(),
            Column::F64(v) => v.len(),
            Column::Vector(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Column::Str(_) => "string",
            Column::I32(_) => "int32",
            Column::I64(_) => "int64",
            Column::F64(_) => "float64",
            Column::Vector(_) => "vector",
        }
    }

    fn value_to_string(&self, row: usize) -> String {
        match self {
            Column::Str(v) => v[row].clone(),
            Column::I32(v) => v[row].to_string(),
            Column::I64(v) => v[row].to_string(),
            Column::F64(v) => format!("{:.4}", v[row]),
            Column::Vector(v) => {
                let parts: Vec<String> = v[row].iter().map(|x| format!("{:.4}", x)).collect();
                format!("[{}]", parts.join(", "))
            }
        }
    }

    fn filtered(&self, mask: &[bool]) -> Column {
        fn keep<T: Clone>(values: &[T], mask: &[bool]) -> Vec<T> {
            values
                .iter()
                .zip(mask)
                .filter(|(_, keep)| **keep)
                .map(|(v, _)| v.clone())
                .collect()
        }
        match self {
            Column::Str(v) => Column::Str(keep(v, mask)),
            Column::I32(v) => Column::I32(keep(v, mask)),
            Column::I64(v) => Column::I64(keep(v, mask)),
            Column::F64(v) => Column::F64(keep(v, mask)),
            Column::Vector(v) => Column::Vector(keep(v, mask)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataFrame {
    columns: Vec<(String, Column)>,
}

impl DataFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map(|(_, c)| c.len()).unwrap_or(0)
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
    }

    /// Adds a column, replacing any existing column of the same name.
    /// The column must match the frame's row count unless the frame is empty.
    pub fn with_column(mut self, name: &str, column: Column) -> Result<Self> {
        if !self.columns.is_empty() && column.len() != self.num_rows() {
            bail!(
                "Column '{}' has {} rows, expected {}",
                name,
                column.len(),
                self.num_rows()
            );
        }
        if let Some(slot) = self.columns.iter_mut().find(|(n, _)| n == name) {
            slot.1 = column;
        } else {
            self.columns.push((name.to_string(), column));
        }
        Ok(self)
    }

    /// Projects the frame down to the named columns, in the given order.
    pub fn select(&self, names: &[&str]) -> Result<DataFrame> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            match self.column(name) {
                Some(column) => columns.push((name.to_string(), column.clone())),
                None => bail!("Unknown column '{}' in select", name),
            }
        }
        Ok(DataFrame { columns })
    }

    /// Casts a numeric column to 32-bit integers. Float values are
    /// truncated toward zero; out-of-range values are an error.
    pub fn cast_to_i32(&self, name: &str) -> Result<DataFrame> {
        let column = match self.column(name) {
            Some(c) => c,
            None => bail!("Unknown column '{}' in cast", name),
        };
        let cast = match column {
            Column::I32(v) => Column::I32(v.clone()),
            Column::I64(v) => {
                let mut out = Vec::with_capacity(v.len());
                for value in v {
                    out.push(i32::try_from(*value).map_err(|_| {
                        anyhow::anyhow!("Value {} in '{}' does not fit in i32", value, name)
                    })?);
                }
                Column::I32(out)
            }
            Column::F64(v) => {
                let mut out = Vec::with_capacity(v.len());
                for value in v {
                    let truncated = value.trunc();
                    if !truncated.is_finite()
                        || truncated < i32::MIN as f64
                        || truncated > i32::MAX as f64
                    {
                        bail!("Value {} in '{}' does not fit in i32", value, name);
                    }
                    out.push(truncated as i32);
                }
                Column::I32(out)
            }
            other => bail!(
                "Cannot cast column '{}' of type {} to int32",
                name,
                other.type_name()
            ),
        };
        let mut frame = self.clone();
        frame = frame.with_column(name, cast)?;
        Ok(frame)
    }

    /// Keeps only the rows where the mask is true.
    pub fn filter_rows(&self, mask: &[bool]) -> Result<DataFrame> {
        if mask.len() != self.num_rows() {
            bail!(
                "Filter mask has {} entries, expected {}",
                mask.len(),
                self.num_rows()
            );
        }
        let columns = self
            .columns
            .iter()
            .map(|(name, column)| (name.clone(), column.filtered(mask)))
            .collect();
        Ok(DataFrame { columns })
    }

    /// Prints the first `limit` rows to standard output.
    pub fn show(&self, limit: usize) {
        println!("{}", self.render(limit));
    }

    /// Renders the first `limit` rows as a bordered text table.
    pub fn render(&self, limit: usize) -> String {
        if self.columns.is_empty() {
            return "(empty frame)".to_string();
        }
        let shown = self.num_rows().min(limit);
        let mut cells: Vec<Vec<String>> = Vec::with_capacity(shown + 1);
        cells.push(self.column_names().iter().map(|s| s.to_string()).collect());
        for row in 0..shown {
            cells.push(
                self.columns
                    .iter()
                    .map(|(_, c)| c.value_to_string(row))
                    .collect(),
            );
        }

        let widths: Vec<usize> = (0..self.columns.len())
            .map(|col| cells.iter().map(|row| row[col].len()).max().unwrap_or(0))
            .collect();
        let border = format!(
            "+{}+",
            widths
                .iter()
                .map(|w| "-".repeat(*w))
                .collect::<Vec<_>>()
                .join("+")
        );

        let mut out = String::new();
        out.push_str(&border);
        out.push('\n');
        for (i, row) in cells.iter().enumerate() {
            let line: Vec<String> = row
                .iter()
                .zip(&widths)
                .map(|(value, width)| format!("{:>width$}", value, width = *width))
                .collect();
            out.push_str(&format!("|{}|\n", line.join("|")));
            if i == 0 {
                out.push_str(&border);
                out.push('\n');
            }
        }
        out.push_str(&border);
        if shown < self.num_rows() {
            out.push_str(&format!("\nonly showing top {} rows", shown));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> DataFrame {
        DataFrame::new()
            .with_column(
                "code",
                Column::Str(vec!["A1".to_string(), "B2".to_string(), "C3".to_string()]),
            )
            .unwrap()
            .with_column("score", Column::F64(vec![1.2, 3.9, -0.5]))
            .unwrap()
    }

    #[test]
    fn test_with_column_replaces_existing() {
        let frame = sample_frame()
            .with_column("score", Column::I64(vec![1, 2, 3]))
            .unwrap();
        assert_eq!(frame.num_columns(), 2);
        assert_eq!(frame.column("score").unwrap().type_name(), "int64");
    }

    #[test]
    fn test_with_column_rejects_row_mismatch() {
        let result = sample_frame().with_column("extra", Column::I64(vec![1]));
        assert!(result.is_err());
    }

    #[test]
    fn test_select_projects_in_order() {
        let frame = sample_frame().select(&["score", "code"]).unwrap();
        assert_eq!(frame.column_names(), vec!["score", "code"]);
        assert_eq!(frame.num_rows(), 3);
        assert!(sample_frame().select(&["missing"]).is_err());
    }

    #[test]
    fn test_cast_truncates_floats() {
        let frame = sample_frame().cast_to_i32("score").unwrap();
        assert_eq!(
            frame.column("score").unwrap(),
            &Column::I32(vec![1, 3, 0])
        );
    }

    #[test]
    fn test_cast_rejects_strings() {
        assert!(sample_frame().cast_to_i32("code").is_err());
    }

    #[test]
    fn test_filter_rows() {
        let frame = sample_frame()
            .filter_rows(&[true, false, true])
            .unwrap();
        assert_eq!(frame.num_rows(), 2);
        assert_eq!(
            frame.column("code").unwrap(),
            &Column::Str(vec!["A1".to_string(), "C3".to_string()])
        );
    }

    #[test]
    fn test_render_contains_headers_and_values() {
        let rendered = sample_frame().render(2);
        assert!(rendered.contains("code"));
        assert!(rendered.contains("A1"));
        assert!(rendered.contains("only showing top 2 rows"));
    }
}
