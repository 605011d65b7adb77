// src/db.rs

use anyhow::{bail, Context, Result};
use bb8::Pool;
use bb8_postgres::PostgresConnectionManager;
use log::{debug, info};
use postgres_types::ToSql;
use std::time::Duration;
use tokio_postgres::types::Type;
use tokio_postgres::{NoTls, Row as PgRow};

use crate::config::DbConfig;
use crate::frame::{Column, DataFrame};
use crate::session::ComputeSession;

pub type PgPool = Pool<PostgresConnectionManager<NoTls>>;

/// Rows inserted per INSERT statement during write-back.
const WRITE_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Add rows to the destination table, leaving existing rows untouched.
    Append,
    /// Clear the destination table, then insert.
    Overwrite,
}

fn build_pg_config(config: &DbConfig, app_name: &str) -> tokio_postgres::Config {
    let mut pg_config = tokio_postgres::Config::new();
    info!(
        "DB Config: Host={}, Port={}, DB={}, User={}",
        config.host, config.port, config.dbname, config.user
    );
    pg_config
        .host(&config.host)
        .port(config.port)
        .dbname(&config.dbname)
        .user(&config.user)
        .password(&config.password);
    pg_config.application_name(app_name);
    pg_config.connect_timeout(Duration::from_secs(10));
    pg_config
}

/// Initializes the database connection pool and verifies it with a
/// test query.
pub async fn connect(config: &DbConfig, app_name: &str) -> Result<PgPool> {
    let pg_config = build_pg_config(config, app_name);
    info!("Connecting to PostgreSQL database...");
    let manager = PostgresConnectionManager::new(pg_config, NoTls);

    let pool = Pool::builder()
        .max_size(config.pool_size)
        .connection_timeout(Duration::from_secs(15))
        .build(manager)
        .await
        .context("Failed to build database connection pool")?;

    let conn = pool
        .get()
        .await
        .context("Failed to get test connection from pool")?;
    conn.query_one("SELECT 1", &[])
        .await
        .context("Test query 'SELECT 1' failed")?;
    info!("Database connection pool initialized successfully.");
    Ok(pool.clone())
}

/// Reads the input table and writes predictions back through the
/// session's connection pool.
pub struct DatabaseManager {
    config: DbConfig,
}

impl DatabaseManager {
    pub fn new(config: DbConfig) -> Self {
        Self { config }
    }

    /// Loads the full input table into a frame. Column types are mapped
    /// from the PostgreSQL schema; NULL numeric values become NaN so the
    /// preprocessing stage can decide what to do with incomplete rows.
    pub async fn read_data(&self, session: &ComputeSession) -> Result<DataFrame> {
        let conn = session
            .pool()
            .get()
            .await
            .context("Failed to get DB connection for read_data")?;

        let query = format!("SELECT * FROM {}", self.config.input_table);
        let rows = conn
            .query(&query, &[])
            .await
            .with_context(|| format!("Failed to read from table {}", self.config.input_table))?;

        if rows.is_empty() {
            bail!("Input table {} returned no rows", self.config.input_table);
        }
        let frame = frame_from_rows(&rows)?;
        info!(
            "Read {} rows x {} columns from {}",
            frame.num_rows(),
            frame.num_columns(),
            self.config.input_table
        );
        Ok(frame)
    }

    /// Writes a frame into the output table. Append mode only adds rows;
    /// overwrite clears the table first inside the same transaction.
    pub async fn write_data(
        &self,
        session: &ComputeSession,
        frame: &DataFrame,
        mode: WriteMode,
    ) -> Result<u64> {
        if frame.num_columns() == 0 || frame.num_rows() == 0 {
            bail!("Refusing to write an empty frame to {}", self.config.output_table);
        }
        let column_names = frame.column_names();

        let mut conn = session
            .pool()
            .get()
            .await
            .context("Failed to get DB connection for write_data")?;
        let tx = conn
            .transaction()
            .await
            .context("Failed to start write_data transaction")?;

        if mode == WriteMode::Overwrite {
            let deleted = tx
                .execute(&format!("DELETE FROM {}", self.config.output_table), &[])
                .await
                .with_context(|| format!("Failed to clear table {}", self.config.output_table))?;
            debug!(
                "Cleared {} existing rows from {}",
                deleted, self.config.output_table
            );
        }

        let mut written = 0u64;
        let total_rows = frame.num_rows();
        let mut start = 0;
        while start < total_rows {
            let end = (start + WRITE_BATCH_SIZE).min(total_rows);
            let sql = build_insert_sql(&self.config.output_table, &column_names, end - start);

            let mut params: Vec<&(dyn ToSql + Sync)> =
                Vec::with_capacity((end - start) * column_names.len());
            for row in start..end {
                for name in &column_names {
                    // select() guarantees the column exists
                    let column = frame.column(name).context("Column disappeared mid-write")?;
                    push_param(column, row, &mut params)?;
                }
            }

            written += tx
                .execute(&sql, &params[..])
                .await
                .with_context(|| format!("Failed to insert batch into {}", self.config.output_table))?;
            start = end;
        }

        tx.commit()
            .await
            .context("Failed to commit write_data transaction")?;
        info!(
            "Wrote {} rows into {} (mode: {:?})",
            written, self.config.output_table, mode
        );
        Ok(written)
    }
}

fn push_param<'a>(
    column: &'a Column,
    row: usize,
    params: &mut Vec<&'a (dyn ToSql + Sync)>,
) -> Result<()> {
    match column {
        Column::Str(v) => params.push(&v[row]),
        Column::I32(v) => params.push(&v[row]),
        Column::I64(v) => params.push(&v[row]),
        Column::F64(v) => params.push(&v[row]),
        Column::Vector(_) => bail!("Vector columns cannot be written back to the database"),
    }
    Ok(())
}

/// Builds a multi-row INSERT statement with numbered placeholders.
pub fn build_insert_sql(table: &str, columns: &[&str], row_count: usize) -> String {
    let mut query = format!("INSERT INTO {} ({}) VALUES ", table, columns.join(", "));

    let mut param_groups = Vec::with_capacity(row_count);
    for i in 0..row_count {
        let base_idx = i * columns.len();
        let placeholders: Vec<String> = (1..=columns.len())
            .map(|j| format!("${}", base_idx + j))
            .collect();
        param_groups.push(format!("({})", placeholders.join(", ")));
    }

    query.push_str(&param_groups.join(", "));
    query
}

fn frame_from_rows(rows: &[PgRow]) -> Result<DataFrame> {
    let mut frame = DataFrame::new();
    for (idx, col) in rows[0].columns().iter().enumerate() {
        let name = col.name().to_string();
        let ty = col.type_();
        let column = if *ty == Type::FLOAT8 {
            Column::F64(collect_f64(rows, idx, |row, i| {
                row.try_get::<_, Option<f64>>(i)
            })?)
        } else if *ty == Type::FLOAT4 {
            Column::F64(collect_f64(rows, idx, |row, i| {
                Ok(row.try_get::<_, Option<f32>>(i)?.map(f64::from))
            })?)
        } else if *ty == Type::INT2 {
            Column::I64(collect_i64(rows, idx, &name, |row, i| {
                Ok(row.try_get::<_, Option<i16>>(i)?.map(i64::from))
            })?)
        } else if *ty == Type::INT4 {
            Column::I64(collect_i64(rows, idx, &name, |row, i| {
                Ok(row.try_get::<_, Option<i32>>(i)?.map(i64::from))
            })?)
        } else if *ty == Type::INT8 {
            Column::I64(collect_i64(rows, idx, &name, |row, i| {
                row.try_get::<_, Option<i64>>(i)
            })?)
        } else if *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR {
            let mut values = Vec::with_capacity(rows.len());
            for row in rows {
                let value: Option<String> = row
                    .try_get(idx)
                    .with_context(|| format!("Failed to decode text column '{}'", name))?;
                match value {
                    Some(v) => values.push(v),
                    None => bail!("NULL value in text column '{}'", name),
                }
            }
            Column::Str(values)
        } else {
            bail!(
                "Unsupported column type {} for column '{}'",
                ty.name(),
                name
            );
        };
        frame = frame.with_column(&name, column)?;
    }
    Ok(frame)
}

fn collect_f64(
    rows: &[PgRow],
    idx: usize,
    get: impl Fn(&PgRow, usize) -> Result<Option<f64>, tokio_postgres::Error>,
) -> Result<Vec<f64>> {
    let mut values = Vec::with_capacity(rows.len());
    for row in rows {
        let value = get(row, idx).context("Failed to decode float column")?;
        values.push(value.unwrap_or(f64::NAN));
    }
    Ok(values)
}

fn collect_i64(
    rows: &[PgRow],
    idx: usize,
    name: &str,
    get: impl Fn(&PgRow, usize) -> Result<Option<i64>, tokio_postgres::Error>,
) -> Result<Vec<i64>> {
    let mut values = Vec::with_capacity(rows.len());
    for row in rows {
        let value = get(row, idx)
            .with_context(|| format!("Failed to decode integer column '{}'", name))?;
        match value {
            Some(v) => values.push(v),
            None => bail!("NULL value in integer column '{}'", name),
        }
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_insert_sql_single_row() {
        let sql = build_insert_sql("public.customer_segments", &["code", "prediction"], 1);
        assert_eq!(
            sql,
            "INSERT INTO public.customer_segments (code, prediction) VALUES ($1, $2)"
        );
    }

    #[test]
    fn test_build_insert_sql_multiple_rows() {
        let sql = build_insert_sql("segments", &["code", "prediction"], 3);
        assert_eq!(
            sql,
            "INSERT INTO segments (code, prediction) VALUES ($1, $2), ($3, $4), ($5, $6)"
        );
    }

    #[tokio::test]
    async fn test_pool_handles_are_clones_of_one_pool() {
        let mut config = tokio_postgres::Config::new();
        config.host("localhost").dbname("unused").user("unused");
        let manager = PostgresConnectionManager::new(config, NoTls);
        let pool: PgPool = Pool::builder().build_unchecked(manager);

        // connect() hands out a clone of the pool it verified with.
        let handle = pool.clone();
        assert_eq!(handle.state().connections, pool.state().connections);
        assert_eq!(handle.state().idle_connections, 0);
    }

    #[test]
    fn test_push_param_rejects_vectors() {
        let column = Column::Vector(vec![vec![1.0, 2.0]]);
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();
        assert!(push_param(&column, 0, &mut params).is_err());
    }
}
