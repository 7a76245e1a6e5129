use chrono::NaiveDate;
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::{Metric, MetricType};

use super::set_trainee_weight;

const METRIC_COLUMNS: &str = "id, trainee_id, recorded_on, metric_type, value, unit, \
     measurement_type, notes, recorded_by";

#[derive(Debug, Clone)]
pub struct NewMetric {
    pub recorded_on: NaiveDate,
    pub metric_type: MetricType,
    pub value: f64,
    pub unit: String,
    pub measurement_type: Option<String>,
    pub notes: Option<String>,
}

#[instrument(skip(pool))]
pub async fn list_metrics(
    pool: &Pool<Sqlite>,
    trainee_id: i64,
    metric_type: Option<MetricType>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<Vec<Metric>, AppError> {
    info!("Listing metrics");
    let metrics = sqlx::query_as::<_, Metric>(&format!(
        "SELECT {} FROM metrics
         WHERE trainee_id = ?
           AND (? IS NULL OR metric_type = ?)
           AND (? IS NULL OR recorded_on >= ?)
           AND (? IS NULL OR recorded_on <= ?)
         ORDER BY recorded_on ASC, id ASC",
        METRIC_COLUMNS
    ))
    .bind(trainee_id)
    .bind(metric_type)
    .bind(metric_type)
    .bind(from)
    .bind(from)
    .bind(to)
    .bind(to)
    .fetch_all(pool)
    .await?;

    Ok(metrics)
}

/// Stores a measurement. The most recent weight reading also becomes
/// the trainee's profile weight.
#[instrument(skip(pool, metric))]
pub async fn record_metric(
    pool: &Pool<Sqlite>,
    trainee_id: i64,
    recorded_by: i64,
    metric: &NewMetric,
) -> Result<Metric, AppError> {
    info!("Recording metric");
    let id = sqlx::query(
        "INSERT INTO metrics
         (trainee_id, recorded_on, metric_type, value, unit, measurement_type, notes, recorded_by)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(trainee_id)
    .bind(metric.recorded_on)
    .bind(metric.metric_type)
    .bind(metric.value)
    .bind(&metric.unit)
    .bind(&metric.measurement_type)
    .bind(&metric.notes)
    .bind(recorded_by)
    .execute(pool)
    .await?
    .last_insert_rowid();

    if metric.metric_type == MetricType::Weight {
        let latest: Option<NaiveDate> = sqlx::query_scalar(
            "SELECT MAX(recorded_on) FROM metrics WHERE trainee_id = ? AND metric_type = 'weight'",
        )
        .bind(trainee_id)
        .fetch_one(pool)
        .await?;

        if latest.is_some_and(|d| d <= metric.recorded_on) {
            set_trainee_weight(pool, trainee_id, metric.value).await?;
        }
    }

    let created = sqlx::query_as::<_, Metric>(&format!(
        "SELECT {} FROM metrics WHERE id = ?",
        METRIC_COLUMNS
    ))
    .bind(id)
    .fetch_one(pool)
    .await?;

    Ok(created)
}
