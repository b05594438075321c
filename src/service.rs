//! Metric service layer
//!
//! Sits between the HTTP handlers and the [`MetricStore`]: validates incoming
//! metrics, folds batches into one bulk update and turns stored values back
//! into wire objects. Write-path errors are always surfaced; the listing view
//! degrades to empty maps instead.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::storage::{MetricSnapshot, MetricStore, StorageError, StorageResult};
use crate::{MetricKind, Metrics};

#[derive(Clone)]
pub struct MetricService {
    store: Arc<dyn MetricStore>,
}

impl MetricService {
    pub fn new(store: Arc<dyn MetricStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn MetricStore> {
        &self.store
    }

    /// Apply one metric and return it populated with the stored value
    #[instrument(skip(self, metric), fields(id = %metric.id, kind = %metric.kind))]
    pub async fn update(&self, metric: Metrics) -> StorageResult<Metrics> {
        validate_id(&metric.id)?;

        match metric.kind {
            MetricKind::Gauge => {
                let value = metric.value.ok_or_else(|| {
                    StorageError::Validation(format!("gauge {} has no value", metric.id))
                })?;
                validate_gauge(&metric.id, value)?;
                let stored = self.store.set_gauge(&metric.id, value).await?;
                Ok(Metrics::gauge(metric.id, stored))
            }
            MetricKind::Counter => {
                let delta = metric.delta.ok_or_else(|| {
                    StorageError::Validation(format!("counter {} has no delta", metric.id))
                })?;
                let total = self.store.set_counter(&metric.id, delta).await?;
                Ok(Metrics::counter(metric.id, total))
            }
        }
    }

    /// Parse and apply a metric given as path segments (`/update/{type}/{name}/{value}`)
    pub async fn update_raw(&self, kind: &str, name: &str, value: &str) -> StorageResult<Metrics> {
        let kind: MetricKind = kind.parse().map_err(StorageError::Validation)?;

        let metric = match kind {
            MetricKind::Gauge => {
                let value = value.parse::<f64>().map_err(|_| {
                    StorageError::Validation(format!("invalid gauge value: {value}"))
                })?;
                Metrics::gauge(name, value)
            }
            MetricKind::Counter => {
                let delta = value.parse::<i64>().map_err(|_| {
                    StorageError::Validation(format!("invalid counter delta: {value}"))
                })?;
                Metrics::counter(name, delta)
            }
        };

        self.update(metric).await
    }

    /// Apply a batch as one bulk update
    ///
    /// Counters repeated within the batch are summed and repeated gauges keep
    /// their last value. Nothing is applied if any metric is invalid.
    #[instrument(skip_all, fields(size = metrics.len()))]
    pub async fn update_batch(&self, metrics: Vec<Metrics>) -> StorageResult<()> {
        let mut counters: HashMap<String, i64> = HashMap::new();
        let mut gauges: HashMap<String, f64> = HashMap::new();

        for metric in metrics {
            validate_id(&metric.id)?;

            match (metric.kind, metric.delta, metric.value) {
                (MetricKind::Counter, Some(delta), _) => {
                    if delta < 0 {
                        return Err(StorageError::Validation(format!(
                            "counter {} cannot be decremented (delta {delta})",
                            metric.id
                        )));
                    }
                    let entry = counters.entry(metric.id).or_default();
                    *entry = entry.checked_add(delta).ok_or_else(|| {
                        StorageError::Validation("counter overflowed within batch".to_string())
                    })?;
                }
                (MetricKind::Gauge, _, Some(value)) => {
                    validate_gauge(&metric.id, value)?;
                    gauges.insert(metric.id, value);
                }
                (MetricKind::Counter, None, _) => {
                    return Err(StorageError::Validation(format!(
                        "counter {} has no delta",
                        metric.id
                    )));
                }
                (MetricKind::Gauge, _, None) => {
                    return Err(StorageError::Validation(format!(
                        "gauge {} has no value",
                        metric.id
                    )));
                }
            }
        }

        debug!(
            "applying batch of {} counters and {} gauges",
            counters.len(),
            gauges.len()
        );
        self.store.update_counters_and_gauges(&counters, &gauges).await
    }

    /// Stored value of `id`, as a wire object
    pub async fn value(&self, id: &str, kind: MetricKind) -> StorageResult<Metrics> {
        match kind {
            MetricKind::Gauge => Ok(Metrics::gauge(id, self.store.get_gauge(id).await?)),
            MetricKind::Counter => Ok(Metrics::counter(id, self.store.get_counter(id).await?)),
        }
    }

    /// Everything stored, or empty maps when the store cannot be read
    pub async fn listing(&self) -> MetricSnapshot {
        let gauges = self.store.gauges().await.unwrap_or_else(|e| {
            warn!("failed to list gauges: {}", e);
            HashMap::new()
        });
        let counters = self.store.counters().await.unwrap_or_else(|e| {
            warn!("failed to list counters: {}", e);
            HashMap::new()
        });

        MetricSnapshot { gauges, counters }
    }
}

fn validate_id(id: &str) -> StorageResult<()> {
    if id.trim().is_empty() {
        return Err(StorageError::Validation("metric id is empty".to_string()));
    }
    Ok(())
}

/// NaN and infinities cannot be persisted as JSON numbers or SQL REALs
fn validate_gauge(id: &str, value: f64) -> StorageResult<()> {
    if !value.is_finite() {
        return Err(StorageError::Validation(format!(
            "gauge {id} has non-finite value {value}"
        )));
    }
    Ok(())
}
