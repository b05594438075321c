//! Poll timer
//!
//! Refreshes the shared [`PollState`] on every tick: the latest gauges
//! replace the previous ones and `PollCount` goes up by one.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

use super::sampler::Sampler;
use crate::Metrics;

pub const POLL_COUNT: &str = "PollCount";

/// Latest sample plus the number of polls since the last report
#[derive(Debug, Default)]
pub struct PollState {
    gauges: BTreeMap<String, f64>,
    poll_count: i64,
}

pub type SharedPollState = Arc<Mutex<PollState>>;

impl PollState {
    pub fn record(&mut self, gauges: BTreeMap<String, f64>) {
        self.gauges = gauges;
        self.poll_count += 1;
    }

    pub fn poll_count(&self) -> i64 {
        self.poll_count
    }

    /// Metrics for one report; resets the poll counter
    ///
    /// Empty when nothing has been polled yet.
    pub fn take_report(&mut self) -> Vec<Metrics> {
        if self.gauges.is_empty() && self.poll_count == 0 {
            return Vec::new();
        }

        let mut metrics: Vec<Metrics> = self
            .gauges
            .iter()
            .map(|(name, value)| Metrics::gauge(name.clone(), *value))
            .collect();
        metrics.push(Metrics::counter(POLL_COUNT, self.poll_count));

        self.poll_count = 0;
        metrics
    }
}

#[instrument(skip_all)]
pub async fn run_poller(
    mut sampler: Sampler,
    state: SharedPollState,
    interval: Duration,
    cancel: CancellationToken,
) {
    debug!("polling every {}s", interval.as_secs_f32());
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let gauges = sampler.sample();
                trace!("sampled {} gauges", gauges.len());
                state.lock().await.record(gauges);
            }
        }
    }

    debug!("poller stopped");
}
