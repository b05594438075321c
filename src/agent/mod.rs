//! Metric collection agent
//!
//! Two periodic tasks share one [`PollState`](poller::PollState):
//!
//! - the **poller** samples the system every poll interval,
//! - the **reporter** hands a snapshot to its delivery workers every report
//!   interval.
//!
//! [`Agent`] owns both tasks. Cancelling its token stops the poller, then
//! the reporter flushes a final report and [`Agent::join`] waits until every
//! worker is done.

pub mod dispatcher;
pub mod poller;
pub mod reporter;
pub mod sampler;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub use dispatcher::{DeliveryMode, DispatchError, Dispatcher};
pub use poller::{PollState, SharedPollState};
pub use sampler::Sampler;

/// Timing and concurrency of an [`Agent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentOptions {
    pub poll_interval: Duration,
    pub report_interval: Duration,
    /// Number of delivery workers, also the queue capacity
    pub rate_limit: usize,
}

/// Supervisor of the poll and report tasks
///
/// Shutdown is ordered: once the agent's token fires the poller is stopped
/// and joined first, and only then is the reporter told to take its final
/// snapshot.
pub struct Agent {
    state: SharedPollState,
    shutdown: JoinHandle<()>,
    reporter: JoinHandle<()>,
}

impl Agent {
    pub fn spawn(options: AgentOptions, dispatcher: Dispatcher, cancel: CancellationToken) -> Self {
        info!(
            "starting agent: poll every {}s, report every {}s, {} worker(s), {:?} delivery",
            options.poll_interval.as_secs_f32(),
            options.report_interval.as_secs_f32(),
            options.rate_limit,
            dispatcher.mode()
        );

        let state = SharedPollState::default();
        let stop_polling = CancellationToken::new();
        let stop_reporting = CancellationToken::new();

        let poller = tokio::spawn(poller::run_poller(
            Sampler::new(),
            state.clone(),
            options.poll_interval,
            stop_polling.clone(),
        ));

        let reporter = tokio::spawn(reporter::run_reporter(
            state.clone(),
            Arc::new(dispatcher),
            options.report_interval,
            options.rate_limit,
            stop_reporting.clone(),
        ));

        let shutdown = tokio::spawn(async move {
            cancel.cancelled().await;
            debug!("stopping poller");
            stop_polling.cancel();
            if let Err(e) = poller.await {
                error!("poller task failed: {e}");
            }
            stop_reporting.cancel();
        });

        Self {
            state,
            shutdown,
            reporter,
        }
    }

    pub fn state(&self) -> &SharedPollState {
        &self.state
    }

    /// Wait for both tasks; returns once the token was cancelled and the
    /// final report has been handled
    pub async fn join(self) {
        if let Err(e) = self.shutdown.await {
            error!("agent shutdown failed: {e}");
        }
        if let Err(e) = self.reporter.await {
            error!("reporter task failed: {e}");
        }
        info!("agent stopped");
    }
}
