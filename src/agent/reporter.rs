//! Report timer and delivery workers
//!
//! Each report tick takes the current [`PollState`](super::poller::PollState)
//! snapshot and pushes it into a bounded queue whose capacity equals the
//! number of workers. When every worker is busy and the queue is full the
//! timer blocks, which is the agent's backpressure.
//!
//! On cancellation the timer enqueues one final snapshot, closes the queue
//! and waits for the workers to drain it. The caller must have stopped the
//! poller by then, otherwise a late poll misses the final snapshot.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use super::dispatcher::Dispatcher;
use super::poller::SharedPollState;
use crate::Metrics;

type Job = Vec<Metrics>;

#[instrument(skip_all, fields(workers = workers))]
pub async fn run_reporter(
    state: SharedPollState,
    dispatcher: Arc<Dispatcher>,
    interval: Duration,
    workers: usize,
    cancel: CancellationToken,
) {
    let workers = workers.max(1);
    let (tx, rx) = mpsc::channel::<Job>(workers);
    let rx = Arc::new(Mutex::new(rx));

    let handles: Vec<JoinHandle<()>> = (0..workers)
        .map(|id| tokio::spawn(run_worker(id, rx.clone(), dispatcher.clone())))
        .collect();

    let mut ticker = interval_at(Instant::now() + interval, interval);
    let mut pending: Vec<Job> = Vec::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let job = state.lock().await.take_report();
                if job.is_empty() {
                    continue;
                }

                trace!("enqueueing report of {} metrics", job.len());
                // reserve first so the job stays ours until a slot is free
                tokio::select! {
                    _ = cancel.cancelled() => {
                        pending.push(job);
                        break;
                    }
                    permit = tx.reserve() => match permit {
                        Ok(permit) => permit.send(job),
                        Err(_) => {
                            warn!("delivery queue closed");
                            break;
                        }
                    }
                }
            }
        }
    }

    let last = state.lock().await.take_report();
    if !last.is_empty() {
        pending.push(last);
    }

    info!("flushing {} final report(s)", pending.len());
    for job in pending {
        if tx.send(job).await.is_err() {
            warn!("delivery queue closed before final report");
        }
    }
    drop(tx);

    for result in join_all(handles).await {
        if let Err(e) = result {
            error!("delivery worker failed: {e}");
        }
    }

    debug!("reporter stopped");
}

async fn run_worker(id: usize, queue: Arc<Mutex<mpsc::Receiver<Job>>>, dispatcher: Arc<Dispatcher>) {
    loop {
        let job = queue.lock().await.recv().await;
        let Some(job) = job else {
            break;
        };

        if let Err(e) = dispatcher.deliver(&job).await {
            error!("worker {id}: failed to deliver {} metrics: {e}", job.len());
        }
    }

    trace!("worker {id} stopped");
}
