use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{broadcast, Notify},
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};

use crate::{metrics, types::LedgerRequest};

use super::{
    errors::PoolError,
    queue::{Job, RequestQueue},
    session::{Session, SessionLease},
};

/// Default cadence of dispatch passes when nothing wakes the dispatcher earlier.
pub const DEFAULT_DISPATCH_INTERVAL: Duration = Duration::from_millis(100);

/// Preference step between consecutive sessions in configuration order.
const ORDINAL_PENALTY: f64 = 0.001;

/// A session's offer to run a job during one dispatch pass.
///
/// Eligibility is explicit so that a zero score is never mistaken for "no offer".
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bid {
    Ineligible,
    Eligible(f64),
}

impl Bid {
    #[must_use]
    pub fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible(_))
    }

    #[must_use]
    pub fn score(&self) -> Option<f64> {
        match self {
            Self::Eligible(score) => Some(*score),
            Self::Ineligible => None,
        }
    }
}

/// Computes `session`'s bid for `request` right now.
///
/// Disconnected or busy sessions, sessions whose node does not allow the command, and
/// sessions whose coverage misses a pinned ledger do not bid. Everyone else bids the
/// same base score minus a small penalty per ordinal, so earlier-configured sessions
/// win ties.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn bid(session: &Session, request: &LedgerRequest) -> Bid {
    if !session.is_connected() || session.is_busy() || !session.supports(&request.command) {
        return Bid::Ineligible;
    }

    if let Some(ledger_index) = request.ledger_index() {
        if !session.covers(ledger_index) {
            return Bid::Ineligible;
        }
    }

    Bid::Eligible(1.0 - session.ordinal() as f64 * ORDINAL_PENALTY)
}

/// Returns whether any session could serve `request` once connected and idle.
///
/// Connectivity and load are ignored; only the allow-list and the current coverage
/// sets matter.
#[must_use]
pub fn is_admissible(sessions: &[Arc<Session>], request: &LedgerRequest) -> bool {
    let ledger_index = request.ledger_index();

    sessions.iter().any(|session| {
        session.supports(&request.command)
            && ledger_index.map_or(true, |index| session.covers(index))
    })
}

/// Picks the highest bidding session and leases it.
fn select(sessions: &[Arc<Session>], request: &LedgerRequest) -> Option<SessionLease> {
    let mut best: Option<(&Arc<Session>, f64)> = None;

    for session in sessions {
        if let Bid::Eligible(score) = bid(session, request) {
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((session, score));
            }
        }
    }

    best.and_then(|(session, _)| session.try_lease())
}

/// Assigns queued jobs to idle sessions.
///
/// Each pass walks the queue in priority order and lets every job re-bid across all
/// sessions. A job with no eligible bidder stays queued for the next pass; a job with a
/// winner leaves the queue and runs on that session in its own task. The pass holds the
/// queue lock only while assigning and never across an await.
pub struct Dispatcher {
    sessions: Arc<Vec<Arc<Session>>>,
    queue: Arc<Mutex<RequestQueue>>,
    wake: Arc<Notify>,
    interval: Duration,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        sessions: Arc<Vec<Arc<Session>>>,
        queue: Arc<Mutex<RequestQueue>>,
        wake: Arc<Notify>,
        interval: Duration,
    ) -> Self {
        Self { sessions, queue, wake, interval }
    }

    /// Runs dispatch passes on every tick and whenever woken, until shutdown.
    #[must_use]
    pub fn start_with_shutdown(self, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    () = self.wake.notified() => {}
                    _ = shutdown_rx.recv() => {
                        tracing::info!("dispatcher shutting down");
                        break;
                    }
                }

                self.dispatch_pass();
            }
        })
    }

    /// Runs one scheduling pass. Returns how many jobs were dispatched.
    pub fn dispatch_pass(&self) -> usize {
        let assignments = {
            let mut queue = self.queue.lock();

            let abandoned = queue.prune_abandoned();
            if abandoned > 0 {
                tracing::debug!(count = abandoned, "dropped jobs whose callers went away");
            }

            let assignments = queue.take_assigned(|job| select(&self.sessions, job.request()));
            metrics::record_queue_depth(queue.len());
            assignments
        };

        let dispatched = assignments.len();
        for (job, lease) in assignments {
            tokio::spawn(run_job(job, lease, self.wake.clone()));
        }
        dispatched
    }
}

async fn run_job(job: Job, lease: SessionLease, wake: Arc<Notify>) {
    let session = lease.session().clone();

    tracing::debug!(
        job = job.id(),
        command = %job.request().command,
        priority = job.priority(),
        node = %session.url(),
        session = session.ordinal(),
        waited_ms = job.waited().as_millis(),
        "dispatching request"
    );

    let outcome = session.execute(job.request()).await.map_err(PoolError::from);

    if let Err(e) = &outcome {
        tracing::warn!(
            job = job.id(),
            node = %session.url(),
            session = session.ordinal(),
            error = %e,
            "request failed on session"
        );
    }

    drop(lease);
    wake.notify_one();

    let id = job.id();
    if !job.resolve(outcome) {
        tracing::debug!(job = id, "caller went away before the result arrived");
    }
}
