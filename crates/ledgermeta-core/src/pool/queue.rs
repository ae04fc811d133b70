use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

use crate::types::LedgerRequest;

use super::errors::PoolError;

/// Default time a request may wait in the queue before it is rejected.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) type Reply = oneshot::Sender<Result<Value, PoolError>>;

/// One request waiting for, or running on, a session.
///
/// The reply channel guarantees the caller observes exactly one outcome.
#[derive(Debug)]
pub struct Job {
    id: u64,
    request: LedgerRequest,
    priority: i32,
    enqueued_at: Instant,
    reply: Reply,
}

impl Job {
    pub(crate) fn new(id: u64, request: LedgerRequest, priority: i32, reply: Reply) -> Self {
        Self { id, request, priority, enqueued_at: Instant::now(), reply }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn request(&self) -> &LedgerRequest {
        &self.request
    }

    #[must_use]
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// How long the job has been waiting since it was enqueued.
    #[must_use]
    pub fn waited(&self) -> Duration {
        self.enqueued_at.elapsed()
    }

    /// Returns `true` once the caller stopped waiting for the outcome.
    #[must_use]
    pub fn is_abandoned(&self) -> bool {
        self.reply.is_closed()
    }

    /// Delivers the outcome to the caller. Returns `false` if nobody is waiting anymore.
    pub fn resolve(self, outcome: Result<Value, PoolError>) -> bool {
        self.reply.send(outcome).is_ok()
    }
}

/// Pending jobs ordered by descending priority, arrival order within a priority.
#[derive(Debug, Default)]
pub struct RequestQueue {
    jobs: Vec<Job>,
}

impl RequestQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a job behind every queued job of equal or higher priority.
    pub fn push(&mut self, job: Job) {
        let position = self.jobs.partition_point(|queued| queued.priority >= job.priority);
        self.jobs.insert(position, job);
    }

    /// Removes a job by id. Returns `None` if it is no longer queued.
    pub fn remove(&mut self, id: u64) -> Option<Job> {
        let position = self.jobs.iter().position(|job| job.id == id)?;
        Some(self.jobs.remove(position))
    }

    #[must_use]
    pub fn contains(&self, id: u64) -> bool {
        self.jobs.iter().any(|job| job.id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Iterates jobs in dispatch order.
    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    /// Walks the queue in order and removes every job `pick` assigns, keeping the
    /// relative order of the jobs left behind.
    pub fn take_assigned<T, F>(&mut self, mut pick: F) -> Vec<(Job, T)>
    where
        F: FnMut(&Job) -> Option<T>,
    {
        let mut assigned = Vec::new();
        let mut remaining = Vec::with_capacity(self.jobs.len());

        for job in self.jobs.drain(..) {
            match pick(&job) {
                Some(assignment) => assigned.push((job, assignment)),
                None => remaining.push(job),
            }
        }

        self.jobs = remaining;
        assigned
    }

    /// Drops jobs whose callers went away. Returns how many were removed.
    pub fn prune_abandoned(&mut self) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|job| !job.is_abandoned());
        before - self.jobs.len()
    }

    /// Empties the queue.
    pub fn drain(&mut self) -> Vec<Job> {
        self.jobs.drain(..).collect()
    }
}
