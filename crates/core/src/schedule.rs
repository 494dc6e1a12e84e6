//! One-shot job scheduling on top of the key-value collaborator.
//!
//! There is no in-process timer. A job is "scheduled" by recording its due
//! time; the host's periodic tick claims due jobs with [`Scheduler::take_due`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::Error;
use crate::kv::KvStore;

const KEY_PREFIX: &str = "schedule:";

#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Make `job` due after `delay`, replacing any pending schedule for it.
    async fn schedule_once(&self, delay: Duration, job: &str) -> Result<(), Error>;

    async fn cancel_scheduled(&self, job: &str) -> Result<(), Error>;

    /// When `job` is next due, if it is scheduled at all.
    async fn next_scheduled(&self, job: &str) -> Result<Option<DateTime<Utc>>, Error>;

    fn now(&self) -> DateTime<Utc>;

    /// Claim `job` if it is due, clearing its schedule.
    ///
    /// Two processes racing on the same tick may both claim it.
    async fn take_due(&self, job: &str) -> Result<bool, Error> {
        match self.next_scheduled(job).await? {
            Some(at) if at <= self.now() => {
                self.cancel_scheduled(job).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

fn max_delay() -> chrono::Duration {
    chrono::Duration::days(36_500)
}

/// [`Scheduler`] persisting due times as RFC 3339 strings under `schedule:<job>`.
#[derive(Clone)]
pub struct KvScheduler {
    kv: Arc<dyn KvStore>,
}

impl KvScheduler {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    fn key(job: &str) -> String {
        format!("{KEY_PREFIX}{job}")
    }
}

#[async_trait]
impl Scheduler for KvScheduler {
    async fn schedule_once(&self, delay: Duration, job: &str) -> Result<(), Error> {
        let delay = chrono::Duration::from_std(delay).map_or(max_delay(), |d| d.min(max_delay()));
        let due = self.now().checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.kv.set(&Self::key(job), &due.to_rfc3339(), None).await?;
        debug!(job = %job, due = %due, "job scheduled");
        Ok(())
    }

    async fn cancel_scheduled(&self, job: &str) -> Result<(), Error> {
        self.kv.delete(&Self::key(job)).await
    }

    async fn next_scheduled(&self, job: &str) -> Result<Option<DateTime<Utc>>, Error> {
        let Some(raw) = self.kv.get(&Self::key(job)).await? else {
            return Ok(None);
        };
        match DateTime::parse_from_rfc3339(&raw) {
            Ok(at) => Ok(Some(at.with_timezone(&Utc))),
            Err(err) => {
                warn!(job = %job, value = %raw, error = %err, "discarding unparsable schedule");
                self.cancel_scheduled(job).await?;
                Ok(None)
            }
        }
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
