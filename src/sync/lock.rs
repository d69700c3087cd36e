//! Lease lock around a sync phase, stored as a row in `sync_locks`.
//!
//! A lock is held until `lock_at_most` elapses even if the holder dies. On
//! release the lease is cut back, but never below `lock_at_least` after it
//! was taken, so a fast run does not let a second instance repeat it.
use chrono::{DateTime, Duration, SubsecRound, Utc};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::config::Config;
use crate::db::{self, Pool};

#[derive(Debug, Error)]
#[error("lock {name}: {source}")]
pub struct LockError {
    pub name: String,
    #[source]
    pub source: anyhow::Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseSettings {
    pub at_most: Duration,
    pub at_least: Duration,
}

impl LeaseSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            at_most: Duration::seconds(cfg.app.lock_at_most_seconds as i64),
            at_least: Duration::seconds(cfg.app.lock_at_least_seconds as i64),
        }
    }
}

/// Proof of holding a named lock. Hand it back with [`LeaseGuard::release`].
#[derive(Debug)]
pub struct LeaseGuard {
    name: String,
    owner: String,
    acquired_at: DateTime<Utc>,
    at_least: Duration,
}

impl LeaseGuard {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn release(self, pool: &Pool) -> Result<(), LockError> {
        let now = Utc::now().trunc_subsecs(0);
        let until = now.max(self.acquired_at + self.at_least);
        db::release_lock(pool, &self.name, &self.owner, until)
            .await
            .map_err(|source| LockError {
                name: self.name.clone(),
                source,
            })?;
        debug!(lock = %self.name, %until, "lock released");
        Ok(())
    }
}

/// Try to take `name`. `None` means another holder's lease is still running.
pub async fn try_acquire(
    pool: &Pool,
    name: &str,
    settings: LeaseSettings,
) -> Result<Option<LeaseGuard>, LockError> {
    try_acquire_at(pool, name, settings, Utc::now()).await
}

pub async fn try_acquire_at(
    pool: &Pool,
    name: &str,
    settings: LeaseSettings,
    now: DateTime<Utc>,
) -> Result<Option<LeaseGuard>, LockError> {
    let now = now.trunc_subsecs(0);
    let owner = Uuid::new_v4().to_string();
    let acquired = db::try_acquire_lock(pool, name, &owner, now, now + settings.at_most)
        .await
        .map_err(|source| LockError {
            name: name.to_string(),
            source,
        })?;
    if !acquired {
        debug!(lock = name, "lock held elsewhere");
        return Ok(None);
    }
    Ok(Some(LeaseGuard {
        name: name.to_string(),
        owner,
        acquired_at: now,
        at_least: settings.at_least,
    }))
}
