//! Cache warm job.
//!
//! Runs on the worker queue, decoupled from request handling. The warming
//! lock keeps concurrent runs for the same user from duplicating work; the
//! attempt loop and per-attempt timeout bound how long a broken backend or
//! data source can hold a worker.

use std::time::Duration;

use apalis::prelude::{Data, Error as ApalisError};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::cache::{WarmError, WarmKind};

use super::context::{JobWorkerContext, job_failed};

/// Infrastructure failures are retried this many times before giving up.
pub const WARM_JOB_MAX_ATTEMPTS: u32 = 3;

/// Hard bound on a single warming attempt.
pub const WARM_JOB_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmCacheJobPayload {
    pub user_id: i64,
    /// Restricts which sub-caches to warm; absent warms all of them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<Vec<WarmKind>>,
}

/// Process a cache warm job.
pub async fn process_warm_cache_job(
    payload: WarmCacheJobPayload,
    context: Data<JobWorkerContext>,
) -> Result<(), ApalisError> {
    let ctx = &*context;
    let user_id = payload.user_id;
    let kinds = payload.types.unwrap_or_else(|| WarmKind::ALL.to_vec());

    if ctx.warming_lock.is_held(user_id).await {
        info!(user_id, "warming already in progress, skipping");
        return Ok(());
    }
    ctx.warming_lock.acquire(user_id).await;

    let mut last_error: Option<WarmError> = None;
    for attempt in 1..=WARM_JOB_MAX_ATTEMPTS {
        match tokio::time::timeout(WARM_JOB_TIMEOUT, ctx.warmer.warm_user(user_id, &kinds)).await
        {
            Ok(Ok(())) => {
                ctx.warming_lock.release(user_id).await;
                return Ok(());
            }
            Ok(Err(err)) => {
                warn!(user_id, attempt, error = %err, "warm attempt failed");
                last_error = Some(err);
            }
            Err(_) => {
                warn!(
                    user_id,
                    attempt,
                    timeout_secs = WARM_JOB_TIMEOUT.as_secs(),
                    "warm attempt timed out"
                );
                last_error = Some(WarmError::Source(format!(
                    "timed out after {}s",
                    WARM_JOB_TIMEOUT.as_secs()
                )));
            }
        }
    }

    ctx.warming_lock.release(user_id).await;

    let err = last_error
        .unwrap_or_else(|| WarmError::Source("warm job failed without error detail".into()));
    error!(
        user_id,
        attempts = WARM_JOB_MAX_ATTEMPTS,
        error = %err,
        "cache warm job failed terminally"
    );
    Err(job_failed(err))
}
