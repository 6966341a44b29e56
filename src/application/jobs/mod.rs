mod context;
mod warm;

pub use context::{JobWorkerContext, job_failed};
pub use warm::{
    WARM_JOB_MAX_ATTEMPTS, WARM_JOB_TIMEOUT, WarmCacheJobPayload, process_warm_cache_job,
};
