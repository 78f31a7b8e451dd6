//! Per-queue key namespace.
//!
//! Every queue owns a fixed set of structural keys under
//! `{prefix}:{queue}:...`, plus per-job keys `{prefix}:{queue}:{jobId}`
//! with `:lock`, `:dependencies` and `:processed` companions.

/// Precomputed structural keys of one queue namespace.
#[derive(Debug, Clone)]
pub struct QueueKeys {
    /// Namespace prefix, `{prefix}:{queue}`. This is the value carried as
    /// `queue_key` in parent references.
    pub base: String,
    pub wait: String,
    pub paused: String,
    pub prioritized: String,
    pub delayed: String,
    pub active: String,
    pub waiting_children: String,
    pub completed: String,
    pub failed: String,
    pub meta: String,
    pub id: String,
    pub pc: String,
    pub events: String,
    pub stalled: String,
    pub limiter: String,
}

impl QueueKeys {
    pub fn new(prefix: &str, queue: &str) -> Self {
        Self::from_base(format!("{prefix}:{queue}"))
    }

    /// Build the namespace from an opaque queue key, as carried in parent
    /// references for cross-queue cascades.
    pub fn from_base(base: String) -> Self {
        Self {
            wait: format!("{base}:wait"),
            paused: format!("{base}:paused"),
            prioritized: format!("{base}:prioritized"),
            delayed: format!("{base}:delayed"),
            active: format!("{base}:active"),
            waiting_children: format!("{base}:waiting-children"),
            completed: format!("{base}:completed"),
            failed: format!("{base}:failed"),
            meta: format!("{base}:meta"),
            id: format!("{base}:id"),
            pc: format!("{base}:pc"),
            events: format!("{base}:events"),
            stalled: format!("{base}:stalled"),
            limiter: format!("{base}:limiter"),
            base,
        }
    }

    /// Job hash key.
    #[inline]
    pub fn job(&self, job_id: &str) -> String {
        format!("{}:{}", self.base, job_id)
    }

    /// Worker lease key of a job.
    #[inline]
    pub fn lock(&self, job_id: &str) -> String {
        format!("{}:{}:lock", self.base, job_id)
    }

    /// Minute-bucket metrics hash for `completed` or `failed`.
    #[inline]
    pub fn metrics(&self, target: &str) -> String {
        format!("{}:metrics:{}", self.base, target)
    }

    /// Data list companion of a metrics hash.
    #[inline]
    pub fn metrics_data(&self, target: &str) -> String {
        format!("{}:metrics:{}:data", self.base, target)
    }

    /// Dependency set of a job, addressed by its full job key.
    #[inline]
    pub fn deps_of(job_key: &str) -> String {
        format!("{job_key}:dependencies")
    }

    /// Processed-children hash of a job, addressed by its full job key.
    #[inline]
    pub fn processed_of(job_key: &str) -> String {
        format!("{job_key}:processed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_base_matches_new() {
        let a = QueueKeys::new("emberq", "mail");
        let b = QueueKeys::from_base("emberq:mail".to_string());

        assert_eq!(a.base, b.base);
        assert_eq!(a.wait, "emberq:mail:wait");
        assert_eq!(a.job("42"), "emberq:mail:42");
        assert_eq!(a.lock("42"), "emberq:mail:42:lock");
        assert_eq!(QueueKeys::deps_of(&a.job("42")), "emberq:mail:42:dependencies");
    }
}
