//! Shared registry of all jobs this process knows about
//!
//! The registry is the single owner of job records; everything else mutates
//! them through it. Status queries read a snapshot, never the live record.

use crate::job::{CancelToken, Job, JobError, JobId, JobState, JobStatus, PageError};
use std::collections::HashMap;
use std::sync::Mutex;

/// Mutex-guarded map of job id to job record
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<String, Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly-created job
    pub fn insert(&self, job: Job) {
        let mut jobs = self.jobs.lock().unwrap();
        jobs.insert(job.id.to_string(), job);
    }

    /// Answers the external status query
    pub fn status(&self, id: &JobId) -> Option<JobStatus> {
        let jobs = self.jobs.lock().unwrap();
        jobs.get(id.as_str()).map(|job| job.status())
    }

    /// Clone of the cancel token for one job
    pub fn cancel_token(&self, id: &JobId) -> Result<CancelToken, JobError> {
        let jobs = self.jobs.lock().unwrap();
        jobs.get(id.as_str())
            .map(|job| job.cancel.clone())
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }

    /// Requests cooperative cancellation of one job
    pub fn cancel(&self, id: &JobId) -> Result<(), JobError> {
        self.cancel_token(id).map(|token| token.cancel())
    }

    /// Applies a validated state transition
    pub fn transition(&self, id: &JobId, to: JobState) -> Result<(), JobError> {
        self.with_job(id, |job| job.transition(to))?
    }

    /// Current attempt counter of one job
    pub fn attempt(&self, id: &JobId) -> Result<u32, JobError> {
        self.with_job(id, |job| job.attempt)
    }

    /// Updates the progress counters
    pub fn set_progress(&self, id: &JobId, pages_done: u32, pages_total: u32) {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.get_mut(id.as_str()) {
            job.pages_done = pages_done;
            job.pages_total = pages_total;
        }
    }

    /// Appends the per-URL failures of a finished run
    pub fn record_errors(&self, id: &JobId, errors: &[PageError]) {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.get_mut(id.as_str()) {
            job.errors.extend_from_slice(errors);
        }
    }

    /// Notes the whole-unit error of a failed attempt
    pub fn set_last_error(&self, id: &JobId, message: impl Into<String>) {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.get_mut(id.as_str()) {
            job.last_error = Some(message.into());
        }
    }

    /// Runs a closure against the live record
    pub fn with_job<T>(
        &self,
        id: &JobId,
        f: impl FnOnce(&mut Job) -> T,
    ) -> Result<T, JobError> {
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.get_mut(id.as_str()) {
            Some(job) => Ok(f(job)),
            None => Err(JobError::NotFound(id.to_string())),
        }
    }

    /// Number of registered jobs
    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobKind;

    fn registered(registry: &JobRegistry) -> JobId {
        let id = JobId::generate();
        registry.insert(Job::new(id.clone(), "s1", JobKind::Single, 1));
        id
    }

    #[test]
    fn test_insert_and_status() {
        let registry = JobRegistry::new();
        let id = registered(&registry);

        let status = registry.status(&id).unwrap();
        assert_eq!(status.state, JobState::Queued);
        assert_eq!(status.pages_total, 1);
    }

    #[test]
    fn test_status_of_unknown_job() {
        let registry = JobRegistry::new();
        assert!(registry.status(&JobId::from_string("ghost")).is_none());
    }

    #[test]
    fn test_transition_through_registry() {
        let registry = JobRegistry::new();
        let id = registered(&registry);

        registry.transition(&id, JobState::Running).unwrap();
        assert_eq!(registry.status(&id).unwrap().state, JobState::Running);
        assert_eq!(registry.attempt(&id).unwrap(), 1);
    }

    #[test]
    fn test_invalid_transition_propagates() {
        let registry = JobRegistry::new();
        let id = registered(&registry);

        let err = registry.transition(&id, JobState::Completed).unwrap_err();
        assert!(matches!(err, JobError::InvalidTransition { .. }));
    }

    #[test]
    fn test_transition_unknown_job() {
        let registry = JobRegistry::new();
        let err = registry
            .transition(&JobId::from_string("ghost"), JobState::Running)
            .unwrap_err();
        assert!(matches!(err, JobError::NotFound(_)));
    }

    #[test]
    fn test_progress_and_errors_recorded() {
        let registry = JobRegistry::new();
        let id = registered(&registry);

        registry.set_progress(&id, 2, 5);
        registry.record_errors(&id, &[PageError::new("https://a.test/x", "HTTP 404")]);
        registry.set_last_error(&id, "engine gone");

        let status = registry.status(&id).unwrap();
        assert_eq!(status.pages_done, 2);
        assert_eq!(status.pages_total, 5);
        assert_eq!(status.last_error.as_deref(), Some("engine gone"));

        let errors = registry.with_job(&id, |job| job.errors.clone()).unwrap();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_cancel_flips_shared_token() {
        let registry = JobRegistry::new();
        let id = registered(&registry);

        let token = registry.cancel_token(&id).unwrap();
        assert!(!token.is_cancelled());

        registry.cancel(&id).unwrap();
        assert!(token.is_cancelled());
    }
}
