//! Build registry
//!
//! In-memory table of build records keyed by target name. The admission
//! check and the insert happen under one lock, which is the system's core
//! mutual-exclusion guarantee: at most one active (queued or running)
//! build per name, under arbitrary request concurrency. Terminal records
//! stay around for log retrieval until a new build of the same name
//! supersedes them.

pub mod record;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use kiln_core::domain::{RepoSource, ResourceLimits};

pub use record::{BuildEvent, BuildRecord, CancelOutcome, Subscription};

/// Admission rejection: an active build already holds the name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlreadyBuilding(pub String);

#[derive(Debug)]
pub struct BuildRegistry {
    log_cap: usize,
    builds: Mutex<HashMap<String, Arc<BuildRecord>>>,
}

impl BuildRegistry {
    /// `log_cap` bounds the number of log lines retained per record.
    pub fn new(log_cap: usize) -> Self {
        Self {
            log_cap,
            builds: Mutex::new(HashMap::new()),
        }
    }

    /// Atomically admit a new build for `name`.
    ///
    /// Rejects if an active record holds the name; otherwise creates a
    /// queued record, superseding any terminal predecessor.
    pub fn admit(
        &self,
        name: &str,
        source: RepoSource,
        limits: ResourceLimits,
    ) -> Result<Arc<BuildRecord>, AlreadyBuilding> {
        let mut builds = self.builds.lock().unwrap();

        if let Some(existing) = builds.get(name) {
            if existing.status().is_active() {
                return Err(AlreadyBuilding(name.to_string()));
            }
            debug!("superseding finished build record for {}", name);
        }

        let record = Arc::new(BuildRecord::new(name, source, limits, self.log_cap));
        builds.insert(name.to_string(), Arc::clone(&record));
        Ok(record)
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<BuildRecord>> {
        self.builds.lock().unwrap().get(name).cloned()
    }

    /// All records, most recent first.
    pub fn list(&self) -> Vec<Arc<BuildRecord>> {
        let builds = self.builds.lock().unwrap();
        let mut records: Vec<Arc<BuildRecord>> = builds.values().cloned().collect();
        records.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::domain::BuildStatus;

    fn source() -> RepoSource {
        RepoSource::new("https://example.com/x.git", None)
    }

    #[test]
    fn admit_then_reject_while_active() {
        let registry = BuildRegistry::new(100);

        let first = registry.admit("foo", source(), ResourceLimits::default());
        assert!(first.is_ok());

        let second = registry.admit("foo", source(), ResourceLimits::default());
        assert_eq!(second.unwrap_err(), AlreadyBuilding("foo".to_string()));

        // Still rejected once the build is running
        first.unwrap().mark_running();
        let third = registry.admit("foo", source(), ResourceLimits::default());
        assert!(third.is_err());
    }

    #[test]
    fn terminal_record_is_superseded() {
        let registry = BuildRegistry::new(100);

        let first = registry.admit("foo", source(), ResourceLimits::default()).unwrap();
        first.finish(BuildStatus::Failed, Some("exit 1".to_string()));

        let second = registry.admit("foo", source(), ResourceLimits::default()).unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(registry.lookup("foo").unwrap().id, second.id);
    }

    #[test]
    fn distinct_names_are_independent() {
        let registry = BuildRegistry::new(100);
        assert!(registry.admit("foo", source(), ResourceLimits::default()).is_ok());
        assert!(registry.admit("bar", source(), ResourceLimits::default()).is_ok());
        assert_eq!(registry.list().len(), 2);
    }

    #[test]
    fn concurrent_admissions_admit_exactly_one() {
        let registry = Arc::new(BuildRegistry::new(100));

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    registry
                        .admit("foo", source(), ResourceLimits::default())
                        .is_ok()
                })
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&admitted| admitted)
            .count();

        assert_eq!(admitted, 1);
        assert_eq!(registry.lookup("foo").unwrap().status(), BuildStatus::Queued);
    }

    #[test]
    fn cancelled_queued_record_frees_the_name() {
        let registry = BuildRegistry::new(100);
        let record = registry.admit("foo", source(), ResourceLimits::default()).unwrap();

        record.request_cancel();
        assert_eq!(record.status(), BuildStatus::Cancelled);

        assert!(registry.admit("foo", source(), ResourceLimits::default()).is_ok());
    }
}
