//! In-memory registry.
//!
//! Backs dry runs and tests. Failures can be queued per package to exercise
//! the publisher's retry and fail-fast paths.

use super::{PublishOutcome, Registry, RegistryError, RegistryFuture};
use crate::version::Version;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct State {
    // (package, version) -> yanked
    versions: BTreeMap<(String, String), bool>,
    failures: BTreeMap<String, VecDeque<RegistryError>>,
    publish_calls: Vec<String>,
}

/// Registry held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    state: Mutex<State>,
    publish_delay: Option<Duration>,
}

fn key(package: &str, version: &Version) -> (String, String) {
    (package.to_string(), version.to_string())
}

impl MemoryRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every publish call.
    #[must_use]
    pub const fn with_publish_delay(mut self, delay: Duration) -> Self {
        self.publish_delay = Some(delay);
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pretend `package` at `version` was published earlier.
    pub fn insert(&self, package: &str, version: &Version) {
        self.state().versions.insert(key(package, version), false);
    }

    /// Make the next publish of `package` fail with `error`. Calls queue up.
    pub fn fail_next(&self, package: &str, error: RegistryError) {
        self.state()
            .failures
            .entry(package.to_string())
            .or_default()
            .push_back(error);
    }

    /// Whether `package` at `version` is held and not yanked.
    #[must_use]
    pub fn is_live(&self, package: &str, version: &Version) -> bool {
        self.state().versions.get(&key(package, version)) == Some(&false)
    }

    /// Whether `package` at `version` was yanked.
    #[must_use]
    pub fn is_yanked(&self, package: &str, version: &Version) -> bool {
        self.state().versions.get(&key(package, version)) == Some(&true)
    }

    /// Packages passed to `publish`, in call order, including failed attempts.
    #[must_use]
    pub fn publish_calls(&self) -> Vec<String> {
        self.state().publish_calls.clone()
    }
}

impl Registry for MemoryRegistry {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn exists<'a>(&'a self, package: &'a str, version: &'a Version) -> RegistryFuture<'a, bool> {
        Box::pin(async move { Ok(self.state().versions.contains_key(&key(package, version))) })
    }

    fn publish<'a>(
        &'a self,
        package: &'a str,
        version: &'a Version,
    ) -> RegistryFuture<'a, PublishOutcome> {
        Box::pin(async move {
            if let Some(delay) = self.publish_delay {
                tokio::time::sleep(delay).await;
            }
            let mut state = self.state();
            state.publish_calls.push(package.to_string());
            if let Some(err) = state
                .failures
                .get_mut(package)
                .and_then(VecDeque::pop_front)
            {
                return Err(err);
            }
            let key = key(package, version);
            if state.versions.contains_key(&key) {
                return Ok(PublishOutcome::AlreadySatisfied);
            }
            state.versions.insert(key, false);
            Ok(PublishOutcome::Published)
        })
    }

    fn yank<'a>(&'a self, package: &'a str, version: &'a Version) -> RegistryFuture<'a, ()> {
        Box::pin(async move {
            match self.state().versions.get_mut(&key(package, version)) {
                Some(yanked) => {
                    *yanked = true;
                    Ok(())
                }
                None => Err(RegistryError::rejected(format!(
                    "{package}@{version} is not published"
                ))),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_exists_yank() {
        let registry = MemoryRegistry::new();
        let v = Version::new(1, 0, 0);
        assert!(!registry.exists("a", &v).await.unwrap());
        assert_eq!(registry.publish("a", &v).await.unwrap(), PublishOutcome::Published);
        assert!(registry.is_live("a", &v));
        assert_eq!(
            registry.publish("a", &v).await.unwrap(),
            PublishOutcome::AlreadySatisfied
        );
        registry.yank("a", &v).await.unwrap();
        assert!(registry.is_yanked("a", &v));
        assert!(registry.exists("a", &v).await.unwrap());
    }

    #[tokio::test]
    async fn test_fault_injection_queue() {
        let registry = MemoryRegistry::new();
        let v = Version::new(1, 0, 0);
        registry.fail_next("a", RegistryError::transient("blip"));
        assert!(registry.publish("a", &v).await.is_err());
        assert!(registry.publish("a", &v).await.is_ok());
        assert_eq!(registry.publish_calls(), vec!["a", "a"]);
    }

    #[tokio::test]
    async fn test_yank_unknown() {
        let registry = MemoryRegistry::new();
        assert!(registry.yank("a", &Version::new(1, 0, 0)).await.is_err());
    }
}
