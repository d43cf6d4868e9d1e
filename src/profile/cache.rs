//! Read-through profile cache with explicit invalidation.
//!
//! Entries expire after a fixed TTL. `invalidate` also bumps a per-handle
//! generation; a load that started before the bump cannot write its
//! (possibly stale) result back.

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use super::model::UserProfile;

struct CachedProfile {
    profile: UserProfile,
    loaded_at: Instant,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CachedProfile>,
    generations: HashMap<String, u64>,
}

pub struct ProfileCache {
    ttl: Duration,
    state: RwLock<CacheState>,
}

impl ProfileCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: RwLock::new(CacheState::default()),
        }
    }

    /// A fresh cached profile, if any.
    pub async fn get(&self, handle: &str) -> Option<UserProfile> {
        let state = self.state.read().await;
        state
            .entries
            .get(handle)
            .filter(|e| e.loaded_at.elapsed() < self.ttl)
            .map(|e| e.profile.clone())
    }

    /// Current generation for `handle`; pass it back to `insert_if_current`.
    pub async fn generation(&self, handle: &str) -> u64 {
        let state = self.state.read().await;
        state.generations.get(handle).copied().unwrap_or(0)
    }

    /// Store `profile` unless the handle was invalidated since `generation`
    /// was read. Returns whether the entry was written.
    pub async fn insert_if_current(
        &self,
        handle: &str,
        generation: u64,
        profile: UserProfile,
    ) -> bool {
        let mut state = self.state.write().await;
        let current = state.generations.get(handle).copied().unwrap_or(0);
        if current != generation {
            tracing::debug!(handle, "Discarding profile loaded before invalidation");
            return false;
        }
        state.entries.insert(
            handle.to_string(),
            CachedProfile {
                profile,
                loaded_at: Instant::now(),
            },
        );
        true
    }

    /// Drop the entry for `handle` and fence out in-flight loads.
    pub async fn invalidate(&self, handle: &str) {
        let mut state = self.state.write().await;
        state.entries.remove(handle);
        *state.generations.entry(handle.to_string()).or_insert(0) += 1;
    }

    /// Return the cached profile or run `load` and cache a found result.
    ///
    /// Absent profiles are not cached, so a user who registers is seen on
    /// the next message.
    pub async fn get_or_load<F, Fut, E>(
        &self,
        handle: &str,
        load: F,
    ) -> Result<Option<UserProfile>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<UserProfile>, E>>,
    {
        if let Some(hit) = self.get(handle).await {
            return Ok(Some(hit));
        }
        let generation = self.generation(handle).await;
        let loaded = load().await?;
        if let Some(ref profile) = loaded {
            self.insert_if_current(handle, generation, profile.clone()).await;
        }
        Ok(loaded)
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn profile(handle: &str) -> UserProfile {
        UserProfile::new(handle)
    }

    #[tokio::test]
    async fn load_populates_cache() {
        let cache = ProfileCache::new(Duration::from_secs(60));
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let load = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Infallible>(Some(profile("111")))
        };

        assert!(cache.get_or_load("111", load).await.unwrap().is_some());
        let hit = cache.get_or_load("111", load).await.unwrap();
        assert_eq!(hit.unwrap().handle, "111");
        assert_eq!(counter.load(Ordering::SeqCst), 1, "second read should hit the cache");
    }

    #[tokio::test]
    async fn missing_profiles_are_not_cached() {
        let cache = ProfileCache::new(Duration::from_secs(60));
        let loaded = cache
            .get_or_load("222", || async { Ok::<_, Infallible>(None) })
            .await
            .unwrap();
        assert!(loaded.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn invalidate_removes_entry() {
        let cache = ProfileCache::new(Duration::from_secs(60));
        let g = cache.generation("333").await;
        assert!(cache.insert_if_current("333", g, profile("333")).await);
        cache.invalidate("333").await;
        assert!(cache.get("333").await.is_none());
    }

    #[tokio::test]
    async fn stale_load_cannot_repopulate_after_invalidation() {
        let cache = ProfileCache::new(Duration::from_secs(60));
        let before = cache.generation("444").await;
        // A mutation lands while the load is in flight.
        cache.invalidate("444").await;
        assert!(!cache.insert_if_current("444", before, profile("444")).await);
        assert!(cache.get("444").await.is_none());
    }

    #[tokio::test]
    async fn expired_entries_are_not_served() {
        let cache = ProfileCache::new(Duration::ZERO);
        let g = cache.generation("555").await;
        cache.insert_if_current("555", g, profile("555")).await;
        assert!(cache.get("555").await.is_none());
    }

    #[tokio::test]
    async fn loader_errors_propagate() {
        let cache = ProfileCache::new(Duration::from_secs(60));
        let result = cache
            .get_or_load("666", || async { Err::<Option<UserProfile>, _>("backend down") })
            .await;
        assert_eq!(result.unwrap_err(), "backend down");
    }
}
