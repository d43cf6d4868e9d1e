//! Profile lookup on the request path: cache, then the account backend
//! synced into the local store, with the local row as the fallback.

use std::sync::Arc;

use crate::backend::AccountBackend;
use crate::error::BackendError;
use crate::store::ProfileStore;

use super::cache::ProfileCache;
use super::model::UserProfile;

/// Outcome of resolving a handle to a profile.
#[derive(Debug)]
pub enum ProfileLookup {
    Found(UserProfile),
    /// Neither the store nor the backend knows the handle.
    Unknown,
    /// Not in the store and the backend failed.
    Unavailable(BackendError),
}

pub struct ProfileResolver {
    store: Arc<dyn ProfileStore>,
    backend: Arc<dyn AccountBackend>,
    cache: Arc<ProfileCache>,
}

impl ProfileResolver {
    pub fn new(
        store: Arc<dyn ProfileStore>,
        backend: Arc<dyn AccountBackend>,
        cache: Arc<ProfileCache>,
    ) -> Self {
        Self {
            store,
            backend,
            cache,
        }
    }

    pub async fn resolve(&self, handle: &str) -> ProfileLookup {
        match self.cache.get_or_load(handle, || self.load(handle)).await {
            Ok(Some(profile)) => ProfileLookup::Found(profile),
            Ok(None) => ProfileLookup::Unknown,
            Err(e) => {
                tracing::warn!(handle, error = %e, "Profile lookup failed upstream");
                ProfileLookup::Unavailable(e)
            }
        }
    }

    /// Cache miss path. The backend is asked first so progress recorded
    /// there since the last visit reaches the local row.
    async fn load(&self, handle: &str) -> Result<Option<UserProfile>, BackendError> {
        let fetched = self.backend.fetch_profile(handle).await;

        if let Ok(Some(remote)) = &fetched {
            return match self.store.sync_remote_profile(remote).await {
                Ok(profile) => Ok(Some(profile)),
                Err(e) => {
                    tracing::warn!(handle, error = %e, "Failed to sync backend profile");
                    Ok(Some(remote.clone()))
                }
            };
        }

        let local = match self.store.get_profile(handle).await {
            Ok(local) => local,
            Err(e) => {
                tracing::warn!(handle, error = %e, "Local profile read failed");
                None
            }
        };

        match (fetched, local) {
            (Err(e), Some(local)) => {
                tracing::warn!(handle, error = %e, "Backend unavailable, serving local profile");
                Ok(Some(local))
            }
            // Registered here but not (yet) known upstream.
            (Ok(_), Some(local)) => Ok(Some(local)),
            (Err(e), None) => Err(e),
            (Ok(_), None) => Ok(None),
        }
    }
}
