//! Per-session "already voted" markers.
//!
//! A marker maps a poll id to the poll's `sessionId` at the time the session
//! voted. Resetting a poll regenerates its `sessionId`, so older markers stop
//! matching without being cleaned up.
//!
//! Markers are scoped to the session token the client presents. How long a
//! token lives is up to the client; how long markers survive is up to the
//! [`MarkerStore`] (process lifetime for [`MemoryMarkerStore`], across
//! restarts for [`FileMarkerStore`]).

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::backend::StoreResult;
use crate::types::SessionToken;

/// Durable key-value storage for markers
#[async_trait]
pub trait MarkerStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryMarkerStore {
    markers: RwLock<HashMap<String, String>>,
}

impl MemoryMarkerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MarkerStore for MemoryMarkerStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.markers.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.markers
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Markers persisted as one JSON object on disk, rewritten on every set
#[derive(Debug)]
pub struct FileMarkerStore {
    path: PathBuf,
    markers: RwLock<HashMap<String, String>>,
}

impl FileMarkerStore {
    /// Open the marker file, starting empty if it does not exist yet
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let markers = match tokio::fs::read_to_string(&path).await {
            Ok(json) => serde_json::from_str(&json)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            markers: RwLock::new(markers),
        })
    }
}

#[async_trait]
impl MarkerStore for FileMarkerStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.markers.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut markers = self.markers.write().await;
        let mut updated = markers.clone();
        updated.insert(key.to_string(), value.to_string());
        let json = serde_json::to_string(&updated)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        // Visible only once it is on disk
        *markers = updated;
        Ok(())
    }
}

/// Voting identity of one participant session
#[derive(Clone)]
pub struct SessionGuard {
    token: SessionToken,
    markers: Arc<dyn MarkerStore>,
    /// Serializes votes from this session
    in_flight: Arc<Mutex<()>>,
}

impl SessionGuard {
    pub fn new(token: impl Into<SessionToken>, markers: Arc<dyn MarkerStore>) -> Self {
        Self {
            token: token.into(),
            markers,
            in_flight: Arc::new(Mutex::new(())),
        }
    }

    /// Guard for `token` that shares an existing in-flight lock
    pub(crate) fn with_lock(
        token: impl Into<SessionToken>,
        markers: Arc<dyn MarkerStore>,
        in_flight: Arc<Mutex<()>>,
    ) -> Self {
        Self {
            token: token.into(),
            markers,
            in_flight,
        }
    }

    /// Handle that stays alive only as long as some guard for this session does
    pub(crate) fn downgrade_lock(&self) -> Weak<Mutex<()>> {
        Arc::downgrade(&self.in_flight)
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    fn marker_key(&self, poll_id: &str) -> String {
        format!("{}/voted_{}", self.token, poll_id)
    }

    /// True iff this session voted on `poll_id` in its current generation
    pub async fn has_voted_for(
        &self,
        poll_id: &str,
        current_session_id: &str,
    ) -> StoreResult<bool> {
        let marker = self.markers.get(&self.marker_key(poll_id)).await?;
        Ok(marker.as_deref() == Some(current_session_id))
    }

    pub async fn mark_voted(&self, poll_id: &str, session_id: &str) -> StoreResult<()> {
        self.markers.set(&self.marker_key(poll_id), session_id).await
    }

    /// Hold while checking, recording and marking a vote
    pub async fn lock(&self) -> OwnedMutexGuard<()> {
        self.in_flight.clone().lock_owned().await
    }
}

impl std::fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGuard")
            .field("token", &self.token)
            .finish()
    }
}
