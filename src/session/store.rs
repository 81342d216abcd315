use async_trait::async_trait;
use dashmap::DashSet;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

/// Change notifications delivered to every holder of a credential store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialEvent {
    Stored,
    Removed,
}

/// Persistent credential shared by all sessions of one client
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> Option<String>;

    async fn save(&self, token: &str);

    /// Remove the credential. Notifies subscribers even if nothing was stored.
    async fn clear(&self);

    fn subscribe(&self) -> broadcast::Receiver<CredentialEvent>;
}

struct SharedCredential {
    token: RwLock<Option<String>>,
    events: broadcast::Sender<CredentialEvent>,
}

/// In-process credential store. Clones share the same credential, the way
/// tabs of one browser share local storage.
#[derive(Clone)]
pub struct MemoryCredentialStore {
    shared: Arc<SharedCredential>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            shared: Arc::new(SharedCredential {
                token: RwLock::new(None),
                events,
            }),
        }
    }
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Option<String> {
        self.shared.token.read().await.clone()
    }

    async fn save(&self, token: &str) {
        *self.shared.token.write().await = Some(token.to_string());
        // No receivers is fine.
        let _ = self.shared.events.send(CredentialEvent::Stored);
    }

    async fn clear(&self) {
        let previous = self.shared.token.write().await.take();
        if previous.is_some() {
            debug!("Stored credential removed");
        }
        let _ = self.shared.events.send(CredentialEvent::Removed);
    }

    fn subscribe(&self) -> broadcast::Receiver<CredentialEvent> {
        self.shared.events.subscribe()
    }
}

/// Markers written when a session is torn down without logging out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionMarker {
    Ending,
    Closed,
}

/// Per-session transient storage that survives a reload of the same session
/// but is not shared with other sessions
#[derive(Clone, Default)]
pub struct TabSession {
    markers: Arc<DashSet<SessionMarker>>,
}

impl TabSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self, marker: SessionMarker) {
        self.markers.insert(marker);
    }

    pub fn has_marker(&self, marker: SessionMarker) -> bool {
        self.markers.contains(&marker)
    }

    /// Remove all markers, reporting whether any were present
    pub fn take_markers(&self) -> bool {
        let had_any = !self.markers.is_empty();
        self.markers.clear();
        had_any
    }
}
