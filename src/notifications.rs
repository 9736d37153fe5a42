use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::config::NotificationConfig;

pub type NotificationId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Error,
}

/// A transient user-facing message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub id: NotificationId,
    pub message: String,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
    /// Set once removal has begun; the view plays its exit animation.
    pub exiting: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotificationEvent {
    Pushed(Notification),
    Exiting(NotificationId),
    Removed(NotificationId),
}

struct Entry {
    notification: Notification,
    expiry: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Inner {
    next_id: NotificationId,
    // Ids are monotonic, so key order is insertion order
    entries: BTreeMap<NotificationId, Entry>,
}

/// In-memory queue of notifications that expire on their own.
///
/// Each push schedules an automatic dismissal after the display duration.
/// Dismissal is two-phase: the entry is marked as exiting, then removed after
/// the exit grace period. Ids come from a counter, never from the clock.
#[derive(Clone)]
pub struct NotificationCenter {
    inner: Arc<Mutex<Inner>>,
    events: broadcast::Sender<NotificationEvent>,
    display: Duration,
    grace: Duration,
}

impl NotificationCenter {
    pub fn new(cfg: &NotificationConfig) -> Self {
        Self::with_timings(
            cfg.display_duration(),
            cfg.exit_grace(),
            cfg.channel_capacity,
        )
    }

    pub fn with_timings(display: Duration, grace: Duration, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            events,
            display,
            grace,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.events.subscribe()
    }

    pub fn push(&self, message: impl Into<String>, severity: Severity) -> NotificationId {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;

        let notification = Notification {
            id,
            message: message.into(),
            severity,
            created_at: Utc::now(),
            exiting: false,
        };
        tracing::debug!(id, ?severity, "notification: {}", notification.message);

        let expiry = self.schedule(self.display, move |center| {
            center.begin_exit(id);
        });
        let _ = self
            .events
            .send(NotificationEvent::Pushed(notification.clone()));
        inner.entries.insert(
            id,
            Entry {
                notification,
                expiry,
            },
        );
        id
    }

    pub fn info(&self, message: impl Into<String>) -> NotificationId {
        self.push(message, Severity::Info)
    }

    pub fn success(&self, message: impl Into<String>) -> NotificationId {
        self.push(message, Severity::Success)
    }

    pub fn error(&self, message: impl Into<String>) -> NotificationId {
        self.push(message, Severity::Error)
    }

    /// Manual dismissal: cancels the automatic one, then runs the two-phase removal.
    pub fn dismiss(&self, id: NotificationId) -> bool {
        let expiry = match self.lock().entries.get_mut(&id) {
            Some(entry) => entry.expiry.take(),
            None => return false,
        };
        if let Some(handle) = expiry {
            handle.abort();
        }
        self.begin_exit(id)
    }

    /// First phase of removal. Returns false if the entry is gone or already exiting.
    pub fn mark_for_removal(&self, id: NotificationId) -> bool {
        let mut inner = self.lock();
        match inner.entries.get_mut(&id) {
            Some(entry) if !entry.notification.exiting => {
                entry.notification.exiting = true;
                let _ = self.events.send(NotificationEvent::Exiting(id));
                true
            }
            _ => false,
        }
    }

    /// Second phase of removal.
    pub fn remove(&self, id: NotificationId) -> bool {
        let removed = self.lock().entries.remove(&id);
        match removed {
            Some(entry) => {
                if let Some(handle) = entry.expiry {
                    handle.abort();
                }
                let _ = self.events.send(NotificationEvent::Removed(id));
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: NotificationId) -> Option<Notification> {
        self.lock()
            .entries
            .get(&id)
            .map(|entry| entry.notification.clone())
    }

    /// Current notifications in insertion order.
    pub fn snapshot(&self) -> Vec<Notification> {
        self.lock()
            .entries
            .values()
            .map(|entry| entry.notification.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    fn begin_exit(&self, id: NotificationId) -> bool {
        if !self.mark_for_removal(id) {
            return false;
        }
        self.schedule(self.grace, move |center| {
            center.remove(id);
        });
        true
    }

    fn schedule<F>(&self, delay: Duration, action: F) -> Option<JoinHandle<()>>
    where
        F: FnOnce(&NotificationCenter) + Send + 'static,
    {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No async runtime; notification timers are disabled");
            return None;
        };
        let center = self.clone();
        Some(handle.spawn(async move {
            sleep(delay).await;
            action(&center);
        }))
    }
}
