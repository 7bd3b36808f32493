//! Per-session conversation store with a bounded transcript.
//!
//! Each session owns one [`Conversation`] whose first message is always the
//! system prompt. After every assistant turn the [`TruncationPolicy`] drops
//! the oldest turns once the transcript exceeds its threshold; the system
//! message is never evicted.
//!
//! The store is an explicit, cloneable handle over
//! `Arc<RwLock<HashMap<SessionId, _>>>`. Sessions never share state, and a
//! session's conversation expires once it has been idle for the configured
//! timeout or is evicted to keep the map within `max_sessions`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

use crate::error::AppError;
use crate::llm::{Message, Role};

// ── SessionId ─────────────────────────────────────────────────────────────────

/// Opaque client identity keying one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── TruncationPolicy ──────────────────────────────────────────────────────────

/// Once a transcript holds more than `threshold` messages, keep message 0
/// plus the most recent `keep` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TruncationPolicy {
    threshold: usize,
    keep: usize,
}

impl TruncationPolicy {
    /// `keep < threshold` guarantees a truncated transcript never exceeds
    /// the threshold.
    pub fn new(threshold: usize, keep: usize) -> Result<Self, AppError> {
        if threshold == 0 {
            return Err(AppError::Config("truncation threshold must be at least 1".into()));
        }
        if keep >= threshold {
            return Err(AppError::Config(format!(
                "truncation keep ({keep}) must be smaller than threshold ({threshold})"
            )));
        }
        Ok(Self { threshold, keep })
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn keep(&self) -> usize {
        self.keep
    }

    /// Drop the contiguous block `1..len-keep` when `len > threshold`.
    /// Returns the number of messages removed.
    pub fn apply(&self, messages: &mut Vec<Message>) -> usize {
        let len = messages.len();
        if len <= self.threshold {
            return 0;
        }
        let end = len - self.keep;
        messages.drain(1..end);
        end - 1
    }
}

impl Default for TruncationPolicy {
    fn default() -> Self {
        Self { threshold: 20, keep: 19 }
    }
}

// ── Conversation ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    fn seeded(system_prompt: &str) -> Self {
        Self { messages: vec![Message::system(system_prompt)] }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The leading system message, if present.
    pub fn system(&self) -> Option<&Message> {
        self.messages.first().filter(|m| m.role == Role::System)
    }
}

// ── SessionLimits ─────────────────────────────────────────────────────────────

/// How long an untouched session lives, and how many may be live at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    idle_timeout: Duration,
    max_sessions: usize,
}

impl SessionLimits {
    pub fn new(idle_timeout: Duration, max_sessions: usize) -> Result<Self, AppError> {
        if idle_timeout.is_zero() {
            return Err(AppError::Config("session idle timeout must be at least 1 second".into()));
        }
        if max_sessions == 0 {
            return Err(AppError::Config("max_sessions must be at least 1".into()));
        }
        Ok(Self { idle_timeout, max_sessions })
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self { idle_timeout: Duration::from_secs(3600), max_sessions: 10_000 }
    }
}

// ── ConversationStore ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Entry {
    conversation: Conversation,
    last_access: Instant,
}

/// Shared conversation store. Clone freely: clones share the same map.
///
/// Sessions idle for longer than [`SessionLimits::idle_timeout`] are treated
/// as absent and swept whenever a new session is admitted. If the map is
/// still full after the sweep, the least recently used session is evicted.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    inner: Arc<RwLock<HashMap<SessionId, Entry>>>,
    system_prompt: Arc<str>,
    policy: TruncationPolicy,
    limits: SessionLimits,
}

impl ConversationStore {
    pub fn new(system_prompt: impl Into<Arc<str>>, policy: TruncationPolicy) -> Self {
        Self {
            inner: Arc::default(),
            system_prompt: system_prompt.into(),
            policy,
            limits: SessionLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: SessionLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn is_idle(&self, entry: &Entry, now: Instant) -> bool {
        now.duration_since(entry.last_access) >= self.limits.idle_timeout
    }

    /// Live entry for `session`, creating it (or replacing an expired one) as needed.
    fn entry<'a>(&self, map: &'a mut HashMap<SessionId, Entry>, session: &SessionId, now: Instant) -> &'a mut Entry {
        if map.get(session).is_some_and(|e| self.is_idle(e, now)) {
            map.remove(session);
        }
        if !map.contains_key(session) {
            self.make_room(map, now);
            debug!(%session, "conversation created");
        }
        let entry = map.entry(session.clone()).or_insert_with(|| Entry {
            conversation: Conversation::seeded(&self.system_prompt),
            last_access: now,
        });
        entry.last_access = now;
        entry
    }

    /// Drop idle sessions, then least recently used ones until one slot is free.
    fn make_room(&self, map: &mut HashMap<SessionId, Entry>, now: Instant) {
        let before = map.len();
        map.retain(|_, e| !self.is_idle(e, now));
        let expired = before - map.len();

        let mut evicted = 0usize;
        while map.len() >= self.limits.max_sessions {
            let Some(oldest) = map
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            map.remove(&oldest);
            evicted += 1;
        }

        if expired + evicted > 0 {
            debug!(expired, evicted, live = map.len(), "sessions evicted");
        }
    }

    /// Snapshot of the session's conversation, creating it if absent.
    pub async fn get_or_create(&self, session: &SessionId) -> Conversation {
        let now = Instant::now();
        let mut map = self.inner.write().await;
        self.entry(&mut map, session, now).conversation.clone()
    }

    /// Append `message` and return the updated snapshot. Creates the
    /// conversation when the session is new or has expired.
    pub async fn append(&self, session: &SessionId, message: Message) -> Conversation {
        let now = Instant::now();
        let mut map = self.inner.write().await;
        let entry = self.entry(&mut map, session, now);
        entry.conversation.messages.push(message);
        entry.conversation.clone()
    }

    /// Apply the truncation policy. Returns the number of messages dropped.
    pub async fn truncate(&self, session: &SessionId) -> usize {
        let mut map = self.inner.write().await;
        let Some(entry) = map.get_mut(session) else {
            return 0;
        };
        let dropped = self.policy.apply(&mut entry.conversation.messages);
        if dropped > 0 {
            debug!(%session, dropped, remaining = entry.conversation.len(), "conversation truncated");
        }
        dropped
    }

    /// Replace the conversation with a fresh single system message.
    pub async fn reset(&self, session: &SessionId) {
        let now = Instant::now();
        let mut map = self.inner.write().await;
        let entry = self.entry(&mut map, session, now);
        entry.conversation = Conversation::seeded(&self.system_prompt);
        debug!(%session, "conversation reset");
    }

    /// Current snapshot without creating one. Expired sessions read as absent.
    pub async fn get(&self, session: &SessionId) -> Option<Conversation> {
        let now = Instant::now();
        self.inner
            .read()
            .await
            .get(session)
            .filter(|e| !self.is_idle(e, now))
            .map(|e| e.conversation.clone())
    }

    /// Number of sessions currently held, expired ones included until swept.
    pub async fn session_count(&self) -> usize {
        self.inner.read().await.len()
    }
}
