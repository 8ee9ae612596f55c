use std::{
    collections::HashSet,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use dashmap::{DashMap, mapref::entry::Entry};
use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::ServiceError,
    state::{
        quiz::QuizDefinition,
        session::{Session, SessionHandle, SessionLimits},
    },
};

/// Join code generation and capacity rules.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    /// Characters join codes are drawn from.
    pub alphabet: Vec<char>,
    /// Join code length.
    pub code_length: usize,
    /// Generation attempts before giving up.
    pub max_attempts: usize,
    /// How long a released code stays unavailable.
    pub grace_period: Duration,
    /// Ceiling on concurrently active sessions.
    pub max_active_sessions: usize,
}

impl From<&AppConfig> for RegistrySettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            alphabet: config.code_alphabet.clone(),
            code_length: config.code_length,
            max_attempts: config.code_max_attempts,
            grace_period: config.code_grace_period,
            max_active_sessions: config.max_active_sessions,
        }
    }
}

/// Maps join codes to live sessions.
///
/// The registry only allocates codes and hands out [`SessionHandle`]s; it never
/// reads or mutates participant data.
pub struct SessionRegistry {
    settings: RegistrySettings,
    codes: DashMap<String, Uuid>,
    sessions: DashMap<Uuid, SessionHandle>,
    reserved: DashMap<String, Instant>,
    active: AtomicUsize,
}

impl SessionRegistry {
    /// Empty registry. The alphabet is upper-cased and de-duplicated so issued
    /// codes always match their normalized form.
    pub fn new(mut settings: RegistrySettings) -> Self {
        let mut seen = HashSet::new();
        settings.alphabet = settings
            .alphabet
            .iter()
            .flat_map(|c| c.to_uppercase())
            .filter(|c| !c.is_whitespace() && seen.insert(*c))
            .collect();
        Self {
            settings,
            codes: DashMap::new(),
            sessions: DashMap::new(),
            reserved: DashMap::new(),
            active: AtomicUsize::new(0),
        }
    }

    /// Create a session in the lobby under a fresh join code.
    pub fn create_session(
        &self,
        quiz: QuizDefinition,
        host_id: String,
        limits: SessionLimits,
    ) -> Result<SessionHandle, ServiceError> {
        self.reserve_slot()?;
        let id = Uuid::new_v4();
        let join_code = match self.allocate_code(id) {
            Ok(code) => code,
            Err(err) => {
                self.active.fetch_sub(1, Ordering::AcqRel);
                return Err(err);
            }
        };

        let handle = SessionHandle::new(Session::new(
            id,
            join_code.clone(),
            host_id,
            quiz,
            limits,
        ));
        self.sessions.insert(id, handle.clone());
        info!(session_id = %id, code = %join_code, "session created");
        Ok(handle)
    }

    /// Find the active session behind a join code.
    pub fn resolve(&self, join_code: &str) -> Result<SessionHandle, ServiceError> {
        let code = normalize_code(join_code);
        let id = self
            .codes
            .get(&code)
            .map(|entry| *entry.value())
            .ok_or_else(|| ServiceError::NotFound(format!("no active session for code `{code}`")))?;
        self.get(id)
    }

    /// Find an active session by id.
    pub fn get(&self, session_id: Uuid) -> Result<SessionHandle, ServiceError> {
        self.sessions
            .get(&session_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ServiceError::NotFound(format!("session `{session_id}` not found")))
    }

    /// Drop an ended session and hold its code back for the grace period.
    pub fn release(&self, session_id: Uuid) {
        let Some((_, handle)) = self.sessions.remove(&session_id) else {
            return;
        };
        let code = handle.join_code().to_owned();
        self.codes.remove(&code);
        self.reserved
            .insert(code.clone(), Instant::now() + self.settings.grace_period);
        self.active.fetch_sub(1, Ordering::AcqRel);
        info!(session_id = %session_id, code = %code, "session released");
    }

    /// Every active session.
    pub fn sessions(&self) -> Vec<SessionHandle> {
        self.sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Number of active sessions.
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    fn reserve_slot(&self) -> Result<(), ServiceError> {
        let max = self.settings.max_active_sessions;
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |active| {
                (active < max).then_some(active + 1)
            })
            .map(|_| ())
            .map_err(|_| {
                ServiceError::CapacityExceeded(format!("at most {max} active sessions allowed"))
            })
    }

    fn allocate_code(&self, session_id: Uuid) -> Result<String, ServiceError> {
        let now = Instant::now();
        self.reserved.retain(|_, until| *until > now);
        if self.settings.alphabet.is_empty() || self.settings.code_length == 0 {
            return Err(ServiceError::CapacityExceeded(
                "join code alphabet is empty".into(),
            ));
        }

        let mut rng = rand::rng();
        for attempt in 1..=self.settings.max_attempts {
            let code = (0..self.settings.code_length)
                .map(|_| {
                    let index = rng.random_range(0..self.settings.alphabet.len());
                    self.settings.alphabet[index]
                })
                .collect::<String>();

            if self.reserved.contains_key(&code) {
                debug!(attempt, code = %code, "join code still in grace period");
                continue;
            }
            match self.codes.entry(code) {
                Entry::Occupied(entry) => {
                    debug!(attempt, code = %entry.key(), "join code collision");
                }
                Entry::Vacant(entry) => {
                    let code = entry.key().clone();
                    entry.insert(session_id);
                    return Ok(code);
                }
            }
        }

        Err(ServiceError::CapacityExceeded(format!(
            "no free join code after {} attempts",
            self.settings.max_attempts
        )))
    }
}

/// Canonical form of a user-typed join code.
pub fn normalize_code(join_code: &str) -> String {
    join_code.trim().to_uppercase()
}
