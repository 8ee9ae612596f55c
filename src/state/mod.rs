pub mod connections;
pub mod leaderboard;
pub mod quiz;
pub mod registry;
pub mod round;
pub mod session;
pub mod state_machine;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig,
    dao::quiz_store::QuizStore,
    state::{
        connections::ConnectionManager,
        registry::{RegistrySettings, SessionRegistry},
    },
};

pub type SharedState = Arc<AppState>;

/// Central application state: configuration, live sessions, sockets and the quiz store.
pub struct AppState {
    config: AppConfig,
    registry: SessionRegistry,
    connections: ConnectionManager,
    quiz_store: RwLock<Option<Arc<dyn QuizStore>>>,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a quiz store is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            registry: SessionRegistry::new(RegistrySettings::from(&config)),
            connections: ConnectionManager::new(),
            config,
            quiz_store: RwLock::new(None),
            degraded: degraded_tx,
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Join code to session mapping.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Attached sockets per session.
    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    /// Obtain a handle to the current quiz store, if one is installed.
    pub async fn quiz_store(&self) -> Option<Arc<dyn QuizStore>> {
        let guard = self.quiz_store.read().await;
        guard.as_ref().cloned()
    }

    /// Install a new quiz store implementation and leave degraded mode.
    pub async fn install_quiz_store(&self, store: Arc<dyn QuizStore>) {
        {
            let mut guard = self.quiz_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }
}
