use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{quiz_store::QuizStore, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Keep a quiz store connected, toggling degraded mode while it is unreachable.
///
/// `connect` is retried with exponential back-off until it yields a store. The
/// installed store is then polled; a failed health check triggers up to
/// [`MAX_RECONNECT_ATTEMPTS`] in-place reconnects before a fresh `connect`.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn QuizStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        let store = match connect().await {
            Ok(store) => store,
            Err(err) => {
                warn!(error = %err, "quiz store connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
                continue;
            }
        };

        state.install_quiz_store(store.clone()).await;
        info!("quiz store connected; leaving degraded mode");
        delay = INITIAL_DELAY;

        while watch_store(&state, store.as_ref()).await {}

        warn!("exhausted quiz store reconnect attempts; staying in degraded mode");
        sleep(delay).await;
        delay = (delay * 2).min(MAX_DELAY);
    }
}

/// Check the store once. Returns `false` when it is lost for good.
async fn watch_store(state: &SharedState, store: &dyn QuizStore) -> bool {
    if store.health_check().await.is_ok() {
        if state.is_degraded() {
            info!("quiz store healthy again; leaving degraded mode");
            state.update_degraded(false);
        }
        sleep(HEALTH_POLL_INTERVAL).await;
        return true;
    }

    let mut backoff = INITIAL_DELAY;
    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "quiz store reconnected after failed health check");
                state.update_degraded(false);
                sleep(HEALTH_POLL_INTERVAL).await;
                return true;
            }
            Err(err) => {
                if attempt == 0 {
                    warn!(attempt, error = %err, "quiz store reconnect failed; entering degraded mode");
                    state.update_degraded(true);
                } else {
                    warn!(attempt, error = %err, "quiz store reconnect failed");
                }
                sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_DELAY);
            }
        }
    }
    false
}
