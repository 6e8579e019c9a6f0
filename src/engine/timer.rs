//! Winner-display timer.
//!
//! At most one timer exists per session. Arming replaces (and aborts) the
//! previous one; dropping the handle aborts the task, so clearing the slot on
//! battle start, reset or disconnect is enough to cancel it. Each arm gets a
//! fresh generation so an expiry that raced with a re-arm is ignored.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::state::session::BattleSession;

/// Pending clear of the round winner.
#[derive(Debug)]
pub struct WinnerTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

impl WinnerTimer {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for WinnerTimer {
    fn drop(&mut self) {
        // No-op if the task already ran past its last await.
        self.handle.abort();
    }
}

/// Arm the session's winner timer, replacing any pending one.
///
/// `on_expire` runs after `delay` with the generation returned here. The task
/// is spawned on `runtime`, falling back to the caller's runtime. Returns
/// `None` when neither is available.
pub fn arm<F>(
    session: &mut BattleSession,
    runtime: Option<&Handle>,
    delay: Duration,
    on_expire: F,
) -> Option<u64>
where
    F: FnOnce(u64) + Send + 'static,
{
    session.winner_timer = None;

    let Some(runtime) = runtime.cloned().or_else(|| Handle::try_current().ok()) else {
        warn!(
            session_id = %session.session_id,
            "no tokio runtime, round winner will not auto-clear"
        );
        return None;
    };

    session.timer_seq += 1;
    let generation = session.timer_seq;
    let handle = runtime.spawn(async move {
        tokio::time::sleep(delay).await;
        on_expire(generation);
    });

    session.winner_timer = Some(WinnerTimer { generation, handle });
    Some(generation)
}

/// Cancel the pending timer. Returns whether one was pending.
pub fn cancel(session: &mut BattleSession) -> bool {
    session.winner_timer.take().is_some()
}

/// Apply an expiry. Clears the round winner only if `generation` is still the
/// armed one.
pub fn expire(session: &mut BattleSession, generation: u64) -> bool {
    match &session.winner_timer {
        Some(timer) if timer.generation == generation => {
            session.winner_timer = None;
            session.round_winner = None;
            true
        }
        _ => false,
    }
}
