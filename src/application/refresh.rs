use crate::application::focus_session::{FocusSession, NowProvider};
use crate::domain::models::Task;
use crate::domain::phase_timer::TimerDisplay;
use crate::domain::time_tracking::{TrackedElapsed, elapsed_snapshot, is_tracking_any};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::time::{MissedTickBehavior, interval};

pub const COUNTDOWN_INTERVAL: Duration = Duration::from_millis(100);
pub const ELAPSED_INTERVAL: Duration = Duration::from_millis(1000);

async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    // A dropped sender also ends the loop.
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Ticks the session every 100 ms and emits the display whenever it changes.
/// Persistence failures are logged and the countdown carries on.
pub async fn run_countdown<F>(
    session: Arc<Mutex<FocusSession>>,
    mut shutdown: watch::Receiver<bool>,
    mut on_display: F,
) where
    F: FnMut(TimerDisplay) + Send,
{
    let mut ticker = interval(COUNTDOWN_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_display = None;

    loop {
        tokio::select! {
            _ = shutdown_requested(&mut shutdown) => break,
            _ = ticker.tick() => {}
        }

        let display = {
            let mut session = session.lock().await;
            if let Err(error) = session.tick().await {
                tracing::warn!(%error, "countdown tick could not persist completion");
            }
            session.display()
        };
        if last_display != Some(display) {
            last_display = Some(display);
            on_display(display);
        }
    }
    tracing::debug!("countdown loop stopped");
}

/// Emits live elapsed time for tracked tasks once per second. While nothing
/// is tracked no timer runs; the loop only wakes on the next task snapshot.
pub async fn run_elapsed_refresh<F>(
    mut tasks: watch::Receiver<Vec<Task>>,
    now: NowProvider,
    mut shutdown: watch::Receiver<bool>,
    mut on_elapsed: F,
) where
    F: FnMut(Vec<TrackedElapsed>) + Send,
{
    let mut ticker = interval(ELAPSED_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut was_tracking = false;

    loop {
        let snapshot = tasks.borrow_and_update().clone();
        let tracking = is_tracking_any(&snapshot);
        if tracking && !was_tracking {
            ticker.reset();
        }
        was_tracking = tracking;
        on_elapsed(elapsed_snapshot(&snapshot, now()));

        tokio::select! {
            _ = shutdown_requested(&mut shutdown) => break,
            changed = tasks.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = ticker.tick(), if tracking => {}
        }
    }
    tracing::debug!("elapsed refresh loop stopped");
}
