//! Cancellable repeating tick used by the session watchdog

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

/// Identifies one monitoring run. Ticks from an older run are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MonitorToken(u64);

impl MonitorToken {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Hands out strictly increasing tokens
#[derive(Debug, Default)]
pub struct TokenSource {
    next: AtomicU64,
}

impl TokenSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self) -> MonitorToken {
        MonitorToken(self.next.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// One watchdog period elapsed for the given run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub token: MonitorToken,
}

/// Something that delivers [`Tick`]s for at most one run at a time
pub trait TickSource: Send {
    /// Begin ticking for `token`, replacing any previous run
    fn start(&mut self, token: MonitorToken);

    /// Stop ticking. Calling this while idle is a no-op.
    fn stop(&mut self);

    fn is_running(&self) -> bool;
}

/// Tokio-backed ticker. Each run is a spawned task feeding an mpsc channel;
/// stopping aborts the task.
pub struct RepeatingTimer {
    period: Duration,
    tx: mpsc::UnboundedSender<Tick>,
    task: Option<JoinHandle<()>>,
}

impl RepeatingTimer {
    /// Create a timer and the receiver its ticks arrive on
    pub fn new(period: Duration) -> (Self, mpsc::UnboundedReceiver<Tick>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                period,
                tx,
                task: None,
            },
            rx,
        )
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl TickSource for RepeatingTimer {
    fn start(&mut self, token: MonitorToken) {
        self.stop();

        let tx = self.tx.clone();
        let period = self.period;
        self.task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if tx.send(Tick { token }).is_err() {
                    break;
                }
            }
        }));
        trace!(token = token.value(), "Watchdog timer started");
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            trace!("Watchdog timer stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for RepeatingTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Tick source driven by hand, for tests and embedding hosts that bring
/// their own scheduler. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct ManualTicks {
    current: Arc<Mutex<Option<MonitorToken>>>,
}

impl ManualTicks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The tick that would fire now, if a run is active
    pub fn pending(&self) -> Option<Tick> {
        self.current
            .lock()
            .ok()
            .and_then(|guard| guard.map(|token| Tick { token }))
    }
}

impl TickSource for ManualTicks {
    fn start(&mut self, token: MonitorToken) {
        if let Ok(mut guard) = self.current.lock() {
            *guard = Some(token);
        }
    }

    fn stop(&mut self) {
        if let Ok(mut guard) = self.current.lock() {
            *guard = None;
        }
    }

    fn is_running(&self) -> bool {
        self.pending().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_increase() {
        let source = TokenSource::new();
        let a = source.issue();
        let b = source.issue();
        assert!(b.value() > a.value());
        assert_ne!(a, b);
    }

    #[test]
    fn manual_ticks_follow_start_and_stop() {
        let source = TokenSource::new();
        let mut ticks = ManualTicks::new();
        let observer = ticks.clone();
        assert!(observer.pending().is_none());

        let token = source.issue();
        ticks.start(token);
        assert_eq!(observer.pending(), Some(Tick { token }));

        ticks.stop();
        assert!(!observer.is_running());
        ticks.stop();
    }

    #[tokio::test]
    async fn repeating_timer_delivers_and_cancels() {
        let source = TokenSource::new();
        let (mut timer, mut rx) = RepeatingTimer::new(Duration::from_millis(5));

        let first = source.issue();
        timer.start(first);
        let tick = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tick.token, first);
        assert!(timer.is_running());

        // restarting replaces the run
        let second = source.issue();
        timer.start(second);
        timer.stop();
        assert!(!timer.is_running());

        // drain anything sent before the abort, then expect silence
        while rx.try_recv().is_ok() {}
        let quiet = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(quiet.is_err(), "no ticks after stop");
    }
}
