//! Character-by-character reveal of a reply that is already fully known.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

pub const REVEAL_PERIOD: Duration = Duration::from_millis(10);

/// Cumulative prefixes of `text`, each one character longer than the last,
/// ending with `text` itself. An empty string yields a single empty frame.
pub fn prefixes(text: &str) -> impl Iterator<Item = &str> + '_ {
    text.char_indices()
        .skip(1)
        .map(move |(i, _)| &text[..i])
        .chain(std::iter::once(text))
}

#[derive(Debug, Clone, Copy)]
pub struct RevealAnimator {
    period: Duration,
}

impl Default for RevealAnimator {
    fn default() -> Self {
        Self::new(REVEAL_PERIOD)
    }
}

impl RevealAnimator {
    pub fn new(period: Duration) -> Self {
        RevealAnimator { period }
    }

    /// Spawn the ticking task. `on_frame` receives every prefix in ascending
    /// length order; the second argument is true on the final frame.
    pub fn start<F>(&self, full_text: String, mut on_frame: F) -> RevealHandle
    where
        F: FnMut(&str, bool) + Send + 'static,
    {
        let period = self.period;
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let mut frames = prefixes(&full_text).peekable();
            while let Some(frame) = frames.next() {
                ticker.tick().await;
                let done = frames.peek().is_none();
                on_frame(frame, done);
            }
        });

        RevealHandle { task }
    }
}

/// Owner of a running reveal. Dropping it detaches the task; `abort` stops it.
#[derive(Debug)]
pub struct RevealHandle {
    task: JoinHandle<()>,
}

impl RevealHandle {
    pub fn abort(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
