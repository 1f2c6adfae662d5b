//! Cross-thread plumbing between the capture loop and its host.
//!
//! Two primitives live here: [`HandoffQueue`], the latest-wins channel that
//! carries finished images from the capture thread to the host, and
//! [`CaptureSignals`], the pair of binary signals the capture loop blocks on.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// A single-producer/single-consumer channel that only ever holds the newest item.
///
/// Pushing replaces whatever the consumer has not taken yet; the superseded
/// item is dropped on the spot rather than queued. This keeps memory bounded
/// when production outpaces consumption and guarantees the consumer always
/// observes the most recent frame.
pub struct HandoffQueue<T> {
    slot: Mutex<Slot<T>>,
}

struct Slot<T> {
    latest: Option<T>,
    superseded: u64,
}

impl<T> HandoffQueue<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self { slot: Mutex::new(Slot { latest: None, superseded: 0 }) }
    }

    /// Publishes `item`, dropping any not-yet-consumed predecessor.
    pub fn push(&self, item: T) {
        let mut slot = self.slot.lock();
        if slot.latest.replace(item).is_some() {
            slot.superseded += 1;
        }
    }

    /// Takes the newest item, leaving the queue empty.
    pub fn take_latest(&self) -> Option<T> {
        self.slot.lock().latest.take()
    }

    /// Gets the number of items dropped without ever being consumed.
    pub fn superseded(&self) -> u64 {
        self.slot.lock().superseded
    }
}

impl<T> Default for HandoffQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The signal observed by a [`CaptureSignals::wait`] call.
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum Signal {
    /// Shut the capture loop down. Terminal, checked with highest priority.
    Stop,
    /// One capture cycle was requested. Auto-resets on observation.
    Capture,
}

/// The two wake-up sources of the capture loop.
///
/// "Stop" is set once and stays set; "capture requested" auto-resets so that
/// each request wakes exactly one pending wait. A wait that sees both signals
/// always reports [`Signal::Stop`].
pub struct CaptureSignals {
    state: Mutex<SignalState>,
    wakeup: Condvar,
}

#[derive(Default)]
struct SignalState {
    stop: bool,
    capture: bool,
}

impl CaptureSignals {
    #[must_use]
    pub const fn new() -> Self {
        Self { state: Mutex::new(SignalState { stop: false, capture: false }), wakeup: Condvar::new() }
    }

    /// Requests one capture cycle, waking one pending wait.
    ///
    /// Requests raised while no wait is pending coalesce into a single wake.
    pub fn request_capture(&self) {
        self.state.lock().capture = true;
        self.wakeup.notify_one();
    }

    /// Requests shutdown. Preempts pending and future waits; irreversible.
    pub fn request_stop(&self) {
        self.state.lock().stop = true;
        self.wakeup.notify_all();
    }

    /// Whether shutdown has been requested.
    pub fn stop_requested(&self) -> bool {
        self.state.lock().stop
    }

    /// Blocks until either signal fires.
    pub fn wait(&self) -> Signal {
        let mut state = self.state.lock();
        loop {
            if state.stop {
                return Signal::Stop;
            }
            if state.capture {
                state.capture = false;
                return Signal::Capture;
            }
            self.wakeup.wait(&mut state);
        }
    }

    /// Sleeps up to `timeout` unless shutdown is requested first.
    ///
    /// Returns `true` when stop was observed. Used for the not-ready backoff
    /// so a retry delay never outlives a disposal request.
    pub fn stop_within(&self, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        if state.stop {
            return true;
        }
        let _ = self.wakeup.wait_for(&mut state, timeout);
        state.stop
    }
}

impl Default for CaptureSignals {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::{CaptureSignals, HandoffQueue, Signal};

    #[test]
    fn queue_keeps_only_the_newest_item() {
        let queue = HandoffQueue::new();
        for frame in 0..5 {
            queue.push(frame);
        }

        assert_eq!(queue.take_latest(), Some(4));
        assert_eq!(queue.take_latest(), None);
        assert_eq!(queue.superseded(), 4);
    }

    #[test]
    fn queue_drops_superseded_items_not_consumed_ones() {
        let queue = HandoffQueue::new();
        queue.push("a");
        assert_eq!(queue.take_latest(), Some("a"));
        queue.push("b");
        assert_eq!(queue.take_latest(), Some("b"));
        assert_eq!(queue.superseded(), 0);
    }

    #[test]
    fn queue_under_rapid_production_stays_bounded() {
        let queue = Arc::new(HandoffQueue::new());

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for frame in 0..1000u64 {
                    queue.push(frame);
                }
            })
        };
        producer.join().unwrap();

        // A slow consumer arriving late still sees exactly the newest frame.
        assert_eq!(queue.take_latest(), Some(999));
        assert_eq!(queue.take_latest(), None);
        assert_eq!(queue.superseded(), 999);
    }

    #[test]
    fn capture_signal_auto_resets() {
        let signals = CaptureSignals::new();
        signals.request_capture();

        assert_eq!(signals.wait(), Signal::Capture);

        // The flag was consumed; a fresh request is needed for the next wake.
        signals.request_capture();
        assert_eq!(signals.wait(), Signal::Capture);
    }

    #[test]
    fn stop_wins_over_a_pending_capture_request() {
        let signals = CaptureSignals::new();
        signals.request_capture();
        signals.request_stop();

        assert_eq!(signals.wait(), Signal::Stop);
        // Stop is sticky: every later wait observes it too.
        assert_eq!(signals.wait(), Signal::Stop);
    }

    #[test]
    fn stop_preempts_a_blocked_wait() {
        let signals = Arc::new(CaptureSignals::new());

        let waiter = {
            let signals = Arc::clone(&signals);
            thread::spawn(move || signals.wait())
        };

        thread::sleep(Duration::from_millis(50));
        signals.request_stop();

        assert_eq!(waiter.join().unwrap(), Signal::Stop);
    }

    #[test]
    fn stop_within_returns_early_on_stop() {
        let signals = Arc::new(CaptureSignals::new());

        let sleeper = {
            let signals = Arc::clone(&signals);
            thread::spawn(move || signals.stop_within(Duration::from_secs(30)))
        };

        thread::sleep(Duration::from_millis(50));
        signals.request_stop();

        assert!(sleeper.join().unwrap());
    }

    #[test]
    fn stop_within_times_out_quietly_without_stop() {
        let signals = CaptureSignals::new();
        assert!(!signals.stop_within(Duration::from_millis(10)));
    }
}
