use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::{self, Instant};
use tracing::debug;

const TICK: Duration = Duration::from_millis(10);

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

struct Entry {
    fire_at: Instant,
    seq: u64,
    job: Job,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.fire_at.cmp(&other.fire_at).then(self.seq.cmp(&other.seq))
    }
}

/// In-process scheduler that stages a `Publish` until its `start_time`.
/// Entries are ephemeral — nothing here survives a process restart, which
/// is an accepted limitation, not a bug (see `DESIGN.md`).
pub struct TimingWheel {
    heap: Mutex<BinaryHeap<Reverse<Entry>>>,
    seq: AtomicU64,
    shutdown: Notify,
}

impl TimingWheel {
    pub fn new() -> Arc<Self> {
        Arc::new(TimingWheel {
            heap: Mutex::new(BinaryHeap::new()),
            seq: AtomicU64::new(0),
            shutdown: Notify::new(),
        })
    }

    /// Schedule `job` to run once, approximately `delay` from now. No
    /// ordering guarantee is made relative to other entries due on the
    /// same tick.
    pub fn schedule<F>(&self, delay: Duration, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let entry = Entry {
            fire_at: Instant::now() + delay,
            seq,
            job: Box::pin(job),
        };
        self.heap.lock().push(Reverse(entry));
    }

    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    /// Run the dispatcher until [`TimingWheel::stop`] is called. Each due
    /// entry is spawned as its own task so a slow job never delays the
    /// next tick.
    pub async fn run(self: Arc<Self>) {
        let mut interval = time::interval(TICK);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.drain_due();
                }
                _ = self.shutdown.notified() => {
                    debug!("timing wheel dispatcher stopped");
                    break;
                }
            }
        }
    }

    fn drain_due(&self) {
        let now = Instant::now();
        let mut heap = self.heap.lock();
        loop {
            match heap.peek() {
                Some(Reverse(entry)) if entry.fire_at <= now => {}
                _ => break,
            }
            let Reverse(entry) = heap.pop().expect("peeked entry must be present");
            tokio::spawn(entry.job);
        }
    }

    pub fn stop(&self) {
        self.shutdown.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[tokio::test(start_paused = true)]
    async fn fires_after_its_delay_not_before() {
        let wheel = TimingWheel::new();
        let fired = Arc::new(AtomicBool::new(false));

        let fired_clone = fired.clone();
        wheel.schedule(Duration::from_millis(50), async move {
            fired_clone.store(true, Ordering::SeqCst);
        });

        let dispatcher = tokio::spawn(wheel.clone().run());

        time::advance(Duration::from_millis(20)).await;
        wheel.drain_due();
        assert!(!fired.load(Ordering::SeqCst));

        time::advance(Duration::from_millis(40)).await;
        wheel.drain_due();
        tokio::task::yield_now().await;
        assert!(fired.load(Ordering::SeqCst));

        wheel.stop();
        let _ = dispatcher.await;
    }
}
