use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::{Condvar, Mutex};

use crate::models::error::StartFailure;
use crate::models::sample::{AudioSample, AudioSampleCallback};
use crate::processing::ring_buffer::RingBuffer;

/// Counters for one queue's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueStats {
    /// Batches accepted by `push`.
    pub pushed: u64,
    /// Batches handed to the callback.
    pub delivered: u64,
    /// Batches evicted by drop-oldest overflow.
    pub dropped: u64,
    /// Batches refused because the queue was closed.
    pub rejected: u64,
}

struct QueueInner {
    ring: RingBuffer<AudioSample>,
    closed: bool,
    // Set once the delivery thread has exited; nothing is delivered after.
    flushed: bool,
    last_timestamp: Option<f64>,
}

struct QueueShared {
    inner: Mutex<QueueInner>,
    ready: Condvar,
    done: Condvar,
    // Held for a whole drain pass so concurrent drains cannot interleave.
    delivery: Mutex<()>,
    callback: AudioSampleCallback,
    pushed: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    rejected: AtomicU64,
}

impl QueueShared {
    fn drain(&self) -> usize {
        let _delivery = self.delivery.lock();
        let mut count = 0;
        loop {
            let next = self.inner.lock().ring.pop();
            let Some(sample) = next else {
                break;
            };
            (self.callback)(sample);
            self.delivered.fetch_add(1, Ordering::Relaxed);
            count += 1;
        }
        count
    }

    fn consume(&self) {
        loop {
            {
                let mut inner = self.inner.lock();
                while inner.ring.is_empty() && !inner.closed {
                    self.ready.wait(&mut inner);
                }
                if inner.ring.is_empty() && inner.closed {
                    return;
                }
            }
            self.drain();
        }
    }
}

/// Marks the queue flushed when the delivery thread exits, panicking or not.
struct ConsumerExit(Arc<QueueShared>);

impl Drop for ConsumerExit {
    fn drop(&mut self) {
        self.0.inner.lock().flushed = true;
        self.0.done.notify_all();
    }
}

/// Bounded single-producer/single-consumer hand-off between the platform
/// audio thread and the caller's callback.
///
/// `push` never blocks on the consumer: when the ring is full the oldest
/// queued batch is evicted and counted in [`QueueStats::dropped`].
/// `close` is a barrier: every batch accepted before it is delivered before
/// it returns, and every `push` after it is refused.
pub struct AudioSampleQueue {
    shared: Arc<QueueShared>,
    consumer: Mutex<Option<thread::JoinHandle<()>>>,
    consumer_id: Mutex<Option<thread::ThreadId>>,
    consumer_spawned: AtomicBool,
}

impl AudioSampleQueue {
    pub fn new(capacity: usize, callback: AudioSampleCallback) -> Self {
        Self {
            shared: Arc::new(QueueShared {
                inner: Mutex::new(QueueInner {
                    ring: RingBuffer::new(capacity),
                    closed: false,
                    flushed: false,
                    last_timestamp: None,
                }),
                ready: Condvar::new(),
                done: Condvar::new(),
                delivery: Mutex::new(()),
                callback,
                pushed: AtomicU64::new(0),
                delivered: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                rejected: AtomicU64::new(0),
            }),
            consumer: Mutex::new(None),
            consumer_id: Mutex::new(None),
            consumer_spawned: AtomicBool::new(false),
        }
    }

    /// Spawn the delivery thread that drains the queue as batches arrive.
    pub fn start_consumer(&self) -> Result<(), StartFailure> {
        let mut consumer = self.consumer.lock();
        if self.consumer_spawned.load(Ordering::SeqCst) {
            return Ok(());
        }
        let exit = ConsumerExit(Arc::clone(&self.shared));
        let handle = thread::Builder::new()
            .name("audio-delivery".into())
            .spawn(move || exit.0.consume())
            .map_err(|e| {
                log::error!("Failed to spawn delivery thread: {}", e);
                StartFailure::Spawn("audio-delivery".into())
            })?;
        *self.consumer_id.lock() = Some(handle.thread().id());
        *consumer = Some(handle);
        self.consumer_spawned.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Enqueue a batch. Returns `false` if the queue is closed.
    pub fn push(&self, sample: AudioSample) -> bool {
        let mut inner = self.shared.inner.lock();
        if inner.closed {
            self.shared.rejected.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        if let Some(last) = inner.last_timestamp {
            if sample.timestamp() < last {
                log::warn!(
                    "Backend delivered out-of-order batch: {:.6}s after {:.6}s",
                    sample.timestamp(),
                    last
                );
            }
        }
        inner.last_timestamp = Some(sample.timestamp());

        let evicted = inner.ring.push(sample);
        drop(inner);

        self.shared.pushed.fetch_add(1, Ordering::Relaxed);
        if evicted.is_some() {
            let dropped = self.shared.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped == 1 || dropped % 1000 == 0 {
                log::warn!("Consumer is behind; dropped {} audio batches so far", dropped);
            }
        }
        self.shared.ready.notify_one();
        true
    }

    /// Deliver every queued batch to the callback, oldest first.
    ///
    /// Returns the number of batches delivered by this call.
    pub fn drain(&self) -> usize {
        self.shared.drain()
    }

    /// Refuse further pushes and flush what is already queued.
    ///
    /// Every caller returns only once the flush is complete, whether it
    /// joins the delivery thread itself or another closer does. Called from
    /// inside the callback it returns at once and the in-progress drain
    /// finishes the flush. Without a delivery thread the flush runs on the
    /// calling thread.
    pub fn close(&self) {
        {
            let mut inner = self.shared.inner.lock();
            inner.closed = true;
        }
        self.shared.ready.notify_all();

        if self.on_delivery_thread() {
            return;
        }

        let handle = self.consumer.lock().take();
        match handle {
            Some(handle) => {
                if handle.join().is_err() {
                    log::error!("Audio delivery thread panicked");
                }
            }
            None if !self.consumer_spawned.load(Ordering::SeqCst) => {
                self.shared.drain();
            }
            None => self.wait_flushed(),
        }
    }

    fn wait_flushed(&self) {
        let mut inner = self.shared.inner.lock();
        while !inner.flushed {
            self.shared.done.wait(&mut inner);
        }
    }

    /// True when called from this queue's delivery thread, i.e. from
    /// inside the callback.
    pub fn on_delivery_thread(&self) -> bool {
        *self.consumer_id.lock() == Some(thread::current().id())
    }

    pub fn is_closed(&self) -> bool {
        self.shared.inner.lock().closed
    }

    /// Batches queued but not yet delivered.
    pub fn len(&self) -> usize {
        self.shared.inner.lock().ring.count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.inner.lock().ring.capacity()
    }

    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pushed: self.shared.pushed.load(Ordering::Relaxed),
            delivered: self.shared.delivered.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
            rejected: self.shared.rejected.load(Ordering::Relaxed),
        }
    }
}

impl Drop for AudioSampleQueue {
    fn drop(&mut self) {
        if self.consumer.get_mut().is_some() {
            self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    fn sample(timestamp: f64) -> AudioSample {
        AudioSample::new(vec![timestamp as f32; 2], 48000, 2, timestamp).unwrap()
    }

    fn recording_queue(capacity: usize) -> (AudioSampleQueue, Arc<Mutex<Vec<f64>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let queue = AudioSampleQueue::new(
            capacity,
            Arc::new(move |s: AudioSample| sink.lock().push(s.timestamp())),
        );
        (queue, seen)
    }

    #[test]
    fn drain_preserves_arrival_order() {
        let (queue, seen) = recording_queue(8);
        for t in [1.0, 2.0, 3.0] {
            assert!(queue.push(sample(t)));
        }
        assert_eq!(queue.drain(), 3);
        assert_eq!(*seen.lock(), vec![1.0, 2.0, 3.0]);
        assert_eq!(queue.drain(), 0);

        let stats = queue.stats();
        assert_eq!(stats.pushed, 3);
        assert_eq!(stats.delivered, 3);
        assert_eq!(stats.dropped, 0);
    }

    #[test]
    fn overflow_drops_oldest_and_keeps_order() {
        let (queue, seen) = recording_queue(3);
        let mut last_dropped = 0;
        for t in 1..=10 {
            queue.push(sample(t as f64));
            if t > 3 {
                assert!(queue.dropped() > last_dropped);
                last_dropped = queue.dropped();
            }
        }
        queue.drain();

        assert_eq!(queue.dropped(), 7);
        assert_eq!(*seen.lock(), vec![8.0, 9.0, 10.0]);
    }

    #[test]
    fn close_flushes_and_rejects_later_pushes() {
        let (queue, seen) = recording_queue(8);
        queue.push(sample(1.0));
        queue.push(sample(2.0));
        queue.close();

        assert_eq!(*seen.lock(), vec![1.0, 2.0]);
        assert!(queue.is_closed());
        assert!(!queue.push(sample(3.0)));
        assert_eq!(queue.stats().rejected, 1);
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn consumer_thread_delivers_in_order() {
        let (tx, rx) = mpsc::channel();
        let queue = AudioSampleQueue::new(
            256,
            Arc::new(move |s: AudioSample| {
                let _ = tx.send(s.timestamp());
            }),
        );
        queue.start_consumer().unwrap();
        for t in 0..100 {
            queue.push(sample(t as f64));
        }

        let received: Vec<f64> = (0..100)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        let expected: Vec<f64> = (0..100).map(|t| t as f64).collect();
        assert_eq!(received, expected);
        queue.close();
    }

    #[test]
    fn close_joins_consumer_after_flush() {
        let (queue, seen) = recording_queue(64);
        queue.start_consumer().unwrap();
        for t in 0..50 {
            queue.push(sample(t as f64));
        }
        queue.close();

        let seen = seen.lock();
        assert_eq!(seen.len(), 50);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert!(queue.is_empty());
    }

    #[test]
    fn slow_consumer_sees_ordered_subsequence() {
        let (tx, rx) = mpsc::channel();
        let queue = AudioSampleQueue::new(
            4,
            Arc::new(move |s: AudioSample| {
                std::thread::sleep(Duration::from_millis(2));
                let _ = tx.send(s.timestamp());
            }),
        );
        queue.start_consumer().unwrap();
        for t in 0..200 {
            queue.push(sample(t as f64));
        }
        queue.close();

        let received: Vec<f64> = rx.try_iter().collect();
        assert!(queue.dropped() > 0);
        assert_eq!(received.len() as u64 + queue.dropped(), 200);
        assert!(received.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(received.last().copied(), Some(199.0));
    }

    #[test]
    fn callback_runs_on_delivery_thread() {
        let (tx, rx) = mpsc::channel();
        let queue = AudioSampleQueue::new(
            4,
            Arc::new(move |_: AudioSample| {
                let name = thread::current().name().map(str::to_owned);
                let _ = tx.send(name);
            }),
        );
        queue.start_consumer().unwrap();
        queue.push(sample(0.0));

        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some("audio-delivery"));
        assert!(!queue.on_delivery_thread());
        queue.close();
    }

    #[test]
    fn every_closer_waits_for_the_flush() {
        let delivered = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&delivered);
        let queue = Arc::new(AudioSampleQueue::new(
            32,
            Arc::new(move |_: AudioSample| {
                thread::sleep(Duration::from_millis(10));
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        ));
        queue.start_consumer().unwrap();
        for t in 0..20 {
            queue.push(sample(t as f64));
        }

        let first = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.close())
        };
        thread::sleep(Duration::from_millis(5));
        queue.close();

        assert_eq!(delivered.load(Ordering::SeqCst), 20);
        first.join().unwrap();
        assert_eq!(delivered.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn close_from_callback_returns_without_joining() {
        let (tx, rx) = mpsc::channel();
        let slot: Arc<Mutex<Option<Arc<AudioSampleQueue>>>> = Arc::new(Mutex::new(None));
        let cb_slot = Arc::clone(&slot);
        let queue = Arc::new(AudioSampleQueue::new(
            8,
            Arc::new(move |s: AudioSample| {
                let queue = cb_slot.lock().clone();
                if let Some(queue) = queue {
                    queue.close();
                }
                let _ = tx.send(s.timestamp());
            }),
        ));
        *slot.lock() = Some(Arc::clone(&queue));
        queue.start_consumer().unwrap();
        queue.push(sample(1.0));

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1.0);
        assert!(queue.is_closed());
        assert!(!queue.push(sample(2.0)));
        *slot.lock() = None;
        queue.close();
    }

    #[test]
    fn close_twice_is_harmless() {
        let (queue, _) = recording_queue(4);
        queue.start_consumer().unwrap();
        queue.close();
        queue.close();
        assert!(queue.is_closed());
    }
}
