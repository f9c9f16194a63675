use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::logs::fanout::TailWorker;
use crate::logs::history::HistoryRing;
use crate::logs::sink::{FileSinkFactory, LogSink, SinkFactory};
use crate::logs::subscriber::{TailSubscriber, DEFAULT_TAIL_QUEUE};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread;
use std::time::{Duration, Instant};

/// Number of recent lines kept for replay
pub const DEFAULT_CAPACITY: usize = 100;

type Subscribers = HashMap<String, TailWorker>;

/// In-process relay for a supervised process's output.
///
/// Every written record is kept in a bounded history, queued for each
/// registered tail subscriber and then forwarded to the optional sink.
/// Subscribers are called from their own worker thread, never from the
/// writer, so a blocked or panicking subscriber cannot stall `write` or
/// starve other subscribers.
///
/// A write holds the subscriber map shared and the ordering lock while it
/// claims a history slot and enqueues the line, so every subscriber queue
/// receives lines in history order. `register` holds the map exclusively
/// from history snapshot to insertion, which makes replay-then-live a single
/// step: a new subscriber gets each line exactly once, replayed or live.
pub struct LogRelay {
    history: HistoryRing,
    subscribers: RwLock<Subscribers>,
    /// Serializes slot claim with enqueueing across concurrent writers
    ordering: Mutex<()>,
    /// Live queue depth per subscriber, on top of its replay
    tail_queue: usize,
    sink: Mutex<Option<Box<dyn LogSink>>>,
    /// Whether a sink was configured at construction
    had_sink: bool,
    closed: AtomicBool,
}

impl LogRelay {
    /// Create a relay with the default capacity and a plain file sink
    ///
    /// # Arguments
    /// * `destination` - Path of the durable log file, empty for none
    ///
    /// # Returns
    /// * `Ok(LogRelay)` - Relay ready for writes
    /// * `Err(RelayError::SinkInitError)` - The destination could not be opened
    pub fn new(destination: &str) -> Result<Self> {
        Self::with_factory(destination, DEFAULT_CAPACITY, &FileSinkFactory::default())
    }

    /// Create a relay from a loaded configuration
    pub fn from_config(config: &RelayConfig) -> Result<Self> {
        config.validate()?;
        let relay =
            Self::with_factory(&config.destination, config.capacity, &config.sink_factory())?;
        Ok(relay.with_tail_queue(config.tail_queue))
    }

    /// Create a relay resolving `destination` through `factory`
    ///
    /// # Arguments
    /// * `destination` - Sink descriptor handed to the factory, empty for none
    /// * `capacity` - Number of recent lines kept for replay (at least 1)
    /// * `factory` - Opens the sink before any write happens
    pub fn with_factory<F>(destination: &str, capacity: usize, factory: &F) -> Result<Self>
    where
        F: SinkFactory + ?Sized,
    {
        if capacity == 0 {
            return Err(RelayError::ConfigValidationError(
                "capacity must be at least 1".to_string(),
            ));
        }

        let sink = if destination.is_empty() {
            None
        } else {
            let sink = factory.open(destination)?;
            tracing::info!("Opened log sink {}", destination);
            Some(sink)
        };

        Ok(Self {
            history: HistoryRing::new(capacity),
            subscribers: RwLock::new(HashMap::new()),
            ordering: Mutex::new(()),
            tail_queue: DEFAULT_TAIL_QUEUE,
            had_sink: sink.is_some(),
            sink: Mutex::new(sink),
            closed: AtomicBool::new(false),
        })
    }

    /// Set how many live lines each subscriber may have queued before
    /// further lines are dropped for it
    pub fn with_tail_queue(mut self, tail_queue: usize) -> Self {
        self.tail_queue = tail_queue.max(1);
        self
    }

    /// Record one line, queue it for all subscribers, then forward it to the sink.
    ///
    /// The bytes are one record regardless of embedded newlines. Delivery
    /// happens on each subscriber's worker, so this never waits on a
    /// subscriber. Only sink failures surface here, and by then the history
    /// and enqueueing have already happened.
    ///
    /// # Returns
    /// * `Ok(n)` - Number of bytes accepted
    /// * `Err(RelayError::SinkWriteError)` - The sink rejected the bytes
    /// * `Err(RelayError::SinkClosed)` - The relay was closed while holding a sink
    pub fn write(&self, bytes: &[u8]) -> Result<usize> {
        let line: Arc<str> = Arc::from(String::from_utf8_lossy(bytes));

        {
            let subscribers = self.read_subscribers();
            let _ordering = self.ordering.lock().unwrap_or_else(PoisonError::into_inner);
            let seq = self.history.push(line.to_string());
            tracing::trace!(seq, subscribers = subscribers.len(), "Relaying line");

            for (id, worker) in subscribers.iter() {
                worker.enqueue(id, &line);
            }
        }

        self.forward_to_sink(bytes)
    }

    /// Attach `subscriber` under `id`, replaying up to `lines` recent lines first.
    ///
    /// Any earlier subscriber with the same id is replaced. Replay is oldest
    /// first and clamped to the history capacity. Replayed lines are queued
    /// ahead of every later write, so the subscriber sees them first and
    /// then each subsequent line. Delivery is asynchronous; see
    /// [`LogRelay::flush_tails`].
    ///
    /// # Returns
    /// * `Ok(())` - Subscriber is live
    /// * `Err(RelayError::RelayClosed)` - The relay has been closed
    /// * `Err(RelayError::Io)` - The delivery worker could not be started
    pub fn register<S>(&self, id: impl Into<String>, subscriber: S, lines: usize) -> Result<()>
    where
        S: TailSubscriber + 'static,
    {
        self.register_shared(id, Arc::new(subscriber), lines)
    }

    /// Same as [`LogRelay::register`] for an already shared subscriber
    pub fn register_shared(
        &self,
        id: impl Into<String>,
        subscriber: Arc<dyn TailSubscriber>,
        lines: usize,
    ) -> Result<()> {
        if self.is_closed() {
            return Err(RelayError::RelayClosed);
        }

        let id = id.into();
        let mut subscribers = self.write_subscribers();

        let replay = self.history.recent(lines.min(self.history.capacity()));
        let worker = TailWorker::spawn(&id, subscriber, self.tail_queue + replay.len())?;
        for line in replay.iter() {
            worker.enqueue(&id, &Arc::from(line.as_str()));
        }

        tracing::debug!(subscriber = %id, replayed = replay.len(), "Registered tail");
        subscribers.insert(id, worker);
        Ok(())
    }

    /// Detach the subscriber registered under `id`.
    ///
    /// Lines already queued for it may still be delivered; later writes are
    /// not. Returns whether a subscriber was removed; unknown ids are ignored.
    pub fn unregister(&self, id: &str) -> bool {
        let removed = self.write_subscribers().remove(id).is_some();
        if removed {
            tracing::debug!(subscriber = id, "Unregistered tail");
        }
        removed
    }

    /// Wait until every registered subscriber has been handed all queued lines.
    ///
    /// Returns false if `timeout` elapsed first, e.g. because a subscriber
    /// is blocked.
    pub fn flush_tails(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let pending: usize = self.read_subscribers().values().map(TailWorker::pending).sum();
            if pending == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Close the sink, if any. Further registrations are refused.
    ///
    /// The sink is released even when closing it fails, so calling this
    /// again is a no-op.
    pub fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);

        let Some(mut sink) = self.lock_sink().take() else {
            return Ok(());
        };

        sink.close()
            .map_err(|e| RelayError::CloseError(e.to_string()))?;
        tracing::info!("Closed log sink");
        Ok(())
    }

    /// Get the number of lines kept for replay
    pub fn capacity(&self) -> usize {
        self.history.capacity()
    }

    /// Get the total number of records ever written
    pub fn write_count(&self) -> u64 {
        self.history.write_count()
    }

    /// Retained lines, oldest first
    pub fn history(&self) -> Vec<String> {
        self.history.snapshot()
    }

    pub fn subscriber_count(&self) -> usize {
        self.read_subscribers().len()
    }

    pub fn is_subscribed(&self, id: &str) -> bool {
        self.read_subscribers().contains_key(id)
    }

    /// Whether a sink is currently attached
    pub fn has_sink(&self) -> bool {
        self.lock_sink().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn forward_to_sink(&self, bytes: &[u8]) -> Result<usize> {
        let mut sink = self.lock_sink();
        match sink.as_mut() {
            Some(sink) => sink.write(bytes).map_err(|e| {
                tracing::warn!("Failed to write to log sink: {}", e);
                RelayError::SinkWriteError(e.to_string())
            }),
            None if self.had_sink => Err(RelayError::SinkClosed),
            None => Ok(bytes.len()),
        }
    }

    fn read_subscribers(&self) -> RwLockReadGuard<'_, Subscribers> {
        self.subscribers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_subscribers(&self) -> RwLockWriteGuard<'_, Subscribers> {
        self.subscribers.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_sink(&self) -> MutexGuard<'_, Option<Box<dyn LogSink>>> {
        self.sink.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl io::Write for &LogRelay {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        LogRelay::write(*self, buf).map_err(|e| match e {
            RelayError::Io(e) => e,
            RelayError::SinkClosed => io::Error::new(io::ErrorKind::BrokenPipe, e.to_string()),
            other => io::Error::new(io::ErrorKind::Other, other.to_string()),
        })
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Write for LogRelay {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::Write::write(&mut &*self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
