use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Default queue depth for channel-backed tails
pub const DEFAULT_TAIL_QUEUE: usize = 1024;

/// A live consumer of relayed lines.
///
/// The relay calls `deliver` from a worker thread dedicated to this
/// subscriber, one line at a time in write order. Blocking only backs up
/// this subscriber's queue; once it is full, new lines are dropped for it.
/// Panics are caught and logged.
pub trait TailSubscriber: Send + Sync {
    fn deliver(&self, id: &str, line: &str);
}

impl<F> TailSubscriber for F
where
    F: Fn(&str, &str) + Send + Sync,
{
    fn deliver(&self, id: &str, line: &str) {
        self(id, line)
    }
}

/// A line delivered to a tail subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailLine {
    /// Identifier the subscriber was registered under
    pub id: String,
    /// The relayed line
    pub line: String,
}

/// Subscriber that forwards lines into a bounded queue.
///
/// When the queue is full the line is dropped for this subscriber only;
/// the writer never waits on the consumer.
#[derive(Clone)]
pub struct ChannelTail {
    sender: mpsc::Sender<TailLine>,
}

impl ChannelTail {
    /// Create a connected tail/stream pair with the given queue depth
    pub fn pair(queue_capacity: usize) -> (Self, TailStream) {
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        (Self { sender }, TailStream { receiver })
    }

    /// Whether the receiving side is still alive
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}

impl TailSubscriber for ChannelTail {
    fn deliver(&self, id: &str, line: &str) {
        let item = TailLine {
            id: id.to_string(),
            line: line.to_string(),
        };

        match self.sender.try_send(item) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!(subscriber = id, "Tail queue full, dropping line");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::trace!(subscriber = id, "Tail receiver dropped");
            }
        }
    }
}

/// Receiving half of a [`ChannelTail`]
pub struct TailStream {
    receiver: mpsc::Receiver<TailLine>,
}

impl TailStream {
    /// Receive the next line
    ///
    /// # Returns
    /// * `Some(TailLine)` - Next relayed line
    /// * `None` - Every sender has been dropped
    pub async fn next(&mut self) -> Option<TailLine> {
        self.receiver.recv().await
    }

    /// Take a queued line without waiting
    pub fn try_next(&mut self) -> Option<TailLine> {
        self.receiver.try_recv().ok()
    }
}
