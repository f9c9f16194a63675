// Logs module - Output relay, history replay and durable sinks

mod capture;
mod fanout;
mod history;
mod relay;
mod sink;
mod subscriber;

pub use capture::{capture_output, relay_lines, CaptureHandle};
pub use history::HistoryRing;
pub use relay::{LogRelay, DEFAULT_CAPACITY};
pub use sink::{FileSink, FileSinkFactory, LogSink, Rotation, SinkFactory};
pub use subscriber::{ChannelTail, TailLine, TailStream, TailSubscriber, DEFAULT_TAIL_QUEUE};
