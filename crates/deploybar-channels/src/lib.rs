//! `deploybar-channels`: outbound notification sinks and the connectivity signal.

pub mod connectivity;
pub mod sink;

pub use connectivity::{probe, ConnectivityMonitor};
pub use sink::{ChannelSink, CommandSink, GatedSink, LogSink, NotificationSink, SinkSet};
