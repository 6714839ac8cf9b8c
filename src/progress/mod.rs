//! Progress reporting for analysis requests

mod channel;
mod handler;
mod logging;

pub use channel::ChannelHandler;
pub use handler::{scaled, NoOpHandler, ProgressEvent, ProgressHandler, ProgressReporter};
pub use logging::LoggingHandler;
