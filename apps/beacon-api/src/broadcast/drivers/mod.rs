pub mod log;
pub mod null;
pub mod poll;
pub mod redis;

pub use log::LogBroadcaster;
pub use null::NullBroadcaster;
pub use poll::PollBroadcaster;
pub use redis::RedisBroadcaster;
