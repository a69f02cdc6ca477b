//! Embassy async tasks

pub mod heartbeat;

pub use heartbeat::heartbeat_task;
