pub mod account;
pub mod agents;
pub mod dispatch;
pub mod watch;
