pub mod config;
pub mod dispatch;
pub mod email;
pub mod store;
pub mod worker;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
