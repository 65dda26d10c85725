//! Common test utilities for roster-bulk integration tests

pub mod assertions;
pub mod platform;

#[allow(unused_imports)]
pub use assertions::*;
#[allow(unused_imports)]
pub use platform::*;
