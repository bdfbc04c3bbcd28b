//! TideKV test and validation infrastructure.
//!
//! Property-based suites over the core subsystems, plus an end-to-end
//! scenario harness that drives durable writes through the vBucket
//! facade the way the front end would.

pub mod proptest_durability;
pub mod proptest_manifest;
pub mod scenario;

pub use scenario::TestVBucket;
