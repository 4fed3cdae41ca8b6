//! Inspector Bridge Core
//!
//! An async client for the remote-inspection (DevTools) protocol spoken by
//! V8-based script runtimes, plus in-memory models for the profiling artifacts
//! it produces: heap snapshots, CPU profiles, and snapshot diffs.

pub mod blocking;
pub mod config;
pub mod cpu;
pub mod diff;
pub mod error;
pub mod events;
pub mod heap;
pub mod ops;
pub mod protocol;
pub mod session;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use blocking::BlockingCdpSession;
pub use config::CdpConfig;
pub use cpu::CpuProfile;
pub use error::CdpError;
pub use heap::HeapSnapshot;
pub use session::CdpSession;

/// Result type alias using CdpError
pub type Result<T> = std::result::Result<T, CdpError>;
