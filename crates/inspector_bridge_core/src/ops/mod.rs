//! Domain commands layered over [`CdpSession`](crate::CdpSession).

pub mod debugger;
pub mod heap;
pub mod profiler;
