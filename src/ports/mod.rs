//! Port allocation across the fleet

pub mod allocator;
pub mod probe;

pub use allocator::PortAllocator;
pub use probe::{AlwaysFree, OsPortProbe, PortProbe};
