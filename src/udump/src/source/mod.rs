//! Memory source abstraction
//!
//! Core abstractions for reading memory out of a foreign process image:
//! - `MemorySource` - trait over anything addressable (dump file, mock)
//! - `DumpSource` - raw memory dump mapped at a base address
//! - Mock sources for testing

mod dump;
mod mock;
mod traits;

pub use dump::DumpSource;
pub use mock::MockMemorySource;
pub use traits::{MemoryError, MemorySource};
