//! # Instrumented allocation and array layout for a language runtime
//!
//! Every dynamic allocation made by compiled programs and runtime support
//! code goes through one facade that can, independently:
//!
//! 1. **Track**: keep an address-keyed directory of live blocks, in
//!    allocation order
//! 2. **Count**: keep live and peak byte totals, optionally under a ceiling
//! 3. **Trace**: log each allocate/resize call above a byte threshold
//!
//! Reports dump the directory as a table and print live/peak summaries.
//! Array descriptors lay out rank-generic strided domains and take their
//! storage from the same facade.
//!
//! ## Usage Example
//!
//! ```
//! use memtally::{ArrayDescriptor, DimRange, Domain, MemoryContext};
//!
//! let mut ctx = MemoryContext::system();
//! ctx.set_stat().unwrap();
//! ctx.start_tracking();
//! let memory = ctx.into_shared();
//!
//! let domain = Domain::new(vec![DimRange::unit(1, 10), DimRange::unit(1, 5)]);
//! let array = ArrayDescriptor::new(&memory, &domain, 8, "matrix").unwrap();
//! assert_eq!(array.element_count(), 50);
//! assert_eq!(array.offset_of(&[2, 1]), 5);
//! assert_eq!(memory.borrow().stats().total_bytes, 400);
//! ```

#![warn(missing_docs, missing_debug_implementations)]
#![allow(clippy::new_without_default)]

pub mod array;     // Domains and strided array descriptors
pub mod context;   // Settings, flags and the instrumented facade
pub mod directory; // Address-keyed allocation directory
pub mod error;     // Fatal errors and setup warnings
pub mod report;    // Table dumps and summaries
pub mod space;     // Live/peak byte accounting
pub mod trace;     // Allocation trace log

// Re-exports for convenience
pub use array::{ArrayDescriptor, ArrayLayout, DimLayout, DimRange, Domain};
pub use context::{
    ExemptList, Flags, MemoryContext, RawAllocator, Settings, SharedContext, SystemAllocator,
};
pub use directory::{Directory, Record, RecordId};
pub use error::{ConfigWarning, LayoutError, MemoryError};
pub use space::{Accounting, MemStats};
pub use trace::{CallKind, TraceLog};
