//! Deferred query batching for sqlext.
//!
//! `sqlext-future` lets a unit of work declare many independent read
//! queries up front and pay for a single database round trip:
//!
//! - `FutureScope` hands out typed `DeferredResult` handles
//! - `FutureQueryBatch` collects the pending `QueryDescriptor`s
//! - `BatchRegistry` tracks the one pending batch per scope
//!
//! Resolving any handle combines every pending statement, executes them
//! together, and distributes the result sets back to their projectors.
//! Sibling handles then resolve from memory.

pub mod batch;
pub mod combine;
pub mod descriptor;
pub mod handle;
pub mod registry;
pub mod scope;

pub use batch::FutureQueryBatch;
pub use combine::combine_statements;
pub use descriptor::QueryDescriptor;
pub use handle::DeferredResult;
pub use registry::{BatchRegistry, ScopeId};
pub use scope::FutureScope;
