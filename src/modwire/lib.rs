//! modwire is a module capability resolver: given modules declaring what
//! they provide and what they need, it decides which providers satisfy
//! which requirements such that the resulting wiring graph is globally
//! consistent, including the transitive `uses` constraint on package
//! class spaces. The resolver is a pure function from a caller-supplied
//! [`ResolveContext`] to a wire map; it performs no I/O and keeps no state
//! between calls.

pub use crate::core::{
    resolve, resolve_dynamic, Capability, Filter, Requirement, ResolutionError, Resource,
    ResourceBuilder, ResolveContext, Value, Wire, WireMap, Wiring,
};
pub use crate::core::resolver::{BlameChain, ResolveResult, UsesConflict};

pub mod core;
pub mod util;
