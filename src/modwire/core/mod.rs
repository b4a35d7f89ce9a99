pub use self::resource::{Capability, Filter, Requirement, Resource, ResourceBuilder, Value};
pub use self::resolver::{
    resolve, resolve_dynamic, ResolutionError, ResolveContext, ResolveResult, WireMap,
};
pub use self::wiring::{Wire, Wiring};

pub mod namespace;
pub mod resolver;
pub mod resource;
pub mod wiring;
