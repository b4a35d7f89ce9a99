//! Realised wires and the wiring of an already-resolved resource.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::core::resource::{Capability, Requirement, Resource};

/// A single resolved edge: `requirer` satisfies `requirement` through
/// `capability` of `provider`. All four refer to declared (un-wrapped)
/// entities.
#[derive(Clone)]
pub struct Wire {
    requirer: Resource,
    requirement: Requirement,
    provider: Resource,
    capability: Capability,
}

impl Wire {
    pub fn new(
        requirer: Resource,
        requirement: Requirement,
        provider: Resource,
        capability: Capability,
    ) -> Wire {
        Wire {
            requirer,
            requirement,
            provider,
            capability,
        }
    }

    pub fn requirer(&self) -> &Resource {
        &self.requirer
    }

    pub fn requirement(&self) -> &Requirement {
        &self.requirement
    }

    pub fn provider(&self) -> &Resource {
        &self.provider
    }

    pub fn capability(&self) -> &Capability {
        &self.capability
    }
}

impl PartialEq for Wire {
    fn eq(&self, other: &Wire) -> bool {
        self.requirement == other.requirement && self.capability == other.capability
    }
}

impl Eq for Wire {}

impl Hash for Wire {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.requirement.hash(state);
        self.capability.hash(state);
    }
}

impl fmt::Debug for Wire {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Wire({} -[{}]-> {})",
            self.requirer, self.requirement, self.provider
        )
    }
}

/// The realised wire set of an already-resolved resource, as reported by
/// the `ResolveContext`. The resolver reads wirings but never mutates them.
#[derive(Clone, Debug)]
pub struct Wiring {
    resource: Resource,
    wires: Vec<Wire>,
}

impl Wiring {
    pub fn new(resource: Resource, wires: Vec<Wire>) -> Wiring {
        Wiring { resource, wires }
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// Capabilities of the resolved resource, optionally restricted to one
    /// namespace.
    pub fn resource_capabilities(&self, namespace: Option<&str>) -> Vec<Capability> {
        self.resource.capabilities(namespace)
    }

    /// Requirements of the resolved resource, optionally restricted to one
    /// namespace.
    pub fn resource_requirements(&self, namespace: Option<&str>) -> Vec<Requirement> {
        self.resource.requirements(namespace)
    }

    /// Outbound wires, optionally restricted to one requirement namespace.
    pub fn required_wires(&self, namespace: Option<&str>) -> Vec<Wire> {
        self.wires
            .iter()
            .filter(|w| namespace.map_or(true, |ns| w.requirement().namespace() == ns))
            .cloned()
            .collect()
    }
}
