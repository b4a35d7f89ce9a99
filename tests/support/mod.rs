//! Shared helpers for resolver tests: compact builders and an in-memory
//! `ResolveContext` over a registered universe of resources.

use std::collections::HashMap;

use semver::{Version, VersionReq};

use modwire::{Capability, Requirement, Resource, ResolveContext, Wire, WireMap, Wiring};

pub fn v(s: &str) -> Version {
    Version::parse(s).unwrap()
}

pub fn vr(s: &str) -> VersionReq {
    VersionReq::parse(s).unwrap()
}

/// A context over an explicit universe of resources. Providers are
/// discovered by scanning the universe in registration order; the
/// resolver's own tie-breaking does the rest.
#[derive(Default)]
pub struct TestContext {
    mandatory: Vec<Resource>,
    optional: Vec<Resource>,
    wirings: HashMap<Resource, Wiring>,
    universe: Vec<Resource>,
    cancelled: bool,
}

impl TestContext {
    pub fn new() -> TestContext {
        TestContext::default()
    }

    pub fn mandatory(mut self, resource: &Resource) -> Self {
        self.mandatory.push(resource.clone());
        self.know(resource);
        self
    }

    pub fn optional(mut self, resource: &Resource) -> Self {
        self.optional.push(resource.clone());
        self.know(resource);
        self
    }

    /// Registers a resource as discoverable without requesting it.
    pub fn known(mut self, resource: &Resource) -> Self {
        self.know(resource);
        self
    }

    /// Registers a resource as already resolved with the given wires.
    pub fn wired(mut self, resource: &Resource, wires: Vec<Wire>) -> Self {
        self.wirings
            .insert(resource.clone(), Wiring::new(resource.clone(), wires));
        self.know(resource);
        self
    }

    pub fn cancelled(mut self) -> Self {
        self.cancelled = true;
        self
    }

    fn know(&mut self, resource: &Resource) {
        if !self.universe.contains(resource) {
            self.universe.push(resource.clone());
        }
    }
}

impl ResolveContext for TestContext {
    fn mandatory_resources(&self) -> Vec<Resource> {
        self.mandatory.clone()
    }

    fn optional_resources(&self) -> Vec<Resource> {
        self.optional.clone()
    }

    fn find_providers(&self, requirement: &Requirement) -> Vec<Capability> {
        let mut providers = Vec::new();
        for resource in &self.universe {
            for cap in resource.capabilities(Some(requirement.namespace().as_str())) {
                if requirement.matches(&cap) {
                    providers.push(cap);
                }
            }
        }
        providers
    }

    fn wirings(&self) -> &HashMap<Resource, Wiring> {
        &self.wirings
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

pub fn wires_of<'a>(map: &'a WireMap, resource: &Resource) -> &'a [Wire] {
    map.get(resource)
        .unwrap_or_else(|| panic!("no wire-map entry for {}", resource))
}

/// Every returned wire's capability must satisfy its requirement.
pub fn assert_wires_satisfy(map: &WireMap) {
    for (resource, wires) in map {
        for wire in wires {
            assert!(
                wire.requirement().matches(wire.capability()),
                "wire of {} does not satisfy its requirement: {:?}",
                resource,
                wire
            );
        }
    }
}

/// The single wire of `resource` in `map`.
pub fn only_wire<'a>(map: &'a WireMap, resource: &Resource) -> &'a Wire {
    let wires = wires_of(map, resource);
    assert_eq!(wires.len(), 1, "expected one wire for {}: {:?}", resource, wires);
    &wires[0]
}
