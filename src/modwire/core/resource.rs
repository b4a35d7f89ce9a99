//! Value types for the resolver: resources, capabilities, requirements.
//!
//! A `Resource` owns its declared capabilities and requirements; both point
//! back at their owner through a weak reference so the graph can be cyclic
//! (A requires B that requires A is legal) without leaking. Construction
//! goes through `ResourceBuilder`, after which everything is immutable.
//!
//! Fragment merging produces *wrapped* entities: a wrapped host is a
//! synthetic resource whose capabilities and requirements re-home the
//! host's and its fragments' declared ones. Wrapped entities carry their
//! declared original and expose it through `declared()`; everything at the
//! API boundary (wires, diagnostics) deals in declared entities only.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use semver::{Version, VersionReq};

use crate::core::namespace::{
    BUNDLE_NAMESPACE, BUNDLE_VERSION_ATTRIBUTE, CARDINALITY_DIRECTIVE, CARDINALITY_MULTIPLE,
    HOST_NAMESPACE, PACKAGE_NAMESPACE, RESOLUTION_DIRECTIVE, RESOLUTION_DYNAMIC,
    RESOLUTION_OPTIONAL, USES_DIRECTIVE, VERSION_ATTRIBUTE, VISIBILITY_DIRECTIVE,
    VISIBILITY_REEXPORT,
};
use crate::core::namespace::parse_uses;
use crate::util::InternedString;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, AtomicOrdering::Relaxed)
}

/// An attribute value on a capability.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Str(InternedString),
    Version(Version),
    Long(i64),
    Bool(bool),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_version(&self) -> Option<&Version> {
        match self {
            Value::Version(v) => Some(v),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Str(InternedString::new(s))
    }
}

impl From<Version> for Value {
    fn from(v: Version) -> Value {
        Value::Version(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Value {
        Value::Long(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{}", s),
            Value::Version(v) => write!(f, "{}", v),
            Value::Long(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}

#[derive(Clone, Debug)]
enum Clause {
    Eq(InternedString, Value),
    VersionRange(InternedString, VersionReq),
    Present(InternedString),
}

/// A conjunction of attribute clauses, matched against capability
/// attributes of the same namespace.
#[derive(Clone, Debug, Default)]
pub struct Filter {
    clauses: Vec<Clause>,
}

impl Filter {
    /// A filter with no clauses; matches every capability of the namespace.
    pub fn any() -> Filter {
        Filter::default()
    }

    pub fn eq<V: Into<Value>>(mut self, attribute: &str, value: V) -> Filter {
        self.clauses
            .push(Clause::Eq(InternedString::new(attribute), value.into()));
        self
    }

    /// Requires the `attribute` to be a version inside `range`. A missing
    /// attribute is treated as version `0.0.0`.
    pub fn version_in(mut self, attribute: &str, range: VersionReq) -> Filter {
        self.clauses
            .push(Clause::VersionRange(InternedString::new(attribute), range));
        self
    }

    pub fn present(mut self, attribute: &str) -> Filter {
        self.clauses.push(Clause::Present(InternedString::new(attribute)));
        self
    }

    /// The string value this filter pins `key` to, if any.
    pub(crate) fn eq_str(&self, key: &str) -> Option<InternedString> {
        self.clauses.iter().find_map(|clause| match clause {
            Clause::Eq(k, Value::Str(s)) if k.as_str() == key => Some(*s),
            _ => None,
        })
    }

    pub fn matches(&self, attributes: &BTreeMap<InternedString, Value>) -> bool {
        self.clauses.iter().all(|clause| match clause {
            Clause::Eq(key, value) => attributes.get(key) == Some(value),
            Clause::VersionRange(key, range) => {
                let zero = Version::new(0, 0, 0);
                let version = match attributes.get(key) {
                    Some(Value::Version(v)) => v,
                    Some(_) => return false,
                    None => &zero,
                };
                range.matches(version)
            }
            Clause::Present(key) => attributes.contains_key(key),
        })
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.clauses.is_empty() {
            return write!(f, "(*)");
        }
        if self.clauses.len() > 1 {
            write!(f, "(&")?;
        }
        for clause in &self.clauses {
            match clause {
                Clause::Eq(k, v) => write!(f, "({}={})", k, v)?,
                Clause::VersionRange(k, r) => write!(f, "({}{})", k, r)?,
                Clause::Present(k) => write!(f, "({}=*)", k)?,
            }
        }
        if self.clauses.len() > 1 {
            write!(f, ")")?;
        }
        Ok(())
    }
}

struct CapabilityInner {
    id: u64,
    owner: Weak<ResourceInner>,
    /// The original capability when this one re-homes it to a wrapped host.
    declared: Option<Capability>,
    namespace: InternedString,
    attributes: BTreeMap<InternedString, Value>,
    directives: BTreeMap<InternedString, InternedString>,
}

/// A typed assertion a resource provides.
#[derive(Clone)]
pub struct Capability(Rc<CapabilityInner>);

impl Capability {
    fn new_declared(owner: Weak<ResourceInner>, spec: CapabilitySpec) -> Capability {
        Capability(Rc::new(CapabilityInner {
            id: next_id(),
            owner,
            declared: None,
            namespace: spec.namespace,
            attributes: spec.attributes,
            directives: spec.directives,
        }))
    }

    fn new_wrapped(owner: Weak<ResourceInner>, declared: &Capability) -> Capability {
        Capability(Rc::new(CapabilityInner {
            id: next_id(),
            owner,
            declared: Some(declared.declared()),
            namespace: declared.namespace(),
            attributes: declared.0.attributes.clone(),
            directives: declared.0.directives.clone(),
        }))
    }

    pub(crate) fn id(&self) -> u64 {
        self.0.id
    }

    /// The resource that owns this capability (the wrapped host for hosted
    /// capabilities).
    pub fn resource(&self) -> Resource {
        Resource(self.0.owner.upgrade().expect("capability owner is alive"))
    }

    pub fn namespace(&self) -> InternedString {
        self.0.namespace
    }

    pub fn attributes(&self) -> &BTreeMap<InternedString, Value> {
        &self.0.attributes
    }

    pub fn directives(&self) -> &BTreeMap<InternedString, InternedString> {
        &self.0.directives
    }

    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.0.attributes.get(name)
    }

    pub fn directive(&self, name: &str) -> Option<&str> {
        self.0.directives.get(name).map(|d| d.as_str())
    }

    /// The declared (un-wrapped) form of this capability.
    pub fn declared(&self) -> Capability {
        match &self.0.declared {
            Some(original) => original.clone(),
            None => self.clone(),
        }
    }

    /// True when this capability was contributed by a fragment and re-homed
    /// to a wrapped host.
    pub fn is_hosted(&self) -> bool {
        match &self.0.declared {
            Some(original) => original.resource() != self.resource().declared(),
            None => false,
        }
    }

    /// Package names listed in this capability's `uses` directive.
    pub fn uses(&self) -> Vec<InternedString> {
        self.directive(USES_DIRECTIVE).map(parse_uses).unwrap_or_default()
    }

    /// The package name for a package-namespace capability.
    pub fn package_name(&self) -> Option<InternedString> {
        if self.0.namespace == PACKAGE_NAMESPACE {
            match self.attr(PACKAGE_NAMESPACE) {
                Some(Value::Str(name)) => Some(*name),
                _ => None,
            }
        } else {
            None
        }
    }

    pub(crate) fn version_attr(&self, name: &str) -> Version {
        match self.attr(name) {
            Some(Value::Version(v)) => v.clone(),
            _ => Version::new(0, 0, 0),
        }
    }
}

impl PartialEq for Capability {
    fn eq(&self, other: &Capability) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Capability {}

impl Hash for Capability {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl Ord for Capability {
    fn cmp(&self, other: &Capability) -> Ordering {
        self.0.id.cmp(&other.0.id)
    }
}

impl PartialOrd for Capability {
    fn partial_cmp(&self, other: &Capability) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Capability({})", self)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.namespace)?;
        for (key, value) in &self.0.attributes {
            write!(f, "; {}={}", key, value)?;
        }
        Ok(())
    }
}

struct RequirementInner {
    id: u64,
    owner: Weak<ResourceInner>,
    /// The original requirement when this one is rewritten onto a wrapped
    /// host.
    declared: Option<Requirement>,
    namespace: InternedString,
    directives: BTreeMap<InternedString, InternedString>,
    filter: Filter,
}

/// A typed demand a resource makes, matched by filter against capabilities
/// of the same namespace.
#[derive(Clone)]
pub struct Requirement(Rc<RequirementInner>);

impl Requirement {
    fn new_declared(owner: Weak<ResourceInner>, spec: RequirementSpec) -> Requirement {
        Requirement(Rc::new(RequirementInner {
            id: next_id(),
            owner,
            declared: None,
            namespace: spec.namespace,
            directives: spec.directives,
            filter: spec.filter,
        }))
    }

    fn new_wrapped(owner: Weak<ResourceInner>, declared: &Requirement) -> Requirement {
        Requirement(Rc::new(RequirementInner {
            id: next_id(),
            owner,
            declared: Some(declared.declared()),
            namespace: declared.namespace(),
            directives: declared.0.directives.clone(),
            filter: declared.0.filter.clone(),
        }))
    }

    pub(crate) fn id(&self) -> u64 {
        self.0.id
    }

    /// The resource making this requirement (the wrapped host for rewritten
    /// fragment requirements).
    pub fn resource(&self) -> Resource {
        Resource(self.0.owner.upgrade().expect("requirement owner is alive"))
    }

    pub fn namespace(&self) -> InternedString {
        self.0.namespace
    }

    pub fn directives(&self) -> &BTreeMap<InternedString, InternedString> {
        &self.0.directives
    }

    pub fn directive(&self, name: &str) -> Option<&str> {
        self.0.directives.get(name).map(|d| d.as_str())
    }

    pub fn filter(&self) -> &Filter {
        &self.0.filter
    }

    /// The declared (un-wrapped) form of this requirement.
    pub fn declared(&self) -> Requirement {
        match &self.0.declared {
            Some(original) => original.clone(),
            None => self.clone(),
        }
    }

    /// True when the capability's namespace matches and its attributes pass
    /// this requirement's filter.
    pub fn matches(&self, capability: &Capability) -> bool {
        self.0.namespace == capability.namespace()
            && self.0.filter.matches(capability.attributes())
    }

    pub fn is_optional(&self) -> bool {
        self.directive(RESOLUTION_DIRECTIVE) == Some(RESOLUTION_OPTIONAL)
    }

    /// Dynamic requirements are package requirements deferred until the
    /// host asks for the package at runtime.
    pub fn is_dynamic(&self) -> bool {
        self.0.namespace == PACKAGE_NAMESPACE
            && self.directive(RESOLUTION_DIRECTIVE) == Some(RESOLUTION_DYNAMIC)
    }

    pub fn is_multiple(&self) -> bool {
        self.directive(CARDINALITY_DIRECTIVE) == Some(CARDINALITY_MULTIPLE)
    }

    /// Bundle requirements with `visibility:=reexport` propagate the
    /// provider's exports onward.
    pub fn is_reexport(&self) -> bool {
        self.0.namespace == BUNDLE_NAMESPACE
            && self.directive(VISIBILITY_DIRECTIVE) == Some(VISIBILITY_REEXPORT)
    }
}

impl PartialEq for Requirement {
    fn eq(&self, other: &Requirement) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Requirement {}

impl Hash for Requirement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl Ord for Requirement {
    fn cmp(&self, other: &Requirement) -> Ordering {
        self.0.id.cmp(&other.0.id)
    }
}

impl PartialOrd for Requirement {
    fn partial_cmp(&self, other: &Requirement) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Requirement({})", self)
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.0.namespace, self.0.filter)
    }
}

enum ResourceKind {
    Declared,
    Wrapped {
        host: Resource,
        fragments: Vec<Resource>,
    },
}

struct ResourceInner {
    id: u64,
    name: InternedString,
    version: Version,
    kind: ResourceKind,
    capabilities: Vec<Capability>,
    requirements: Vec<Requirement>,
}

/// An identified unit declaring capabilities and requirements.
#[derive(Clone)]
pub struct Resource(Rc<ResourceInner>);

impl Resource {
    /// Starts building an ordinary resource.
    pub fn build(name: &str, version: Version) -> ResourceBuilder {
        ResourceBuilder {
            name: InternedString::new(name),
            version,
            capabilities: Vec::new(),
            requirements: Vec::new(),
        }
    }

    /// Builds the synthetic resource representing `host` with `fragments`
    /// attached. The host's capabilities and each fragment's payload are
    /// re-homed here; fragment host requirements stay with the fragment, as
    /// do non-payload requirements (execution environment and other generic
    /// namespaces).
    pub(crate) fn wrapped(host: &Resource, fragments: Vec<Resource>) -> Resource {
        let inner = Rc::new_cyclic(|weak: &Weak<ResourceInner>| {
            let mut capabilities: Vec<Capability> = host
                .0
                .capabilities
                .iter()
                .map(|c| Capability::new_wrapped(weak.clone(), c))
                .collect();
            let mut requirements: Vec<Requirement> = host
                .0
                .requirements
                .iter()
                .map(|r| Requirement::new_wrapped(weak.clone(), r))
                .collect();
            for fragment in &fragments {
                for cap in &fragment.0.capabilities {
                    capabilities.push(Capability::new_wrapped(weak.clone(), cap));
                }
                for req in &fragment.0.requirements {
                    let ns = req.namespace();
                    if ns == PACKAGE_NAMESPACE || ns == BUNDLE_NAMESPACE {
                        requirements.push(Requirement::new_wrapped(weak.clone(), req));
                    }
                }
            }
            ResourceInner {
                id: next_id(),
                name: host.0.name,
                version: host.0.version.clone(),
                kind: ResourceKind::Wrapped {
                    host: host.clone(),
                    fragments,
                },
                capabilities,
                requirements,
            }
        });
        Resource(inner)
    }

    pub(crate) fn id(&self) -> u64 {
        self.0.id
    }

    pub fn name(&self) -> InternedString {
        self.0.name
    }

    pub fn version(&self) -> &Version {
        &self.0.version
    }

    /// Declared capabilities, optionally restricted to one namespace.
    pub fn capabilities(&self, namespace: Option<&str>) -> Vec<Capability> {
        self.0
            .capabilities
            .iter()
            .filter(|c| namespace.map_or(true, |ns| c.namespace() == ns))
            .cloned()
            .collect()
    }

    /// Declared requirements, optionally restricted to one namespace.
    pub fn requirements(&self, namespace: Option<&str>) -> Vec<Requirement> {
        self.0
            .requirements
            .iter()
            .filter(|r| namespace.map_or(true, |ns| r.namespace() == ns))
            .cloned()
            .collect()
    }

    /// A fragment declares a requirement in the host namespace.
    pub fn is_fragment(&self) -> bool {
        self.0
            .requirements
            .iter()
            .any(|r| r.namespace() == HOST_NAMESPACE)
    }

    pub(crate) fn host_requirement(&self) -> Option<Requirement> {
        self.0
            .requirements
            .iter()
            .find(|r| r.namespace() == HOST_NAMESPACE)
            .cloned()
    }

    /// The declared resource: the host for a wrapped host, `self` otherwise.
    pub fn declared(&self) -> Resource {
        match &self.0.kind {
            ResourceKind::Declared => self.clone(),
            ResourceKind::Wrapped { host, .. } => host.clone(),
        }
    }

    pub(crate) fn fragments(&self) -> Option<&[Resource]> {
        match &self.0.kind {
            ResourceKind::Declared => None,
            ResourceKind::Wrapped { fragments, .. } => Some(fragments),
        }
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Resource) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Resource {}

impl Hash for Resource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl Ord for Resource {
    fn cmp(&self, other: &Resource) -> Ordering {
        self.0.id.cmp(&other.0.id)
    }
}

impl PartialOrd for Resource {
    fn partial_cmp(&self, other: &Resource) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Resource({})", self)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{}", self.0.name, self.0.version)
    }
}

struct CapabilitySpec {
    namespace: InternedString,
    attributes: BTreeMap<InternedString, Value>,
    directives: BTreeMap<InternedString, InternedString>,
}

struct RequirementSpec {
    namespace: InternedString,
    directives: BTreeMap<InternedString, InternedString>,
    filter: Filter,
}

/// Builds an immutable `Resource`.
///
/// The general `capability`/`requirement` methods accept any namespace; the
/// named conveniences cover the wiring namespaces so manifests read the way
/// they are written.
pub struct ResourceBuilder {
    name: InternedString,
    version: Version,
    capabilities: Vec<CapabilitySpec>,
    requirements: Vec<RequirementSpec>,
}

impl ResourceBuilder {
    pub fn capability(
        mut self,
        namespace: &str,
        attributes: Vec<(&str, Value)>,
        directives: Vec<(&str, &str)>,
    ) -> Self {
        self.capabilities.push(CapabilitySpec {
            namespace: InternedString::new(namespace),
            attributes: attributes
                .into_iter()
                .map(|(k, v)| (InternedString::new(k), v))
                .collect(),
            directives: directives
                .into_iter()
                .map(|(k, v)| (InternedString::new(k), InternedString::new(v)))
                .collect(),
        });
        self
    }

    pub fn requirement(
        mut self,
        namespace: &str,
        directives: Vec<(&str, &str)>,
        filter: Filter,
    ) -> Self {
        self.requirements.push(RequirementSpec {
            namespace: InternedString::new(namespace),
            directives: directives
                .into_iter()
                .map(|(k, v)| (InternedString::new(k), InternedString::new(v)))
                .collect(),
            filter,
        });
        self
    }

    /// Exports a package, optionally constrained by a `uses` directive.
    pub fn export_package(self, name: &str, version: Version, uses: &[&str]) -> Self {
        let directives = if uses.is_empty() {
            vec![]
        } else {
            vec![(USES_DIRECTIVE, uses.join(","))]
        };
        let directives: Vec<(&str, &str)> = directives
            .iter()
            .map(|(k, v)| (*k, v.as_str()))
            .collect();
        self.capability(
            PACKAGE_NAMESPACE,
            vec![
                (PACKAGE_NAMESPACE, Value::from(name)),
                (VERSION_ATTRIBUTE, Value::Version(version)),
            ],
            directives,
        )
    }

    /// Imports a package within a version range.
    pub fn import_package(self, name: &str, range: VersionReq) -> Self {
        self.requirement(
            PACKAGE_NAMESPACE,
            vec![],
            Filter::any()
                .eq(PACKAGE_NAMESPACE, name)
                .version_in(VERSION_ATTRIBUTE, range),
        )
    }

    /// Imports a package with extra requirement directives.
    pub fn import_package_with(
        self,
        name: &str,
        range: VersionReq,
        directives: Vec<(&str, &str)>,
    ) -> Self {
        self.requirement(
            PACKAGE_NAMESPACE,
            directives,
            Filter::any()
                .eq(PACKAGE_NAMESPACE, name)
                .version_in(VERSION_ATTRIBUTE, range),
        )
    }

    /// Declares a dynamic import for a package name.
    pub fn dynamic_import_package(self, name: &str) -> Self {
        self.requirement(
            PACKAGE_NAMESPACE,
            vec![(RESOLUTION_DIRECTIVE, RESOLUTION_DYNAMIC)],
            Filter::any().eq(PACKAGE_NAMESPACE, name),
        )
    }

    /// Offers this module in the bundle namespace under its own name and
    /// version.
    pub fn provide_bundle(self) -> Self {
        let name = self.name;
        let version = self.version.clone();
        self.capability(
            BUNDLE_NAMESPACE,
            vec![
                (BUNDLE_NAMESPACE, Value::Str(name)),
                (BUNDLE_VERSION_ATTRIBUTE, Value::Version(version)),
            ],
            vec![],
        )
    }

    /// Requires another module wholesale, optionally reexporting its
    /// packages.
    pub fn require_bundle(self, name: &str, range: VersionReq, reexport: bool) -> Self {
        let directives = if reexport {
            vec![(VISIBILITY_DIRECTIVE, VISIBILITY_REEXPORT)]
        } else {
            vec![]
        };
        self.requirement(
            BUNDLE_NAMESPACE,
            directives,
            Filter::any()
                .eq(BUNDLE_NAMESPACE, name)
                .version_in(BUNDLE_VERSION_ATTRIBUTE, range),
        )
    }

    /// Offers this module as a fragment host under its own name and version.
    pub fn host(self) -> Self {
        let name = self.name;
        let version = self.version.clone();
        self.capability(
            HOST_NAMESPACE,
            vec![
                (HOST_NAMESPACE, Value::Str(name)),
                (BUNDLE_VERSION_ATTRIBUTE, Value::Version(version)),
            ],
            vec![],
        )
    }

    /// Makes this module a fragment of the named host.
    pub fn fragment_of(self, host_name: &str) -> Self {
        self.requirement(
            HOST_NAMESPACE,
            vec![],
            Filter::any().eq(HOST_NAMESPACE, host_name),
        )
    }

    pub fn finish(self) -> Resource {
        let inner = Rc::new_cyclic(|weak: &Weak<ResourceInner>| ResourceInner {
            id: next_id(),
            name: self.name,
            version: self.version,
            kind: ResourceKind::Declared,
            capabilities: self
                .capabilities
                .into_iter()
                .map(|spec| Capability::new_declared(weak.clone(), spec))
                .collect(),
            requirements: self
                .requirements
                .into_iter()
                .map(|spec| Requirement::new_declared(weak.clone(), spec))
                .collect(),
        });
        Resource(inner)
    }
}

#[cfg(test)]
mod tests {
    use semver::{Version, VersionReq};

    use super::{Filter, Resource, Value};
    use crate::core::namespace::{
        HOST_NAMESPACE, PACKAGE_NAMESPACE, VERSION_ATTRIBUTE,
    };

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn vr(s: &str) -> VersionReq {
        VersionReq::parse(s).unwrap()
    }

    #[test]
    fn import_matches_export_by_name_and_version() {
        let exporter = Resource::build("exp", v("1.0.0"))
            .export_package("x", v("1.2.0"), &[])
            .finish();
        let importer = Resource::build("imp", v("1.0.0"))
            .import_package("x", vr(">=1.0.0"))
            .finish();
        let cap = &exporter.capabilities(Some(PACKAGE_NAMESPACE))[0];
        let req = &importer.requirements(Some(PACKAGE_NAMESPACE))[0];
        assert!(req.matches(cap));
    }

    #[test]
    fn version_mismatch_fails_filter() {
        let exporter = Resource::build("exp", v("1.0.0"))
            .export_package("x", v("1.0.0"), &[])
            .finish();
        let importer = Resource::build("imp", v("1.0.0"))
            .import_package("x", vr(">=2.0.0"))
            .finish();
        let cap = &exporter.capabilities(Some(PACKAGE_NAMESPACE))[0];
        let req = &importer.requirements(Some(PACKAGE_NAMESPACE))[0];
        assert!(!req.matches(cap));
    }

    #[test]
    fn missing_version_attribute_defaults_to_zero() {
        let mut attrs = std::collections::BTreeMap::new();
        attrs.insert(
            crate::util::InternedString::new(PACKAGE_NAMESPACE),
            Value::from("x"),
        );
        let filter = Filter::any().version_in(VERSION_ATTRIBUTE, vr(">=0.0.0"));
        assert!(filter.matches(&attrs));
        let filter = Filter::any().version_in(VERSION_ATTRIBUTE, vr(">=1.0.0"));
        assert!(!filter.matches(&attrs));
    }

    #[test]
    fn fragment_predicate_follows_host_requirement() {
        let fragment = Resource::build("frag", v("1.0.0"))
            .fragment_of("host")
            .finish();
        let plain = Resource::build("plain", v("1.0.0")).finish();
        assert!(fragment.is_fragment());
        assert!(!plain.is_fragment());
    }

    #[test]
    fn wrapped_host_merges_fragment_payload() {
        let host = Resource::build("host", v("1.0.0"))
            .host()
            .export_package("h", v("1.0.0"), &[])
            .finish();
        let fragment = Resource::build("frag", v("1.0.0"))
            .fragment_of("host")
            .export_package("f", v("1.0.0"), &[])
            .import_package("q", vr(">=1.0.0"))
            .finish();
        let wrap = Resource::wrapped(&host, vec![fragment.clone()]);

        let exported: Vec<_> = wrap
            .capabilities(Some(PACKAGE_NAMESPACE))
            .iter()
            .map(|c| c.package_name().unwrap().as_str())
            .collect();
        assert_eq!(exported, ["h", "f"]);

        // The fragment's package import is rewritten onto the wrap; its host
        // requirement stays behind.
        assert_eq!(wrap.requirements(Some(PACKAGE_NAMESPACE)).len(), 1);
        assert!(wrap.requirements(Some(HOST_NAMESPACE)).is_empty());
        for req in wrap.requirements(None) {
            assert_eq!(req.resource(), wrap);
        }
        assert_eq!(wrap.declared(), host);

        // Fragment-contributed capabilities unwrap to the fragment.
        let hosted = &wrap.capabilities(Some(PACKAGE_NAMESPACE))[1];
        assert!(hosted.is_hosted());
        assert_eq!(hosted.declared().resource(), fragment);
    }

    #[test]
    fn uses_directive_round_trips_through_builder() {
        let r = Resource::build("r", v("1.0.0"))
            .export_package("p", v("1.0.0"), &["q", "r.s"])
            .finish();
        let cap = &r.capabilities(Some(PACKAGE_NAMESPACE))[0];
        let uses: Vec<&str> = cap.uses().iter().map(|u| u.as_str()).collect();
        assert_eq!(uses, ["q", "r.s"]);
    }
}
