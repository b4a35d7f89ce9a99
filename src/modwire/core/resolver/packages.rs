//! Per-resource package spaces: which packages a module exports, imports,
//! reaches through require-bundle, and is transitively exposed to through
//! `uses` directives.
//!
//! Everything here is recomputed from scratch for each trial permutation;
//! only the transitive package-source sets are memoised, in the session
//! cache that is cleared between attempts. Blame chains record the path of
//! requirements that exposed a capability so conflicts can be explained
//! and mitigated at the right requirement.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::rc::Rc;

use indexmap::IndexMap;

use crate::core::namespace::{BUNDLE_NAMESPACE, PACKAGE_NAMESPACE, USES_DIRECTIVE};
use crate::core::resolver::candidates::Candidates;
use crate::core::resolver::context::ResolveSession;
use crate::core::resolver::errors::{BlameChain, ResolutionError, ResolveResult};
use crate::core::resource::{Capability, Requirement, Resource};
use crate::util::InternedString;

/// How a capability became visible: the capability itself plus the ordered
/// requirements traversed to reach it. Exports carry no chain.
#[derive(Clone, Debug)]
pub(crate) struct Blame {
    pub(crate) capability: Capability,
    pub(crate) requirements: Option<Rc<Vec<Requirement>>>,
}

impl Blame {
    fn exported(capability: Capability) -> Blame {
        Blame {
            capability,
            requirements: None,
        }
    }

    fn reached(capability: Capability, requirements: Rc<Vec<Requirement>>) -> Blame {
        Blame {
            capability,
            requirements: Some(requirements),
        }
    }

    pub(crate) fn root(&self) -> Option<Requirement> {
        self.requirements
            .as_ref()
            .and_then(|reqs| reqs.first().cloned())
    }

    pub(crate) fn to_chain(&self) -> BlameChain {
        BlameChain {
            capability: self.capability.clone(),
            requirements: self
                .requirements
                .as_ref()
                .map(|reqs| (**reqs).clone())
                .unwrap_or_default(),
        }
    }
}

/// All blames that share one used capability, plus, for each
/// multiple-cardinality root requirement, the candidates that pulled the
/// use in. Those are the candidates a relaxation can drop.
#[derive(Debug)]
pub(crate) struct UsedBlames {
    pub(crate) capability: Capability,
    pub(crate) blames: Vec<Blame>,
    root_causes: BTreeMap<Requirement, BTreeSet<Capability>>,
}

impl UsedBlames {
    fn new(capability: Capability) -> UsedBlames {
        UsedBlames {
            capability,
            blames: Vec::new(),
            root_causes: BTreeMap::new(),
        }
    }

    fn add(&mut self, blame: Blame, matching: &Capability) {
        if let Some(root) = blame.root() {
            if root.is_multiple() {
                self.root_causes
                    .entry(root)
                    .or_default()
                    .insert(matching.clone());
            }
        }
        self.blames.push(blame);
    }

    pub(crate) fn root_causes(&self, root: &Requirement) -> BTreeSet<Capability> {
        self.root_causes.get(root).cloned().unwrap_or_default()
    }
}

/// The four package maps of one resource.
#[derive(Default, Debug)]
pub(crate) struct Packages {
    pub(crate) exported: BTreeMap<InternedString, Blame>,
    pub(crate) imported: BTreeMap<InternedString, Vec<Blame>>,
    pub(crate) required: BTreeMap<InternedString, Vec<Blame>>,
    pub(crate) used: BTreeMap<InternedString, BTreeMap<Capability, UsedBlames>>,
}

pub(crate) type PackageSpaces = IndexMap<Resource, Packages>;

/// A would-be wire of the current permutation.
struct WireCandidate {
    requirement: Requirement,
    capability: Capability,
}

/// Computes the package space of every host in the resolution set for the
/// current permutation. Fails when a dynamic import would cover a package
/// its host can already see, which invalidates the permutation.
pub(crate) fn calculate_package_spaces(
    session: &mut ResolveSession<'_>,
    candidates: &Candidates,
) -> ResolveResult<PackageSpaces> {
    let hosts: Vec<Resource> = candidates
        .resources()
        .into_iter()
        .filter(|r| !r.is_fragment())
        .collect();

    let mut wire_cands: IndexMap<Resource, Vec<WireCandidate>> = IndexMap::new();
    for host in &hosts {
        wire_cands.insert(host.clone(), wire_candidates(session, candidates, host));
    }

    let mut spaces: PackageSpaces = IndexMap::new();
    for host in &hosts {
        spaces.insert(host.clone(), calculate_exported(candidates, host));
    }

    for host in &hosts {
        let mut imported: BTreeMap<InternedString, Vec<Blame>> = BTreeMap::new();
        let mut required: BTreeMap<InternedString, Vec<Blame>> = BTreeMap::new();
        for wc in &wire_cands[host] {
            let ns = wc.capability.namespace();
            if ns == PACKAGE_NAMESPACE {
                let Some(pkg) = wc.capability.package_name() else {
                    continue;
                };
                if wc.requirement.is_dynamic()
                    && (spaces[host].exported.contains_key(&pkg)
                        || imported.contains_key(&pkg)
                        || required.contains_key(&pkg))
                {
                    return Err(ResolutionError::DynamicAlreadyVisible {
                        requirement: wc.requirement.clone(),
                        package: pkg,
                    });
                }
                imported.entry(pkg).or_default().push(Blame::reached(
                    wc.capability.clone(),
                    Rc::new(vec![wc.requirement.clone()]),
                ));
            } else if ns == BUNDLE_NAMESPACE {
                let mut visited_caps = HashSet::new();
                let mut visited_resources = HashSet::new();
                merge_required(
                    session,
                    candidates,
                    &spaces,
                    &mut required,
                    Rc::new(vec![wc.requirement.clone()]),
                    &wc.capability,
                    &mut visited_caps,
                    &mut visited_resources,
                );
            }
        }
        let entry = spaces.get_mut(host).expect("space created above");
        entry.imported = imported;
        entry.required = required;
    }

    for host in &hosts {
        let mut used: BTreeMap<InternedString, BTreeMap<Capability, UsedBlames>> = BTreeMap::new();
        let mut cycle: HashSet<Capability> = HashSet::new();
        for wc in &wire_cands[host] {
            let ns = wc.capability.namespace();
            if ns != PACKAGE_NAMESPACE && ns != BUNDLE_NAMESPACE {
                let chain = Rc::new(vec![wc.requirement.clone()]);
                merge_uses(
                    session,
                    candidates,
                    &spaces,
                    &mut used,
                    &wc.capability,
                    &chain,
                    &wc.capability,
                    &mut cycle,
                );
            }
        }
        let reached: Vec<Blame> = {
            let pkgs = &spaces[host];
            pkgs.imported
                .values()
                .chain(pkgs.required.values())
                .flatten()
                .cloned()
                .collect()
        };
        for blame in reached {
            let chain = blame
                .requirements
                .clone()
                .expect("imported and required blames carry chains");
            merge_uses(
                session,
                candidates,
                &spaces,
                &mut used,
                &blame.capability,
                &chain,
                &blame.capability,
                &mut cycle,
            );
        }
        spaces.get_mut(host).expect("space created above").used = used;
    }

    Ok(spaces)
}

/// The wires this permutation would realise for `resource`: existing wires
/// plus the head dynamic candidate for resolved resources; declared
/// requirements against their candidates for unresolved ones, where
/// multiple-cardinality requirements contribute every candidate.
fn wire_candidates(
    session: &ResolveSession<'_>,
    candidates: &Candidates,
    resource: &Resource,
) -> Vec<WireCandidate> {
    let mut out = Vec::new();
    if let Some(wiring) = session.ctx.wirings().get(&resource.declared()) {
        for wire in wiring.required_wires(None) {
            out.push(WireCandidate {
                requirement: wire.requirement().clone(),
                capability: wire.capability().clone(),
            });
        }
        for req in resource.requirements(None) {
            if req.is_dynamic() {
                if let Some(cap) = candidates.first_candidate(&req) {
                    out.push(WireCandidate {
                        requirement: req,
                        capability: cap,
                    });
                }
            }
        }
    } else {
        for req in resource.requirements(None) {
            if req.is_dynamic() || !session.ctx.is_effective(&req) {
                continue;
            }
            let Some(list) = candidates.candidates(&req) else {
                continue;
            };
            if req.is_multiple() {
                for cap in list.iter() {
                    out.push(WireCandidate {
                        requirement: req.clone(),
                        capability: cap.clone(),
                    });
                }
            } else {
                out.push(WireCandidate {
                    requirement: req.clone(),
                    capability: list[0].clone(),
                });
            }
        }
    }
    out
}

/// Package exports of a resource, fragment contributions already re-homed
/// by wrapping. An export the owner also imports may have been substituted
/// away on this trial, in which case it is not an export at all. When a
/// host and its fragment export the same package the host's wins.
fn calculate_exported(candidates: &Candidates, resource: &Resource) -> Packages {
    let mut pkgs = Packages::default();
    for cap in resource.capabilities(Some(PACKAGE_NAMESPACE)) {
        if candidates.is_substituted(&cap) {
            continue;
        }
        let Some(pkg) = cap.package_name() else {
            continue;
        };
        pkgs.exported.entry(pkg).or_insert_with(|| Blame::exported(cap));
    }
    pkgs
}

/// Bundle-namespace edges of a resource: realised wires when resolved, the
/// head candidates otherwise.
fn bundle_wires(
    session: &ResolveSession<'_>,
    candidates: &Candidates,
    resource: &Resource,
) -> Vec<(Requirement, Capability)> {
    if let Some(wiring) = session.ctx.wirings().get(&resource.declared()) {
        wiring
            .required_wires(Some(BUNDLE_NAMESPACE))
            .into_iter()
            .map(|w| (w.requirement().clone(), w.capability().clone()))
            .collect()
    } else {
        resource
            .requirements(Some(BUNDLE_NAMESPACE))
            .into_iter()
            .filter_map(|req| candidates.first_candidate(&req).map(|cap| (req, cap)))
            .collect()
    }
}

/// Merges the provider's exports into `out` under the blame chain, then
/// follows the provider's reexport-visibility bundle requirements
/// transitively. Capability and resource cycles are cut independently.
#[allow(clippy::too_many_arguments)]
fn merge_required(
    session: &ResolveSession<'_>,
    candidates: &Candidates,
    spaces: &PackageSpaces,
    out: &mut BTreeMap<InternedString, Vec<Blame>>,
    chain: Rc<Vec<Requirement>>,
    provider_cap: &Capability,
    visited_caps: &mut HashSet<Capability>,
    visited_resources: &mut HashSet<Resource>,
) {
    if !visited_caps.insert(provider_cap.clone()) {
        return;
    }
    let provider = provider_cap.resource();
    if !visited_resources.insert(provider.clone()) {
        return;
    }
    if let Some(pkgs) = spaces.get(&provider) {
        for (pkg, export) in &pkgs.exported {
            out.entry(*pkg)
                .or_default()
                .push(Blame::reached(export.capability.clone(), chain.clone()));
        }
    }
    for (breq, bcap) in bundle_wires(session, candidates, &provider) {
        if !breq.is_reexport() {
            continue;
        }
        let mut extended = (*chain).clone();
        extended.push(breq);
        merge_required(
            session,
            candidates,
            spaces,
            out,
            Rc::new(extended),
            &bcap,
            visited_caps,
            visited_resources,
        );
    }
}

/// Walks the `uses` closure of a capability: every transitive source of the
/// capability names packages whose providers, as seen from the source's own
/// package space, become `used` entries of the resource under computation.
/// The blame chain grows by the requirement that wired each step.
#[allow(clippy::too_many_arguments)]
fn merge_uses(
    session: &mut ResolveSession<'_>,
    candidates: &Candidates,
    spaces: &PackageSpaces,
    used_out: &mut BTreeMap<InternedString, BTreeMap<Capability, UsedBlames>>,
    merge_cap: &Capability,
    chain: &Rc<Vec<Requirement>>,
    matching: &Capability,
    cycle: &mut HashSet<Capability>,
) {
    if !cycle.insert(merge_cap.clone()) {
        return;
    }
    let sources = package_sources(session, candidates, spaces, merge_cap);
    for source in sources.iter() {
        let uses = source.uses();
        if uses.is_empty() {
            continue;
        }
        let source_res = source.resource();
        let Some(source_pkgs) = spaces.get(&source_res) else {
            continue;
        };
        for used_pkg in uses {
            // Export wins over required wins over imported.
            let blames: Vec<Blame> = if let Some(b) = source_pkgs.exported.get(&used_pkg) {
                vec![b.clone()]
            } else if let Some(bs) = source_pkgs.required.get(&used_pkg) {
                bs.clone()
            } else if let Some(bs) = source_pkgs.imported.get(&used_pkg) {
                bs.clone()
            } else {
                continue;
            };
            for blame in blames {
                let extended = match &blame.requirements {
                    Some(reqs) => {
                        let mut c = (**chain).clone();
                        c.push(reqs.last().expect("blame chains are non-empty").clone());
                        Rc::new(c)
                    }
                    None => chain.clone(),
                };
                used_out
                    .entry(used_pkg)
                    .or_default()
                    .entry(blame.capability.clone())
                    .or_insert_with(|| UsedBlames::new(blame.capability.clone()))
                    .add(Blame::reached(blame.capability.clone(), extended.clone()), matching);
                merge_uses(
                    session,
                    candidates,
                    spaces,
                    used_out,
                    &blame.capability,
                    &extended,
                    matching,
                    cycle,
                );
            }
        }
    }
}

/// The transitive set of capabilities that can contribute a package to the
/// capability's owner: same-named exports of the owner, everything reached
/// through `required`, and — for non-package capabilities — the capability
/// itself when it carries a `uses` directive. Memoised per session attempt.
pub(crate) fn package_sources(
    session: &mut ResolveSession<'_>,
    candidates: &Candidates,
    spaces: &PackageSpaces,
    cap: &Capability,
) -> Rc<BTreeSet<Capability>> {
    if let Some(cached) = session.package_sources.get(cap) {
        return cached.clone();
    }
    let mut set = BTreeSet::new();
    let mut cycle = HashSet::new();
    package_sources_inner(candidates, spaces, cap, &mut set, &mut cycle);
    let set = Rc::new(set);
    session.package_sources.insert(cap.clone(), set.clone());
    set
}

fn package_sources_inner(
    candidates: &Candidates,
    spaces: &PackageSpaces,
    cap: &Capability,
    set: &mut BTreeSet<Capability>,
    cycle: &mut HashSet<Capability>,
) {
    if !cycle.insert(cap.clone()) {
        return;
    }
    if cap.namespace() == PACKAGE_NAMESPACE {
        let Some(pkg) = cap.package_name() else {
            return;
        };
        let resource = cap.resource();
        for c in resource.capabilities(Some(PACKAGE_NAMESPACE)) {
            if c.package_name() == Some(pkg) && !candidates.is_substituted(&c) {
                set.insert(c);
            }
        }
        if let Some(pkgs) = spaces.get(&resource) {
            if let Some(blames) = pkgs.required.get(&pkg) {
                for blame in blames {
                    package_sources_inner(candidates, spaces, &blame.capability, set, cycle);
                }
            }
        }
    } else if cap.directive(USES_DIRECTIVE).is_some() {
        set.insert(cap.clone());
    }
}
