//! The candidate store: each populated requirement mapped to an ordered
//! list of capabilities that could satisfy it.
//!
//! A `Candidates` is the unit of backtracking: the search clones it once
//! per permutation and mutates the clone. Cloning has to be cheap because
//! a difficult uses-conflict can spawn thousands of permutations, so the
//! maps are persistent (`im_rc`) and the candidate lists are shared behind
//! `Rc` until a mutation actually touches one.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::rc::Rc;

use indexmap::IndexMap;
use itertools::Itertools;
use tracing::{debug, trace};

use crate::core::namespace::{
    BUNDLE_NAMESPACE, BUNDLE_VERSION_ATTRIBUTE, HOST_NAMESPACE, PACKAGE_NAMESPACE,
    VERSION_ATTRIBUTE,
};
use crate::core::resolver::context::ResolveSession;
use crate::core::resolver::errors::{ResolutionError, ResolveResult};
use crate::core::resource::{Capability, Requirement, Resource};

/// How a resource entered the population: requested outright, requested if
/// possible, or pulled in as an attachment.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum PopulateMode {
    Mandatory,
    Optional,
    OnDemand,
}

#[derive(Clone)]
enum PopulateState {
    /// Population in progress; a cyclic pull-in lands here and is assumed
    /// satisfiable until its own population finishes.
    Populating,
    Populated,
    Unsatisfied(Rc<ResolutionError>),
}

/// A fingerprint of a permutation: the tuple of first-candidate choices
/// over all populated requirements. Two permutations with equal deltas are
/// operationally identical and only one of them is ever checked.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub(crate) struct Delta(Vec<(u64, u64)>);

#[derive(Clone)]
pub(crate) struct Candidates {
    candidate_map: im_rc::HashMap<Requirement, Rc<Vec<Capability>>>,
    population: im_rc::HashMap<Resource, PopulateState>,
    /// Every resource that entered population, in pull-in order. Hosts are
    /// swapped for their wrapped form by `prepare`.
    resource_order: Rc<Vec<Resource>>,
    /// Declared host resource to its wrapped form.
    wrapped_hosts: im_rc::HashMap<Resource, Resource>,
    /// Export capability to the owner's import requirement for the same
    /// package; the import may substitute the export.
    substitutable: im_rc::HashMap<Capability, Requirement>,
    /// Exports substituted away in the current trial.
    substituted: im_rc::HashSet<Capability>,
}

impl Candidates {
    pub(crate) fn new() -> Candidates {
        Candidates {
            candidate_map: im_rc::HashMap::new(),
            population: im_rc::HashMap::new(),
            resource_order: Rc::new(Vec::new()),
            wrapped_hosts: im_rc::HashMap::new(),
            substitutable: im_rc::HashMap::new(),
            substituted: im_rc::HashSet::new(),
        }
    }

    /// Recursively pulls `resource` and every reachable provider into the
    /// population. Only a mandatory root failure is an error; optional and
    /// on-demand failures mark the resource unsatisfied and the caller
    /// carries on.
    pub(crate) fn populate(
        &mut self,
        session: &mut ResolveSession<'_>,
        resource: &Resource,
        mode: PopulateMode,
    ) -> ResolveResult<()> {
        match (mode, self.populate_resource(session, resource, mode)) {
            (PopulateMode::Mandatory, Some(err)) => Err((*err).clone()),
            _ => Ok(()),
        }
    }

    fn populate_resource(
        &mut self,
        session: &mut ResolveSession<'_>,
        resource: &Resource,
        mode: PopulateMode,
    ) -> Option<Rc<ResolutionError>> {
        match self.population.get(resource) {
            Some(PopulateState::Populated) | Some(PopulateState::Populating) => return None,
            Some(PopulateState::Unsatisfied(err)) => return Some(err.clone()),
            None => {}
        }
        if mode == PopulateMode::OnDemand {
            session.note_on_demand(resource);
            if !session.on_demand_valid(resource) {
                let err = Rc::new(ResolutionError::ResourceInvalidated {
                    resource: resource.clone(),
                });
                self.population
                    .insert(resource.clone(), PopulateState::Unsatisfied(err.clone()));
                return Some(err);
            }
        }
        self.population
            .insert(resource.clone(), PopulateState::Populating);
        Rc::make_mut(&mut self.resource_order).push(resource.clone());
        trace!(resource = %resource, ?mode, "populating");

        // Already-resolved resources contribute their wiring as fact; pull
        // in their providers so package spaces can be computed for them.
        if let Some(wiring) = session.ctx.wirings().get(resource) {
            for wire in wiring.required_wires(None) {
                let provider = wire.provider().clone();
                self.populate_resource(session, &provider, mode);
            }
            self.population
                .insert(resource.clone(), PopulateState::Populated);
            return None;
        }

        let mut failure: Option<Rc<ResolutionError>> = None;
        for req in resource.requirements(None) {
            if req.is_dynamic() || !session.ctx.is_effective(&req) {
                continue;
            }
            let offered = session.ctx.find_providers(&req);
            let mut caps = Vec::with_capacity(offered.len());
            for cap in offered {
                let provider = cap.resource();
                let keep = provider == *resource || {
                    let child_mode = if provider.is_fragment() || req.namespace() == HOST_NAMESPACE
                    {
                        PopulateMode::OnDemand
                    } else {
                        mode
                    };
                    self.populate_resource(session, &provider, child_mode).is_none()
                };
                if keep {
                    caps.push(cap);
                }
            }
            sort_candidates(session, &mut caps);
            if caps.is_empty() {
                if req.is_optional() {
                    continue;
                }
                failure = Some(Rc::new(ResolutionError::MissingRequirement {
                    requirement: req.clone(),
                }));
                break;
            }
            self.candidate_map.insert(req, Rc::new(caps));
        }

        match failure {
            Some(err) => {
                self.fail_resource(resource, err.clone());
                Some(err)
            }
            None => {
                self.population
                    .insert(resource.clone(), PopulateState::Populated);
                None
            }
        }
    }

    /// Seeds a single-requirement search for a dynamic import of an
    /// already-resolved host against a pre-ranked candidate list.
    pub(crate) fn populate_dynamic(
        &mut self,
        session: &mut ResolveSession<'_>,
        host: &Resource,
        requirement: &Requirement,
        matches: Vec<Capability>,
    ) -> ResolveResult<()> {
        self.populate_resource(session, host, PopulateMode::Mandatory);
        let mut caps = Vec::with_capacity(matches.len());
        for cap in matches {
            let provider = cap.resource();
            if provider == *host
                || self
                    .populate_resource(session, &provider, PopulateMode::Mandatory)
                    .is_none()
            {
                caps.push(cap);
            }
        }
        sort_candidates(session, &mut caps);
        if caps.is_empty() {
            return Err(ResolutionError::MissingRequirement {
                requirement: requirement.clone(),
            });
        }
        self.candidate_map.insert(requirement.clone(), Rc::new(caps));
        Ok(())
    }

    fn fail_resource(&mut self, resource: &Resource, err: Rc<ResolutionError>) {
        debug!(resource = %resource, error = %err, "resource unsatisfied");
        self.population
            .insert(resource.clone(), PopulateState::Unsatisfied(err));
        for req in resource.requirements(None) {
            self.candidate_map.remove(&req);
        }
    }

    /// Cascades unsatisfied resources out of everyone's candidate lists. A
    /// populated resource whose mandatory requirement loses its last
    /// candidate this way becomes unsatisfied too, so the pass repeats
    /// until a fixpoint.
    pub(crate) fn purge_unsatisfied(&mut self) {
        loop {
            let unsatisfied: HashSet<Resource> = self
                .resource_order
                .iter()
                .filter(|r| {
                    matches!(
                        self.population.get(*r),
                        Some(PopulateState::Unsatisfied(_))
                    )
                })
                .cloned()
                .collect();
            let mut changed = false;
            let mut newly_failed: Vec<(Resource, Rc<ResolutionError>)> = Vec::new();
            let order = self.resource_order.clone();
            for resource in order.iter() {
                if !matches!(self.population.get(resource), Some(PopulateState::Populated)) {
                    continue;
                }
                for req in resource.requirements(None) {
                    let Some(list) = self.candidate_map.get(&req) else {
                        continue;
                    };
                    if !list.iter().any(|c| unsatisfied.contains(&c.resource())) {
                        continue;
                    }
                    changed = true;
                    let filtered: Vec<Capability> = list
                        .iter()
                        .filter(|c| !unsatisfied.contains(&c.resource()))
                        .cloned()
                        .collect();
                    if filtered.is_empty() && !req.is_optional() {
                        newly_failed.push((
                            resource.clone(),
                            Rc::new(ResolutionError::MissingRequirement {
                                requirement: req.clone(),
                            }),
                        ));
                        break;
                    } else if filtered.is_empty() {
                        self.candidate_map.remove(&req);
                    } else {
                        self.candidate_map.insert(req, Rc::new(filtered));
                    }
                }
            }
            for (resource, err) in newly_failed {
                self.fail_resource(&resource, err);
            }
            if !changed {
                break;
            }
        }
    }

    /// The population failure recorded for `resource`, if any.
    pub(crate) fn failure_of(&self, resource: &Resource) -> Option<ResolutionError> {
        match self.population.get(resource) {
            Some(PopulateState::Unsatisfied(err)) => Some((**err).clone()),
            _ => None,
        }
    }

    pub(crate) fn is_populated(&self, resource: &Resource) -> bool {
        matches!(self.population.get(resource), Some(PopulateState::Populated))
    }

    /// Populated resources in pull-in order, hosts in wrapped form.
    pub(crate) fn resources(&self) -> Vec<Resource> {
        self.resource_order
            .iter()
            .filter(|r| self.is_populated(r))
            .cloned()
            .collect()
    }

    pub(crate) fn is_substituted(&self, capability: &Capability) -> bool {
        self.substituted.contains(capability)
    }

    /// Merges fragments into wrapped hosts. Fragment requirements in the
    /// payload namespaces are rewritten to name the wrap as requirer;
    /// fragment capabilities become hosted capabilities of the wrap and are
    /// re-ranked into candidate lists by the context. Rejects fragment
    /// attachment cycles.
    pub(crate) fn prepare(&mut self, session: &mut ResolveSession<'_>) -> ResolveResult<()> {
        // Which fragment attaches to which hosts. A fragment attaches to
        // every candidate host of its host requirement.
        let mut attachments: IndexMap<Resource, Vec<Resource>> = IndexMap::new();
        let mut fragment_hosts: HashMap<Resource, Vec<Resource>> = HashMap::new();
        let order = self.resource_order.clone();
        for resource in order.iter() {
            if !self.is_populated(resource) || !resource.is_fragment() {
                continue;
            }
            let host_req = resource
                .host_requirement()
                .expect("fragment declares a host requirement");
            let Some(hosts) = self.candidate_map.get(&host_req) else {
                continue;
            };
            for cap in hosts.iter() {
                let host = cap.resource();
                if session.ctx.wirings().contains_key(&host) {
                    continue;
                }
                let attached = attachments.entry(host.clone()).or_default();
                if !attached.contains(resource) {
                    attached.push(resource.clone());
                    fragment_hosts
                        .entry(resource.clone())
                        .or_default()
                        .push(host);
                }
            }
        }

        // A fragment transitively attaching to itself cannot be merged.
        for fragment in fragment_hosts.keys().sorted() {
            let mut seen = HashSet::new();
            let mut stack = fragment_hosts[fragment].clone();
            while let Some(host) = stack.pop() {
                if host == *fragment {
                    return Err(ResolutionError::FragmentCycle {
                        fragment: fragment.clone(),
                        requirement: fragment
                            .host_requirement()
                            .expect("fragment declares a host requirement"),
                    });
                }
                if seen.insert(host.clone()) {
                    if let Some(next) = fragment_hosts.get(&host) {
                        stack.extend(next.iter().cloned());
                    }
                }
            }
        }

        if attachments.is_empty() {
            self.record_substitutables();
            return Ok(());
        }

        // Build every wrap, then rewrite candidate lists in one pass:
        // host-owned capabilities swap in place, fragment-contributed ones
        // are removed and re-inserted where the context ranks them.
        let mut host_swap: HashMap<Capability, Capability> = HashMap::new();
        let mut hosted: Vec<Capability> = Vec::new();
        let mut wraps: Vec<Resource> = Vec::new();
        for (host, fragments) in &attachments {
            let wrap = Resource::wrapped(host, fragments.clone());
            debug!(host = %host, fragments = fragments.len(), "wrapping host");
            self.wrapped_hosts.insert(host.clone(), wrap.clone());
            self.population
                .insert(wrap.clone(), PopulateState::Populated);
            for cap in wrap.capabilities(None) {
                if cap.is_hosted() {
                    hosted.push(cap);
                } else {
                    host_swap.insert(cap.declared(), cap);
                }
            }
            wraps.push(wrap);
        }

        let reqs: Vec<Requirement> = self
            .candidate_map
            .keys()
            .cloned()
            .sorted_by_key(|r| r.id())
            .collect();
        for req in reqs {
            let list = self.candidate_map.get(&req).expect("key just listed");
            let needs_rewrite = list
                .iter()
                .any(|c| host_swap.contains_key(c) || hosted.iter().any(|h| h.declared() == *c));
            if !needs_rewrite {
                continue;
            }
            let mut rewritten: Vec<Capability> = Vec::with_capacity(list.len());
            let mut displaced: Vec<Capability> = Vec::new();
            for cap in list.iter() {
                if let Some(swapped) = host_swap.get(cap) {
                    rewritten.push(swapped.clone());
                } else if hosted.iter().any(|h| h.declared() == *cap) {
                    displaced.push(cap.clone());
                } else {
                    rewritten.push(cap.clone());
                }
            }
            for declared in displaced {
                for hosted_cap in hosted.iter().filter(|h| h.declared() == declared) {
                    session
                        .ctx
                        .insert_hosted_capability(&mut rewritten, hosted_cap.clone());
                }
            }
            self.candidate_map.insert(req, Rc::new(rewritten));
        }

        // The wrap's requirements take over the declared candidate lists;
        // the declared payload entries are retired so only the wrapped form
        // is walked from here on. Fragment host and non-payload entries
        // stay: they drive the fragment's own wires.
        for wrap in &wraps {
            for req in wrap.requirements(None) {
                let declared = req.declared();
                if let Some(list) = self.candidate_map.remove(&declared) {
                    self.candidate_map.insert(req, list);
                }
            }
        }

        // Swap hosts for their wraps in walk order.
        let order = Rc::make_mut(&mut self.resource_order);
        for slot in order.iter_mut() {
            if let Some(wrap) = self.wrapped_hosts.get(slot) {
                *slot = wrap.clone();
            }
        }

        self.record_substitutables();
        Ok(())
    }

    /// Records exports that their owner also imports; the import may end up
    /// substituting the export on any given trial.
    fn record_substitutables(&mut self) {
        let order = self.resource_order.clone();
        for resource in order.iter() {
            if !self.is_populated(resource) || resource.is_fragment() {
                continue;
            }
            for cap in resource.capabilities(Some(PACKAGE_NAMESPACE)) {
                let Some(pkg) = cap.package_name() else {
                    continue;
                };
                let import = resource.requirements(Some(PACKAGE_NAMESPACE)).into_iter().find(
                    |req| {
                        !req.is_dynamic()
                            && req.filter().eq_str(PACKAGE_NAMESPACE) == Some(pkg)
                            && self.candidate_map.contains_key(req)
                    },
                );
                if let Some(import) = import {
                    self.substitutable.insert(cap, import);
                }
            }
        }
    }

    /// Works out which substitutable exports are actually substituted on
    /// this trial and removes them from every candidate list. A mandatory
    /// requirement left without candidates is a contradiction: an import
    /// permutation flipping the substituting import is pushed and the trial
    /// fails.
    pub(crate) fn check_substitutes(
        &mut self,
        session: &mut ResolveSession<'_>,
    ) -> ResolveResult<()> {
        self.substituted = im_rc::HashSet::new();
        if self.substitutable.is_empty() {
            return Ok(());
        }

        let mut statuses: HashMap<Capability, SubstituteStatus> = HashMap::new();
        let caps: Vec<Capability> = self.substitutable.keys().cloned().sorted().collect();
        for cap in &caps {
            self.substitute_status(cap, &mut statuses);
        }
        for cap in &caps {
            if statuses.get(cap) == Some(&SubstituteStatus::Substituted) {
                trace!(capability = %cap, "export substituted by import");
                self.substituted.insert(cap.clone());
            }
        }
        if self.substituted.is_empty() {
            return Ok(());
        }

        let reqs: Vec<Requirement> = self
            .candidate_map
            .keys()
            .cloned()
            .sorted_by_key(|r| r.id())
            .collect();
        for req in reqs {
            let list = self.candidate_map.get(&req).expect("key just listed");
            let Some(offender) = list.iter().find(|c| self.substituted.contains(*c)).cloned()
            else {
                continue;
            };
            let filtered: Vec<Capability> = list
                .iter()
                .filter(|c| !self.substituted.contains(*c))
                .cloned()
                .collect();
            if filtered.is_empty() && !req.is_optional() {
                let import = self
                    .substitutable
                    .get(&offender)
                    .expect("substituted exports are substitutable")
                    .clone();
                if let Some(perm) = self.permutate(&import) {
                    session.add_import_permutation(perm);
                }
                return Err(ResolutionError::SubstituteConflict {
                    requirement: req,
                    capability: offender.declared(),
                });
            }
            self.candidate_map.insert(req, Rc::new(filtered));
        }
        Ok(())
    }

    fn substitute_status(
        &self,
        cap: &Capability,
        statuses: &mut HashMap<Capability, SubstituteStatus>,
    ) -> SubstituteStatus {
        if let Some(status) = statuses.get(cap) {
            return *status;
        }
        statuses.insert(cap.clone(), SubstituteStatus::Processing);
        let import = self
            .substitutable
            .get(cap)
            .expect("status only queried for substitutable exports");
        let mut result = SubstituteStatus::Exported;
        if let Some(list) = self.candidate_map.get(import) {
            for cand in list.iter() {
                if cand == cap {
                    // The import would pick our own export; nothing is
                    // substituted.
                    break;
                }
                let cand_status = if self.substitutable.contains_key(cand) {
                    self.substitute_status(cand, statuses)
                } else {
                    SubstituteStatus::Exported
                };
                match cand_status {
                    SubstituteStatus::Exported => {
                        result = SubstituteStatus::Substituted;
                        break;
                    }
                    // A substituted or in-cycle candidate cannot provide the
                    // package; try the next one.
                    SubstituteStatus::Substituted | SubstituteStatus::Processing => continue,
                }
            }
        }
        statuses.insert(cap.clone(), result);
        result
    }

    pub(crate) fn candidates(&self, requirement: &Requirement) -> Option<Rc<Vec<Capability>>> {
        self.candidate_map
            .get(requirement)
            .filter(|list| !list.is_empty())
            .cloned()
    }

    pub(crate) fn first_candidate(&self, requirement: &Requirement) -> Option<Capability> {
        self.candidate_map
            .get(requirement)
            .and_then(|list| list.first().cloned())
    }

    /// A copy with `requirement`'s first candidate rotated to the tail, or
    /// `None` when there is nothing to rotate to.
    pub(crate) fn permutate(&self, requirement: &Requirement) -> Option<Candidates> {
        let list = self.candidate_map.get(requirement)?;
        if list.len() < 2 {
            return None;
        }
        let mut copy = self.clone();
        copy.rotate_first(requirement);
        Some(copy)
    }

    /// Like `permutate`, but skips when a queued permutation already made a
    /// different first-candidate choice for `requirement`.
    pub(crate) fn permutate_if_needed(
        &self,
        requirement: &Requirement,
        queue: &VecDeque<Candidates>,
    ) -> Option<Candidates> {
        let list = self.candidate_map.get(requirement)?;
        if list.len() < 2 {
            return None;
        }
        let current = list.first().cloned();
        for queued in queue {
            if queued.first_candidate(requirement) != current {
                return None;
            }
        }
        self.permutate(requirement)
    }

    pub(crate) fn rotate_first(&mut self, requirement: &Requirement) {
        if let Some(list) = self.candidate_map.get(requirement) {
            if list.len() >= 2 {
                let mut rotated = (**list).clone();
                let head = rotated.remove(0);
                rotated.push(head);
                self.candidate_map
                    .insert(requirement.clone(), Rc::new(rotated));
            }
        }
    }

    /// Whether dropping the head still leaves the requirement satisfiable:
    /// another candidate remains, or the requirement is optional.
    pub(crate) fn can_remove_candidate(&self, requirement: &Requirement) -> bool {
        match self.candidate_map.get(requirement) {
            Some(list) => list.len() >= 2 || requirement.is_optional(),
            None => false,
        }
    }

    pub(crate) fn remove_first_candidate(&mut self, requirement: &Requirement) {
        if let Some(list) = self.candidate_map.get(requirement) {
            if !list.is_empty() {
                let mut shortened = (**list).clone();
                shortened.remove(0);
                self.candidate_map
                    .insert(requirement.clone(), Rc::new(shortened));
            }
        }
    }

    /// For a multiple-cardinality requirement, keeps only candidates not in
    /// `remove` and returns the survivors.
    pub(crate) fn clear_candidates(
        &mut self,
        requirement: &Requirement,
        remove: &BTreeSet<Capability>,
    ) -> Rc<Vec<Capability>> {
        let survivors: Vec<Capability> = self
            .candidate_map
            .get(requirement)
            .map(|list| {
                list.iter()
                    .filter(|c| !remove.contains(*c))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        let survivors = Rc::new(survivors);
        self.candidate_map
            .insert(requirement.clone(), survivors.clone());
        survivors
    }

    pub(crate) fn delta(&self) -> Delta {
        let mut entries: Vec<(u64, u64)> = self
            .candidate_map
            .iter()
            .map(|(req, list)| (req.id(), list.first().map(|c| c.id()).unwrap_or(0)))
            .collect();
        entries.sort_unstable();
        Delta(entries)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum SubstituteStatus {
    Processing,
    Exported,
    Substituted,
}

/// Stable sort applied over the context-supplied order: already-resolved
/// providers first, then namespace tie-breakers (symbolic name ascending,
/// version descending), then provider id.
fn sort_candidates(session: &ResolveSession<'_>, caps: &mut [Capability]) {
    let wirings = session.ctx.wirings();
    caps.sort_by(|a, b| {
        let ra = a.resource().declared();
        let rb = b.resource().declared();
        let resolved_a = wirings.contains_key(&ra);
        let resolved_b = wirings.contains_key(&rb);
        resolved_b
            .cmp(&resolved_a)
            .then_with(|| {
                let ns = a.namespace();
                if ns == BUNDLE_NAMESPACE {
                    let name_a = a.attr(BUNDLE_NAMESPACE).and_then(|v| v.as_str());
                    let name_b = b.attr(BUNDLE_NAMESPACE).and_then(|v| v.as_str());
                    name_a.cmp(&name_b).then_with(|| {
                        b.version_attr(BUNDLE_VERSION_ATTRIBUTE)
                            .cmp(&a.version_attr(BUNDLE_VERSION_ATTRIBUTE))
                    })
                } else if ns == PACKAGE_NAMESPACE {
                    a.package_name().cmp(&b.package_name()).then_with(|| {
                        b.version_attr(VERSION_ATTRIBUTE)
                            .cmp(&a.version_attr(VERSION_ATTRIBUTE))
                    })
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .then(ra.id().cmp(&rb.id()))
    });
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::rc::Rc;

    use semver::Version;

    use super::Candidates;
    use crate::core::namespace::PACKAGE_NAMESPACE;
    use crate::core::resource::Resource;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn fixture() -> (Candidates, crate::core::resource::Requirement) {
        let a = Resource::build("a", v("1.0.0"))
            .export_package("x", v("1.0.0"), &[])
            .finish();
        let b = Resource::build("b", v("1.0.0"))
            .export_package("x", v("2.0.0"), &[])
            .finish();
        let importer = Resource::build("imp", v("1.0.0"))
            .import_package("x", semver::VersionReq::STAR)
            .finish();
        let req = importer.requirements(Some(PACKAGE_NAMESPACE)).remove(0);
        let caps = vec![
            a.capabilities(Some(PACKAGE_NAMESPACE)).remove(0),
            b.capabilities(Some(PACKAGE_NAMESPACE)).remove(0),
        ];
        let mut candidates = Candidates::new();
        candidates.candidate_map.insert(req.clone(), Rc::new(caps));
        (candidates, req)
    }

    #[test]
    fn permutate_rotates_head_to_tail() {
        let (candidates, req) = fixture();
        let before = candidates.first_candidate(&req).unwrap();
        let rotated = candidates.permutate(&req).unwrap();
        let after = rotated.first_candidate(&req).unwrap();
        assert_ne!(before, after);
        // The original candidate is still reachable at the tail.
        assert_eq!(rotated.candidates(&req).unwrap().len(), 2);
        assert_eq!(rotated.candidates(&req).unwrap()[1], before);
    }

    #[test]
    fn delta_distinguishes_permutations() {
        let (candidates, req) = fixture();
        let rotated = candidates.permutate(&req).unwrap();
        assert_ne!(candidates.delta(), rotated.delta());
        // Rotating twice over a two-candidate list is the identity.
        assert_eq!(candidates.delta(), rotated.permutate(&req).unwrap().delta());
    }

    #[test]
    fn permutate_if_needed_skips_queued_choice() {
        let (candidates, req) = fixture();
        let mut queue = VecDeque::new();
        queue.push_back(candidates.permutate(&req).unwrap());
        // The queued permutation already made a different choice for `req`.
        assert!(candidates.permutate_if_needed(&req, &queue).is_none());
        assert!(candidates.permutate_if_needed(&req, &VecDeque::new()).is_some());
    }
}
