//! Resolution of a module wiring graph.
//!
//! This module implements the core logic in taking a set of modules with
//! their declared capabilities and requirements and deciding which
//! provider satisfies which requirement such that the whole graph is
//! consistent. Requirement satisfaction alone is the easy part; the hard
//! constraint is the transitive *uses* rule: when a module imports a
//! package from a provider, every package that provider's export uses
//! must, from the importer's view, come from the same place the provider
//! gets it. Finding an assignment that honours that everywhere is a search
//! over candidate permutations.
//!
//! The algorithm employed here is an outer loop over two queues of
//! candidate-store snapshots:
//!
//! * *uses-permutations* are seeded by the consistency checker when it can
//!   mitigate a conflict by rotating a requirement inside an offending
//!   blame chain. They are tried first because they encode a targeted fix.
//! * *import-permutations* back out an original import decision wholesale
//!   and are tried when the targeted fixes run dry.
//!
//! Every snapshot carries a delta fingerprint (the tuple of first-candidate
//! choices), and a fingerprint seen once is never checked again, which
//! keeps the search from revisiting equivalent states however it got
//! there. For each attempt the package spaces of every host are recomputed
//! from scratch and checked; the first consistent attempt wins and is
//! walked into the final wire map.
//!
//! When all permutations are exhausted and the best error implicates only
//! optional or on-demand resources, those are removed or invalidated and
//! the whole search restarts without them. A mandatory failure surfaces
//! the error with the shortest blame chains seen.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, trace};

use crate::core::namespace::{BUNDLE_NAMESPACE, HOST_NAMESPACE, PACKAGE_NAMESPACE, WIRING_NAMESPACE_PREFIX};
use crate::core::resource::{Capability, Requirement, Resource};
use crate::core::wiring::Wire;

use self::candidates::{Candidates, PopulateMode};
use self::context::ResolveSession;
use self::packages::calculate_package_spaces;
use self::uses::check_consistency;

pub use self::context::ResolveContext;
pub use self::errors::{BlameChain, ResolutionError, ResolveResult, UsesConflict};

mod candidates;
mod context;
mod errors;
mod packages;
mod uses;

/// The result of a successful resolve: for each newly-resolved resource
/// its wires, ordered package wires first, then bundle wires, then generic
/// capability wires. Fragments appear with their host wires.
pub type WireMap = HashMap<Resource, Vec<Wire>>;

/// Resolves the context's mandatory and optional resources into a wire
/// map, or explains why no consistent assignment exists.
pub fn resolve(ctx: &dyn ResolveContext) -> ResolveResult<WireMap> {
    let mut session = ResolveSession::new(ctx);
    let mandatory = ctx.mandatory_resources();
    let mut optional = ctx.optional_resources();

    loop {
        let mut candidates = Candidates::new();
        for resource in &mandatory {
            candidates.populate(&mut session, resource, PopulateMode::Mandatory)?;
        }
        for resource in &optional {
            let _ = candidates.populate(&mut session, resource, PopulateMode::Optional);
        }
        candidates.purge_unsatisfied();
        for resource in &mandatory {
            if let Some(err) = candidates.failure_of(resource) {
                return Err(err);
            }
        }
        candidates.prepare(&mut session)?;

        match run_search(&mut session, candidates) {
            Ok(final_candidates) => return Ok(build_wire_map(ctx, &final_candidates)),
            Err((err, faulty)) => {
                let removable = !faulty.is_empty()
                    && faulty.iter().all(|r| {
                        optional.contains(r)
                            || (session.is_on_demand(r) && !mandatory.contains(r))
                    });
                if !removable {
                    return Err(err);
                }
                let mut progressed = false;
                for resource in &faulty {
                    if optional.contains(resource) {
                        debug!(resource = %resource, "removing optional resource and retrying");
                        optional.retain(|o| o != resource);
                        progressed = true;
                    } else if session.on_demand_valid(resource) {
                        session.invalidate_on_demand(resource);
                        progressed = true;
                    }
                }
                if !progressed {
                    return Err(err);
                }
                session.processed_deltas.clear();
                session.clear_permutations();
            }
        }
    }
}

/// Resolves a single dynamic requirement of an already-resolved host
/// against a pre-ranked list of matching capabilities. On success the wire
/// map holds exactly the host's new dynamic wire, plus the wires of any
/// providers that had to be newly resolved to support it.
pub fn resolve_dynamic(
    ctx: &dyn ResolveContext,
    host: &Resource,
    requirement: &Requirement,
    matches: Vec<Capability>,
) -> ResolveResult<WireMap> {
    debug_assert!(requirement.is_dynamic());
    debug_assert!(ctx.wirings().contains_key(host));

    let mut session = ResolveSession::new(ctx);
    let mut candidates = Candidates::new();
    candidates.populate_dynamic(&mut session, host, requirement, matches)?;
    candidates.purge_unsatisfied();
    if candidates.candidates(requirement).is_none() {
        return Err(ResolutionError::MissingRequirement {
            requirement: requirement.clone(),
        });
    }
    candidates.prepare(&mut session)?;

    match run_search(&mut session, candidates) {
        Ok(final_candidates) => {
            Ok(build_dynamic_wire_map(ctx, &final_candidates, host, requirement))
        }
        Err((err, _)) => Err(err),
    }
}

/// The permutation loop. Returns the first consistent candidate state, or
/// the best error with the resources it implicates.
fn run_search(
    session: &mut ResolveSession<'_>,
    candidates: Candidates,
) -> Result<Candidates, (ResolutionError, BTreeSet<Resource>)> {
    session.add_uses_permutation(candidates);
    let mut best_error: Option<ResolutionError> = None;
    let mut min_faulty: Option<BTreeSet<Resource>> = None;
    let mut attempts = 0usize;

    while let Some(mut current) = session.next_permutation() {
        if session.ctx.is_cancelled() {
            return Err((ResolutionError::Cancelled, BTreeSet::new()));
        }
        let delta = current.delta();
        if !session.processed_deltas.insert(delta) {
            trace!("skipping already-processed permutation");
            continue;
        }
        attempts += 1;
        session.begin_attempt();
        trace!(attempt = attempts, "checking permutation");

        let outcome = (|| {
            current.check_substitutes(session)?;
            let spaces = calculate_package_spaces(session, &current)?;
            check_consistency(session, &current, &spaces)
        })();

        match outcome {
            Ok(()) => {
                debug!(attempts, "permutation is consistent");
                return Ok(session.multiple_card_candidates.take().unwrap_or(current));
            }
            Err(err) => {
                let faulty: BTreeSet<Resource> =
                    err.implicated_resources().into_iter().collect();
                if best_error
                    .as_ref()
                    .map_or(true, |best| err.chain_weight() < best.chain_weight())
                {
                    best_error = Some(err);
                }
                if min_faulty.as_ref().map_or(true, |min| faulty.len() < min.len()) {
                    min_faulty = Some(faulty);
                }
            }
        }
    }

    debug!(attempts, "permutations exhausted");
    let err = best_error.expect("search checked at least one permutation");
    Err((err, min_faulty.unwrap_or_default()))
}

fn build_wire_map(ctx: &dyn ResolveContext, candidates: &Candidates) -> WireMap {
    let mut map = WireMap::new();
    for resource in candidates.resources() {
        if resource.is_fragment() {
            continue;
        }
        populate_wires(ctx, candidates, &resource, &mut map);
    }
    map
}

/// Emits the wires of one resource (and recursively its unresolved
/// providers) into the map, in declared terms. Self-wires in the wiring
/// namespaces are never emitted. For a wrapped host, each attached
/// fragment receives its host wires and, once, its non-payload wires.
fn populate_wires(
    ctx: &dyn ResolveContext,
    candidates: &Candidates,
    resource: &Resource,
    map: &mut WireMap,
) {
    let declared = resource.declared();
    if ctx.wirings().contains_key(&declared) || map.contains_key(&declared) {
        return;
    }
    map.insert(declared.clone(), Vec::new());

    let mut package_wires = Vec::new();
    let mut bundle_wires = Vec::new();
    let mut capability_wires = Vec::new();
    // A host and an attached fragment may both import the same package; by
    // the time the permutation is consistent they agree on the provider,
    // and the package is wired once.
    let mut wired_packages = HashSet::new();
    for req in resource.requirements(None) {
        if req.is_dynamic() {
            continue;
        }
        let Some(list) = candidates.candidates(&req) else {
            continue;
        };
        for cap in list.iter() {
            let provider = cap.resource();
            let provider_declared = provider.declared();
            if !ctx.wirings().contains_key(&provider_declared) {
                populate_wires(ctx, candidates, &provider, map);
            }
            let self_wiring_wire = provider_declared == declared
                && cap.namespace().starts_with(WIRING_NAMESPACE_PREFIX);
            if !self_wiring_wire {
                let ns = req.namespace();
                let duplicate_package = ns == PACKAGE_NAMESPACE
                    && cap
                        .package_name()
                        .map_or(false, |pkg| !wired_packages.insert(pkg));
                if !duplicate_package {
                    let wire = Wire::new(
                        declared.clone(),
                        req.declared(),
                        provider_declared,
                        cap.declared(),
                    );
                    if ns == PACKAGE_NAMESPACE {
                        package_wires.push(wire);
                    } else if ns == BUNDLE_NAMESPACE {
                        bundle_wires.push(wire);
                    } else {
                        capability_wires.push(wire);
                    }
                }
            }
            if !req.is_multiple() {
                break;
            }
        }
    }
    let mut wires = package_wires;
    wires.extend(bundle_wires);
    wires.extend(capability_wires);
    map.insert(declared.clone(), wires);

    if let Some(fragments) = resource.fragments() {
        for fragment in fragments {
            let first_visit = !map.contains_key(fragment);
            let entry = map.entry(fragment.clone()).or_default();
            for freq in fragment.requirements(None) {
                let ns = freq.namespace();
                if ns == HOST_NAMESPACE {
                    if let Some(list) = candidates.candidates(&freq) {
                        for cap in list.iter().filter(|c| c.resource().declared() == declared) {
                            entry.push(Wire::new(
                                fragment.clone(),
                                freq.clone(),
                                declared.clone(),
                                cap.declared(),
                            ));
                        }
                    }
                } else if ns != PACKAGE_NAMESPACE && ns != BUNDLE_NAMESPACE && first_visit {
                    if let Some(cap) = candidates.first_candidate(&freq) {
                        entry.push(Wire::new(
                            fragment.clone(),
                            freq.clone(),
                            cap.resource().declared(),
                            cap.declared(),
                        ));
                    }
                }
            }
        }
    }
}

fn build_dynamic_wire_map(
    ctx: &dyn ResolveContext,
    candidates: &Candidates,
    host: &Resource,
    requirement: &Requirement,
) -> WireMap {
    let mut map = WireMap::new();
    let cap = candidates
        .first_candidate(requirement)
        .expect("dynamic requirement kept a candidate through the search");
    let provider = cap.resource();
    let provider_declared = provider.declared();
    if !ctx.wirings().contains_key(&provider_declared) {
        populate_wires(ctx, candidates, &provider, &mut map);
    }
    map.entry(host.clone()).or_default().insert(
        0,
        Wire::new(
            host.clone(),
            requirement.declared(),
            provider_declared,
            cap.declared(),
        ),
    );
    map
}
