//! Class-space consistency checking.
//!
//! After package spaces are computed for a permutation, every host is
//! checked: the providers it can see for a package (export, import,
//! require) must be compatible with the providers it is transitively
//! exposed to through `uses` directives. Two providers are compatible when
//! one's transitive source set contains the other's; incomparable source
//! sets are a conflict.
//!
//! A conflict is not the end of the line. The checker mitigates by
//! mutating a copy of the current candidates (rotating one requirement per
//! offending blame chain) into a high-priority uses-permutation, seeds
//! lower-priority import permutations that back out the original import
//! choices, and relaxes multiple-cardinality bindings by dropping the
//! root-cause candidates. The search loop then retries.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tracing::{debug, trace};

use crate::core::resolver::candidates::Candidates;
use crate::core::resolver::context::ResolveSession;
use crate::core::resolver::errors::{ConflictKind, ResolutionError, ResolveResult, UsesConflict};
use crate::core::resolver::packages::{package_sources, Blame, PackageSpaces, UsedBlames};
use crate::core::resource::{Capability, Requirement, Resource};
use crate::util::InternedString;

/// Checks every host of the current permutation, seeding permutations as
/// conflicts are found. Returns the first conflict; `Ok` means this
/// permutation is globally consistent.
pub(crate) fn check_consistency(
    session: &mut ResolveSession<'_>,
    candidates: &Candidates,
    spaces: &PackageSpaces,
) -> ResolveResult<()> {
    let mut check = ConsistencyCheck {
        session,
        candidates,
        spaces,
        checked: HashSet::new(),
        mutated: HashSet::new(),
        permutation: None,
    };
    for host in candidates.resources() {
        if host.is_fragment() {
            continue;
        }
        check.check_resource(&host)?;
    }
    Ok(())
}

struct ConsistencyCheck<'a, 's> {
    session: &'a mut ResolveSession<'s>,
    candidates: &'a Candidates,
    spaces: &'a PackageSpaces,
    /// Resources already found consistent this attempt.
    checked: HashSet<Resource>,
    /// Requirements already mutated this attempt; a chain stops at the
    /// first requirement another chain has already handled.
    mutated: HashSet<Requirement>,
    /// The single uses-permutation being accumulated this attempt.
    permutation: Option<Candidates>,
}

impl ConsistencyCheck<'_, '_> {
    fn check_resource(&mut self, resource: &Resource) -> ResolveResult<()> {
        if self.checked.contains(resource) {
            return Ok(());
        }
        let pkgs = &self.spaces[resource];

        // A fragment may have imported a package from one provider while
        // its host imported it from another; both blames sit on the same
        // imported entry of the wrap.
        for (pkg, blames) in &pkgs.imported {
            if blames.len() < 2 {
                continue;
            }
            let first = &blames[0];
            for other in &blames[1..] {
                if other.capability.resource() == first.capability.resource() {
                    continue;
                }
                for blame in [first, other] {
                    if let Some(root) = blame.root() {
                        if let Some(perm) = self.candidates.permutate(&root) {
                            self.session.add_import_permutation(perm);
                        }
                    }
                }
                return Err(ResolutionError::UsesConflict(UsesConflict {
                    resource: resource.declared(),
                    package: *pkg,
                    kind: ConflictKind::FragmentImport {
                        first: first.to_chain(),
                        second: other.to_chain(),
                    },
                }));
            }
        }

        // Exports against the uses closure.
        for (pkg, export) in &pkgs.exported {
            let Some(used_map) = pkgs.used.get(pkg) else {
                continue;
            };
            let current = std::slice::from_ref(export);
            if let Some(err) = self.check_used(resource, *pkg, current, used_map, true)? {
                return Err(err);
            }
        }

        // Imports and required packages against the uses closure; imports
        // shadow requires on a package-name collision.
        let mut merged: BTreeMap<InternedString, &Vec<Blame>> = BTreeMap::new();
        for (pkg, blames) in &pkgs.required {
            merged.insert(*pkg, blames);
        }
        for (pkg, blames) in &pkgs.imported {
            merged.insert(*pkg, blames);
        }
        for (pkg, blames) in merged {
            let Some(used_map) = pkgs.used.get(&pkg) else {
                continue;
            };
            if let Some(err) = self.check_used(resource, pkg, blames, used_map, false)? {
                return Err(err);
            }
        }

        self.checked.insert(resource.clone());

        // Everything this resource depends on must be consistent too. If a
        // child fails without leaving any permutation behind, backtracking
        // on the requirement that led there is the only move left.
        for req in resource.requirements(None) {
            let Some(cap) = self.candidates.first_candidate(&req) else {
                continue;
            };
            let provider = cap.resource();
            if provider == *resource || provider.is_fragment() {
                continue;
            }
            let before = self.session.permutation_count();
            if let Err(err) = self.check_resource(&provider) {
                if self.session.permutation_count() == before && self.permutation.is_none() {
                    if let Some(perm) = self
                        .candidates
                        .permutate_if_needed(&req, self.session.import_permutations())
                    {
                        self.session.add_import_permutation(perm);
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }

    /// Verifies one package's current providers against one `used` map
    /// entry set, mitigating each incompatibility. Returns a conflict only
    /// when some blame could not be relaxed through a multiple-cardinality
    /// drop; mutations and import seeds are left in the session either way.
    fn check_used(
        &mut self,
        resource: &Resource,
        pkg: InternedString,
        current: &[Blame],
        used_map: &BTreeMap<Capability, UsedBlames>,
        export_side: bool,
    ) -> ResolveResult<Option<ResolutionError>> {
        let mut rethrow: Option<ResolutionError> = None;
        let mut conflicting: Vec<&UsedBlames> = Vec::new();
        for used_blames in used_map.values() {
            let cap = &used_blames.capability;
            if self.is_compatible(current, cap) {
                continue;
            }
            trace!(resource = %resource, package = %pkg, capability = %cap, "incompatible package source");
            conflicting.push(used_blames);
            for used_blame in &used_blames.blames {
                if self.check_multiple(used_blames, used_blame) {
                    continue;
                }
                if rethrow.is_none() {
                    let used_chain = used_blames
                        .blames
                        .iter()
                        .min_by_key(|b| b.requirements.as_ref().map_or(0, |r| r.len()))
                        .expect("conflicting used entry has blames")
                        .to_chain();
                    let kind = if export_side {
                        ConflictKind::ExportUsed {
                            export: current[0].capability.declared(),
                            used: used_chain,
                        }
                    } else {
                        ConflictKind::ImportUsed {
                            import: current[0].to_chain(),
                            used: used_chain,
                        }
                    };
                    rethrow = Some(ResolutionError::UsesConflict(UsesConflict {
                        resource: resource.declared(),
                        package: pkg,
                        kind,
                    }));
                }
                self.mutate(used_blame);
            }
        }
        if let Some(err) = rethrow {
            debug!(resource = %resource, package = %pkg, "uses conflict");
            if let Some(perm) = self.permutation.take() {
                if !self.mutated.is_empty() {
                    self.session.add_uses_permutation(perm);
                }
            }
            self.seed_import_permutations(current, &conflicting);
            return Ok(Some(err));
        }
        Ok(None)
    }

    /// `true` iff one side's transitive source set contains the other's.
    fn is_compatible(&mut self, current: &[Blame], candidate: &Capability) -> bool {
        if current.len() == 1 && current[0].capability == *candidate {
            return true;
        }
        let candidate_sources =
            package_sources(self.session, self.candidates, self.spaces, candidate);
        let mut current_sources: BTreeSet<Capability> = BTreeSet::new();
        for blame in current {
            let sources =
                package_sources(self.session, self.candidates, self.spaces, &blame.capability);
            current_sources.extend(sources.iter().cloned());
        }
        current_sources.is_superset(&candidate_sources)
            || current_sources.is_subset(&candidate_sources)
    }

    /// Multiple-cardinality relaxation: when the blame's root requirement
    /// binds several providers, drop the root-cause candidates from the
    /// session's relaxation clone instead of permutating. Succeeds when at
    /// least one candidate survives the drop.
    fn check_multiple(&mut self, used_blames: &UsedBlames, blame: &Blame) -> bool {
        let Some(root) = blame.root() else {
            return false;
        };
        if !root.is_multiple() {
            return false;
        }
        if self.session.multiple_card_candidates.is_none() {
            self.session.multiple_card_candidates = Some(self.candidates.clone());
        }
        let causes = used_blames.root_causes(&root);
        let survivors = self
            .session
            .multiple_card_candidates
            .as_mut()
            .expect("relaxation clone created above")
            .clear_candidates(&root, &causes);
        !survivors.is_empty()
    }

    /// Walks a blame chain tail to head and rotates the first
    /// single-cardinality requirement nobody has mutated this attempt, on
    /// the shared uses-permutation clone. A requirement whose list cannot
    /// lose its head is skipped; a requirement already mutated ends the
    /// walk since the chain is covered.
    fn mutate(&mut self, blame: &Blame) {
        let Some(reqs) = &blame.requirements else {
            return;
        };
        for req in reqs.iter().rev() {
            if req.is_multiple() {
                continue;
            }
            if self.mutated.contains(req) {
                break;
            }
            let can = match &self.permutation {
                Some(perm) => perm.can_remove_candidate(req),
                None => self.candidates.can_remove_candidate(req),
            };
            if !can {
                continue;
            }
            let perm = self
                .permutation
                .get_or_insert_with(|| self.candidates.clone());
            if perm.candidates(req).map_or(0, |list| list.len()) >= 2 {
                perm.rotate_first(req);
            } else {
                perm.remove_first_candidate(req);
            }
            self.mutated.insert(req.clone());
            break;
        }
    }

    /// Secondary mitigation: for every requirement in the conflict's blame
    /// chains not already mutated, seed an import permutation backing out
    /// that choice. These run when the uses-permutations are exhausted.
    fn seed_import_permutations(&mut self, current: &[Blame], conflicting: &[&UsedBlames]) {
        let mut seen: HashSet<Requirement> = HashSet::new();
        let chains = current
            .iter()
            .chain(conflicting.iter().flat_map(|ub| ub.blames.iter()));
        for blame in chains {
            let Some(reqs) = &blame.requirements else {
                continue;
            };
            for req in reqs.iter() {
                if self.mutated.contains(req) || !seen.insert(req.clone()) {
                    continue;
                }
                if let Some(perm) = self
                    .candidates
                    .permutate_if_needed(req, self.session.import_permutations())
                {
                    self.session.add_import_permutation(perm);
                }
            }
        }
    }
}
