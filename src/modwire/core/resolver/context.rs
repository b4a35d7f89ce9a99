//! The caller contract and the per-call session state.
//!
//! There are two sources of facts for the resolver: the `ResolveContext`
//! tells us which resources want resolving and which capabilities can
//! satisfy a requirement, and the existing `Wiring`s tell us what is
//! already decided. These are immutable facts; everything mutable during a
//! resolve lives in the `ResolveSession`, which is owned by a single
//! `resolve()` call and never shared.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::rc::Rc;

use tracing::debug;

use crate::core::namespace::{EFFECTIVE_DIRECTIVE, EFFECTIVE_RESOLVE};
use crate::core::resolver::candidates::{Candidates, Delta};
use crate::core::resource::{Capability, Requirement, Resource};
use crate::core::wiring::Wiring;

/// The contract a caller implements to drive a resolve.
///
/// Candidate ordering returned from `find_providers` is authoritative: the
/// resolver only reorders it to prefer already-resolved providers and to
/// break exact ties, and otherwise tries candidates front to back.
pub trait ResolveContext {
    /// Resources that must resolve; failure of any of these fails the
    /// whole resolve.
    fn mandatory_resources(&self) -> Vec<Resource>;

    /// Resources to resolve if possible; failures remove them from the
    /// working set instead of failing the resolve.
    fn optional_resources(&self) -> Vec<Resource> {
        Vec::new()
    }

    /// All capabilities satisfying `requirement`, most preferred first.
    fn find_providers(&self, requirement: &Requirement) -> Vec<Capability>;

    /// Already-resolved state. Resources present here are never re-wired,
    /// except through the dynamic entry point.
    fn wirings(&self) -> &HashMap<Resource, Wiring>;

    /// Decides where a fragment-contributed capability ranks in a candidate
    /// list it newly qualifies for, returning the insertion index. Must be
    /// deterministic for equal inputs. The default keeps capabilities of
    /// the same provider grouped together.
    fn insert_hosted_capability(
        &self,
        capabilities: &mut Vec<Capability>,
        hosted: Capability,
    ) -> usize {
        let provider = hosted.resource().declared();
        let at = capabilities
            .iter()
            .rposition(|c| c.resource().declared() == provider)
            .map(|i| i + 1)
            .unwrap_or(capabilities.len());
        capabilities.insert(at, hosted);
        at
    }

    /// Whether a requirement takes effect at resolve time. The default
    /// honours the `effective` directive.
    fn is_effective(&self, requirement: &Requirement) -> bool {
        requirement
            .directive(EFFECTIVE_DIRECTIVE)
            .map_or(true, |effective| effective == EFFECTIVE_RESOLVE)
    }

    /// Polled between permutation attempts; returning true aborts the
    /// resolve with `ResolutionError::Cancelled`.
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// All mutable state of one `resolve()` call.
pub(crate) struct ResolveSession<'a> {
    pub(crate) ctx: &'a dyn ResolveContext,
    /// High-priority queue, seeded by uses-conflict mitigations.
    uses_permutations: VecDeque<Candidates>,
    /// Low-priority queue, seeded by backtracking on import decisions.
    import_permutations: VecDeque<Candidates>,
    /// Present when multiple-cardinality relaxations succeeded this
    /// attempt; adopted as the final state if the attempt passes.
    pub(crate) multiple_card_candidates: Option<Candidates>,
    /// Fingerprints of permutations already attempted.
    pub(crate) processed_deltas: HashSet<Delta>,
    /// On-demand resources and whether they are still attachable.
    valid_on_demand: HashMap<Resource, bool>,
    /// Memoised transitive package sources, valid within one attempt.
    pub(crate) package_sources: HashMap<Capability, Rc<BTreeSet<Capability>>>,
}

impl<'a> ResolveSession<'a> {
    pub(crate) fn new(ctx: &'a dyn ResolveContext) -> ResolveSession<'a> {
        ResolveSession {
            ctx,
            uses_permutations: VecDeque::new(),
            import_permutations: VecDeque::new(),
            multiple_card_candidates: None,
            processed_deltas: HashSet::new(),
            valid_on_demand: HashMap::new(),
            package_sources: HashMap::new(),
        }
    }

    pub(crate) fn add_uses_permutation(&mut self, candidates: Candidates) {
        debug!(queue = "uses", pending = self.uses_permutations.len() + 1, "enqueue permutation");
        self.uses_permutations.push_back(candidates);
    }

    pub(crate) fn add_import_permutation(&mut self, candidates: Candidates) {
        debug!(
            queue = "import",
            pending = self.import_permutations.len() + 1,
            "enqueue permutation"
        );
        self.import_permutations.push_back(candidates);
    }

    /// Dequeues the next permutation to try, preferring uses-permutations.
    pub(crate) fn next_permutation(&mut self) -> Option<Candidates> {
        self.uses_permutations
            .pop_front()
            .or_else(|| self.import_permutations.pop_front())
    }

    pub(crate) fn import_permutations(&self) -> &VecDeque<Candidates> {
        &self.import_permutations
    }

    /// Total permutations currently enqueued; used to detect whether a
    /// failed check produced any alternative to try.
    pub(crate) fn permutation_count(&self) -> usize {
        self.uses_permutations.len() + self.import_permutations.len()
    }

    pub(crate) fn clear_permutations(&mut self) {
        self.uses_permutations.clear();
        self.import_permutations.clear();
    }

    /// Resets per-attempt caches at the top of each permutation attempt.
    pub(crate) fn begin_attempt(&mut self) {
        self.package_sources.clear();
        self.multiple_card_candidates = None;
    }

    pub(crate) fn note_on_demand(&mut self, resource: &Resource) {
        self.valid_on_demand.entry(resource.clone()).or_insert(true);
    }

    pub(crate) fn is_on_demand(&self, resource: &Resource) -> bool {
        self.valid_on_demand.contains_key(resource)
    }

    pub(crate) fn on_demand_valid(&self, resource: &Resource) -> bool {
        *self.valid_on_demand.get(resource).unwrap_or(&true)
    }

    pub(crate) fn invalidate_on_demand(&mut self, resource: &Resource) {
        debug!(resource = %resource, "invalidating on-demand resource");
        self.valid_on_demand.insert(resource.clone(), false);
    }
}
