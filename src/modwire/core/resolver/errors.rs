//! Resolution failures and their diagnostics.
//!
//! The resolver either returns a complete wire map or exactly one
//! `ResolutionError`. Uses-constraint violations render the dependency
//! chains that exposed the conflicting providers, so the reader can see
//! *how* two providers of the same package became visible to one module.

use std::fmt;

use thiserror::Error;

use crate::core::resource::{Capability, Requirement, Resource};
use crate::util::InternedString;

pub type ResolveResult<T> = Result<T, ResolutionError>;

#[derive(Debug, Clone, Error)]
pub enum ResolutionError {
    #[error(
        "unable to resolve {}: missing provider for requirement `{}`",
        .requirement.resource().declared(),
        .requirement
    )]
    MissingRequirement { requirement: Requirement },

    #[error("fragment attachment cycle involving {}", .fragment)]
    FragmentCycle {
        fragment: Resource,
        requirement: Requirement,
    },

    #[error(
        "{} dynamically imports package '{}' which is already visible to it",
        .requirement.resource().declared(),
        .package
    )]
    DynamicAlreadyVisible {
        requirement: Requirement,
        package: InternedString,
    },

    #[error(
        "substituted export `{}` left requirement `{}` of {} without candidates",
        .capability,
        .requirement,
        .requirement.resource().declared()
    )]
    SubstituteConflict {
        requirement: Requirement,
        capability: Capability,
    },

    #[error("{0}")]
    UsesConflict(UsesConflict),

    #[error("resource {} was invalidated after an earlier failure", .resource)]
    ResourceInvalidated { resource: Resource },

    #[error("resolve cancelled")]
    Cancelled,
}

impl ResolutionError {
    /// The requirements that are root causes of this failure, in the sense
    /// of the error contract: rotating or dropping a candidate of one of
    /// these could have avoided the failure.
    pub fn unresolved_requirements(&self) -> Vec<Requirement> {
        match self {
            ResolutionError::MissingRequirement { requirement } => vec![requirement.declared()],
            ResolutionError::FragmentCycle { requirement, .. } => vec![requirement.declared()],
            ResolutionError::DynamicAlreadyVisible { requirement, .. } => {
                vec![requirement.declared()]
            }
            ResolutionError::SubstituteConflict { requirement, .. } => {
                vec![requirement.declared()]
            }
            ResolutionError::UsesConflict(conflict) => conflict.root_requirements(),
            ResolutionError::ResourceInvalidated { .. } | ResolutionError::Cancelled => vec![],
        }
    }

    /// The declared resources implicated by this failure; drives the
    /// retry-with-optional-removal pass.
    pub(crate) fn implicated_resources(&self) -> Vec<Resource> {
        let mut resources: Vec<Resource> = self
            .unresolved_requirements()
            .iter()
            .map(|r| r.resource().declared())
            .collect();
        match self {
            ResolutionError::FragmentCycle { fragment, .. } => resources.push(fragment.clone()),
            ResolutionError::ResourceInvalidated { resource } => resources.push(resource.clone()),
            ResolutionError::UsesConflict(conflict) => {
                resources.push(conflict.resource.clone());
            }
            _ => {}
        }
        resources.sort();
        resources.dedup();
        resources
    }

    /// Total length of the blame chains cited by this error. The search
    /// keeps the error with the shortest chains for the final diagnostic.
    pub(crate) fn chain_weight(&self) -> usize {
        match self {
            ResolutionError::UsesConflict(conflict) => conflict.chain_weight(),
            _ => 0,
        }
    }
}

/// One dependency chain from a requirer down to the capability it was
/// exposed to: the root requirement belongs to the resource under check,
/// and each traversed requirement leads to the resource making the next
/// one, ending at the blamed capability.
#[derive(Debug, Clone)]
pub struct BlameChain {
    pub(crate) capability: Capability,
    pub(crate) requirements: Vec<Requirement>,
}

impl BlameChain {
    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub(crate) fn root(&self) -> Option<Requirement> {
        self.requirements.first().map(|r| r.declared())
    }
}

impl fmt::Display for BlameChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.requirements.first() {
            Some(root) => write!(f, "`{}`", root.resource().declared())?,
            None => write!(f, "`{}`", self.capability.resource().declared())?,
        }
        for (idx, req) in self.requirements.iter().enumerate() {
            write!(f, "\n    ... which requires `{}`", req.declared())?;
            let provider = match self.requirements.get(idx + 1) {
                Some(next) => next.resource().declared(),
                None => self.capability.resource().declared(),
            };
            write!(f, "\n    ... which is satisfied by `{}`", provider)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub(crate) enum ConflictKind {
    /// A fragment imported a package from one provider while its host (or
    /// another fragment) imported it from another.
    FragmentImport { first: BlameChain, second: BlameChain },
    /// The resource exports the package but is also exposed to another
    /// provider of it through a `uses` directive.
    ExportUsed { export: Capability, used: BlameChain },
    /// The resource imports (or requires) the package from one provider but
    /// is exposed to another through a `uses` directive.
    ImportUsed { import: BlameChain, used: BlameChain },
}

/// A class-space inconsistency: from one module's view, two incomparable
/// providers supply the same package.
#[derive(Debug, Clone)]
pub struct UsesConflict {
    pub(crate) resource: Resource,
    pub(crate) package: InternedString,
    pub(crate) kind: ConflictKind,
}

impl UsesConflict {
    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn package(&self) -> InternedString {
        self.package
    }

    fn root_requirements(&self) -> Vec<Requirement> {
        let mut roots = Vec::new();
        let mut push = |chain: &BlameChain| {
            if let Some(root) = chain.root() {
                roots.push(root);
            }
        };
        match &self.kind {
            ConflictKind::FragmentImport { first, second } => {
                push(first);
                push(second);
            }
            ConflictKind::ExportUsed { used, .. } => push(used),
            ConflictKind::ImportUsed { import, used } => {
                push(import);
                push(used);
            }
        }
        roots.sort();
        roots.dedup();
        roots
    }

    fn chain_weight(&self) -> usize {
        match &self.kind {
            ConflictKind::FragmentImport { first, second } => {
                first.requirements.len() + second.requirements.len()
            }
            ConflictKind::ExportUsed { used, .. } => used.requirements.len(),
            ConflictKind::ImportUsed { import, used } => {
                import.requirements.len() + used.requirements.len()
            }
        }
    }
}

impl fmt::Display for UsesConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ConflictKind::FragmentImport { first, second } => {
                write!(
                    f,
                    "uses constraint violation: {} imports package '{}' from \
                     both `{}` and `{}`.\n\nChain 1:\n  {}\n\nChain 2:\n  {}",
                    self.resource,
                    self.package,
                    first.capability.resource().declared(),
                    second.capability.resource().declared(),
                    first,
                    second
                )
            }
            ConflictKind::ExportUsed { export, used } => {
                write!(
                    f,
                    "uses constraint violation: {} exports package '{}' but is \
                     also exposed to it from `{}`.\n\nExport:\n  `{}`\n\nExposed via:\n  {}",
                    self.resource,
                    self.package,
                    used.capability.resource().declared(),
                    export.declared(),
                    used
                )
            }
            ConflictKind::ImportUsed { import, used } => {
                write!(
                    f,
                    "uses constraint violation: {} obtains package '{}' from \
                     `{}` but is also exposed to it from `{}`.\n\nObtained via:\n  \
                     {}\n\nExposed via:\n  {}",
                    self.resource,
                    self.package,
                    import.capability.resource().declared(),
                    used.capability.resource().declared(),
                    import,
                    used
                )
            }
        }
    }
}
