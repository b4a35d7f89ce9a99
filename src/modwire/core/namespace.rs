//! Namespace and directive vocabulary.
//!
//! Capabilities and requirements are typed by a namespace string. Three
//! namespaces get special treatment from the resolver: the package namespace
//! (class-space imports/exports), the bundle namespace (require-bundle with
//! reexport visibility), and the host namespace (fragment attachment). Every
//! other namespace is generic: it is wired by filter match and participates
//! in uses-constraint checking only through its `uses` directive.

use crate::util::InternedString;

/// Package imports and exports.
pub const PACKAGE_NAMESPACE: &str = "osgi.wiring.package";
/// Whole-module requirements (require-bundle).
pub const BUNDLE_NAMESPACE: &str = "osgi.wiring.bundle";
/// Fragment-to-host attachment.
pub const HOST_NAMESPACE: &str = "osgi.wiring.host";
/// Module identity.
pub const IDENTITY_NAMESPACE: &str = "osgi.identity";
/// Execution environment; a non-payload namespace wired from fragments
/// directly rather than through their host.
pub const EXECUTION_ENVIRONMENT_NAMESPACE: &str = "osgi.ee";

/// Version attribute on package capabilities.
pub const VERSION_ATTRIBUTE: &str = "version";
/// Version attribute on bundle and host capabilities.
pub const BUNDLE_VERSION_ATTRIBUTE: &str = "bundle-version";

pub const USES_DIRECTIVE: &str = "uses";
pub const RESOLUTION_DIRECTIVE: &str = "resolution";
pub const CARDINALITY_DIRECTIVE: &str = "cardinality";
pub const EFFECTIVE_DIRECTIVE: &str = "effective";
pub const VISIBILITY_DIRECTIVE: &str = "visibility";

pub const RESOLUTION_MANDATORY: &str = "mandatory";
pub const RESOLUTION_OPTIONAL: &str = "optional";
pub const RESOLUTION_DYNAMIC: &str = "dynamic";
pub const CARDINALITY_SINGLE: &str = "single";
pub const CARDINALITY_MULTIPLE: &str = "multiple";
pub const VISIBILITY_PRIVATE: &str = "private";
pub const VISIBILITY_REEXPORT: &str = "reexport";
pub const EFFECTIVE_RESOLVE: &str = "resolve";

/// The prefix shared by the package, bundle, and host namespaces. Wires in
/// these namespaces are never emitted when requirer and provider are the
/// same resource.
pub const WIRING_NAMESPACE_PREFIX: &str = "osgi.wiring.";

/// Splits a `uses` directive value into its package names.
pub fn parse_uses(value: &str) -> Vec<InternedString> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(InternedString::new)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::parse_uses;

    #[test]
    fn uses_directive_splits_on_commas() {
        let pkgs = parse_uses("a.b, c.d ,e");
        let names: Vec<&str> = pkgs.iter().map(|p| p.as_str()).collect();
        assert_eq!(names, ["a.b", "c.d", "e"]);
    }

    #[test]
    fn empty_uses_directive_yields_nothing() {
        assert!(parse_uses("").is_empty());
        assert!(parse_uses(" , ").is_empty());
    }
}
