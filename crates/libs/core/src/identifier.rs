//! Stable policy identifier derivation.

/// Builds the stable identifier for a policy: `kind.namespace.name`, lowercased.
///
/// An empty namespace is preserved as an empty segment (`kind..name`), it is
/// never skipped or collapsed.
#[must_use]
pub fn identifier(kind: &str, namespace: &str, name: &str) -> String {
    format!(
        "{}.{}.{}",
        kind.to_lowercase(),
        namespace.to_lowercase(),
        name.to_lowercase()
    )
}
