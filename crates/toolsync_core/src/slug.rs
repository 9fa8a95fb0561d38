//! Filesystem- and identifier-safe service slugs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowercase, dash-separated form of a service name.
///
/// Used for per-service directories in both the state store and the
/// generated output tree, and as the catalog key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceSlug(String);

impl ServiceSlug {
    /// Derive a slug from a service name
    ///
    /// Runs of non-alphanumeric characters collapse to a single `-`, leading and
    /// trailing dashes are trimmed, and an empty result becomes `service`.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        let mut slug = String::with_capacity(name.len());
        let mut pending_dash = false;
        for ch in name.chars() {
            if ch.is_ascii_alphanumeric() {
                if pending_dash && !slug.is_empty() {
                    slug.push('-');
                }
                pending_dash = false;
                slug.push(ch.to_ascii_lowercase());
            } else {
                pending_dash = true;
            }
        }
        if slug.is_empty() {
            slug.push_str("service");
        }
        Self(slug)
    }

    /// Get as string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// camelCase form, suitable as a namespace identifier
    #[must_use]
    pub fn to_camel_case(&self) -> String {
        let mut out = String::with_capacity(self.0.len());
        let mut upper_next = false;
        for ch in self.0.chars() {
            if ch == '-' {
                upper_next = true;
            } else if upper_next {
                out.push(ch.to_ascii_uppercase());
                upper_next = false;
            } else {
                out.push(ch);
            }
        }
        if out.starts_with(|c: char| c.is_ascii_digit()) {
            out.insert(0, '_');
        }
        out
    }
}

impl fmt::Display for ServiceSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ServiceSlug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
