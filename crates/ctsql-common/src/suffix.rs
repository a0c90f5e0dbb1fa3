//! Registered-domain (eTLD+1) decomposition over the public suffix list.

use serde::{Deserialize, Serialize};

/// A DNS name split at its public suffix.
///
/// `domain` is the public suffix plus exactly one leading label, `label` is
/// that leading label alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegisteredDomain {
    pub domain: String,
    pub suffix: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SuffixError {
    #[error("Suffix: empty label in '{0}'")]
    EmptyLabel(String),

    #[error("Suffix: '{0}' has no registrable domain")]
    NoRegisteredDomain(String),
}

/// Decomposes `name` into registered domain, public suffix and label.
///
/// Names that are themselves a public suffix, single-label names and names
/// with empty labels fail; callers skip those names. Results are lowercase.
///
/// # Examples
///
/// ```
/// use ctsql_common::suffix::decompose;
///
/// let parts = decompose("www.example.co.uk").unwrap();
/// assert_eq!(parts.domain, "example.co.uk");
/// assert_eq!(parts.suffix, "co.uk");
/// assert_eq!(parts.label, "example");
///
/// assert!(decompose("localhost").is_err());
/// ```
pub fn decompose(name: &str) -> Result<RegisteredDomain, SuffixError> {
    if name.is_empty() || name.starts_with('.') || name.ends_with('.') || name.contains("..") {
        return Err(SuffixError::EmptyLabel(name.to_string()));
    }

    // The suffix list is lowercase.
    let lowered = name.to_ascii_lowercase();
    let domain = psl::domain_str(&lowered)
        .ok_or_else(|| SuffixError::NoRegisteredDomain(name.to_string()))?;
    let suffix = psl::suffix_str(domain)
        .ok_or_else(|| SuffixError::NoRegisteredDomain(name.to_string()))?;
    let label = domain
        .strip_suffix(suffix)
        .and_then(|rest| rest.strip_suffix('.'))
        .filter(|label| !label.is_empty())
        .ok_or_else(|| SuffixError::NoRegisteredDomain(name.to_string()))?;

    Ok(RegisteredDomain {
        domain: domain.to_string(),
        suffix: suffix.to_string(),
        label: label.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_multi_label_suffix() {
        let parts = decompose("www.example.co.uk").unwrap();
        assert_eq!(
            parts,
            RegisteredDomain {
                domain: "example.co.uk".into(),
                suffix: "co.uk".into(),
                label: "example".into(),
            }
        );
    }

    #[test]
    fn splits_plain_tld() {
        let parts = decompose("a.b.example.com").unwrap();
        assert_eq!(parts.domain, "example.com");
        assert_eq!(parts.suffix, "com");
        assert_eq!(parts.label, "example");
    }

    #[test]
    fn registered_domain_maps_to_itself() {
        let parts = decompose("example.org").unwrap();
        assert_eq!(parts.domain, "example.org");
        assert_eq!(parts.label, "example");
    }

    #[test]
    fn wildcard_names_decompose_to_their_parent() {
        let parts = decompose("*.example.com").unwrap();
        assert_eq!(parts.domain, "example.com");
    }

    #[test]
    fn mixed_case_names_are_lowercased() {
        let parts = decompose("WWW.Example.CO.UK").unwrap();
        assert_eq!(
            parts,
            RegisteredDomain {
                domain: "example.co.uk".into(),
                suffix: "co.uk".into(),
                label: "example".into(),
            }
        );
    }

    #[test]
    fn single_label_is_rejected() {
        assert_eq!(
            decompose("localhost"),
            Err(SuffixError::NoRegisteredDomain("localhost".into()))
        );
    }

    #[test]
    fn bare_suffix_is_rejected() {
        assert!(decompose("co.uk").is_err());
        assert!(decompose("com").is_err());
    }

    #[test]
    fn empty_labels_are_rejected() {
        assert!(matches!(decompose(""), Err(SuffixError::EmptyLabel(_))));
        assert!(matches!(decompose(".example.com"), Err(SuffixError::EmptyLabel(_))));
        assert!(matches!(decompose("example.com."), Err(SuffixError::EmptyLabel(_))));
        assert!(matches!(decompose("www..example.com"), Err(SuffixError::EmptyLabel(_))));
    }
}
