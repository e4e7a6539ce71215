//! Collision-resistant object names for test resources.
//!
//! Every resource a scenario creates is named through [`object_name`] so
//! that two runs executing concurrently against the same cluster can never
//! collide, even inside a shared namespace. Names satisfy the RFC 1123
//! label rules the cluster enforces: lowercase alphanumerics and `-`,
//! starting and ending with an alphanumeric, at most 63 characters.

use uuid::Uuid;

/// Maximum length of an RFC 1123 label.
const MAX_LABEL_LEN: usize = 63;

/// Random suffix length in hex characters. 48 bits of randomness keeps the
/// collision odds negligible across any realistic number of parallel runs.
const SUFFIX_LEN: usize = 12;

/// Produces a unique, RFC 1123-safe object name with the given prefix.
///
/// The prefix is sanitized (lowercased, invalid runs collapsed to `-`) and
/// truncated so that prefix, separator, and random suffix fit in 63
/// characters together.
///
/// # Example
///
/// ```
/// use conveyor_harness::names::object_name;
///
/// let name = object_name("kaniko-git");
/// assert!(name.starts_with("kaniko-git-"));
/// assert!(name.len() <= 63);
/// ```
pub fn object_name(prefix: &str) -> String {
    let mut base = sanitize(prefix);
    let budget = MAX_LABEL_LEN - SUFFIX_LEN - 1;
    if base.len() > budget {
        base.truncate(budget);
        while base.ends_with('-') {
            base.pop();
        }
    }
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", base, &suffix[..SUFFIX_LEN])
}

/// Lowercases and strips a candidate name down to RFC 1123 label characters.
///
/// Runs of invalid characters collapse into a single `-`; leading and
/// trailing separators are dropped. An input with no usable characters maps
/// to `"x"` rather than an empty (and thus invalid) label.
fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for c in raw.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_sep && !out.is_empty() {
                out.push('-');
            }
            pending_sep = false;
            out.push(c);
        } else {
            pending_sep = true;
        }
    }
    if out.is_empty() {
        out.push('x');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn is_rfc1123_label(name: &str) -> bool {
        !name.is_empty()
            && name.len() <= MAX_LABEL_LEN
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            && !name.starts_with('-')
            && !name.ends_with('-')
    }

    #[test]
    fn names_are_unique_across_many_calls() {
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(object_name("conveyor-e2e")));
        }
    }

    #[test]
    fn names_keep_the_prefix() {
        let name = object_name("skopeo-inspect");
        assert!(name.starts_with("skopeo-inspect-"));
    }

    #[test]
    fn names_are_valid_labels() {
        for prefix in ["conveyor-e2e", "Test_Name", "UPPER", "a", ""] {
            let name = object_name(prefix);
            assert!(is_rfc1123_label(&name), "invalid label: {name:?}");
        }
    }

    #[test]
    fn long_prefixes_are_truncated_to_fit() {
        let long = "a".repeat(200);
        let name = object_name(&long);
        assert!(name.len() <= MAX_LABEL_LEN);
        assert!(is_rfc1123_label(&name));
    }

    #[test]
    fn invalid_characters_collapse_to_single_separator() {
        assert_eq!(sanitize("Kaniko Task//Test"), "kaniko-task-test");
        assert_eq!(sanitize("__"), "x");
        assert_eq!(sanitize("--abc--"), "abc");
    }
}
