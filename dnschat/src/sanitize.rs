//! Sanitizer & Label Composer (spec.md §4.1).
//!
//! Turns arbitrary user text into a single DNS label, then composes it with a
//! configured zone into a fully qualified query name. The pipeline below is
//! the single source of truth; any other implementation touching labels
//! (native transport, test harness) MUST match it byte-for-byte, which is why
//! [`debug_sanitize_label`] exists as a cross-validation hook (spec.md §9).

use unicode_normalization::UnicodeNormalization;

use crate::error::SanitizeError;
use crate::types::{Fqdn, Label};

const MAX_RAW_INPUT: usize = 120;
const MAX_LABEL_LEN: usize = 63;
const MAX_FQDN_LEN: usize = 253;

/// Normalize, lowercase, and strip `input` down to a single DNS label.
///
/// Algorithm (strict order, spec.md §4.1):
/// 1. Unicode-fold to ASCII by stripping combining marks (NFD decompose, drop
///    combining-mark codepoints, drop anything left non-ASCII).
/// 2. Lowercase.
/// 3. Trim leading/trailing whitespace.
/// 4. Replace runs of whitespace with a single `-`.
/// 5. Drop every byte not in `[a-z0-9-]`.
/// 6. Collapse runs of `-` to a single `-`.
/// 7. Strip leading/trailing `-`.
/// 8. Length check 1..=63.
pub fn sanitize(input: &str) -> Result<Label, SanitizeError> {
    if input.chars().count() > MAX_RAW_INPUT {
        return Err(SanitizeError::InputTooLong {
            len: input.chars().count(),
        });
    }

    let folded: String = input
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .chars()
        .filter(|c| c.is_ascii())
        .collect();

    let lowered = folded.to_lowercase();
    let trimmed = lowered.trim();

    let whitespace_collapsed = collapse_whitespace_to_dash(trimmed);

    let allowed_only: String = whitespace_collapsed
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .collect();

    let dash_collapsed = collapse_dashes(&allowed_only);
    let stripped = dash_collapsed.trim_matches('-');

    if stripped.is_empty() {
        return Err(SanitizeError::LabelEmpty);
    }
    if stripped.len() > MAX_LABEL_LEN {
        return Err(SanitizeError::LabelTooLong {
            len: stripped.len(),
        });
    }

    Ok(Label(stripped.to_string()))
}

/// Debug hook echoing the sanitized label, so other runtimes participating in
/// the same product can cross-validate their own sanitizer against this one
/// (spec.md §4.1, §9).
pub fn debug_sanitize_label(input: &str) -> Result<Label, SanitizeError> {
    sanitize(input)
}

fn is_combining_mark(c: char) -> bool {
    matches!(c,
        '\u{0300}'..='\u{036F}'   // Combining Diacritical Marks
        | '\u{1AB0}'..='\u{1AFF}' // Combining Diacritical Marks Extended
        | '\u{1DC0}'..='\u{1DFF}' // Combining Diacritical Marks Supplement
        | '\u{20D0}'..='\u{20FF}' // Combining Diacritical Marks for Symbols
        | '\u{FE20}'..='\u{FE2F}' // Combining Half Marks
    )
}

fn collapse_whitespace_to_dash(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_run = false;
    for c in s.chars() {
        if c.is_whitespace() {
            if !in_run {
                out.push('-');
                in_run = true;
            }
        } else {
            out.push(c);
            in_run = false;
        }
    }
    out
}

fn collapse_dashes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_dash = false;
    for c in s.chars() {
        if c == '-' {
            if !last_was_dash {
                out.push('-');
            }
            last_was_dash = true;
        } else {
            out.push(c);
            last_was_dash = false;
        }
    }
    out
}

/// Validate a single zone label per the same charset rules as a sanitized
/// label (spec.md §4.1 Composition).
fn validate_zone_label(label: &str) -> Result<(), SanitizeError> {
    if label.is_empty() || label.len() > MAX_LABEL_LEN {
        return Err(SanitizeError::InvalidZoneLabel {
            label: label.to_string(),
        });
    }
    if label.starts_with('-') || label.ends_with('-') {
        return Err(SanitizeError::InvalidZoneLabel {
            label: label.to_string(),
        });
    }
    if !label
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(SanitizeError::InvalidZoneLabel {
            label: label.to_string(),
        });
    }
    Ok(())
}

/// Append `zone`'s labels to `label`, producing `<label>.<zone-label-1>.…`.
///
/// Each zone label is independently validated; the resulting FQDN MUST
/// encode to no more than 253 bytes on the wire (spec.md §4.1).
pub fn compose_fqdn(label: &Label, zone: &str) -> Result<Fqdn, SanitizeError> {
    for zone_label in zone.split('.') {
        validate_zone_label(zone_label)?;
    }

    let fqdn = format!("{}.{}", label.as_str(), zone);
    let wire_len: usize = fqdn
        .split('.')
        .map(|l| l.len() + 1)
        .sum::<usize>()
        + 1; // terminating root label
    if wire_len > MAX_FQDN_LEN {
        return Err(SanitizeError::FqdnTooLong { len: wire_len });
    }

    Ok(Fqdn(fqdn))
}

#[test]
fn test_unicode_normalization_to_label() {
    let label = sanitize("Água São Paulo").unwrap();
    assert_eq!(label.as_str(), "agua-sao-paulo");
}

#[test]
fn test_lowercase_and_whitespace_collapse() {
    let label = sanitize("  Hello   World  ").unwrap();
    assert_eq!(label.as_str(), "hello-world");
}

#[test]
fn test_drops_disallowed_bytes() {
    let label = sanitize("what's up?!").unwrap();
    assert_eq!(label.as_str(), "whats-up");
}

#[test]
fn test_dash_collapse_and_trim() {
    let label = sanitize("--a----b--").unwrap();
    assert_eq!(label.as_str(), "a-b");
}

#[test]
fn test_input_too_long() {
    let input = "a".repeat(121);
    assert_eq!(
        sanitize(&input),
        Err(SanitizeError::InputTooLong { len: 121 })
    );
}

#[test]
fn test_label_empty_after_stripping() {
    assert_eq!(sanitize("!!!???"), Err(SanitizeError::LabelEmpty));
}

#[test]
fn test_label_too_long() {
    let input = "a".repeat(64);
    assert_eq!(
        sanitize(&input),
        Err(SanitizeError::LabelTooLong { len: 64 })
    );
}

#[test]
fn test_idempotence() {
    let inputs = ["Hello Swift DNS", "Água São Paulo", "a--b  c!!d", ""];
    for input in inputs {
        if let Ok(once) = sanitize(input) {
            let twice = sanitize(once.as_str()).unwrap();
            assert_eq!(once, twice);
        }
    }
}

#[test]
fn test_output_shape() {
    let cases = ["Hello Swift DNS", "Água São Paulo", "!!a!!", "123-abc"];
    for input in cases {
        if let Ok(label) = sanitize(input) {
            let s = label.as_str();
            assert!(!s.is_empty() && s.len() <= 63);
            assert!(!s.starts_with('-') && !s.ends_with('-'));
            assert!(!s.contains("--"));
            assert!(s
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        }
    }
}

#[test]
fn test_compose_fqdn() {
    let label = sanitize("Hello Swift DNS").unwrap();
    let fqdn = compose_fqdn(&label, "ch.at").unwrap();
    assert_eq!(fqdn.as_str(), "hello-swift-dns.ch.at");
}

#[test]
fn test_compose_fqdn_rejects_bad_zone_label() {
    let label = sanitize("hello").unwrap();
    assert!(compose_fqdn(&label, "-bad.at").is_err());
}
