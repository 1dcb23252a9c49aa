//! Reassembler (spec.md §4.3): combines ordered TXT segments — numbered
//! `n/N:content` chunks or plain strings — into one response string.
//!
//! Grounded in the index-keyed chunk reconstruction idiom of the file-chunk
//! node (ordered-by-index, explicit end marker), generalized from file
//! exfiltration chunks to TXT reassembly segments. Pure and deterministic:
//! identical input multisets always produce identical output regardless of
//! arrival order (spec.md §8).

use std::collections::BTreeMap;

use crate::error::InvalidResponseKind;
use crate::types::Segment;

fn classify(raw: &str) -> Segment {
    if let Some((head, content)) = raw.split_once(':') {
        if let Some((part, total)) = head.split_once('/') {
            if let (Ok(part_number), Ok(total_parts)) =
                (part.trim().parse::<u32>(), total.trim().parse::<u32>())
            {
                return Segment::Numbered {
                    part_number,
                    total_parts,
                    content: content.to_string(),
                };
            }
        }
    }
    Segment::Plain(raw.to_string())
}

/// Combine `raw_segments` into the final response text (spec.md §4.3 rules).
///
/// Only the final joined string is trimmed; interior whitespace inside a
/// segment's content (including a leading/trailing space meant to separate
/// two segments' text) is preserved verbatim.
pub fn reassemble(raw_segments: &[String]) -> Result<String, InvalidResponseKind> {
    let classified: Vec<Segment> = raw_segments
        .iter()
        .filter(|s| !s.trim().is_empty())
        .map(|s| classify(s))
        .collect();

    let numbered: Vec<(u32, u32, String)> = classified
        .iter()
        .filter_map(|s| match s {
            Segment::Numbered {
                part_number,
                total_parts,
                content,
            } => Some((*part_number, *total_parts, content.clone())),
            Segment::Plain(_) => None,
        })
        .collect();

    if numbered.is_empty() {
        let plain: String = classified
            .iter()
            .filter_map(|s| match s {
                Segment::Plain(content) => Some(content.as_str()),
                Segment::Numbered { .. } => None,
            })
            .collect();
        let trimmed = plain.trim();
        if trimmed.is_empty() {
            return Err(InvalidResponseKind::EmptyResponse);
        }
        return Ok(trimmed.to_string());
    }

    let expected_total = numbered[0].1;
    if numbered.iter().any(|(_, total, _)| *total != expected_total) {
        return Err(InvalidResponseKind::InconsistentTotal);
    }
    if expected_total == 0 {
        return Err(InvalidResponseKind::IncompleteResponse { missing: vec![] });
    }

    let mut parts: BTreeMap<u32, String> = BTreeMap::new();
    for (part_number, _total, content) in numbered {
        match parts.get(&part_number) {
            None => {
                parts.insert(part_number, content);
            }
            Some(existing) if *existing == content => {}
            Some(_) => {
                return Err(InvalidResponseKind::ConflictingPart { part_number });
            }
        }
    }

    let missing: Vec<u32> = (1..=expected_total)
        .filter(|n| !parts.contains_key(n))
        .collect();
    if !missing.is_empty() {
        return Err(InvalidResponseKind::IncompleteResponse { missing });
    }

    let joined: String = (1..=expected_total)
        .map(|n| parts.get(&n).unwrap().as_str())
        .collect();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        return Err(InvalidResponseKind::EmptyResponse);
    }

    Ok(trimmed.to_string())
}

#[cfg(test)]
fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_happy_path_numbered() {
    let segments = strings(&["1/2:Hello ", "2/2:World!"]);
    assert_eq!(reassemble(&segments).unwrap(), "Hello World!");
}

#[test]
fn test_permutation_invariance() {
    let forward = strings(&["1/3:a", "2/3:b", "3/3:c"]);
    let reversed = strings(&["3/3:c", "1/3:a", "2/3:b"]);
    assert_eq!(reassemble(&forward).unwrap(), reassemble(&reversed).unwrap());
}

#[test]
fn test_duplicate_tolerance() {
    let segments = strings(&["1/2:abc", "1/2:abc", "2/2:def"]);
    assert_eq!(reassemble(&segments).unwrap(), "abcdef");
}

#[test]
fn test_conflicting_duplicate() {
    let segments = strings(&["1/2:abc", "1/2:xyz", "2/2:def"]);
    assert_eq!(
        reassemble(&segments),
        Err(InvalidResponseKind::ConflictingPart { part_number: 1 })
    );
}

#[test]
fn test_missing_part() {
    let segments = strings(&["1/3:a", "3/3:c"]);
    assert_eq!(
        reassemble(&segments),
        Err(InvalidResponseKind::IncompleteResponse { missing: vec![2] })
    );
}

#[test]
fn test_inconsistent_total() {
    let segments = strings(&["1/2:a", "2/3:b"]);
    assert_eq!(
        reassemble(&segments),
        Err(InvalidResponseKind::InconsistentTotal)
    );
}

#[test]
fn test_plain_segments_concatenate_in_order() {
    let segments = strings(&["Hello ", "World!"]);
    assert_eq!(reassemble(&segments).unwrap(), "Hello World!");
}

#[test]
fn test_empty_response() {
    let segments = strings(&["  ", ""]);
    assert_eq!(reassemble(&segments), Err(InvalidResponseKind::EmptyResponse));
}
