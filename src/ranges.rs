//! Numeric range compression for grouped citation labels.
//!
//! `[1,2,3,5,7,8]` is displayed as `[1-3,5,7,8]`: runs of three or more
//! consecutive numbers fold into `a-b`, shorter runs stay comma separated.

use std::sync::OnceLock;

use regex::Regex;

fn bracket_group_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\[\]]*)\]").expect("bracket group regex is valid"))
}

/// Compresses a set of citation numbers into range notation (without brackets).
///
/// Input order and duplicates do not matter.
///
/// # Examples
///
/// ```
/// use wordref::ranges::compress;
///
/// assert_eq!(compress(&[5, 1, 2, 3, 7, 8, 2]), "1-3,5,7,8");
/// ```
pub fn compress(indices: &[usize]) -> String {
    let mut sorted = indices.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut parts: Vec<String> = Vec::new();
    let mut i = 0;
    while i < sorted.len() {
        let start = sorted[i];
        let mut end = start;
        let mut j = i + 1;
        while j < sorted.len() && sorted[j] == end + 1 {
            end = sorted[j];
            j += 1;
        }

        match j - i {
            1 => parts.push(start.to_string()),
            2 => {
                parts.push(start.to_string());
                parts.push(end.to_string());
            }
            _ => parts.push(format!("{}-{}", start, end)),
        }
        i = j;
    }

    parts.join(",")
}

/// Compresses and wraps the result in a single bracket pair: `[1-3,5]`.
///
/// An empty set renders as `[?]` so that a label is never blank.
pub fn bracketed(indices: &[usize]) -> String {
    let inner = compress(indices);
    if inner.is_empty() {
        "[?]".to_string()
    } else {
        format!("[{}]", inner)
    }
}

/// Parses every bracketed group in `text` back into the numbers it names.
///
/// Ranges are inclusive and accepted in either direction (`[6-3]` is
/// `3,4,5,6`). Tokens that are not numbers or ranges are skipped. The result
/// keeps the order in which numbers were read and may contain duplicates.
pub fn parse(text: &str) -> Vec<usize> {
    let mut numbers = Vec::new();

    for cap in bracket_group_regex().captures_iter(text) {
        let inner = cap.get(1).map(|m| m.as_str()).unwrap_or_default();
        for token in inner.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }

            if let Some((lo, hi)) = token.split_once('-') {
                let (Ok(lo), Ok(hi)) = (lo.trim().parse::<usize>(), hi.trim().parse::<usize>())
                else {
                    continue;
                };
                let (from, to) = if lo <= hi { (lo, hi) } else { (hi, lo) };
                numbers.extend(from..=to);
            } else if let Ok(n) = token.parse::<usize>() {
                numbers.push(n);
            }
        }
    }

    numbers
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    // ============================================
    // Tests for compress()
    // ============================================

    #[test]
    fn test_compress_mixed_runs() {
        assert_eq!(compress(&[1, 2, 3, 5, 7, 8]), "1-3,5,7,8");
    }

    #[test]
    fn test_compress_pair_stays_comma_separated() {
        assert_eq!(compress(&[3, 4]), "3,4");
    }

    #[test]
    fn test_compress_long_run() {
        assert_eq!(compress(&[3, 4, 5, 6]), "3-6");
    }

    #[test]
    fn test_compress_unsorted_with_duplicates() {
        // Given: Numbers out of order with repeats
        let input = [9, 2, 1, 2, 3, 9];

        // When: We compress them
        let result = compress(&input);

        // Then: They are deduplicated and sorted before folding
        assert_eq!(result, "1-3,9");
    }

    #[test]
    fn test_compress_empty() {
        assert_eq!(compress(&[]), "");
        assert_eq!(bracketed(&[]), "[?]");
    }

    #[test]
    fn test_bracketed_single() {
        assert_eq!(bracketed(&[4]), "[4]");
    }

    // ============================================
    // Tests for parse()
    // ============================================

    #[test]
    fn test_parse_expands_ranges() {
        assert_eq!(parse("[1-3,5]"), vec![1, 2, 3, 5]);
    }

    #[test]
    fn test_parse_reversed_range() {
        assert_eq!(parse("[6-3]"), vec![3, 4, 5, 6]);
    }

    #[test]
    fn test_parse_multiple_groups_and_noise() {
        // Given: Several bracket groups mixed with prose and junk tokens
        let text = "see [2, 4] and [x, 7-8] but not 9";

        // When: We parse
        let result = parse(text);

        // Then: Only bracketed numbers are collected
        assert_eq!(result, vec![2, 4, 7, 8]);
    }

    #[test]
    fn test_parse_without_brackets_is_empty() {
        assert!(parse("1,2,3").is_empty());
    }

    #[test]
    fn test_compress_parse_reconstructs_set() {
        let samples: Vec<Vec<usize>> = vec![
            vec![1],
            vec![1, 2],
            vec![1, 2, 3, 5, 7, 8],
            vec![10, 4, 5, 6, 11, 12, 20],
            vec![3, 3, 3],
            (1..=40).filter(|n| n % 3 != 0).collect(),
        ];

        for sample in samples {
            let expected: BTreeSet<usize> = sample.iter().copied().collect();
            let parsed: BTreeSet<usize> = parse(&bracketed(&sample)).into_iter().collect();
            assert_eq!(parsed, expected, "round trip failed for {:?}", sample);
        }
    }
}
