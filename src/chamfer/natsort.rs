//! Natural filename ordering.
//!
//! Splits names into alternating numeric and non-numeric chunks and
//! compares numeric chunks by integer value, so `out_2.png` sorts before
//! `out_10.png`. Numeric chunks are compared without parsing (leading
//! zeros stripped, then length, then lexicographic), which keeps
//! arbitrarily long digit runs exact.

use std::cmp::Ordering;

/// Chunked numeric/non-numeric comparison of two names.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();
    let mut i = 0;
    let mut j = 0;
    while i < a_bytes.len() && j < b_bytes.len() {
        let ca = a_bytes[i];
        let cb = b_bytes[j];
        if ca.is_ascii_digit() && cb.is_ascii_digit() {
            let run_a = digit_run(a_bytes, i);
            let run_b = digit_run(b_bytes, j);
            match compare_digit_runs(&a_bytes[i..run_a], &b_bytes[j..run_b]) {
                Ordering::Equal => {
                    i = run_a;
                    j = run_b;
                }
                unequal => return unequal,
            }
        } else {
            match ca.cmp(&cb) {
                Ordering::Equal => {
                    i += 1;
                    j += 1;
                }
                unequal => return unequal,
            }
        }
    }
    // One name is a prefix of the other (up to numeric equivalence); the
    // shorter sorts first, then plain ordering breaks leading-zero ties.
    (a_bytes.len() - i).cmp(&(b_bytes.len() - j)).then_with(|| a.cmp(b))
}

fn digit_run(bytes: &[u8], start: usize) -> usize {
    let mut end = start;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    end
}

fn compare_digit_runs(a: &[u8], b: &[u8]) -> Ordering {
    let a = strip_leading_zeros(a);
    let b = strip_leading_zeros(b);
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn strip_leading_zeros(run: &[u8]) -> &[u8] {
    let first = run.iter().position(|&d| d != b'0').unwrap_or(run.len());
    &run[first..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_chunks_compare_by_value() {
        assert_eq!(natural_cmp("out_2.png", "out_10.png"), Ordering::Less);
        assert_eq!(natural_cmp("out_9.png", "out_10.png"), Ordering::Less);
        assert_eq!(natural_cmp("out_10.png", "out_10.png"), Ordering::Equal);
        assert_eq!(natural_cmp("out_100.png", "out_99.png"), Ordering::Greater);
    }

    #[test]
    fn test_mixed_chunks() {
        assert_eq!(natural_cmp("a1b2", "a1b10"), Ordering::Less);
        assert_eq!(natural_cmp("a2b0", "a10a9"), Ordering::Less);
        assert_eq!(natural_cmp("alpha", "beta"), Ordering::Less);
        assert_eq!(natural_cmp("out_", "out_1.png"), Ordering::Less);
    }

    #[test]
    fn test_leading_zeros() {
        assert_eq!(natural_cmp("out_002.png", "out_10.png"), Ordering::Less);
        // Equal values fall back to plain ordering.
        assert_eq!(natural_cmp("out_002.png", "out_2.png"), Ordering::Less);
    }

    #[test]
    fn test_sorting_a_stack() {
        let mut names = vec!["out_10.png", "out_0.png", "out_2.png", "out_1.png"];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(
            names,
            vec!["out_0.png", "out_1.png", "out_2.png", "out_10.png"]
        );
    }

    #[test]
    fn test_long_digit_runs_do_not_overflow() {
        let a = format!("x{}", "9".repeat(40));
        let b = format!("x1{}", "0".repeat(40));
        assert_eq!(natural_cmp(&a, &b), Ordering::Less);
    }
}
