//! Natural ordering of chapter and page names.

use std::cmp::Ordering;

use once_cell::sync::Lazy;
use regex_lite::Regex;

static FIRST_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

/// The first run of digits in `name` as an integer, or 0 when there is none.
pub fn first_number(name: &str) -> u64 {
    FIRST_DIGITS
        .find(name)
        .map(|m| m.as_str().parse().unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Compare by first digit run, then by the full name.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    first_number(a)
        .cmp(&first_number(b))
        .then_with(|| a.cmp(b))
}

/// Rank names in natural order, returning `(name, 1-based rank)` pairs.
pub fn assign_chapter_numbers<S: AsRef<str>>(names: &[S]) -> Vec<(String, u32)> {
    let mut sorted: Vec<&str> = names.iter().map(|n| n.as_ref()).collect();
    sorted.sort_by(|a, b| natural_cmp(a, b));
    sorted.dedup();

    sorted
        .into_iter()
        .zip(1u32..)
        .map(|(name, number)| (name.to_string(), number))
        .collect()
}
