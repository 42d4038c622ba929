//! Citation key assignment.
//!
//! Keys follow Pandoc citation syntax: the lowercased first-author surname,
//! followed by the publication year when one is known (`smith2021`).
//! References without authors fall into the `untitled` family.
//!
//! | first-author surname | base key (no year) |
//! |----------------------|--------------------|
//! | `Smith`              | `smith`            |
//! | `O'Brien`            | `obrien`           |
//! | `García-Márquez`     | `garcíamárquez`    |
//!
//! Only letters and digits survive; punctuation and whitespace are dropped
//! so every key is a bare Pandoc `@key`.
//!
//! Collisions inside a batch and against already-persisted references are
//! resolved deterministically, in batch insertion order:
//!
//! | persisted with same base | batch members get                 |
//! |--------------------------|-----------------------------------|
//! | 0                        | `smith`, `smitha`, `smithb`, ...  |
//! | n > 0                    | suffixes continuing from n        |
//!
//! Author-derived keys take letter suffixes, `untitled` keys take numbers
//! (`untitled`, `untitled1`, `untitled2`, ...).

use std::collections::{HashMap, HashSet};

use chrono::Datelike;

use crate::models::Reference;

const UNTITLED: &str = "untitled";

/// The unsuffixed key a reference would get if it were alone in its project.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BaseKey {
    pub key: String,
    /// Untitled-derived keys use numeric suffixes instead of letters.
    pub untitled: bool,
}

pub fn base_key(reference: &Reference) -> BaseKey {
    let year = reference
        .published_date
        .map(|d| d.year().to_string())
        .unwrap_or_default();

    let surname = reference
        .authors
        .first()
        .and_then(|a| a.effective_surname())
        .map(normalize_surname)
        .filter(|s| !s.is_empty());

    match surname {
        Some(s) => BaseKey {
            key: format!("{s}{year}"),
            untitled: false,
        },
        None => BaseKey {
            key: format!("{UNTITLED}{year}"),
            untitled: true,
        },
    }
}

/// Lowercase and keep alphanumerics only.
fn normalize_surname(surname: &str) -> String {
    surname
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Suffix for the n-th collision of a base key (n >= 1).
///
/// Letters run `a..z`, then `aa, ab, ...` so keys stay alphanumeric past 26.
fn suffix(base: &BaseKey, n: usize) -> String {
    if base.untitled {
        return n.to_string();
    }
    let mut n = n;
    let mut letters = Vec::new();
    while n > 0 {
        n -= 1;
        letters.push((b'a' + (n % 26) as u8) as char);
        n /= 26;
    }
    letters.iter().rev().collect()
}

fn keyed(base: &BaseKey, n: usize) -> String {
    if n == 0 {
        base.key.clone()
    } else {
        format!("{}{}", base.key, suffix(base, n))
    }
}

/// Assign a unique `citation_key` to every reference in `batch`.
///
/// `existing` is the project's already-persisted reference list. Existing keys
/// are never modified. Group membership and continuation are counted by base
/// key; a generated key that is already taken (for instance because a user
/// patched a key by hand) is skipped in favour of the next suffix.
pub fn assign_citation_keys(existing: &[Reference], batch: &mut [Reference]) {
    let mut existing_count: HashMap<BaseKey, usize> = HashMap::new();
    for r in existing {
        *existing_count.entry(base_key(r)).or_insert(0) += 1;
    }

    let mut taken: HashSet<String> = existing
        .iter()
        .filter_map(|r| r.citation_key.clone())
        .collect();

    // Group in first-seen order; members keep batch order.
    let mut groups: Vec<(BaseKey, Vec<usize>)> = Vec::new();
    let mut group_of: HashMap<BaseKey, usize> = HashMap::new();
    for (i, r) in batch.iter().enumerate() {
        let base = base_key(r);
        match group_of.get(&base) {
            Some(&g) => groups[g].1.push(i),
            None => {
                group_of.insert(base.clone(), groups.len());
                groups.push((base, vec![i]));
            }
        }
    }

    for (base, members) in groups {
        let mut n = existing_count.get(&base).copied().unwrap_or(0);
        for idx in members {
            let mut key = keyed(&base, n);
            while taken.contains(&key) {
                n += 1;
                key = keyed(&base, n);
            }
            taken.insert(key.clone());
            batch[idx].citation_key = Some(key);
            n += 1;
        }
    }
}
