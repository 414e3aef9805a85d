//! Reduction of scope alternatives to a single advertised scope set.
//!
//! With [`ScopeAlgorithm::None`] every scope of every alternative is
//! advertised. [`ScopeAlgorithm::Greedy`] runs greedy set cover: the result
//! intersects every alternative, and is usually far smaller than the union.
//!
//! ```rust
//! use openapi_mcp_guard::oauth::extract::ScopeAlternative;
//! use openapi_mcp_guard::oauth::minimal::{ScopeAlgorithm, minimal_scopes};
//!
//! let alternatives = [
//!     ScopeAlternative::new(["scope1", "scope2"]).unwrap(),
//!     ScopeAlternative::new(["scope1"]).unwrap(),
//! ];
//!
//! let union = minimal_scopes(&alternatives, ScopeAlgorithm::None);
//! assert_eq!(union.len(), 2);
//!
//! let greedy = minimal_scopes(&alternatives, ScopeAlgorithm::Greedy);
//! assert_eq!(greedy.into_iter().collect::<Vec<_>>(), ["scope1"]);
//! ```

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::extract::ScopeAlternative;

/// How discovered alternatives are reduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScopeAlgorithm {
    /// Union of all scopes.
    #[default]
    None,
    /// Greedy set cover.
    Greedy,
}

/// Reduce `alternatives` with `algorithm`.
pub fn minimal_scopes(alternatives: &[ScopeAlternative], algorithm: ScopeAlgorithm) -> BTreeSet<String> {
    match algorithm {
        ScopeAlgorithm::None => union(alternatives),
        ScopeAlgorithm::Greedy => greedy(alternatives),
    }
}

fn union(alternatives: &[ScopeAlternative]) -> BTreeSet<String> {
    alternatives
        .iter()
        .flat_map(|alt| alt.scopes().iter().cloned())
        .collect()
}

/// Greedy set cover.
///
/// Each round picks the scope present in the most still-uncovered
/// alternatives; ties go to the scope seen first. Per-scope uncovered counts
/// are decremented as alternatives get covered, so total work is linear in
/// the number of (alternative, scope) pairs plus one candidate scan per pick.
fn greedy(alternatives: &[ScopeAlternative]) -> BTreeSet<String> {
    // Scope ids in first-seen order, alternatives deduplicated as sets.
    let mut scope_ids: HashMap<&str, usize> = HashMap::new();
    let mut scope_names: Vec<&str> = Vec::new();
    let mut seen: HashSet<BTreeSet<usize>> = HashSet::new();
    let mut alt_scopes: Vec<Vec<usize>> = Vec::new();

    for alt in alternatives {
        let ids: BTreeSet<usize> = alt
            .scopes()
            .iter()
            .map(|scope| {
                *scope_ids.entry(scope.as_str()).or_insert_with(|| {
                    scope_names.push(scope.as_str());
                    scope_names.len() - 1
                })
            })
            .collect();
        if seen.insert(ids.clone()) {
            alt_scopes.push(ids.into_iter().collect());
        }
    }

    let mut covers: Vec<Vec<usize>> = vec![Vec::new(); scope_names.len()];
    for (alt, scopes) in alt_scopes.iter().enumerate() {
        for &scope in scopes {
            covers[scope].push(alt);
        }
    }

    let mut uncovered_count: Vec<usize> = covers.iter().map(Vec::len).collect();
    let mut covered = vec![false; alt_scopes.len()];
    let mut remaining = alt_scopes.len();
    let mut candidates: Vec<usize> = (0..scope_names.len()).collect();
    let mut selected = BTreeSet::new();

    while remaining > 0 {
        let mut best: Option<usize> = None;
        for &scope in &candidates {
            if uncovered_count[scope] > best.map_or(0, |b| uncovered_count[b]) {
                best = Some(scope);
            }
        }
        let Some(best) = best else { break };

        selected.insert(scope_names[best].to_string());
        for &alt in &covers[best] {
            if covered[alt] {
                continue;
            }
            covered[alt] = true;
            remaining -= 1;
            for &scope in &alt_scopes[alt] {
                uncovered_count[scope] -= 1;
            }
        }
        candidates.retain(|&scope| uncovered_count[scope] > 0);
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alts(lists: &[&[&str]]) -> Vec<ScopeAlternative> {
        lists
            .iter()
            .filter_map(|l| ScopeAlternative::new(l.iter().copied()))
            .collect()
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn covers_all(selected: &BTreeSet<String>, alternatives: &[ScopeAlternative]) -> bool {
        alternatives
            .iter()
            .all(|alt| alt.scopes().iter().any(|s| selected.contains(s)))
    }

    #[test]
    fn test_none_is_union() {
        let input = alts(&[&["a", "b"], &["b", "c"], &["d"]]);
        assert_eq!(minimal_scopes(&input, ScopeAlgorithm::None), set(&["a", "b", "c", "d"]));
    }

    #[test]
    fn test_greedy_picks_shared_scope() {
        let input = alts(&[&["scope1", "scope2"], &["scope1"]]);
        assert_eq!(minimal_scopes(&input, ScopeAlgorithm::Greedy), set(&["scope1"]));
    }

    #[test]
    fn test_greedy_ties_go_to_first_seen() {
        let input = alts(&[&["a", "b"]]);
        assert_eq!(minimal_scopes(&input, ScopeAlgorithm::Greedy), set(&["a"]));

        let input = alts(&[&["a", "b"], &["b", "c"], &["c", "d"]]);
        assert_eq!(minimal_scopes(&input, ScopeAlgorithm::Greedy), set(&["b", "c"]));
    }

    #[test]
    fn test_greedy_duplicates_count_once() {
        let input = alts(&[&["x"], &["x", "x"], &["x"], &["y", "z"], &["z", "y"]]);
        let selected = minimal_scopes(&input, ScopeAlgorithm::Greedy);
        assert_eq!(selected, set(&["x", "y"]));
        assert!(covers_all(&selected, &input));
    }

    #[test]
    fn test_empty_input() {
        assert!(minimal_scopes(&[], ScopeAlgorithm::Greedy).is_empty());
        assert!(minimal_scopes(&[], ScopeAlgorithm::None).is_empty());
    }

    #[test]
    fn test_greedy_covers_and_is_not_larger_than_union() {
        // Deterministic pseudo-random instances.
        let mut state: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move |bound: u64| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state % bound
        };

        for _ in 0..200 {
            let alt_count = 1 + next(20);
            let input: Vec<ScopeAlternative> = (0..alt_count)
                .filter_map(|_| {
                    let len = 1 + next(4);
                    ScopeAlternative::new((0..len).map(|_| format!("s{}", next(12))))
                })
                .collect();

            let greedy = minimal_scopes(&input, ScopeAlgorithm::Greedy);
            let union = minimal_scopes(&input, ScopeAlgorithm::None);
            assert!(covers_all(&greedy, &input));
            assert!(greedy.len() <= union.len());
            assert!(greedy.is_subset(&union));
        }
    }

    #[test]
    fn test_algorithm_serde_names() {
        assert_eq!(serde_json::to_string(&ScopeAlgorithm::Greedy).unwrap(), "\"GREEDY\"");
        assert_eq!(
            serde_json::from_str::<ScopeAlgorithm>("\"NONE\"").unwrap(),
            ScopeAlgorithm::None
        );
    }
}
