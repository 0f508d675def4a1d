//! Household restriction for free-text queries.
//!
//! Every query a user sends to the embedded text index must carry exactly one
//! mandatory `+belongsToHousehold:<id>` clause naming the requester's active
//! household. The rewrite is purely syntactic:
//!
//! 1. a query that already carries exactly that clause is returned unchanged;
//! 2. otherwise the first household clause found (mandatory, optional or
//!    excluded, any id) becomes the mandatory clause for the requester, and
//!    any further household clauses are dropped;
//! 3. otherwise the mandatory clause is appended.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{HouseholdId, HOUSEHOLD_FIELD};

static HOUSEHOLD_CLAUSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[+-]?belongsToHousehold:\d+").expect("household clause regex"));

/// The mandatory clause pinning a query to `household`.
pub fn household_clause(household: HouseholdId) -> String {
    format!("+{}:{}", HOUSEHOLD_FIELD, household)
}

/// Rewrite `query` so that it is restricted to `household`. Never fails; an
/// empty query is still rewritten and left for the caller to reject.
pub fn restrict_to_household(query: &str, household: HouseholdId) -> String {
    let wanted = household_clause(household);
    let clauses: Vec<regex::Match<'_>> = HOUSEHOLD_CLAUSE.find_iter(query).collect();

    match clauses.as_slice() {
        [] if query.is_empty() => wanted,
        [] => format!("{} {}", query, wanted),
        [only] if only.as_str() == wanted => query.to_string(),
        [only] => {
            let mut out = String::with_capacity(query.len() + 1);
            out.push_str(&query[..only.start()]);
            out.push_str(&wanted);
            out.push_str(&query[only.end()..]);
            out
        }
        [first, rest @ ..] => {
            let mut out = String::with_capacity(query.len());
            out.push_str(&query[..first.start()]);
            out.push_str(&wanted);
            let mut cursor = first.end();
            for clause in rest {
                out.push_str(&query[cursor..clause.start()]);
                cursor = clause.end();
            }
            out.push_str(&query[cursor..]);
            out.split_whitespace().collect::<Vec<_>>().join(" ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_clause_to_plain_query() {
        assert_eq!(
            restrict_to_household("things", 42),
            "things +belongsToHousehold:42"
        );
    }

    #[test]
    fn upgrades_optional_clause() {
        assert_eq!(
            restrict_to_household("stuff belongsToHousehold:7", 7),
            "stuff +belongsToHousehold:7"
        );
    }

    #[test]
    fn preserves_existing_mandatory_clause() {
        let q = "things +belongsToHousehold:13";
        assert_eq!(restrict_to_household(q, 13), q);
    }

    #[test]
    fn foreign_mandatory_clause_is_replaced() {
        assert_eq!(
            restrict_to_household("things +belongsToHousehold:5", 13),
            "things +belongsToHousehold:13"
        );
    }

    #[test]
    fn longer_id_with_matching_prefix_is_replaced() {
        assert_eq!(
            restrict_to_household("things +belongsToHousehold:420", 42),
            "things +belongsToHousehold:42"
        );
    }

    #[test]
    fn excluded_clause_becomes_mandatory() {
        assert_eq!(
            restrict_to_household("salt -belongsToHousehold:3", 9),
            "salt +belongsToHousehold:9"
        );
    }

    #[test]
    fn extra_clauses_are_dropped() {
        assert_eq!(
            restrict_to_household("belongsToHousehold:1 pepper +belongsToHousehold:2 flakes", 1),
            "+belongsToHousehold:1 pepper flakes"
        );
    }

    #[test]
    fn empty_query_is_passed_through_with_clause() {
        assert_eq!(restrict_to_household("", 1), "+belongsToHousehold:1");
    }

    #[test]
    fn rewrite_is_idempotent() {
        let queries = [
            "",
            "things",
            "stuff belongsToHousehold:7",
            "things +belongsToHousehold:13",
            "a belongsToHousehold:1 b belongsToHousehold:2",
            "-belongsToHousehold:8",
            "belongsToHousehold:",
        ];
        for q in queries {
            for household in [0u64, 7, 13, 42, u64::MAX] {
                let once = restrict_to_household(q, household);
                let twice = restrict_to_household(&once, household);
                assert_eq!(once, twice, "not idempotent for {:?}/{}", q, household);
            }
        }
    }

    #[test]
    fn rewrite_contains_clause_exactly_once() {
        let queries = [
            "",
            "things",
            "stuff belongsToHousehold:7",
            "things +belongsToHousehold:13",
            "x +belongsToHousehold:130 y belongsToHousehold:13",
            "belongsToHousehold:",
        ];
        for q in queries {
            for household in [7u64, 13, 42] {
                let out = restrict_to_household(q, household);
                let clause = household_clause(household);
                let exact = HOUSEHOLD_CLAUSE
                    .find_iter(&out)
                    .filter(|m| m.as_str() == clause)
                    .count();
                let total = HOUSEHOLD_CLAUSE.find_iter(&out).count();
                assert_eq!(exact, 1, "{:?} -> {:?}", q, out);
                assert_eq!(total, 1, "{:?} -> {:?}", q, out);
            }
        }
    }
}
