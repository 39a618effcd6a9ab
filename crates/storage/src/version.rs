// SPDX-License-Identifier: MIT

//! Loose dotted-version comparison, the policy behind "latest": split on
//! `.`, compare components numerically where both sides parse as integers,
//! lexically otherwise; fall back to lexical order over the raw strings when
//! any pair of components is incomparable. See DESIGN.md for why this wasn't
//! tightened to SemVer.

use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Component<'a> {
    Numeric(u64),
    Text(&'a str),
}

fn components(v: &str) -> Vec<Component<'_>> {
    v.split('.')
        .map(|part| match part.parse::<u64>() {
            Ok(n) => Component::Numeric(n),
            Err(_) => Component::Text(part),
        })
        .collect()
}

fn compare_components(a: Component<'_>, b: Component<'_>) -> Option<Ordering> {
    match (a, b) {
        (Component::Numeric(x), Component::Numeric(y)) => Some(x.cmp(&y)),
        (Component::Text(x), Component::Text(y)) => Some(x.cmp(y)),
        // A numeric component and a text component at the same position
        // can't be compared component-wise; the caller falls back to
        // lexical order over the whole string.
        _ => None,
    }
}

/// Compare two dotted-version strings. Numeric components compare
/// numerically (`2` > `10` is false: `10` wins); mismatched component kinds
/// fall back to lexical comparison of the full strings.
pub fn compare(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    let (ca, cb) = (components(a), components(b));
    for (x, y) in ca.iter().zip(cb.iter()) {
        match compare_components(*x, *y) {
            Some(Ordering::Equal) => continue,
            Some(ord) => return ord,
            None => return a.cmp(b),
        }
    }
    ca.len().cmp(&cb.len())
}
