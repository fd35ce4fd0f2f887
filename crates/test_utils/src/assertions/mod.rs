// Path: crates/test_utils/src/assertions/mod.rs
//! Assertion utilities for testing: generic macros plus typed helpers for
//! the §8 safety properties.

use std::collections::HashMap;

use pop_types::app::{QuorumCert, StateRoot, StateTransition};

/// Assert that two byte arrays are equal.
#[macro_export]
macro_rules! assert_bytes_eq {
    ($left:expr, $right:expr) => {
        assert_eq!($left.as_ref(), $right.as_ref());
    };
    ($left:expr, $right:expr, $($arg:tt)+) => {
        assert_eq!($left.as_ref(), $right.as_ref(), $($arg)+);
    };
}

/// Assert that a result is `Ok` and unwrap it.
#[macro_export]
macro_rules! assert_ok {
    ($expr:expr) => {
        match $expr {
            Ok(val) => val,
            Err(err) => panic!("Expected Ok, got Err: {:?}", err),
        }
    };
    ($expr:expr, $($arg:tt)+) => {
        match $expr {
            Ok(val) => val,
            Err(err) => panic!("Expected Ok, got Err: {:?} ({})", err, format!($($arg)+)),
        }
    };
}

/// Assert that a result is `Err` and unwrap the error.
#[macro_export]
macro_rules! assert_err {
    ($expr:expr) => {
        match $expr {
            Ok(val) => panic!("Expected Err, got Ok: {:?}", val),
            Err(err) => err,
        }
    };
    ($expr:expr, $($arg:tt)+) => {
        match $expr {
            Ok(val) => panic!("Expected Err, got Ok: {:?} ({})", val, format!($($arg)+)),
            Err(err) => err,
        }
    };
}

/// Assert that a value is within a specific range.
#[macro_export]
macro_rules! assert_in_range {
    ($value:expr, $min:expr, $max:expr) => {
        assert!($value >= $min && $value <= $max, "{} not in range [{}, {}]", $value, $min, $max);
    };
    ($value:expr, $min:expr, $max:expr, $($arg:tt)+) => {
        assert!($value >= $min && $value <= $max, "{} not in range [{}, {}]: {}", $value, $min, $max, format!($($arg)+));
    };
}

/// Panics unless `certs` contains at most one distinct `block_hash` per
/// `height` — the agreement property (§8, P1): no two honest replicas ever
/// commit conflicting blocks at the same height.
pub fn assert_single_commit_per_height(certs: &[QuorumCert]) {
    let mut seen = HashMap::new();
    for cert in certs {
        match seen.insert(cert.height, cert.block_hash) {
            Some(prior) if prior != cert.block_hash => {
                panic!(
                    "height {} committed two conflicting blocks: {:?} and {:?}",
                    cert.height, prior, cert.block_hash
                );
            }
            _ => {}
        }
    }
}

/// Panics unless every domain in `conserved_domains` has a zero net delta
/// in `transition` — the conservation property (§8).
pub fn assert_conservation_holds(transition: &StateTransition, conserved_domains: &[u8]) {
    assert!(
        transition.is_conservation_valid(conserved_domains),
        "conservation violated: deltas = {:?}, conserved domains = {:?}",
        transition.resource_delta_per_domain,
        conserved_domains
    );
}

/// Panics unless `a` and `b` are the identical [`StateRoot`] — used after a
/// state-sync segment to confirm a synced replica's root matches the
/// source-of-truth root at the same height.
pub fn assert_roots_match(a: StateRoot, b: StateRoot) {
    assert_eq!(a.0, b.0, "state roots diverge");
}
