//! Stable, length-bounded names for proxy clusters.
//!
//! The proxy rejects cluster names longer than 60 characters, and a name
//! must not change between two generations of the same config. Both hold
//! for a name-based (v5) UUID of the input: always 36 characters, and a
//! pure function of the input bytes.

use uuid::Uuid;

/// Upper bound the proxy enforces on cluster names.
pub const MAX_CLUSTER_NAME_LEN: usize = 60;

/// Derive the stable short name for an arbitrary identifier.
pub fn stable_name(input: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, input.as_bytes()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_input_same_name() {
        assert_eq!(stable_name("gateway-1"), stable_name("gateway-1"));
        assert_ne!(stable_name("gateway-1"), stable_name("gateway-2"));
    }

    #[test]
    fn bounded_for_any_input_length() {
        for len in [0usize, 1, 59, 60, 61, 255, 4096] {
            let id = "x".repeat(len);
            assert!(stable_name(&id).len() <= MAX_CLUSTER_NAME_LEN);
        }
    }
}
