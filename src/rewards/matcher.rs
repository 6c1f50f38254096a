//! Identifier and address matching
//!
//! Merkl identifiers are either a bare address or an address followed by a
//! protocol suffix, so matching is equality-or-prefix on lowercased strings.

use alloy_primitives::Address;

/// True iff `identifier` equals or starts with `target`, case-insensitively.
pub fn identifier_matches_address(identifier: &str, target: &str) -> bool {
    if identifier.is_empty() || target.is_empty() {
        return false;
    }

    let identifier = identifier.to_lowercase();
    let target = target.to_lowercase();

    identifier == target || identifier.starts_with(&target)
}

/// Strict address parse: `0x` + 40 hex digits, mixed case must be EIP-55.
pub fn parse_address(s: &str) -> Option<Address> {
    let s = s.trim();
    let hex_part = s.strip_prefix("0x")?;
    if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let has_lower = hex_part.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = hex_part.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        return Address::parse_checksummed(s, None).ok();
    }

    s.parse().ok()
}

/// Both sides must be valid addresses and equal
pub fn addresses_equal(a: &str, b: &str) -> bool {
    match (parse_address(a), parse_address(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
