//! Timing-safe comparison for secrets and CSRF tokens

use subtle::ConstantTimeEq;

/// Compare two byte strings in time independent of where they differ.
/// Lengths are not secret here; a length mismatch is simply unequal.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
