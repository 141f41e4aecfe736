//! Primitive Types
//!
//! Identifiers, identities and amounts shared by every escrow component.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Currency amount in the smallest unit (wei-like). Unsigned: escrow never holds debt.
pub type Amount = u128;

/// Logical height reported by the clock source.
pub type Height = u64;

/// Price threshold / observed value in the oracle's native integer encoding.
pub type PriceValue = u64;

/// Stable external handle of a derivative record. Assigned from 0, never reused.
pub type DerivativeId = u64;

/// Identity of a caller (maker, taker, settler, oracle gateway).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Identity {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle returned by the oracle gateway for a settlement request.
///
/// Strictly positive handles are pending requests. Zero and negative values are
/// synchronous rejections; the value itself is the gateway's status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestHandle(pub i64);

impl RequestHandle {
    #[inline]
    pub fn is_accepted(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub fn is_rejection(&self) -> bool {
        !self.is_accepted()
    }

    /// Status code carried by a rejection handle, `None` for pending handles.
    #[inline]
    pub fn rejection_status(&self) -> Option<i64> {
        if self.is_rejection() {
            Some(self.0)
        } else {
            None
        }
    }
}

impl fmt::Display for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_classification() {
        assert!(RequestHandle(1).is_accepted());
        assert!(RequestHandle(0).is_rejection());
        assert_eq!(RequestHandle(-252).rejection_status(), Some(-252));
        assert_eq!(RequestHandle(7).rejection_status(), None);
    }

    #[test]
    fn test_identity_serializes_as_plain_string() {
        let id = Identity::from("0xae13");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"0xae13\"");
    }
}
