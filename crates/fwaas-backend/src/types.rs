//! Type-safe backend object ids.
//!
//! The controller identifies every object with an opaque string id. This
//! module wraps those strings in a phantom-typed [`BackendId`] so ids of
//! different object kinds cannot be mixed up (e.g. passing a logical port id
//! where a firewall section id is expected).

use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};

/// Marker trait for backend object kinds.
pub trait BackendObjectKind: Send + Sync + 'static {
    /// Returns the backend object type name for debugging.
    fn type_name() -> &'static str;
}

/// A type-safe backend object id.
///
/// # Examples
///
/// ```
/// use fwaas_backend::{LogicalPortId, FirewallSectionId};
///
/// let port = LogicalPortId::from_raw("lp-0001").unwrap();
/// let section = FirewallSectionId::from_raw("fs-0001").unwrap();
///
/// assert_eq!(port.as_str(), "lp-0001");
/// assert_eq!(format!("{:?}", section), "FirewallSection(fs-0001)");
///
/// // Empty ids are rejected.
/// assert!(LogicalPortId::from_raw("").is_none());
/// ```
pub struct BackendId<T: BackendObjectKind> {
    raw: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T: BackendObjectKind> BackendId<T> {
    /// Creates a new id from a raw value.
    ///
    /// Returns `None` if the raw value is empty or whitespace.
    pub fn from_raw(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            None
        } else {
            Some(Self {
                raw,
                _marker: PhantomData,
            })
        }
    }

    /// Returns the raw id.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Consumes the id and returns the raw string.
    pub fn into_inner(self) -> String {
        self.raw
    }
}

impl<T: BackendObjectKind> Clone for BackendId<T> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: BackendObjectKind> fmt::Debug for BackendId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", T::type_name(), self.raw)
    }
}

impl<T: BackendObjectKind> fmt::Display for BackendId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl<T: BackendObjectKind> PartialEq for BackendId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T: BackendObjectKind> Eq for BackendId<T> {}

impl<T: BackendObjectKind> Hash for BackendId<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T: BackendObjectKind> Serialize for BackendId<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de, T: BackendObjectKind> Deserialize<'de> for BackendId<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::from_raw(raw)
            .ok_or_else(|| de::Error::custom(format!("empty {} id", T::type_name())))
    }
}

// ============================================================================
// Object Kind Markers
// ============================================================================

macro_rules! define_object_kind {
    ($name:ident, $type_name:literal, $id_alias:ident) => {
        #[doc = concat!("Marker type for backend ", $type_name, " objects.")]
        #[derive(Debug, Clone, Copy)]
        pub struct $name;

        impl BackendObjectKind for $name {
            fn type_name() -> &'static str {
                $type_name
            }
        }

        #[doc = concat!("Id of a backend ", $type_name, ".")]
        pub type $id_alias = BackendId<$name>;
    };
}

define_object_kind!(LogicalRouterKind, "LogicalRouter", LogicalRouterId);
define_object_kind!(LogicalSwitchKind, "LogicalSwitch", LogicalSwitchId);
define_object_kind!(LogicalPortKind, "LogicalPort", LogicalPortId);
define_object_kind!(FirewallSectionKind, "FirewallSection", FirewallSectionId);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_id_creation() {
        let port = LogicalPortId::from_raw("lp-1").unwrap();
        assert_eq!(port.as_str(), "lp-1");
        assert_eq!(port.to_string(), "lp-1");
        assert_eq!(port.clone().into_inner(), "lp-1");
    }

    #[test]
    fn test_empty_id_rejected() {
        assert!(FirewallSectionId::from_raw("").is_none());
        assert!(FirewallSectionId::from_raw("   ").is_none());
    }

    #[test]
    fn test_id_debug_names_kind() {
        let router = LogicalRouterId::from_raw("lr-7").unwrap();
        assert_eq!(format!("{:?}", router), "LogicalRouter(lr-7)");
    }

    #[test]
    fn test_id_equality_and_hash() {
        let a = LogicalSwitchId::from_raw("ls-1").unwrap();
        let b = LogicalSwitchId::from_raw("ls-1").unwrap();
        let c = LogicalSwitchId::from_raw("ls-2").unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_id_serde() {
        let section = FirewallSectionId::from_raw("fs-3").unwrap();
        let json = serde_json::to_string(&section).unwrap();
        assert_eq!(json, "\"fs-3\"");

        let back: FirewallSectionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, section);

        let empty: Result<FirewallSectionId, _> = serde_json::from_str("\"\"");
        assert!(empty.is_err());
    }
}
