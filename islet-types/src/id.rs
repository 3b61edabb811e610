//! Entity handles.
//!
//! Bodies, geometries and constraints refer to each other through these
//! integer handles. Arena maps in the scene own the actual data, which
//! keeps the Body/Geometry/Constraint relationships cycle-free.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Unique identifier for a rigid body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BodyId(pub u64);

/// Unique identifier for a collision geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GeometryId(pub u64);

/// Unique identifier for a constraint (contact or joint).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConstraintId(pub u64);

macro_rules! impl_id {
    ($name:ident, $label:literal) => {
        impl $name {
            /// Create a new handle from a raw value.
            #[must_use]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Get the raw handle value.
            #[must_use]
            pub const fn raw(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($label, "({})"), self.0)
            }
        }
    };
}

impl_id!(BodyId, "Body");
impl_id!(GeometryId, "Geometry");
impl_id!(ConstraintId, "Constraint");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_round_trip() {
        let id = BodyId::new(42);
        assert_eq!(id.raw(), 42);
        assert_eq!(BodyId::from(42), id);
        assert_eq!(id.to_string(), "Body(42)");
    }

    #[test]
    fn test_ids_are_ordered() {
        assert!(GeometryId::new(1) < GeometryId::new(2));
        assert!(ConstraintId::new(7) > ConstraintId::new(3));
    }
}
