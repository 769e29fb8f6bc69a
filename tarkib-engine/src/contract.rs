//! Contract identity.
//!
//! A [`Contract`] names "what is wanted" during composition: a capability
//! identity (a Rust type) plus an optional discriminator for cases where
//! multiple flavors of the same capability coexist. Two contracts identify
//! the same graph node iff they are equal.

use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};

use tarkib_support::rendering::shorten_type_name;

/// Identifies a requested capability in the composition graph.
///
/// Pure value type: immutable, value-equal, hashable. Equality combines the
/// capability's [`TypeId`] with the optional discriminator; the stored type
/// name exists only for display.
///
/// # Examples
/// ```
/// use tarkib_engine::contract::Contract;
///
/// let plain = Contract::of::<String>();
/// assert_eq!(plain.discriminator(), None);
///
/// let primary = Contract::discriminated::<String>("primary");
/// let replica = Contract::discriminated::<String>("replica");
/// assert_ne!(primary, replica);
/// ```
#[derive(Clone)]
pub struct Contract {
    type_id: TypeId,
    type_name: &'static str,
    discriminator: Option<&'static str>,
}

impl Contract {
    /// Creates a contract for capability `T`.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            discriminator: None,
        }
    }

    /// Creates a discriminated contract for capability `T`.
    ///
    /// Discriminators allow several independent exports of the same
    /// capability type to coexist without colliding.
    #[inline]
    pub fn discriminated<T: ?Sized + 'static>(discriminator: &'static str) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            discriminator: Some(discriminator),
        }
    }

    /// Returns the [`TypeId`] of the capability.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the fully qualified capability type name.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns the optional discriminator.
    #[inline]
    pub fn discriminator(&self) -> Option<&'static str> {
        self.discriminator
    }
}

impl PartialEq for Contract {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.discriminator == other.discriminator
    }
}

impl Eq for Contract {}

impl Hash for Contract {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
        self.discriminator.hash(state);
    }
}

impl fmt::Debug for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.discriminator {
            Some(d) => write!(f, "Contract({}, discriminator={d:?})", self.type_name),
            None => write!(f, "Contract({})", self.type_name),
        }
    }
}

impl fmt::Display for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = shorten_type_name(self.type_name);
        match self.discriminator {
            Some(d) => write!(f, "{short} ({d:?})"),
            None => write!(f, "{short}"),
        }
    }
}
