use std::{fmt, hash::Hash, sync::Arc};

/// Marker trait for values carried by streams under test.
///
/// Implement this for whatever your streams emit. Values must be
/// `Clone + PartialEq + Debug + 'static` because they:
/// - Are copied from series programs into stream queues (Clone)
/// - Are matched against expected frames during assertions (PartialEq)
/// - Appear in assertion diffs (Debug)
///
/// Matching uses `==`, never structural reflection or pointer identity.
/// Callers who need identity semantics implement `PartialEq` over a
/// pointer (`Rc::ptr_eq`) in their own type.
///
/// The two hooks bridge the series character namespace:
/// [`from_key`](Self::from_key) backs characters absent from a value
/// table, and [`as_key`](Self::as_key) lets the renderer print a value
/// as its own character. Both default to `None`; `String` and `char`
/// ship with the obvious implementations.
pub trait Value: Clone + PartialEq + fmt::Debug + 'static {
    /// Fallback for a series character with no value-table binding.
    fn from_key(_key: char) -> Option<Self>
    where
        Self: Sized,
    {
        None
    }

    /// The single character this value renders as when no table entry
    /// matches it.
    fn as_key(&self) -> Option<char> {
        None
    }
}

impl Value for String {
    fn from_key(key: char) -> Option<Self> {
        Some(key.to_string())
    }

    fn as_key(&self) -> Option<char> {
        let mut chars = self.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Some(c),
            _ => None,
        }
    }
}

impl Value for char {
    fn from_key(key: char) -> Option<Self> {
        Some(key)
    }

    fn as_key(&self) -> Option<char> {
        Some(*self)
    }
}

impl Value for &'static str {
    fn as_key(&self) -> Option<char> {
        let mut chars = self.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Some(c),
            _ => None,
        }
    }
}

/// Why a stream terminated.
///
/// Carried by cancel (`!`) and abort (`#`) frames, surfaced to user code
/// through [`Error::Aborted`](crate::Error::Aborted), and compared by
/// content in assertions. Cheap to clone (uses string comparison with a
/// fast-path for pointer equality when reasons share the same allocation).
#[derive(Debug, Clone, Ord, PartialOrd)]
pub struct Reason(Arc<str>);

impl Reason {
    pub fn new(reason: &str) -> Self {
        Self(Arc::from(reason))
    }

    /// Returns the string representation of this reason.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Reason {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for Reason {}

impl Hash for Reason {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Reason {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Reason {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Reason {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Reason {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Reason::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_round_trips_through_keys() {
        let v = String::from_key('a').unwrap();
        assert_eq!(v, "a");
        assert_eq!(v.as_key(), Some('a'));
        assert_eq!(String::from("foo").as_key(), None);
    }

    #[test]
    fn reason_compares_by_content() {
        let a = Reason::new("boom");
        let b = Reason::from(String::from("boom"));
        assert_eq!(a, b);
        assert_ne!(a, Reason::new("fizzle"));
    }
}
