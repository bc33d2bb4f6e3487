//! Time-to-live values.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A non-negative time-to-live.
///
/// Callers hand the cache TTLs in milliseconds, and those may be zero or
/// negative. A non-positive TTL is clamped to zero: the value is still stored,
/// but it is already stale on the next read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ttl(Duration);

impl Ttl {
    /// Zero TTL: entries expire immediately.
    pub const ZERO: Ttl = Ttl(Duration::ZERO);

    /// Creates a TTL from signed milliseconds, clamping negatives to zero.
    pub fn from_millis(millis: i64) -> Self {
        Ttl(Duration::from_millis(millis.max(0) as u64))
    }

    /// Creates a TTL from whole seconds.
    pub fn from_secs(secs: u64) -> Self {
        Ttl(Duration::from_secs(secs))
    }

    /// Returns the TTL as a `Duration`.
    pub fn as_duration(&self) -> Duration {
        self.0
    }

    /// Returns the TTL in whole milliseconds.
    pub fn as_millis(&self) -> u64 {
        u64::try_from(self.0.as_millis()).unwrap_or(u64::MAX)
    }

    /// Returns true if entries stored with this TTL are stale on the next read.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl From<Duration> for Ttl {
    fn from(duration: Duration) -> Self {
        Ttl(duration)
    }
}

impl From<i64> for Ttl {
    fn from(millis: i64) -> Self {
        Ttl::from_millis(millis)
    }
}

impl From<i32> for Ttl {
    fn from(millis: i32) -> Self {
        Ttl::from_millis(i64::from(millis))
    }
}

impl From<u64> for Ttl {
    fn from(millis: u64) -> Self {
        Ttl(Duration::from_millis(millis))
    }
}

impl From<Ttl> for Duration {
    fn from(ttl: Ttl) -> Self {
        ttl.0
    }
}

impl fmt::Display for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.as_millis())
    }
}

// Serialized as integer milliseconds, matching how call sites express TTLs.
impl Serialize for Ttl {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.as_millis())
    }
}

impl<'de> Deserialize<'de> for Ttl {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let millis = i64::deserialize(deserializer)?;
        Ok(Ttl::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test_case(-1_000, 0 ; "negative clamps to zero")]
    #[test_case(0, 0 ; "zero stays zero")]
    #[test_case(1, 1 ; "one millisecond")]
    #[test_case(5_000, 5_000 ; "five seconds")]
    fn test_from_millis(input: i64, expected: u64) {
        assert_eq!(Ttl::from_millis(input).as_millis(), expected);
    }

    #[test]
    fn test_zero() {
        assert!(Ttl::ZERO.is_zero());
        assert!(Ttl::from_millis(i64::MIN).is_zero());
        assert!(!Ttl::from_secs(1).is_zero());
    }

    #[test]
    fn test_duration_conversions() {
        let ttl: Ttl = Duration::from_millis(250).into();
        assert_eq!(Duration::from(ttl), Duration::from_millis(250));
        let ttl: Ttl = 1_500i64.into();
        assert_eq!(ttl.as_duration(), Duration::from_millis(1_500));
        let ttl: Ttl = (-3i32).into();
        assert!(ttl.is_zero());
        let ttl: Ttl = 40u64.into();
        assert_eq!(ttl.as_millis(), 40);
    }

    #[test]
    fn test_display() {
        assert_eq!(Ttl::from_secs(2).to_string(), "2000ms");
    }

    #[test]
    fn test_serde_millis() {
        let json = serde_json::to_string(&Ttl::from_millis(750)).unwrap();
        assert_eq!(json, "750");
        let back: Ttl = serde_json::from_str("-20").unwrap();
        assert_eq!(back, Ttl::ZERO);
    }

    proptest! {
        #[test]
        fn prop_from_millis_never_negative(millis in any::<i64>()) {
            let ttl = Ttl::from_millis(millis);
            prop_assert_eq!(ttl.as_millis(), millis.max(0) as u64);
        }
    }
}
