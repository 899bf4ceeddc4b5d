//! Interaction-plane sets encoded as products of distinct primes.
//!
//! A "plane" is a discrete interaction domain (physical, spiritual, ethereal,
//! …). Each plane is assigned a unique prime for the lifetime of its
//! registry, and a set of planes is the product of its members' primes:
//!
//! ```text
//!   union        = LCM   (multiply in the missing primes)
//!   intersection = GCD   (keep only primes dividing both)
//!   empty set    = 1     (multiplicative identity)
//! ```
//!
//! The encoding makes membership a single modulo and set algebra two
//! integer operations — cheap enough for per-sense, per-tick checks.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SomaError};

/// The primes available for plane assignment.
///
/// The product of all fifteen fits in a `u64`; a sixteenth would overflow
/// the full-union encoding, so the table is the hard cap.
const PLANE_PRIMES: [u64; 15] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47];

/// One registered interaction plane, carrying its assigned prime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Plane(u64);

impl Plane {
    /// The prime encoding this plane.
    #[must_use]
    pub fn prime(self) -> u64 {
        self.0
    }
}

/// A set of interaction planes, stored as a product of distinct primes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlaneSet(u64);

impl PlaneSet {
    /// The empty plane set.
    pub const EMPTY: Self = Self(1);

    /// Whether this set contains the given plane.
    #[must_use]
    pub fn contains(self, plane: Plane) -> bool {
        self.0 % plane.prime() == 0
    }

    /// This set with the given plane added (no-op if already present).
    #[must_use]
    pub fn with(self, plane: Plane) -> Self {
        if self.contains(plane) {
            self
        } else {
            Self(self.0 * plane.prime())
        }
    }

    /// Union of two plane sets (LCM of the encodings).
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self(self.0 / gcd(self.0, other.0) * other.0)
    }

    /// Intersection of two plane sets (GCD of the encodings).
    #[must_use]
    pub fn intersection(self, other: Self) -> Self {
        Self(gcd(self.0, other.0))
    }

    /// Whether the two sets share at least one plane.
    #[must_use]
    pub fn overlaps(self, other: Self) -> bool {
        !self.intersection(other).is_empty()
    }

    /// Whether this set is empty.
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 1
    }

    /// Raw prime-product encoding.
    #[must_use]
    pub fn encoding(self) -> u64 {
        self.0
    }
}

impl Default for PlaneSet {
    fn default() -> Self {
        Self::EMPTY
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Assigns each named plane a unique prime for the registry's lifetime.
///
/// One registry per process (owned by the world); every part and body in the
/// same world must use plane sets drawn from the same registry, or the
/// prime-product algebra is meaningless.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaneRegistry {
    assigned: Vec<(String, Plane)>,
}

impl PlaneRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plane by name, or return the already-assigned plane.
    ///
    /// # Errors
    /// Returns [`SomaError::PlaneTableExhausted`] once all primes are taken.
    pub fn register(&mut self, name: impl Into<String>) -> Result<Plane> {
        let name = name.into();
        if let Some(plane) = self.get(&name) {
            return Ok(plane);
        }
        let next = self.assigned.len();
        let Some(&prime) = PLANE_PRIMES.get(next) else {
            return Err(SomaError::PlaneTableExhausted(name));
        };
        let plane = Plane(prime);
        self.assigned.push((name, plane));
        Ok(plane)
    }

    /// Look up a previously registered plane by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Plane> {
        self.assigned
            .iter()
            .find(|(n, _)| n == name)
            .map(|&(_, plane)| plane)
    }

    /// Number of registered planes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    /// Whether no planes have been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_planes() -> (PlaneRegistry, Plane, Plane, Plane) {
        let mut reg = PlaneRegistry::new();
        let physical = reg.register("physical").expect("register");
        let spiritual = reg.register("spiritual").expect("register");
        let ethereal = reg.register("ethereal").expect("register");
        (reg, physical, spiritual, ethereal)
    }

    #[test]
    fn registration_is_idempotent() {
        let (mut reg, physical, _, _) = three_planes();
        let again = reg.register("physical").expect("register");
        assert_eq!(physical, again);
        assert_eq!(reg.len(), 3);
    }

    #[test]
    fn primes_are_distinct() {
        let (_, physical, spiritual, ethereal) = three_planes();
        assert_ne!(physical.prime(), spiritual.prime());
        assert_ne!(spiritual.prime(), ethereal.prime());
    }

    #[test]
    fn membership_via_division() {
        let (_, physical, spiritual, ethereal) = three_planes();
        let set = PlaneSet::EMPTY.with(physical).with(ethereal);
        assert!(set.contains(physical));
        assert!(set.contains(ethereal));
        assert!(!set.contains(spiritual));
    }

    #[test]
    fn union_is_lcm() {
        let (_, physical, spiritual, ethereal) = three_planes();
        let a = PlaneSet::EMPTY.with(physical).with(spiritual);
        let b = PlaneSet::EMPTY.with(spiritual).with(ethereal);
        let u = a.union(b);
        assert!(u.contains(physical));
        assert!(u.contains(spiritual));
        assert!(u.contains(ethereal));
        // No double-counting of the shared plane.
        assert_eq!(
            u.encoding(),
            physical.prime() * spiritual.prime() * ethereal.prime()
        );
    }

    #[test]
    fn intersection_is_gcd() {
        let (_, physical, spiritual, ethereal) = three_planes();
        let a = PlaneSet::EMPTY.with(physical).with(spiritual);
        let b = PlaneSet::EMPTY.with(spiritual).with(ethereal);
        let i = a.intersection(b);
        assert!(i.contains(spiritual));
        assert!(!i.contains(physical));
        assert!(!i.contains(ethereal));
    }

    #[test]
    fn empty_set_is_identity() {
        let (_, physical, _, _) = three_planes();
        let set = PlaneSet::EMPTY.with(physical);
        assert_eq!(set.union(PlaneSet::EMPTY), set);
        assert!(set.intersection(PlaneSet::EMPTY).is_empty());
        assert!(!set.overlaps(PlaneSet::EMPTY));
    }

    #[test]
    fn table_exhaustion_is_an_error() {
        let mut reg = PlaneRegistry::new();
        for i in 0..15 {
            reg.register(format!("plane-{i}")).expect("within table");
        }
        assert!(matches!(
            reg.register("one-too-many"),
            Err(SomaError::PlaneTableExhausted(_))
        ));
    }
}
