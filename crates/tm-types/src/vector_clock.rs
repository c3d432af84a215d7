use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::TypeError;
use crate::identity::TargetId;

/// Persistent vector clock keyed by [`TargetId`].
///
/// Every operation returns a new value and leaves its operands unchanged.
/// Clones share the underlying map, so the many historical snapshots held by
/// stamped events and the correlation table stay cheap; a component is only
/// copied when a new clock is derived.
///
/// # Rules
///
/// - A key absent from the map reads as [`Clock::ZERO`].
/// - `merge` is the pointwise maximum, including keys present only in the
///   other clock.
/// - `increment(key)` raises exactly the `key` component by one.
/// - `is_after` is strict dominance over the keys of `self`, with a key-count
///   fallback (see [`VectorClock::is_after`]).
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<TargetId, Clock>",
    into = "BTreeMap<TargetId, Clock>"
)]
pub struct VectorClock {
    entries: Arc<BTreeMap<TargetId, Clock>>,
}

impl VectorClock {
    /// An empty vector clock (every component reads as zero).
    pub fn new() -> Self {
        Self::default()
    }

    /// A vector clock holding a zero component for each of the given keys.
    ///
    /// Targets start from this so that all clocks of a run share one key
    /// domain.
    pub fn with_keys<I>(keys: I) -> Self
    where
        I: IntoIterator<Item = TargetId>,
    {
        let entries = keys.into_iter().map(|k| (k, Clock::ZERO)).collect();
        Self {
            entries: Arc::new(entries),
        }
    }

    /// The component for `key`, or [`Clock::ZERO`] if absent.
    pub fn get<Q>(&self, key: &Q) -> Clock
    where
        TargetId: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.entries.get(key).copied().unwrap_or(Clock::ZERO)
    }

    /// A new clock with the `key` component raised by one.
    #[must_use]
    pub fn increment(&self, key: &TargetId) -> Self {
        let mut next = self.clone();
        let entries = Arc::make_mut(&mut next.entries);
        let slot = entries.entry(key.clone()).or_insert(Clock::ZERO);
        *slot = slot.increment();
        next
    }

    /// A new clock holding the pointwise maximum of `self` and `other`.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        if Arc::ptr_eq(&self.entries, &other.entries) {
            return self.clone();
        }
        let mut next = self.clone();
        let entries = Arc::make_mut(&mut next.entries);
        for (key, theirs) in other.entries.iter() {
            let slot = entries.entry(key.clone()).or_insert(Clock::ZERO);
            if theirs > slot {
                *slot = *theirs;
            }
        }
        next
    }

    /// Returns `true` if this clock is causally after `other`.
    ///
    /// Holds when every component present in `self` is greater than or equal
    /// to the same component of `other` and at least one is strictly
    /// greater. Components present only in `other` are not inspected.
    ///
    /// If no component is strictly greater, a clock carrying more keys than
    /// `other` is still considered after it. Within one run all clocks share
    /// the full target key domain, so the fallback never fires there; for
    /// clocks over differing key sets the relation is not guaranteed to be
    /// transitive.
    pub fn is_after(&self, other: &Self) -> bool {
        let mut any_greater = false;
        for (key, mine) in self.entries.iter() {
            let theirs = other.get(key);
            if mine.is_before(theirs) {
                return false;
            }
            if mine.is_after(theirs) {
                any_greater = true;
            }
        }
        any_greater || self.len() > other.len()
    }

    /// Returns `true` if neither clock is after the other and they differ.
    pub fn is_concurrent_with(&self, other: &Self) -> bool {
        self != other && !self.is_after(other) && !other.is_after(self)
    }

    /// Number of explicitly stored components.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate components in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&TargetId, Clock)> {
        self.entries.iter().map(|(k, v)| (k, *v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &TargetId> {
        self.entries.keys()
    }

    /// Plain `name -> counter` map, used by exporters.
    pub fn to_map(&self) -> BTreeMap<String, u64> {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_str().to_owned(), v.value()))
            .collect()
    }
}

impl From<BTreeMap<TargetId, Clock>> for VectorClock {
    fn from(entries: BTreeMap<TargetId, Clock>) -> Self {
        Self {
            entries: Arc::new(entries),
        }
    }
}

impl From<VectorClock> for BTreeMap<TargetId, Clock> {
    fn from(clock: VectorClock) -> Self {
        Arc::try_unwrap(clock.entries).unwrap_or_else(|shared| (*shared).clone())
    }
}

impl<K: Into<TargetId>> FromIterator<(K, u64)> for VectorClock {
    fn from_iter<I: IntoIterator<Item = (K, u64)>>(iter: I) -> Self {
        let entries = iter
            .into_iter()
            .map(|(k, v)| (k.into(), Clock::new(v)))
            .collect();
        Self {
            entries: Arc::new(entries),
        }
    }
}

impl fmt::Debug for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VectorClock{self}")
    }
}

/// Renders as `{a=0, b=12, c=3}` in key order.
impl fmt::Display for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (key, clock)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}={clock}")?;
        }
        f.write_str("}")
    }
}

/// Parses the [`Display`](fmt::Display) form back into a clock.
impl FromStr for VectorClock {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .trim()
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
            .ok_or_else(|| TypeError::InvalidVectorClock(s.to_owned()))?;

        let mut entries = BTreeMap::new();
        for part in body.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| TypeError::InvalidVectorClock(s.to_owned()))?;
            let value: u64 = value
                .trim()
                .parse()
                .map_err(|_| TypeError::InvalidVectorClock(s.to_owned()))?;
            entries.insert(TargetId::from(key.trim()), Clock::new(value));
        }
        Ok(Self::from(entries))
    }
}
