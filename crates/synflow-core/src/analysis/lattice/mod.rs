/*! The contract every analysis value satisfies.
 *
 * Values are ordered by precision: `Top` (no information, or not reached yet) is the greatest
 * element and `Bottom` (nothing known) the least. The engine only ever moves stored values
 * downwards, so `meet` must return a lower bound of both operands and `widen` must never land
 * above the previous value.
 */

pub mod flat;
pub mod varmap;

pub use flat::Flat;
pub use varmap::{CallProjection, VarMap};

use std::any::Any;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeResult {
    Unchanged,
    Changed,
}

impl ChangeResult {
    pub fn from_changed(changed: bool) -> Self {
        if changed {
            ChangeResult::Changed
        } else {
            ChangeResult::Unchanged
        }
    }

    pub fn is_changed(self) -> bool {
        self == ChangeResult::Changed
    }
}

impl std::ops::BitOr for ChangeResult {
    type Output = ChangeResult;

    fn bitor(self, rhs: Self) -> Self::Output {
        ChangeResult::from_changed(self.is_changed() || rhs.is_changed())
    }
}

impl std::ops::BitOrAssign for ChangeResult {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = *self | rhs;
    }
}

pub trait Lattice: Clone + PartialEq + fmt::Debug + fmt::Display + 'static {
    fn top() -> Self;

    fn bottom() -> Self;

    fn is_top(&self) -> bool;

    fn is_bottom(&self) -> bool;

    /// Greatest lower bound. The flag reports whether the result differs from `self`.
    fn meet(&self, other: &Self) -> (Self, ChangeResult);

    /// Widens `self` against the value it replaces. The flag reports whether the
    /// result differs from `previous`.
    fn widen(&self, previous: &Self) -> (Self, ChangeResult) {
        if self == previous {
            (self.clone(), ChangeResult::Unchanged)
        } else {
            let bottom = Self::bottom();
            let changed = ChangeResult::from_changed(&bottom != previous);
            (bottom, changed)
        }
    }

    /// `Some(true)` when `self` lies at or below `other`, `None` when the order
    /// cannot be decided. Concrete domains refine the default.
    fn less_eq(&self, other: &Self) -> Option<bool> {
        compare_extremes(self, other)
    }
}

/// Decides the order when either side is an extreme, or both sides are equal.
pub fn compare_extremes<L: Lattice>(a: &L, b: &L) -> Option<bool> {
    if b.is_top() || a.is_bottom() || a == b {
        Some(true)
    } else if a.is_top() || b.is_bottom() {
        Some(false)
    } else {
        None
    }
}

/// Meet that verifies, in debug builds, that the result is a lower bound of
/// both operands. `None` signals a violation.
pub fn checked_meet<L: Lattice>(a: &L, b: &L) -> Option<(L, ChangeResult)> {
    let (result, changed) = a.meet(b);
    if cfg!(debug_assertions)
        && (result.less_eq(a) == Some(false) || result.less_eq(b) == Some(false))
    {
        return None;
    }
    Some((result, changed))
}

/// Meet of a non-empty sequence; `Top` when empty.
pub fn meet_all<'a, L: Lattice>(values: impl IntoIterator<Item = &'a L>) -> L {
    values
        .into_iter()
        .fold(L::top(), |acc, value| acc.meet(value).0)
}

/// Object-safe view of a lattice value, used where values of different
/// analyses share one collection.
pub trait DynValue: fmt::Debug + fmt::Display {
    fn as_any(&self) -> &dyn Any;

    fn clone_value(&self) -> Box<dyn DynValue>;

    fn dyn_eq(&self, other: &dyn DynValue) -> bool;

    /// `None` when `other` belongs to a different lattice.
    fn dyn_meet(&self, other: &dyn DynValue) -> Option<Box<dyn DynValue>>;

    fn dyn_widen(&self, previous: &dyn DynValue) -> Option<Box<dyn DynValue>>;

    fn dyn_is_top(&self) -> bool;
}

impl<L: Lattice> DynValue for L {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_value(&self) -> Box<dyn DynValue> {
        Box::new(self.clone())
    }

    fn dyn_eq(&self, other: &dyn DynValue) -> bool {
        other.as_any().downcast_ref::<L>() == Some(self)
    }

    fn dyn_meet(&self, other: &dyn DynValue) -> Option<Box<dyn DynValue>> {
        let other = other.as_any().downcast_ref::<L>()?;
        Some(Box::new(self.meet(other).0))
    }

    fn dyn_widen(&self, previous: &dyn DynValue) -> Option<Box<dyn DynValue>> {
        let previous = previous.as_any().downcast_ref::<L>()?;
        Some(Box::new(self.widen(previous).0))
    }

    fn dyn_is_top(&self) -> bool {
        self.is_top()
    }
}

impl Clone for Box<dyn DynValue> {
    fn clone(&self) -> Self {
        self.clone_value()
    }
}

impl PartialEq for Box<dyn DynValue> {
    fn eq(&self, other: &Self) -> bool {
        self.dyn_eq(other.as_ref())
    }
}

pub fn downcast_value<L: Lattice>(value: &dyn DynValue) -> Option<&L> {
    value.as_any().downcast_ref::<L>()
}
