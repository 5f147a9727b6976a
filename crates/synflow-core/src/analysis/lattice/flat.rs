use super::{ChangeResult, Lattice};
use std::fmt;

/// Flat lattice over a payload: distinct payloads are incomparable and meet
/// to `Bottom`.
#[derive(Debug, Clone, PartialEq)]
pub enum Flat<T> {
    Top,
    Bottom,
    Value(T),
}

impl<T> Flat<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Flat::Value(value) => Some(value),
            _ => None,
        }
    }
}

impl<T> Lattice for Flat<T>
where
    T: Clone + PartialEq + fmt::Debug + fmt::Display + 'static,
{
    fn top() -> Self {
        Flat::Top
    }

    fn bottom() -> Self {
        Flat::Bottom
    }

    fn is_top(&self) -> bool {
        matches!(self, Flat::Top)
    }

    fn is_bottom(&self) -> bool {
        matches!(self, Flat::Bottom)
    }

    fn meet(&self, other: &Self) -> (Self, ChangeResult) {
        let result = match (self, other) {
            (Flat::Top, x) | (x, Flat::Top) => x.clone(),
            (a, b) if a == b => a.clone(),
            _ => Flat::Bottom,
        };
        let changed = ChangeResult::from_changed(&result != self);
        (result, changed)
    }

    /// Finite height, so no widening is needed.
    fn widen(&self, previous: &Self) -> (Self, ChangeResult) {
        (self.clone(), ChangeResult::from_changed(self != previous))
    }
}

impl<T: fmt::Display> fmt::Display for Flat<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flat::Top => write!(f, "Top"),
            Flat::Bottom => write!(f, "Bottom"),
            Flat::Value(value) => write!(f, "{}", value),
        }
    }
}
