use super::{compare_extremes, ChangeResult, Lattice};
use crate::expr::VarName;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// How variables of a caller relate to a callee at one call site.
pub trait CallProjection {
    /// Variables the callee can observe on entry: globals, address-taken
    /// variables and its own parameters.
    fn enters_callee(&self, var: &str) -> bool;

    /// Callee locals that hold no known value on entry.
    fn unconstrained_locals(&self) -> Vec<VarName>;

    /// Locals of the caller the callee cannot observe: not address-taken and
    /// not shared through recursion.
    fn caller_only(&self, var: &str) -> bool;

    /// Locals that belong to both caller and callee (recursive calls).
    fn shared_local(&self, var: &str) -> bool;
}

/// Per-variable map lattice. `Top` is the unreached state and is distinct from
/// an empty map, in which every variable is Top. Entries equal to the
/// component's Top are never stored.
#[derive(Debug, Clone, PartialEq)]
pub enum VarMap<C> {
    Top,
    Bottom,
    Map(BTreeMap<VarName, C>),
}

impl<C: Lattice> VarMap<C> {
    pub fn empty() -> Self {
        VarMap::Map(BTreeMap::new())
    }

    pub fn get(&self, var: &str) -> C {
        match self {
            VarMap::Top => C::top(),
            VarMap::Bottom => C::bottom(),
            VarMap::Map(map) => map.get(var).cloned().unwrap_or_else(C::top),
        }
    }

    /// No-op on `Top` and `Bottom`: an unreached state stays unreached and a
    /// state where nothing is known stays that way.
    pub fn set(&mut self, var: &str, value: C) {
        if let VarMap::Map(map) = self {
            if value.is_top() {
                map.remove(var);
            } else {
                map.insert(var.to_string(), value);
            }
        }
    }

    pub fn set_bottom<'a>(&mut self, vars: impl IntoIterator<Item = &'a str>) {
        for var in vars {
            self.set(var, C::bottom());
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = (&VarName, &C)> {
        let map = match self {
            VarMap::Map(map) => Some(map),
            _ => None,
        };
        map.into_iter().flat_map(|m| m.iter())
    }

    pub fn filter(&self, keep: impl Fn(&str) -> bool) -> Self {
        match self {
            VarMap::Map(map) => VarMap::Map(
                map.iter()
                    .filter(|(var, _)| keep(var))
                    .map(|(var, value)| (var.clone(), value.clone()))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn combine(
        a: &BTreeMap<VarName, C>,
        b: &BTreeMap<VarName, C>,
        f: impl Fn(&str, &C, &C) -> C,
    ) -> BTreeMap<VarName, C> {
        let keys: BTreeSet<&VarName> = a.keys().chain(b.keys()).collect();
        let top = C::top();
        keys.into_iter()
            .filter_map(|key| {
                let left = a.get(key).unwrap_or(&top);
                let right = b.get(key).unwrap_or(&top);
                let value = f(key, left, right);
                (!value.is_top()).then(|| (key.clone(), value))
            })
            .collect()
    }

    /// The part of a call-site value the callee can observe.
    pub fn project_entry(&self, scope: &dyn CallProjection) -> Self {
        let mut entry = self.filter(|var| scope.enters_callee(var));
        let locals = scope.unconstrained_locals();
        entry.set_bottom(locals.iter().map(String::as_str));
        entry
    }

    /// Value after a call: caller-only locals keep their value from before the
    /// call, locals shared through recursion merge both, everything else
    /// comes from the callee's exit.
    pub fn restore_after_call(&self, exit: &Self, scope: &dyn CallProjection) -> Self {
        match (self, exit) {
            (VarMap::Top, _) | (_, VarMap::Top) => VarMap::Top,
            (VarMap::Bottom, _) | (_, VarMap::Bottom) => VarMap::Bottom,
            (VarMap::Map(call), VarMap::Map(ret)) => {
                VarMap::Map(Self::combine(call, ret, |var, before, after| {
                    if scope.caller_only(var) {
                        before.clone()
                    } else if scope.shared_local(var) {
                        before.meet(after).0
                    } else {
                        after.clone()
                    }
                }))
            }
        }
    }
}

impl<C: Lattice> Lattice for VarMap<C> {
    fn top() -> Self {
        VarMap::Top
    }

    fn bottom() -> Self {
        VarMap::Bottom
    }

    fn is_top(&self) -> bool {
        matches!(self, VarMap::Top)
    }

    fn is_bottom(&self) -> bool {
        matches!(self, VarMap::Bottom)
    }

    fn meet(&self, other: &Self) -> (Self, ChangeResult) {
        let result = match (self, other) {
            (VarMap::Top, x) | (x, VarMap::Top) => x.clone(),
            (VarMap::Bottom, _) | (_, VarMap::Bottom) => VarMap::Bottom,
            (VarMap::Map(a), VarMap::Map(b)) => {
                VarMap::Map(Self::combine(a, b, |_, l, r| l.meet(r).0))
            }
        };
        let changed = ChangeResult::from_changed(&result != self);
        (result, changed)
    }

    fn widen(&self, previous: &Self) -> (Self, ChangeResult) {
        let result = match (self, previous) {
            (VarMap::Map(current), VarMap::Map(prev)) => {
                VarMap::Map(Self::combine(current, prev, |_, c, p| c.widen(p).0))
            }
            (VarMap::Top, prev) => prev.clone(),
            (VarMap::Bottom, _) | (_, VarMap::Bottom) => VarMap::Bottom,
            (current, VarMap::Top) => current.clone(),
        };
        let changed = ChangeResult::from_changed(&result != previous);
        (result, changed)
    }

    fn less_eq(&self, other: &Self) -> Option<bool> {
        let (VarMap::Map(a), VarMap::Map(b)) = (self, other) else {
            return compare_extremes(self, other);
        };
        let keys: BTreeSet<&VarName> = a.keys().chain(b.keys()).collect();
        let top = C::top();
        let mut decided = Some(true);
        for key in keys {
            let left = a.get(key).unwrap_or(&top);
            let right = b.get(key).unwrap_or(&top);
            match left.less_eq(right) {
                Some(true) => {}
                Some(false) => return Some(false),
                None => decided = None,
            }
        }
        decided
    }
}

impl<C: fmt::Display> fmt::Display for VarMap<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarMap::Top => write!(f, "Top"),
            VarMap::Bottom => write!(f, "Bottom"),
            VarMap::Map(map) => {
                write!(f, "{{")?;
                for (i, (var, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", var, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}
