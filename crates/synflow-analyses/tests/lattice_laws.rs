use proptest::prelude::*;
use std::collections::BTreeSet;
use synflow_analyses::{PointsTo, Range};
use synflow_core::analysis::{ChangeResult, Lattice};

fn bound() -> impl Strategy<Value = i64> {
    prop_oneof![
        8 => -4i64..4,
        1 => Just(i64::MIN),
        1 => Just(i64::MAX),
    ]
}

fn range() -> impl Strategy<Value = Range> {
    prop_oneof![
        1 => Just(Range::Top),
        1 => Just(Range::Bottom),
        6 => (bound(), bound()).prop_map(|(a, b)| Range::new(a.min(b), a.max(b))),
    ]
}

fn points_to() -> impl Strategy<Value = PointsTo> {
    let set = prop::collection::btree_set(
        prop::sample::select(vec!["main:a", "main:b", "f:p", "g"]).prop_map(str::to_string),
        0..4,
    )
    .prop_map(|targets: BTreeSet<String>| PointsTo::Set(targets));
    prop_oneof![
        1 => Just(PointsTo::Top),
        1 => Just(PointsTo::Bottom),
        6 => set,
    ]
}

macro_rules! lattice_laws {
    ($name:ident, $ty:ty, $strategy:expr) => {
        mod $name {
            use super::*;

            proptest! {
                #[test]
                fn meet_is_commutative(a in $strategy, b in $strategy) {
                    prop_assert_eq!(a.meet(&b).0, b.meet(&a).0);
                }

                #[test]
                fn meet_is_associative(a in $strategy, b in $strategy, c in $strategy) {
                    let left = a.meet(&b).0.meet(&c).0;
                    let right = a.meet(&b.meet(&c).0).0;
                    prop_assert_eq!(left, right);
                }

                #[test]
                fn meet_is_idempotent(a in $strategy) {
                    prop_assert_eq!(a.meet(&a), (a.clone(), ChangeResult::Unchanged));
                }

                #[test]
                fn top_is_identity_and_bottom_absorbs(a in $strategy) {
                    prop_assert_eq!(a.meet(&<$ty>::top()).0, a.clone());
                    prop_assert_eq!(<$ty>::top().meet(&a).0, a.clone());
                    prop_assert_eq!(a.meet(&<$ty>::bottom()).0, <$ty>::bottom());
                }

                #[test]
                fn meet_is_a_lower_bound(a in $strategy, b in $strategy) {
                    let (met, changed) = a.meet(&b);
                    prop_assert_ne!(met.less_eq(&a), Some(false));
                    prop_assert_ne!(met.less_eq(&b), Some(false));
                    prop_assert_eq!(changed.is_changed(), met != a);
                }

                #[test]
                fn widening_never_rises(previous in $strategy, next in $strategy) {
                    let current = next.meet(&previous).0;
                    let (widened, changed) = current.widen(&previous);
                    prop_assert_ne!(widened.less_eq(&previous), Some(false));
                    prop_assert_ne!(widened.less_eq(&current), Some(false));
                    prop_assert_eq!(changed.is_changed(), widened != previous);
                }
            }
        }
    };
}

lattice_laws!(range_laws, Range, range());
lattice_laws!(points_to_laws, PointsTo, points_to());

#[test]
fn test_widening_jumps_to_infinite_bounds() {
    let previous = Range::new(0, 3);
    let (widened, changed) = Range::new(-1, 3).widen(&previous);
    assert_eq!(widened, Range::new(i64::MIN, 3));
    assert!(changed.is_changed());

    let (widened, _) = Range::new(-1, 4).widen(&previous);
    assert_eq!(widened, Range::Bottom);
}
