use std::collections::BTreeMap;

use bindhost::HostValue;
use bindhost::slab::{FIRST_DYNAMIC, Slab, UNDEFINED};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Alloc(i32),
    Release(usize),
    Clone(usize),
    ReleaseStale(u32),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => any::<i32>().prop_map(Op::Alloc),
        2 => any::<usize>().prop_map(Op::Release),
        1 => any::<usize>().prop_map(Op::Clone),
        1 => (FIRST_DYNAMIC..FIRST_DYNAMIC + 64).prop_map(Op::ReleaseStale),
    ]
}

fn pick(model: &BTreeMap<u32, i32>, index: usize) -> Option<u32> {
    if model.is_empty() {
        return None;
    }
    model.keys().nth(index % model.len()).copied()
}

proptest! {
    #[test]
    fn slab_matches_a_map_model(ops in prop::collection::vec(op(), 1..200)) {
        let mut slab = Slab::new();
        let mut model = BTreeMap::new();
        let mut last_freed = None;

        for op in ops {
            match op {
                Op::Alloc(n) => {
                    let handle = slab.allocate(HostValue::from(n));
                    prop_assert!(handle >= FIRST_DYNAMIC);
                    prop_assert!(!model.contains_key(&handle));
                    if let Some(freed) = last_freed.take() {
                        prop_assert_eq!(handle, freed);
                    }
                    model.insert(handle, n);
                }
                Op::Release(index) => {
                    let Some(handle) = pick(&model, index) else { continue };
                    let value = slab.release(handle).unwrap();
                    prop_assert_eq!(value.and_then(|v| v.as_f64()), Some(f64::from(model[&handle])));
                    model.remove(&handle);
                    last_freed = Some(handle);
                }
                Op::Clone(index) => {
                    let Some(handle) = pick(&model, index) else { continue };
                    let copy = slab.clone_handle(handle).unwrap();
                    prop_assert_ne!(copy, handle);
                    model.insert(copy, model[&handle]);
                    last_freed = None;
                }
                Op::ReleaseStale(handle) => {
                    if !model.contains_key(&handle) {
                        prop_assert!(slab.release(handle).is_err());
                    }
                }
            }

            prop_assert_eq!(slab.live(), model.len());
            for (&handle, &n) in &model {
                prop_assert_eq!(slab.resolve(handle).unwrap().as_f64(), Some(f64::from(n)));
            }
        }
        prop_assert!(slab.resolve(UNDEFINED).unwrap().is_undefined());
        prop_assert!(slab.resolve(0).is_err());
    }
}
