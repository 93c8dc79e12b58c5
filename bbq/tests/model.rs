use std::collections::HashMap;

use bbq::model::{Entry, Extreme, HffsQueue};
use bbq::Config;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Enqueue(usize),
    Dequeue(usize, Extreme),
}

fn ops(num_priorities: usize, num_lps: usize) -> impl Strategy<Value = Vec<Op>> {
    let op = prop_oneof![
        2 => (0..num_priorities).prop_map(Op::Enqueue),
        1 => (0..num_lps, prop_oneof![Just(Extreme::Min), Just(Extreme::Max)]).prop_map(|(lp, e)| Op::Dequeue(lp, e)),
    ];
    proptest::collection::vec(op, 0..120)
}

#[test]
fn concrete_single_level_scenario() {
    let mut queue = HffsQueue::new(Config::new(1).with_bitmap_width(4), 15).unwrap();
    assert_eq!(queue.config().num_priorities(), 4);
    queue.enqueue(2, 200).unwrap();
    queue.enqueue(0, 100).unwrap();
    assert_eq!(queue.dequeue_min(0).unwrap(), Some(Entry { priority: 0, data: 100 }));
    assert_eq!(queue.dequeue_min(0).unwrap(), Some(Entry { priority: 2, data: 200 }));
}

#[test]
fn dequeue_on_empty_is_a_no_op() {
    let mut queue = HffsQueue::new(Config::new(2), 7).unwrap();
    let before = format!("{:?}", queue);
    assert_eq!(queue.dequeue_max(0).unwrap(), None);
    assert_eq!(format!("{:?}", queue), before);
}

proptest! {
    #[test]
    fn round_trip_is_sorted(priorities in proptest::collection::vec(0usize..64, 1..40), max in any::<bool>()) {
        let mut queue = HffsQueue::new(Config::new(3), 63).unwrap();
        for (data, &priority) in priorities.iter().enumerate() {
            prop_assert!(queue.enqueue(priority, data as u64).unwrap());
        }
        let extreme = if max { Extreme::Max } else { Extreme::Min };
        let out = (0..priorities.len()).map(|_| queue.dequeue(0, extreme).unwrap().unwrap()).collect::<Vec<_>>();

        let ordered = out.windows(2).all(|w| if max { w[0].priority >= w[1].priority } else { w[0].priority <= w[1].priority });
        prop_assert!(ordered);

        let mut data = out.iter().map(|e| e.data as usize).collect::<Vec<_>>();
        data.sort_unstable();
        prop_assert_eq!(data, (0..priorities.len()).collect::<Vec<_>>());
        for entry in &out {
            prop_assert_eq!(priorities[entry.data as usize], entry.priority);
        }
        prop_assert!(queue.is_empty(0));
        prop_assert!(queue.is_consistent());
    }

    #[test]
    fn matches_sorted_reference(ops in ops(16, 4)) {
        let config = Config::new(2).with_bitmap_width(4).with_num_lps(4);
        let mut queue = HffsQueue::new(config, 15).unwrap();
        // Per bucket FIFO of payloads.
        let mut reference: HashMap<usize, Vec<u64>> = HashMap::new();
        let mut next_data = 0u64;

        for op in ops {
            match op {
                Op::Enqueue(priority) => {
                    let admitted = queue.enqueue(priority, next_data).unwrap();
                    let size: usize = reference.values().map(Vec::len).sum();
                    prop_assert_eq!(admitted, size < 15);
                    if admitted {
                        reference.entry(priority).or_default().push(next_data);
                    }
                    next_data += 1;
                }
                Op::Dequeue(lp, extreme) => {
                    let range = lp * 4..(lp + 1) * 4;
                    let candidates = reference.iter().filter(|(p, v)| range.contains(*p) && !v.is_empty()).map(|(p, _)| *p);
                    let expected = match extreme {
                        Extreme::Min => candidates.min(),
                        Extreme::Max => candidates.max(),
                    }
                    .map(|priority| Entry { priority, data: reference.get_mut(&priority).map(|v| v.remove(0)).unwrap_or_default() });
                    prop_assert_eq!(queue.dequeue(lp, extreme).unwrap(), expected);
                }
            }
            prop_assert!(queue.is_consistent());
        }
    }
}
