//! Property tests for the path replacement rule.

use std::sync::Arc;

use proptest::prelude::*;
use reticulum_core::testing::RecordingInterface;
use reticulum_core::{ConnectionInterface, DestinationHash};
use reticulum_transport::{Hops, PathTable};

const NOW: u64 = 1_000_000;

fn hops(count: u8, timestamp: u64) -> Hops {
    let iface: Arc<dyn ConnectionInterface> = Arc::new(RecordingInterface::new(1, "test0"));
    Hops::new(DestinationHash::new([0; 16]), count, timestamp, iface, vec![])
}

fn dest() -> DestinationHash {
    DestinationHash::new([0x5A; 16])
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn single_update_follows_replacement_rule(
        h in 0u8..=128,
        t in 0u64..NOW,
        h2 in 0u8..=128,
        t2 in 0u64..NOW,
    ) {
        let table = PathTable::new();
        prop_assert!(table.upsert(dest(), hops(h, t), NOW));

        let changed = table.upsert(dest(), hops(h2, t2), NOW);
        let expected = h2 < h || (h2 == h && t2 > t);
        prop_assert_eq!(changed, expected);

        let kept = table.lookup(&dest(), NOW).unwrap();
        if expected {
            prop_assert_eq!((kept.hops, kept.timestamp), (h2, t2));
        } else {
            prop_assert_eq!((kept.hops, kept.timestamp), (h, t));
        }
    }

    #[test]
    fn sequence_never_worsens_known_path(
        updates in proptest::collection::vec((0u8..=32, 0u64..NOW), 1..40),
    ) {
        let table = PathTable::new();
        for (h, t) in &updates {
            table.upsert(dest(), hops(*h, *t), NOW);
        }
        let best = updates.iter().map(|(h, _)| *h).min().unwrap();
        let newest_at_best = updates
            .iter()
            .filter(|(h, _)| *h == best)
            .map(|(_, t)| *t)
            .max()
            .unwrap();
        let kept = table.lookup(&dest(), NOW).unwrap();
        prop_assert_eq!(kept.hops, best);
        prop_assert_eq!(kept.timestamp, newest_at_best);
    }

    #[test]
    fn expired_entries_are_never_returned(
        expires in 0u64..NOW,
        query_time in 0u64..(2 * NOW),
    ) {
        let table = PathTable::new();
        table.upsert(dest(), hops(1, 0).with_expires(expires), 0);
        let seen = table.lookup(&dest(), query_time).is_some();
        prop_assert_eq!(seen, query_time <= expires);
    }
}
