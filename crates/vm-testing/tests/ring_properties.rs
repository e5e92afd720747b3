//! Property-based coverage of `RingBuffer`'s push/pop contract beyond the
//! fixed-case unit tests already in `vm-core` (spec §4.1 invariant: a
//! sequence of pushes that individually succeed is read back byte-for-byte
//! and in order).

use proptest::prelude::*;
use std::sync::Arc;
use vm_core::ring::RingBuffer;

proptest! {
    #[test]
    fn pushed_records_come_back_in_order_and_unmodified(
        records in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..32)
    ) {
        let ring = Arc::new(RingBuffer::new(4096));
        let mut accepted = Vec::new();
        for record in &records {
            if ring.try_push_slice(record).is_ok() {
                accepted.push(record.clone());
            }
        }
        for expected in &accepted {
            let popped = ring.pop().expect("accepted push must be poppable");
            prop_assert_eq!(&*popped, expected.as_slice());
        }
        prop_assert!(ring.pop().is_none());
    }

    #[test]
    fn occupancy_never_exceeds_capacity(
        records in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..32), 0..64)
    ) {
        let ring = RingBuffer::new(1024);
        for record in &records {
            let _ = ring.try_push_slice(record);
            prop_assert!(ring.len() <= ring.capacity());
        }
    }
}
