//! Properties of request validation and the hop-scaled timeout.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use reticulum_core::DestinationHash;
use reticulum_core::testing::RecordingInterface;
use reticulum_crypto::SigningKey;
use reticulum_protocol::LinkError;
use reticulum_protocol::link::{
    ECPUBSIZE, LinkEstablishment, LinkRegistry, LinkTable, LinkTimings, LocalDestination,
    RequestPacket,
};

fn packet(dest: DestinationHash, payload: Vec<u8>, iface: Arc<RecordingInterface>) -> RequestPacket {
    let mut raw = dest.as_ref().to_vec();
    raw.extend_from_slice(&payload);
    RequestPacket {
        destination: dest,
        hops: 1,
        hashable_part: raw.clone(),
        raw,
        payload,
        receiving_interface: iface,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn wrong_length_payload_never_creates_a_link(
        payload in proptest::collection::vec(any::<u8>(), 0..256)
            .prop_filter("exact size is valid", |p| p.len() != ECPUBSIZE),
    ) {
        let table = Arc::new(LinkTable::new());
        let registry: Arc<dyn LinkRegistry> = table.clone();
        let establishment = LinkEstablishment::new(registry, LinkTimings::default());
        let destination = LocalDestination::new(DestinationHash::new([7; 16]), SigningKey::generate());
        let iface = Arc::new(RecordingInterface::new(1, "prop0"));
        let len = payload.len();

        let err = establishment
            .validate_request(&destination, &packet(destination.hash(), payload, iface.clone()))
            .unwrap_err();

        let malformed = matches!(
            err,
            LinkError::MalformedRequest { expected: ECPUBSIZE, actual } if actual == len
        );
        prop_assert!(malformed);
        prop_assert_eq!(table.link_count(), 0);
        prop_assert!(iface.sent().is_empty());
    }

    #[test]
    fn establishment_timeout_scales_with_hops(hops in any::<u8>()) {
        let timings = LinkTimings::default();
        let timeout = timings.establishment_timeout(hops);
        prop_assert_eq!(timeout, Duration::from_secs(6) * u32::from(hops.max(1)));
        if hops < u8::MAX {
            prop_assert!(timings.establishment_timeout(hops + 1) >= timeout);
        }
    }
}
