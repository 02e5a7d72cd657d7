//! Round-trip and robustness properties for the wire codec.

use loramesh::wire::{BaseHeader, JoinResponseStatus, Message, MessageType, RoutingTableEntry};
use proptest::prelude::*;

fn header_strategy(message_type: MessageType) -> impl Strategy<Value = BaseHeader> {
    (any::<u16>(), any::<u16>()).prop_map(move |(destination, source)| BaseHeader {
        destination,
        source,
        message_type,
        payload_size: 0,
    })
}

fn data_message_strategy() -> impl Strategy<Value = Message> {
    (header_strategy(MessageType::Data), proptest::collection::vec(any::<u8>(), 0..200)).prop_map(
        |(header, payload)| Message::Data { header, payload },
    )
}

fn route_table_strategy() -> impl Strategy<Value = Message> {
    (
        header_strategy(MessageType::RouteTable),
        any::<u16>(),
        any::<u8>(),
        proptest::collection::vec(
            (any::<u16>(), any::<u8>(), any::<u8>(), any::<u8>()),
            0..40,
        ),
    )
        .prop_map(|(header, network_manager_addr, table_version, raw_entries)| {
            Message::RouteTable {
                header,
                network_manager_addr,
                table_version,
                entries: raw_entries
                    .into_iter()
                    .map(|(destination, hop_count, link_quality, allocated_data_slots)| {
                        RoutingTableEntry {
                            destination,
                            hop_count,
                            link_quality,
                            allocated_data_slots,
                        }
                    })
                    .collect(),
            }
        })
        .prop_filter("must fit in one frame", |msg| msg.total_size() <= loramesh::wire::MAX_FRAME_SIZE)
}

fn join_response_strategy() -> impl Strategy<Value = Message> {
    (
        header_strategy(MessageType::JoinResponse),
        any::<u16>(),
        any::<u8>(),
        prop_oneof![
            Just(JoinResponseStatus::Accepted),
            Just(JoinResponseStatus::Rejected),
            Just(JoinResponseStatus::CapacityExceeded),
            Just(JoinResponseStatus::AuthFailed),
            Just(JoinResponseStatus::RetryLater),
        ],
    )
        .prop_map(|(header, network_id, allocated_slots, status)| Message::JoinResponse {
            header,
            network_id,
            allocated_slots,
            status,
        })
}

proptest! {
    #[test]
    fn data_message_round_trips(msg in data_message_strategy()) {
        let bytes = msg.serialize().unwrap();
        prop_assert_eq!(bytes.len(), msg.total_size());
        let decoded = Message::deserialize(&bytes).unwrap();
        prop_assert_eq!(decoded, msg);
    }

    #[test]
    fn route_table_message_round_trips(msg in route_table_strategy()) {
        let bytes = msg.serialize().unwrap();
        let decoded = Message::deserialize(&bytes).unwrap();
        prop_assert_eq!(decoded, msg);
    }

    #[test]
    fn join_response_round_trips(msg in join_response_strategy()) {
        let bytes = msg.serialize().unwrap();
        let decoded = Message::deserialize(&bytes).unwrap();
        prop_assert_eq!(decoded, msg);
    }

    #[test]
    fn deserialize_never_panics_on_arbitrary_bytes(bytes in proptest::collection::vec(any::<u8>(), 0..300)) {
        let _ = Message::deserialize(&bytes);
    }
}
