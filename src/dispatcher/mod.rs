//! Message-queue dispatcher: one FIFO per outgoing [`SlotType`], feeding the
//! coordinator's per-slot transmit logic. A pure data structure — no tasks
//! of its own.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::superframe::SlotType;
use crate::wire::{Message, MessageType};

const ALL_SLOT_TYPES: [SlotType; 7] = [
    SlotType::Tx,
    SlotType::Rx,
    SlotType::Sleep,
    SlotType::DiscoveryRx,
    SlotType::DiscoveryTx,
    SlotType::ControlRx,
    SlotType::ControlTx,
];

struct Inner {
    queues: HashMap<SlotType, Vec<Message>>,
    max_size: usize,
}

/// Per-slot-type outgoing FIFOs with dedup support for routing broadcasts.
pub struct MessageQueueDispatcher {
    inner: Mutex<Inner>,
}

impl Default for MessageQueueDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageQueueDispatcher {
    pub fn new() -> Self {
        let mut queues = HashMap::new();
        for slot_type in ALL_SLOT_TYPES {
            queues.insert(slot_type, Vec::new());
        }
        MessageQueueDispatcher {
            inner: Mutex::new(Inner {
                queues,
                max_size: 0,
            }),
        }
    }

    /// Bounds each per-slot-type queue. `0` means unbounded. When a queue
    /// is already at its bound, enqueuing drops the oldest entry.
    pub fn set_max_size(&self, n: usize) {
        self.inner.lock().unwrap().max_size = n;
    }

    pub fn enqueue(&self, slot_type: SlotType, message: Message) {
        let mut inner = self.inner.lock().unwrap();
        let max_size = inner.max_size;
        let queue = inner.queues.entry(slot_type).or_default();
        if max_size > 0 && queue.len() >= max_size {
            queue.remove(0);
        }
        queue.push(message);
    }

    pub fn extract(&self, slot_type: SlotType) -> Option<Message> {
        let mut inner = self.inner.lock().unwrap();
        inner.queues.get_mut(&slot_type).and_then(|q| {
            if q.is_empty() {
                None
            } else {
                Some(q.remove(0))
            }
        })
    }

    /// `true` if any queue currently holds a message of `message_type`,
    /// used to dedup routing-table broadcasts before enqueuing a new one.
    pub fn has_message_of_type(&self, message_type: MessageType) -> bool {
        let inner = self.inner.lock().unwrap();
        inner
            .queues
            .values()
            .any(|q| q.iter().any(|m| m.header().message_type == message_type))
    }

    pub fn len(&self, slot_type: SlotType) -> usize {
        self.inner
            .lock()
            .unwrap()
            .queues
            .get(&slot_type)
            .map(|q| q.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, slot_type: SlotType) -> bool {
        self.len(slot_type) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::BaseHeader;

    fn data_message(payload: u8) -> Message {
        Message::Data {
            header: BaseHeader {
                destination: 2,
                source: 1,
                message_type: MessageType::Data,
                payload_size: 1,
            },
            payload: vec![payload],
        }
    }

    #[test]
    fn enqueue_then_extract_preserves_order() {
        let dispatcher = MessageQueueDispatcher::new();
        dispatcher.enqueue(SlotType::Tx, data_message(1));
        dispatcher.enqueue(SlotType::Tx, data_message(2));
        assert_eq!(dispatcher.extract(SlotType::Tx), Some(data_message(1)));
        assert_eq!(dispatcher.extract(SlotType::Tx), Some(data_message(2)));
        assert_eq!(dispatcher.extract(SlotType::Tx), None);
    }

    #[test]
    fn bounded_queue_drops_oldest() {
        let dispatcher = MessageQueueDispatcher::new();
        dispatcher.set_max_size(2);
        dispatcher.enqueue(SlotType::Tx, data_message(1));
        dispatcher.enqueue(SlotType::Tx, data_message(2));
        dispatcher.enqueue(SlotType::Tx, data_message(3));
        assert_eq!(dispatcher.len(SlotType::Tx), 2);
        assert_eq!(dispatcher.extract(SlotType::Tx), Some(data_message(2)));
    }

    #[test]
    fn has_message_of_type_scans_all_queues() {
        let dispatcher = MessageQueueDispatcher::new();
        assert!(!dispatcher.has_message_of_type(MessageType::Data));
        dispatcher.enqueue(SlotType::ControlTx, data_message(1));
        assert!(dispatcher.has_message_of_type(MessageType::Data));
        assert!(!dispatcher.has_message_of_type(MessageType::Ping));
    }
}
