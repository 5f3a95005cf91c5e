//! Concatenated message reassembly.
//!
//! Fragments are grouped by `(sender, reference)`. A group completes once
//! every sequence number `1..=total` is present, regardless of arrival
//! order; the merged message carries the first fragment's metadata and the
//! fragment texts joined in sequence order.

use crate::pdu::DecodedMessage;
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap};

type GroupKey = (String, u16);

#[derive(Debug)]
struct Group<T> {
    total: u8,
    fragments: BTreeMap<u8, (DecodedMessage, T)>,
}

impl<T> Group<T> {
    fn is_complete(&self) -> bool {
        self.fragments.len() == usize::from(self.total)
            && (1..=self.total).all(|seq| self.fragments.contains_key(&seq))
    }

    fn merge(self) -> Option<(DecodedMessage, Vec<T>)> {
        let mut fragments = self.fragments.into_values();
        let (mut merged, first_tag) = fragments.next()?;
        let mut tags = vec![first_tag];
        for (fragment, tag) in fragments {
            merged.text.push_str(&fragment.text);
            tags.push(tag);
        }
        merged.concat = None;
        Some((merged, tags))
    }
}

/// Holds fragments of concatenated messages until they can be merged.
///
/// `T` is an optional per-fragment tag (the modem uses storage indices)
/// returned alongside the merged message in sequence order.
#[derive(Debug)]
pub struct ReassemblyBuffer<T = ()> {
    groups: HashMap<GroupKey, Group<T>>,
}

impl<T> Default for ReassemblyBuffer<T> {
    fn default() -> Self {
        Self {
            groups: HashMap::new(),
        }
    }
}

impl ReassemblyBuffer<()> {
    /// Ingests one decoded message. Returns the complete message when
    /// `msg` is standalone or completes its group, `None` while waiting.
    pub fn ingest(&mut self, msg: DecodedMessage) -> Option<DecodedMessage> {
        self.ingest_with(msg, ()).map(|(merged, _)| merged)
    }
}

impl<T> ReassemblyBuffer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Like [`ReassemblyBuffer::ingest`] but keeps a tag per fragment.
    ///
    /// A repeated sequence number replaces the earlier fragment. A fragment
    /// whose sequence is outside `1..=total` cannot belong to any group and is
    /// returned on its own.
    pub fn ingest_with(&mut self, msg: DecodedMessage, tag: T) -> Option<(DecodedMessage, Vec<T>)> {
        let info = match msg.concat {
            Some(info) if info.total > 1 => info,
            _ => return Some((msg, vec![tag])),
        };

        if info.sequence == 0 || info.sequence > info.total {
            warn!(
                "Fragment {}/{} from {} (ref {}) out of range, delivering as-is",
                info.sequence, info.total, msg.sender, info.reference
            );
            return Some((msg, vec![tag]));
        }

        let key = (msg.sender.clone(), info.reference);
        let group = self.groups.entry(key.clone()).or_insert_with(|| Group {
            total: info.total,
            fragments: BTreeMap::new(),
        });

        if group.total != info.total {
            warn!(
                "Fragment from {} (ref {}) claims {} parts, group expects {}; ignored",
                key.0, key.1, info.total, group.total
            );
            return None;
        }

        if group.fragments.insert(info.sequence, (msg, tag)).is_some() {
            debug!("Duplicate fragment {} for {} (ref {}) replaced", info.sequence, key.0, key.1);
        }

        if group.is_complete() {
            self.groups.remove(&key).and_then(Group::merge)
        } else {
            None
        }
    }

    /// Number of groups still waiting for fragments.
    pub fn pending_groups(&self) -> usize {
        self.groups.len()
    }

    /// Empties the buffer, merging what each incomplete group has so far.
    pub fn drain_incomplete(&mut self) -> Vec<(DecodedMessage, Vec<T>)> {
        self.groups.drain().filter_map(|(_, group)| group.merge()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdu::{Charset, ConcatInfo, MessageKind};

    fn fragment(
        sender: &str,
        reference: u16,
        total: u8,
        sequence: u8,
        text: &str,
    ) -> DecodedMessage {
        DecodedMessage {
            kind: MessageKind::Deliver,
            sender: sender.to_string(),
            timestamp: Some(format!("2025-10-21 12:54:0{sequence}")),
            text: text.to_string(),
            charset: Charset::Ucs2,
            concat: Some(ConcatInfo {
                reference,
                total,
                sequence,
            }),
        }
    }

    #[test]
    fn test_standalone_passes_through() {
        let mut buffer: ReassemblyBuffer = ReassemblyBuffer::new();
        let mut msg = fragment("+1", 0, 1, 1, "hi");
        msg.concat = None;
        assert_eq!(buffer.ingest(msg.clone()), Some(msg));
        assert_eq!(buffer.pending_groups(), 0);
    }

    #[test]
    fn test_in_order_merge() {
        let mut buffer: ReassemblyBuffer = ReassemblyBuffer::new();
        assert_eq!(buffer.ingest(fragment("+1", 7, 2, 1, "Hello, ")), None);
        let merged = buffer.ingest(fragment("+1", 7, 2, 2, "world")).unwrap();
        assert_eq!(merged.text, "Hello, world");
        assert_eq!(merged.timestamp.as_deref(), Some("2025-10-21 12:54:01"));
        assert_eq!(merged.concat, None);
        assert_eq!(buffer.pending_groups(), 0);
    }

    #[test]
    fn test_groups_keyed_by_sender_and_reference() {
        let mut buffer: ReassemblyBuffer = ReassemblyBuffer::new();
        assert_eq!(buffer.ingest(fragment("+1", 7, 2, 1, "a")), None);
        assert_eq!(buffer.ingest(fragment("+2", 7, 2, 2, "b")), None);
        assert_eq!(buffer.ingest(fragment("+1", 8, 2, 2, "c")), None);
        assert_eq!(buffer.pending_groups(), 3);
    }

    #[test]
    fn test_duplicate_sequence_replaces() {
        let mut buffer: ReassemblyBuffer = ReassemblyBuffer::new();
        buffer.ingest(fragment("+1", 1, 2, 1, "old"));
        buffer.ingest(fragment("+1", 1, 2, 1, "new"));
        let merged = buffer.ingest(fragment("+1", 1, 2, 2, "!")).unwrap();
        assert_eq!(merged.text, "new!");
    }

    #[test]
    fn test_tags_follow_sequence_order() {
        let mut buffer: ReassemblyBuffer<u32> = ReassemblyBuffer::new();
        assert!(buffer.ingest_with(fragment("+1", 3, 3, 3, "c"), 12).is_none());
        assert!(buffer.ingest_with(fragment("+1", 3, 3, 1, "a"), 10).is_none());
        let (merged, tags) = buffer.ingest_with(fragment("+1", 3, 3, 2, "b"), 11).unwrap();
        assert_eq!(merged.text, "abc");
        assert_eq!(tags, vec![10, 11, 12]);
    }

    #[test]
    fn test_out_of_range_sequence_delivered_alone() {
        let mut buffer: ReassemblyBuffer = ReassemblyBuffer::new();
        let msg = fragment("+1", 1, 2, 5, "stray");
        assert_eq!(buffer.ingest(msg.clone()), Some(msg));
        assert_eq!(buffer.pending_groups(), 0);
    }

    #[test]
    fn test_drain_incomplete() {
        let mut buffer: ReassemblyBuffer<u32> = ReassemblyBuffer::new();
        buffer.ingest_with(fragment("+1", 4, 3, 3, "c"), 3);
        buffer.ingest_with(fragment("+1", 4, 3, 1, "a"), 1);
        let drained = buffer.drain_incomplete();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].0.text, "ac");
        assert_eq!(drained[0].1, vec![1, 3]);
        assert_eq!(buffer.pending_groups(), 0);
    }
}
