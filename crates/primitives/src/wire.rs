//! ASCII codec for routing-table fragments.
//!
//! A fragment is `destination,cost,next_hop` triples of decimal integers
//! separated by `;`, a trailing `;` permitted, the empty string meaning "no
//! entries". Decoding is lenient: malformed entries are reported and skipped
//! so one bad entry never poisons its siblings.

use std::collections::BTreeMap;

use tracing::warn;

use crate::{MAX_PAYLOAD_BYTES, NodeId, table::RoutingEntry};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("encoded fragment is {len} bytes, over the {MAX_PAYLOAD_BYTES}-byte payload budget")]
    Oversized { len: usize },
}

/// Encodes table entries into the wire form.
///
/// Refuses to produce a payload over [`MAX_PAYLOAD_BYTES`]; callers drop the
/// delivery instead of sending a truncated table.
pub fn encode(entries: impl Iterator<Item = (NodeId, RoutingEntry)>) -> Result<String, WireError> {
    let mut out = String::new();
    for (destination, entry) in entries {
        out.push_str(&format!(
            "{destination},{},{};",
            entry.cost, entry.next_hop
        ));
    }
    if out.len() > MAX_PAYLOAD_BYTES {
        return Err(WireError::Oversized { len: out.len() });
    }
    Ok(out)
}

/// Decodes a fragment, skipping malformed entries.
///
/// Returns the partial table of well-formed entries; each rejected entry is
/// reported through the diagnostics stream. A destination appearing twice
/// keeps the later entry.
pub fn decode(payload: &str) -> BTreeMap<NodeId, RoutingEntry> {
    let mut fragment = BTreeMap::new();
    for entry in payload.split(';') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        match parse_entry(entry) {
            Some((destination, parsed)) => {
                fragment.insert(destination, parsed);
            }
            None => warn!(entry, "skipping malformed routing entry"),
        }
    }
    fragment
}

fn parse_entry(entry: &str) -> Option<(NodeId, RoutingEntry)> {
    let mut fields = entry.split(',');
    let destination = fields.next()?.trim().parse().ok()?;
    let cost = fields.next()?.trim().parse().ok()?;
    let next_hop = fields.next()?.trim().parse().ok()?;
    if fields.next().is_some() {
        return None;
    }
    Some((destination, RoutingEntry::new(cost, next_hop)))
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::Cost;

    #[test]
    fn round_trips_a_small_table() {
        let entries = [
            (1, RoutingEntry::new(0, 1)),
            (2, RoutingEntry::new(5, 2)),
            (7, RoutingEntry::new(12, 2)),
        ];
        let payload = encode(entries.iter().copied()).unwrap();
        assert_eq!(payload, "1,0,1;2,5,2;7,12,2;");
        assert_eq!(decode(&payload), entries.into_iter().collect());
    }

    #[test]
    fn empty_payload_means_no_entries() {
        assert_eq!(encode(std::iter::empty()).unwrap(), "");
        assert!(decode("").is_empty());
    }

    #[test_case("2,5,2" ; "no trailing separator")]
    #[test_case("2,5,2;" ; "trailing separator")]
    #[test_case(";;2,5,2;;" ; "empty segments")]
    #[test_case(" 2 , 5 , 2 ;" ; "interior whitespace")]
    fn tolerant_decode(payload: &str) {
        assert_eq!(
            decode(payload),
            BTreeMap::from([(2, RoutingEntry::new(5, 2))])
        );
    }

    #[test_case("x,5,2;1,1,1;" ; "non numeric destination")]
    #[test_case("2,99999999999,2;1,1,1;" ; "cost out of range")]
    #[test_case("2,5;1,1,1;" ; "missing field")]
    #[test_case("2,5,2,9;1,1,1;" ; "extra field")]
    #[test_case("2,-5,2;1,1,1;" ; "negative cost")]
    fn malformed_entries_are_skipped_not_fatal(payload: &str) {
        assert_eq!(
            decode(payload),
            BTreeMap::from([(1, RoutingEntry::new(1, 1))])
        );
    }

    #[test]
    fn oversized_fragments_are_refused() {
        let wide = (0..1000).map(|id| (id, RoutingEntry::new(Cost::MAX - 1, id)));
        assert!(matches!(encode(wide), Err(WireError::Oversized { .. })));
    }
}
