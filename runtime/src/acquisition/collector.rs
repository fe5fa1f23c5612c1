//! Exhaustive structural search for content records inside decoded page state.
//!
//! Records sit at unpredictable depths (tabs → sections → grids → items), so
//! the collector walks the whole tree depth-first, pre-order, and tests each
//! object against a prioritized list of [`Recognizer`]s. A matched object is
//! emitted as a [`RawRecord`] and treated as a leaf: its children are never
//! searched. The walk uses an explicit stack with a depth guard; subtrees past
//! the limit are skipped and the partial result is still returned.

use serde_json::{Map, Value};

/// Default maximum container nesting the collector will descend into.
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// Which known record layout a node matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// Primary video node (`videoRenderer`).
    Video,
    /// Short-form video node (`reelItemRenderer`).
    Reel,
}

/// A recognized record, borrowing its fields from the decoded island.
///
/// The variant is fixed once at collection time so normalization never has to
/// re-probe field presence to tell the layouts apart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawRecord<'a> {
    Video(&'a Map<String, Value>),
    Reel(&'a Map<String, Value>),
}

impl<'a> RawRecord<'a> {
    pub fn kind(&self) -> RecordKind {
        match self {
            RawRecord::Video(_) => RecordKind::Video,
            RawRecord::Reel(_) => RecordKind::Reel,
        }
    }

    /// The record's own fields.
    pub fn fields(&self) -> &'a Map<String, Value> {
        match self {
            RawRecord::Video(m) | RawRecord::Reel(m) => m,
        }
    }
}

/// Shape predicate: "object has key `wrapper` whose value is an object with a
/// non-empty string `id_field`".
#[derive(Debug, Clone, Copy)]
pub struct Recognizer {
    pub kind: RecordKind,
    pub wrapper: &'static str,
    pub id_field: &'static str,
}

impl Recognizer {
    /// Test a node; on match return the wrapped record.
    pub fn recognize<'a>(&self, node: &'a Map<String, Value>) -> Option<RawRecord<'a>> {
        let inner = node.get(self.wrapper)?.as_object()?;
        let id = inner.get(self.id_field)?.as_str()?;
        if id.is_empty() {
            return None;
        }
        Some(match self.kind {
            RecordKind::Video => RawRecord::Video(inner),
            RecordKind::Reel => RawRecord::Reel(inner),
        })
    }
}

/// Recognizers for channel pages, in priority order.
pub const VIDEO_RECOGNIZERS: [Recognizer; 2] = [
    Recognizer {
        kind: RecordKind::Video,
        wrapper: "videoRenderer",
        id_field: "videoId",
    },
    Recognizer {
        kind: RecordKind::Reel,
        wrapper: "reelItemRenderer",
        id_field: "videoId",
    },
];

/// Output of a structural walk.
#[derive(Debug, Default)]
pub struct Collection<'a> {
    /// Matched records in traversal order.
    pub records: Vec<RawRecord<'a>>,
    /// Whether any subtree was skipped by the depth guard.
    pub depth_exceeded: bool,
}

/// Collect every node matching one of `recognizers`, with the default depth limit.
pub fn collect<'a>(value: &'a Value, recognizers: &[Recognizer]) -> Vec<RawRecord<'a>> {
    collect_with_limit(value, recognizers, DEFAULT_MAX_DEPTH).records
}

/// Collect with an explicit depth limit.
pub fn collect_with_limit<'a>(
    value: &'a Value,
    recognizers: &[Recognizer],
    max_depth: usize,
) -> Collection<'a> {
    let mut out = Collection::default();
    let mut stack: Vec<(&'a Value, usize)> = vec![(value, 0)];

    while let Some((node, depth)) = stack.pop() {
        let children: Box<dyn DoubleEndedIterator<Item = &'a Value> + 'a> = match node {
            Value::Object(map) => {
                if let Some(record) = recognizers.iter().find_map(|r| r.recognize(map)) {
                    out.records.push(record);
                    continue;
                }
                Box::new(map.values())
            }
            Value::Array(items) => Box::new(items.iter()),
            _ => continue,
        };

        if depth >= max_depth {
            out.depth_exceeded = true;
            continue;
        }

        // Reverse push keeps encounter order on pop.
        for child in children.rev() {
            if child.is_object() || child.is_array() {
                stack.push((child, depth + 1));
            }
        }
    }

    if out.depth_exceeded {
        tracing::warn!(
            "structural walk hit depth limit {max_depth}; returning {} records from the reachable part",
            out.records.len()
        );
    }

    out
}
