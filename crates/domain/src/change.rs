//! Document change events and per-path coalescing.

use crate::DocumentPath;
use serde::{Deserialize, Serialize};

/// Raw change notification from the document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentEvent {
    /// A document appeared.
    Created {
        /// New path.
        path: DocumentPath,
    },
    /// A document's content changed.
    Modified {
        /// Changed path.
        path: DocumentPath,
    },
    /// A document was removed.
    Deleted {
        /// Removed path.
        path: DocumentPath,
    },
    /// A document moved from `old_path` to `path`.
    #[serde(rename_all = "camelCase")]
    Renamed {
        /// Destination path.
        path: DocumentPath,
        /// Source path.
        old_path: DocumentPath,
    },
}

impl DocumentEvent {
    /// Path the event is keyed on (the destination for renames).
    #[must_use]
    pub const fn path(&self) -> &DocumentPath {
        match self {
            Self::Created { path }
            | Self::Modified { path }
            | Self::Deleted { path }
            | Self::Renamed { path, .. } => path,
        }
    }
}

/// Net intent recorded for one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Document is new since the last flush.
    Create,
    /// Document existed and changed.
    Modify,
    /// Document existed and is gone.
    Delete,
}

/// Coalesced change waiting for the next flush.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingChange {
    /// Net intent.
    pub kind: ChangeKind,
    /// Path the change applies to.
    pub path: DocumentPath,
    /// Source path when the change came from a rename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_path: Option<DocumentPath>,
    /// Time of the most recent contributing event (epoch ms).
    pub observed_at_ms: u64,
}

/// Merge a later change into an earlier one on the same path.
///
/// `None` means the two cancel out (created then deleted before a flush).
#[must_use]
pub const fn coalesce(earlier: ChangeKind, later: ChangeKind) -> Option<ChangeKind> {
    use ChangeKind::{Create, Delete, Modify};
    match (earlier, later) {
        (Create, Delete) => None,
        (Create, Create | Modify) => Some(Create),
        (Modify | Delete, Delete) => Some(Delete),
        (Modify | Delete, Create | Modify) => Some(Modify),
    }
}

/// Fold a burst of changes on one path into its net intent.
#[must_use]
pub fn coalesce_all(changes: impl IntoIterator<Item = ChangeKind>) -> Option<ChangeKind> {
    changes.into_iter().fold(None, |net, next| match net {
        None => Some(next),
        Some(earlier) => coalesce(earlier, next),
    })
}

#[cfg(test)]
mod tests {
    use super::ChangeKind::{Create, Delete, Modify};
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn table_matches_rules() {
        assert_eq!(coalesce(Create, Delete), None);
        assert_eq!(coalesce(Create, Modify), Some(Create));
        assert_eq!(coalesce(Create, Create), Some(Create));
        assert_eq!(coalesce(Modify, Modify), Some(Modify));
        assert_eq!(coalesce(Modify, Delete), Some(Delete));
        assert_eq!(coalesce(Delete, Delete), Some(Delete));
        assert_eq!(coalesce(Delete, Create), Some(Modify));
        assert_eq!(coalesce(Delete, Modify), Some(Modify));
        assert_eq!(coalesce(Modify, Create), Some(Modify));
    }

    #[test]
    fn create_modify_delete_is_a_no_op() {
        assert_eq!(coalesce_all([Create, Modify, Modify, Delete]), None);
        assert_eq!(coalesce_all(std::iter::empty()), None);
    }

    #[test]
    fn rename_event_is_keyed_by_destination() -> Result<(), crate::PrimitiveError> {
        let event = DocumentEvent::Renamed {
            path: DocumentPath::parse("b.md")?,
            old_path: DocumentPath::parse("a.md")?,
        };
        assert_eq!(event.path().as_str(), "b.md");
        Ok(())
    }

    /// Generate event bursts that respect document existence.
    fn lifecycle() -> impl Strategy<Value = (bool, Vec<ChangeKind>)> {
        (any::<bool>(), prop::collection::vec(any::<bool>(), 1..24)).prop_map(
            |(exists_initially, choices)| {
                let mut exists = exists_initially;
                let mut events = Vec::with_capacity(choices.len());
                for modify in choices {
                    let event = match (exists, modify) {
                        (false, _) => Create,
                        (true, true) => Modify,
                        (true, false) => Delete,
                    };
                    exists = event != Delete;
                    events.push(event);
                }
                (exists_initially, events)
            },
        )
    }

    proptest! {
        #[test]
        fn burst_collapses_to_net_effect((existed, events) in lifecycle()) {
            let exists_after = events.last() != Some(&Delete);
            let expected = match (existed, exists_after) {
                (false, false) => None,
                (false, true) => Some(Create),
                (true, false) => Some(Delete),
                (true, true) => Some(Modify),
            };
            prop_assert_eq!(coalesce_all(events), expected);
        }

        #[test]
        fn splitting_a_burst_does_not_change_the_result(
            (_, events) in lifecycle(),
            split in 0usize..24,
        ) {
            let split = split.min(events.len());
            let (head, tail) = events.split_at(split);
            let staged = coalesce_all(coalesce_all(head.iter().copied()).into_iter().chain(tail.iter().copied()));
            prop_assert_eq!(staged, coalesce_all(events.iter().copied()));
        }
    }
}
