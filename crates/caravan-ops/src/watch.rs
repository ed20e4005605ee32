//! Change notifications for views observing the filesystem.

use caravan_core::FileRef;
use serde::Serialize;
use tokio::sync::broadcast;

/// A change made by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileChange {
    Created(FileRef),
    Removed(FileRef),
    Moved { from: FileRef, to: FileRef },
    Trashed { original: FileRef, trash: FileRef },
    Restored { trash: FileRef, original: FileRef },
}

impl FileChange {
    /// Check whether the change touches `location` or anything under it.
    pub fn affects(&self, location: &FileRef) -> bool {
        match self {
            Self::Created(r) | Self::Removed(r) => r.is_within(location),
            Self::Moved { from, to } => from.is_within(location) || to.is_within(location),
            Self::Trashed { original, .. } | Self::Restored { original, .. } => {
                original.is_within(location)
            }
        }
    }
}

/// Broadcast feed of [`FileChange`]s.
///
/// Subscribers that fall behind miss the oldest events. Dropping a receiver
/// unsubscribes it.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<FileChange>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FileChange> {
        self.tx.subscribe()
    }

    pub fn publish(&self, change: FileChange) {
        // No subscribers is not an error.
        let _ = self.tx.send(change);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(crate::OPERATION_CHANNEL_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_and_drop() {
        let feed = ChangeFeed::default();
        feed.publish(FileChange::Created(FileRef::local("/ignored")));

        let mut rx = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 1);
        feed.publish(FileChange::Removed(FileRef::local("/a")));
        assert_eq!(
            rx.try_recv().unwrap(),
            FileChange::Removed(FileRef::local("/a"))
        );

        drop(rx);
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[test]
    fn test_affects() {
        let change = FileChange::Moved {
            from: FileRef::local("/a/x"),
            to: FileRef::local("/b/x"),
        };
        assert!(change.affects(&FileRef::local("/a")));
        assert!(change.affects(&FileRef::local("/b/x")));
        assert!(!change.affects(&FileRef::local("/c")));

        let trashed = FileChange::Trashed {
            original: FileRef::local("/a/y"),
            trash: FileRef::parse("trash:///y"),
        };
        assert!(trashed.affects(&FileRef::local("/a")));
        assert!(!trashed.affects(&FileRef::local("/b")));
    }
}
