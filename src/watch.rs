//! Change debouncing for the watcher-to-updater path.
//!
//! The OS-level watcher is an external collaborator; this module owns the
//! contract it must honor: raw per-path events go in, and deduplicated,
//! coalesced [`ChangeBatch`]es come out after a quiet period. Every
//! incoming event resets the timer, so a save burst (formatters, generated
//! files, editor swap files) produces one batch instead of a reparse per
//! keystroke.

use crate::types::ChangeBatch;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

/// Kind of a raw filesystem event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A file appeared
    Created,
    /// A file's content changed
    Changed,
    /// A file disappeared
    Deleted,
}

/// One raw filesystem event.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// Absolute path the event refers to
    pub path: PathBuf,
    /// What happened
    pub kind: ChangeKind,
}

impl ChangeEvent {
    /// Convenience constructor.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Accepts raw events and emits debounced batches.
///
/// Dropping the debouncer closes the input; the background task flushes
/// any pending batch and exits.
pub struct Debouncer {
    events: mpsc::UnboundedSender<ChangeEvent>,
}

impl Debouncer {
    /// Create a debouncer with the given quiet period. Returns the
    /// debouncer and the receiving end for coalesced batches.
    #[must_use]
    pub fn new(quiet: Duration) -> (Self, mpsc::UnboundedReceiver<ChangeBatch>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (batches_tx, batches_rx) = mpsc::unbounded_channel();

        tokio::spawn(run(events_rx, batches_tx, quiet));

        (Self { events: events_tx }, batches_rx)
    }

    /// Feed one raw event in.
    pub fn notify(&self, event: ChangeEvent) {
        // receiver only goes away on shutdown; losing the event then is fine
        let _ = self.events.send(event);
    }
}

async fn run(
    mut events: mpsc::UnboundedReceiver<ChangeEvent>,
    batches: mpsc::UnboundedSender<ChangeBatch>,
    quiet: Duration,
) {
    let mut pending: HashMap<PathBuf, ChangeKind> = HashMap::new();

    loop {
        if pending.is_empty() {
            // Nothing buffered; block until the next event or shutdown
            match events.recv().await {
                Some(event) => accumulate(&mut pending, event),
                None => break,
            }
        } else {
            // Timer resets on every event because the timeout restarts here
            match tokio::time::timeout(quiet, events.recv()).await {
                Ok(Some(event)) => accumulate(&mut pending, event),
                Ok(None) => {
                    flush(&mut pending, &batches);
                    break;
                }
                Err(_) => flush(&mut pending, &batches),
            }
        }
    }
}

fn accumulate(pending: &mut HashMap<PathBuf, ChangeKind>, event: ChangeEvent) {
    let merged = match pending.get(&event.path) {
        // A file created inside the window is still a creation even after
        // further writes
        Some(ChangeKind::Created) if event.kind == ChangeKind::Changed => ChangeKind::Created,
        // Deleted then recreated inside the window nets out to a change
        Some(ChangeKind::Deleted) if event.kind == ChangeKind::Created => ChangeKind::Changed,
        _ => event.kind,
    };
    pending.insert(event.path, merged);
}

fn flush(pending: &mut HashMap<PathBuf, ChangeKind>, batches: &mpsc::UnboundedSender<ChangeBatch>) {
    let mut batch = ChangeBatch::default();
    for (path, kind) in pending.drain() {
        match kind {
            ChangeKind::Created => batch.created.push(path),
            ChangeKind::Changed => batch.changed.push(path),
            ChangeKind::Deleted => batch.deleted.push(path),
        }
    }
    // deterministic delivery order
    batch.created.sort();
    batch.changed.sort();
    batch.deleted.sort();

    tracing::debug!(paths = batch.len(), "Delivering debounced change batch");
    let _ = batches.send(batch);
}

/// A point-in-time view of file identities, for polling-based change
/// detection when no OS watcher is wired up.
pub type Snapshot = HashMap<PathBuf, (u128, u64)>;

/// Capture (mtime-nanos, size) for each path. Unreadable files are simply
/// absent, which the diff then reports as deletions.
#[must_use]
pub fn snapshot(files: &[PathBuf]) -> Snapshot {
    let mut snap = Snapshot::new();
    for path in files {
        let Ok(meta) = std::fs::metadata(path) else {
            continue;
        };
        let Ok(modified) = meta.modified() else {
            continue;
        };
        let mtime = modified
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        snap.insert(path.clone(), (mtime, meta.len()));
    }
    snap
}

/// Diff two snapshots into raw change events.
#[must_use]
pub fn diff_snapshots(old: &Snapshot, new: &Snapshot) -> Vec<ChangeEvent> {
    let mut events = Vec::new();

    for (path, identity) in new {
        match old.get(path) {
            None => events.push(ChangeEvent::new(path.clone(), ChangeKind::Created)),
            Some(previous) if previous != identity => {
                events.push(ChangeEvent::new(path.clone(), ChangeKind::Changed));
            }
            Some(_) => {}
        }
    }
    for path in old.keys() {
        if !new.contains_key(path) {
            events.push(ChangeEvent::new(path.clone(), ChangeKind::Deleted));
        }
    }

    events.sort_by(|a, b| a.path.cmp(&b.path));
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_into_one_batch() {
        let (debouncer, mut batches) = Debouncer::new(Duration::from_millis(250));

        debouncer.notify(ChangeEvent::new("/p/a.tf", ChangeKind::Changed));
        debouncer.notify(ChangeEvent::new("/p/a.tf", ChangeKind::Changed));
        debouncer.notify(ChangeEvent::new("/p/b.tf", ChangeKind::Created));

        let batch = batches.recv().await.unwrap();
        assert_eq!(batch.changed, vec![PathBuf::from("/p/a.tf")]);
        assert_eq!(batch.created, vec![PathBuf::from("/p/b.tf")]);
        assert!(batch.deleted.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_bursts_yield_separate_batches() {
        let (debouncer, mut batches) = Debouncer::new(Duration::from_millis(100));

        debouncer.notify(ChangeEvent::new("/p/a.tf", ChangeKind::Changed));
        let first = batches.recv().await.unwrap();
        assert_eq!(first.changed.len(), 1);

        debouncer.notify(ChangeEvent::new("/p/a.tf", ChangeKind::Deleted));
        let second = batches.recv().await.unwrap();
        assert_eq!(second.deleted.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_then_change_stays_created() {
        let (debouncer, mut batches) = Debouncer::new(Duration::from_millis(100));

        debouncer.notify(ChangeEvent::new("/p/new.tf", ChangeKind::Created));
        debouncer.notify(ChangeEvent::new("/p/new.tf", ChangeKind::Changed));

        let batch = batches.recv().await.unwrap();
        assert_eq!(batch.created, vec![PathBuf::from("/p/new.tf")]);
        assert!(batch.changed.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_then_create_becomes_change() {
        let (debouncer, mut batches) = Debouncer::new(Duration::from_millis(100));

        debouncer.notify(ChangeEvent::new("/p/a.tf", ChangeKind::Deleted));
        debouncer.notify(ChangeEvent::new("/p/a.tf", ChangeKind::Created));

        let batch = batches.recv().await.unwrap();
        assert_eq!(batch.changed, vec![PathBuf::from("/p/a.tf")]);
        assert!(batch.deleted.is_empty());
        assert!(batch.created.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_flushes_pending() {
        let (debouncer, mut batches) = Debouncer::new(Duration::from_secs(3600));

        debouncer.notify(ChangeEvent::new("/p/a.tf", ChangeKind::Changed));
        drop(debouncer);

        let batch = batches.recv().await.unwrap();
        assert_eq!(batch.changed.len(), 1);
        assert!(batches.recv().await.is_none());
    }

    #[test]
    fn test_snapshot_diff() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.tf");
        let b = dir.path().join("b.tf");
        std::fs::write(&a, "locals {}").unwrap();
        std::fs::write(&b, "locals {}").unwrap();

        let before = snapshot(&[a.clone(), b.clone()]);

        std::fs::write(&a, "locals { x = 1 }").unwrap();
        std::fs::remove_file(&b).unwrap();
        let c = dir.path().join("c.tf");
        std::fs::write(&c, "locals {}").unwrap();

        let after = snapshot(&[a.clone(), b.clone(), c.clone()]);
        let events = diff_snapshots(&before, &after);

        assert_eq!(events.len(), 3);
        assert!(events
            .iter()
            .any(|e| e.path == a && e.kind == ChangeKind::Changed));
        assert!(events
            .iter()
            .any(|e| e.path == b && e.kind == ChangeKind::Deleted));
        assert!(events
            .iter()
            .any(|e| e.path == c && e.kind == ChangeKind::Created));
    }
}
