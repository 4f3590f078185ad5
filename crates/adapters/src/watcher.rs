//! Filesystem watcher pushing vault change events onto a channel.

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedSender;
use vault_sync_domain::{DocumentEvent, DocumentPath};
use vault_sync_shared::{ErrorClass, ErrorCode, ErrorEnvelope, Result};

/// Recursive watcher over a vault root.
///
/// Events are translated to vault-relative [`DocumentEvent`]s on the notify
/// thread and sent on the channel; the engine's pump task is the only
/// consumer. Indexability is decided by the engine, not here. Dropping the
/// watcher stops delivery.
pub struct VaultWatcher {
    root: PathBuf,
    _watcher: RecommendedWatcher,
}

impl VaultWatcher {
    /// Start watching `root` recursively.
    pub fn start(root: &Path, sender: UnboundedSender<DocumentEvent>) -> Result<Self> {
        let root = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        let handler_root = root.clone();
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            let Ok(event) = result else {
                tracing::warn!("watch backend reported an error");
                return;
            };
            for document_event in map_notify_event(&handler_root, event) {
                if sender.send(document_event).is_err() {
                    tracing::debug!("watch event dropped because the engine channel is closed");
                    return;
                }
            }
        })
        .map_err(|error| watcher_error(&error))?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|error| watcher_error(&error))?;

        Ok(Self {
            root,
            _watcher: watcher,
        })
    }

    /// Canonical root being watched.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn map_notify_event(root: &Path, event: Event) -> Vec<DocumentEvent> {
    let Event { kind, paths, .. } = event;
    let relative = |path: &PathBuf| to_document_path(root, path);

    match kind {
        EventKind::Modify(ModifyKind::Name(mode)) => map_rename(root, mode, &paths),
        EventKind::Create(_) => paths
            .iter()
            .flat_map(|path| files_at(path))
            .filter_map(|path| relative(&path))
            .map(|path| DocumentEvent::Created { path })
            .collect(),
        EventKind::Modify(ModifyKind::Metadata(_)) | EventKind::Access(_) => Vec::new(),
        EventKind::Modify(_) => paths
            .iter()
            .filter(|path| !path.is_dir())
            .filter_map(relative)
            .map(|path| DocumentEvent::Modified { path })
            .collect(),
        EventKind::Remove(_) => paths
            .iter()
            .filter_map(relative)
            .map(|path| DocumentEvent::Deleted { path })
            .collect(),
        EventKind::Any | EventKind::Other => Vec::new(),
    }
}

fn map_rename(root: &Path, mode: RenameMode, paths: &[PathBuf]) -> Vec<DocumentEvent> {
    let relative = |path: &PathBuf| to_document_path(root, path);
    match mode {
        RenameMode::Both => match (paths.first(), paths.get(1)) {
            (Some(from), Some(to)) => moved_files(from, to)
                .into_iter()
                .filter_map(|(old, new)| match (relative(&old), relative(&new)) {
                    (Some(old_path), Some(path)) => Some(DocumentEvent::Renamed { path, old_path }),
                    (Some(path), None) => Some(DocumentEvent::Deleted { path }),
                    (None, Some(path)) => Some(DocumentEvent::Created { path }),
                    (None, None) => None,
                })
                .collect(),
            _ => Vec::new(),
        },
        RenameMode::From => paths
            .iter()
            .filter_map(relative)
            .map(|path| DocumentEvent::Deleted { path })
            .collect(),
        RenameMode::To => paths
            .iter()
            .flat_map(|path| files_at(path))
            .filter_map(|path| relative(&path))
            .map(|path| DocumentEvent::Created { path })
            .collect(),
        RenameMode::Any | RenameMode::Other => paths
            .iter()
            .flat_map(|full| {
                if full.exists() {
                    files_at(full)
                        .into_iter()
                        .filter_map(|path| relative(&path))
                        .map(|path| DocumentEvent::Created { path })
                        .collect::<Vec<_>>()
                } else {
                    relative(full)
                        .map(|path| DocumentEvent::Deleted { path })
                        .into_iter()
                        .collect()
                }
            })
            .collect(),
    }
}

/// Pair every file moved from `from` to `to`.
///
/// A directory move is expanded into one pair per file found under the
/// destination, so each cached document under the old prefix is retired.
fn moved_files(from: &Path, to: &Path) -> Vec<(PathBuf, PathBuf)> {
    if !to.is_dir() {
        return vec![(from.to_path_buf(), to.to_path_buf())];
    }
    files_under(to)
        .into_iter()
        .filter_map(|file| {
            let suffix = file.strip_prefix(to).ok()?;
            Some((from.join(suffix), file))
        })
        .collect()
}

/// `path` itself, or every file beneath it when it is a directory.
fn files_at(path: &Path) -> Vec<PathBuf> {
    if path.is_dir() {
        files_under(path)
    } else {
        vec![path.to_path_buf()]
    }
}

/// Breadth-first listing of regular files under `dir`, sorted per level.
///
/// Runs on the notify thread, so it uses blocking reads. Unreadable
/// directories are skipped.
fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut queue = VecDeque::from([dir.to_path_buf()]);
    while let Some(current) = queue.pop_front() {
        let Ok(read_dir) = std::fs::read_dir(&current) else {
            tracing::debug!(dir = %current.display(), "skipping unreadable directory");
            continue;
        };
        let mut entries = read_dir
            .filter_map(std::result::Result::ok)
            .filter_map(|entry| Some((entry.path(), entry.file_type().ok()?)))
            .collect::<Vec<_>>();
        entries.sort_by(|left, right| left.0.cmp(&right.0));
        for (path, file_type) in entries {
            if file_type.is_dir() {
                queue.push_back(path);
            } else if file_type.is_file() {
                files.push(path);
            }
        }
    }
    files
}

fn to_document_path(root: &Path, full: &Path) -> Option<DocumentPath> {
    let relative = full.strip_prefix(root).ok()?;
    let joined = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    DocumentPath::parse(joined).ok()
}

fn watcher_error(error: &notify::Error) -> ErrorEnvelope {
    ErrorEnvelope::unexpected(
        ErrorCode::new("store", "watch_failed"),
        format!("filesystem watch failed: {error}"),
        ErrorClass::NonRetriable,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind};

    fn root() -> PathBuf {
        PathBuf::from("/vault")
    }

    fn doc(value: &str) -> DocumentPath {
        DocumentPath::parse(value).expect("valid path")
    }

    #[test]
    fn maps_create_modify_remove() {
        let created = Event::new(EventKind::Create(CreateKind::File)).add_path(root().join("a.md"));
        assert_eq!(
            map_notify_event(&root(), created),
            vec![DocumentEvent::Created { path: doc("a.md") }]
        );

        let modified = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(root().join("notes/b.md"));
        assert_eq!(
            map_notify_event(&root(), modified),
            vec![DocumentEvent::Modified { path: doc("notes/b.md") }]
        );

        let removed =
            Event::new(EventKind::Remove(RemoveKind::File)).add_path(root().join("c.md"));
        assert_eq!(
            map_notify_event(&root(), removed),
            vec![DocumentEvent::Deleted { path: doc("c.md") }]
        );
    }

    #[test]
    fn rename_both_becomes_single_renamed_event() {
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(root().join("old.md"))
            .add_path(root().join("dir/new.md"));
        assert_eq!(
            map_notify_event(&root(), event),
            vec![DocumentEvent::Renamed {
                path: doc("dir/new.md"),
                old_path: doc("old.md"),
            }]
        );
    }

    #[test]
    fn rename_halves_map_to_delete_and_create() {
        let from = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From)))
            .add_path(root().join("x.md"));
        let to = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::To)))
            .add_path(root().join("y.md"));
        assert_eq!(
            map_notify_event(&root(), from),
            vec![DocumentEvent::Deleted { path: doc("x.md") }]
        );
        assert_eq!(
            map_notify_event(&root(), to),
            vec![DocumentEvent::Created { path: doc("y.md") }]
        );
    }

    #[test]
    fn rename_out_of_vault_is_a_delete() {
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(root().join("leaving.md"))
            .add_path(PathBuf::from("/elsewhere/leaving.md"));
        assert_eq!(
            map_notify_event(&root(), event),
            vec![DocumentEvent::Deleted { path: doc("leaving.md") }]
        );
    }

    #[test]
    fn ignores_metadata_access_and_foreign_paths() {
        let metadata = Event::new(EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any)))
            .add_path(root().join("a.md"));
        assert!(map_notify_event(&root(), metadata).is_empty());

        let foreign =
            Event::new(EventKind::Remove(RemoveKind::File)).add_path(PathBuf::from("/tmp/a.md"));
        assert!(map_notify_event(&root(), foreign).is_empty());

        let vault_root = Event::new(EventKind::Remove(RemoveKind::Folder)).add_path(root());
        assert!(map_notify_event(&root(), vault_root).is_empty());
    }

    #[test]
    fn directory_rename_retires_every_file_under_the_old_prefix() {
        let vault = std::env::temp_dir().join(format!("vsync_watch_{}", uuid::Uuid::new_v4()));
        let moved = vault.join("archive");
        std::fs::create_dir_all(moved.join("sub")).expect("create dirs");
        std::fs::write(moved.join("a.md"), "a").expect("write a");
        std::fs::write(moved.join("sub/b.md"), "b").expect("write b");

        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(vault.join("projects"))
            .add_path(moved.clone());
        let events = map_notify_event(&vault, event);

        let created = Event::new(EventKind::Create(CreateKind::Folder)).add_path(moved);
        let copied = map_notify_event(&vault, created);
        std::fs::remove_dir_all(&vault).expect("cleanup");

        assert_eq!(
            events,
            vec![
                DocumentEvent::Renamed {
                    path: doc("archive/a.md"),
                    old_path: doc("projects/a.md"),
                },
                DocumentEvent::Renamed {
                    path: doc("archive/sub/b.md"),
                    old_path: doc("projects/sub/b.md"),
                },
            ]
        );
        assert_eq!(
            copied,
            vec![
                DocumentEvent::Created { path: doc("archive/a.md") },
                DocumentEvent::Created { path: doc("archive/sub/b.md") },
            ]
        );
    }

    #[tokio::test]
    async fn start_fails_for_missing_root() {
        let (sender, _receiver) = tokio::sync::mpsc::unbounded_channel();
        let missing = std::env::temp_dir().join(format!("vsync_missing_{}", uuid::Uuid::new_v4()));
        let error = VaultWatcher::start(&missing, sender)
            .err()
            .expect("watching a missing directory fails");
        assert_eq!(error.code, ErrorCode::new("store", "watch_failed"));
    }
}
