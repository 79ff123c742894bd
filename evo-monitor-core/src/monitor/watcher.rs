//! Core file system watcher implementation using notify crate

use crate::monitor::{MonitorConfig, MonitorError, RawEvent, RawEventKind, Result};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// Builds native watch registrations for a directory tree
pub struct FileWatcher {
    config: MonitorConfig,
}

impl FileWatcher {
    pub fn new(config: MonitorConfig) -> Self {
        Self { config }
    }

    /// Start watching the configured root.
    ///
    /// Every filtered notification is forwarded to `events` as a raw event.
    /// The returned handle owns the native registrations; dropping or
    /// stopping it releases them.
    pub fn start(&self, events: mpsc::UnboundedSender<RawEvent>) -> Result<WatchHandle> {
        let root = std::fs::canonicalize(&self.config.root)
            .map_err(|_| MonitorError::RootNotFound(self.config.root.clone()))?;
        if !root.is_dir() {
            return Err(MonitorError::RootNotFound(root));
        }

        let mut gitignore_builder = GitignoreBuilder::new(&root);
        for pattern in &self.config.ignore_patterns {
            gitignore_builder.add_line(None, pattern)?;
        }
        // Lessons written to a journal inside the root must not come back as operations
        let excluded: Vec<PathBuf> = resolve_file(&self.config.journal_path).into_iter().collect();
        let filter = Arc::new(PathFilter {
            root: root.clone(),
            gitignore: gitignore_builder.build()?,
            watch_hidden: self.config.watch_hidden,
            excluded,
        });

        let callback_filter = filter.clone();
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => forward_event(event, &callback_filter, &events),
            Err(e) => error!("Watch error: {:?}", e),
        })?;

        let handle = WatchHandle {
            filter,
            recursive: self.config.recursive,
            state: Arc::new(Mutex::new(WatchState { watcher: Some(watcher), watched: HashSet::new() })),
        };

        let count = handle.add_directory_tree(&root);
        info!("Watching {:?} ({} directories, recursive: {})", root, count, self.config.recursive);

        Ok(handle)
    }
}

/// Shared handle over the live native watch registrations
#[derive(Clone)]
pub struct WatchHandle {
    filter: Arc<PathFilter>,
    recursive: bool,
    state: Arc<Mutex<WatchState>>,
}

struct WatchState {
    watcher: Option<RecommendedWatcher>,
    watched: HashSet<PathBuf>,
}

impl WatchHandle {
    /// Canonical root being watched
    pub fn root(&self) -> &Path {
        &self.filter.root
    }

    /// Register `dir` and, when recursive, every non-ignored directory below it.
    ///
    /// Enumeration and registration failures are logged and skipped.
    /// Returns the number of newly registered directories.
    pub fn add_directory_tree(&self, dir: &Path) -> usize {
        let max_depth = if self.recursive { usize::MAX } else { 0 };
        let filter = &self.filter;
        let walker = WalkDir::new(dir)
            .follow_links(false)
            .max_depth(max_depth)
            .into_iter()
            .filter_entry(|entry| {
                entry.file_type().is_dir() && (entry.depth() == 0 || !filter.is_ignored(entry.path(), true))
            });

        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        let WatchState { watcher, watched } = &mut *state;
        let Some(watcher) = watcher.as_mut() else {
            debug!("Watcher stopped, not adding {:?}", dir);
            return 0;
        };

        let mut added = 0;
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable directory under {:?}: {}", dir, e);
                    continue;
                }
            };
            let path = entry.into_path();
            if watched.contains(&path) {
                continue;
            }
            match watcher.watch(&path, RecursiveMode::NonRecursive) {
                Ok(()) => {
                    debug!("Watching directory {:?}", path);
                    watched.insert(path);
                    added += 1;
                }
                Err(e) => warn!("Failed to watch {:?}: {}", path, e),
            }
        }

        added
    }

    /// Whether a path falls under the hidden/ignore rules
    pub fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        self.filter.is_ignored(path, is_dir)
    }

    /// Number of directories with a live registration
    pub fn watched_directories(&self) -> usize {
        self.state.lock().map(|state| state.watched.len()).unwrap_or(0)
    }

    /// Release every native registration
    pub fn stop(&self) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(mut watcher) = state.watcher.take() {
            for path in state.watched.drain() {
                if let Err(e) = watcher.unwatch(&path) {
                    debug!("Failed to unwatch {:?}: {}", path, e);
                }
            }
            info!("Stopped watching {:?}", self.filter.root);
        }
    }
}

/// Hidden-file and gitignore-style filtering relative to the watch root
struct PathFilter {
    root: PathBuf,
    gitignore: Gitignore,
    watch_hidden: bool,
    /// Exact files never reported, such as the learning journal
    excluded: Vec<PathBuf>,
}

impl PathFilter {
    fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        if self.excluded.iter().any(|excluded| excluded == path) {
            return true;
        }
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return false;
        };
        if relative.as_os_str().is_empty() {
            return false;
        }

        if !self.watch_hidden
            && relative.components().any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
        {
            return true;
        }

        self.gitignore.matched_path_or_any_parents(relative, is_dir).is_ignore()
    }
}

/// Absolute form of a file that may not exist yet, with its directory canonicalized
fn resolve_file(path: &Path) -> Option<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().ok()?.join(path)
    };
    let file_name = absolute.file_name()?.to_os_string();
    match absolute.parent().map(std::fs::canonicalize) {
        Some(Ok(parent)) => Some(parent.join(file_name)),
        _ => Some(absolute),
    }
}

/// Map a notify event kind onto the two kinds the classifier understands
fn raw_kind(kind: &EventKind) -> RawEventKind {
    match kind {
        EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_)) => {
            RawEventKind::Rename
        }
        EventKind::Modify(_) => RawEventKind::Change,
        EventKind::Access(_) | EventKind::Any | EventKind::Other => RawEventKind::Other,
    }
}

fn forward_event(event: Event, filter: &PathFilter, tx: &mpsc::UnboundedSender<RawEvent>) {
    let kind = raw_kind(&event.kind);
    for path in event.paths {
        if filter.is_ignored(&path, path.is_dir()) {
            debug!("Ignoring event for filtered path: {:?}", path);
            continue;
        }
        if let Err(e) = tx.send(RawEvent { kind, path }) {
            debug!("Dropping raw event, receiver closed: {}", e);
        }
    }
}
