use crate::cache::TreeCache;
use crate::handler::HandlerModule;
use crate::litefile::LiteFile;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use proxy_log::info;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, channel};

/// Script/template byproduct suffixes whose compiled or cached form must be
/// dropped alongside the source file they were derived from.
const HANDLER_SUFFIXES: &[&str] = &[".py", ".pyc", ".pyo", ".so", ".mako"];

/// Strips any suffix in `HANDLER_SUFFIXES` from `path`, returning the bare
/// source path a handler was compiled or rendered from.
fn strip_handler_suffix(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    for suffix in HANDLER_SUFFIXES {
        if let Some(stem) = name.strip_suffix(suffix) {
            return Some(path.with_file_name(stem));
        }
    }
    None
}

/// Watches each route's document root and invalidates `TreeCache` entries
/// under a changed path, so a file edited on disk is re-read on the next
/// request instead of served stale.
pub struct FsWatcher {
    _inner: RecommendedWatcher,
    events: Receiver<notify::Result<Event>>,
}

impl FsWatcher {
    pub fn new(roots: &[String]) -> notify::Result<Self> {
        let (tx, rx) = channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })?;

        for root in roots {
            let path = Path::new(root);
            if path.is_dir() {
                if let Err(e) = watcher.watch(path, RecursiveMode::Recursive) {
                    proxy_log::warn!("failed to watch {}: {}", root, e);
                }
            }
        }

        Ok(Self {
            _inner: watcher,
            events: rx,
        })
    }

    /// Drains every event queued since the last tick. Non-blocking, meant to
    /// be called once per reactor loop iteration.
    ///
    /// Invalidates both cache tiers under the changed path, plus the
    /// handler cache entry for the bare source a changed `.py`/`.pyc`/
    /// `.pyo`/`.so`/`.mako` byproduct was derived from (e.g. touching
    /// `view.pyc` also drops the cached `view` handler).
    pub fn poll(&self, tree_cache: &mut TreeCache<LiteFile>, handler_cache: &mut TreeCache<HandlerModule>) {
        while let Ok(event) = self.events.try_recv() {
            let Ok(event) = event else { continue };
            if !matches!(
                event.kind,
                EventKind::Modify(_) | EventKind::Remove(_) | EventKind::Create(_)
            ) {
                continue;
            }

            for path in event.paths {
                let mut removed = tree_cache.invalidate_prefix(&path) + handler_cache.invalidate_prefix(&path);

                if let Some(source) = strip_handler_suffix(&path) {
                    removed += handler_cache.invalidate_prefix(&source);
                }

                if removed > 0 {
                    info!("invalidated {removed} cached entries under {path:?}");
                }
            }
        }
    }
}
