//! Dev-mode reload bookkeeping.
//!
//! Remembers which components were transformed against which directory and
//! style file, and maps file-watcher events onto the set of component modules
//! the host has to reload. Nothing here recompiles; a reloaded component goes
//! through `transform` again.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use crate::plugin::module_path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Add(PathBuf),
    Change(PathBuf),
    Unlink(PathBuf),
    UnlinkDir(PathBuf),
}

impl WatchEvent {
    /// Build an event from a watcher's kind name (`add`, `change`, `unlink`,
    /// `unlinkDir`).
    pub fn from_kind(kind: &str, path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        match kind {
            "add" => Some(WatchEvent::Add(path)),
            "change" => Some(WatchEvent::Change(path)),
            "unlink" => Some(WatchEvent::Unlink(path)),
            "unlinkDir" => Some(WatchEvent::UnlinkDir(path)),
            _ => None,
        }
    }
}

/// The host's reload-by-id primitive.
pub trait ModuleReloader {
    fn reload_module(&self, id: &str);
}

impl<F> ModuleReloader for F
where
    F: Fn(&str),
{
    fn reload_module(&self, id: &str) {
        self(id)
    }
}

#[derive(Debug, Default)]
struct Associations {
    by_directory: BTreeMap<PathBuf, BTreeSet<String>>,
    by_style: BTreeMap<PathBuf, BTreeSet<String>>,
}

impl Associations {
    /// Drop every id whose module path is `path`, whatever its query.
    fn forget_component(&mut self, path: &str) -> bool {
        let mut found = false;
        for map in [&mut self.by_directory, &mut self.by_style] {
            map.retain(|_, components| {
                let before = components.len();
                components.retain(|id| module_path(id) != path);
                found |= components.len() != before;
                !components.is_empty()
            });
        }
        found
    }
}

#[derive(Debug, Default)]
pub struct InvalidationTracker {
    associations: RwLock<Associations>,
}

impl InvalidationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, component_id: &str, directory: &Path, style_path: &Path) {
        let mut associations = self
            .associations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        associations
            .by_directory
            .entry(directory.to_path_buf())
            .or_default()
            .insert(component_id.to_string());
        associations
            .by_style
            .entry(style_path.to_path_buf())
            .or_default()
            .insert(component_id.to_string());
    }

    pub fn components_for_style(&self, style_path: &Path) -> Vec<String> {
        self.associations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_style
            .get(style_path)
            .map(|components| components.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn components_in_directory(&self, directory: &Path) -> Vec<String> {
        self.associations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_directory
            .get(directory)
            .map(|components| components.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_tracked_directory(&self, directory: &Path) -> bool {
        self.associations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_directory
            .contains_key(directory)
    }

    /// Apply a watcher event and reload the affected components. Returns the
    /// reloaded ids in reload order.
    pub fn handle_event(&self, event: &WatchEvent, reloader: &dyn ModuleReloader) -> Vec<String> {
        let to_reload = self.affected_components(event);
        for id in &to_reload {
            log::debug!("reloading {} after {:?}", id, event);
            reloader.reload_module(id);
        }
        to_reload
    }

    /// Update the associations for `event` and return the ids to reload. The
    /// lock is released before the host is called back.
    fn affected_components(&self, event: &WatchEvent) -> Vec<String> {
        let mut associations = self
            .associations
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        match event {
            WatchEvent::Add(path) => path
                .parent()
                .and_then(|dir| associations.by_directory.get(dir))
                .map(|components| components.iter().cloned().collect())
                .unwrap_or_default(),
            WatchEvent::Change(path) => associations
                .by_style
                .get(path)
                .map(|components| components.iter().cloned().collect())
                .unwrap_or_default(),
            WatchEvent::Unlink(path) => {
                let dependents: Vec<String> = associations
                    .by_style
                    .remove(path)
                    .map(|components| components.into_iter().collect())
                    .unwrap_or_default();

                let component = path.to_string_lossy();
                if associations.forget_component(&component) {
                    log::debug!("forgot deleted component {}", component);
                }
                dependents
            }
            WatchEvent::UnlinkDir(path) => {
                associations.by_directory.remove(path);
                Vec::new()
            }
        }
    }
}
