//! Genre id to name directory, loaded once per engine.

use std::collections::HashMap;

use crate::tmdb::GenreEntry;

/// Maps remote genre ids to display names.
///
/// Empty until the first successful genre fetch. Later loads are ignored so
/// ids resolve the same way for the whole session.
#[derive(Debug, Clone, Default)]
pub struct GenreDirectory {
    names: HashMap<i64, String>,
    loaded: bool,
}

impl GenreDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate the directory. Returns `false` if it was already loaded.
    pub fn load(&mut self, entries: impl IntoIterator<Item = GenreEntry>) -> bool {
        if self.loaded {
            return false;
        }
        self.names = entries.into_iter().map(|g| (g.id, g.name)).collect();
        self.loaded = true;
        true
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn name(&self, id: i64) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    /// Resolve ids in order, dropping any the directory does not know.
    pub fn resolve(&self, ids: &[i64]) -> Vec<String> {
        ids.iter()
            .filter_map(|id| self.name(*id))
            .map(str::to_string)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
