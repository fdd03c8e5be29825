use std::collections::HashSet;

use crate::playlist::PlaylistEntry;

/// Identity of a channel: display name and URL kept as separate fields,
/// so no choice of separator can make two different pairs collide
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    display_name: String,
    url: String,
}

impl From<&PlaylistEntry> for DedupKey {
    fn from(entry: &PlaylistEntry) -> Self {
        Self {
            display_name: entry.display_name.clone(),
            url: entry.url.clone(),
        }
    }
}

/// Remembers every (name, url) pair seen during a run
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: HashSet<DedupKey>,
    duplicates: usize,
}

impl Deduplicator {
    /// Returns `true` the first time an entry is seen, `false` for every repeat
    pub fn check_and_mark(&mut self, entry: &PlaylistEntry) -> bool {
        let first_seen = self.seen.insert(DedupKey::from(entry));
        if !first_seen {
            self.duplicates += 1;
        }
        first_seen
    }

    #[must_use]
    pub const fn duplicates(&self) -> usize {
        self.duplicates
    }
}
