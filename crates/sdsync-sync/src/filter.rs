//! Station selection by channel number or call sign.

use std::collections::HashSet;

use sdsync_api::Station;

/// Set of channel numbers and/or call signs to sync.
///
/// An empty filter selects every station.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelFilter {
    entries: HashSet<String>,
}

impl ChannelFilter {
    /// Builds a filter from channel numbers or call signs. Blank entries
    /// are ignored.
    #[must_use]
    pub fn new<I, T>(entries: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|e| e.as_ref().trim().to_owned())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    /// Returns `true` when no entries are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if `station` should be synced.
    #[must_use]
    pub fn matches(&self, station: &Station) -> bool {
        if self.entries.is_empty() {
            return true;
        }
        [station.channel.as_deref(), station.callsign.as_deref()]
            .into_iter()
            .flatten()
            .any(|v| self.entries.contains(v))
    }
}
