// Title search: fuzzy in-memory index behind an abstraction layer.

pub mod fuzzy;
pub mod title_index;

use quire_common::types::SearchItem;

pub use title_index::TitleSearchIndex;

/// Default number of results returned by a search.
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Abstraction over title search. Holds at most one entry per document id and
/// only non-trashed documents.
pub trait SearchIndex: Send + Sync {
    /// Insert or replace the entry for `item.id`.
    fn report(&self, item: SearchItem);

    fn remove(&self, id: &str);

    /// Ranked matches, best first.
    fn search(&self, query: &str, limit: usize) -> Vec<SearchItem>;

    /// Drop all entries and index `items` instead.
    fn rebuild(&self, items: Vec<SearchItem>);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
