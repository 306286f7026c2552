// In-memory fuzzy index over document titles.

use std::cmp::Ordering;
use std::sync::{PoisonError, RwLock};

use quire_common::types::SearchItem;
use tracing::debug;

use super::fuzzy::TitleScorer;
use super::SearchIndex;

#[derive(Default)]
pub struct TitleSearchIndex {
    items: RwLock<Vec<SearchItem>>,
    scorer: TitleScorer,
}

impl TitleSearchIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SearchIndex for TitleSearchIndex {
    fn report(&self, item: SearchItem) {
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        items.retain(|existing| existing.id != item.id);
        debug!(doc_id = %item.id, "search entry reported");
        items.push(item);
    }

    fn remove(&self, id: &str) {
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        items.retain(|existing| existing.id != id);
        debug!(doc_id = id, "search entry removed");
    }

    fn search(&self, query: &str, limit: usize) -> Vec<SearchItem> {
        let items = self.items.read().unwrap_or_else(PoisonError::into_inner);
        let mut hits: Vec<(f64, &SearchItem)> = items
            .iter()
            .filter_map(|item| self.scorer.score(query, &item.title).map(|score| (score, item)))
            .collect();

        hits.sort_by(|(score_a, a), (score_b, b)| {
            score_a
                .partial_cmp(score_b)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.modified_at.cmp(&a.modified_at))
                .then_with(|| a.id.cmp(&b.id))
        });

        hits.into_iter().take(limit).map(|(_, item)| item.clone()).collect()
    }

    fn rebuild(&self, items: Vec<SearchItem>) {
        let mut deduped: Vec<SearchItem> = Vec::with_capacity(items.len());
        for item in items {
            deduped.retain(|existing| existing.id != item.id);
            deduped.push(item);
        }
        let count = deduped.len();
        *self.items.write().unwrap_or_else(PoisonError::into_inner) = deduped;
        debug!(count, "search index rebuilt");
    }

    fn len(&self) -> usize {
        self.items.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, title: &str, modified_at: i64) -> SearchItem {
        SearchItem { id: id.into(), title: title.into(), created_at: 0, modified_at }
    }

    fn ids(items: &[SearchItem]) -> Vec<&str> {
        items.iter().map(|item| item.id.as_str()).collect()
    }

    #[test]
    fn reported_item_is_found_and_removed_item_never_returns() {
        let index = TitleSearchIndex::new();
        index.report(item("Doc-X", "Meeting Notes", 1));

        assert_eq!(ids(&index.search("Meeting", 10)), vec!["Doc-X"]);

        index.remove("Doc-X");
        for query in ["Meeting", "Notes", "meeting notes", "m"] {
            assert!(index.search(query, 10).is_empty(), "`{query}` should not match");
        }
    }

    #[test]
    fn report_replaces_previous_entry_for_the_same_id() {
        let index = TitleSearchIndex::new();
        index.report(item("Doc-a", "Draft", 1));
        index.report(item("Doc-a", "Final", 2));

        assert_eq!(index.len(), 1);
        assert!(index.search("Draft", 10).is_empty());
        assert_eq!(ids(&index.search("Final", 10)), vec!["Doc-a"]);
    }

    #[test]
    fn results_are_ranked_and_limited() {
        let index = TitleSearchIndex::new();
        index.rebuild(vec![
            item("Doc-late", "Weekly plan", 5),
            item("Doc-exact", "Plan", 1),
            item("Doc-early", "Plan for Q3", 2),
            item("Doc-other", "Groceries", 9),
        ]);

        let hits = index.search("plan", 10);
        assert_eq!(ids(&hits), vec!["Doc-exact", "Doc-early", "Doc-late"]);
        assert_eq!(index.search("plan", 2).len(), 2);
    }

    #[test]
    fn ties_prefer_recently_modified() {
        let index = TitleSearchIndex::new();
        index.report(item("Doc-old", "Notes", 1));
        index.report(item("Doc-new", "Notes", 2));
        assert_eq!(ids(&index.search("notes", 10)), vec!["Doc-new", "Doc-old"]);
    }

    #[test]
    fn rebuild_replaces_everything_and_dedupes() {
        let index = TitleSearchIndex::new();
        index.report(item("Doc-stale", "Stale", 1));
        index.rebuild(vec![item("Doc-a", "One", 1), item("Doc-a", "Two", 2)]);

        assert_eq!(index.len(), 1);
        assert!(index.search("Stale", 10).is_empty());
        assert_eq!(ids(&index.search("Two", 10)), vec!["Doc-a"]);
    }
}
