pub mod asset;
pub mod metadata;

use uuid::Uuid;

/// One page of a cursor-based scan. `next_cursor` is `None` on the last page.
///
/// Pages are bounded and pulled lazily; a scan never materializes the full
/// asset population.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<Uuid>,
}

impl<T> Page<T> {
    /// Builds a page from a keyset query that fetched `page_size` rows at
    /// most. A short page means the scan is complete.
    pub fn from_rows(items: Vec<T>, page_size: i64, cursor_of: impl Fn(&T) -> Uuid) -> Self {
        let next_cursor = if items.len() as i64 == page_size {
            items.last().map(&cursor_of)
        } else {
            None
        };
        Self { items, next_cursor }
    }
}
