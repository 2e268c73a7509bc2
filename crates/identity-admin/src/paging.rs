//! Page windows and paged results for listing queries.

use std::future::Future;

use serde::{Deserialize, Serialize};

/// A 1-based page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u64,
    pub page_size: u64,
}

impl PageRequest {
    /// Build a window, clamping `page` to at least 1 and `page_size` into
    /// `1..=max_page_size`.
    pub fn new(page: u64, page_size: u64, max_page_size: u64) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, max_page_size.max(1)),
        }
    }

    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.page_size)
    }

    pub fn limit(&self) -> u64 {
        self.page_size
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 10,
        }
    }
}

/// One page of results together with the total count and the window that
/// produced it, so a client can jump straight to page N.
///
/// `total_count` is exact as of query execution only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagedList<T> {
    pub items: Vec<T>,
    pub total_count: u64,
    pub page: u64,
    pub page_size: u64,
}

impl<T> PagedList<T> {
    pub fn new(items: Vec<T>, total_count: u64, window: PageRequest) -> Self {
        Self {
            items,
            total_count,
            page: window.page,
            page_size: window.page_size,
        }
    }

    /// Page an in-memory collection that has already been filtered and sorted.
    pub fn from_vec(all: Vec<T>, window: PageRequest) -> Self {
        let total_count = all.len() as u64;
        let items = all
            .into_iter()
            .skip(window.offset() as usize)
            .take(window.limit() as usize)
            .collect();
        Self::new(items, total_count, window)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PagedList<U> {
        PagedList {
            items: self.items.into_iter().map(f).collect(),
            total_count: self.total_count,
            page: self.page,
            page_size: self.page_size,
        }
    }

    pub fn page_count(&self) -> u64 {
        self.total_count.div_ceil(self.page_size.max(1))
    }
}

/// Fetch every page of a listing, `page_size` items at a time.
///
/// Stops once `total_count` items are in hand or a page comes back empty,
/// so a listing that shrinks mid-walk still terminates.
pub async fn collect_pages<T, E, F, Fut>(page_size: u64, mut fetch: F) -> Result<Vec<T>, E>
where
    F: FnMut(PageRequest) -> Fut,
    Fut: Future<Output = Result<PagedList<T>, E>>,
{
    let mut items = Vec::new();
    let mut page = 1;
    loop {
        let list = fetch(PageRequest::new(page, page_size, page_size)).await?;
        let exhausted = list.items.is_empty();
        let total_count = list.total_count;
        items.extend(list.items);
        if exhausted || items.len() as u64 >= total_count {
            return Ok(items);
        }
        page += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_clamps() {
        let window = PageRequest::new(0, 0, 50);
        assert_eq!(window.page, 1);
        assert_eq!(window.page_size, 1);

        let window = PageRequest::new(3, 500, 50);
        assert_eq!(window.page_size, 50);
        assert_eq!(window.offset(), 100);
    }

    #[test]
    fn test_from_vec_pages_and_keeps_total() {
        let all: Vec<u32> = (1..=25).collect();
        let page = PagedList::from_vec(all, PageRequest::new(3, 10, 100));
        assert_eq!(page.items, vec![21, 22, 23, 24, 25]);
        assert_eq!(page.total_count, 25);
        assert_eq!(page.page, 3);
        assert_eq!(page.page_count(), 3);
    }

    #[test]
    fn test_from_vec_past_the_end_is_empty() {
        let page = PagedList::from_vec(vec![1, 2, 3], PageRequest::new(5, 10, 100));
        assert!(page.items.is_empty());
        assert_eq!(page.total_count, 3);
    }

    #[tokio::test]
    async fn test_collect_pages_walks_past_a_clamped_page_size() {
        let all: Vec<u32> = (1..=23).collect();
        let mut calls = 0;
        let collected = collect_pages(100, |window| {
            calls += 1;
            // The source caps pages at 5 whatever the caller asks for.
            let capped = PageRequest::new(window.page, window.page_size, 5);
            let page = PagedList::from_vec(all.clone(), capped);
            async move { Ok::<_, ()>(page) }
        })
        .await
        .unwrap();
        assert_eq!(collected, all);
        assert_eq!(calls, 5);
    }

    #[tokio::test]
    async fn test_collect_pages_stops_on_an_empty_page() {
        let collected = collect_pages(10, |window| {
            // Claims more rows than it ever returns.
            let items = if window.page == 1 { vec![1, 2] } else { Vec::new() };
            async move { Ok::<_, ()>(PagedList::new(items, 50, window)) }
        })
        .await
        .unwrap();
        assert_eq!(collected, vec![1, 2]);
    }
}
