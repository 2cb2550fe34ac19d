use serde::Deserialize;

use crate::error::Error;

pub const DEFAULT_PER_PAGE: u32 = 10;

/// A validated page request: `page` and `per_page` are both at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    page: u32,
    per_page: u32,
    desc: bool,
}

impl Pagination {
    pub fn new(page: u32, per_page: u32, desc: bool) -> Result<Self, Error> {
        if page < 1 || per_page < 1 {
            return Err(Error::InvalidPagination);
        }
        Ok(Self {
            page,
            per_page,
            desc,
        })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    pub fn desc(&self) -> bool {
        self.desc
    }

    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.per_page as usize
    }

    pub fn limit(&self) -> usize {
        self.per_page as usize
    }

    /// Cuts the requested page out of an already ordered sequence.
    pub fn slice<T>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.offset())
            .take(self.limit())
            .collect()
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
            desc: true,
        }
    }
}

/// Raw `?page=&per_page=&desc=&hashtag=` query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub desc: Option<bool>,
    pub hashtag: Option<String>,
}

impl PageParams {
    pub fn pagination(&self) -> Result<Pagination, Error> {
        Pagination::new(
            self.page.unwrap_or(1),
            self.per_page.unwrap_or(DEFAULT_PER_PAGE),
            self.desc.unwrap_or(true),
        )
    }

    /// An empty `hashtag=` means no filter.
    pub fn hashtag(&self) -> Option<&str> {
        self.hashtag.as_deref().filter(|tag| !tag.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_bounds() {
        assert!(matches!(
            Pagination::new(0, 10, true),
            Err(Error::InvalidPagination)
        ));
        assert!(matches!(
            Pagination::new(1, 0, true),
            Err(Error::InvalidPagination)
        ));
    }

    #[test]
    fn slice_never_exceeds_per_page() {
        let items: Vec<u32> = (0..23).collect();
        for page in 1..=4 {
            for per_page in 1..=25 {
                let p = Pagination::new(page, per_page, true).unwrap();
                assert!(p.slice(items.iter()).len() <= per_page as usize);
            }
        }
    }

    #[test]
    fn slice_walks_pages_in_order() {
        let p = Pagination::new(3, 4, false).unwrap();
        assert_eq!(p.slice(0..10), vec![8, 9]);
        assert_eq!(p.offset(), 8);
    }

    #[test]
    fn params_fall_back_to_defaults() {
        let params = PageParams {
            hashtag: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(params.pagination().unwrap(), Pagination::default());
        assert_eq!(params.hashtag(), None);
    }
}
