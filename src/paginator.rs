use crate::error::Result;
use crate::selector::JsonPath;

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageNumberPaginator {
    pub base_page: u64,
    pub page_param: String,
    pub total_path: JsonPath,
    pub maximum_page: Option<u64>,
}

impl PageNumberPaginator {
    pub fn new(base_page: u64, page_param: &str, total_path: &str) -> Result<PageNumberPaginator> {
        Ok(PageNumberPaginator {
            base_page,
            page_param: page_param.to_owned(),
            total_path: JsonPath::parse(total_path)?,
            maximum_page: None,
        })
    }

    pub fn maximum_page(mut self, maximum_page: u64) -> PageNumberPaginator {
        self.maximum_page = Some(maximum_page);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Paginator {
    PageNumber(PageNumberPaginator),
    SinglePage,
}

impl Paginator {
    pub fn page_number(base_page: u64, page_param: &str, total_path: &str) -> Result<Paginator> {
        Ok(Paginator::PageNumber(PageNumberPaginator::new(
            base_page, page_param, total_path,
        )?))
    }

    pub fn cursor(&self) -> PageCursor {
        let page = match self {
            Paginator::PageNumber(paginator) => paginator.base_page,
            Paginator::SinglePage => 0,
        };

        PageCursor {
            paginator: self.clone(),
            page,
        }
    }
}

/// Traversal state for one `paginate` call.
#[derive(Debug, Clone)]
pub struct PageCursor {
    paginator: Paginator,
    page: u64,
}

impl PageCursor {
    pub fn query(&self) -> Vec<(String, String)> {
        match &self.paginator {
            Paginator::PageNumber(paginator) => {
                vec![(paginator.page_param.clone(), self.page.to_string())]
            }
            Paginator::SinglePage => Vec::new(),
        }
    }

    /// Consumes the cursor after a response, returning the cursor for the next
    /// request if there is one.
    pub fn advance(self, body: &Value, records: usize) -> Option<PageCursor> {
        match &self.paginator {
            Paginator::SinglePage => None,
            Paginator::PageNumber(paginator) => {
                if records == 0 {
                    return None;
                }

                let total = paginator
                    .total_path
                    .lookup(body)
                    .first()
                    .and_then(|total| total.as_u64())?;
                let next = self.page + 1;
                let last = paginator
                    .maximum_page
                    .map_or(total, |maximum_page| total.min(maximum_page));

                if next > last {
                    return None;
                }

                Some(PageCursor {
                    paginator: self.paginator,
                    page: next,
                })
            }
        }
    }
}
