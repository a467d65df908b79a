use serde::Serialize;
use url::form_urlencoded;

use crate::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

#[derive(Serialize, Debug)]
pub struct PageContext<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> PageContext<T> {
    pub fn from_rows(rows: Vec<T>, total_rows: i64, page: &Page) -> Self {
        let next = page
            .offset
            .checked_add(page.limit)
            .filter(|next_offset| *next_offset < total_rows)
            .map(|next_offset| page.href(Some(next_offset)));

        let previous = (page.offset > 0).then(|| {
            let prev_offset = page.offset - page.limit;
            page.href((prev_offset > 0).then_some(prev_offset))
        });

        Self {
            count: total_rows,
            next,
            previous,
            results: rows,
        }
    }

    pub fn map<U, F>(self, f: F) -> PageContext<U>
    where
        F: FnMut(T) -> U,
    {
        PageContext {
            count: self.count,
            next: self.next,
            previous: self.previous,
            results: self.results.into_iter().map(f).collect(),
        }
    }
}

/// Limit/offset window of a list request, plus what is needed to link the
/// neighbouring windows.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
    path: String,
    query: Vec<(String, String)>,
}

impl Page {
    /// Unparseable or out of range values fall back to the defaults instead of
    /// failing the request.
    pub fn from_query(path: &str, query: &[(String, String)]) -> Self {
        let limit = lookup(query, "limit")
            .and_then(|value| value.parse::<i64>().ok())
            .filter(|limit| *limit > 0)
            .map(|limit| limit.min(MAX_PAGE_SIZE))
            .unwrap_or(DEFAULT_PAGE_SIZE);

        let offset = lookup(query, "offset")
            .and_then(|value| value.parse::<i64>().ok())
            .filter(|offset| *offset >= 0)
            .unwrap_or(0);

        Self {
            limit,
            offset,
            path: path.to_string(),
            query: query
                .iter()
                .filter(|(k, _)| k != "limit" && k != "offset")
                .cloned()
                .collect(),
        }
    }

    fn href(&self, offset: Option<i64>) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        serializer.extend_pairs(self.query.iter());
        serializer.append_pair("limit", &self.limit.to_string());
        if let Some(offset) = offset {
            serializer.append_pair("offset", &offset.to_string());
        }

        format!("{}?{}", self.path, serializer.finish())
    }
}

pub fn lookup<'a>(query: &'a [(String, String)], key: &str) -> Option<&'a str> {
    query
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}
