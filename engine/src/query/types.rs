//! Request and response types of the top-level operations

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::QueryError;
use super::filter::FilterNode;
use super::keyset::Direction;

/// A result row keyed by field name (or field path for joined sort keys)
pub type Row = Map<String, Value>;

/// `{limit, offset|skip}` or `{page, size}`; page numbers start at 1
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Pagination {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(alias = "skip", skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Resolved LIMIT/OFFSET
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageWindow {
    pub limit: Option<u64>,
    pub offset: u64,
}

impl Pagination {
    pub fn limit_offset(limit: u64, offset: u64) -> Self {
        Self {
            limit: Some(limit),
            offset: Some(offset),
            ..Default::default()
        }
    }

    pub fn paged(page: u64, size: u64) -> Self {
        Self {
            page: Some(page),
            size: Some(size),
            ..Default::default()
        }
    }

    /// Reconcile both styles into one window, rejecting contradictions
    pub fn window(&self) -> Result<PageWindow, QueryError> {
        if self.page.is_none() && self.size.is_none() {
            if self.limit == Some(0) {
                return Err(QueryError::InvalidPagination("limit must be greater than 0".into()));
            }
            return Ok(PageWindow {
                limit: self.limit,
                offset: self.offset.unwrap_or(0),
            });
        }

        let size = self
            .size
            .or(self.limit)
            .ok_or_else(|| QueryError::InvalidPagination("page requires a size".into()))?;
        if size == 0 {
            return Err(QueryError::InvalidPagination("size must be greater than 0".into()));
        }
        let page = self.page.unwrap_or(1);
        if page == 0 {
            return Err(QueryError::InvalidPagination("page starts at 1".into()));
        }
        let offset = (page - 1)
            .checked_mul(size)
            .ok_or_else(|| QueryError::InvalidPagination("page out of range".into()))?;

        if self.limit.is_some_and(|limit| limit != size) {
            return Err(QueryError::InvalidPagination(
                "limit and size disagree".into(),
            ));
        }
        if self.offset.is_some_and(|o| o != offset) {
            return Err(QueryError::InvalidPagination(
                "offset and page disagree".into(),
            ));
        }
        Ok(PageWindow {
            limit: Some(size),
            offset,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PageQuery {
    pub filter: FilterNode,
    pub sort: Vec<String>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CursorQuery {
    pub filter: FilterNode,
    pub sort: Vec<String>,
    pub limit: Option<u64>,
    pub direction: Direction,
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
    pub has_next: bool,
    pub has_previous: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorPage {
    pub rows: Vec<Row>,
    pub page_info: PageInfo,
}
