use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::recipes::filter::FilterParams;
use crate::recipes::pipeline::PageRequest;

/// `page` / `limit` as raw strings so junk values fall back to defaults
/// instead of rejecting the request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pagination {
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl Pagination {
    pub fn to_request(&self) -> PageRequest {
        PageRequest::new(
            self.page.as_deref().and_then(parse_leading_int),
            self.limit.as_deref().and_then(parse_leading_int),
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(flatten)]
    pub filters: FilterParams,
    #[serde(flatten)]
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NameQuery {
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T> {
    pub page: i64,
    pub limit: i64,
    pub total: u64,
    pub total_pages: u64,
    pub data: Vec<T>,
}

lazy_static! {
    static ref LEADING_INT_RE: Regex = Regex::new(r"^\s*([+-]?)(\d+)").unwrap();
}

/// Integer prefix of `raw` (`"3abc"` → 3). Out-of-range values saturate.
fn parse_leading_int(raw: &str) -> Option<i64> {
    let caps = LEADING_INT_RE.captures(raw)?;
    let negative = &caps[1] == "-";
    let value = match caps[2].parse::<i64>() {
        Ok(v) => v,
        Err(_) => i64::MAX,
    };
    Some(if negative { -value } else { value })
}
