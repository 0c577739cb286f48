//! In-memory paging, filtering, and ordering
//!
//! List endpoints fetch the full result set and shape it here: field
//! equality filters first, then ordering by the named field (a leading `-`
//! descends), then the page window. The response envelope carries the total
//! count and page count alongside the slice.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Query parameters shared by every list endpoint
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    /// 1-based page number
    #[serde(default)]
    pub page_no: Option<usize>,
    /// Page size; 0 or absent disables paging
    #[serde(default)]
    pub page_size: Option<usize>,
    /// Field path to order by, `-` prefix for descending
    #[serde(default)]
    pub sortby: Option<String>,
    /// Comma-separated `field=value` equality filters
    #[serde(default)]
    pub filter: Option<String>,
    /// Kubernetes label selector forwarded to the list call
    #[serde(default)]
    pub label_selector: Option<String>,
}

impl PageQuery {
    /// Parsed filter terms as a field-path to expected-value map
    pub fn filters(&self) -> HashMap<String, String> {
        self.filter
            .as_deref()
            .unwrap_or("")
            .split(',')
            .filter_map(|term| {
                let term = term.trim();
                let (k, v) = term.split_once('=')?;
                Some((k.trim().to_string(), v.trim().to_string()))
            })
            .collect()
    }
}

/// One page of a shaped list response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// 1-based page number
    pub page_no: usize,
    /// Page size used for the window
    pub page_size: usize,
    /// Total number of pages
    pub total_page: usize,
    /// Total number of items before windowing
    pub total_count: usize,
    /// The page slice
    pub list: Vec<Value>,
}

/// Field lookup by dotted path ("metadata.name")
fn field<'a>(item: &'a Value, path: &str) -> Option<&'a Value> {
    let pointer = format!("/{}", path.replace('.', "/"));
    item.pointer(&pointer)
}

fn field_as_string(item: &Value, path: &str) -> String {
    match field(item, path) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn compare_field(a: &Value, b: &Value, path: &str) -> Ordering {
    match (field(a, path), field(b, path)) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        _ => field_as_string(a, path).cmp(&field_as_string(b, path)),
    }
}

/// Apply filters, ordering, and the page window
pub fn paginate(mut items: Vec<Value>, query: &PageQuery) -> Page {
    let filters = query.filters();
    if !filters.is_empty() {
        items.retain(|item| {
            filters
                .iter()
                .all(|(path, expected)| field_as_string(item, path) == *expected)
        });
    }

    if let Some(sortby) = query.sortby.as_deref().filter(|s| !s.is_empty()) {
        let (path, descending) = match sortby.strip_prefix('-') {
            Some(rest) => (rest, true),
            None => (sortby, false),
        };
        items.sort_by(|a, b| {
            let ord = compare_field(a, b, path);
            if descending {
                ord.reverse()
            } else {
                ord
            }
        });
    }

    let total_count = items.len();
    let page_size = query.page_size.unwrap_or(0);
    if page_size == 0 {
        return Page {
            page_no: 1,
            page_size: total_count,
            total_page: 1,
            total_count,
            list: items,
        };
    }

    let page_no = query.page_no.unwrap_or(1).max(1);
    let total_page = total_count.div_ceil(page_size);
    let offset = (page_no - 1).saturating_mul(page_size);
    let list = items
        .into_iter()
        .skip(offset)
        .take(page_size)
        .collect();

    Page {
        page_no,
        page_size,
        total_page,
        total_count,
        list,
    }
}
