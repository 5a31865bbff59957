//! Page-following for list endpoints.
//!
//! GitLab caps `per_page` at 100, so any list can span several pages. A walk
//! stops at the first page shorter than `per_page`, at the page cap, or at
//! the first failure. Items gathered before a failure are kept.

use super::{ApiClient, ClientError};
use serde_json::Value;
use tracing::debug;

/// Outcome of walking the pages of one list endpoint.
#[derive(Debug, Default)]
pub struct PageWalk {
    /// Items from every page fetched successfully.
    pub items: Vec<Value>,
    /// Number of pages fetched successfully.
    pub pages: usize,
    /// True when the page cap was reached while more pages may remain.
    pub truncated: bool,
    /// The failure that ended the walk early, if any.
    pub error: Option<ClientError>,
}

impl PageWalk {
    /// Convert into a plain result, discarding partial items on failure.
    pub fn into_result(self) -> Result<Vec<Value>, ClientError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.items),
        }
    }
}

/// Fetch pages `1..=max_pages` of a list endpoint.
///
/// `url_for_page` builds the URL of a given page. A response that is not a
/// JSON array ends the walk with `ClientError::UnexpectedShape`.
pub async fn walk_pages<C, F>(
    client: &C,
    per_page: usize,
    max_pages: usize,
    url_for_page: F,
) -> PageWalk
where
    C: ApiClient,
    F: Fn(usize) -> String,
{
    let mut walk = PageWalk::default();

    for page in 1..=max_pages.max(1) {
        let url = url_for_page(page);
        let value = match client.get_json(&url).await {
            Ok(value) => value,
            Err(e) => {
                walk.error = Some(e);
                return walk;
            }
        };

        let items = match value {
            Value::Array(items) => items,
            other => {
                walk.error = Some(ClientError::UnexpectedShape {
                    url,
                    message: format!("expected a JSON array, got {}", describe(&other)),
                });
                return walk;
            }
        };

        let count = items.len();
        walk.items.extend(items);
        walk.pages += 1;
        debug!("Page {} of {} returned {} items", page, url, count);

        if count < per_page {
            return walk;
        }
        if page == max_pages.max(1) {
            walk.truncated = true;
        }
    }

    walk
}

/// Short description of a JSON value for error messages.
fn describe(value: &Value) -> String {
    match value {
        Value::Object(map) => match map.get("message").or_else(|| map.get("error")) {
            Some(message) => format!("error object: {}", message),
            None => "an object".to_string(),
        },
        Value::Null => "null".to_string(),
        Value::Bool(_) => "a boolean".to_string(),
        Value::Number(_) => "a number".to_string(),
        Value::String(_) => "a string".to_string(),
        Value::Array(_) => "an array".to_string(),
    }
}
