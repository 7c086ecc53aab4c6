//! Pagination merge loop (spec §4.6 step 6): follows both absolute
//! next-URL forms (Microsoft Graph's `@odata.nextLink`) and opaque token
//! forms (Google's `nextPageToken`), capped at a configured maximum page
//! count with a warning on truncation.

use std::future::Future;

use mcpfusion_config::Pagination;
use serde_json::Value;

use crate::error::{HttpEngineError, HttpResult};
use crate::path;

#[derive(Debug, Clone)]
pub enum NextPage {
    AbsoluteUrl(String),
    Token(String),
}

fn extract_next(value: &Value, next_page_token_path: &str) -> Option<NextPage> {
    let raw = path::get(value, next_page_token_path)?.as_str()?;
    if raw.is_empty() {
        return None;
    }
    if raw.starts_with("http://") || raw.starts_with("https://") {
        Some(NextPage::AbsoluteUrl(raw.to_string()))
    } else {
        Some(NextPage::Token(raw.to_string()))
    }
}

fn extract_items(value: &Value, data_path: &str) -> HttpResult<Vec<Value>> {
    match path::get(value, data_path) {
        Some(Value::Array(items)) => Ok(items.clone()),
        _ => Err(HttpEngineError::PaginationShape(data_path.to_string())),
    }
}

fn set_items(container: &mut Value, data_path: &str, items: Vec<Value>) -> HttpResult<()> {
    let mut segments = data_path.split('.').peekable();
    let mut current = container;
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            let Some(map) = current.as_object_mut() else {
                return Err(HttpEngineError::PaginationShape(data_path.to_string()));
            };
            map.insert(segment.to_string(), Value::Array(items));
            return Ok(());
        }
        current = current
            .get_mut(segment)
            .ok_or_else(|| HttpEngineError::PaginationShape(data_path.to_string()))?;
    }
    Ok(())
}

/// Follows `config`'s next-page links starting from `first` (already
/// transformed), fetching each subsequent page through `fetch_next`, and
/// returns the first page's container with the concatenated item list.
pub async fn paginate<F, Fut>(first: Value, config: &Pagination, endpoint_id: &str, mut fetch_next: F) -> HttpResult<Value>
where
    F: FnMut(NextPage) -> Fut,
    Fut: Future<Output = HttpResult<Value>>,
{
    let mut items = extract_items(&first, &config.data_path)?;
    let mut current = first.clone();
    let mut pages_fetched = 1u32;

    loop {
        let Some(next) = extract_next(&current, &config.next_page_token_path) else {
            break;
        };
        if pages_fetched >= config.max_pages {
            tracing::warn!(endpoint_id, max_pages = config.max_pages, "pagination truncated at configured maximum page count");
            break;
        }

        let page = fetch_next(next).await?;
        let mut page_items = extract_items(&page, &config.data_path)?;
        items.append(&mut page_items);
        current = page;
        pages_fetched += 1;
    }

    let mut merged = first;
    set_items(&mut merged, &config.data_path, items)?;
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config() -> Pagination {
        Pagination {
            next_page_token_path: "nextPageToken".to_string(),
            data_path: "items".to_string(),
            page_size: None,
            max_pages: 20,
        }
    }

    #[tokio::test]
    async fn merges_items_across_opaque_token_pages() {
        let first = json!({"items": [1, 2], "nextPageToken": "p2"});
        let result = paginate(first, &config(), "ep", |next| async move {
            match next {
                NextPage::Token(token) => {
                    assert_eq!(token, "p2");
                    Ok(json!({"items": [3, 4]}))
                }
                NextPage::AbsoluteUrl(_) => panic!("unexpected absolute url"),
            }
        })
        .await
        .unwrap();

        assert_eq!(result, json!({"items": [1, 2, 3, 4], "nextPageToken": "p2"}));
    }

    #[tokio::test]
    async fn follows_absolute_next_link_forms() {
        let first = json!({"items": [1], "nextPageToken": "https://graph.example.com/next?x=1"});
        let result = paginate(first, &config(), "ep", |next| async move {
            match next {
                NextPage::AbsoluteUrl(url) => {
                    assert_eq!(url, "https://graph.example.com/next?x=1");
                    Ok(json!({"items": [2]}))
                }
                NextPage::Token(_) => panic!("unexpected token form"),
            }
        })
        .await
        .unwrap();

        assert_eq!(result.get("items").unwrap(), &json!([1, 2]));
    }

    #[tokio::test]
    async fn stops_at_max_pages_and_keeps_accumulated_items() {
        let mut cfg = config();
        cfg.max_pages = 2;
        let calls = AtomicU32::new(0);

        let first = json!({"items": [1], "nextPageToken": "always-more"});
        let result = paginate(first, &cfg, "ep", |_next| {
            calls.fetch_add(1, Ordering::Relaxed);
            async { Ok(json!({"items": [2], "nextPageToken": "always-more"})) }
        })
        .await
        .unwrap();

        assert_eq!(result.get("items").unwrap(), &json!([1, 2]));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn absent_next_page_token_stops_without_fetching() {
        let first = json!({"items": [1]});
        let result = paginate(first.clone(), &config(), "ep", |_next| async { panic!("should not fetch") }).await.unwrap();
        assert_eq!(result, first);
    }
}
