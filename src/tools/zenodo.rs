//! Zenodo dataset search.

use super::ToolContext;
use crate::error::{MicroError, Result};
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

const ZENODO_RECORDS_URL: &str = "https://zenodo.org/api/records/";

/// Search Zenodo and return the record page links of the first hits.
///
/// A non-success status is returned as an `"Error: <status>"` value.
pub(super) async fn search(ctx: &ToolContext, query: &str, max_results: usize) -> Result<Value> {
    let url = records_url(ZENODO_RECORDS_URL, query)?;
    debug!("Searching Zenodo: {}", url);

    let mut request = ctx.http.get(url);
    if let Some(token) = ctx.settings().zenodo_token.as_deref().filter(|t| !t.is_empty()) {
        request = request.bearer_auth(token);
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        warn!("Zenodo search failed with {}", status);
        return Ok(json!(format!("Error: {}", status.as_u16())));
    }

    let body: Value = response.json().await?;
    Ok(json!(record_links(&body, max_results)))
}

/// Records endpoint filtered to datasets matching `query`.
fn records_url(base: &str, query: &str) -> Result<Url> {
    Url::parse_with_params(base, &[("q", query), ("type", "dataset")])
        .map_err(|e| MicroError::tool_failed("search_zenodo_datasets", e.to_string()))
}

/// `links.self_html` of at most `max_results` hits.
fn record_links(body: &Value, max_results: usize) -> Vec<String> {
    body["hits"]["hits"]
        .as_array()
        .map(|hits| {
            hits.iter()
                .filter_map(|hit| hit["links"]["self_html"].as_str())
                .take(max_results)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_url_encodes_query() {
        let url = records_url(ZENODO_RECORDS_URL, "lithium battery & 3D").unwrap();
        assert_eq!(url.host_str(), Some("zenodo.org"));
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("q".to_string(), "lithium battery & 3D".to_string()),
                ("type".to_string(), "dataset".to_string()),
            ]
        );
    }

    #[test]
    fn test_record_links_respects_limit() {
        let body = json!({
            "hits": {
                "hits": [
                    {"links": {"self_html": "https://zenodo.org/records/1"}},
                    {"links": {}},
                    {"links": {"self_html": "https://zenodo.org/records/2"}},
                    {"links": {"self_html": "https://zenodo.org/records/3"}}
                ]
            }
        });
        assert_eq!(
            record_links(&body, 2),
            vec!["https://zenodo.org/records/1", "https://zenodo.org/records/2"]
        );
        assert!(record_links(&json!({}), 5).is_empty());
    }
}
