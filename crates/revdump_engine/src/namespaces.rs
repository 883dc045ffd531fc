use std::sync::Arc;

use revdump_core::{ExportRequest, HttpMethod, NamespaceScope, Params};
use revdump_logging::{dump_info, dump_warn};
use serde_json::Value;

use crate::client::ApiClient;
use crate::retry::{RetryPolicy, RetryingClient};
use crate::SourceError;

/// Supplies the ordered namespace ids an export run walks through.
#[async_trait::async_trait]
pub trait NamespaceSource: Send + Sync {
    async fn namespace_indices(&self, request: &ExportRequest) -> Result<Vec<i64>, SourceError>;
}

/// Resolves `all` through `meta=siteinfo`.
///
/// Transient failures are cooled down and retried under the source's
/// [`RetryPolicy`], [`RetryPolicy::default`] unless set otherwise.
pub struct ApiNamespaceSource {
    client: Arc<dyn ApiClient>,
    policy: RetryPolicy,
}

impl ApiNamespaceSource {
    pub fn new(client: Arc<dyn ApiClient>) -> Self {
        Self {
            client,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[async_trait::async_trait]
impl NamespaceSource for ApiNamespaceSource {
    async fn namespace_indices(&self, request: &ExportRequest) -> Result<Vec<i64>, SourceError> {
        if let NamespaceScope::Explicit(ids) = request.scope() {
            return Ok(ids.clone());
        }

        let params: Params = [
            ("action", "query"),
            ("meta", "siteinfo"),
            ("siprop", "namespaces"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let client = RetryingClient::new(self.client.clone(), self.policy.clone());
        let response = client.call(HttpMethod::Get, &params).await?;

        match parse_namespaces(&response) {
            Some(ids) => {
                dump_info!("{} namespaces found", ids.len());
                Ok(ids)
            }
            None => {
                dump_warn!(
                    "Could not get namespaces from the API request, using main namespace only"
                );
                Ok(vec![0])
            }
        }
    }
}

/// Non-negative namespace ids in ascending order. Special pages and media
/// (negative ids) cannot be exported.
fn parse_namespaces(response: &Value) -> Option<Vec<i64>> {
    let namespaces = response.get("query")?.get("namespaces")?;
    let entries: Vec<&Value> = match namespaces {
        Value::Object(map) => map.values().collect(),
        Value::Array(items) => items.iter().collect(),
        _ => return None,
    };
    let mut ids: Vec<i64> = entries
        .into_iter()
        .filter_map(|entry| entry.get("id").and_then(Value::as_i64))
        .filter(|id| *id >= 0)
        .collect();
    ids.sort_unstable();
    ids.dedup();
    Some(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn siteinfo_namespaces_are_sorted_and_non_negative() {
        let response = json!({"query": {"namespaces": {
            "-2": {"id": -2, "*": "Media"},
            "10": {"id": 10, "*": "Template"},
            "0": {"id": 0, "*": ""},
            "1": {"id": 1, "*": "Talk"}
        }}});
        assert_eq!(parse_namespaces(&response), Some(vec![0, 1, 10]));
    }

    #[test]
    fn missing_namespaces_key_is_none() {
        assert_eq!(parse_namespaces(&json!({"query": {}})), None);
    }
}
