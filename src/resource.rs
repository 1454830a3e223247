//! Provider resource fetching for classic webhooks
//!
//! A classic delivery only carries a resource id, so completing it means one
//! authenticated GET against the provider API. The fetch sits behind a trait
//! so the intake pipeline can run against a stub in tests without a live
//! provider.
//!
//! Only payments, orders, and customers are fetchable by bare id. Refunds,
//! subscriptions, and mandates live under a parent resource in the provider
//! API and fail fast with a descriptive error instead of a guessed URL.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::FetchError;
use crate::model::ResourceType;

/// Maximum chars of a provider error body kept in the error message
const MAX_ERROR_DETAIL_CHARS: usize = 200;

/// Fetches full provider resources by id
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    /// Fetch the resource as raw JSON using the given plaintext API key
    async fn fetch(
        &self,
        api_key: &str,
        resource_type: ResourceType,
        resource_id: &str,
    ) -> Result<Value, FetchError>;
}

/// Map a resource type to its provider API path, or fail for types that
/// cannot be fetched by bare id
fn resource_path(resource_type: ResourceType, resource_id: &str) -> Result<String, FetchError> {
    match resource_type {
        ResourceType::Payment => Ok(format!("payments/{}", resource_id)),
        ResourceType::Order => Ok(format!("orders/{}", resource_id)),
        ResourceType::Customer => Ok(format!("customers/{}", resource_id)),
        ResourceType::Refund => Err(FetchError::RequiresParent {
            kind: "refund".to_string(),
            parent: "payment".to_string(),
        }),
        ResourceType::Subscription => Err(FetchError::RequiresParent {
            kind: "subscription".to_string(),
            parent: "customer".to_string(),
        }),
        ResourceType::Mandate => Err(FetchError::RequiresParent {
            kind: "mandate".to_string(),
            parent: "customer".to_string(),
        }),
        ResourceType::Unknown => Err(FetchError::UnknownType(resource_type.as_str().to_string())),
    }
}

/// Production fetcher backed by the provider's REST API
pub struct HttpResourceFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpResourceFetcher {
    /// Create a fetcher against the given API base URL (no trailing slash)
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(crate::USER_AGENT)
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ResourceFetcher for HttpResourceFetcher {
    async fn fetch(
        &self,
        api_key: &str,
        resource_type: ResourceType,
        resource_id: &str,
    ) -> Result<Value, FetchError> {
        let path = resource_path(resource_type, resource_id)?;
        let url = format!("{}/{}", self.base_url, path);
        debug!(resource_type = %resource_type, resource_id = %resource_id, "Fetching provider resource");

        let response = self
            .client
            .get(&url)
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(MAX_ERROR_DETAIL_CHARS)
                .collect();
            return Err(FetchError::Api {
                status: status.as_u16(),
                message: detail,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetchable_paths() {
        assert_eq!(
            resource_path(ResourceType::Payment, "tr_abc").unwrap(),
            "payments/tr_abc"
        );
        assert_eq!(
            resource_path(ResourceType::Order, "ord_1").unwrap(),
            "orders/ord_1"
        );
        assert_eq!(
            resource_path(ResourceType::Customer, "cst_9").unwrap(),
            "customers/cst_9"
        );
    }

    #[test]
    fn test_parent_scoped_types_fail_fast() {
        let err = resource_path(ResourceType::Refund, "re_1").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot fetch refund directly - requires payment ID"
        );

        let err = resource_path(ResourceType::Subscription, "sub_1").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot fetch subscription directly - requires customer ID"
        );

        let err = resource_path(ResourceType::Mandate, "mdt_1").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot fetch mandate directly - requires customer ID"
        );
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = resource_path(ResourceType::Unknown, "zz_1").unwrap_err();
        assert!(matches!(err, FetchError::UnknownType(_)));
    }
}
