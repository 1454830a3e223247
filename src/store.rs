//! In-memory store for endpoints, credentials, and webhook logs
//!
//! All state lives in `parking_lot` RwLock-guarded maps keyed by id. Every
//! management read and write is scoped to an owner; a lookup under the wrong
//! owner reports not-found rather than revealing that the id exists.
//!
//! Logs are append-only: after insert the only permitted mutation is the
//! one-time forwarding write-back in [`Store::apply_forwarding_result`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{ApiCredential, Endpoint, ForwardingResult, WebhookLog};

/// Default log page size
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Maximum accepted log page size
pub const MAX_PAGE_SIZE: u32 = 100;

// ============================================================================
// Log Queries
// ============================================================================

/// Filter and pagination parameters for log queries.
///
/// All filters are conjunctive. Unknown filter values simply match nothing;
/// they are not an error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogQuery {
    /// Restrict to one endpoint
    pub endpoint_id: Option<Uuid>,

    /// Restrict to one terminal status (`success`, `signature_failed`, ...)
    pub status: Option<String>,

    /// Restrict to one classified resource type
    pub resource_type: Option<String>,

    /// Restrict to one event type
    pub event_type: Option<String>,

    /// Case-insensitive substring over resource ids and body `id` fields
    pub search: Option<String>,

    /// Inclusive lower bound on `received_at`
    pub from_date: Option<DateTime<Utc>>,

    /// Inclusive upper bound on `received_at`
    pub to_date: Option<DateTime<Utc>>,

    /// 1-based page number
    pub page: Option<u32>,

    /// Page size, clamped to [1, 100]
    pub limit: Option<u32>,
}

/// One page of query results, newest first
#[derive(Debug, Serialize)]
pub struct LogPage {
    /// Matching logs for the requested page
    pub logs: Vec<WebhookLog>,

    /// Page bookkeeping
    pub pagination: Pagination,
}

/// Pagination metadata
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Pagination {
    /// 1-based page served
    pub page: u32,

    /// Effective page size
    pub limit: u32,

    /// Total matches across all pages
    pub total: usize,

    /// Total page count
    pub pages: u32,
}

/// Entity counts, reported by the status endpoint
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StoreCounts {
    /// Configured endpoints
    pub endpoints: usize,

    /// Stored credentials
    pub credentials: usize,

    /// Retained logs
    pub logs: usize,
}

fn matches_search(log: &WebhookLog, search: Option<&str>) -> bool {
    let Some(needle) = search else {
        return true;
    };
    let needle = needle.to_lowercase();
    if needle.is_empty() {
        return true;
    }
    let hit = |value: &str| value.to_lowercase().contains(&needle);
    log.resource_id.as_deref().is_some_and(hit)
        || log
            .parsed_body
            .as_ref()
            .and_then(|body| body.id_field())
            .as_deref()
            .is_some_and(hit)
}

// ============================================================================
// Store
// ============================================================================

/// Thread-safe store shared across handlers and background forwarding tasks
#[derive(Debug, Default)]
pub struct Store {
    endpoints: RwLock<HashMap<Uuid, Endpoint>>,
    credentials: RwLock<HashMap<Uuid, ApiCredential>>,
    logs: RwLock<HashMap<Uuid, WebhookLog>>,
}

impl Store {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Endpoints
    // ------------------------------------------------------------------

    /// Insert a new endpoint
    pub fn insert_endpoint(&self, endpoint: Endpoint) -> Endpoint {
        self.endpoints.write().insert(endpoint.id, endpoint.clone());
        endpoint
    }

    /// List an owner's endpoints, newest first
    pub fn list_endpoints(&self, owner_id: &str) -> Vec<Endpoint> {
        let endpoints = self.endpoints.read();
        let mut result: Vec<Endpoint> = endpoints
            .values()
            .filter(|e| e.owner_id == owner_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        result
    }

    /// Get one endpoint, owner-scoped
    pub fn get_endpoint(&self, owner_id: &str, id: Uuid) -> Result<Endpoint, StoreError> {
        self.endpoints
            .read()
            .get(&id)
            .filter(|e| e.owner_id == owner_id)
            .cloned()
            .ok_or(StoreError::EndpointNotFound)
    }

    /// Get an endpoint by id alone. Intake uses this and enforces the
    /// owner/kind match from the intake URL itself.
    pub fn endpoint_by_id(&self, id: Uuid) -> Option<Endpoint> {
        self.endpoints.read().get(&id).cloned()
    }

    /// Apply a mutation to an endpoint under the write lock and return the
    /// updated copy
    pub fn update_endpoint<F>(
        &self,
        owner_id: &str,
        id: Uuid,
        apply: F,
    ) -> Result<Endpoint, StoreError>
    where
        F: FnOnce(&mut Endpoint),
    {
        let mut endpoints = self.endpoints.write();
        let endpoint = endpoints
            .get_mut(&id)
            .filter(|e| e.owner_id == owner_id)
            .ok_or(StoreError::EndpointNotFound)?;
        apply(endpoint);
        Ok(endpoint.clone())
    }

    /// Delete an endpoint. Its logs are retained as an audit trail.
    pub fn delete_endpoint(&self, owner_id: &str, id: Uuid) -> Result<(), StoreError> {
        let mut endpoints = self.endpoints.write();
        match endpoints.get(&id) {
            Some(e) if e.owner_id == owner_id => {
                endpoints.remove(&id);
                Ok(())
            }
            _ => Err(StoreError::EndpointNotFound),
        }
    }

    /// Bump delivery stats after a successful intake
    pub fn record_received(&self, endpoint_id: Uuid) {
        let mut endpoints = self.endpoints.write();
        if let Some(endpoint) = endpoints.get_mut(&endpoint_id) {
            endpoint.total_received += 1;
            endpoint.last_received_at = Some(Utc::now());
        }
    }

    // ------------------------------------------------------------------
    // Credentials
    // ------------------------------------------------------------------

    /// Insert a credential. A new default demotes the owner's previous
    /// default.
    pub fn insert_credential(&self, credential: ApiCredential) -> ApiCredential {
        let mut credentials = self.credentials.write();
        if credential.is_default {
            for other in credentials
                .values_mut()
                .filter(|c| c.owner_id == credential.owner_id)
            {
                other.is_default = false;
            }
        }
        credentials.insert(credential.id, credential.clone());
        credential
    }

    /// List an owner's credentials, newest first
    pub fn list_credentials(&self, owner_id: &str) -> Vec<ApiCredential> {
        let credentials = self.credentials.read();
        let mut result: Vec<ApiCredential> = credentials
            .values()
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        result
    }

    /// Get one credential, owner-scoped
    pub fn get_credential(&self, owner_id: &str, id: Uuid) -> Result<ApiCredential, StoreError> {
        self.credentials
            .read()
            .get(&id)
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .ok_or(StoreError::CredentialNotFound)
    }

    /// Delete a credential. Endpoints referencing it are left pointing at a
    /// dangling id; their next classic delivery records a fetch failure.
    pub fn delete_credential(&self, owner_id: &str, id: Uuid) -> Result<(), StoreError> {
        let mut credentials = self.credentials.write();
        match credentials.get(&id) {
            Some(c) if c.owner_id == owner_id => {
                credentials.remove(&id);
                Ok(())
            }
            _ => Err(StoreError::CredentialNotFound),
        }
    }

    // ------------------------------------------------------------------
    // Logs
    // ------------------------------------------------------------------

    /// Append a log record
    pub fn insert_log(&self, log: WebhookLog) {
        self.logs.write().insert(log.id, log);
    }

    /// Get one log, owner-scoped
    pub fn get_log(&self, owner_id: &str, id: Uuid) -> Result<WebhookLog, StoreError> {
        self.logs
            .read()
            .get(&id)
            .filter(|l| l.owner_id == owner_id)
            .cloned()
            .ok_or(StoreError::LogNotFound)
    }

    /// Delete one log, owner-scoped
    pub fn delete_log(&self, owner_id: &str, id: Uuid) -> Result<(), StoreError> {
        let mut logs = self.logs.write();
        match logs.get(&id) {
            Some(l) if l.owner_id == owner_id => {
                logs.remove(&id);
                Ok(())
            }
            _ => Err(StoreError::LogNotFound),
        }
    }

    /// Record a forwarding outcome against a log, once.
    ///
    /// Runs after the handler already responded, so there is nobody to
    /// report an error to: a missing log or an already-recorded outcome is
    /// traced and dropped.
    pub fn apply_forwarding_result(&self, log_id: Uuid, url: &str, result: &ForwardingResult) {
        let mut logs = self.logs.write();
        match logs.get_mut(&log_id) {
            Some(log) => {
                if !log.apply_forwarding(url, result, Utc::now()) {
                    warn!(log_id = %log_id, "Forwarding outcome already recorded, ignoring");
                }
            }
            None => {
                warn!(log_id = %log_id, "Forwarding write-back for unknown log, ignoring");
            }
        }
    }

    /// Query an owner's logs with conjunctive filters, newest first
    pub fn query_logs(&self, owner_id: &str, query: &LogQuery) -> LogPage {
        let logs = self.logs.read();
        let mut matched: Vec<WebhookLog> = logs
            .values()
            .filter(|log| log.owner_id == owner_id)
            .filter(|log| query.endpoint_id.map_or(true, |id| log.endpoint_id == id))
            .filter(|log| {
                query
                    .status
                    .as_deref()
                    .map_or(true, |s| log.status.as_str() == s)
            })
            .filter(|log| {
                query.resource_type.as_deref().map_or(true, |t| {
                    log.resource_type.is_some_and(|r| r.as_str() == t)
                })
            })
            .filter(|log| {
                query
                    .event_type
                    .as_deref()
                    .map_or(true, |t| log.event_type.as_deref() == Some(t))
            })
            .filter(|log| query.from_date.map_or(true, |from| log.received_at >= from))
            .filter(|log| query.to_date.map_or(true, |to| log.received_at <= to))
            .filter(|log| matches_search(log, query.search.as_deref()))
            .cloned()
            .collect();
        drop(logs);

        matched.sort_by(|a, b| b.received_at.cmp(&a.received_at));

        let total = matched.len();
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let page = query.page.unwrap_or(1).max(1);
        let pages = total.div_ceil(limit as usize) as u32;
        let start = (page as usize - 1).saturating_mul(limit as usize);

        let logs = matched
            .into_iter()
            .skip(start)
            .take(limit as usize)
            .collect();

        LogPage {
            logs,
            pagination: Pagination {
                page,
                limit,
                total,
                pages,
            },
        }
    }

    /// Entity counts for the status endpoint
    pub fn counts(&self) -> StoreCounts {
        StoreCounts {
            endpoints: self.endpoints.read().len(),
            credentials: self.credentials.read().len(),
            logs: self.logs.read().len(),
        }
    }
}
