//! Batch synchronization of every user known to the main application.

use reqwest::{Client, StatusCode, header};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{SyncError, SyncRequest, UserSyncService};

#[derive(Debug, thiserror::Error)]
pub enum BulkSyncError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("user API returned status {0}")]
    Status(StatusCode),

    #[error("invalid response from user API: {0}")]
    InvalidResponse(String),

    #[error("user API reported failure")]
    Rejected,
}

/// Outcome of one bulk run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Records in the API response.
    pub total: usize,
    /// Records that were created or updated.
    pub synced: usize,
    /// Records skipped for a missing email or a failed sync.
    pub skipped: usize,
}

#[derive(Debug, Deserialize)]
struct UserListResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<Vec<Value>>,
}

/// One entry of the user API's `data` array.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalUserRecord {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    /// Kept as a raw object: an empty one counts as unset.
    #[serde(default)]
    pub primary_company: Option<Map<String, Value>>,
    #[serde(default)]
    pub companies: Option<Vec<CompanyMembership>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompanyRef {
    #[serde(default)]
    pub id: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompanyMembership {
    #[serde(default)]
    pub company: Option<CompanyRef>,
}

impl ExternalUserRecord {
    fn id_string(&self) -> String {
        match &self.id {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }

    /// First word of the name (`User` when empty) and the remaining words
    /// (the id when there are none).
    pub fn split_name(&self) -> (String, String) {
        let name = self.name.as_deref().unwrap_or_default();
        if name.is_empty() {
            return ("User".to_string(), self.id_string());
        }

        let mut parts = name.split(' ');
        let first = parts.next().unwrap_or_default().to_string();
        let rest: Vec<&str> = parts.collect();
        let last = if rest.is_empty() {
            self.id_string()
        } else {
            rest.join(" ")
        };
        (first, last)
    }

    /// The primary company when set and non-empty, otherwise the first
    /// membership.
    pub fn company_id(&self) -> Option<Value> {
        match &self.primary_company {
            Some(primary) if !primary.is_empty() => {
                primary.get("id").filter(|id| !id.is_null()).cloned()
            }
            _ => self
                .companies
                .as_ref()?
                .first()?
                .company
                .as_ref()?
                .id
                .clone(),
        }
    }

    /// `None` when the record has no email.
    pub fn to_sync_request(&self) -> Option<SyncRequest> {
        let email = self.email.as_deref().filter(|e| !e.is_empty())?;
        let (first_name, last_name) = self.split_name();

        Some(SyncRequest {
            email: email.to_string(),
            first_name,
            last_name,
            role: self
                .role
                .clone()
                .unwrap_or_else(|| crate::auth::DEFAULT_ROLE.to_string()),
            company_id: self.company_id(),
        })
    }
}

/// Pulls the main application's user list and syncs each record.
pub struct BulkSyncClient {
    http_client: Client,
    user_sync: UserSyncService,
}

impl BulkSyncClient {
    pub fn new(http_client: Client, user_sync: UserSyncService) -> Self {
        Self {
            http_client,
            user_sync,
        }
    }

    /// Fetch every user from `api_url` and sync them one by one.
    ///
    /// A failed fetch aborts the run before any store write. A failed record
    /// is logged and skipped.
    #[tracing::instrument(skip_all, fields(api_url = %api_url, run_id = %uuid::Uuid::new_v4()))]
    pub async fn sync_all(&self, api_url: &str, api_token: &str) -> Result<SyncReport, BulkSyncError> {
        let records = self.fetch_users(api_url, api_token).await.inspect_err(|e| {
            tracing::error!(error = %e, "Failed to fetch users from the user API");
        })?;

        let mut report = SyncReport {
            total: records.len(),
            ..SyncReport::default()
        };

        for (index, raw) in records.into_iter().enumerate() {
            match self.sync_record(raw).await {
                Ok(()) => report.synced += 1,
                Err(RecordError::Unparsable(e)) => {
                    tracing::warn!(index, error = %e, "Skipping unparsable user record");
                    report.skipped += 1;
                }
                Err(RecordError::Sync(SyncError::MissingEmail)) => {
                    tracing::warn!(index, "Skipping user record without email");
                    report.skipped += 1;
                }
                Err(RecordError::Sync(e)) => {
                    tracing::error!(index, error = %e, "Failed to sync user record");
                    report.skipped += 1;
                }
            }
        }

        tracing::info!(
            total = report.total,
            synced = report.synced,
            skipped = report.skipped,
            "Bulk user sync finished"
        );
        Ok(report)
    }

    async fn fetch_users(&self, api_url: &str, api_token: &str) -> Result<Vec<Value>, BulkSyncError> {
        let response = self
            .http_client
            .get(api_url)
            .bearer_auth(api_token)
            .header(header::CONTENT_TYPE, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BulkSyncError::Status(status));
        }

        let body = response.text().await?;
        let parsed: UserListResponse = serde_json::from_str(&body)
            .map_err(|e| BulkSyncError::InvalidResponse(e.to_string()))?;

        if !parsed.success {
            tracing::debug!(body = %body, "User API response");
            return Err(BulkSyncError::Rejected);
        }

        Ok(parsed.data.unwrap_or_default())
    }

    async fn sync_record(&self, raw: Value) -> Result<(), RecordError> {
        let record: ExternalUserRecord =
            serde_json::from_value(raw).map_err(RecordError::Unparsable)?;
        let request = record
            .to_sync_request()
            .ok_or(RecordError::Sync(SyncError::MissingEmail))?;
        self.user_sync
            .sync(request)
            .await
            .map_err(RecordError::Sync)?;
        Ok(())
    }
}

enum RecordError {
    Unparsable(serde_json::Error),
    Sync(SyncError),
}
