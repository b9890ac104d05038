use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::engine::batch::{ActionError, PermanentReason};
use crate::engine::message::RawMessage;
use crate::error::AppError;

use super::messages;
use super::models::{MessagePage, TRASH_ADD_LABELS, TRASH_REMOVE_LABELS, UNREAD_LABEL};

const GMAIL_API_BASE_URL: &str = "https://gmail.googleapis.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ApiErrorKind {
    RateLimited,
    Server,
    Network,
    NotFound,
    Unauthorized,
    Forbidden,
    Rejected,
    Decode,
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RateLimited => "rate limited",
            Self::Server => "server error",
            Self::Network => "network error",
            Self::NotFound => "not found",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::Rejected => "rejected",
            Self::Decode => "unexpected response",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Error)]
#[error("gmail api {kind}: {message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
}

impl ApiError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            ApiErrorKind::RateLimited | ApiErrorKind::Server | ApiErrorKind::Network
        )
    }

    pub fn is_auth(&self) -> bool {
        matches!(self.kind, ApiErrorKind::Unauthorized | ApiErrorKind::Forbidden)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_decode() {
            ApiErrorKind::Decode
        } else {
            ApiErrorKind::Network
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

impl From<ApiError> for AppError {
    fn from(err: ApiError) -> Self {
        if err.is_auth() {
            return AppError::Auth(format!(
                "{err}. sign in again and refresh the access token"
            ));
        }
        AppError::Api(err.to_string())
    }
}

impl From<ApiError> for ActionError {
    fn from(err: ApiError) -> Self {
        match err.kind {
            ApiErrorKind::RateLimited | ApiErrorKind::Server | ApiErrorKind::Network => {
                ActionError::Transient(err.to_string())
            }
            ApiErrorKind::NotFound => ActionError::Permanent(PermanentReason::NotFound),
            ApiErrorKind::Unauthorized | ApiErrorKind::Forbidden => {
                ActionError::Permanent(PermanentReason::PermissionDenied(err.message))
            }
            ApiErrorKind::Rejected | ApiErrorKind::Decode => {
                ActionError::Permanent(PermanentReason::Rejected(err.message))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct GmailClient {
    http: Client,
    base_url: String,
}

impl GmailClient {
    pub fn new() -> Self {
        Self::with_base_url(GMAIL_API_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
        }
    }

    pub async fn list_page(
        &self,
        access_token: &str,
        page_size: usize,
        query: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<MessagePage, ApiError> {
        let params = messages::list_query(page_size, query, page_token);
        let resource: GmailMessageListResource = self
            .get_json(messages::list_endpoint(), access_token, &params)
            .await?;

        Ok(MessagePage {
            ids: resource
                .messages
                .unwrap_or_default()
                .into_iter()
                .map(|entry| entry.id)
                .collect(),
            next_page_token: resource.next_page_token.filter(|token| !token.is_empty()),
        })
    }

    pub async fn get_metadata(&self, id: &str, access_token: &str) -> Result<RawMessage, ApiError> {
        let endpoint = messages::message_endpoint(id);
        let resource: GmailMessageResource = self
            .get_json(&endpoint, access_token, &messages::metadata_query())
            .await?;
        Ok(resource.into_raw())
    }

    /// Moves messages to trash by label. Reversible from the Trash folder.
    pub async fn batch_trash(&self, ids: &[String], access_token: &str) -> Result<(), ApiError> {
        let body = GmailBatchModifyRequest {
            ids: ids.to_vec(),
            add_label_ids: TRASH_ADD_LABELS.iter().map(|l| l.to_string()).collect(),
            remove_label_ids: TRASH_REMOVE_LABELS.iter().map(|l| l.to_string()).collect(),
        };

        let url = self.endpoint_url(messages::batch_modify_endpoint())?;
        let response = self
            .http
            .post(url)
            .bearer_auth(access_token)
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(map_api_error(status, &body))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        access_token: &str,
        query: &[(String, String)],
    ) -> Result<T, ApiError> {
        let url = self.endpoint_url(endpoint)?;
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .timeout(REQUEST_TIMEOUT)
            .query(query)
            .send()
            .await?;

        self.parse_json_response(response).await
    }

    fn endpoint_url(&self, endpoint: &str) -> Result<Url, ApiError> {
        let mut url = Url::parse(&self.base_url).map_err(|err| ApiError {
            kind: ApiErrorKind::Rejected,
            message: format!("invalid base url `{}`: {err}", self.base_url),
        })?;
        url.set_path(endpoint.trim_start_matches('/'));
        Ok(url)
    }

    async fn parse_json_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.text().await.unwrap_or_default();
        Err(map_api_error(status, &body))
    }
}

impl Default for GmailClient {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct GmailMessageResource {
    id: String,
    #[serde(rename = "labelIds", default)]
    label_ids: Vec<String>,
    snippet: Option<String>,
    #[serde(rename = "internalDate")]
    internal_date: Option<String>,
    #[serde(rename = "sizeEstimate")]
    size_estimate: Option<i64>,
    payload: Option<GmailMessagePayload>,
}

impl GmailMessageResource {
    fn into_raw(self) -> RawMessage {
        let headers = self
            .payload
            .and_then(|payload| payload.headers)
            .unwrap_or_default();

        let received_at = self
            .internal_date
            .as_deref()
            .and_then(parse_internal_date)
            .or_else(|| header_value(&headers, "Date").and_then(|date| parse_date_header(&date)));
        let is_read = !self
            .label_ids
            .iter()
            .any(|label| label.eq_ignore_ascii_case(UNREAD_LABEL));

        RawMessage {
            id: self.id,
            from: header_value(&headers, "From"),
            subject: header_value(&headers, "Subject"),
            snippet: self.snippet,
            received_at,
            is_read,
            labels: self.label_ids,
            size_estimate: self.size_estimate,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GmailMessagePayload {
    headers: Option<Vec<GmailMessageHeader>>,
}

#[derive(Debug, Deserialize)]
struct GmailMessageListResource {
    messages: Option<Vec<GmailMessageListEntry>>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GmailMessageListEntry {
    id: String,
}

#[derive(Debug, Serialize)]
struct GmailBatchModifyRequest {
    ids: Vec<String>,
    #[serde(rename = "addLabelIds")]
    add_label_ids: Vec<String>,
    #[serde(rename = "removeLabelIds")]
    remove_label_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GmailMessageHeader {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct GmailApiErrorEnvelope {
    error: GmailApiError,
}

#[derive(Debug, Deserialize)]
struct GmailApiError {
    code: Option<u16>,
    status: Option<String>,
    message: Option<String>,
    errors: Option<Vec<GmailApiErrorDetail>>,
}

#[derive(Debug, Deserialize)]
struct GmailApiErrorDetail {
    reason: Option<String>,
}

fn header_value(headers: &[GmailMessageHeader], target: &str) -> Option<String> {
    headers
        .iter()
        .find(|header| header.name.eq_ignore_ascii_case(target))
        .map(|header| header.value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_internal_date(raw: &str) -> Option<DateTime<Utc>> {
    let millis = raw.trim().parse::<i64>().ok()?;
    DateTime::from_timestamp_millis(millis)
}

/// RFC 2822 `Date` header, tolerating a trailing `(UTC)`-style comment.
fn parse_date_header(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    let without_comment = raw
        .rfind(" (")
        .filter(|_| raw.ends_with(')'))
        .map_or(raw, |start| &raw[..start]);

    DateTime::parse_from_rfc2822(without_comment)
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

fn map_api_error(status: StatusCode, body: &str) -> ApiError {
    let envelope = serde_json::from_str::<GmailApiErrorEnvelope>(body).ok();
    let reason = envelope.as_ref().and_then(|envelope| {
        envelope
            .error
            .errors
            .as_ref()
            .and_then(|errors| errors.iter().find_map(|detail| detail.reason.clone()))
    });
    let message = envelope
        .and_then(describe_api_error)
        .unwrap_or_else(|| {
            let body = body.trim();
            if body.is_empty() {
                "no error details in response body".to_string()
            } else {
                body.to_string()
            }
        });

    let rate_limited_reason = reason
        .as_deref()
        .is_some_and(|reason| reason.ends_with("ateLimitExceeded"));

    let kind = match status {
        StatusCode::TOO_MANY_REQUESTS => ApiErrorKind::RateLimited,
        StatusCode::FORBIDDEN if rate_limited_reason => ApiErrorKind::RateLimited,
        StatusCode::UNAUTHORIZED => ApiErrorKind::Unauthorized,
        StatusCode::FORBIDDEN => ApiErrorKind::Forbidden,
        StatusCode::NOT_FOUND => ApiErrorKind::NotFound,
        StatusCode::REQUEST_TIMEOUT => ApiErrorKind::Network,
        status if status.is_server_error() => ApiErrorKind::Server,
        _ => ApiErrorKind::Rejected,
    };

    ApiError {
        kind,
        message: format!("({status}) {message}"),
    }
}

fn describe_api_error(envelope: GmailApiErrorEnvelope) -> Option<String> {
    let mut parts = Vec::new();

    if let Some(message) = envelope.error.message {
        parts.push(message);
    }

    if let Some(status) = envelope.error.status {
        parts.push(format!("status={status}"));
    }

    if let Some(code) = envelope.error.code {
        parts.push(format!("code={code}"));
    }

    if let Some(reason) = envelope
        .error
        .errors
        .and_then(|errors| errors.into_iter().find_map(|detail| detail.reason))
    {
        parts.push(format!("reason={reason}"));
    }

    if parts.is_empty() {
        return None;
    }

    Some(parts.join(", "))
}
