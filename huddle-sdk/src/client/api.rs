//! REST client (mobile app → Huddle server).
//!
//! Every request carries the `Huddle-Session` header with the caller's
//! session token.

use reqwest::Client;
use url::Url;
use uuid::Uuid;

use super::ClientError;
use crate::objects::{
    ActivityResponse, ApiErrorBody, CreateActivityRequest, Decision, DiscoveredActivity,
    EngagementHints, HistoryCursor, HistoryResponse, JoinRequestResponse, MessageResponse,
    RequestToJoinBody, ResolveRequestBody, SendMessageRequest, Tier, TierResponse,
    TypingRequest, UpgradeTierRequest, UsageResponse,
};
use crate::signature::SESSION_HEADER;

/// Typed HTTP client for the Huddle REST API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl ApiClient {
    /// * `base_url` – root URL of the Huddle server.
    /// * `token` – session token issued for the calling user.
    pub fn new(base_url: Url, token: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url,
            token: token.into(),
        }
    }

    /// Replace the default `reqwest::Client` with a custom one.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// Swap the session token, e.g. after a refresh.
    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = token.into();
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.base_url.join(path)?)
    }

    /// `POST /api/v1/activities`
    pub async fn create_activity(
        &self,
        request: &CreateActivityRequest,
    ) -> Result<ActivityResponse, ClientError> {
        let resp = self
            .http
            .post(self.url("/api/v1/activities")?)
            .header(SESSION_HEADER, &self.token)
            .json(request)
            .send()
            .await?;
        parse_response(resp).await
    }

    /// `GET /api/v1/activities?lat&lng&radius_km`
    pub async fn discover(
        &self,
        lat: f64,
        lng: f64,
        radius_km: f64,
    ) -> Result<Vec<DiscoveredActivity>, ClientError> {
        let resp = self
            .http
            .get(self.url("/api/v1/activities")?)
            .header(SESSION_HEADER, &self.token)
            .query(&[("lat", lat), ("lng", lng), ("radius_km", radius_km)])
            .send()
            .await?;
        parse_response(resp).await
    }

    /// `GET /api/v1/activities/{id}`
    pub async fn get_activity(&self, event_id: Uuid) -> Result<ActivityResponse, ClientError> {
        let resp = self
            .http
            .get(self.url(&format!("/api/v1/activities/{event_id}"))?)
            .header(SESSION_HEADER, &self.token)
            .send()
            .await?;
        parse_response(resp).await
    }

    /// `POST /api/v1/activities/{id}/requests`
    pub async fn request_to_join(
        &self,
        event_id: Uuid,
        user_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<JoinRequestResponse, ClientError> {
        let body = RequestToJoinBody {
            user_name: user_name.into(),
            message: message.into(),
        };
        let resp = self
            .http
            .post(self.url(&format!("/api/v1/activities/{event_id}/requests"))?)
            .header(SESSION_HEADER, &self.token)
            .json(&body)
            .send()
            .await?;
        parse_response(resp).await
    }

    /// `GET /api/v1/activities/{id}/requests` (creator only)
    pub async fn pending_requests(
        &self,
        event_id: Uuid,
    ) -> Result<Vec<JoinRequestResponse>, ClientError> {
        let resp = self
            .http
            .get(self.url(&format!("/api/v1/activities/{event_id}/requests"))?)
            .header(SESSION_HEADER, &self.token)
            .send()
            .await?;
        parse_response(resp).await
    }

    /// `POST /api/v1/requests/{id}/resolve`
    pub async fn resolve_request(
        &self,
        request_id: Uuid,
        decision: Decision,
    ) -> Result<JoinRequestResponse, ClientError> {
        let resp = self
            .http
            .post(self.url(&format!("/api/v1/requests/{request_id}/resolve"))?)
            .header(SESSION_HEADER, &self.token)
            .json(&ResolveRequestBody { decision })
            .send()
            .await?;
        parse_response(resp).await
    }

    /// `POST /api/v1/activities/{id}/messages`
    pub async fn send_message(
        &self,
        event_id: Uuid,
        text: impl Into<String>,
    ) -> Result<MessageResponse, ClientError> {
        let resp = self
            .http
            .post(self.url(&format!("/api/v1/activities/{event_id}/messages"))?)
            .header(SESSION_HEADER, &self.token)
            .json(&SendMessageRequest { text: text.into() })
            .send()
            .await?;
        parse_response(resp).await
    }

    /// `GET /api/v1/activities/{id}/messages?cursor&page_size`
    pub async fn history(
        &self,
        event_id: Uuid,
        cursor: HistoryCursor,
        page_size: u32,
    ) -> Result<HistoryResponse, ClientError> {
        let resp = self
            .http
            .get(self.url(&format!("/api/v1/activities/{event_id}/messages"))?)
            .header(SESSION_HEADER, &self.token)
            .query(&[
                ("cursor", cursor.to_query_value()),
                ("page_size", page_size.to_string()),
            ])
            .send()
            .await?;
        parse_response(resp).await
    }

    /// `POST /api/v1/activities/{id}/typing`
    ///
    /// REST fallback for clients without a live WebSocket.
    pub async fn typing(&self, event_id: Uuid, is_typing: bool) -> Result<(), ClientError> {
        let resp = self
            .http
            .post(self.url(&format!("/api/v1/activities/{event_id}/typing"))?)
            .header(SESSION_HEADER, &self.token)
            .json(&TypingRequest { is_typing })
            .send()
            .await?;
        expect_empty(resp).await
    }

    /// `POST /api/v1/activities/{id}/read`
    pub async fn mark_read(&self, event_id: Uuid) -> Result<(), ClientError> {
        let resp = self
            .http
            .post(self.url(&format!("/api/v1/activities/{event_id}/read"))?)
            .header(SESSION_HEADER, &self.token)
            .send()
            .await?;
        expect_empty(resp).await
    }

    /// `GET /api/v1/me/usage`
    pub async fn usage(&self) -> Result<UsageResponse, ClientError> {
        let resp = self
            .http
            .get(self.url("/api/v1/me/usage")?)
            .header(SESSION_HEADER, &self.token)
            .send()
            .await?;
        parse_response(resp).await
    }

    /// `POST /api/v1/me/tier`
    pub async fn change_tier(&self, tier: Tier) -> Result<UsageResponse, ClientError> {
        let resp = self
            .http
            .post(self.url("/api/v1/me/tier")?)
            .header(SESSION_HEADER, &self.token)
            .json(&UpgradeTierRequest { tier })
            .send()
            .await?;
        parse_response(resp).await
    }

    /// `GET /api/v1/me/hints`
    pub async fn hints(&self) -> Result<EngagementHints, ClientError> {
        let resp = self
            .http
            .get(self.url("/api/v1/me/hints")?)
            .header(SESSION_HEADER, &self.token)
            .send()
            .await?;
        parse_response(resp).await
    }

    /// `GET /api/v1/tiers`
    pub async fn tiers(&self) -> Result<Vec<TierResponse>, ClientError> {
        let resp = self
            .http
            .get(self.url("/api/v1/tiers")?)
            .header(SESSION_HEADER, &self.token)
            .send()
            .await?;
        parse_response(resp).await
    }
}

async fn api_error(resp: reqwest::Response) -> ClientError {
    let status = resp.status();
    let raw = resp.text().await.unwrap_or_default();
    let body = serde_json::from_str::<ApiErrorBody>(&raw).ok();
    ClientError::Api { status, body, raw }
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, ClientError> {
    if !resp.status().is_success() {
        return Err(api_error(resp).await);
    }
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(ClientError::Json)
}

async fn expect_empty(resp: reqwest::Response) -> Result<(), ClientError> {
    if !resp.status().is_success() {
        return Err(api_error(resp).await);
    }
    Ok(())
}
