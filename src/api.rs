//! REST backend client for the disaster-management platform.
//!
//! All conversation terminal actions and single-shot commands go through the
//! [`Backend`] trait so tests can substitute an in-memory fake. [`ApiClient`]
//! is the production implementation over `reqwest`.

use crate::gateway::GeoPoint;
use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Per-request timeout. The backend is expected to answer quickly; a hung
/// call must not block the user's conversation forever.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// Failure classes the conversation handlers react to differently:
/// 401 evicts the cached session, other HTTP failures are definitive and
/// carry the backend's own message, transport errors are transient.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not authorized")]
    Unauthorized,
    #[error("{0}")]
    Backend(String),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Pull a human-readable message out of an error body, falling back to the
/// HTTP status when the body is empty or not the expected JSON shape.
fn backend_message(raw: &str, status: StatusCode) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        #[serde(default, alias = "error")]
        message: Option<String>,
    }

    serde_json::from_str::<ErrorBody>(raw)
        .ok()
        .and_then(|b| b.message)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| format!("request failed with HTTP {status}"))
}

/// Map a response to `Ok(resp)` on 2xx, or the matching [`ApiError`].
async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = resp.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(ApiError::Unauthorized);
    }
    if !status.is_success() {
        let raw = resp.text().await.unwrap_or_default();
        return Err(ApiError::Backend(backend_message(&raw, status)));
    }
    Ok(resp)
}

// ---------------------------------------------------------------------------
// Request / response models
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginOk {
    #[serde(alias = "token", alias = "accessToken")]
    pub access_token: String,
    #[serde(default)]
    pub user: Option<UserInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DashboardSummary {
    #[serde(default, alias = "totalReports")]
    pub total_reports: Option<u64>,
    #[serde(default, alias = "activeReports")]
    pub active_reports: Option<u64>,
    #[serde(default, alias = "pendingReports")]
    pub pending_reports: Option<u64>,
    #[serde(default, alias = "archivedReports")]
    pub archived_reports: Option<u64>,
}

/// Fields collected by the emergency-report flow, in backend wire shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSubmission {
    pub emergency_type: String,
    pub urgency_level: String,
    pub situation: String,
    pub people_count: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Downloaded attachment bytes ready for multipart submission.
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub filename: String,
}

/// A disaster record as the backend returns it. Every field is optional at
/// the parse layer; records come from user submissions and are routinely
/// incomplete.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DisasterReport {
    #[serde(default, rename = "$id")]
    pub id: Option<String>,
    #[serde(default)]
    pub emergency_type: Option<String>,
    #[serde(default)]
    pub urgency_level: Option<String>,
    #[serde(default)]
    pub situation: Option<String>,
    #[serde(default, alias = "peopleCount")]
    pub people_count: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    /// Submission time in epoch seconds.
    #[serde(default)]
    pub submitted_time: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

impl DisasterReport {
    pub fn coordinates(&self) -> Option<GeoPoint> {
        Some(GeoPoint {
            latitude: self.latitude?,
            longitude: self.longitude?,
        })
    }

    pub fn has_status(&self, status: &str) -> bool {
        self.status.as_deref() == Some(status)
    }
}

/// The nearby endpoint answers with either a bare array or a wrapper object.
/// Both shapes normalize to one list at the boundary.
#[derive(Deserialize)]
#[serde(untagged)]
enum NearbyResponse {
    Wrapped { disasters: Vec<DisasterReport> },
    Bare(Vec<DisasterReport>),
}

impl NearbyResponse {
    fn into_reports(self) -> Vec<DisasterReport> {
        match self {
            Self::Wrapped { disasters } => disasters,
            Self::Bare(list) => list,
        }
    }
}

// ---------------------------------------------------------------------------
// Backend trait
// ---------------------------------------------------------------------------

/// The subset of the REST API the bot consumes.
pub trait Backend: Send + Sync {
    fn login(&self, req: &LoginRequest)
    -> impl Future<Output = Result<LoginOk, ApiError>> + Send;

    /// Submit an emergency report. With `image` present the submission is
    /// multipart; otherwise a plain JSON body.
    fn submit_report(
        &self,
        token: &str,
        report: &ReportSubmission,
        image: Option<&MediaUpload>,
    ) -> impl Future<Output = Result<String, ApiError>> + Send;

    /// Download attachment bytes from the gateway's media URL.
    fn fetch_media(&self, url: &str) -> impl Future<Output = Result<MediaUpload, ApiError>> + Send;

    fn nearby(
        &self,
        point: GeoPoint,
    ) -> impl Future<Output = Result<Vec<DisasterReport>, ApiError>> + Send;

    fn profile(&self, token: &str) -> impl Future<Output = Result<UserInfo, ApiError>> + Send;

    fn dashboard(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<DashboardSummary, ApiError>> + Send;
}

// ---------------------------------------------------------------------------
// Production client
// ---------------------------------------------------------------------------

pub struct ApiClient {
    http: HttpClient,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: String) -> Self {
        Self {
            http: HttpClient::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get_authed(&self, path: &str, token: &str) -> Result<reqwest::Response, ApiError> {
        let resp = self
            .http
            .get(self.url(path))
            .bearer_auth(token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        check(resp).await
    }

    /// Government report listing used by triage mode.
    pub async fn gov_reports(&self, token: &str) -> Result<Vec<DisasterReport>, ApiError> {
        let resp = self.get_authed("/gov/reports", token).await?;
        Ok(resp.json::<NearbyResponse>().await?.into_reports())
    }
}

impl Backend for ApiClient {
    async fn login(&self, req: &LoginRequest) -> Result<LoginOk, ApiError> {
        let resp = self
            .http
            .post(self.url("/auth/login"))
            .timeout(REQUEST_TIMEOUT)
            .json(req)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    async fn submit_report(
        &self,
        token: &str,
        report: &ReportSubmission,
        image: Option<&MediaUpload>,
    ) -> Result<String, ApiError> {
        let request = self
            .http
            .post(self.url("/user/emergency/report"))
            .bearer_auth(token)
            .timeout(REQUEST_TIMEOUT);

        let resp = match image {
            Some(media) => {
                let part = reqwest::multipart::Part::bytes(media.bytes.clone())
                    .file_name(media.filename.clone())
                    .mime_str(&media.mime)
                    .map_err(ApiError::Network)?;
                let form = reqwest::multipart::Form::new()
                    .text("emergency_type", report.emergency_type.clone())
                    .text("urgency_level", report.urgency_level.clone())
                    .text("situation", report.situation.clone())
                    .text("people_count", report.people_count.clone())
                    .text("latitude", report.latitude.to_string())
                    .text("longitude", report.longitude.to_string())
                    .part("image", part);
                request.multipart(form).send().await?
            }
            None => request.json(report).send().await?,
        };

        // The acknowledgment is relayed to the user verbatim.
        #[derive(Deserialize)]
        struct Ack {
            #[serde(default)]
            message: Option<String>,
        }
        let resp = check(resp).await?;
        let raw = resp.text().await.unwrap_or_default();
        let ack = serde_json::from_str::<Ack>(&raw)
            .ok()
            .and_then(|a| a.message)
            .unwrap_or_else(|| "Report submitted.".to_string());
        Ok(ack)
    }

    async fn fetch_media(&self, url: &str) -> Result<MediaUpload, ApiError> {
        let resp = self.http.get(url).timeout(REQUEST_TIMEOUT).send().await?;
        let resp = check(resp).await?;
        let mime = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = resp.bytes().await?.to_vec();
        debug!("Fetched media attachment: {} bytes, {mime}", bytes.len());
        Ok(MediaUpload {
            bytes,
            mime,
            filename: "report-photo.jpg".to_string(),
        })
    }

    async fn nearby(&self, point: GeoPoint) -> Result<Vec<DisasterReport>, ApiError> {
        let url = format!(
            "{}/public/nearby?latitude={}&longitude={}",
            self.base_url, point.latitude, point.longitude
        );
        let resp = self.http.get(&url).timeout(REQUEST_TIMEOUT).send().await?;
        let resp = check(resp).await?;
        Ok(resp.json::<NearbyResponse>().await?.into_reports())
    }

    async fn profile(&self, token: &str) -> Result<UserInfo, ApiError> {
        // Older backend deployments only expose the /auth/profile variant.
        match self.get_authed("/private/profile", token).await {
            Ok(resp) => Ok(resp.json().await?),
            Err(ApiError::Unauthorized) => Err(ApiError::Unauthorized),
            Err(e) => {
                debug!("/private/profile failed ({e}), falling back to /auth/profile");
                let resp = self.get_authed("/auth/profile", token).await?;
                Ok(resp.json().await?)
            }
        }
    }

    async fn dashboard(&self, token: &str) -> Result<DashboardSummary, ApiError> {
        let resp = self.get_authed("/user/dashboard", token).await?;
        Ok(resp.json().await?)
    }
}
