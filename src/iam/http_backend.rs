//! [`InAppBackend`] implementation talking to the OneSignal REST API.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::HeaderMap, StatusCode, Url};
use serde::Serialize;

use crate::{consistency::RywData, Error, Result};

use super::{
    backend::SessionDurationProvider, InAppBackend, InAppMessage, InAppMessageListResponse,
};

/// Default API location.
pub const DEFAULT_BASE_URL: &str = "https://api.onesignal.com/";

const RYW_TOKEN_HEADER: &str = "OneSignal-RYW-Token";
const SESSION_DURATION_HEADER: &str = "OneSignal-Session-Duration";
const RETRY_COUNT_HEADER: &str = "OneSignal-Retry-Count";
const RETRY_LIMIT_HEADER: &str = "OneSignal-Retry-Limit";
const RETRY_AFTER_HEADER: &str = "Retry-After";

/// Wait between retries when the server does not send `Retry-After`.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Android device type, as expected by the reporting endpoints.
const DEVICE_TYPE: u8 = 1;

/// Configuration for [`HttpInAppBackend`].
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    /// API location, e.g. [`DEFAULT_BASE_URL`].
    pub base_url: String,
    /// Number of retries of a fetch answered with 425/429 when the server does not send
    /// `OneSignal-Retry-Limit`.
    pub retry_limit: u32,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        HttpBackendConfig {
            base_url: DEFAULT_BASE_URL.to_owned(),
            retry_limit: 0,
        }
    }
}

/// An HTTP client for the in-app message endpoints.
pub struct HttpInAppBackend {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::Client,
    base_url: Url,
    retry_limit: u32,
}

#[derive(Serialize)]
struct ReportBody<'a> {
    app_id: &'a str,
    player_id: &'a str,
    variant_id: &'a str,
    device_type: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_impression: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    click_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_click: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_id: Option<&'a str>,
}

impl<'a> ReportBody<'a> {
    fn new(app_id: &'a str, subscription_id: &'a str, variant_id: &'a str) -> Self {
        ReportBody {
            app_id,
            player_id: subscription_id,
            variant_id,
            device_type: DEVICE_TYPE,
            first_impression: None,
            click_id: None,
            first_click: None,
            page_id: None,
        }
    }
}

impl HttpInAppBackend {
    #[allow(missing_docs)]
    pub fn new(config: HttpBackendConfig) -> Result<HttpInAppBackend> {
        let mut base_url = config.base_url;
        // Url::join drops the last path segment unless it ends with a slash.
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let base_url = Url::parse(&base_url).map_err(Error::InvalidBaseUrl)?;

        Ok(HttpInAppBackend {
            client: reqwest::Client::new(),
            base_url,
            retry_limit: config.retry_limit,
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).map_err(Error::InvalidBaseUrl)
    }

    async fn request_messages(
        &self,
        url: &Url,
        ryw_token: Option<&str>,
        session_duration: Duration,
        retry_count: Option<u32>,
    ) -> Result<reqwest::Response> {
        let mut request = self
            .client
            .get(url.clone())
            .header(SESSION_DURATION_HEADER, session_duration.as_millis().to_string());
        if let Some(token) = ryw_token {
            request = request.header(RYW_TOKEN_HEADER, token);
        }
        if let Some(retry_count) = retry_count {
            request = request.header(RETRY_COUNT_HEADER, retry_count.to_string());
        }
        Ok(request.send().await?)
    }

    async fn fetch_messages(
        &self,
        app_id: &str,
        subscription_id: &str,
        ryw_data: Option<RywData>,
        session_duration: SessionDurationProvider<'_>,
    ) -> Result<Option<Vec<InAppMessage>>> {
        let url = self.url(&format!("apps/{app_id}/subscriptions/{subscription_id}/iams"))?;
        let ryw_data = ryw_data.unwrap_or_default();
        if let Some(delay) = ryw_data.ryw_delay {
            tokio::time::sleep(delay).await;
        }
        let ryw_token = ryw_data.ryw_token.as_deref();

        let mut attempts = 0;
        let mut retry_limit = self.retry_limit;
        while attempts <= retry_limit {
            let retry_count = (attempts > 0).then_some(attempts);
            let response = self
                .request_messages(&url, ryw_token, session_duration(), retry_count)
                .await?;
            let status = response.status();

            if status.is_success() {
                return parse_messages(response).await.map(Some);
            }

            if status.as_u16() == 425 || status == StatusCode::TOO_MANY_REQUESTS {
                retry_limit = header_u32(response.headers(), RETRY_LIMIT_HEADER).unwrap_or(retry_limit);
                attempts += 1;
                let retry_after = header_u32(response.headers(), RETRY_AFTER_HEADER)
                    .map(|secs| Duration::from_secs(secs.into()))
                    .unwrap_or(DEFAULT_RETRY_AFTER);
                log::debug!(target: "onesignal",
                            status = status.as_u16(),
                            attempts,
                            retry_limit;
                            "in-app message fetch not ready yet");
                if attempts <= retry_limit {
                    tokio::time::sleep(retry_after).await;
                }
                continue;
            }

            log::warn!(target: "onesignal", status = status.as_u16(); "failed to fetch in-app messages");
            return Ok(None);
        }

        // The token never became readable. Fetch without it rather than showing nothing.
        log::debug!(target: "onesignal", attempts; "fetching in-app messages without RYW token");
        let response = self
            .request_messages(&url, None, session_duration(), Some(attempts))
            .await?;
        if !response.status().is_success() {
            log::warn!(target: "onesignal", status = response.status().as_u16(); "failed to fetch in-app messages");
            return Ok(None);
        }
        parse_messages(response).await.map(Some)
    }

    async fn post_report(&self, path: &str, body: &ReportBody<'_>) -> Result<()> {
        let url = self.url(path)?;
        let response = self.client.post(url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            log::warn!(target: "onesignal", status = status.as_u16(), path; "in-app message report rejected");
            return Err(Error::Backend {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

async fn parse_messages(response: reqwest::Response) -> Result<Vec<InAppMessage>> {
    let body = response.bytes().await?;
    let list: InAppMessageListResponse = serde_json::from_slice(&body)?;
    Ok(list.into_messages())
}

fn header_u32(headers: &HeaderMap, name: &str) -> Option<u32> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

#[async_trait]
impl InAppBackend for HttpInAppBackend {
    async fn list_in_app_messages(
        &self,
        app_id: &str,
        subscription_id: &str,
        ryw_data: Option<RywData>,
        session_duration: SessionDurationProvider<'_>,
    ) -> Option<Vec<InAppMessage>> {
        log::debug!(target: "onesignal", subscription_id; "fetching in-app messages");
        match self
            .fetch_messages(app_id, subscription_id, ryw_data, session_duration)
            .await
        {
            Ok(messages) => messages,
            Err(err) => {
                log::warn!(target: "onesignal", subscription_id; "error fetching in-app messages: {:?}", err);
                None
            }
        }
    }

    async fn send_impression(
        &self,
        app_id: &str,
        subscription_id: &str,
        variant_id: &str,
        message_id: &str,
    ) -> Result<()> {
        let body = ReportBody {
            first_impression: Some(true),
            ..ReportBody::new(app_id, subscription_id, variant_id)
        };
        self.post_report(&format!("in_app_messages/{message_id}/impression"), &body)
            .await
    }

    async fn send_click(
        &self,
        app_id: &str,
        subscription_id: &str,
        variant_id: &str,
        message_id: &str,
        click_id: Option<&str>,
        is_first_click: bool,
    ) -> Result<()> {
        let body = ReportBody {
            click_id,
            first_click: Some(is_first_click),
            ..ReportBody::new(app_id, subscription_id, variant_id)
        };
        self.post_report(&format!("in_app_messages/{message_id}/click"), &body)
            .await
    }

    async fn send_page_impression(
        &self,
        app_id: &str,
        subscription_id: &str,
        variant_id: &str,
        message_id: &str,
        page_id: &str,
    ) -> Result<()> {
        let body = ReportBody {
            page_id: Some(page_id),
            ..ReportBody::new(app_id, subscription_id, variant_id)
        };
        self.post_report(&format!("in_app_messages/{message_id}/pageImpression"), &body)
            .await
    }
}
