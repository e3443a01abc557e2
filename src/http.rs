use crate::error::{Error, Result};
use reqwest::{Client, StatusCode, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Shared HTTP handle for search providers and model backends.
///
/// Cloning is cheap and shares reqwest's connection pool. Requests are
/// single-shot: retries and per-call deadlines belong to
/// [`crate::retry::RetryPolicy`], so a failed attempt surfaces here as a
/// classified [`Error`].
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(user_agent: &str) -> Result<Self> {
        Self::with_timeout(user_agent, Duration::from_secs(180))
    }

    pub fn with_timeout(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| Error::http(e.to_string()))?;

        Ok(Self { client, timeout })
    }

    pub async fn get_text(&self, url: &str) -> Result<String> {
        self.send(self.client.get(url)).await
    }

    pub async fn get_json_with_query<T, Q>(&self, url: &str, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let body = self.send(self.client.get(url).query(query)).await?;
        serde_json::from_str(&body).map_err(|e| Error::parse(format!("JSON parse: {e}")))
    }

    /// POST a form and return the success status with the body, for
    /// endpoints that signal throttling through a 2xx status.
    pub async fn post_form_page<F: Serialize + ?Sized>(
        &self,
        url: &str,
        form: &F,
        headers: &[(&str, &str)],
    ) -> Result<(StatusCode, String)> {
        let mut req = self.client.post(url).form(form);
        for (k, v) in headers {
            req = req.header(*k, *v);
        }
        self.send_page(req).await
    }

    pub async fn post_json_raw(
        &self,
        url: &str,
        body: &str,
        headers: &[(&str, &str)],
    ) -> Result<String> {
        let mut req = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.to_string());
        for (k, v) in headers {
            req = req.header(*k, *v);
        }
        self.send(req).await
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<String> {
        self.send_page(req).await.map(|(_, body)| body)
    }

    async fn send_page(&self, req: reqwest::RequestBuilder) -> Result<(StatusCode, String)> {
        match req.send().await {
            Ok(resp) => self.handle_response(resp).await,
            Err(e) if e.is_timeout() => {
                let target = e
                    .url()
                    .map(|u| extract_domain(u.as_str()))
                    .unwrap_or_else(|| "request".into());
                debug!(target = %target, "request timed out");
                Err(Error::timeout(target, self.timeout))
            }
            Err(e) => Err(Error::http(e.to_string())),
        }
    }

    async fn handle_response(&self, resp: reqwest::Response) -> Result<(StatusCode, String)> {
        let status = resp.status();
        let url = resp.url().to_string();

        match status {
            StatusCode::OK | StatusCode::CREATED | StatusCode::ACCEPTED => {
                let body = resp.text().await.map_err(|e| Error::http(e.to_string()))?;
                Ok((status, body))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = resp
                    .headers()
                    .get(header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok());
                Err(Error::RateLimit {
                    platform: extract_domain(&url),
                    retry_after_secs: retry_after,
                })
            }
            _ => {
                let body = resp.text().await.unwrap_or_default();
                Err(Error::api_with_status(
                    extract_domain(&url),
                    body,
                    status.as_u16(),
                ))
            }
        }
    }
}

pub(crate) fn extract_domain(url: &str) -> String {
    url.split("//")
        .nth(1)
        .and_then(|s| s.split('/').next())
        .unwrap_or("unknown")
        .to_string()
}
