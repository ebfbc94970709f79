use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpClientError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Service tidak tersedia: {0}")]
    ServiceUnavailable(String),

    #[error("Data tidak ditemukan: {0}")]
    NotFound(String),

    #[error("Response parsing error: {0}")]
    ParseError(String),
}

// Client untuk memanggil service eksternal (geocoding, notification)
#[derive(Clone)]
pub struct ServiceClient {
    client: Client,
    base_url: String,
}

impl ServiceClient {
    // Buat client untuk base URL tertentu
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, HttpClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HttpClientError::ServiceUnavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // GET request dengan query string
    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<T, HttpClientError> {
        let url = format!("{}{}", self.base_url, endpoint);

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(map_send_error)?;

        self.handle_response(response).await
    }

    // POST request tanpa response body yang dibutuhkan
    pub async fn post_json<B: serde::Serialize>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<(), HttpClientError> {
        let url = format!("{}{}", self.base_url, endpoint);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(map_send_error)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(HttpClientError::RequestFailed(format!(
                "Status: {}",
                response.status()
            )))
        }
    }

    // Handle response dan parse JSON
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: Response,
    ) -> Result<T, HttpClientError> {
        let status = response.status();

        match status {
            StatusCode::OK | StatusCode::CREATED => response
                .json::<T>()
                .await
                .map_err(|e| HttpClientError::ParseError(e.to_string())),
            StatusCode::NOT_FOUND => Err(HttpClientError::NotFound(
                response.url().path().to_string(),
            )),
            s if s.is_server_error() => Err(HttpClientError::ServiceUnavailable(format!(
                "Status: {}",
                s
            ))),
            _ => {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                Err(HttpClientError::RequestFailed(error_text))
            }
        }
    }
}

fn map_send_error(err: reqwest::Error) -> HttpClientError {
    if err.is_timeout() || err.is_connect() {
        HttpClientError::ServiceUnavailable(err.to_string())
    } else {
        HttpClientError::RequestFailed(err.to_string())
    }
}
