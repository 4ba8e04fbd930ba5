use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::error::MirrorError;

const PAGE_RETRIES: usize = 3;

/// Access to the remote site. Every non-success outcome is reported as
/// [`MirrorError::Http`] or [`MirrorError::HttpStatus`].
pub trait SiteClient: Send + Sync {
    fn fetch_text(&self, url: &str) -> Result<String, MirrorError>;

    /// Item payloads. Implementations make a single attempt; retrying is left
    /// to the caller's [`RetryPolicy`](crate::download::RetryPolicy).
    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, MirrorError>;

    /// Whether `url` currently answers with a success status.
    fn probe(&self, url: &str) -> bool {
        self.fetch_bytes(url).is_ok()
    }
}

#[derive(Clone)]
pub struct HttpSiteClient {
    client: Client,
}

impl HttpSiteClient {
    pub fn new(timeout: Duration) -> Result<Self, MirrorError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("smirror/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| MirrorError::Http {
                    url: String::new(),
                    message: err.to_string(),
                })?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| MirrorError::Http {
                url: String::new(),
                message: err.to_string(),
            })?;
        Ok(Self { client })
    }

    fn get(
        &self,
        url: &str,
        max_retries: usize,
    ) -> Result<reqwest::blocking::Response, MirrorError> {
        let response = self.send_with_retries(url, max_retries, || self.client.get(url))?;
        Self::handle_status(url, response)
    }

    fn handle_status(
        url: &str,
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, MirrorError> {
        if response.status().is_success() {
            return Ok(response);
        }
        Err(MirrorError::HttpStatus {
            url: url.to_string(),
            status: response.status().as_u16(),
        })
    }

    fn send_with_retries<F>(
        &self,
        url: &str,
        max_retries: usize,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, MirrorError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < max_retries && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < max_retries && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(MirrorError::Http {
                        url: url.to_string(),
                        message: err.to_string(),
                    });
                }
            }
        }
    }
}

impl SiteClient for HttpSiteClient {
    fn fetch_text(&self, url: &str) -> Result<String, MirrorError> {
        self.get(url, PAGE_RETRIES)?.text().map_err(|err| MirrorError::Http {
            url: url.to_string(),
            message: err.to_string(),
        })
    }

    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, MirrorError> {
        let bytes = self.get(url, 0)?.bytes().map_err(|err| MirrorError::Http {
            url: url.to_string(),
            message: err.to_string(),
        })?;
        Ok(bytes.to_vec())
    }

    fn probe(&self, url: &str) -> bool {
        self.client
            .head(url)
            .send()
            .map(|resp| resp.status().is_success())
            .unwrap_or(false)
            || self.get(url, 0).is_ok()
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
