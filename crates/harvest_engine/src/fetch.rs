use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_DISPOSITION, CONTENT_LENGTH,
    CONTENT_TYPE,
};
use reqwest::Response;

use crate::decode::decode_html;
use crate::{FailureKind, FetchError, FetchMetadata, FetchOutput, ProbeOutput};

/// Per-call-site network limits. Chapter scraping and image probing use
/// different timeouts, so each gets its own fetcher.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub redirect_limit: usize,
    pub max_bytes: u64,
    pub accept: String,
    pub accept_language: String,
}

impl FetchSettings {
    /// Chapter list and chapter content pages.
    pub fn text() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(5),
            redirect_limit: 5,
            max_bytes: 16 * 1024 * 1024,
            accept: "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string(),
            accept_language: "zh-CN,zh;q=0.9,en;q=0.8".to_string(),
        }
    }

    /// HEAD probes and linked pages in the image collector.
    pub fn probe() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            ..Self::text()
        }
    }
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self::text()
    }
}

#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    /// Full GET of `url`.
    async fn get(&self, url: &str) -> Result<FetchOutput, FetchError>;

    /// HEAD request: headers only, no body.
    async fn head(&self, url: &str) -> Result<ProbeOutput, FetchError>;
}

/// GET `url` and decode it to a string, honoring a forced charset label.
pub async fn fetch_html(
    fetcher: &dyn PageFetcher,
    url: &str,
    forced_encoding: Option<&str>,
) -> Result<String, FetchError> {
    let output = fetcher.get(url).await?;
    if let Some(content_type) = output.metadata.content_type.as_deref() {
        if is_binary_type(content_type) {
            return Err(FetchError::new(
                FailureKind::UnsupportedContentType {
                    content_type: content_type.to_string(),
                },
                format!("{url} is not a page"),
            ));
        }
    }
    let decoded = decode_html(
        &output.body,
        output.metadata.content_type.as_deref(),
        forced_encoding,
    )
    .map_err(|err| FetchError::new(FailureKind::Decode, err.to_string()))?;
    Ok(decoded.html)
}

fn is_binary_type(content_type: &str) -> bool {
    let mime = content_type.trim_start().to_ascii_lowercase();
    ["image/", "audio/", "video/", "font/"]
        .iter()
        .any(|prefix| mime.starts_with(prefix))
}

#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
    settings: FetchSettings,
}

impl ReqwestFetcher {
    pub fn new(settings: FetchSettings) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&settings.accept) {
            headers.insert(ACCEPT, value);
        }
        if let Ok(value) = HeaderValue::from_str(&settings.accept_language) {
            headers.insert(ACCEPT_LANGUAGE, value);
        }

        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(settings.redirect_limit))
            .default_headers(headers)
            .build()
            .map_err(|err| FetchError::new(FailureKind::Network, err.to_string()))?;

        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    fn check_declared_length(&self, response: &Response) -> Result<(), FetchError> {
        match declared_length(response) {
            Some(len) if len > self.settings.max_bytes => Err(too_large(self.settings.max_bytes, len)),
            _ => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl PageFetcher for ReqwestFetcher {
    async fn get(&self, url: &str) -> Result<FetchOutput, FetchError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = ensure_success(response)?;
        self.check_declared_length(&response)?;

        let final_url = response.url().to_string();
        let content_type = header_string(&response, CONTENT_TYPE);
        let content_disposition = header_string(&response, CONTENT_DISPOSITION);

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = body.len() as u64 + chunk.len() as u64;
            if next_len > self.settings.max_bytes {
                return Err(too_large(self.settings.max_bytes, next_len));
            }
            body.extend_from_slice(&chunk);
        }

        let metadata = FetchMetadata {
            original_url: url.to_string(),
            final_url,
            content_type,
            content_disposition,
            byte_len: body.len() as u64,
        };

        Ok(FetchOutput {
            body: body.into(),
            metadata,
        })
    }

    async fn head(&self, url: &str) -> Result<ProbeOutput, FetchError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;

        let response = self
            .client
            .head(parsed)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = ensure_success(response)?;

        Ok(ProbeOutput {
            final_url: response.url().to_string(),
            content_type: header_string(&response, CONTENT_TYPE),
            content_length: declared_length(&response),
        })
    }
}

fn ensure_success(response: Response) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(FetchError::new(
            FailureKind::HttpStatus(status.as_u16()),
            status.to_string(),
        ))
    }
}

fn header_string(response: &Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

// Read the header directly: for HEAD responses the body is empty, so the
// body size hint would always report zero.
fn declared_length(response: &Response) -> Option<u64> {
    header_string(response, CONTENT_LENGTH).and_then(|value| value.trim().parse().ok())
}

fn too_large(max_bytes: u64, actual: u64) -> FetchError {
    FetchError::new(
        FailureKind::TooLarge {
            max_bytes,
            actual: Some(actual),
        },
        "response too large",
    )
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_redirect() {
        return FetchError::new(FailureKind::RedirectLimitExceeded, err.to_string());
    }
    FetchError::new(FailureKind::Network, err.to_string())
}
