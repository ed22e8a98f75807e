//! Conversion service seam: upload files, inspect them, convert them.
//!
//! The orchestrator talks to the service only through the [`ConversionApi`]
//! trait so tests (and alternative transports) can stand in for the network.
//! [`HttpConversionApi`] is the production implementation over `reqwest`.
//!
//! ## Endpoints
//!
//! ```text
//! POST {base}/inspect   multipart: file            → InspectionResult (JSON)
//! POST {base}/convert   multipart: file, [pages]   → artifact bytes
//! GET  {base}/me                                   → AccountSnapshot (JSON)
//! ```
//!
//! Every request carries `Authorization: Bearer <token>` when a token is
//! configured. Failures are never retried here; the caller decides.

use crate::config::ClientConfig;
use crate::error::{ApiError, TabularisError};
use crate::quota::AccountSnapshot;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, CONTENT_DISPOSITION};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, Url};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Media type declared for PDF uploads.
pub const PDF_MEDIA_TYPE: &str = "application/pdf";

/// Message used when a failed response carries nothing readable.
pub const GENERIC_FAILURE_MESSAGE: &str = "Conversion failed. Please try again.";

// ── Upload file ──────────────────────────────────────────────────────────

/// A file the user picked or dropped, held in memory for upload.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadFile {
    /// File name as shown to the user (no directory part).
    pub name: String,
    /// Declared media type, if the source supplied one.
    pub media_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for UploadFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadFile")
            .field("name", &self.name)
            .field("media_type", &self.media_type)
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .finish()
    }
}

impl UploadFile {
    pub fn new(name: impl Into<String>, media_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type,
            bytes,
        }
    }

    /// Read a local file.
    ///
    /// Local files carry no declared media type, so one is sniffed: files
    /// starting with the `%PDF` magic bytes are declared `application/pdf`.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, TabularisError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| TabularisError::FileRead {
                path: path.to_path_buf(),
                source: e,
            })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let media_type = bytes.starts_with(b"%PDF").then(|| PDF_MEDIA_TYPE.to_string());
        debug!("Read {} ({} bytes)", name, bytes.len());
        Ok(Self::new(name, media_type, bytes))
    }

    /// File name without its final extension.
    pub fn stem(&self) -> &str {
        Path::new(&self.name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.name)
    }
}

/// `true` if the file is declared `application/pdf` or named `*.pdf`
/// (case-insensitive).
pub fn is_pdf_file(file: &UploadFile) -> bool {
    let declared = file
        .media_type
        .as_deref()
        .is_some_and(|m| m.trim().eq_ignore_ascii_case(PDF_MEDIA_TYPE));
    declared || file.name.to_ascii_lowercase().ends_with(".pdf")
}

// ── Service shapes ───────────────────────────────────────────────────────

/// What the service knows about an uploaded file before conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionResult {
    pub filename: String,
    pub total_pages: u32,
    /// Whether "convert all pages" is permitted for this file and plan.
    pub can_convert_all: bool,
    /// Upper bound on an explicit page selection.
    pub max_select_pages: u32,
    /// Page cap of the Free plan; seeds the default selection.
    pub free_max_pages: u32,
}

/// A converted file returned by the service.
#[derive(Clone, PartialEq, Eq)]
pub struct ConvertedArtifact {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for ConvertedArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConvertedArtifact")
            .field("filename", &self.filename)
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .finish()
    }
}

/// The conversion service as seen by the orchestrator.
///
/// Implementations must be `Send + Sync`; the orchestrator holds them behind
/// an `Arc` and awaits one call at a time.
#[async_trait]
pub trait ConversionApi: Send + Sync {
    /// Upload `file` and read back its page metadata.
    async fn inspect(&self, file: &UploadFile) -> Result<InspectionResult, ApiError>;

    /// Convert `file`. `pages = None` converts every page; otherwise it is a
    /// canonical page spec such as `"1-3,5"`.
    async fn convert(
        &self,
        file: &UploadFile,
        pages: Option<&str>,
    ) -> Result<ConvertedArtifact, ApiError>;

    /// Current plan and usage of the signed-in account.
    async fn account(&self) -> Result<AccountSnapshot, ApiError>;
}

// ── HTTP implementation ──────────────────────────────────────────────────

/// [`ConversionApi`] over HTTP.
pub struct HttpConversionApi {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
    artifact_extension: String,
}

impl fmt::Debug for HttpConversionApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpConversionApi")
            .field("base_url", &self.base_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("artifact_extension", &self.artifact_extension)
            .finish()
    }
}

impl HttpConversionApi {
    /// Build a client from a validated [`ClientConfig`].
    pub fn new(config: &ClientConfig) -> Result<Self, TabularisError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| TabularisError::Internal(format!("Failed to build HTTP client: {e}")))?;

        // A trailing slash makes `Url::join` append rather than replace.
        let mut base = config.api_base_url.trim_end_matches('/').to_string();
        base.push('/');
        let base_url = Url::parse(&base).map_err(|e| {
            TabularisError::InvalidConfig(format!("API base URL '{}': {e}", config.api_base_url))
        })?;

        Ok(Self {
            client,
            base_url,
            token: config.access_token.clone(),
            artifact_extension: config.artifact_extension.clone(),
        })
    }

    /// Absolute URL of an endpoint below the base URL.
    pub fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ApiError::new(None, format!("Invalid endpoint '{path}': {e}")))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.token {
            Some(ref token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn file_part(file: &UploadFile) -> Result<Part, ApiError> {
        let media_type = file.media_type.as_deref().unwrap_or(PDF_MEDIA_TYPE);
        Part::bytes(file.bytes.clone())
            .file_name(file.name.clone())
            .mime_str(media_type)
            .map_err(|e| ApiError::new(None, format!("Invalid media type '{media_type}': {e}")))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| ApiError::new(None, format!("Request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = extract_error_message(&body);
        debug!("HTTP {} from service: {}", status, message);
        Err(ApiError::new(Some(status.as_u16()), message))
    }
}

#[async_trait]
impl ConversionApi for HttpConversionApi {
    async fn inspect(&self, file: &UploadFile) -> Result<InspectionResult, ApiError> {
        let url = self.endpoint("inspect")?;
        debug!("Inspecting {} via {}", file.name, url);
        let form = Form::new().part("file", Self::file_part(file)?);
        let response = self.send(self.client.post(url).multipart(form)).await?;
        response
            .json::<InspectionResult>()
            .await
            .map_err(|e| ApiError::new(None, format!("Malformed inspection response: {e}")))
    }

    async fn convert(
        &self,
        file: &UploadFile,
        pages: Option<&str>,
    ) -> Result<ConvertedArtifact, ApiError> {
        let url = self.endpoint("convert")?;
        info!(
            "Converting {} (pages: {})",
            file.name,
            pages.unwrap_or("all")
        );
        let mut form = Form::new().part("file", Self::file_part(file)?);
        if let Some(spec) = pages {
            form = form.text("pages", spec.to_string());
        }

        let response = self.send(self.client.post(url).multipart(form)).await?;
        let filename = content_disposition_filename(response.headers())
            .unwrap_or_else(|| format!("{}.{}", file.stem(), self.artifact_extension));
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::new(None, format!("Failed to read converted file: {e}")))?;

        Ok(ConvertedArtifact {
            filename,
            bytes: bytes.to_vec(),
        })
    }

    async fn account(&self) -> Result<AccountSnapshot, ApiError> {
        let url = self.endpoint("me")?;
        let response = self.send(self.client.get(url)).await?;
        response
            .json::<AccountSnapshot>()
            .await
            .map_err(|e| ApiError::new(None, format!("Malformed account response: {e}")))
    }
}

// ── Response helpers ─────────────────────────────────────────────────────

/// Pull a human-readable message out of an error response body.
///
/// Precedence:
/// 1. `{"detail": "<string>"}`
/// 2. `{"detail": {"message": "<string>"}}` or `{"message": "<string>"}`
/// 3. the raw body text, trimmed
/// 4. [`GENERIC_FAILURE_MESSAGE`]
pub fn extract_error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let detail = value.get("detail");
        if let Some(text) = detail.and_then(|d| d.as_str()).filter(|s| !s.trim().is_empty()) {
            return text.trim().to_string();
        }
        let message = detail
            .and_then(|d| d.get("message"))
            .or_else(|| value.get("message"))
            .and_then(|m| m.as_str())
            .filter(|s| !s.trim().is_empty());
        if let Some(text) = message {
            return text.trim().to_string();
        }
    }

    let raw = body.trim();
    if raw.is_empty() {
        GENERIC_FAILURE_MESSAGE.to_string()
    } else {
        raw.to_string()
    }
}

static RE_FILENAME_EXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)filename\*\s*=\s*(?:utf-8)?''([^;]+)"#).unwrap());

static RE_FILENAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)filename\s*=\s*(?:"([^"]*)"|([^;\s]+))"#).unwrap());

/// Filename from a `Content-Disposition` header, preferring `filename*`.
///
/// Only the final path component is kept.
pub fn content_disposition_filename(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(CONTENT_DISPOSITION)?.to_str().ok()?;
    parse_content_disposition(raw)
}

fn parse_content_disposition(raw: &str) -> Option<String> {
    let name = if let Some(caps) = RE_FILENAME_EXT.captures(raw) {
        let decoded = urlencoding::decode_binary(caps[1].trim().as_bytes());
        String::from_utf8_lossy(&decoded).into_owned()
    } else {
        let caps = RE_FILENAME.captures(raw)?;
        caps.get(1).or_else(|| caps.get(2))?.as_str().to_string()
    };

    let base = PathBuf::from(name.replace('\\', "/"))
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())?;
    (!base.trim().is_empty()).then_some(base)
}
