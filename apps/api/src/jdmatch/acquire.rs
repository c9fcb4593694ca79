//! Resume acquisition: reads an uploaded file or downloads from a URL
//! (with share-link rewriting), validates the content type, resolves a
//! filename, and normalizes .doc/.docx to PDF via the conversion collaborator.

use std::sync::OnceLock;

use percent_encoding::percent_decode_str;
use regex::Regex;
use reqwest::Url;
use tempfile::Builder;
use tracing::{debug, info, warn};

use crate::errors::AppError;
use crate::jdmatch::convert::DocConverter;
use crate::jdmatch::identity::rewrite_download_url;

/// Content types accepted from a resume URL. Matched as substrings, so
/// `officedocument` covers the long OOXML vendor types.
const SUPPORTED_TYPES: [&str; 4] = [
    "application/pdf",
    "application/octet-stream",
    "officedocument",
    "msword",
];

const DEFAULT_FILENAME: &str = "downloaded_resume.pdf";

/// A resume file read from an upload form field.
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Final output of acquisition: normalized bytes and a filename that is
/// guaranteed to be a PDF if the source was a Word document.
pub struct AcquiredResume {
    pub bytes: Vec<u8>,
    pub file_name: String,
}

/// Obtains resume bytes from an upload or a URL (at least one must be
/// present), then converts Word documents to PDF.
pub async fn acquire_resume(
    upload: Option<UploadedFile>,
    resume_url: Option<&str>,
    http: &reqwest::Client,
    converter: &dyn DocConverter,
) -> Result<AcquiredResume, AppError> {
    let (bytes, file_name) = match (upload, resume_url) {
        (Some(file), _) => {
            info!("Processing uploaded file: {}", file.file_name);
            (file.bytes, file.file_name)
        }
        (None, Some(url)) => download_resume(url, http).await?,
        (None, None) => {
            return Err(AppError::InvalidInput(
                "Either a resume file or resume_url must be provided".to_string(),
            ))
        }
    };

    let (bytes, file_name) = convert_if_needed(bytes, file_name, converter).await?;

    Ok(AcquiredResume { bytes, file_name })
}

/// Downloads the resume, following redirects, and validates the content type.
async fn download_resume(
    resume_url: &str,
    http: &reqwest::Client,
) -> Result<(Vec<u8>, String), AppError> {
    let (download_url, _) = rewrite_download_url(resume_url);
    info!("Downloading resume from {download_url}");

    let response = http
        .get(&download_url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| AppError::AcquisitionFailed(e.to_string()))?;

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    debug!("Download Content-Type: {content_type}");

    if !SUPPORTED_TYPES.iter().any(|t| content_type.contains(t)) {
        return Err(AppError::UnsupportedFileType(
            "URL did not return a supported file (PDF, DOC, DOCX)".to_string(),
        ));
    }

    let content_disposition = response
        .headers()
        .get(reqwest::header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let final_url = response.url().clone();

    let bytes = response
        .bytes()
        .await
        .map_err(|e| AppError::AcquisitionFailed(e.to_string()))?;

    let file_name = pick_filename(
        content_disposition.as_deref(),
        Some(&final_url),
        &download_url,
    );

    Ok((bytes.to_vec(), file_name))
}

fn content_disposition_filename() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"filename="?([^";]+)"?"#).expect("invalid filename pattern"))
}

/// Resolves the output filename: `Content-Disposition`, then the resolved
/// response URL's last path segment, then the original request URL's last
/// path segment, else a constant default. Segments are percent-decoded and
/// only accepted with a resume extension.
fn pick_filename(
    content_disposition: Option<&str>,
    response_url: Option<&Url>,
    original_url: &str,
) -> String {
    if let Some(header) = content_disposition {
        if let Some(caps) = content_disposition_filename().captures(header) {
            return caps[1].to_string();
        }
    }

    if let Some(name) = response_url.and_then(|u| filename_from_path(u.path())) {
        return name;
    }

    match Url::parse(original_url) {
        Ok(url) => {
            if let Some(name) = filename_from_path(url.path()) {
                return name;
            }
        }
        Err(e) => warn!("Failed to parse filename from download url: {e}"),
    }

    DEFAULT_FILENAME.to_string()
}

fn filename_from_path(path: &str) -> Option<String> {
    let segment = path.rsplit('/').next()?;
    let decoded = percent_decode_str(segment).decode_utf8().ok()?;
    let lower = decoded.to_lowercase();
    if !decoded.is_empty()
        && (lower.ends_with(".pdf") || lower.ends_with(".doc") || lower.ends_with(".docx"))
    {
        Some(decoded.into_owned())
    } else {
        None
    }
}

fn is_word_document(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    lower.ends_with(".doc") || lower.ends_with(".docx")
}

/// Converts .doc/.docx bytes to PDF through the conversion collaborator.
/// The bytes are staged in a named tempfile that is removed on every exit
/// path (drop), including conversion failure.
async fn convert_if_needed(
    bytes: Vec<u8>,
    file_name: String,
    converter: &dyn DocConverter,
) -> Result<(Vec<u8>, String), AppError> {
    if !is_word_document(&file_name) {
        return Ok((bytes, file_name));
    }

    info!("Converting {file_name} to PDF");

    let suffix = std::path::Path::new(&file_name)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let tmp = Builder::new()
        .suffix(&suffix)
        .tempfile()
        .map_err(|e| AppError::ConversionFailed(format!("Failed to create temp file: {e}")))?;

    tokio::fs::write(tmp.path(), &bytes)
        .await
        .map_err(|e| AppError::ConversionFailed(format!("Failed to write temp file: {e}")))?;

    let pdf = converter.to_pdf(tmp.path()).await?;

    let stem = std::path::Path::new(&file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.clone());

    Ok((pdf, format!("{stem}.pdf")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeConverter {
        called: AtomicBool,
        fail: bool,
    }

    impl FakeConverter {
        fn new(fail: bool) -> Self {
            Self {
                called: AtomicBool::new(false),
                fail,
            }
        }
    }

    #[async_trait]
    impl DocConverter for FakeConverter {
        async fn to_pdf(&self, path: &Path) -> Result<Vec<u8>, AppError> {
            self.called.store(true, Ordering::SeqCst);
            assert!(path.exists(), "temp file must exist during conversion");
            if self.fail {
                Err(AppError::ConversionFailed("boom".to_string()))
            } else {
                Ok(b"%PDF-converted".to_vec())
            }
        }
    }

    #[test]
    fn test_filename_from_content_disposition() {
        let name = pick_filename(
            Some(r#"attachment; filename="resume.pdf""#),
            None,
            "https://example.com/x",
        );
        assert_eq!(name, "resume.pdf");
    }

    #[test]
    fn test_filename_from_unquoted_content_disposition() {
        let name = pick_filename(
            Some("attachment; filename=cv.docx"),
            None,
            "https://example.com/x",
        );
        assert_eq!(name, "cv.docx");
    }

    #[test]
    fn test_filename_from_response_url_path() {
        let url = Url::parse("https://cdn.example.com/files/My%20Resume.pdf").unwrap();
        let name = pick_filename(None, Some(&url), "https://example.com/redirector");
        assert_eq!(name, "My Resume.pdf");
    }

    #[test]
    fn test_filename_from_original_url_when_response_path_has_no_extension() {
        let url = Url::parse("https://cdn.example.com/download").unwrap();
        let name = pick_filename(None, Some(&url), "https://example.com/files/resume.docx");
        assert_eq!(name, "resume.docx");
    }

    #[test]
    fn test_filename_falls_back_to_default() {
        let name = pick_filename(None, None, "https://example.com/download?id=1");
        assert_eq!(name, DEFAULT_FILENAME);
    }

    #[tokio::test]
    async fn test_missing_file_and_url_is_invalid_input() {
        let converter = FakeConverter::new(false);
        let http = reqwest::Client::new();
        let result = acquire_resume(None, None, &http, &converter).await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_pdf_upload_skips_conversion() {
        let converter = FakeConverter::new(false);
        let (bytes, name) = convert_if_needed(b"%PDF".to_vec(), "resume.pdf".to_string(), &converter)
            .await
            .unwrap();
        assert_eq!(bytes, b"%PDF");
        assert_eq!(name, "resume.pdf");
        assert!(!converter.called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_docx_is_converted_and_renamed() {
        let converter = FakeConverter::new(false);
        let (bytes, name) = convert_if_needed(b"docx".to_vec(), "My CV.docx".to_string(), &converter)
            .await
            .unwrap();
        assert_eq!(bytes, b"%PDF-converted");
        assert_eq!(name, "My CV.pdf");
        assert!(converter.called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_conversion_failure_propagates() {
        let converter = FakeConverter::new(true);
        let result = convert_if_needed(b"doc".to_vec(), "cv.doc".to_string(), &converter).await;
        assert!(matches!(result, Err(AppError::ConversionFailed(_))));
    }
}
