//! File identity resolution and share-link rewriting.
//!
//! A resume submitted through a Google Drive/Docs or Dropbox share link gets
//! the provider's own file id as its `file_id`, so repeated submissions of
//! the same link correlate to the same identity. Anything else gets a fresh
//! UUID. The same patterns drive the direct-download URL rewrite.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;
use uuid::Uuid;

fn gdrive_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:drive|docs)\.google\.com/(?:file/d|document/d)/([a-zA-Z0-9_-]+)")
            .expect("invalid gdrive pattern")
    })
}

fn dropbox_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"dropbox\.com/sh?/([a-zA-Z0-9_-]+)").expect("invalid dropbox pattern")
    })
}

fn provider_file_id(url: &str) -> Option<String> {
    if let Some(caps) = gdrive_pattern().captures(url) {
        return Some(caps[1].to_string());
    }
    if let Some(caps) = dropbox_pattern().captures(url) {
        return Some(caps[1].to_string());
    }
    None
}

/// Derives a stable `file_id` for an inbound resume before any bytes are
/// fetched. Never fails; absence of a URL yields a generated id.
pub fn resolve_file_id(resume_url: Option<&str>) -> String {
    if let Some(id) = resume_url.and_then(provider_file_id) {
        debug!("Extracted provider file_id: {id}");
        return id;
    }
    let id = Uuid::new_v4().to_string();
    debug!("Generated file_id: {id}");
    id
}

/// Rewrites a share URL into a direct-download URL, returning the rewritten
/// URL and the provider file id if one was recognized.
///
/// Dropbox: `?dl=0` → `?dl=1` (appended if no `dl` parameter is present).
/// Google Drive/Docs: `file/d/<id>` → `uc?export=download&id=<id>`.
pub fn rewrite_download_url(resume_url: &str) -> (String, Option<String>) {
    let mut download_url = resume_url.to_string();
    let mut file_id = None;

    if let Some(caps) = dropbox_pattern().captures(&download_url) {
        file_id = Some(caps[1].to_string());
        if download_url.contains("?dl=0") {
            download_url = download_url.replace("?dl=0", "?dl=1");
        } else if !download_url.contains("?dl=") {
            download_url.push_str("?dl=1");
        }
    }

    if let Some(caps) = gdrive_pattern().captures(&download_url) {
        let id = caps[1].to_string();
        download_url = format!("https://drive.google.com/uc?export=download&id={id}");
        file_id = Some(id);
    }

    (download_url, file_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gdrive_file_url_yields_provider_id() {
        let id = resolve_file_id(Some("https://drive.google.com/file/d/ABC123/view"));
        assert_eq!(id, "ABC123");
    }

    #[test]
    fn test_gdocs_document_url_yields_provider_id() {
        let id = resolve_file_id(Some("https://docs.google.com/document/d/xYz_9-8/edit"));
        assert_eq!(id, "xYz_9-8");
    }

    #[test]
    fn test_dropbox_url_yields_provider_id() {
        let id = resolve_file_id(Some("https://www.dropbox.com/s/abc123/resume.pdf?dl=0"));
        assert_eq!(id, "abc123");
        let id = resolve_file_id(Some("https://www.dropbox.com/sh/folder1/resume.pdf"));
        assert_eq!(id, "folder1");
    }

    #[test]
    fn test_unrecognized_url_generates_uuid() {
        let id = resolve_file_id(Some("https://example.com/resume.pdf"));
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn test_missing_url_generates_uuid() {
        let id = resolve_file_id(None);
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn test_gdrive_rewrite_to_uc_export() {
        let (url, id) = rewrite_download_url("https://drive.google.com/file/d/ABC123/view");
        assert_eq!(url, "https://drive.google.com/uc?export=download&id=ABC123");
        assert_eq!(id.as_deref(), Some("ABC123"));
    }

    /// The identity resolver and the URL rewrite must agree on the provider id.
    #[test]
    fn test_resolver_and_rewrite_extract_identical_gdrive_id() {
        let url = "https://drive.google.com/file/d/1a2B-3c_4d/view?usp=sharing";
        let resolved = resolve_file_id(Some(url));
        let (_, rewritten) = rewrite_download_url(url);
        assert_eq!(Some(resolved), rewritten);
    }

    #[test]
    fn test_dropbox_dl0_becomes_dl1() {
        let (url, _) = rewrite_download_url("https://www.dropbox.com/s/abc/r.pdf?dl=0");
        assert!(url.ends_with("?dl=1"));
    }

    #[test]
    fn test_dropbox_without_dl_param_gets_dl1_appended() {
        let (url, _) = rewrite_download_url("https://www.dropbox.com/s/abc/r.pdf");
        assert!(url.ends_with("?dl=1"));
    }

    #[test]
    fn test_dropbox_existing_dl1_left_alone() {
        let (url, _) = rewrite_download_url("https://www.dropbox.com/s/abc/r.pdf?dl=1");
        assert_eq!(url, "https://www.dropbox.com/s/abc/r.pdf?dl=1");
    }

    #[test]
    fn test_plain_url_passes_through_unchanged() {
        let (url, id) = rewrite_download_url("https://example.com/files/resume.pdf");
        assert_eq!(url, "https://example.com/files/resume.pdf");
        assert!(id.is_none());
    }
}
