//! Document conversion collaborator: turns .doc/.docx bytes into PDF bytes
//! via an external LibreOffice-backed HTTP service.

use std::path::Path;

use async_trait::async_trait;
use tracing::{error, info};

use crate::errors::AppError;

/// Conversion seam. The HTTP implementation talks to a Gotenberg-style
/// service; tests substitute an in-memory implementation.
#[async_trait]
pub trait DocConverter: Send + Sync {
    /// Converts the document at `path` to PDF bytes. Non-2xx from the
    /// conversion service is a hard failure.
    async fn to_pdf(&self, path: &Path) -> Result<Vec<u8>, AppError>;
}

pub struct HttpDocConverter {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDocConverter {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .expect("Failed to build HTTP client"),
            base_url,
        }
    }
}

#[async_trait]
impl DocConverter for HttpDocConverter {
    async fn to_pdf(&self, path: &Path) -> Result<Vec<u8>, AppError> {
        let url = format!("{}/forms/libreoffice/convert", self.base_url);

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AppError::ConversionFailed(format!("Failed to read {path:?}: {e}")))?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());

        info!("Converting {file_name} to PDF via {url}");

        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let form = reqwest::multipart::Form::new().part("files", part);

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::ConversionFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Conversion service returned {status}: {body}");
            return Err(AppError::ConversionFailed(format!(
                "conversion service returned {status}"
            )));
        }

        let pdf = response
            .bytes()
            .await
            .map_err(|e| AppError::ConversionFailed(e.to_string()))?;

        Ok(pdf.to_vec())
    }
}
