//! OCR Providers

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::types::{OcrError, OcrOutcome, OcrStatus};

/// Adds a text layer to a PDF
#[async_trait]
pub trait OcrProcessor: Send + Sync {
    /// Whether every external dependency is installed
    async fn is_available(&self) -> bool;

    /// Process `input`. Any failure returns the input path unchanged.
    async fn process(&self, input: &Path) -> OcrOutcome;
}

/// Never runs OCR
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledOcr;

#[async_trait]
impl OcrProcessor for DisabledOcr {
    async fn is_available(&self) -> bool {
        false
    }

    async fn process(&self, input: &Path) -> OcrOutcome {
        OcrOutcome {
            path: input.to_path_buf(),
            status: OcrStatus::Disabled,
        }
    }
}

/// Runs the `ocrmypdf` command line tool
#[derive(Debug, Clone)]
pub struct OcrMyPdf {
    program: String,
    language: String,
    timeout: Duration,
}

impl OcrMyPdf {
    pub fn new(language: &str, timeout: Duration) -> Self {
        Self {
            program: "ocrmypdf".to_string(),
            language: language.to_string(),
            timeout,
        }
    }

    /// Use a different executable than `ocrmypdf` on the PATH
    pub fn with_program(mut self, program: &str) -> Self {
        self.program = program.to_string();
        self
    }

    /// Ghostscript and Tesseract back ocrmypdf
    async fn check_dependencies(&self) -> Result<(), OcrError> {
        for program in ["gs", "tesseract", self.program.as_str()] {
            let status = Command::new(program)
                .arg("--version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;
            if !matches!(status, Ok(s) if s.success()) {
                return Err(OcrError::MissingDependency(program.to_string()));
            }
        }
        Ok(())
    }

    async fn run(&self, input: &Path) -> Result<PathBuf, OcrError> {
        self.check_dependencies().await?;

        let output_path =
            std::env::temp_dir().join(format!("ocr_output_{}.pdf", uuid::Uuid::new_v4()));

        let child = Command::new(&self.program)
            .arg("--force-ocr")
            .arg("--optimize")
            .arg("0")
            .arg("--output-type")
            .arg("pdf")
            .arg("--quiet")
            .arg("-l")
            .arg(&self.language)
            .arg(input)
            .arg(&output_path)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, child).await {
            Ok(result) => result.map_err(|source| OcrError::Spawn {
                program: self.program.clone(),
                source,
            })?,
            Err(_) => {
                let _ = tokio::fs::remove_file(&output_path).await;
                return Err(OcrError::Timeout(self.timeout));
            }
        };

        if !output.status.success() {
            let _ = tokio::fs::remove_file(&output_path).await;
            return Err(OcrError::Failed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output_path)
    }
}

#[async_trait]
impl OcrProcessor for OcrMyPdf {
    async fn is_available(&self) -> bool {
        self.check_dependencies().await.is_ok()
    }

    async fn process(&self, input: &Path) -> OcrOutcome {
        match self.run(input).await {
            Ok(path) => {
                tracing::info!(input = %input.display(), output = %path.display(), "OCR applied");
                OcrOutcome::applied(path)
            }
            Err(e) => {
                tracing::warn!(input = %input.display(), error = %e, "OCR skipped");
                OcrOutcome::skipped(input.to_path_buf(), e.to_string())
            }
        }
    }
}
