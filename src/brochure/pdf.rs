use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{error, info};

#[derive(Debug)]
pub enum PdfError {
    /// The engine binary could not be launched.
    EngineUnavailable(String),
    Failed { engine: String, stderr: String },
    Io(std::io::Error),
}

impl std::fmt::Display for PdfError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PdfError::EngineUnavailable(engine) => {
                write!(f, "pdf engine {engine} is not installed or not on PATH")
            }
            PdfError::Failed { engine, stderr } => write!(f, "{engine} failed: {stderr}"),
            PdfError::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for PdfError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PdfError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PdfError {
    fn from(e: std::io::Error) -> Self {
        PdfError::Io(e)
    }
}

/// External HTML-to-PDF converters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PdfEngine {
    #[default]
    Weasyprint,
    Wkhtmltopdf,
}

impl PdfEngine {
    pub fn binary(&self) -> &'static str {
        match self {
            PdfEngine::Weasyprint => "weasyprint",
            PdfEngine::Wkhtmltopdf => "wkhtmltopdf",
        }
    }
}

impl FromStr for PdfEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "weasyprint" => Ok(PdfEngine::Weasyprint),
            "wkhtmltopdf" => Ok(PdfEngine::Wkhtmltopdf),
            other => Err(format!("unknown pdf engine: {other}")),
        }
    }
}

/// Converts rendered brochures to PDF by running the configured engine.
#[derive(Debug, Clone)]
pub struct PdfGenerator {
    engine: PdfEngine,
    program: String,
}

impl PdfGenerator {
    pub fn new(engine: PdfEngine) -> Self {
        Self {
            engine,
            program: engine.binary().to_string(),
        }
    }

    /// Runs `program` instead of the engine's default binary name.
    pub fn with_program(engine: PdfEngine, program: impl Into<String>) -> Self {
        Self {
            engine,
            program: program.into(),
        }
    }

    pub fn engine(&self) -> PdfEngine {
        self.engine
    }

    /// Converts the HTML file at `html` into `output`. Relative asset paths
    /// resolve against the HTML file's directory.
    pub async fn generate(&self, html: &Path, output: &Path) -> Result<PathBuf, PdfError> {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut command = Command::new(&self.program);
        if self.engine == PdfEngine::Wkhtmltopdf {
            command.args(["--quiet", "--enable-local-file-access"]);
        }
        command.arg(html).arg(output);
        info!(engine = %self.program, html = %html.display(), "Generating PDF");
        let result = command.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PdfError::EngineUnavailable(self.program.clone())
            } else {
                PdfError::Io(e)
            }
        })?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
            error!(
                engine = %self.program,
                status = ?result.status.code(),
                stderr = %stderr,
                "PDF generation failed"
            );
            return Err(PdfError::Failed {
                engine: self.program.clone(),
                stderr,
            });
        }
        info!(path = %output.display(), "PDF generated");
        Ok(output.to_path_buf())
    }

    /// Converts an HTML document held in memory and returns the PDF bytes.
    pub async fn render_bytes(&self, html: &str, work_dir: &Path) -> Result<Vec<u8>, PdfError> {
        tokio::fs::create_dir_all(work_dir).await?;
        let stem = format!("catalog_{}", uuid::Uuid::new_v4().simple());
        let html_path = work_dir.join(format!("{stem}.html"));
        let pdf_path = work_dir.join(format!("{stem}.pdf"));
        tokio::fs::write(&html_path, html).await?;
        let result = self.generate(&html_path, &pdf_path).await;
        let bytes = match result {
            Ok(path) => tokio::fs::read(&path).await.map_err(PdfError::from),
            Err(e) => Err(e),
        };
        let _ = tokio::fs::remove_file(&html_path).await;
        let _ = tokio::fs::remove_file(&pdf_path).await;
        bytes
    }
}
