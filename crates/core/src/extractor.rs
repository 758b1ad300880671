use crate::error::IngestError;
use base64::{engine::general_purpose::STANDARD, Engine};
use lopdf::Document as PdfDocument;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Direct extraction yielding fewer trimmed characters than this marks the
/// page as image-like and routes it to OCR.
const MIN_DIRECT_YIELD_CHARS: usize = 50;

/// Render resolution requested for OCR.
const OCR_DPI: u32 = 300;

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "tiff", "bmp"];

#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    pub page: u32,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Pdf,
    Image,
}

/// Classifies an input path by extension, before any processing begins.
pub fn input_kind(path: &Path) -> Result<InputKind, IngestError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .unwrap_or_default();

    if extension == "pdf" {
        Ok(InputKind::Pdf)
    } else if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        Ok(InputKind::Image)
    } else {
        Err(IngestError::UnsupportedFormat(format!(
            "{} (extension '{}')",
            path.display(),
            extension
        )))
    }
}

/// OCR seam. Implementations render the requested page(s) at the given DPI
/// and return recognized text.
pub trait OcrEngine {
    /// OCR one page of a paginated document.
    fn ocr_pdf_page(&self, path: &Path, page: u32) -> Result<String, IngestError>;

    /// OCR every page of a paginated document that could not be parsed.
    fn ocr_pdf(&self, path: &Path) -> Result<Vec<PageText>, IngestError>;

    /// OCR a single-image input.
    fn ocr_image(&self, path: &Path) -> Result<String, IngestError>;
}

#[derive(Debug, Clone, Serialize)]
struct OcrRequest {
    document_base64: String,
    source_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    page: Option<u32>,
    dpi: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct OcrResponse {
    pages: Option<Vec<OcrResponsePage>>,
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OcrResponsePage {
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OcrEndpointConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
}

impl OcrEndpointConfig {
    /// Reads `DOC_RAG_OCR_ENDPOINT` / `DOC_RAG_OCR_API_KEY`. Returns `None`
    /// when no endpoint is set; extraction then degrades to empty text for
    /// pages that needed OCR.
    pub fn from_env() -> Option<Self> {
        let endpoint = std::env::var("DOC_RAG_OCR_ENDPOINT").ok()?;
        let endpoint = endpoint.trim().to_string();
        if endpoint.is_empty() {
            return None;
        }

        let api_key = std::env::var("DOC_RAG_OCR_API_KEY").ok().and_then(|value| {
            let key = value.trim().to_string();
            if key.is_empty() {
                None
            } else {
                Some(key)
            }
        });

        Some(Self { endpoint, api_key })
    }
}

/// OCR over HTTP: posts the document bytes plus page selector and DPI to a
/// rendering/recognition endpoint with optional bearer auth.
pub struct HttpOcrEngine {
    config: Option<OcrEndpointConfig>,
    client: Client,
}

impl HttpOcrEngine {
    pub fn new(config: Option<OcrEndpointConfig>) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(OcrEndpointConfig::from_env())
    }

    fn request(&self, path: &Path, page: Option<u32>) -> Result<OcrResponse, IngestError> {
        let cfg = self.config.as_ref().ok_or_else(|| {
            IngestError::OcrFailed("no OCR endpoint configured".to_string())
        })?;

        let bytes = std::fs::read(path).map_err(IngestError::Io)?;
        let payload = OcrRequest {
            document_base64: STANDARD.encode(bytes),
            source_path: path.to_string_lossy().to_string(),
            page,
            dpi: OCR_DPI,
        };

        let mut request = self
            .client
            .post(&cfg.endpoint)
            .header("content-type", "application/json")
            .json(&payload);

        if let Some(api_key) = &cfg.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send()?;
        if !response.status().is_success() {
            return Err(IngestError::OcrFailed(format!(
                "OCR request to {} returned {}",
                cfg.endpoint,
                response.status()
            )));
        }

        Ok(response.json()?)
    }
}

impl OcrEngine for HttpOcrEngine {
    fn ocr_pdf_page(&self, path: &Path, page: u32) -> Result<String, IngestError> {
        let response = self.request(path, Some(page))?;
        Ok(response_text(&response))
    }

    fn ocr_pdf(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let response = self.request(path, None)?;
        let pages = response_pages(&response);
        if pages.is_empty() {
            return Err(IngestError::OcrFailed(format!(
                "OCR response had no readable text for {}",
                path.display()
            )));
        }
        Ok(pages)
    }

    fn ocr_image(&self, path: &Path) -> Result<String, IngestError> {
        let response = self.request(path, None)?;
        Ok(response_text(&response))
    }
}

fn response_text(response: &OcrResponse) -> String {
    if let Some(text) = &response.text {
        return text.clone();
    }
    response
        .pages
        .as_ref()
        .and_then(|pages| pages.first())
        .and_then(|page| page.text.clone())
        .unwrap_or_default()
}

fn response_pages(response: &OcrResponse) -> Vec<PageText> {
    if let Some(listed) = &response.pages {
        let listed: Vec<PageText> = listed
            .iter()
            .enumerate()
            .map(|(index, page)| PageText {
                page: page.page.unwrap_or(index as u32 + 1),
                text: page.text.clone().unwrap_or_default(),
            })
            .collect();
        if !listed.is_empty() {
            return listed;
        }
    }

    // Fallback shape: one flat string with form-feed page breaks.
    if let Some(raw) = &response.text {
        return raw
            .split('\u{000c}')
            .enumerate()
            .map(|(index, text)| PageText {
                page: index as u32 + 1,
                text: text.to_string(),
            })
            .collect();
    }

    Vec::new()
}

/// The threshold counts characters, not bytes, so non-ASCII pages are judged
/// the same as ASCII ones.
fn needs_ocr(direct: &str) -> bool {
    direct.trim().chars().count() < MIN_DIRECT_YIELD_CHARS
}

/// Converts a document into per-page text: direct extraction first, OCR for
/// low-yield or unparsable pages. Individual page failures degrade to empty
/// text; only an unsupported format aborts the call.
pub struct DocumentExtractor<O: OcrEngine> {
    ocr: O,
}

impl<O: OcrEngine> DocumentExtractor<O> {
    pub fn new(ocr: O) -> Self {
        Self { ocr }
    }

    pub fn extract(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        match input_kind(path)? {
            InputKind::Pdf => Ok(self.extract_pdf(path)),
            InputKind::Image => Ok(self.extract_image(path)),
        }
    }

    fn extract_pdf(&self, path: &Path) -> Vec<PageText> {
        let document = match PdfDocument::load(path) {
            Ok(document) => document,
            Err(error) => {
                warn!(path = %path.display(), %error, "pdf parse failed, falling back to full OCR");
                return self.ocr_whole_pdf(path);
            }
        };

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            // A per-page extraction error counts as absent text.
            let direct = document.extract_text(&[page_no]).unwrap_or_default();

            let text = if needs_ocr(&direct) {
                info!(page = page_no, path = %path.display(), "direct yield too low, using OCR");
                self.ocr.ocr_pdf_page(path, page_no).unwrap_or_else(|error| {
                    warn!(page = page_no, %error, "page OCR failed");
                    String::new()
                })
            } else {
                direct
            };

            pages.push(PageText {
                page: page_no,
                text,
            });
        }

        pages
    }

    fn ocr_whole_pdf(&self, path: &Path) -> Vec<PageText> {
        match self.ocr.ocr_pdf(path) {
            Ok(pages) => pages,
            Err(error) => {
                warn!(path = %path.display(), %error, "full-document OCR failed");
                Vec::new()
            }
        }
    }

    fn extract_image(&self, path: &Path) -> Vec<PageText> {
        // Single-image inputs are one page; OCR is the only source of text,
        // so there is no minimum-yield comparison.
        let text = self.ocr.ocr_image(path).unwrap_or_else(|error| {
            warn!(path = %path.display(), %error, "image OCR failed");
            String::new()
        });

        vec![PageText { page: 1, text }]
    }
}
