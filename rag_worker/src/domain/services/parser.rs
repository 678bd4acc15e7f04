use common::helper::error_chain_fmt;
use lopdf::Document as PdfDocument;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value as JsonValue};
use tracing::info;

use crate::domain::entities::parsed_document::{ParsedDocument, SourceMetadata};

/// Extracts the text content of a raw source file
pub trait Parser: Send + Sync {
    fn parse(&self, raw: &[u8], source: &SourceMetadata) -> Result<ParsedDocument, ParsingError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    PlainText,
    Html,
    Pdf,
}

impl SourceFormat {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "txt" | "md" | "markdown" | "csv" | "log" => Some(Self::PlainText),
            "html" | "htm" => Some(Self::Html),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::PlainText => "text",
            SourceFormat::Html => "html",
            SourceFormat::Pdf => "pdf",
        }
    }
}

/// Parser dispatching on the file extension
#[derive(Debug, Default, Clone)]
pub struct SourceParser {}

impl SourceParser {
    pub fn new() -> Self {
        Self {}
    }
}

impl Parser for SourceParser {
    #[tracing::instrument(name = "Parsing source file", skip(self, raw), fields(size = raw.len()))]
    fn parse(&self, raw: &[u8], source: &SourceMetadata) -> Result<ParsedDocument, ParsingError> {
        let extension = source.extension().unwrap_or_default();
        let format = SourceFormat::from_extension(&extension)
            .ok_or_else(|| ParsingError::UnsupportedFileType(source.filename.clone()))?;

        let (title, content, mut extra_metadata) = match format {
            SourceFormat::PlainText => {
                let text = decode_utf8(raw)?;
                (markdown_title(&text), normalize_whitespace(&text), Map::new())
            }
            SourceFormat::Html => {
                let html = decode_utf8(raw)?;
                (html_title(&html), html_to_text(&html), Map::new())
            }
            SourceFormat::Pdf => {
                let (content, pages) = pdf_to_text(raw)?;
                let mut extra = Map::new();
                extra.insert("pages".to_string(), json!(pages));
                (None, content, extra)
            }
        };

        if content.trim().is_empty() {
            return Err(ParsingError::EmptyContent(source.filename.clone()));
        }

        extra_metadata.insert("format".to_string(), json!(format.as_str()));
        extra_metadata.insert("filename".to_string(), json!(source.filename));
        let metadata = merge_metadata(&source.metadata, extra_metadata);

        let title = title.unwrap_or_else(|| file_stem(&source.filename));
        info!(title = %title, chars = content.chars().count(), "Parsed source file");

        Ok(ParsedDocument {
            id: source.document_id,
            workspace_id: source.workspace_id,
            title,
            content,
            metadata,
            chunk_count: None,
        })
    }
}

fn decode_utf8(raw: &[u8]) -> Result<String, ParsingError> {
    let text = std::str::from_utf8(raw)?;
    Ok(text.trim_start_matches('\u{feff}').to_string())
}

fn file_stem(filename: &str) -> String {
    std::path::Path::new(filename)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(filename)
        .to_string()
}

/// First markdown heading, if the text starts with one
fn markdown_title(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .and_then(|line| line.strip_prefix("# "))
        .map(|title| title.trim().to_string())
}

static HTML_TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("Invalid title regex"));
static HTML_HIDDEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<head\b.*?</head\s*>|<!--.*?-->")
        .expect("Invalid hidden html regex")
});
static HTML_BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<\s*(br|/p|/div|/h[1-6]|/li|/tr|/section|/article)\b[^>]*>")
        .expect("Invalid block html regex")
});
static HTML_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("Invalid tag regex"));
static SPACES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t\r\f\v]+").expect("Invalid spaces regex"));
static BLANK_LINES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n\s*\n(\s*\n)*").expect("Invalid blank lines regex"));

fn html_title(html: &str) -> Option<String> {
    HTML_TITLE_RE
        .captures(html)
        .and_then(|cap| cap.get(1))
        .map(|title| decode_html_entities(title.as_str().trim()))
        .filter(|title| !title.is_empty())
}

/// Strips tags, scripts and styles, keeping block boundaries as line breaks
fn html_to_text(html: &str) -> String {
    let text = HTML_HIDDEN_RE.replace_all(html, " ");
    let text = HTML_BLOCK_RE.replace_all(&text, "\n");
    let text = HTML_TAG_RE.replace_all(&text, " ");

    normalize_whitespace(&decode_html_entities(&text))
}

fn decode_html_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Collapses runs of spaces and of blank lines, trims every line
fn normalize_whitespace(text: &str) -> String {
    let text = text.replace("\r\n", "\n");
    let text = SPACES_RE.replace_all(&text, " ");
    let text: Vec<&str> = text.lines().map(str::trim).collect();
    let text = text.join("\n");

    BLANK_LINES_RE
        .replace_all(&text, "\n\n")
        .trim()
        .to_string()
}

/// Text of every page, in order, and the number of pages
///
/// Only text that is not "drawn" can be extracted.
fn pdf_to_text(raw: &[u8]) -> Result<(String, usize), ParsingError> {
    let document = PdfDocument::load_mem(raw)?;
    let page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();

    let mut pages = Vec::with_capacity(page_numbers.len());
    for page_number in &page_numbers {
        let text = document.extract_text(&[*page_number])?;
        let text = normalize_whitespace(&text);
        if !text.is_empty() {
            pages.push(text);
        }
    }

    Ok((pages.join("\n\n"), page_numbers.len()))
}

fn merge_metadata(initial: &JsonValue, extra: Map<String, JsonValue>) -> JsonValue {
    let mut metadata = match initial {
        JsonValue::Object(map) => map.clone(),
        JsonValue::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("initial".to_string(), other.clone());
            map
        }
    };
    metadata.extend(extra);

    JsonValue::Object(metadata)
}

#[derive(thiserror::Error)]
pub enum ParsingError {
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),
    #[error("File content is not valid UTF-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error("Corrupt PDF file: {0}")]
    CorruptPdf(#[from] lopdf::Error),
    #[error("No text content could be extracted from {0}")]
    EmptyContent(String),
}

impl std::fmt::Debug for ParsingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
