//! Document loading from web pages and local files.
//!
//! Sources come from `[sources]`:
//! - `urls`: fetched with `reqwest`; HTML bodies go through
//!   [`extract_html`].
//! - `paths`: files are read directly, directories are walked with
//!   `include_globs` / `exclude_globs` applied to paths relative to the
//!   directory. A `file://` prefix is accepted. `.html` / `.htm` files are
//!   extracted like web pages.
//!
//! # Extraction filter
//!
//! When `extract_classes` is non-empty only elements carrying one of those
//! classes contribute text (an element nested inside another matching
//! element is not counted twice). With an empty list the whole `<body>` is
//! used. Text inside `<script>`, `<style>` and `<noscript>` is dropped.
//!
//! Documents whose extracted text is empty are skipped with a warning.

use std::path::{Path, PathBuf};
use std::time::Duration;

use globset::{Glob, GlobSet, GlobSetBuilder};
use ragtrace_core::models::Document;
use ragtrace_core::{RagError, Result};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::SourcesConfig;
use crate::http::build_client;

/// Text and metadata extracted from an HTML page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    pub title: Option<String>,
    pub language: Option<String>,
    pub text: String,
}

/// Extract text from `html`, keeping only elements with one of `classes`.
pub fn extract_html(html: &str, classes: &[String]) -> Extracted {
    let document = Html::parse_document(html);

    let title = select_first(&document, "title")
        .map(|t| t.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());
    let language = document
        .root_element()
        .value()
        .attr("lang")
        .map(|l| l.to_string());

    let mut text = String::new();
    if classes.is_empty() {
        if let Some(body) = select_first(&document, "body") {
            push_text(body, &mut text);
        }
    } else if let Ok(all) = Selector::parse("*") {
        for element in document.select(&all) {
            if !has_class(element, classes) {
                continue;
            }
            let nested = element
                .ancestors()
                .filter_map(ElementRef::wrap)
                .any(|a| has_class(a, classes));
            if nested {
                continue;
            }
            if !text.is_empty() {
                text.push('\n');
            }
            push_text(element, &mut text);
        }
    }

    Extracted {
        title,
        language,
        text: text.trim().to_string(),
    }
}

fn select_first<'a>(document: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(selector).ok()?;
    document.select(&selector).next()
}

fn has_class(element: ElementRef<'_>, classes: &[String]) -> bool {
    element
        .value()
        .classes()
        .any(|c| classes.iter().any(|wanted| wanted == c))
}

fn push_text(element: ElementRef<'_>, out: &mut String) {
    for node in element.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(ElementRef::wrap)
            .map(|p| matches!(p.value().name(), "script" | "style" | "noscript"))
            .unwrap_or(false);
        if !hidden {
            out.push_str(text);
        }
    }
}

fn html_document(source: &str, html: &str, classes: &[String]) -> Document {
    let extracted = extract_html(html, classes);
    let mut doc = Document::new(source, extracted.text);
    if let Some(title) = extracted.title {
        doc = doc.with_metadata("title", title);
    }
    if let Some(language) = extracted.language {
        doc = doc.with_metadata("language", language);
    }
    doc
}

// ============ Web ============

/// Fetches web pages and extracts their content.
pub struct WebLoader {
    client: reqwest::Client,
    classes: Vec<String>,
}

impl WebLoader {
    pub fn new(classes: Vec<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            classes,
        })
    }

    /// Fetch `url` and build a [`Document`] from it.
    ///
    /// # Errors
    ///
    /// [`RagError::Load`] on connection failure or a non-2xx status.
    pub async fn load(&self, url: &str) -> Result<Document> {
        let load_err = |message: String| RagError::Load {
            source_id: url.to_string(),
            message,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| load_err(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(load_err(format!("HTTP {}", status)));
        }

        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("html"))
            .unwrap_or(true);
        let body = response.text().await.map_err(|e| load_err(e.to_string()))?;

        let doc = if is_html {
            html_document(url, &body, &self.classes)
        } else {
            Document::new(url, body.trim())
        };
        debug!(url, chars = doc.char_len(), "fetched page");
        Ok(doc)
    }
}

// ============ Files ============

/// Loads local files and directory trees.
pub struct FileLoader {
    include: GlobSet,
    exclude: GlobSet,
    follow_symlinks: bool,
    classes: Vec<String>,
}

impl FileLoader {
    pub fn new(config: &SourcesConfig) -> Result<Self> {
        let mut excludes = vec![
            "**/.git/**".to_string(),
            "**/target/**".to_string(),
            "**/node_modules/**".to_string(),
        ];
        excludes.extend(config.exclude_globs.iter().cloned());
        Ok(Self {
            include: build_globset(&config.include_globs)?,
            exclude: build_globset(&excludes)?,
            follow_symlinks: config.follow_symlinks,
            classes: config.extract_classes.clone(),
        })
    }

    /// Load a file, or every matching file under a directory (sorted by path).
    pub fn load(&self, spec: &str) -> Result<Vec<Document>> {
        let root = PathBuf::from(spec.strip_prefix("file://").unwrap_or(spec));
        if root.is_file() {
            return Ok(vec![self.load_file(&root)?]);
        }
        if !root.is_dir() {
            return Err(RagError::Load {
                source_id: spec.to_string(),
                message: "no such file or directory".to_string(),
            });
        }

        let mut paths = Vec::new();
        for entry in WalkDir::new(&root).follow_links(self.follow_symlinks) {
            let entry = entry.map_err(|e| RagError::Load {
                source_id: spec.to_string(),
                message: e.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(&root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().to_string();
            if self.exclude.is_match(&rel_str) || !self.include.is_match(&rel_str) {
                continue;
            }
            paths.push(path.to_path_buf());
        }
        paths.sort();

        paths.iter().map(|p| self.load_file(p)).collect()
    }

    fn load_file(&self, path: &Path) -> Result<Document> {
        let source = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|e| RagError::Load {
            source_id: source.clone(),
            message: e.to_string(),
        })?;

        let is_html = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("html") | Some("htm")
        );
        let mut doc = if is_html {
            html_document(&source, &raw, &self.classes)
        } else {
            Document::new(source.as_str(), raw)
        };
        if !doc.metadata.contains_key("title") {
            if let Some(name) = path.file_name() {
                doc = doc.with_metadata("title", name.to_string_lossy().to_string());
            }
        }
        Ok(doc)
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| RagError::config(format!("invalid glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| RagError::config(format!("invalid glob set: {}", e)))
}

/// Load every configured source, URLs first, in configuration order.
pub async fn load_sources(config: &SourcesConfig) -> Result<Vec<Document>> {
    let mut documents = Vec::new();

    if !config.urls.is_empty() {
        let web = WebLoader::new(
            config.extract_classes.clone(),
            Duration::from_secs(config.timeout_secs),
        )?;
        for url in &config.urls {
            documents.push(web.load(url).await?);
        }
    }

    if !config.paths.is_empty() {
        let files = FileLoader::new(config)?;
        for path in &config.paths {
            documents.extend(files.load(path)?);
        }
    }

    let loaded = documents.len();
    documents.retain(|doc| {
        let empty = doc.content.trim().is_empty();
        if empty {
            warn!(source = %doc.source, "skipping document with no extractable text");
        }
        !empty
    });
    info!(documents = documents.len(), skipped = loaded - documents.len(), "loaded sources");
    Ok(documents)
}
