//! Renderer boundary — the external page-rendering collaborator.
//!
//! The SDK never drives a browser engine itself and never builds script
//! strings. It talks to the renderer through [`PageCommand`] values; the
//! renderer decides how each command maps onto its engine. Hosts bring
//! their own implementation (typically wrapping an embedded Chromium);
//! [`StaticRenderer`] ships for demos and tests.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use forager_domain::{Error, Result};
use forager_protocol::{FormField, WindowSize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Commands
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A typed instruction executed against a live page.
#[derive(Debug, Clone, PartialEq)]
pub enum PageCommand {
    Click { selector: String },
    /// Insert text at the cursor of the focused element.
    InsertText { text: String },
    /// Set the value of an input, textarea, or select.
    SetValue { selector: String, value: String },
    FillForm { selector: String, fields: Vec<FormField> },
    KeyPress { key: String },
    /// Smooth-scroll by a relative offset.
    ScrollBy { dx: i64, dy: i64 },
    /// Jump to an absolute vertical position.
    ScrollTo { y: u64 },
    RemoveElements { selectors: Vec<String> },
    ExtractHtml,
    /// Total scrollable document height in px.
    MeasureHeight,
}

/// What a [`PageCommand`] produced.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CommandOutput {
    #[default]
    Done,
    Html(String),
    Height(u64),
}

impl CommandOutput {
    pub fn into_html(self) -> Result<String> {
        match self {
            CommandOutput::Html(html) => Ok(html),
            other => Err(Error::Render(format!("expected HTML output, got {other:?}"))),
        }
    }

    pub fn into_height(self) -> Result<u64> {
        match self {
            CommandOutput::Height(px) => Ok(px),
            other => Err(Error::Render(format!("expected height output, got {other:?}"))),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Traits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One live page. Obtained from [`Renderer::open`], released with
/// [`close`](PageSession::close) on every exit path (the executor
/// guarantees this, including on timeout).
#[async_trait]
pub trait PageSession: Send + Sync {
    /// Load `url`; resolves once the page signals readiness. A navigation
    /// failure carries the engine's reason.
    async fn navigate(&self, url: &str) -> Result<()>;

    async fn execute(&self, command: PageCommand) -> Result<CommandOutput>;

    /// Capture the current viewport as PNG bytes.
    async fn capture(&self) -> Result<Vec<u8>>;

    /// Release the page. Idempotent; never fails.
    async fn close(&self);
}

/// Factory for page sessions.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn open(&self, size: WindowSize) -> Result<Arc<dyn PageSession>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Static renderer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Renderer that serves canned documents instead of driving a browser.
///
/// `navigate` picks the registered document for the URL (or the fallback),
/// UI commands are accepted and ignored, and `capture` synthesizes a white
/// viewport PNG of the session's size. Good enough to exercise the whole
/// task pipeline without an engine.
pub struct StaticRenderer {
    pages: HashMap<String, String>,
    fallback: String,
}

impl StaticRenderer {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
            fallback: "<html><head><title>forager</title></head>\
                       <body><h1>Placeholder</h1><p>No document registered \
                       for this URL.</p></body></html>"
                .into(),
        }
    }

    /// Register the document served for `url`.
    pub fn with_page(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.pages.insert(url.into(), html.into());
        self
    }

    pub fn with_fallback(mut self, html: impl Into<String>) -> Self {
        self.fallback = html.into();
        self
    }
}

impl Default for StaticRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Renderer for StaticRenderer {
    async fn open(&self, size: WindowSize) -> Result<Arc<dyn PageSession>> {
        Ok(Arc::new(StaticSession {
            pages: self.pages.clone(),
            fallback: self.fallback.clone(),
            size,
            current: Mutex::new(None),
        }))
    }
}

struct StaticSession {
    pages: HashMap<String, String>,
    fallback: String,
    size: WindowSize,
    current: Mutex<Option<String>>,
}

#[async_trait]
impl PageSession for StaticSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        let html = self.pages.get(url).cloned().unwrap_or_else(|| self.fallback.clone());
        *self.current.lock() = Some(html);
        Ok(())
    }

    async fn execute(&self, command: PageCommand) -> Result<CommandOutput> {
        match command {
            PageCommand::ExtractHtml => {
                let html = self
                    .current
                    .lock()
                    .clone()
                    .ok_or_else(|| Error::Render("no page loaded".into()))?;
                Ok(CommandOutput::Html(html))
            }
            // A canned page is exactly one viewport tall.
            PageCommand::MeasureHeight => Ok(CommandOutput::Height(u64::from(self.size.height))),
            _ => Ok(CommandOutput::Done),
        }
    }

    async fn capture(&self) -> Result<Vec<u8>> {
        let image = image::RgbaImage::from_pixel(
            self.size.width.max(1),
            self.size.height.max(1),
            image::Rgba([255, 255, 255, 255]),
        );
        let mut bytes = Cursor::new(Vec::new());
        image
            .write_to(&mut bytes, image::ImageFormat::Png)
            .map_err(|e| Error::Render(format!("encoding viewport capture: {e}")))?;
        Ok(bytes.into_inner())
    }

    async fn close(&self) {
        self.current.lock().take();
    }
}
