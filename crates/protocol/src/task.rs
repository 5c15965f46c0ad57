//! Task descriptors: one unit of render/scrape work as sent by the control
//! plane.

use serde::Deserialize;

use crate::action::PageAction;

pub const DEFAULT_WINDOW_WIDTH: u32 = 1024;
pub const DEFAULT_WINDOW_HEIGHT: u32 = 1024;

/// Renderer viewport size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

impl Default for WindowSize {
    fn default() -> Self {
        Self {
            width: DEFAULT_WINDOW_WIDTH,
            height: DEFAULT_WINDOW_HEIGHT,
        }
    }
}

/// One render/scrape work item.
///
/// `url` and `recordID` are the only required fields; everything else
/// defaults. The struct mirrors the wire protocol's field names, hence the
/// renames. Consumed exactly once by the executor, never persisted.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskDescriptor {
    pub url: String,
    #[serde(rename = "recordID")]
    pub record_id: String,
    #[serde(default, rename = "orgId")]
    pub org_id: String,
    /// Settle delay after the page signals readiness, in seconds.
    #[serde(default, rename = "waitBeforeScraping")]
    pub wait_before_secs: u64,
    #[serde(default, rename = "htmlVisualizer")]
    pub want_screenshot: bool,
    #[serde(default, rename = "fullpageScreenshot")]
    pub full_page_screenshot: bool,
    /// Px-suffixed ("1024px"), per the wire format.
    #[serde(default)]
    screen_width: Option<String>,
    #[serde(default)]
    screen_height: Option<String>,
    #[serde(default = "d_true", rename = "saveHtml")]
    pub save_html: bool,
    #[serde(default = "d_true", rename = "saveMarkdown")]
    pub save_markdown: bool,
    #[serde(default = "d_transformer", rename = "htmlTransformer")]
    pub html_transformer: String,
    /// JSON array of selectors, or the literal `"default"` for the built-in
    /// removal set. Absent/empty means no removal.
    #[serde(default, rename = "removeCSSselectors")]
    pub remove_css_selectors: Option<String>,
    #[serde(default)]
    pub actions: Vec<PageAction>,
}

impl TaskDescriptor {
    /// Viewport for this task; falls back to 1024x1024 unless both
    /// dimensions were sent and parse.
    pub fn window_size(&self) -> WindowSize {
        match (
            self.screen_width.as_deref().and_then(parse_px),
            self.screen_height.as_deref().and_then(parse_px),
        ) {
            (Some(width), Some(height)) => WindowSize { width, height },
            _ => WindowSize::default(),
        }
    }
}

/// Parses `"1024px"`-style sizes by dropping the two-character unit suffix.
fn parse_px(size: &str) -> Option<u32> {
    if size.len() < 3 {
        return None;
    }
    let digits = &size[..size.len() - 2];
    digits.parse::<f32>().ok().map(|px| px.round() as u32)
}

fn d_true() -> bool {
    true
}
fn d_transformer() -> String {
    "none".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_task_fills_defaults() {
        let task: TaskDescriptor =
            serde_json::from_str(r#"{"url":"https://example.com","recordID":"r1"}"#).unwrap();
        assert_eq!(task.record_id, "r1");
        assert_eq!(task.org_id, "");
        assert_eq!(task.wait_before_secs, 0);
        assert!(!task.want_screenshot);
        assert!(task.save_html);
        assert!(task.save_markdown);
        assert_eq!(task.html_transformer, "none");
        assert_eq!(task.window_size(), WindowSize::default());
        assert!(task.actions.is_empty());
    }

    #[test]
    fn missing_record_id_is_an_error() {
        let result: Result<TaskDescriptor, _> =
            serde_json::from_str(r#"{"url":"https://example.com"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn px_sizes_parse_when_both_present() {
        let task: TaskDescriptor = serde_json::from_str(
            r#"{"url":"u","recordID":"r","screen_width":"1280px","screen_height":"720px"}"#,
        )
        .unwrap();
        assert_eq!(
            task.window_size(),
            WindowSize {
                width: 1280,
                height: 720
            }
        );
    }

    #[test]
    fn lone_or_garbled_size_falls_back_to_default() {
        let task: TaskDescriptor = serde_json::from_str(
            r#"{"url":"u","recordID":"r","screen_width":"1280px"}"#,
        )
        .unwrap();
        assert_eq!(task.window_size(), WindowSize::default());

        let task: TaskDescriptor = serde_json::from_str(
            r#"{"url":"u","recordID":"r","screen_width":"wide","screen_height":"720px"}"#,
        )
        .unwrap();
        assert_eq!(task.window_size(), WindowSize::default());
    }

    #[test]
    fn full_wire_payload_parses() {
        let task: TaskDescriptor = serde_json::from_str(
            r##"{
                "url": "https://example.com/docs",
                "recordID": "rec456",
                "orgId": "org123",
                "waitBeforeScraping": 5,
                "htmlVisualizer": true,
                "fullpageScreenshot": true,
                "screen_width": "1280px",
                "screen_height": "720px",
                "saveMarkdown": false,
                "htmlTransformer": "custom",
                "removeCSSselectors": "default",
                "actions": [{"type":"click","selector":"#accept"}]
            }"##,
        )
        .unwrap();
        assert_eq!(task.org_id, "org123");
        assert_eq!(task.wait_before_secs, 5);
        assert!(task.want_screenshot);
        assert!(task.full_page_screenshot);
        assert!(task.save_html);
        assert!(!task.save_markdown);
        assert_eq!(task.remove_css_selectors.as_deref(), Some("default"));
        assert_eq!(task.actions.len(), 1);
    }
}
