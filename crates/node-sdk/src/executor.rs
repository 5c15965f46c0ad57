//! Task execution pipeline.
//!
//! `TaskExecutor` turns one [`TaskDescriptor`] into delivered artifacts:
//! open a session, navigate, settle, strip unwanted elements, run the
//! task's page actions, extract HTML, capture the screenshot if asked,
//! convert to Markdown, deliver. Rendering, conversion, and delivery are
//! all collaborator traits; this module only sequences them.
//!
//! The whole pipeline races a wall-clock deadline of the configured base
//! timeout plus the task's own settle delay. On timeout the renderer
//! session is force-closed; on every other exit path it is closed by the
//! pipeline itself. The session lives in a shared slot so exactly one of
//! those paths wins.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{sleep, timeout};

use forager_domain::{Error, ExecutorConfig, Result};
use forager_protocol::{PageAction, TaskDescriptor};

use crate::renderer::{PageCommand, PageSession, Renderer};
use crate::stitch;
use crate::transform::HtmlTransformer;
use crate::upload::{CompletionReport, HarvestArtifacts, Uploader};

/// Selectors stripped when a task names the `"default"` removal set (or
/// sends an empty explicit list): navigation chrome, non-content nodes,
/// and the usual overlay roles.
pub const DEFAULT_REMOVE_SELECTORS: [&str; 12] = [
    "nav",
    "footer",
    "script",
    "style",
    "noscript",
    "svg",
    r#"[role="alert"]"#,
    r#"[role="banner"]"#,
    r#"[role="dialog"]"#,
    r#"[role="alertdialog"]"#,
    r#"[role="region"][aria-label*="skip" i]"#,
    r#"[aria-modal="true"]"#,
];

/// Shared handle to the in-flight session so the timeout arm can reach it.
type SessionSlot = Arc<Mutex<Option<Arc<dyn PageSession>>>>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Executor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct TaskExecutor {
    renderer: Arc<dyn Renderer>,
    transformer: Arc<dyn HtmlTransformer>,
    uploader: Arc<dyn Uploader>,
    config: ExecutorConfig,
}

impl TaskExecutor {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        transformer: Arc<dyn HtmlTransformer>,
        uploader: Arc<dyn Uploader>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            renderer,
            transformer,
            uploader,
            config,
        }
    }

    /// Run one task end to end and file its completion report.
    ///
    /// Errors abort the remaining steps and surface to the caller; the
    /// caller (the connection manager's dispatch) logs and moves on, so a
    /// failed task never takes the connection down with it.
    pub async fn process(&self, task: &TaskDescriptor) -> Result<CompletionReport> {
        let deadline_ms = (self.config.base_timeout_secs + task.wait_before_secs) * 1000;
        let slot: SessionSlot = Arc::new(Mutex::new(None));

        tracing::info!(record_id = %task.record_id, url = %task.url, "task started");

        match timeout(Duration::from_millis(deadline_ms), self.run(task, &slot)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                let stale = slot.lock().take();
                if let Some(session) = stale {
                    session.close().await;
                }
                tracing::warn!(record_id = %task.record_id, deadline_ms, "task deadline exceeded");
                Err(Error::TaskTimeout(deadline_ms))
            }
        }
    }

    async fn run(&self, task: &TaskDescriptor, slot: &SessionSlot) -> Result<CompletionReport> {
        let session = self.renderer.open(task.window_size()).await?;
        *slot.lock() = Some(Arc::clone(&session));

        let harvested = self.harvest(task, session.as_ref()).await;

        // Take before closing so the timeout arm cannot double-close.
        let owned = slot.lock().take();
        if let Some(session) = owned {
            session.close().await;
        }

        let artifacts = harvested?;
        self.uploader.deliver(task, artifacts).await
    }

    // ── pipeline steps ───────────────────────────────────────────────

    async fn harvest(
        &self,
        task: &TaskDescriptor,
        session: &dyn PageSession,
    ) -> Result<HarvestArtifacts> {
        session.navigate(&task.url).await?;
        if task.wait_before_secs > 0 {
            sleep(Duration::from_secs(task.wait_before_secs)).await;
        }

        self.strip_selectors(task, session).await?;

        for action in &task.actions {
            self.apply_action(action, session).await?;
        }

        let html = session.execute(PageCommand::ExtractHtml).await?.into_html()?;

        let screenshot = if task.want_screenshot {
            let png = if task.full_page_screenshot {
                self.capture_full_page(task, session).await?
            } else {
                session.capture().await?
            };
            Some(png)
        } else {
            None
        };

        let markdown = self.transformer.transform(&html);

        Ok(HarvestArtifacts {
            html: task.save_html.then_some(html),
            markdown: task.save_markdown.then_some(markdown),
            screenshot,
        })
    }

    /// Remove elements the task does not want in the harvest.
    ///
    /// `"default"` (and an explicit empty list) selects the built-in set;
    /// `""`/`"none"` disables removal; anything else is a JSON array of
    /// selectors. Unparseable selector JSON is logged and skipped, never
    /// fatal.
    async fn strip_selectors(
        &self,
        task: &TaskDescriptor,
        session: &dyn PageSession,
    ) -> Result<()> {
        let Some(raw) = task.remove_css_selectors.as_deref() else {
            return Ok(());
        };

        let selectors: Vec<String> = match raw {
            "" | "none" => return Ok(()),
            "default" => default_selectors(),
            json => match serde_json::from_str::<Vec<String>>(json) {
                Ok(list) if list.is_empty() => default_selectors(),
                Ok(list) => list,
                Err(e) => {
                    tracing::warn!(
                        record_id = %task.record_id,
                        error = %e,
                        "unparseable removal selectors, skipping"
                    );
                    return Ok(());
                }
            },
        };

        session
            .execute(PageCommand::RemoveElements { selectors })
            .await?;
        Ok(())
    }

    async fn apply_action(&self, action: &PageAction, session: &dyn PageSession) -> Result<()> {
        let command = match action {
            PageAction::Wait { milliseconds } => {
                sleep(Duration::from_millis(*milliseconds)).await;
                return Ok(());
            }
            PageAction::Click { selector } => PageCommand::Click {
                selector: selector.clone(),
            },
            PageAction::Write { text } => PageCommand::InsertText { text: text.clone() },
            PageAction::FillInput { selector, value }
            | PageAction::FillTextarea { selector, value }
            | PageAction::Select { selector, value } => PageCommand::SetValue {
                selector: selector.clone(),
                value: value.clone(),
            },
            PageAction::FillForm { selector, fields } => PageCommand::FillForm {
                selector: selector.clone(),
                fields: fields.clone(),
            },
            PageAction::Press { key } => PageCommand::KeyPress { key: key.clone() },
            PageAction::Scroll { direction, amount } => {
                let (dx, dy) = direction.offsets(*amount);
                PageCommand::ScrollBy { dx, dy }
            }
            PageAction::Unknown { kind } => {
                tracing::warn!(kind = %kind, "unknown page action, skipping");
                return Ok(());
            }
        };

        session.execute(command).await?;
        Ok(())
    }

    /// Scroll-and-stitch capture: step down the page one viewport at a
    /// time (bounded by `max_scroll_steps`), capture each stop, composite.
    async fn capture_full_page(
        &self,
        task: &TaskDescriptor,
        session: &dyn PageSession,
    ) -> Result<Vec<u8>> {
        let viewport_height = u64::from(task.window_size().height.max(1));
        let total_height = session
            .execute(PageCommand::MeasureHeight)
            .await?
            .into_height()?;

        let steps = total_height
            .div_ceil(viewport_height)
            .min(u64::from(self.config.max_scroll_steps));

        let mut captures = Vec::new();
        for i in 0..steps {
            let offset = i * viewport_height;
            if offset >= total_height {
                break;
            }
            session.execute(PageCommand::ScrollTo { y: offset }).await?;
            if self.config.scroll_settle_ms > 0 {
                sleep(Duration::from_millis(self.config.scroll_settle_ms)).await;
            }
            captures.push(session.capture().await?);
        }

        tracing::debug!(
            record_id = %task.record_id,
            total_height,
            captures = captures.len(),
            "full page capture complete"
        );
        stitch::stitch_vertical(&captures)
    }
}

fn default_selectors() -> Vec<String> {
    DEFAULT_REMOVE_SELECTORS
        .iter()
        .map(ToString::to_string)
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use forager_protocol::WindowSize;

    use crate::renderer::{CommandOutput, StaticRenderer};
    use crate::transform::MarkdownTransformer;

    // ── fakes ────────────────────────────────────────────────────────

    /// Uploader that records what it was handed instead of shipping it.
    #[derive(Default)]
    struct RecordingUploader {
        delivered: Mutex<Vec<CompletionReport>>,
    }

    #[async_trait]
    impl Uploader for RecordingUploader {
        async fn deliver(
            &self,
            task: &TaskDescriptor,
            artifacts: HarvestArtifacts,
        ) -> Result<CompletionReport> {
            let report = CompletionReport::for_task(task, &artifacts);
            self.delivered.lock().push(report.clone());
            Ok(report)
        }
    }

    /// Session that records every command and serves canned outputs.
    struct RecordingSession {
        commands: Mutex<Vec<PageCommand>>,
        page_height: u64,
        closed: AtomicBool,
    }

    impl RecordingSession {
        fn new(page_height: u64) -> Self {
            Self {
                commands: Mutex::new(Vec::new()),
                page_height,
                closed: AtomicBool::new(false),
            }
        }

        fn tiny_png() -> Vec<u8> {
            let img = image::RgbaImage::from_pixel(4, 4, image::Rgba([1, 2, 3, 255]));
            let mut buf = Vec::new();
            img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
                .unwrap();
            buf
        }
    }

    #[async_trait]
    impl PageSession for RecordingSession {
        async fn navigate(&self, _url: &str) -> Result<()> {
            Ok(())
        }

        async fn execute(&self, command: PageCommand) -> Result<CommandOutput> {
            let output = match &command {
                PageCommand::ExtractHtml => CommandOutput::Html("<p>recorded</p>".into()),
                PageCommand::MeasureHeight => CommandOutput::Height(self.page_height),
                _ => CommandOutput::Done,
            };
            self.commands.lock().push(command);
            Ok(output)
        }

        async fn capture(&self) -> Result<Vec<u8>> {
            Ok(Self::tiny_png())
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    struct RecordingRenderer {
        session: Arc<RecordingSession>,
    }

    #[async_trait]
    impl Renderer for RecordingRenderer {
        async fn open(&self, _size: WindowSize) -> Result<Arc<dyn PageSession>> {
            Ok(self.session.clone() as Arc<dyn PageSession>)
        }
    }

    /// Renderer whose sessions never finish navigating.
    struct HangingSession {
        closed: AtomicBool,
    }

    #[async_trait]
    impl PageSession for HangingSession {
        async fn navigate(&self, _url: &str) -> Result<()> {
            sleep(Duration::from_secs(30)).await;
            Ok(())
        }
        async fn execute(&self, _command: PageCommand) -> Result<CommandOutput> {
            Ok(CommandOutput::Done)
        }
        async fn capture(&self) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    struct HangingRenderer {
        session: Arc<HangingSession>,
    }

    #[async_trait]
    impl Renderer for HangingRenderer {
        async fn open(&self, _size: WindowSize) -> Result<Arc<dyn PageSession>> {
            Ok(self.session.clone() as Arc<dyn PageSession>)
        }
    }

    // ── helpers ──────────────────────────────────────────────────────

    fn fast_config() -> ExecutorConfig {
        ExecutorConfig {
            base_timeout_secs: 60,
            scroll_settle_ms: 0,
            max_scroll_steps: 20,
        }
    }

    fn task(json: serde_json::Value) -> TaskDescriptor {
        serde_json::from_value(json).unwrap()
    }

    fn executor_with(renderer: Arc<dyn Renderer>, config: ExecutorConfig) -> (TaskExecutor, Arc<RecordingUploader>) {
        let uploader = Arc::new(RecordingUploader::default());
        let exec = TaskExecutor::new(
            renderer,
            Arc::new(MarkdownTransformer),
            uploader.clone(),
            config,
        );
        (exec, uploader)
    }

    // ── tests ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn minimal_task_delivers_html_and_markdown() {
        let renderer = Arc::new(
            StaticRenderer::new().with_fallback("<html><body><h1>Hi</h1></body></html>"),
        );
        let (exec, uploader) = executor_with(renderer, fast_config());

        let report = exec
            .process(&task(serde_json::json!({
                "url": "https://example.com",
                "recordID": "r1"
            })))
            .await
            .unwrap();

        assert_eq!(report.html_file_name, "text_r1.txt");
        assert_eq!(report.markdown_file_name, "markDown_r1.txt");
        assert_eq!(report.screenshot_file_name, "--");
        assert_eq!(uploader.delivered.lock().len(), 1);
    }

    #[tokio::test]
    async fn save_flags_suppress_artifacts() {
        let renderer = Arc::new(StaticRenderer::new().with_fallback("<p>x</p>"));
        let (exec, _uploader) = executor_with(renderer, fast_config());

        let report = exec
            .process(&task(serde_json::json!({
                "url": "https://example.com",
                "recordID": "r2",
                "saveHtml": false,
                "saveMarkdown": false
            })))
            .await
            .unwrap();

        assert_eq!(report.html_file_name, "--");
        assert_eq!(report.markdown_file_name, "--");
    }

    #[tokio::test]
    async fn actions_map_to_page_commands_and_unknown_is_skipped() {
        let session = Arc::new(RecordingSession::new(0));
        let renderer = Arc::new(RecordingRenderer {
            session: session.clone(),
        });
        let (exec, _uploader) = executor_with(renderer, fast_config());

        exec.process(&task(serde_json::json!({
            "url": "https://example.com",
            "recordID": "r3",
            "actions": [
                {"type": "click", "selector": "#go"},
                {"type": "fill_input", "selector": "#q", "value": "rust"},
                {"type": "scroll", "direction": "up", "amount": 100},
                {"type": "hover", "selector": "#menu"}
            ]
        })))
        .await
        .unwrap();

        let commands = session.commands.lock().clone();
        assert_eq!(
            commands,
            vec![
                PageCommand::Click {
                    selector: "#go".into()
                },
                PageCommand::SetValue {
                    selector: "#q".into(),
                    value: "rust".into()
                },
                PageCommand::ScrollBy { dx: 0, dy: -100 },
                PageCommand::ExtractHtml,
            ]
        );
        assert!(session.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn default_marker_strips_the_builtin_selector_set() {
        let session = Arc::new(RecordingSession::new(0));
        let renderer = Arc::new(RecordingRenderer {
            session: session.clone(),
        });
        let (exec, _uploader) = executor_with(renderer, fast_config());

        exec.process(&task(serde_json::json!({
            "url": "https://example.com",
            "recordID": "r4",
            "removeCSSselectors": "default"
        })))
        .await
        .unwrap();

        let commands = session.commands.lock().clone();
        match &commands[0] {
            PageCommand::RemoveElements { selectors } => {
                assert_eq!(selectors.len(), DEFAULT_REMOVE_SELECTORS.len());
                assert!(selectors.iter().any(|s| s == "nav"));
            }
            other => panic!("expected RemoveElements first, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn garbled_selector_json_is_not_fatal() {
        let session = Arc::new(RecordingSession::new(0));
        let renderer = Arc::new(RecordingRenderer {
            session: session.clone(),
        });
        let (exec, _uploader) = executor_with(renderer, fast_config());

        exec.process(&task(serde_json::json!({
            "url": "https://example.com",
            "recordID": "r5",
            "removeCSSselectors": "{not json"
        })))
        .await
        .unwrap();

        let commands = session.commands.lock().clone();
        assert!(
            !commands
                .iter()
                .any(|c| matches!(c, PageCommand::RemoveElements { .. })),
            "removal should be skipped on parse failure"
        );
    }

    #[tokio::test]
    async fn full_page_capture_stitches_one_frame_per_viewport() {
        // Page is exactly five viewports tall (default viewport 1024).
        let session = Arc::new(RecordingSession::new(5 * 1024));
        let renderer = Arc::new(RecordingRenderer {
            session: session.clone(),
        });
        let (exec, _uploader) = executor_with(renderer, fast_config());

        let report = exec
            .process(&task(serde_json::json!({
                "url": "https://example.com",
                "recordID": "r6",
                "htmlVisualizer": true,
                "fullpageScreenshot": true
            })))
            .await
            .unwrap();

        assert_eq!(report.screenshot_file_name, "image_r6.png");

        let commands = session.commands.lock().clone();
        let scrolls: Vec<u64> = commands
            .iter()
            .filter_map(|c| match c {
                PageCommand::ScrollTo { y } => Some(*y),
                _ => None,
            })
            .collect();
        assert_eq!(scrolls, vec![0, 1024, 2048, 3072, 4096]);
    }

    #[tokio::test]
    async fn deadline_closes_the_session_and_raises_timeout() {
        let session = Arc::new(HangingSession {
            closed: AtomicBool::new(false),
        });
        let renderer = Arc::new(HangingRenderer {
            session: session.clone(),
        });
        let (exec, uploader) = executor_with(
            renderer,
            ExecutorConfig {
                base_timeout_secs: 1,
                scroll_settle_ms: 0,
                max_scroll_steps: 20,
            },
        );

        let err = exec
            .process(&task(serde_json::json!({
                "url": "https://slow.example.com",
                "recordID": "r7"
            })))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::TaskTimeout(1000)));
        assert!(session.closed.load(Ordering::SeqCst));
        assert!(uploader.delivered.lock().is_empty());
    }
}
