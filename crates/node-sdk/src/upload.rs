//! Artifact delivery to the harvest store.
//!
//! Each completed task produces up to three artifacts (raw HTML, the
//! Markdown rendering, a PNG screenshot). Delivery is a three-step
//! protocol against the control plane:
//!
//!   1. `GET {signed_url_endpoint}?recordID=..` returns one pre-signed
//!      PUT target per artifact kind.
//!   2. The artifacts are PUT in parallel, each with its content type
//!      and a public-read ACL.
//!   3. `POST {report_endpoint}` records which files exist; absent
//!      artifacts are reported with the `--` placeholder so the backend
//!      can tell "skipped" from "lost".
//!
//! Transient (5xx / transport) failures retry with exponential back-off;
//! 4xx responses are permanent and fail the task.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};

use forager_domain::{Error, Result, UploadConfig};
use forager_protocol::TaskDescriptor;

/// File-name stand-in for an artifact that was not produced.
pub const PLACEHOLDER_FILE_NAME: &str = "--";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Artifacts and wire shapes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything a task execution produced that is worth keeping.
#[derive(Debug, Default)]
pub struct HarvestArtifacts {
    pub html: Option<String>,
    pub markdown: Option<String>,
    /// PNG bytes, already stitched if the capture was full-page.
    pub screenshot: Option<Vec<u8>>,
}

/// Pre-signed PUT targets, one per artifact kind.
#[derive(Debug, Clone, Deserialize)]
pub struct SignedTargets {
    #[serde(rename = "uploadURL_html")]
    pub html: String,
    #[serde(rename = "uploadURL_markDown")]
    pub markdown: String,
    #[serde(rename = "uploadURL_htmlVisualizer")]
    pub screenshot: String,
}

/// Completion record POSTed after the artifacts are stored.
///
/// Field casing follows the control-plane API, not Rust convention.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletionReport {
    #[serde(rename = "recordID")]
    pub record_id: String,
    pub url: String,
    #[serde(rename = "htmlTransformer")]
    pub html_transformer: String,
    #[serde(rename = "orgId")]
    pub org_id: String,
    #[serde(rename = "htmlFileName")]
    pub html_file_name: String,
    #[serde(rename = "markdownFileName")]
    pub markdown_file_name: String,
    #[serde(rename = "htmlVisualizerFileName")]
    pub screenshot_file_name: String,
}

impl CompletionReport {
    /// Shape the report for a task, naming only the artifacts that exist.
    pub fn for_task(task: &TaskDescriptor, artifacts: &HarvestArtifacts) -> Self {
        let id = &task.record_id;
        Self {
            record_id: id.clone(),
            url: task.url.clone(),
            html_transformer: task.html_transformer.clone(),
            org_id: task.org_id.clone(),
            html_file_name: artifacts
                .html
                .as_ref()
                .map(|_| format!("text_{id}.txt"))
                .unwrap_or_else(|| PLACEHOLDER_FILE_NAME.to_string()),
            markdown_file_name: artifacts
                .markdown
                .as_ref()
                .map(|_| format!("markDown_{id}.txt"))
                .unwrap_or_else(|| PLACEHOLDER_FILE_NAME.to_string()),
            screenshot_file_name: artifacts
                .screenshot
                .as_ref()
                .map(|_| format!("image_{id}.png"))
                .unwrap_or_else(|| PLACEHOLDER_FILE_NAME.to_string()),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Uploader trait + HTTP implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Delivery boundary. Hosts can swap in their own sink for tests or for
/// air-gapped deployments.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Store the artifacts and record completion. Returns the report
    /// that was (or would have been) filed.
    async fn deliver(
        &self,
        task: &TaskDescriptor,
        artifacts: HarvestArtifacts,
    ) -> Result<CompletionReport>;
}

/// The real delivery path over HTTPS.
///
/// Created once and reused; the underlying `reqwest::Client` keeps a
/// connection pool.
#[derive(Debug, Clone)]
pub struct HttpUploader {
    http: Client,
    signed_url_endpoint: String,
    report_endpoint: String,
    max_retries: u32,
}

impl HttpUploader {
    pub fn new(cfg: &UploadConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .map_err(|e| Error::Upload(e.to_string()))?;

        Ok(Self {
            http,
            signed_url_endpoint: cfg.signed_url_endpoint.trim_end_matches('/').to_owned(),
            report_endpoint: cfg.report_endpoint.trim_end_matches('/').to_owned(),
            max_retries: cfg.max_retries,
        })
    }

    // ── retry engine ─────────────────────────────────────────────────

    /// Execute a request with retry + exponential back-off on transient
    /// errors.
    ///
    /// * Retries on 5xx status codes and on transport failures.
    /// * Does **not** retry on 4xx (client errors are permanent).
    async fn execute_with_retry(
        &self,
        endpoint: &str,
        build_request: impl Fn() -> RequestBuilder,
    ) -> Result<Response> {
        let mut last_err: Option<Error> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = Duration::from_millis(250 * 2u64.pow(attempt - 1));
                tokio::time::sleep(backoff).await;
            }

            match build_request().send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_server_error() {
                        let body = resp.text().await.unwrap_or_default();
                        tracing::warn!(
                            endpoint,
                            status = status.as_u16(),
                            attempt,
                            "transient delivery failure, will retry"
                        );
                        last_err =
                            Some(Error::Upload(format!("{endpoint} returned {status}: {body}")));
                        continue;
                    }
                    if status.is_client_error() {
                        let body = resp.text().await.unwrap_or_default();
                        return Err(Error::Upload(format!(
                            "{endpoint} returned {status}: {body}"
                        )));
                    }
                    return Ok(resp);
                }
                Err(e) => {
                    tracing::warn!(endpoint, error = %e, attempt, "delivery request failed, will retry");
                    last_err = Some(Error::Upload(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| Error::Upload(format!("{endpoint}: all retries exhausted"))))
    }

    async fn fetch_targets(&self, record_id: &str) -> Result<SignedTargets> {
        let resp = self
            .execute_with_retry("GET signed targets", || {
                self.http
                    .get(&self.signed_url_endpoint)
                    .query(&[("recordID", record_id)])
            })
            .await?;

        let body = resp.text().await.map_err(|e| Error::Upload(e.to_string()))?;
        serde_json::from_str(&body)
            .map_err(|e| Error::Upload(format!("failed to parse signed targets: {e}: {body}")))
    }

    async fn put_artifact(
        &self,
        url: &str,
        body: Vec<u8>,
        content_type: &'static str,
    ) -> Result<()> {
        self.execute_with_retry(&format!("PUT {content_type}"), || {
            self.http
                .put(url)
                .header("Content-Type", content_type)
                .header("x-amz-acl", "public-read")
                .body(body.clone())
        })
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn deliver(
        &self,
        task: &TaskDescriptor,
        artifacts: HarvestArtifacts,
    ) -> Result<CompletionReport> {
        let report = CompletionReport::for_task(task, &artifacts);

        let has_any =
            artifacts.html.is_some() || artifacts.markdown.is_some() || artifacts.screenshot.is_some();
        if has_any {
            let targets = self.fetch_targets(&task.record_id).await?;

            let put_html = async {
                match &artifacts.html {
                    Some(html) => {
                        self.put_artifact(&targets.html, html.clone().into_bytes(), "text/html")
                            .await
                    }
                    None => Ok(()),
                }
            };
            let put_markdown = async {
                match &artifacts.markdown {
                    Some(md) => {
                        self.put_artifact(&targets.markdown, md.clone().into_bytes(), "text/markdown")
                            .await
                    }
                    None => Ok(()),
                }
            };
            let put_screenshot = async {
                match &artifacts.screenshot {
                    Some(png) => {
                        self.put_artifact(&targets.screenshot, png.clone(), "image/png")
                            .await
                    }
                    None => Ok(()),
                }
            };
            tokio::try_join!(put_html, put_markdown, put_screenshot)?;
        }

        self.execute_with_retry("POST completion report", || {
            self.http.post(&self.report_endpoint).json(&report)
        })
        .await?;

        tracing::debug!(
            record_id = %report.record_id,
            html = %report.html_file_name,
            markdown = %report.markdown_file_name,
            screenshot = %report.screenshot_file_name,
            "task artifacts delivered"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(record_id: &str) -> TaskDescriptor {
        serde_json::from_value(serde_json::json!({
            "url": "https://example.com",
            "recordID": record_id,
            "orgId": "org-1",
        }))
        .unwrap()
    }

    #[test]
    fn report_names_only_produced_artifacts() {
        let artifacts = HarvestArtifacts {
            html: Some("<p>x</p>".into()),
            markdown: None,
            screenshot: Some(vec![1, 2, 3]),
        };
        let report = CompletionReport::for_task(&task("r42"), &artifacts);

        assert_eq!(report.html_file_name, "text_r42.txt");
        assert_eq!(report.markdown_file_name, "--");
        assert_eq!(report.screenshot_file_name, "image_r42.png");
    }

    #[test]
    fn report_serializes_with_control_plane_casing() {
        let report = CompletionReport::for_task(&task("r1"), &HarvestArtifacts::default());
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["recordID"], "r1");
        assert_eq!(value["orgId"], "org-1");
        assert_eq!(value["htmlTransformer"], "none");
        assert_eq!(value["htmlFileName"], "--");
        assert_eq!(value["markdownFileName"], "--");
        assert_eq!(value["htmlVisualizerFileName"], "--");
    }

    #[test]
    fn signed_targets_parse_from_api_shape() {
        let targets: SignedTargets = serde_json::from_str(
            r#"{
                "uploadURL_html": "https://s3/a",
                "uploadURL_markDown": "https://s3/b",
                "uploadURL_htmlVisualizer": "https://s3/c",
                "uploadURL": "https://s3/legacy"
            }"#,
        )
        .unwrap();

        assert_eq!(targets.html, "https://s3/a");
        assert_eq!(targets.markdown, "https://s3/b");
        assert_eq!(targets.screenshot, "https://s3/c");
    }

    #[test]
    fn markdown_file_keeps_its_historical_name() {
        let artifacts = HarvestArtifacts {
            markdown: Some("# hi".into()),
            ..Default::default()
        };
        let report = CompletionReport::for_task(&task("abc"), &artifacts);
        assert_eq!(report.markdown_file_name, "markDown_abc.txt");
    }
}
