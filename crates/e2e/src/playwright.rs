//! Playwright-driven fenced frame embedding

use async_trait::async_trait;
use parking_lot::Mutex;
use std::process::{Command, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command as TokioCommand};
use tracing::{debug, info, warn};
use url::Url;

use crate::embedder::FrameEmbedder;
use crate::error::{E2eError, E2eResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name {
            "firefox" => Browser::Firefox,
            "webkit" => Browser::Webkit,
            _ => Browser::Chromium,
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    /// Top-level page the fenced frames are appended to. Relative frame
    /// URLs were resolved against it, so it is the harness base URL.
    pub harness_page_url: Url,
    pub browser: Browser,
    pub headless: bool,
    /// Extra browser launch arguments
    pub launch_args: Vec<String>,
    /// How long each page stays open after embedding
    pub hold: Duration,
    /// Timeout for the page to load and the frame to be appended
    pub embed_timeout: Duration,
}

impl PlaywrightConfig {
    pub fn new(harness_page_url: Url) -> Self {
        Self {
            harness_page_url,
            browser: Browser::Chromium,
            headless: true,
            launch_args: vec!["--enable-features=FencedFrames,PrivateNetworkAccessRespectPreflightResults".to_string()],
            hold: Duration::from_secs(15),
            embed_timeout: Duration::from_secs(30),
        }
    }
}

struct Session {
    child: Child,
    // Keeps the script on disk for the lifetime of the browser process.
    _script_dir: tempfile::TempDir,
}

/// Embeds fenced frames in a real browser, one Playwright page per frame
pub struct PlaywrightEmbedder {
    config: PlaywrightConfig,
    sessions: Mutex<Vec<Session>>,
}

impl PlaywrightEmbedder {
    pub fn new(config: PlaywrightConfig) -> E2eResult<Self> {
        Self::check_playwright_installed()?;
        Ok(Self {
            config,
            sessions: Mutex::new(Vec::new()),
        })
    }

    fn check_playwright_installed() -> E2eResult<()> {
        let output = Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match output {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }

    /// Build the Node script that appends a fenced frame navigated to `url`
    pub fn build_script(&self, url: &Url) -> E2eResult<String> {
        let harness_page = serde_json::to_string(self.config.harness_page_url.as_str())?;
        let frame_url = serde_json::to_string(url.as_str())?;
        let launch_args = serde_json::to_string(&self.config.launch_args)?;

        Ok(format!(
            r#"
const {{ chromium, firefox, webkit }} = require('playwright');

(async () => {{
  const browser = await {browser}.launch({{ headless: {headless}, args: {launch_args} }});
  const context = await browser.newContext({{ ignoreHTTPSErrors: true }});
  const page = await context.newPage();

  try {{
    await page.goto({harness_page});
    await page.evaluate((src) => {{
      const frame = document.createElement('fencedframe');
      frame.config = new FencedFrameConfig(src);
      document.body.append(frame);
    }}, {frame_url});
    console.log(JSON.stringify({{ embedded: true }}));
    await page.waitForTimeout({hold_ms});
  }} catch (error) {{
    console.log(JSON.stringify({{ embedded: false, error: error.message }}));
    process.exitCode = 1;
  }} finally {{
    await browser.close();
  }}
}})();
"#,
            browser = self.config.browser.as_str(),
            headless = self.config.headless,
            launch_args = launch_args,
            harness_page = harness_page,
            frame_url = frame_url,
            hold_ms = self.config.hold.as_millis(),
        ))
    }

    /// Kill all browsers that are still holding pages open
    pub async fn close_all(&self) {
        let sessions: Vec<Session> = std::mem::take(&mut *self.sessions.lock());
        for mut session in sessions {
            if let Err(e) = session.child.kill().await {
                debug!("Browser already exited: {}", e);
            }
        }
    }

    async fn wait_embedded(child: &mut Child) -> E2eResult<()> {
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Playwright("stdout not captured".to_string()))?;
        let mut lines = BufReader::new(stdout).lines();

        while let Some(line) = lines.next_line().await? {
            let Ok(report) = serde_json::from_str::<serde_json::Value>(&line) else {
                debug!("[playwright] {}", line);
                continue;
            };
            return match report.get("embedded").and_then(|v| v.as_bool()) {
                Some(true) => Ok(()),
                _ => Err(E2eError::Playwright(format!(
                    "Embedding failed: {}",
                    report.get("error").and_then(|v| v.as_str()).unwrap_or("unknown error")
                ))),
            };
        }

        Err(E2eError::Playwright(
            "Browser exited before the frame was embedded".to_string(),
        ))
    }
}

#[async_trait]
impl FrameEmbedder for PlaywrightEmbedder {
    async fn embed_fenced_frame(&self, url: &Url) -> E2eResult<()> {
        let script = self.build_script(url)?;

        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("embed.js");
        std::fs::write(&script_path, script)?;

        debug!("Embedding {} via {}", url, script_path.display());

        let mut child = TokioCommand::new("node")
            .arg(&script_path)
            .current_dir(script_dir.path())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let embedded =
            tokio::time::timeout(self.config.embed_timeout, Self::wait_embedded(&mut child)).await;
        match embedded {
            Ok(Ok(())) => {
                info!("Embedded fenced frame for {}", url.path());
                self.sessions.lock().push(Session {
                    child,
                    _script_dir: script_dir,
                });
                Ok(())
            }
            Ok(Err(e)) => {
                warn!("Playwright failed to embed {}: {}", url, e);
                Err(e)
            }
            Err(_) => Err(E2eError::Timeout(format!("embedding {}", url))),
        }
    }
}
