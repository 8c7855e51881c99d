//! Playwright integration for headless browser automation.
//!
//! This module contains the inline Node.js driver script, the JSON-line
//! protocol spoken with it, error mapping, and availability checks for
//! Node.js and Playwright.

use std::io;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::session::{BrowserLauncher, BrowserSession, FrameHandle, FrameLoad, LoadPolicy};
use crate::{ExtractError, Result};

/// Default timeout for page navigation.
pub const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for checking node/playwright availability.
pub(crate) const NODE_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a graceful close may take before the driver is killed.
pub(crate) const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Script to check if Playwright is installed.
const PLAYWRIGHT_CHECK_SCRIPT: &str = "require('playwright'); process.stdout.write('ok');";

/// Long-lived driver: one browser, one context, one page per process.
/// Commands arrive one JSON object per line on stdin and are answered in order.
pub(crate) const PLAYWRIGHT_DRIVER_SCRIPT: &str = r#"
const readline = require('readline');

let browser;
let page;

function reply(id, body) {
  process.stdout.write(JSON.stringify(Object.assign({ id }, body)) + '\n');
}

function requireFrame(name) {
  const frame = page ? page.frame({ name }) : null;
  if (!frame) {
    const err = new Error(`frame ${name} is no longer attached`);
    err.name = 'FrameMissing';
    throw err;
  }
  return frame;
}

async function handle(cmd) {
  switch (cmd.op) {
    case 'open': {
      const { chromium } = require('playwright');
      browser = await chromium.launch({ headless: cmd.headless !== false });
      const context = await browser.newContext();
      page = await context.newPage();
      return {};
    }
    case 'navigate': {
      const response = await page.goto(cmd.url, { waitUntil: cmd.waitUntil, timeout: cmd.timeoutMs });
      return { httpStatus: response ? response.status() : null };
    }
    case 'frame': {
      return { found: !!page.frame({ name: cmd.name }) };
    }
    case 'waitFrame': {
      const frame = requireFrame(cmd.name);
      try {
        await frame.waitForLoadState('load', { timeout: cmd.timeoutMs });
        return { loaded: true };
      } catch (err) {
        return { loaded: false, message: err && err.message ? err.message : String(err) };
      }
    }
    case 'frameContent': {
      return { content: await requireFrame(cmd.name).content() };
    }
    case 'close': {
      if (browser) {
        const current = browser;
        browser = undefined;
        page = undefined;
        await current.close();
      }
      return {};
    }
    default:
      throw new Error(`unknown op ${cmd.op}`);
  }
}

const rl = readline.createInterface({ input: process.stdin });
let queue = Promise.resolve();

rl.on('line', (line) => {
  queue = queue.then(async () => {
    let cmd;
    try {
      cmd = JSON.parse(line);
    } catch (err) {
      reply(null, { status: 'error', name: 'Protocol', message: 'invalid command line' });
      return;
    }
    try {
      const body = await handle(cmd);
      reply(cmd.id, Object.assign({ status: 'ok' }, body));
    } catch (err) {
      const message = err && err.message ? err.message : String(err);
      reply(cmd.id, { status: 'error', name: err && err.name ? err.name : 'Error', message });
    }
  });
});

rl.on('close', () => {
  queue = queue.then(async () => {
    if (browser) {
      await browser.close().catch(() => {});
    }
    setTimeout(() => process.exit(0), 1000).unref();
  });
});
"#;

/// Options for launching the Playwright driver.
#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// The Node.js command to use (default: "node").
    pub node_command: String,
    /// Whether to run in headless mode.
    pub headless: bool,
    /// Timeout for page navigation.
    pub navigation_timeout: Duration,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            node_command: "node".to_string(),
            headless: true,
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
        }
    }
}

/// Launches one Node driver process per session.
#[derive(Debug, Clone, Default)]
pub struct PlaywrightLauncher {
    options: DriverOptions,
}

impl PlaywrightLauncher {
    pub fn new(options: DriverOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl BrowserLauncher for PlaywrightLauncher {
    async fn open(&self) -> Result<Box<dyn BrowserSession>> {
        // Fail fast if Node is missing to avoid spawning Playwright unnecessarily.
        ensure_node_available(&self.options.node_command).await?;
        ensure_playwright_available(&self.options.node_command).await?;

        let mut session = PlaywrightSession::spawn(&self.options)?;
        let reply = session
            .request(DriverCommand::Open {
                headless: self.options.headless,
            })
            .await;

        match reply.and_then(|reply| reply.into_ok(map_playwright_status_error)) {
            Ok(_) => {
                debug!(headless = self.options.headless, "browser session opened");
                Ok(Box::new(session))
            }
            Err(err) => {
                if let Err(close_err) = session.close().await {
                    warn!(error = %close_err, "failed to tear down driver after launch error");
                }
                Err(err)
            }
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub(crate) enum DriverCommand<'a> {
    Open {
        headless: bool,
    },
    Navigate {
        url: &'a str,
        wait_until: LoadPolicy,
        timeout_ms: u64,
    },
    Frame {
        name: &'a str,
    },
    WaitFrame {
        name: &'a str,
        timeout_ms: u64,
    },
    FrameContent {
        name: &'a str,
    },
    Close,
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    id: u64,
    #[serde(flatten)]
    command: DriverCommand<'a>,
}

/// One reply line from the driver.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DriverReply {
    pub id: Option<u64>,
    pub status: String,
    pub name: Option<String>,
    pub message: Option<String>,
    pub http_status: Option<u16>,
    pub found: Option<bool>,
    pub loaded: Option<bool>,
    pub content: Option<String>,
}

impl DriverReply {
    fn into_ok(self, on_error: impl FnOnce(&str, String) -> ExtractError) -> Result<Self> {
        if self.status == "ok" {
            return Ok(self);
        }
        let name = self.name.unwrap_or_else(|| "Error".to_string());
        let message = self
            .message
            .unwrap_or_else(|| "no additional details".to_string());
        Err(on_error(&name, message))
    }
}

/// A running Node driver holding one browser, context and page.
pub struct PlaywrightSession {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
    stderr_task: Option<JoinHandle<Vec<u8>>>,
    navigation_timeout: Duration,
    /// How long a dead-looking driver gets to exit and flush stderr.
    exit_grace: Duration,
    next_id: u64,
    closed: bool,
}

impl PlaywrightSession {
    fn spawn(options: &DriverOptions) -> Result<Self> {
        let mut cmd = Command::new(&options.node_command);
        cmd.arg("-e")
            .arg(PLAYWRIGHT_DRIVER_SCRIPT)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Self::start(cmd, &options.node_command, options.navigation_timeout)
    }

    fn start(mut cmd: Command, program: &str, navigation_timeout: Duration) -> Result<Self> {
        let mut child = cmd
            .spawn()
            .map_err(|err| map_spawn_error(err, program))?;

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExtractError::internal("browser driver stdout unavailable"))?;
        let stderr_pipe = child.stderr.take();

        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut err) = stderr_pipe {
                let _ = err.read_to_end(&mut buf).await;
            }
            buf
        });

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            stderr_task: Some(stderr_task),
            navigation_timeout,
            exit_grace: CLOSE_TIMEOUT,
            next_id: 0,
            closed: false,
        })
    }

    async fn request(&mut self, command: DriverCommand<'_>) -> Result<DriverReply> {
        self.next_id += 1;
        let id = self.next_id;
        let mut line = serde_json::to_string(&Envelope { id, command })
            .map_err(|e| ExtractError::internal(format!("encode driver command: {e}")))?;
        line.push('\n');

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ExtractError::internal("browser driver input already closed"))?;
        if let Err(err) = write_line(stdin, &line).await {
            debug!(error = %err, "driver stdin write failed");
            return Err(self.driver_exited().await);
        }

        loop {
            let Some(line) = self.stdout.next_line().await? else {
                return Err(self.driver_exited().await);
            };
            let reply: DriverReply = match serde_json::from_str(&line) {
                Ok(reply) => reply,
                Err(_) => {
                    debug!(line = %line, "ignoring non-protocol driver output");
                    continue;
                }
            };
            // Replies to abandoned (cancelled) commands are skipped.
            if reply.id == Some(id) {
                return Ok(reply);
            }
        }
    }

    async fn driver_exited(&mut self) -> ExtractError {
        let status = match tokio::time::timeout(self.exit_grace, self.child.wait()).await {
            Ok(Ok(status)) => status.to_string(),
            Ok(Err(_)) => "unknown".to_string(),
            Err(_) => {
                warn!("browser driver closed its output but kept running; killing it");
                self.kill().await;
                "killed".to_string()
            }
        };
        // Grandchildren may still hold the stderr pipe open.
        let stderr = match self.stderr_task.take() {
            Some(task) => match tokio::time::timeout(self.exit_grace, task).await {
                Ok(Ok(buf)) => buf,
                Ok(Err(_)) => Vec::new(),
                Err(_) => b"stderr unavailable".to_vec(),
            },
            None => Vec::new(),
        };
        map_playwright_error(status, &String::from_utf8_lossy(&stderr))
    }

    async fn kill(&mut self) {
        let _ = self.child.kill().await;
        let _ = self.child.wait().await;
    }
}

async fn write_line(stdin: &mut ChildStdin, line: &str) -> io::Result<()> {
    stdin.write_all(line.as_bytes()).await?;
    stdin.flush().await
}

#[async_trait]
impl BrowserSession for PlaywrightSession {
    async fn navigate(&mut self, url: &str, policy: LoadPolicy) -> Result<()> {
        let reply = self
            .request(DriverCommand::Navigate {
                url,
                wait_until: policy,
                timeout_ms: self.navigation_timeout.as_millis() as u64,
            })
            .await?
            .into_ok(|_, message| ExtractError::Navigation(message))?;

        match reply.http_status {
            Some(status) if !(200..300).contains(&status) => Err(ExtractError::Navigation(
                format!("page {url} responded with status {status}"),
            )),
            _ => Ok(()),
        }
    }

    async fn frame_by_name(&mut self, name: &str) -> Result<Option<FrameHandle>> {
        let reply = self
            .request(DriverCommand::Frame { name })
            .await?
            .into_ok(map_frame_error(name))?;
        Ok(reply.found.unwrap_or(false).then(|| FrameHandle {
            name: name.to_string(),
        }))
    }

    async fn wait_for_frame_load(
        &mut self,
        frame: &FrameHandle,
        timeout: Duration,
    ) -> Result<FrameLoad> {
        let reply = self
            .request(DriverCommand::WaitFrame {
                name: &frame.name,
                timeout_ms: timeout.as_millis() as u64,
            })
            .await?
            .into_ok(map_frame_error(&frame.name))?;
        if reply.loaded.unwrap_or(false) {
            Ok(FrameLoad::Loaded)
        } else {
            debug!(
                frame = %frame.name,
                reason = reply.message.as_deref().unwrap_or("timeout"),
                "frame load wait ended without load event"
            );
            Ok(FrameLoad::TimedOut)
        }
    }

    async fn frame_content(&mut self, frame: &FrameHandle) -> Result<String> {
        let reply = self
            .request(DriverCommand::FrameContent { name: &frame.name })
            .await?
            .into_ok(map_frame_error(&frame.name))?;
        reply
            .content
            .ok_or_else(|| ExtractError::internal("driver returned no frame content"))
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let graceful = tokio::time::timeout(CLOSE_TIMEOUT, async {
            let reply = self.request(DriverCommand::Close).await?;
            reply.into_ok(|_, message| ExtractError::internal(message))?;
            // EOF on stdin lets the driver exit on its own.
            self.stdin.take();
            self.child.wait().await.map_err(ExtractError::Io)
        })
        .await;

        match graceful {
            Ok(Ok(status)) => {
                debug!(%status, "browser driver exited");
                Ok(())
            }
            Ok(Err(err)) => {
                self.kill().await;
                Err(err)
            }
            Err(_) => {
                self.kill().await;
                Err(ExtractError::internal(format!(
                    "browser driver did not exit within {:?}; killed",
                    CLOSE_TIMEOUT
                )))
            }
        }
    }
}

fn map_frame_error(name: &str) -> impl FnOnce(&str, String) -> ExtractError + '_ {
    move |error_name, message| {
        if error_name == "FrameMissing" {
            ExtractError::FrameNotFound {
                name: name.to_string(),
            }
        } else {
            ExtractError::internal(format!("frame {name}: {message}"))
        }
    }
}

/// Maps a spawn error to an appropriate ExtractError.
pub(crate) fn map_spawn_error(err: io::Error, command: &str) -> ExtractError {
    if err.kind() == io::ErrorKind::NotFound {
        ExtractError::Config(format!(
            "Unable to spawn browser driver; '{}' was not found on PATH",
            command
        ))
    } else {
        ExtractError::Io(err)
    }
}

/// Maps driver stderr output to an appropriate ExtractError.
pub(crate) fn map_playwright_error(status_text: impl Into<String>, stderr: &str) -> ExtractError {
    let lower = stderr.to_ascii_lowercase();

    if lower.contains("cannot find module 'playwright'") {
        return ExtractError::Config(
            "Playwright npm package is missing; install with `npm install playwright`.".to_string(),
        );
    }

    if lower.contains("executable doesn't exist") {
        return ExtractError::Config(
            "Playwright chromium executable is missing; run `npx playwright install chromium`."
                .to_string(),
        );
    }

    ExtractError::Internal(format!(
        "Browser driver exited with status {}: {}",
        status_text.into(),
        stderr.trim()
    ))
}

/// Maps an error reply to the `open` command.
pub(crate) fn map_playwright_status_error(name: &str, message: String) -> ExtractError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("cannot find module 'playwright'") {
        ExtractError::Config(
            "Playwright npm package is missing; install with `npm install playwright`.".to_string(),
        )
    } else if lower.contains("executable doesn't exist") {
        ExtractError::Config(format!(
            "Playwright chromium executable is missing ({name}): {message}"
        ))
    } else {
        ExtractError::Internal(format!("Browser launch failed ({name}): {message}"))
    }
}

/// Ensures Node.js is available on the system.
pub(crate) async fn ensure_node_available(node_command: &str) -> Result<()> {
    let mut cmd = Command::new(node_command);
    cmd.arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    let status = tokio::time::timeout(NODE_CHECK_TIMEOUT, cmd.status())
        .await
        .map_err(|_| {
            ExtractError::Config(format!(
                "Timed out checking node availability after {:?}",
                NODE_CHECK_TIMEOUT
            ))
        })?
        .map_err(|err| map_spawn_error(err, node_command))?;

    if !status.success() {
        return Err(ExtractError::Config(format!(
            "Node command {:?} is not available (exit {})",
            node_command, status
        )));
    }

    Ok(())
}

/// Ensures Playwright npm package is installed.
pub(crate) async fn ensure_playwright_available(node_command: &str) -> Result<()> {
    let mut cmd = Command::new(node_command);
    cmd.arg("-e")
        .arg(PLAYWRIGHT_CHECK_SCRIPT)
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    let output = tokio::time::timeout(NODE_CHECK_TIMEOUT, cmd.output())
        .await
        .map_err(|_| {
            ExtractError::Config(format!(
                "Timed out checking Playwright availability after {:?}",
                NODE_CHECK_TIMEOUT
            ))
        })?
        .map_err(|err| map_spawn_error(err, node_command))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(map_playwright_error(
            format!("{:?}", output.status),
            &stderr,
        ));
    }

    Ok(())
}
