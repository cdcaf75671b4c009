//! Chrome DevTools Protocol session implementation
//!
//! Each session owns a headless Chrome process on a dedicated worker thread.
//! The caller sends commands over a channel and waits for the reply with a
//! per-operation deadline, so a hung browser turns into an error for the
//! current step instead of blocking the whole run. Dropping the command
//! channel ends the worker, which drops the browser and kills the process.

use std::ffi::OsStr;
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::types::Bounds;
use headless_chrome::{Browser, LaunchOptions};
use log::{debug, warn};

use crate::{BrowserSession, CaptureConfig, Error, Locator, Result, SessionLauncher};

const READY_POLL_INTERVAL: Duration = Duration::from_millis(50);

enum Command {
    Navigate(String, SyncSender<Result<()>>),
    Resize(u32, u32, SyncSender<Result<()>>),
    AwaitStable(SyncSender<Result<()>>),
    Capture(SyncSender<Result<Vec<u8>>>),
    Close(SyncSender<Result<()>>),
}

/// Launches one headless Chrome per session.
#[derive(Debug, Clone)]
pub struct CdpLauncher {
    config: CaptureConfig,
}

impl CdpLauncher {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }
}

impl SessionLauncher for CdpLauncher {
    type Session = CdpSession;

    fn open(&self) -> Result<CdpSession> {
        CdpSession::open(self.config.clone())
    }
}

/// Handle to a browser running on its worker thread.
pub struct CdpSession {
    cmd_tx: Option<Sender<Command>>,
    config: CaptureConfig,
}

impl CdpSession {
    fn open(config: CaptureConfig) -> Result<Self> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();
        let (init_tx, init_rx) = mpsc::sync_channel::<Result<()>>(1);
        let worker_config = config.clone();

        thread::Builder::new()
            .name("mailproof-cdp".into())
            .spawn(move || {
                let (browser, tab) = match launch(&worker_config) {
                    Ok(pair) => pair,
                    Err(err) => {
                        let _ = init_tx.send(Err(err));
                        return;
                    }
                };
                // The caller may have given up already; then the command
                // channel is closed and the loop below exits immediately.
                let _ = init_tx.send(Ok(()));
                serve(&tab, &worker_config, cmd_rx);
                drop(tab);
                drop(browser);
                debug!("Browser worker exited");
            })
            .map_err(|e| Error::EngineUnavailable(format!("Failed to spawn browser worker: {}", e)))?;

        match init_rx.recv_timeout(Duration::from_millis(config.startup_timeout_ms)) {
            Ok(Ok(())) => Ok(Self {
                cmd_tx: Some(cmd_tx),
                config,
            }),
            Ok(Err(err)) => Err(err),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Error::EngineUnavailable(format!(
                "browser did not start within {}ms",
                config.startup_timeout_ms
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Error::EngineUnavailable(
                "browser worker exited during startup".into(),
            )),
        }
    }

    /// Send a command and wait for its reply. Expired deadlines and a dead
    /// worker are mapped through `fail` so each step reports its own kind.
    fn request<T>(
        &self,
        make: impl FnOnce(SyncSender<Result<T>>) -> Command,
        timeout_ms: u64,
        fail: fn(String) -> Error,
    ) -> Result<T> {
        let tx = self
            .cmd_tx
            .as_ref()
            .ok_or_else(|| fail("session is closed".into()))?;
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        tx.send(make(reply_tx))
            .map_err(|_| fail("browser worker is gone".into()))?;
        match reply_rx.recv_timeout(Duration::from_millis(timeout_ms)) {
            Ok(res) => res,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(fail(Error::Timeout(timeout_ms).to_string())),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(fail("browser worker exited".into())),
        }
    }
}

impl BrowserSession for CdpSession {
    fn navigate(&mut self, locator: &Locator) -> Result<()> {
        let url = locator.as_str().to_string();
        self.request(
            |reply| Command::Navigate(url, reply),
            self.config.navigation_timeout_ms,
            Error::NavigationError,
        )
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.request(
            |reply| Command::Resize(width, height, reply),
            self.config.capture_timeout_ms,
            Error::ViewportError,
        )
    }

    fn await_stable_render(&mut self) -> Result<()> {
        // the worker enforces settle_timeout itself; allow the grace period on top
        let budget = self.config.settle_timeout_ms + self.config.settle_grace_ms + 1000;
        self.request(Command::AwaitStable, budget, Error::CaptureError)
    }

    fn capture(&mut self) -> Result<Vec<u8>> {
        self.request(Command::Capture, self.config.capture_timeout_ms, Error::CaptureError)
    }

    fn close(&mut self) -> Result<()> {
        let Some(tx) = self.cmd_tx.take() else {
            return Ok(());
        };
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        if tx.send(Command::Close(reply_tx)).is_err() {
            // worker already gone, nothing left to shut down
            return Ok(());
        }
        drop(tx);
        match reply_rx.recv_timeout(Duration::from_millis(self.config.close_timeout_ms)) {
            Ok(res) => res,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Error::Timeout(self.config.close_timeout_ms)),
            Err(mpsc::RecvTimeoutError::Disconnected) => Ok(()),
        }
    }
}

impl Drop for CdpSession {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Browser session did not shut down cleanly: {}", e);
        }
    }
}

fn launch(config: &CaptureConfig) -> Result<(Browser, Arc<Tab>)> {
    let launch_options = LaunchOptions::default_builder()
        .headless(true)
        .sandbox(config.sandbox)
        .path(config.chrome_path.clone())
        .idle_browser_timeout(Duration::from_millis(
            config.navigation_timeout_ms + config.capture_timeout_ms * 4,
        ))
        .args(vec![
            OsStr::new("--disable-gpu"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new("--hide-scrollbars"),
            OsStr::new("--force-device-scale-factor=1"),
            OsStr::new("--allow-file-access-from-files"),
        ])
        .build()
        .map_err(|e| Error::EngineUnavailable(format!("Failed to build launch options: {}", e)))?;

    let browser = Browser::new(launch_options)
        .map_err(|e| Error::EngineUnavailable(format!("Failed to launch browser: {}", e)))?;

    let tab = browser
        .new_tab()
        .map_err(|e| Error::EngineUnavailable(format!("Failed to create tab: {}", e)))?;
    tab.set_default_timeout(Duration::from_millis(config.capture_timeout_ms.max(config.navigation_timeout_ms)));

    Ok((browser, tab))
}

fn serve(tab: &Tab, config: &CaptureConfig, cmd_rx: Receiver<Command>) {
    while let Ok(cmd) = cmd_rx.recv() {
        match cmd {
            Command::Navigate(url, reply) => {
                let _ = reply.send(navigate(tab, &url));
            }
            Command::Resize(width, height, reply) => {
                let _ = reply.send(resize(tab, width, height));
            }
            Command::AwaitStable(reply) => {
                let _ = reply.send(await_stable(tab, config));
            }
            Command::Capture(reply) => {
                let res = tab
                    .capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
                    .map_err(|e| Error::CaptureError(format!("Screenshot failed: {}", e)));
                let _ = reply.send(res);
            }
            Command::Close(reply) => {
                let _ = reply.send(Ok(()));
                break;
            }
        }
    }
}

fn navigate(tab: &Tab, url: &str) -> Result<()> {
    tab.navigate_to(url)
        .map_err(|e| Error::NavigationError(format!("Navigation failed: {}", e)))?;
    tab.wait_until_navigated()
        .map_err(|e| Error::NavigationError(format!("Wait for navigation failed: {}", e)))?;
    Ok(())
}

fn resize(tab: &Tab, width: u32, height: u32) -> Result<()> {
    tab.set_bounds(Bounds::Normal {
        left: Some(0),
        top: Some(0),
        width: Some(width as f64),
        height: Some(height as f64),
    })
    .map_err(|e| Error::ViewportError(format!("Failed to resize to {}x{}: {}", width, height, e)))?;
    Ok(())
}

/// Poll `document.readyState` until complete, then pause for the grace
/// period so late layout (web fonts, images) can settle.
fn await_stable(tab: &Tab, config: &CaptureConfig) -> Result<()> {
    let deadline = Instant::now() + Duration::from_millis(config.settle_timeout_ms);
    loop {
        let state = tab
            .evaluate("document.readyState", false)
            .map_err(|e| Error::CaptureError(format!("Failed to read document state: {}", e)))?;
        let ready = state
            .value
            .as_ref()
            .and_then(|v| v.as_str())
            .map_or(false, |s| s == "complete");
        if ready {
            break;
        }
        if Instant::now() >= deadline {
            return Err(Error::CaptureError(format!(
                "document not ready after {}ms",
                config.settle_timeout_ms
            )));
        }
        thread::sleep(READY_POLL_INTERVAL);
    }
    thread::sleep(Duration::from_millis(config.settle_grace_ms));
    Ok(())
}
