//! Local browser automation backend

use std::fmt::{self, Debug};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::automation::{run_prompt, PollTiming};
use crate::domain::{
    BackendError, BackendMode, BackendOutput, BackendRequest, CancellationToken, ExecutionBackend,
    PageDriver,
};

/// How the browser is started
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchOptions {
    pub headless: bool,
    /// Persistent profile, keeps logins between launches
    pub profile_dir: Option<PathBuf>,
}

/// A running browser with one controllable page
#[async_trait]
pub trait BrowserSession: PageDriver {
    fn is_open(&self) -> bool;

    /// Kills the browser process
    async fn close(&self);
}

/// Starts browser sessions (CDP, WebDriver, ...)
#[async_trait]
pub trait BrowserLauncher: Send + Sync + Debug {
    async fn launch(&self, options: &LaunchOptions) -> Result<Arc<dyn BrowserSession>, BackendError>;
}

/// Drives a persistent local browser session, launched on first use
pub struct DesktopBackend {
    launcher: Arc<dyn BrowserLauncher>,
    options: LaunchOptions,
    timing: PollTiming,
    session: Mutex<Option<Arc<dyn BrowserSession>>>,
}

impl Debug for DesktopBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DesktopBackend")
            .field("launcher", &self.launcher)
            .field("options", &self.options)
            .field("timing", &self.timing)
            .finish_non_exhaustive()
    }
}

impl DesktopBackend {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, options: LaunchOptions, timing: PollTiming) -> Self {
        Self {
            launcher,
            options,
            timing,
            session: Mutex::new(None),
        }
    }

    /// Current session, relaunching when none is open
    async fn session(&self) -> Result<Arc<dyn BrowserSession>, BackendError> {
        let mut guard = self.session.lock().await;

        if let Some(session) = guard.as_ref() {
            if session.is_open() {
                return Ok(Arc::clone(session));
            }
            debug!("Browser session was closed, relaunching");
        }

        info!(headless = self.options.headless, "Launching browser session");
        let session = self.launcher.launch(&self.options).await?;
        *guard = Some(Arc::clone(&session));

        Ok(session)
    }
}

#[async_trait]
impl ExecutionBackend for DesktopBackend {
    async fn execute(
        &self,
        request: BackendRequest,
        cancel: &CancellationToken,
    ) -> Result<BackendOutput, BackendError> {
        let session = self.session().await?;
        run_prompt(session.as_ref(), &request, &self.timing, cancel).await
    }

    async fn abort(&self) {
        let session = self.session.lock().await.take();

        if let Some(session) = session {
            info!("Closing browser session");
            session.close().await;
        }
    }

    fn kind(&self) -> BackendMode {
        BackendMode::Desktop
    }
}
