//! Page automation shared by the desktop and extension backends
//!
//! navigate -> wait for input -> fill -> submit -> wait for generation -> extract

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::config::BackendConfig;
use crate::domain::backend::{resolve_selectors, ResolvedSelectors};
use crate::domain::{BackendError, BackendOutput, BackendRequest, CancellationToken, PageDriver};

/// Polling bounds of the automation routine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTiming {
    pub poll_interval: Duration,
    pub input_timeout: Duration,
    pub appear_timeout: Duration,
    pub max_wait: Duration,
    pub fallback_delay: Duration,
}

impl Default for PollTiming {
    fn default() -> Self {
        Self::from(&BackendConfig::default())
    }
}

impl From<&BackendConfig> for PollTiming {
    fn from(config: &BackendConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            input_timeout: Duration::from_millis(config.input_timeout_ms),
            appear_timeout: Duration::from_millis(config.appear_timeout_ms),
            max_wait: Duration::from_millis(config.max_wait_ms),
            fallback_delay: Duration::from_millis(config.fallback_delay_ms),
        }
    }
}

/// Sends one prompt through a page and returns the newest answer
pub async fn run_prompt<P>(
    page: &P,
    request: &BackendRequest,
    timing: &PollTiming,
    cancel: &CancellationToken,
) -> Result<BackendOutput, BackendError>
where
    P: PageDriver + ?Sized,
{
    let selectors = resolve_selectors(request);
    debug!(platform = ?selectors.platform, url = %request.url, "Automating prompt");

    if !request.url.is_empty() {
        page.navigate(&request.url).await?;
    }

    if !wait_for(page, &selectors.input, true, timing.input_timeout, timing, cancel).await? {
        return Err(BackendError::selector_not_found(&selectors.input));
    }

    page.fill(&selectors.input, &request.prompt).await?;
    page.click(&selectors.submit).await?;

    wait_for_generation(page, &selectors, timing, cancel).await?;

    let text = extract(page, &selectors).await?;
    let final_url = page.current_url().await?;

    Ok(BackendOutput::new(text, final_url))
}

async fn wait_for_generation<P>(
    page: &P,
    selectors: &ResolvedSelectors,
    timing: &PollTiming,
    cancel: &CancellationToken,
) -> Result<(), BackendError>
where
    P: PageDriver + ?Sized,
{
    if let Some(ref generating) = selectors.generating {
        if wait_for(page, generating, true, timing.appear_timeout, timing, cancel).await? {
            if !wait_for(page, generating, false, timing.max_wait, timing, cancel).await? {
                return Err(BackendError::Timeout(timing.max_wait.as_millis() as u64));
            }
            return Ok(());
        }
        debug!(selector = %generating, "Generating indicator never appeared");
    }

    if !cancel.sleep(timing.fallback_delay).await {
        return Err(BackendError::Aborted);
    }

    Ok(())
}

/// Polls until `selector` is present (or absent). `Ok(false)` on timeout.
async fn wait_for<P>(
    page: &P,
    selector: &str,
    present: bool,
    timeout: Duration,
    timing: &PollTiming,
    cancel: &CancellationToken,
) -> Result<bool, BackendError>
where
    P: PageDriver + ?Sized,
{
    let deadline = Instant::now() + timeout;

    loop {
        if cancel.is_cancelled() {
            return Err(BackendError::Aborted);
        }

        if page.exists(selector).await? == present {
            return Ok(true);
        }

        if Instant::now() >= deadline {
            return Ok(false);
        }

        if !cancel.sleep(timing.poll_interval).await {
            return Err(BackendError::Aborted);
        }
    }
}

async fn extract<P>(page: &P, selectors: &ResolvedSelectors) -> Result<String, BackendError>
where
    P: PageDriver + ?Sized,
{
    if let Some(ref scope) = selectors.latest_message {
        if let Some(html) = page.inner_html_within(scope, &selectors.output).await? {
            if !html.trim().is_empty() {
                return Ok(html);
            }
        }
    }

    page.last_inner_html(&selectors.output)
        .await?
        .filter(|html| !html.trim().is_empty())
        .ok_or_else(|| BackendError::selector_not_found(&selectors.output))
}

#[cfg(test)]
pub(crate) fn fast_timing() -> PollTiming {
    PollTiming {
        poll_interval: Duration::from_millis(1),
        input_timeout: Duration::from_millis(20),
        appear_timeout: Duration::from_millis(20),
        max_wait: Duration::from_millis(30),
        fallback_delay: Duration::from_millis(1),
    }
}
