//! Execution backend implementations

mod automation;
mod desktop;
mod direct_api;
mod extension;
mod factory;
mod simulated;

pub use automation::{run_prompt, PollTiming};
pub use desktop::{BrowserLauncher, BrowserSession, DesktopBackend, LaunchOptions};
pub use direct_api::DirectApiBackend;
pub use extension::{ExtensionBackend, ScriptedTab, TabChannel};
pub use factory::{BackendDependencies, BackendFactory};
pub use simulated::SimulatedBackend;
