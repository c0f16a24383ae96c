//! SSH jump-host tunnel lifecycle: command assembly, authentication,
//! and deterministic teardown of the spawned `ssh` child process.

pub mod error;
pub mod prompter;
pub mod spec;
pub mod tunnel;

pub use error::TunnelError;
pub use prompter::{ExpectPrompter, PasswordPrompter, PromptOutcome, SshpassPrompter};
pub use spec::{Auth, TunnelMode, TunnelSpec};
pub use tunnel::{TunnelManager, TunnelState};
