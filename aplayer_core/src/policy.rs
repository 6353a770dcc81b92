//! Error-recovery resolution for failed auto-advance loads.

use std::path::Path;

use aplayer_protocol::ServerError;

use crate::config::ErrorPolicy;

/// The three actions a failure can resolve to. `ShowError` resolves to one
/// of these through the prompt; the other policies map directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    Skip,
    SkipAndRemove,
    Stop,
}

/// UI seam for the `ShowError` policy. The embedding client shows the
/// three-way dialog; headless use falls back to [`SkipPrompt`] so the
/// engine never blocks on a missing UI.
pub trait ErrorPrompt: Send {
    fn choose(&mut self, error: &ServerError, path: &Path) -> RecoveryAction;
}

/// Default prompt: always skip.
#[derive(Debug, Default)]
pub struct SkipPrompt;

impl ErrorPrompt for SkipPrompt {
    fn choose(&mut self, _error: &ServerError, _path: &Path) -> RecoveryAction {
        RecoveryAction::Skip
    }
}

/// Resolve the configured policy to a concrete action, prompting only for
/// `ShowError`.
pub fn resolve(
    policy: ErrorPolicy,
    prompt: &mut dyn ErrorPrompt,
    error: &ServerError,
    path: &Path,
) -> RecoveryAction {
    match policy {
        ErrorPolicy::ShowError => prompt.choose(error, path),
        ErrorPolicy::Skip => RecoveryAction::Skip,
        ErrorPolicy::SkipAndRemove => RecoveryAction::SkipAndRemove,
        ErrorPolicy::Stop => RecoveryAction::Stop,
    }
}
