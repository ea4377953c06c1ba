//! Terminal progress for update runs.
//!
//! [`TerminalProgress`] is an [`UpdateObserver`] that renders the run with
//! `indicatif`: a spinner while the manifest is checked, a byte progress bar
//! per artifact download, and a spinner while verifying and deploying.
//!
//! # Environment Variables
//!
//! - `OSS_UPDATE_NO_PROGRESS`: set to any value to disable progress output
//!
//! Progress is also hidden when stderr is not a terminal, so scripted use
//! only sees the log lines.

use crate::core::UpdateStage;
use crate::update::{ProgressTarget, UpdateEvent, UpdateObserver};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle as IndicatifStyle};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Environment variable that disables progress output.
pub const NO_PROGRESS_ENV: &str = "OSS_UPDATE_NO_PROGRESS";

/// Whether progress output was disabled through the environment.
#[must_use]
pub fn is_progress_disabled() -> bool {
    std::env::var_os(NO_PROGRESS_ENV).is_some()
}

/// Styles shared by all progress output.
pub struct ProgressStyle;

impl ProgressStyle {
    /// Byte-based bar used for downloads.
    #[must_use]
    pub fn download() -> IndicatifStyle {
        IndicatifStyle::default_bar()
            .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .map_or_else(|_| IndicatifStyle::default_bar(), |style| style.progress_chars("━╸━"))
    }

    /// Byte counter used when the total size is unknown.
    #[must_use]
    pub fn download_unknown_size() -> IndicatifStyle {
        IndicatifStyle::default_spinner()
            .template("{prefix:.bold.cyan} {spinner:.cyan} {bytes} ({bytes_per_sec})")
            .unwrap_or_else(|_| IndicatifStyle::default_spinner())
    }

    /// Spinner used for stages without byte progress.
    #[must_use]
    pub fn spinner() -> IndicatifStyle {
        IndicatifStyle::default_spinner()
            .template("{prefix:.bold} {spinner:.cyan} {msg}")
            .map_or_else(
                |_| IndicatifStyle::default_spinner(),
                |style| style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            )
    }
}

#[derive(Default)]
struct State {
    bar: Option<ProgressBar>,
    target: Option<ProgressTarget>,
}

/// Renders update events as terminal progress.
pub struct TerminalProgress {
    enabled: bool,
    state: Mutex<State>,
}

impl TerminalProgress {
    /// Draw to stderr unless `enabled` is false.
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            state: Mutex::new(State::default()),
        }
    }

    /// Draw to stderr unless disabled through `OSS_UPDATE_NO_PROGRESS`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(!is_progress_disabled())
    }

    fn new_bar(&self) -> ProgressBar {
        if self.enabled {
            ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr())
        } else {
            ProgressBar::hidden()
        }
    }

    fn spinner(&self, state: &mut State, message: &str) {
        finish(state);
        let bar = self.new_bar();
        bar.set_style(ProgressStyle::spinner());
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));
        state.bar = Some(bar);
    }

    fn download_bar(&self, state: &mut State, target: &ProgressTarget, total: Option<u64>) {
        if state.target.as_ref() == Some(target) && state.bar.is_some() {
            return;
        }
        finish(state);

        let bar = self.new_bar();
        match total {
            Some(total) => {
                bar.set_length(total);
                bar.set_style(ProgressStyle::download());
            }
            None => bar.set_style(ProgressStyle::download_unknown_size()),
        }
        bar.set_prefix(match target {
            ProgressTarget::Manifest => "manifest".to_string(),
            ProgressTarget::Artifact {
                version,
                index,
                count,
            } if *count > 1 => format!("{version} ({}/{count})", index + 1),
            ProgressTarget::Artifact {
                version,
                ..
            } => version.to_string(),
        });
        state.bar = Some(bar);
        state.target = Some(target.clone());
    }

    /// Position of the current bar, if one is shown.
    #[must_use]
    pub fn position(&self) -> Option<u64> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.bar.as_ref().map(ProgressBar::position)
    }
}

fn finish(state: &mut State) {
    if let Some(bar) = state.bar.take() {
        bar.finish_and_clear();
    }
    state.target = None;
}

impl UpdateObserver for TerminalProgress {
    fn on_event(&self, event: &UpdateEvent) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match event {
            UpdateEvent::StageChanged {
                to,
                ..
            } => match to {
                UpdateStage::CheckingVersion => self.spinner(&mut state, "Checking for updates"),
                UpdateStage::Verifying => self.spinner(&mut state, "Verifying checksums"),
                UpdateStage::Deploying => self.spinner(&mut state, "Deploying update"),
                _ => finish(&mut state),
            },
            UpdateEvent::Progress {
                target: ProgressTarget::Manifest,
                ..
            } => {}
            UpdateEvent::Progress {
                target,
                progress,
            } => {
                self.download_bar(&mut state, target, progress.total_bytes);
                if let Some(bar) = &state.bar {
                    bar.set_position(progress.bytes_read);
                }
            }
            UpdateEvent::Failed { .. } | UpdateEvent::Finished { .. } => finish(&mut state),
        }
    }
}

impl Drop for TerminalProgress {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        finish(state);
    }
}
