//! Observable state of the top-up flow.

use crate::progress::StepTracker;
use std::time::Duration;
use tokio::time::Instant;
use topup_types::{ProgressStep, Quote, StepStatus, StepStatuses};

/// Snapshot of the top-up flow as presented to a user interface.
///
/// Published on every change through the orchestrator's watch channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopUpState {
	/// A top-up attempt is running; new submissions must wait.
	pub is_loading: bool,
	/// User-facing message of the last failure.
	pub error: Option<String>,
	/// Latest quote, cleared whenever the quote inputs change.
	pub quote: Option<Quote>,
	/// Steps of the current attempt.
	pub steps: Vec<ProgressStep>,
	/// Per-step progress.
	pub progress: StepTracker,
	/// When the current step started processing.
	pub step_started_at: Option<Instant>,
}

impl TopUpState {
	pub fn current_step(&self) -> Option<u32> {
		self.progress.current_step()
	}

	pub fn step_statuses(&self) -> &StepStatuses {
		self.progress.statuses()
	}

	pub fn step_status(&self, step: u32) -> StepStatus {
		self.progress.status(step)
	}

	/// Remaining expected time of the current step at `now`.
	///
	/// `None` when no step is processing or the step has no estimate.
	pub fn countdown(&self, now: Instant) -> Option<Duration> {
		let current = self.current_step()?;
		let started = self.step_started_at?;
		let expected = self
			.steps
			.iter()
			.find(|step| step.id == current)?
			.expected_time_in_seconds?;
		Some(Duration::from_secs(expected).saturating_sub(now.saturating_duration_since(started)))
	}

	/// True once every step completed or any step failed.
	pub fn is_terminal(&self) -> bool {
		self.progress.failed_step().is_some() || self.progress.all_completed(&self.steps)
	}
}
