//! Per-step progress tracking.
//!
//! Steps move `pending -> processing -> completed | error`. The tracker
//! enforces that with a static transition table and adds the flow-level
//! rules: at most one step is processing, and nothing starts after an error.

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use topup_types::{ProgressStep, StepStatus, StepStatuses};

/// Errors raised by invalid progress updates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepError {
	#[error("Invalid transition for step {step}: {from} -> {to}")]
	InvalidTransition {
		step: u32,
		from: StepStatus,
		to: StepStatus,
	},
	#[error("Cannot start step {step} while step {active} is processing")]
	AlreadyProcessing { step: u32, active: u32 },
	#[error("Cannot start step {step} after step {failed} failed")]
	FlowFailed { step: u32, failed: u32 },
}

/// Tracks the status of every step of one top-up attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepTracker {
	statuses: StepStatuses,
	current: Option<u32>,
	failed: Option<u32>,
}

impl StepTracker {
	pub fn new() -> Self {
		Self::default()
	}

	/// Status of `step`; steps never touched are pending.
	pub fn status(&self, step: u32) -> StepStatus {
		self.statuses.get(&step).copied().unwrap_or_default()
	}

	pub fn statuses(&self) -> &StepStatuses {
		&self.statuses
	}

	/// The step currently processing.
	pub fn current_step(&self) -> Option<u32> {
		self.current
	}

	/// The step that failed, if any.
	pub fn failed_step(&self) -> Option<u32> {
		self.failed
	}

	/// True once every step in `steps` completed.
	pub fn all_completed(&self, steps: &[ProgressStep]) -> bool {
		!steps.is_empty()
			&& steps
				.iter()
				.all(|step| self.status(step.id) == StepStatus::Completed)
	}

	/// Marks `step` as processing.
	pub fn start(&mut self, step: u32) -> Result<(), StepError> {
		if let Some(failed) = self.failed {
			return Err(StepError::FlowFailed { step, failed });
		}
		if let Some(active) = self.current {
			return Err(StepError::AlreadyProcessing { step, active });
		}
		self.transition(step, StepStatus::Processing)?;
		self.current = Some(step);
		Ok(())
	}

	/// Marks the processing `step` as completed.
	pub fn complete(&mut self, step: u32) -> Result<(), StepError> {
		self.transition(step, StepStatus::Completed)?;
		self.current = None;
		Ok(())
	}

	/// Marks the processing `step` as failed. The flow is terminal afterwards.
	pub fn fail(&mut self, step: u32) -> Result<(), StepError> {
		self.transition(step, StepStatus::Error)?;
		self.current = None;
		self.failed = Some(step);
		Ok(())
	}

	fn transition(&mut self, step: u32, to: StepStatus) -> Result<(), StepError> {
		let from = self.status(step);
		if !Self::is_valid_transition(from, to) {
			return Err(StepError::InvalidTransition { step, from, to });
		}
		self.statuses.insert(step, to);
		Ok(())
	}

	/// Checks if a status transition is valid
	fn is_valid_transition(from: StepStatus, to: StepStatus) -> bool {
		// Static transition table - each status maps to allowed next statuses
		static TRANSITIONS: Lazy<HashMap<StepStatus, HashSet<StepStatus>>> = Lazy::new(|| {
			let mut m = HashMap::new();
			m.insert(StepStatus::Pending, HashSet::from([StepStatus::Processing]));
			m.insert(
				StepStatus::Processing,
				HashSet::from([StepStatus::Completed, StepStatus::Error]),
			);
			m.insert(StepStatus::Completed, HashSet::new()); // terminal
			m.insert(StepStatus::Error, HashSet::new()); // terminal
			m
		});

		TRANSITIONS
			.get(&from)
			.is_some_and(|allowed| allowed.contains(&to))
	}
}
