//! Progress steps and per-step status for the top-up flow.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One discrete, sequentially ordered unit of the top-up flow.
///
/// Steps are defined statically per bridge implementation and numbered from 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressStep {
	pub id: u32,
	pub label: String,
	pub description: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub expected_time_in_seconds: Option<u64>,
}

impl ProgressStep {
	pub fn new(id: u32, label: impl Into<String>, description: impl Into<String>) -> Self {
		Self {
			id,
			label: label.into(),
			description: description.into(),
			expected_time_in_seconds: None,
		}
	}

	pub fn with_expected_time(mut self, seconds: u64) -> Self {
		self.expected_time_in_seconds = Some(seconds);
		self
	}
}

/// Status of a single progress step.
///
/// A step moves `Pending -> Processing -> Completed | Error` and never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
	#[default]
	Pending,
	Processing,
	Completed,
	Error,
}

impl StepStatus {
	/// Returns true for `Completed` and `Error`.
	pub fn is_final(&self) -> bool {
		matches!(self, StepStatus::Completed | StepStatus::Error)
	}
}

impl fmt::Display for StepStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			StepStatus::Pending => "pending",
			StepStatus::Processing => "processing",
			StepStatus::Completed => "completed",
			StepStatus::Error => "error",
		};
		write!(f, "{}", s)
	}
}

/// Step statuses keyed by step id. Missing entries are implicitly pending.
pub type StepStatuses = BTreeMap<u32, StepStatus>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_step_status_serialization() {
		let json = serde_json::to_string(&StepStatus::Processing).unwrap();
		assert_eq!(json, "\"processing\"");
		let parsed: StepStatus = serde_json::from_str("\"error\"").unwrap();
		assert_eq!(parsed, StepStatus::Error);
	}

	#[test]
	fn test_progress_step_camel_case() {
		let step = ProgressStep::new(1, "Switch network", "Switching to Base").with_expected_time(5);
		let json = serde_json::to_value(&step).unwrap();
		assert_eq!(json["expectedTimeInSeconds"], 5);
		assert_eq!(json["id"], 1);
	}
}
