//! Status codes and per-service status registries.
//!
//! Every DIMSE service restricts the 16-bit status codes its responses may
//! carry. A [`StatusRegistry`] resolves a code to its category and PS3.7
//! description, first by exact match and then by the ranged code blocks the
//! standard defines (`0xA7xx`, `0xA9xx`, `0xB000`–`0xBFFF`, `0xC000`–`0xCFFF`).
//! <https://dicom.nema.org/medical/dicom/current/output/chtml/part07/chapter_C.html>

use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::LazyLock;

use crate::types::US;

/// Status types supported by the DIMSE services.
/// <https://dicom.nema.org/medical/dicom/current/output/chtml/part07/chapter_C.html>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusType {
	Success,
	Warning,
	Failure,
	Cancel,
	Pending,
}

/// A resolved status code: its category and the description assigned by
/// PS3.7 Annex C.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusEntry {
	pub status_type: StatusType,
	pub description: &'static str,
}

impl StatusEntry {
	const fn new(status_type: StatusType, description: &'static str) -> Self {
		Self {
			status_type,
			description,
		}
	}
}

/// Maps status codes to [`StatusEntry`] values for one service class.
#[derive(Debug, Default)]
pub struct StatusRegistry {
	exact: HashMap<US, StatusEntry>,
	ranges: Vec<(RangeInclusive<US>, StatusEntry)>,
}

impl StatusRegistry {
	/// Starts from the general status codes shared by all DIMSE services
	/// (PS3.7 Annex C, Table C.1-1).
	fn general() -> Self {
		use StatusType::{Cancel, Failure, Success, Warning};
		let mut registry = Self::default();
		registry
			.code(0x0000, Success, "Success")
			.code(0x0105, Failure, "No Such Attribute")
			.code(0x0106, Failure, "Invalid Attribute Value")
			.code(0x0107, Warning, "Attribute List Error")
			.code(0x0110, Failure, "Processing Failure")
			.code(0x0111, Failure, "Duplicate SOP Instance")
			.code(0x0112, Failure, "No Such SOP Instance")
			.code(0x0113, Failure, "No Such Event Type")
			.code(0x0114, Failure, "No Such Argument")
			.code(0x0115, Failure, "Invalid Argument Value")
			.code(0x0116, Warning, "Attribute Value Out of Range")
			.code(0x0117, Failure, "Invalid SOP Instance")
			.code(0x0118, Failure, "No Such SOP Class")
			.code(0x0119, Failure, "Class-Instance Conflict")
			.code(0x0120, Failure, "Missing Attribute")
			.code(0x0121, Failure, "Missing Attribute Value")
			.code(0x0122, Failure, "Refused: SOP Class Not Supported")
			.code(0x0123, Failure, "No Such Action")
			.code(0x0124, Failure, "Refused: Not Authorised")
			.code(0x0210, Failure, "Duplicate Invocation")
			.code(0x0211, Failure, "Unrecognised Operation")
			.code(0x0212, Failure, "Mistyped Argument")
			.code(0x0213, Failure, "Resources Limit Exceeded")
			.code(0xFE00, Cancel, "Cancel");
		registry
	}

	fn code(&mut self, code: US, status_type: StatusType, description: &'static str) -> &mut Self {
		self.exact.insert(code, StatusEntry::new(status_type, description));
		self
	}

	fn range(
		&mut self,
		codes: RangeInclusive<US>,
		status_type: StatusType,
		description: &'static str,
	) -> &mut Self {
		self.ranges.push((codes, StatusEntry::new(status_type, description)));
		self
	}

	/// Resolves a status code, trying exact matches before ranged blocks.
	pub fn get(&self, code: US) -> Option<&StatusEntry> {
		self.exact.get(&code).or_else(|| {
			self.ranges
				.iter()
				.find(|(range, _)| range.contains(&code))
				.map(|(_, entry)| entry)
		})
	}

	pub fn contains(&self, code: US) -> bool {
		self.get(code).is_some()
	}

	/// The category of a code, if the registry knows it.
	pub fn status_type(&self, code: US) -> Option<StatusType> {
		self.get(code).map(|entry| entry.status_type)
	}
}

/// Verification service class statuses (PS3.7 Section 9.1.5.1.4).
pub fn verification() -> &'static StatusRegistry {
	static REGISTRY: LazyLock<StatusRegistry> = LazyLock::new(StatusRegistry::general);
	&REGISTRY
}

/// Storage service class statuses (PS3.4 Annex B.2.3).
pub fn storage() -> &'static StatusRegistry {
	static REGISTRY: LazyLock<StatusRegistry> = LazyLock::new(|| {
		use StatusType::{Failure, Warning};
		let mut registry = StatusRegistry::general();
		registry
			.code(0xB000, Warning, "Coercion of Data Elements")
			.code(0xB006, Warning, "Elements Discarded")
			.code(0xB007, Warning, "Data Set Does Not Match SOP Class")
			.range(0xA700..=0xA7FF, Failure, "Refused: Out of Resources")
			.range(0xA900..=0xA9FF, Failure, "Error: Data Set Does Not Match SOP Class")
			.range(0xC000..=0xCFFF, Failure, "Error: Cannot Understand");
		registry
	});
	&REGISTRY
}

/// Query/Retrieve FIND statuses (PS3.4 Annex C.4.1.1.4).
pub fn qr_find() -> &'static StatusRegistry {
	static REGISTRY: LazyLock<StatusRegistry> = LazyLock::new(|| {
		use StatusType::{Failure, Pending};
		let mut registry = StatusRegistry::general();
		registry
			.code(0xA700, Failure, "Refused: Out of Resources")
			.code(0xA900, Failure, "Identifier Does Not Match SOP Class")
			.code(0xFF00, Pending, "Matches are continuing: current match is supplied")
			.code(0xFF01, Pending, "Matches are continuing: warning")
			.range(0xC000..=0xCFFF, Failure, "Unable to Process");
		registry
	});
	&REGISTRY
}

/// Query/Retrieve GET statuses (PS3.4 Annex C.4.3.1.4).
pub fn qr_get() -> &'static StatusRegistry {
	static REGISTRY: LazyLock<StatusRegistry> = LazyLock::new(|| {
		let mut registry = StatusRegistry::general();
		retrieve_statuses(&mut registry);
		registry
	});
	&REGISTRY
}

/// Query/Retrieve MOVE statuses (PS3.4 Annex C.4.2.1.5).
pub fn qr_move() -> &'static StatusRegistry {
	static REGISTRY: LazyLock<StatusRegistry> = LazyLock::new(|| {
		let mut registry = StatusRegistry::general();
		retrieve_statuses(&mut registry);
		registry.code(0xA801, StatusType::Failure, "Move Destination Unknown");
		registry
	});
	&REGISTRY
}

fn retrieve_statuses(registry: &mut StatusRegistry) {
	use StatusType::{Failure, Pending, Warning};
	registry
		.code(
			0xA701,
			Failure,
			"Refused: Out of Resources, Unable to Calculate Number of Matches",
		)
		.code(
			0xA702,
			Failure,
			"Refused: Out of Resources, Unable to Perform Sub-Operations",
		)
		.code(0xA900, Failure, "Identifier Does Not Match SOP Class")
		.code(
			0xB000,
			Warning,
			"Sub-Operations Completed: One or More Failures or Warnings",
		)
		.code(0xFF00, Pending, "Sub-Operations are Continuing")
		.range(0xC000..=0xCFFF, Failure, "Unable to Process");
}

/// Basic Worklist Management statuses (PS3.4 Annex K.4.1.1.4). Shares the
/// Query/Retrieve FIND code space.
pub fn modality_worklist() -> &'static StatusRegistry {
	qr_find()
}

/// Substance Administration Query statuses (PS3.4 Annex V.4.1.1.4). Shares
/// the Query/Retrieve FIND code space.
pub fn substance_administration() -> &'static StatusRegistry {
	qr_find()
}

/// Relevant Patient Information Query statuses (PS3.4 Annex Q.2.1.1.4).
pub fn relevant_patient() -> &'static StatusRegistry {
	static REGISTRY: LazyLock<StatusRegistry> = LazyLock::new(|| {
		use StatusType::{Failure, Pending};
		let mut registry = StatusRegistry::general();
		registry
			.code(0xA700, Failure, "Refused: Out of Resources")
			.code(0xA900, Failure, "Identifier Does Not Match SOP Class")
			.code(0xC100, Failure, "More Than One Match Found")
			.code(0xC200, Failure, "Unable to Support Requested Template")
			.code(0xFF00, Pending, "Matches are continuing: current match is supplied")
			.range(0xC000..=0xCFFF, Failure, "Unable to Process");
		registry
	});
	&REGISTRY
}
