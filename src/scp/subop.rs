//! Bookkeeping for C-STORE sub-operations issued during C-GET and C-MOVE.

use bytes::Bytes;
use dicom::core::value::Value;
use dicom::core::{DataElement, Length, PrimitiveValue, Tag, VR};
use dicom::dictionary_std::tags;
use dicom::object::InMemDicomObject;
use tracing::warn;

use crate::association::SubOperationError;
use crate::codec::IdentifierCodec;
use crate::primitives::TransferSyntax;
use crate::status::{self, StatusType};
use crate::types::{UI, US};

/// Tracks the outcome of the sub-operations of one retrieve request.
///
/// `remaining + failed + warning + completed` equals the total announced by
/// the handler until the terminal response is built, where `remaining` is
/// dropped from the report.
#[derive(Debug)]
pub(crate) struct SubOperationTracker {
	remaining: US,
	failed: US,
	warning: US,
	completed: US,
	failed_instances: Vec<UI>,
}

impl SubOperationTracker {
	pub fn new(total: US) -> Self {
		Self {
			remaining: total,
			failed: 0,
			warning: 0,
			completed: 0,
			failed_instances: Vec::new(),
		}
	}

	pub const fn remaining(&self) -> US {
		self.remaining
	}

	pub const fn failed(&self) -> US {
		self.failed
	}

	pub const fn warning(&self) -> US {
		self.warning
	}

	pub const fn completed(&self) -> US {
		self.completed
	}

	/// Failed sub-operations reported on Failure/Warning terminals: the ones
	/// that failed plus the ones that will never run.
	pub const fn failed_with_remaining(&self) -> US {
		self.failed.saturating_add(self.remaining)
	}

	pub fn has_failures_or_warnings(&self) -> bool {
		self.failed > 0 || self.warning > 0
	}

	pub fn failed_instances(&self) -> &[UI] {
		&self.failed_instances
	}

	/// Records a pending yield whose dataset was unusable. The sub-operation
	/// never ran, so `remaining` is left untouched.
	pub fn record_invalid_dataset(&mut self) {
		self.failed += 1;
		self.failed_instances.push(UI::new());
	}

	/// Records the translated status of one completed C-STORE sub-operation.
	pub fn record_outcome(&mut self, status_type: StatusType, dataset: &InMemDicomObject) {
		match status_type {
			StatusType::Failure => {
				self.failed += 1;
				self.add_failed_instance(dataset);
			}
			StatusType::Warning => {
				self.warning += 1;
				self.add_failed_instance(dataset);
			}
			StatusType::Success => self.completed += 1,
			StatusType::Cancel | StatusType::Pending => {}
		}
		self.remaining = self.remaining.saturating_sub(1);
	}

	fn add_failed_instance(&mut self, dataset: &InMemDicomObject) {
		if let Some(uid) = dataset
			.get(tags::SOP_INSTANCE_UID)
			.and_then(|elem| elem.to_str().ok())
		{
			self.failed_instances
				.push(UI::from(uid.trim_end_matches('\0')));
		}
	}
}

/// Builds the (0008,0058) *Failed SOP Instance UID List* identifier attached
/// to Cancel, Failure and Warning terminals.
pub(crate) fn failed_instances_identifier(failed_instances: &[UI]) -> InMemDicomObject {
	InMemDicomObject::from_element_iter([DataElement::new(
		tags::FAILED_SOP_INSTANCE_UID_LIST,
		VR::UI,
		PrimitiveValue::Strs(failed_instances.iter().cloned().collect()),
	)])
}

pub(crate) fn has_failed_instances_list(dataset: &InMemDicomObject) -> bool {
	dataset.get(tags::FAILED_SOP_INSTANCE_UID_LIST).is_some()
}

/// Encodes the identifier attached to a Cancel/Failure/Warning terminal.
/// The handler's dataset is used when it already carries a *Failed SOP
/// Instance UID List*; otherwise one is synthesised from the tracker.
pub(crate) fn terminal_identifier_bytes(
	codec: &dyn IdentifierCodec,
	dataset: Option<InMemDicomObject>,
	tracker: &SubOperationTracker,
	transfer_syntax: &TransferSyntax,
) -> Option<Bytes> {
	let dataset = match dataset {
		Some(dataset) if has_failed_instances_list(&dataset) => dataset,
		_ => failed_instances_identifier(tracker.failed_instances()),
	};
	match codec.encode(
		&dataset,
		transfer_syntax.implicit_vr,
		transfer_syntax.little_endian,
	) {
		Ok(bytes) => Some(bytes),
		Err(err) => {
			warn!("Failed to encode the failed SOP instance UID list: {err}");
			None
		}
	}
}

/// Message id of the `index`-th C-STORE sub-operation of a retrieve request.
/// Message IDs have VR US, so the value wraps at 65536.
pub(crate) fn sub_operation_message_id(request_message_id: US, index: usize) -> US {
	let id = (u64::from(request_message_id) + index as u64 + 1) % 65_536;
	id as US
}

/// Translates a C-STORE sub-operation result through the storage service
/// registry. Faults and unknown codes both count as a plain failure.
pub(crate) fn store_outcome(
	outcome: Result<US, SubOperationError>,
) -> (StatusType, &'static str) {
	match outcome {
		Ok(code) => status::storage()
			.get(code)
			.map_or((StatusType::Failure, "Unknown"), |entry| {
				(entry.status_type, entry.description)
			}),
		Err(err) => {
			warn!("C-STORE sub-operation failed: {err}");
			(StatusType::Failure, "Unknown")
		}
	}
}

/// Bulk data elements removed for the Composite Instance Retrieve Without
/// Bulk Data service (PS3.4 Annex Z.1). *Waveform Data* is nested inside
/// *Waveform Sequence* items and handled separately.
const BULK_DATA_ELEMENTS: [(&str, Tag); 9] = [
	("PixelData", Tag(0x7FE0, 0x0010)),
	("FloatPixelData", Tag(0x7FE0, 0x0008)),
	("DoubleFloatPixelData", Tag(0x7FE0, 0x0009)),
	("PixelDataProviderURL", Tag(0x0028, 0x7FE0)),
	("SpectroscopyData", Tag(0x5600, 0x0020)),
	("OverlayData", Tag(0x6000, 0x3000)),
	("CurveData", Tag(0x5000, 0x3000)),
	("AudioSampleData", Tag(0x5000, 0x200C)),
	("EncapsulatedDocument", Tag(0x0042, 0x0011)),
];

/// Removes bulk data elements from a dataset about to be relayed, returning
/// the keywords of the elements that were present.
pub(crate) fn strip_bulk_data(dataset: &mut InMemDicomObject) -> Vec<&'static str> {
	let mut removed = Vec::new();
	for (keyword, tag) in BULK_DATA_ELEMENTS {
		if dataset.remove_element(tag) {
			removed.push(keyword);
		}
	}

	if let Ok(sequence) = dataset.take_element(tags::WAVEFORM_SEQUENCE) {
		let mut scrubbed = false;
		let items: Vec<InMemDicomObject> = sequence
			.value()
			.items()
			.map(|items| {
				items
					.iter()
					.cloned()
					.map(|mut item| {
						if item.remove_element(tags::WAVEFORM_DATA) {
							scrubbed = true;
						}
						item
					})
					.collect()
			})
			.unwrap_or_default();
		dataset.put_element(DataElement::new(
			tags::WAVEFORM_SEQUENCE,
			VR::SQ,
			Value::new_sequence(items, Length::UNDEFINED),
		));
		if scrubbed {
			removed.push("WaveformData");
		}
	}

	removed
}

#[cfg(test)]
mod tests {
	use dicom::dicom_value;

	use super::*;

	fn instance(uid: &str) -> InMemDicomObject {
		InMemDicomObject::from_element_iter([DataElement::new(
			tags::SOP_INSTANCE_UID,
			VR::UI,
			dicom_value!(Str, uid),
		)])
	}

	#[test]
	fn counters_are_conserved() {
		let mut tracker = SubOperationTracker::new(3);
		tracker.record_outcome(StatusType::Success, &instance("A"));
		tracker.record_outcome(StatusType::Warning, &instance("B"));
		tracker.record_outcome(StatusType::Failure, &instance("C"));

		assert_eq!(tracker.remaining(), 0);
		assert_eq!(tracker.completed(), 1);
		assert_eq!(tracker.warning(), 1);
		assert_eq!(tracker.failed(), 1);
		assert_eq!(tracker.failed_instances(), ["B", "C"]);
	}

	#[test]
	fn invalid_dataset_leaves_remaining_untouched() {
		let mut tracker = SubOperationTracker::new(2);
		tracker.record_invalid_dataset();

		assert_eq!(tracker.remaining(), 2);
		assert_eq!(tracker.failed(), 1);
		assert_eq!(tracker.failed_instances(), [""]);
	}

	#[test]
	fn failed_with_remaining_counts_unattempted_sub_operations() {
		let mut tracker = SubOperationTracker::new(4);
		tracker.record_outcome(StatusType::Success, &instance("A"));
		tracker.record_outcome(StatusType::Failure, &instance("B"));

		assert_eq!(tracker.failed_with_remaining(), 3);
	}

	#[test]
	fn failed_instances_identifier_is_multi_valued() {
		let identifier = failed_instances_identifier(&[UI::from("1.2.3"), UI::from("4.5.6")]);
		let elem = identifier.get(tags::FAILED_SOP_INSTANCE_UID_LIST).unwrap();
		assert_eq!(elem.value().multiplicity(), 2);
		assert!(has_failed_instances_list(&identifier));
	}

	#[test]
	fn strips_bulk_data_and_nested_waveform_data() {
		let waveform_item = InMemDicomObject::from_element_iter([
			DataElement::new(tags::WAVEFORM_DATA, VR::OW, PrimitiveValue::from(vec![0u8; 4])),
		]);
		let mut dataset = InMemDicomObject::from_element_iter([
			DataElement::new(tags::SOP_INSTANCE_UID, VR::UI, dicom_value!(Str, "1.2.3")),
			DataElement::new(
				Tag(0x7FE0, 0x0010),
				VR::OW,
				PrimitiveValue::from(vec![0u8; 8]),
			),
			DataElement::new(
				tags::WAVEFORM_SEQUENCE,
				VR::SQ,
				Value::new_sequence(vec![waveform_item], Length::UNDEFINED),
			),
		]);

		let removed = strip_bulk_data(&mut dataset);
		assert_eq!(removed, ["PixelData", "WaveformData"]);
		assert!(dataset.get(Tag(0x7FE0, 0x0010)).is_none());
		assert!(dataset.get(tags::SOP_INSTANCE_UID).is_some());

		let items = dataset
			.get(tags::WAVEFORM_SEQUENCE)
			.and_then(|elem| elem.value().items())
			.unwrap();
		assert!(items[0].get(tags::WAVEFORM_DATA).is_none());
	}

	#[test]
	fn stripping_is_a_no_op_without_bulk_data() {
		let mut dataset = instance("1.2.3");
		assert!(strip_bulk_data(&mut dataset).is_empty());
	}

	#[test]
	fn sub_operation_message_ids_wrap() {
		assert_eq!(sub_operation_message_id(7, 0), 8);
		assert_eq!(sub_operation_message_id(65_534, 0), 65_535);
		assert_eq!(sub_operation_message_id(65_534, 1), 0);
		assert_eq!(sub_operation_message_id(65_534, 2), 1);
		assert_eq!(sub_operation_message_id(65_535, 65_535), 65_535);
	}

	#[test]
	fn store_outcomes_translate_through_the_storage_registry() {
		assert_eq!(store_outcome(Ok(0x0000)).0, StatusType::Success);
		assert_eq!(store_outcome(Ok(0xB007)).0, StatusType::Warning);
		assert_eq!(store_outcome(Ok(0xA7FF)).0, StatusType::Failure);
		// Unknown codes and faults are failures with no better description
		assert_eq!(store_outcome(Ok(0xFF00)), (StatusType::Failure, "Unknown"));
		assert_eq!(
			store_outcome(Err(SubOperationError::Timeout)),
			(StatusType::Failure, "Unknown")
		);
	}
}
