//! Typed DIMSE request and response primitives.
//!
//! These mirror the message primitives of PS3.7 Section 9.1. Encoding them
//! into command sets and P-DATA fragments is the job of the DIMSE layer; the
//! dispatch core only reads and fills their fields.
//! <https://dicom.nema.org/medical/dicom/current/output/chtml/part07/sect_9.3.html>

use bytes::Bytes;
use dicom::core::{PrimitiveValue, Tag};
use dicom::dictionary_std::tags;
use dicom::object::mem::InMemElement;

use crate::types::{AeTitle, Priority, UI, US};

/// The negotiated transfer syntax of a presentation context, reduced to the
/// properties the dataset codec needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSyntax {
	pub uid: UI,
	pub implicit_vr: bool,
	pub little_endian: bool,
}

impl TransferSyntax {
	/// Implicit VR Little Endian, the default transfer syntax every
	/// association must support.
	pub fn implicit_vr_little_endian() -> Self {
		Self {
			uid: UI::from("1.2.840.10008.1.2"),
			implicit_vr: true,
			little_endian: true,
		}
	}
}

/// A presentation context accepted during association negotiation.
/// Exactly one transfer syntax is negotiated per accepted context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentationContext {
	/// The odd, 8-bit presentation context id.
	pub context_id: u8,
	/// The SOP class UID this context was negotiated for.
	pub abstract_syntax: UI,
	pub transfer_syntax: TransferSyntax,
}

/// C-ECHO-RQ
#[derive(Debug, Clone)]
pub struct EchoRequest {
	pub message_id: US,
	pub affected_sop_class_uid: UI,
}

/// C-STORE-RQ
#[derive(Debug, Clone)]
pub struct StoreRequest {
	pub message_id: US,
	pub affected_sop_class_uid: UI,
	pub affected_sop_instance_uid: UI,
	pub priority: Priority,
	pub move_originator_aet: Option<AeTitle>,
	pub move_originator_message_id: Option<US>,
	/// The dataset to store, still in its negotiated transfer syntax.
	pub data_set: Bytes,
}

/// C-FIND-RQ
#[derive(Debug, Clone)]
pub struct FindRequest {
	pub message_id: US,
	pub affected_sop_class_uid: UI,
	pub priority: Priority,
	pub identifier: Bytes,
}

/// C-GET-RQ
#[derive(Debug, Clone)]
pub struct GetRequest {
	pub message_id: US,
	pub affected_sop_class_uid: UI,
	pub priority: Priority,
	pub identifier: Bytes,
}

/// C-MOVE-RQ
#[derive(Debug, Clone)]
pub struct MoveRequest {
	pub message_id: US,
	pub affected_sop_class_uid: UI,
	pub priority: Priority,
	pub move_destination: AeTitle,
	pub identifier: Bytes,
}

/// A request primitive delivered by the DIMSE layer.
#[derive(Debug, Clone)]
pub enum DimseRequest {
	Echo(EchoRequest),
	Store(StoreRequest),
	Find(FindRequest),
	Get(GetRequest),
	Move(MoveRequest),
}

impl DimseRequest {
	pub fn message_id(&self) -> US {
		match self {
			Self::Echo(req) => req.message_id,
			Self::Store(req) => req.message_id,
			Self::Find(req) => req.message_id,
			Self::Get(req) => req.message_id,
			Self::Move(req) => req.message_id,
		}
	}

	pub fn affected_sop_class_uid(&self) -> &UI {
		match self {
			Self::Echo(req) => &req.affected_sop_class_uid,
			Self::Store(req) => &req.affected_sop_class_uid,
			Self::Find(req) => &req.affected_sop_class_uid,
			Self::Get(req) => &req.affected_sop_class_uid,
			Self::Move(req) => &req.affected_sop_class_uid,
		}
	}
}

/// C-CANCEL-RQ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelRequest {
	pub message_id_being_responded_to: US,
}

/// C-ECHO-RSP
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EchoResponse {
	pub message_id_being_responded_to: US,
	pub affected_sop_class_uid: Option<UI>,
	pub status: US,
	pub error_comment: Option<String>,
}

/// C-STORE-RSP
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreResponse {
	pub message_id_being_responded_to: US,
	pub affected_sop_class_uid: Option<UI>,
	pub affected_sop_instance_uid: Option<UI>,
	pub status: US,
	pub error_comment: Option<String>,
	pub offending_element: Option<Vec<Tag>>,
}

/// C-FIND-RSP
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindResponse {
	pub message_id_being_responded_to: US,
	pub affected_sop_class_uid: Option<UI>,
	/// Encoded match identifier. Only Pending responses carry one.
	pub identifier: Option<Bytes>,
	pub status: US,
	pub error_comment: Option<String>,
	pub offending_element: Option<Vec<Tag>>,
}

/// C-GET-RSP / C-MOVE-RSP. The two retrieve services share one response
/// shape; the enclosing [`DimseResponse`] variant carries the service
/// identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrieveResponse {
	pub message_id_being_responded_to: US,
	pub affected_sop_class_uid: Option<UI>,
	/// Encoded identifier. Only Cancel, Failure and Warning terminals carry
	/// one (the Failed SOP Instance UID List).
	pub identifier: Option<Bytes>,
	pub status: US,
	pub error_comment: Option<String>,
	pub offending_element: Option<Vec<Tag>>,
	/// Absent on every terminal response.
	pub remaining_sub_operations: Option<US>,
	pub completed_sub_operations: Option<US>,
	pub failed_sub_operations: Option<US>,
	pub warning_sub_operations: Option<US>,
}

/// A response primitive handed to the DIMSE layer for transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DimseResponse {
	Echo(EchoResponse),
	Store(StoreResponse),
	Find(FindResponse),
	Get(RetrieveResponse),
	Move(RetrieveResponse),
}

impl DimseResponse {
	pub fn status(&self) -> US {
		match self {
			Self::Echo(rsp) => rsp.status,
			Self::Store(rsp) => rsp.status,
			Self::Find(rsp) => rsp.status,
			Self::Get(rsp) | Self::Move(rsp) => rsp.status,
		}
	}

	pub(crate) fn set_status(&mut self, status: US) {
		match self {
			Self::Echo(rsp) => rsp.status = status,
			Self::Store(rsp) => rsp.status = status,
			Self::Find(rsp) => rsp.status = status,
			Self::Get(rsp) | Self::Move(rsp) => rsp.status = status,
		}
	}

	pub(crate) fn set_error_comment(&mut self, comment: Option<String>) {
		match self {
			Self::Echo(rsp) => rsp.error_comment = comment,
			Self::Store(rsp) => rsp.error_comment = comment,
			Self::Find(rsp) => rsp.error_comment = comment,
			Self::Get(rsp) | Self::Move(rsp) => rsp.error_comment = comment,
		}
	}

	pub fn identifier(&self) -> Option<&Bytes> {
		match self {
			Self::Echo(_) | Self::Store(_) => None,
			Self::Find(rsp) => rsp.identifier.as_ref(),
			Self::Get(rsp) | Self::Move(rsp) => rsp.identifier.as_ref(),
		}
	}

	pub(crate) fn set_identifier(&mut self, identifier: Option<Bytes>) {
		match self {
			// C-ECHO and C-STORE responses never carry an identifier
			Self::Echo(_) | Self::Store(_) => {}
			Self::Find(rsp) => rsp.identifier = identifier,
			Self::Get(rsp) | Self::Move(rsp) => rsp.identifier = identifier,
		}
	}

	pub(crate) fn set_sub_operation_counts(
		&mut self,
		remaining: Option<US>,
		completed: US,
		failed: US,
		warning: US,
	) {
		if let Self::Get(rsp) | Self::Move(rsp) = self {
			rsp.remaining_sub_operations = remaining;
			rsp.completed_sub_operations = Some(completed);
			rsp.failed_sub_operations = Some(failed);
			rsp.warning_sub_operations = Some(warning);
		}
	}

	/// Applies one attribute of a handler-returned status dataset to this
	/// primitive. Returns `false` when the primitive has no counterpart for
	/// the element (or its value cannot be read), so the caller can warn.
	pub(crate) fn set_attribute(&mut self, elem: &InMemElement) -> bool {
		let tag = elem.header().tag;
		match tag {
			tags::STATUS => self.apply_int(elem, Self::set_status),
			tags::MESSAGE_ID_BEING_RESPONDED_TO => {
				self.apply_int(elem, |rsp, value| match rsp {
					Self::Echo(rsp) => rsp.message_id_being_responded_to = value,
					Self::Store(rsp) => rsp.message_id_being_responded_to = value,
					Self::Find(rsp) => rsp.message_id_being_responded_to = value,
					Self::Get(rsp) | Self::Move(rsp) => {
						rsp.message_id_being_responded_to = value;
					}
				})
			}
			tags::ERROR_COMMENT => match elem.to_str() {
				Ok(comment) => {
					self.set_error_comment(Some(comment.trim_end().to_string()));
					true
				}
				Err(_) => false,
			},
			tags::OFFENDING_ELEMENT => match elem.value().primitive() {
				Some(PrimitiveValue::Tags(offending)) => {
					let offending = offending.to_vec();
					match self {
						Self::Echo(_) => return false,
						Self::Store(rsp) => rsp.offending_element = Some(offending),
						Self::Find(rsp) => rsp.offending_element = Some(offending),
						Self::Get(rsp) | Self::Move(rsp) => {
							rsp.offending_element = Some(offending);
						}
					}
					true
				}
				_ => false,
			},
			tags::AFFECTED_SOP_CLASS_UID => match elem.to_str() {
				Ok(uid) => {
					let uid = Some(UI::from(uid.trim_end_matches('\0')));
					match self {
						Self::Echo(rsp) => rsp.affected_sop_class_uid = uid,
						Self::Store(rsp) => rsp.affected_sop_class_uid = uid,
						Self::Find(rsp) => rsp.affected_sop_class_uid = uid,
						Self::Get(rsp) | Self::Move(rsp) => rsp.affected_sop_class_uid = uid,
					}
					true
				}
				Err(_) => false,
			},
			tags::AFFECTED_SOP_INSTANCE_UID => match (&mut *self, elem.to_str()) {
				(Self::Store(rsp), Ok(uid)) => {
					rsp.affected_sop_instance_uid = Some(UI::from(uid.trim_end_matches('\0')));
					true
				}
				_ => false,
			},
			tags::NUMBER_OF_REMAINING_SUBOPERATIONS => self.apply_count(elem, |rsp, value| {
				rsp.remaining_sub_operations = Some(value);
			}),
			tags::NUMBER_OF_COMPLETED_SUBOPERATIONS => self.apply_count(elem, |rsp, value| {
				rsp.completed_sub_operations = Some(value);
			}),
			tags::NUMBER_OF_FAILED_SUBOPERATIONS => self.apply_count(elem, |rsp, value| {
				rsp.failed_sub_operations = Some(value);
			}),
			tags::NUMBER_OF_WARNING_SUBOPERATIONS => self.apply_count(elem, |rsp, value| {
				rsp.warning_sub_operations = Some(value);
			}),
			_ => false,
		}
	}

	fn apply_int(&mut self, elem: &InMemElement, apply: impl FnOnce(&mut Self, US)) -> bool {
		match elem.to_int::<US>() {
			Ok(value) => {
				apply(self, value);
				true
			}
			Err(_) => false,
		}
	}

	fn apply_count(
		&mut self,
		elem: &InMemElement,
		apply: impl FnOnce(&mut RetrieveResponse, US),
	) -> bool {
		match (&mut *self, elem.to_int::<US>()) {
			(Self::Get(rsp) | Self::Move(rsp), Ok(value)) => {
				apply(rsp, value);
				true
			}
			_ => false,
		}
	}
}

#[cfg(test)]
mod tests {
	use dicom::core::{DataElement, VR};
	use dicom::dicom_value;

	use super::*;

	#[test]
	fn status_attribute_applies_to_every_variant() {
		let mut rsp = DimseResponse::Find(FindResponse::default());
		let elem = DataElement::new(tags::STATUS, VR::US, dicom_value!(U16, [0xFF00]));
		assert!(rsp.set_attribute(&elem));
		assert_eq!(rsp.status(), 0xFF00);
	}

	#[test]
	fn instance_uid_is_store_only() {
		let elem = DataElement::new(
			tags::AFFECTED_SOP_INSTANCE_UID,
			VR::UI,
			dicom_value!(Str, "1.2.3.4"),
		);

		let mut store = DimseResponse::Store(StoreResponse::default());
		assert!(store.set_attribute(&elem));

		let mut find = DimseResponse::Find(FindResponse::default());
		assert!(!find.set_attribute(&elem));
	}

	#[test]
	fn counters_are_retrieve_only() {
		let elem = DataElement::new(
			tags::NUMBER_OF_FAILED_SUBOPERATIONS,
			VR::US,
			dicom_value!(U16, [3]),
		);

		let mut get = DimseResponse::Get(RetrieveResponse::default());
		assert!(get.set_attribute(&elem));
		if let DimseResponse::Get(rsp) = &get {
			assert_eq!(rsp.failed_sub_operations, Some(3));
		}

		let mut echo = DimseResponse::Echo(EchoResponse::default());
		assert!(!echo.set_attribute(&elem));
	}

	#[test]
	fn unknown_attribute_is_reported() {
		let mut rsp = DimseResponse::Echo(EchoResponse::default());
		let elem = DataElement::new(tags::PATIENT_NAME, VR::PN, dicom_value!(Str, "DOE^JOHN"));
		assert!(!rsp.set_attribute(&elem));
	}
}
