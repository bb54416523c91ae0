//! Verification service class (C-ECHO).
//! <https://dicom.nema.org/medical/dicom/current/output/chtml/part07/sect_9.1.5.html>

use tracing::{error, instrument, trace};

use super::{validate_status, DispatchError, ServiceClassProvider};
use crate::handler::EchoEvent;
use crate::primitives::{DimseResponse, EchoRequest, EchoResponse, PresentationContext};
use crate::status;

/// Answers a C-ECHO request with a single response.
///
/// The status is Success unless the handler returns a different valid value;
/// a handler fault also results in Success, as the standard mandates for
/// verification.
#[instrument(skip_all, name = "ECHO-SCP")]
pub(crate) async fn scp(
	provider: &ServiceClassProvider,
	request: EchoRequest,
	context: &PresentationContext,
) -> Result<(), DispatchError> {
	let mut response = DimseResponse::Echo(EchoResponse {
		message_id_being_responded_to: request.message_id,
		affected_sop_class_uid: Some(request.affected_sop_class_uid.clone()),
		status: 0x0000,
		error_comment: None,
	});

	let event = EchoEvent {
		request,
		context: context.clone(),
	};
	match provider.handlers().on_c_echo(event).await {
		Ok(status) => validate_status(status::verification(), status, &mut response),
		Err(fault) => {
			error!(
				"Handler fault during C-ECHO, responding with a default Status of \
				 0x0000 (Success): {fault}"
			);
			response.set_status(0x0000);
		}
	}

	trace!("Echo SCP response: 0x{:04X}", response.status());
	provider.send(response, context.context_id).await
}

#[cfg(test)]
mod tests {
	use dicom::core::{DataElement, VR};
	use dicom::dicom_value;
	use dicom::dictionary_std::tags;
	use dicom::object::InMemDicomObject;

	use super::super::testing::{context_for, provider_with, StubHandlers, TestBench};
	use super::super::VERIFICATION_SOP_CLASS;
	use crate::handler::{HandlerFault, StatusValue};
	use crate::primitives::{DimseRequest, DimseResponse, EchoRequest};
	use crate::types::UI;

	fn echo_request() -> DimseRequest {
		DimseRequest::Echo(EchoRequest {
			message_id: 7,
			affected_sop_class_uid: UI::from(VERIFICATION_SOP_CLASS),
		})
	}

	#[tokio::test]
	async fn echo_success() {
		let TestBench { scp, channel, .. } =
			provider_with(StubHandlers::default().echo(Ok(StatusValue::Code(0x0000))));

		scp.dispatch(echo_request(), &context_for(VERIFICATION_SOP_CLASS))
			.await
			.unwrap();

		let sent = channel.sent();
		assert_eq!(sent.len(), 1);
		let DimseResponse::Echo(rsp) = &sent[0] else {
			panic!("expected a C-ECHO response");
		};
		assert_eq!(rsp.message_id_being_responded_to, 7);
		assert_eq!(rsp.status, 0x0000);
		assert_eq!(
			rsp.affected_sop_class_uid.as_deref(),
			Some(VERIFICATION_SOP_CLASS)
		);
	}

	#[tokio::test]
	async fn handler_fault_defaults_to_success() {
		let TestBench { scp, channel, .. } =
			provider_with(StubHandlers::default().echo(Err(HandlerFault::new("echo exploded"))));

		scp.dispatch(echo_request(), &context_for(VERIFICATION_SOP_CLASS))
			.await
			.unwrap();

		let sent = channel.sent();
		assert_eq!(sent.len(), 1);
		assert_eq!(sent[0].status(), 0x0000);
	}

	#[tokio::test]
	async fn refused_status_from_dataset_is_passed_through() {
		let status = InMemDicomObject::from_element_iter([
			DataElement::new(tags::STATUS, VR::US, dicom_value!(U16, [0x0122])),
			DataElement::new(
				tags::ERROR_COMMENT,
				VR::LO,
				dicom_value!(Str, "SOP class not supported"),
			),
		]);
		let TestBench { scp, channel, .. } =
			provider_with(StubHandlers::default().echo(Ok(StatusValue::Dataset(status))));

		scp.dispatch(echo_request(), &context_for(VERIFICATION_SOP_CLASS))
			.await
			.unwrap();

		let sent = channel.sent();
		let DimseResponse::Echo(rsp) = &sent[0] else {
			panic!("expected a C-ECHO response");
		};
		assert_eq!(rsp.status, 0x0122);
		assert_eq!(rsp.error_comment.as_deref(), Some("SOP class not supported"));
	}
}
