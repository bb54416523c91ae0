//! Storage service class (C-STORE).
//! <https://dicom.nema.org/medical/dicom/current/output/chtml/part07/sect_9.1.1.html>

use tracing::{error, instrument, trace};

use super::{validate_status, DispatchError, ServiceClassProvider};
use crate::handler::StoreEvent;
use crate::primitives::{DimseResponse, PresentationContext, StoreRequest, StoreResponse};
use crate::status;

/// Answers a C-STORE request with a single response carrying the handler's
/// status. Warning statuses pass through unchanged; a handler fault is
/// answered with 0xC211.
#[instrument(skip_all, name = "STORE-SCP")]
pub(crate) async fn scp(
	provider: &ServiceClassProvider,
	request: StoreRequest,
	context: &PresentationContext,
) -> Result<(), DispatchError> {
	let mut response = DimseResponse::Store(StoreResponse {
		message_id_being_responded_to: request.message_id,
		affected_sop_class_uid: Some(request.affected_sop_class_uid.clone()),
		affected_sop_instance_uid: Some(request.affected_sop_instance_uid.clone()),
		status: 0x0000,
		error_comment: None,
		offending_element: None,
	});

	let event = StoreEvent {
		request,
		context: context.clone(),
	};
	match provider.handlers().on_c_store(event).await {
		Ok(status) => validate_status(status::storage(), status, &mut response),
		Err(fault) => {
			error!("Handler fault during C-STORE: {fault}");
			// Failure: Cannot Understand - error in handler
			response.set_status(0xC211);
		}
	}

	trace!("Store SCP response: 0x{:04X}", response.status());
	provider.send(response, context.context_id).await
}

#[cfg(test)]
mod tests {
	use bytes::Bytes;

	use super::super::testing::{context_for, provider_with, StubHandlers, TestBench};
	use crate::handler::{HandlerFault, StatusValue};
	use crate::primitives::{DimseRequest, DimseResponse, StoreRequest};
	use crate::types::{Priority, UI};

	const CT_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.2";

	fn store_request() -> DimseRequest {
		DimseRequest::Store(StoreRequest {
			message_id: 11,
			affected_sop_class_uid: UI::from(CT_IMAGE_STORAGE),
			affected_sop_instance_uid: UI::from("1.2.3.4.5"),
			priority: Priority::Medium,
			move_originator_aet: None,
			move_originator_message_id: None,
			data_set: Bytes::from_static(&[0x08, 0x00]),
		})
	}

	#[tokio::test]
	async fn store_success_echoes_instance_uids() {
		let TestBench { scp, channel, .. } =
			provider_with(StubHandlers::default().store(Ok(StatusValue::Code(0x0000))));

		scp.dispatch(store_request(), &context_for(CT_IMAGE_STORAGE))
			.await
			.unwrap();

		let sent = channel.sent();
		assert_eq!(sent.len(), 1);
		let DimseResponse::Store(rsp) = &sent[0] else {
			panic!("expected a C-STORE response");
		};
		assert_eq!(rsp.message_id_being_responded_to, 11);
		assert_eq!(rsp.status, 0x0000);
		assert_eq!(rsp.affected_sop_class_uid.as_deref(), Some(CT_IMAGE_STORAGE));
		assert_eq!(rsp.affected_sop_instance_uid.as_deref(), Some("1.2.3.4.5"));
	}

	#[tokio::test]
	async fn handler_fault_is_cannot_understand() {
		let TestBench { scp, channel, .. } =
			provider_with(StubHandlers::default().store(Err(HandlerFault::new("disk on fire"))));

		scp.dispatch(store_request(), &context_for(CT_IMAGE_STORAGE))
			.await
			.unwrap();

		let sent = channel.sent();
		assert_eq!(sent.len(), 1);
		let DimseResponse::Store(rsp) = &sent[0] else {
			panic!("expected a C-STORE response");
		};
		assert_eq!(rsp.status, 0xC211);
		assert_eq!(rsp.affected_sop_class_uid.as_deref(), Some(CT_IMAGE_STORAGE));
		assert_eq!(rsp.affected_sop_instance_uid.as_deref(), Some("1.2.3.4.5"));
	}

	#[tokio::test]
	async fn warning_statuses_pass_through() {
		for warning in [0xB000, 0xB006, 0xB007] {
			let TestBench { scp, channel, .. } =
				provider_with(StubHandlers::default().store(Ok(StatusValue::Code(warning))));

			scp.dispatch(store_request(), &context_for(CT_IMAGE_STORAGE))
				.await
				.unwrap();

			assert_eq!(channel.sent()[0].status(), warning);
		}
	}
}
