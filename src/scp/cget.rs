//! Query/Retrieve GET service class (C-GET).
//!
//! Each pending match is relayed to the peer through a nested C-STORE
//! sub-operation on the association the request arrived on.
//! <https://dicom.nema.org/medical/dicom/current/output/chtml/part07/sect_9.1.3.html>

use tracing::{error, info, instrument, warn};

use super::subop::{self, SubOperationTracker};
use super::{validate_status, DispatchError, ServiceClassProvider, RETRIEVE_WITHOUT_BULK_DATA_SOP_CLASS};
use crate::handler::{GetEvent, ProducerItem, StatusValue};
use crate::primitives::{
	DimseResponse, GetRequest, PresentationContext, RetrieveResponse, TransferSyntax,
};
use crate::status::{self, StatusType};
#[cfg(test)]
use crate::types::US;

/// Drives a C-GET request: the handler announces the number of
/// sub-operations, then yields `(status, dataset)` pairs. Every dataset is
/// forwarded with a nested C-STORE on the current association and answered
/// with a Pending response carrying the sub-operation counters.
#[instrument(skip_all, name = "GET-SCP")]
pub(crate) async fn scp(
	provider: &ServiceClassProvider,
	request: GetRequest,
	context: &PresentationContext,
) -> Result<(), DispatchError> {
	let registry = status::qr_get();
	let transfer_syntax = &context.transfer_syntax;
	let request_message_id = request.message_id;
	let without_bulk_data = context.abstract_syntax == RETRIEVE_WITHOUT_BULK_DATA_SOP_CLASS;

	let mut response = DimseResponse::Get(RetrieveResponse {
		message_id_being_responded_to: request.message_id,
		affected_sop_class_uid: Some(request.affected_sop_class_uid.clone()),
		..RetrieveResponse::default()
	});

	let event = GetEvent {
		request,
		context: context.clone(),
		cancelled: provider.cancel_probe(),
	};
	let mut producer = match provider.handlers().on_c_get(event).await {
		Ok(producer) => producer,
		Err(fault) => {
			error!("Handler fault while starting C-GET: {fault}");
			response.set_status(0xC411);
			return provider.send(response, context.context_id).await;
		}
	};

	let total = match producer.expect_count().await {
		Ok(total) => total,
		Err(err) => {
			error!("C-GET handler did not yield a usable number of sub-operations: {err:?}");
			response.set_status(0xC413);
			return provider.send(response, context.context_id).await;
		}
	};
	info!("Get SCP: {total} sub-operations to perform");

	let mut tracker = SubOperationTracker::new(total);
	let mut index = 0_usize;

	while let Some(item) = producer.next().await {
		let (status, dataset) = match item {
			Ok(ProducerItem::Pair(status, dataset)) => (status, dataset),
			Ok(other) => {
				error!("C-GET handler yielded {other:?} instead of a (status, dataset) pair");
				(StatusValue::Code(0xC411), None)
			}
			Err(fault) => {
				error!("Fault in C-GET request handler: {fault}");
				(StatusValue::Code(0xC411), None)
			}
		};

		if tracker.remaining() == 0 {
			warn!(
				"C-GET handler yielded further (status, dataset) results, but these are \
				 ignored as the sub-operations are complete"
			);
			break;
		}

		validate_status(registry, status, &mut response);
		let Some(entry) = registry.get(response.status()) else {
			// Unknown status codes are sent once, as the terminal response.
			return provider.send(response, context.context_id).await;
		};

		match entry.status_type {
			StatusType::Cancel => {
				info!("Get SCP received C-CANCEL-GET RQ from peer");
				let identifier = subop::terminal_identifier_bytes(
					provider.codec(),
					dataset,
					&tracker,
					transfer_syntax,
				);
				response.set_identifier(identifier);
				response.set_sub_operation_counts(
					Some(tracker.remaining()),
					tracker.completed(),
					tracker.failed(),
					tracker.warning(),
				);
				return provider.send(response, context.context_id).await;
			}
			StatusType::Failure | StatusType::Warning => {
				info!(
					description = entry.description,
					"Get SCP result ({:?})", entry.status_type
				);
				let identifier = subop::terminal_identifier_bytes(
					provider.codec(),
					dataset,
					&tracker,
					transfer_syntax,
				);
				response.set_identifier(identifier);
				response.set_sub_operation_counts(
					None,
					tracker.completed(),
					tracker.failed_with_remaining(),
					tracker.warning(),
				);
				return provider.send(response, context.context_id).await;
			}
			StatusType::Success => {
				return finish_retrieve(
					provider,
					response,
					&tracker,
					transfer_syntax,
					context.context_id,
				)
				.await;
			}
			StatusType::Pending => {
				let Some(mut dataset) = dataset else {
					error!("Received invalid dataset from C-GET handler");
					tracker.record_invalid_dataset();
					response.set_identifier(None);
					response.set_sub_operation_counts(
						Some(tracker.remaining()),
						tracker.completed(),
						tracker.failed(),
						tracker.warning(),
					);
					provider.send(response.clone(), context.context_id).await?;
					index += 1;
					continue;
				};

				if without_bulk_data {
					let removed = subop::strip_bulk_data(&mut dataset);
					if !removed.is_empty() {
						warn!(
							"Removed bulk data elements from the dataset to be retrieved: {}",
							removed.join(",")
						);
					}
				}

				let message_id = subop::sub_operation_message_id(request_message_id, index);
				let outcome = provider
					.sub_operations()
					.send_c_store(
						&dataset,
						message_id,
						provider.config().sub_operation_timeout(),
					)
					.await;
				let (status_type, _description) = subop::store_outcome(outcome);
				info!("Get SCP: received Store SCU response ({status_type:?})");
				tracker.record_outcome(status_type, &dataset);

				response.set_identifier(None);
				response.set_sub_operation_counts(
					Some(tracker.remaining()),
					tracker.completed(),
					tracker.failed(),
					tracker.warning(),
				);
				info!("Get SCP response {} (Pending)", index + 1);
				provider.send(response.clone(), context.context_id).await?;
				index += 1;
			}
		}
	}

	finish_retrieve(provider, response, &tracker, transfer_syntax, context.context_id).await
}

/// Emits the final response of a retrieve protocol: Success when every
/// sub-operation succeeded, otherwise Warning with the failed SOP instance
/// UID list attached.
pub(super) async fn finish_retrieve(
	provider: &ServiceClassProvider,
	mut response: DimseResponse,
	tracker: &SubOperationTracker,
	transfer_syntax: &TransferSyntax,
	context_id: u8,
) -> Result<(), DispatchError> {
	if tracker.has_failures_or_warnings() {
		info!("Retrieve SCP result: (Warning)");
		response.set_status(0xB000);
		let identifier =
			subop::terminal_identifier_bytes(provider.codec(), None, tracker, transfer_syntax);
		response.set_identifier(identifier);
	} else {
		info!("Retrieve SCP result: (Success)");
		response.set_status(0x0000);
		response.set_identifier(None);
	}
	response.set_sub_operation_counts(
		None,
		tracker.completed(),
		tracker.failed(),
		tracker.warning(),
	);
	provider.send(response, context_id).await
}

/// Reads the sub-operation counters of a retrieve response as the tuple
/// `(remaining, failed, warning, completed)`.
#[cfg(test)]
pub(super) fn counters_of(response: &RetrieveResponse) -> (Option<US>, US, US, US) {
	(
		response.remaining_sub_operations,
		response.failed_sub_operations.unwrap_or_default(),
		response.warning_sub_operations.unwrap_or_default(),
		response.completed_sub_operations.unwrap_or_default(),
	)
}
