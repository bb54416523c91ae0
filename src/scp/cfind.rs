//! Find service classes (C-FIND).
//!
//! Serves Query/Retrieve FIND, Basic Worklist Management and Substance
//! Administration Query, plus the single-match variant used by Relevant
//! Patient Information Query.
//! <https://dicom.nema.org/medical/dicom/current/output/chtml/part07/sect_9.1.2.html>

use tracing::{debug, error, info, instrument, warn};

use super::{validate_status, DispatchError, ServiceClassProvider};
use crate::handler::{FindEvent, ProducerItem, StatusValue};
use crate::primitives::{
	DimseResponse, FindRequest, FindResponse, PresentationContext, TransferSyntax,
};
use crate::status::{self, StatusRegistry, StatusType};

fn build_response(request: &FindRequest) -> DimseResponse {
	DimseResponse::Find(FindResponse {
		message_id_being_responded_to: request.message_id,
		affected_sop_class_uid: Some(request.affected_sop_class_uid.clone()),
		..FindResponse::default()
	})
}

/// Decodes the request identifier, logging its elements. On failure the
/// response is primed with `failure_status` and ready to send.
fn decode_request_identifier(
	provider: &ServiceClassProvider,
	request: &FindRequest,
	transfer_syntax: &TransferSyntax,
	response: &mut DimseResponse,
	failure_status: u16,
) -> bool {
	match provider.codec().decode(
		&request.identifier,
		transfer_syntax.implicit_vr,
		transfer_syntax.little_endian,
	) {
		Ok(identifier) => {
			debug!("Find SCP request identifier:");
			for elem in identifier.iter() {
				debug!("{elem:?}");
			}
			true
		}
		Err(err) => {
			error!("Failed to decode the request's identifier dataset: {err}");
			response.set_status(failure_status);
			response.set_error_comment(Some(String::from("Unable to decode the dataset")));
			false
		}
	}
}

/// Streams the handler's matches to the peer, one Pending response per
/// match, then terminates with Success unless the handler yielded a terminal
/// status first.
#[instrument(skip_all, name = "FIND-SCP")]
pub(crate) async fn scp(
	provider: &ServiceClassProvider,
	request: FindRequest,
	context: &PresentationContext,
	registry: &StatusRegistry,
) -> Result<(), DispatchError> {
	let transfer_syntax = &context.transfer_syntax;
	let mut response = build_response(&request);

	if !decode_request_identifier(provider, &request, transfer_syntax, &mut response, 0xC310) {
		return provider.send(response, context.context_id).await;
	}

	let event = FindEvent {
		request,
		context: context.clone(),
		cancelled: provider.cancel_probe(),
	};
	let mut producer = match provider.handlers().on_c_find(event).await {
		Ok(producer) => producer,
		Err(fault) => {
			error!("Handler fault while starting C-FIND: {fault}");
			response.set_status(0xC311);
			return provider.send(response, context.context_id).await;
		}
	};

	let mut matches = 0_usize;
	while let Some(item) = producer.next().await {
		let (status, identifier) = match item {
			Ok(ProducerItem::Pair(status, identifier)) => (status, identifier),
			Ok(other) => {
				error!("C-FIND handler yielded {other:?} instead of a (status, identifier) pair");
				(StatusValue::Code(0xC311), None)
			}
			Err(fault) => {
				error!("Fault in C-FIND request handler: {fault}");
				(StatusValue::Code(0xC311), None)
			}
		};

		validate_status(registry, status, &mut response);
		let Some(entry) = registry.get(response.status()) else {
			// Unknown status codes are sent once, as the terminal response.
			return provider.send(response, context.context_id).await;
		};

		match entry.status_type {
			StatusType::Cancel => {
				info!("Received C-CANCEL-FIND RQ from peer");
				info!("Find SCP response: (Cancel)");
				return provider.send(response, context.context_id).await;
			}
			StatusType::Failure => {
				info!(
					description = entry.description,
					"Find SCP response: (Failure)"
				);
				return provider.send(response, context.context_id).await;
			}
			StatusType::Success => {
				// Handlers are not expected to yield Success themselves, but
				// it terminates the stream all the same.
				info!("Find SCP response: {} (Success)", matches + 1);
				return provider.send(response, context.context_id).await;
			}
			StatusType::Pending => {
				let encoded = identifier
					.as_ref()
					.and_then(|dataset| {
						provider
							.codec()
							.encode(
								dataset,
								transfer_syntax.implicit_vr,
								transfer_syntax.little_endian,
							)
							.ok()
					})
					.unwrap_or_default();
				if encoded.is_empty() {
					error!("Failed to encode the identifier dataset returned by the handler");
					response.set_status(0xC312);
					return provider.send(response, context.context_id).await;
				}

				response.set_identifier(Some(encoded));
				matches += 1;
				info!("Find SCP response: {matches} (Pending)");
				provider.send(response.clone(), context.context_id).await?;
				response.set_identifier(None);
			}
			StatusType::Warning => {
				// No warning code belongs to the C-FIND status set; the
				// yield is skipped without a response.
				warn!(
					status = response.status(),
					"Ignoring warning status yielded by C-FIND handler"
				);
			}
		}
	}

	response.set_status(0x0000);
	response.set_identifier(None);
	info!("Find SCP response: {} (Success)", matches + 1);
	provider.send(response, context.context_id).await
}

/// The single-match C-FIND variant of Relevant Patient Information Query:
/// at most one match may be returned, and a Pending match is followed
/// immediately by the final Success response. The producer is deliberately
/// never polled past its first yield.
#[instrument(skip_all, name = "FIND-SCP")]
pub(crate) async fn relevant_patient_scp(
	provider: &ServiceClassProvider,
	request: FindRequest,
	context: &PresentationContext,
) -> Result<(), DispatchError> {
	let registry = status::relevant_patient();
	let transfer_syntax = &context.transfer_syntax;
	let mut response = build_response(&request);

	if !decode_request_identifier(provider, &request, transfer_syntax, &mut response, 0xC310) {
		return provider.send(response, context.context_id).await;
	}

	let event = FindEvent {
		request,
		context: context.clone(),
		cancelled: provider.cancel_probe(),
	};
	let mut producer = match provider.handlers().on_c_find(event).await {
		Ok(producer) => producer,
		Err(fault) => {
			error!("Handler fault while starting C-FIND: {fault}");
			response.set_status(0xC311);
			return provider.send(response, context.context_id).await;
		}
	};

	let (status, identifier) = match producer.next().await {
		None => {
			// No matches
			info!("Find SCP response: (Success)");
			response.set_status(0x0000);
			return provider.send(response, context.context_id).await;
		}
		Some(Ok(ProducerItem::Pair(status, identifier))) => (status, identifier),
		Some(Ok(other)) => {
			error!("C-FIND handler yielded {other:?} instead of a (status, identifier) pair");
			(StatusValue::Code(0xC311), None)
		}
		Some(Err(fault)) => {
			error!("Fault in C-FIND request handler: {fault}");
			(StatusValue::Code(0xC311), None)
		}
	};
	drop(producer);

	validate_status(registry, status, &mut response);
	let Some(entry) = registry.get(response.status()) else {
		return provider.send(response, context.context_id).await;
	};

	if entry.status_type == StatusType::Pending {
		let encoded = identifier
			.as_ref()
			.and_then(|dataset| {
				provider
					.codec()
					.encode(
						dataset,
						transfer_syntax.implicit_vr,
						transfer_syntax.little_endian,
					)
					.ok()
			})
			.unwrap_or_default();
		if encoded.is_empty() {
			error!("Failed to encode the identifier dataset returned by the handler");
			response.set_status(0xC312);
			return provider.send(response, context.context_id).await;
		}

		response.set_identifier(Some(encoded));
		info!("Find SCP response: (Pending)");
		provider.send(response.clone(), context.context_id).await?;

		// The single match is immediately followed by the final response.
		response.set_identifier(None);
		response.set_status(0x0000);
		info!("Find SCP response: (Success)");
		return provider.send(response, context.context_id).await;
	}

	if entry.status_type == StatusType::Cancel {
		info!("Received C-CANCEL-FIND RQ from peer");
	}
	info!(
		description = entry.description,
		"Find SCP response: ({:?})", entry.status_type
	);
	provider.send(response, context.context_id).await
}
