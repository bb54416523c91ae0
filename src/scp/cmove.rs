//! Query/Retrieve MOVE service class (C-MOVE).
//!
//! Matched datasets are relayed through C-STORE sub-operations on a freshly
//! opened outbound association to the move destination AE. The outbound
//! association is owned by the running request and released on every exit
//! path.
//! <https://dicom.nema.org/medical/dicom/current/output/chtml/part07/sect_9.1.4.html>

use tracing::{debug, error, info, instrument, warn};

use super::cget::finish_retrieve;
use super::subop::{self, SubOperationTracker};
use super::{
	validate_status, DispatchError, ServiceClassProvider, RETRIEVE_WITHOUT_BULK_DATA_SOP_CLASS,
};
use crate::association::SubAssociation;
use crate::handler::{MoveEvent, Producer, ProducerItem, PrologueError, StatusValue};
use crate::primitives::{
	DimseResponse, MoveRequest, PresentationContext, RetrieveResponse, TransferSyntax,
};
use crate::status::{self, StatusType};
use crate::types::US;

/// How the sub-operation loop ended.
enum MoveFlow {
	/// A terminal response was prepared and must be sent after the outbound
	/// association is released.
	Terminal,
	/// The producer ran dry; the final Success/Warning response is still to
	/// be built.
	Exhausted,
}

/// Drives a C-MOVE request: the handler yields the destination and the
/// sub-operation count, then `(status, dataset)` pairs relayed to the
/// destination AE.
#[instrument(skip_all, name = "MOVE-SCP")]
pub(crate) async fn scp(
	provider: &ServiceClassProvider,
	request: MoveRequest,
	context: &PresentationContext,
) -> Result<(), DispatchError> {
	let transfer_syntax = &context.transfer_syntax;
	let request_message_id = request.message_id;
	let move_destination = request.move_destination;

	let mut response = DimseResponse::Move(RetrieveResponse {
		message_id_being_responded_to: request.message_id,
		affected_sop_class_uid: Some(request.affected_sop_class_uid.clone()),
		..RetrieveResponse::default()
	});

	// Decode and log the request identifier.
	match provider.codec().decode(
		&request.identifier,
		transfer_syntax.implicit_vr,
		transfer_syntax.little_endian,
	) {
		Ok(identifier) => {
			debug!("Move SCP request identifier:");
			for elem in identifier.iter() {
				debug!("{elem:?}");
			}
		}
		Err(err) => {
			error!("Failed to decode the request's identifier dataset: {err}");
			response.set_status(0xC510);
			response.set_error_comment(Some(String::from("Unable to decode the dataset")));
			return provider.send(response, context.context_id).await;
		}
	}

	let event = MoveEvent {
		request,
		context: context.clone(),
		cancelled: provider.cancel_probe(),
	};
	let mut producer = match provider.handlers().on_c_move(event).await {
		Ok(producer) => producer,
		Err(fault) => {
			error!("Handler fault while starting C-MOVE: {fault}");
			response.set_status(0xC511);
			return provider.send(response, context.context_id).await;
		}
	};

	let destination = match producer.expect_destination().await {
		Ok(destination) => destination,
		Err(err) => {
			error!(
				"The C-MOVE handler must first yield the (address, port) of the \
				 destination AE, then the number of sub-operations: {err:?}"
			);
			response.set_status(0xC514);
			return provider.send(response, context.context_id).await;
		}
	};
	let total = match producer.expect_count().await {
		Ok(total) => total,
		Err(PrologueError::WrongShape) => {
			error!("The C-MOVE handler yielded an invalid number of sub-operations");
			response.set_status(0xC513);
			return provider.send(response, context.context_id).await;
		}
		Err(err) => {
			error!("The C-MOVE handler did not yield a number of sub-operations: {err:?}");
			response.set_status(0xC514);
			return provider.send(response, context.context_id).await;
		}
	};

	let (Some(address), Some(port)) = (destination.address, destination.port) else {
		error!("Unknown move destination: {move_destination}");
		response.set_status(0xA801);
		return provider.send(response, context.context_id).await;
	};

	let association = match provider
		.connector()
		.associate(
			&address,
			port,
			move_destination,
			provider.config().associate_timeout(),
		)
		.await
	{
		Ok(association) => association,
		Err(err) => {
			// The connector guarantees the transport is already closed.
			error!("Move SCP: unable to associate with destination AE: {err}");
			response.set_status(0xA801);
			return provider.send(response, context.context_id).await;
		}
	};
	info!("Move SCP: {total} sub-operations to {address}:{port}");

	let mut tracker = SubOperationTracker::new(total);
	let without_bulk_data = context.abstract_syntax == RETRIEVE_WITHOUT_BULK_DATA_SOP_CLASS;

	let flow = run_sub_operations(
		provider,
		&mut producer,
		&mut tracker,
		&mut response,
		association.as_ref(),
		transfer_syntax,
		context,
		request_message_id,
		without_bulk_data,
	)
	.await;

	// Release on every exit path, before the terminal response goes out.
	association.release().await;

	match flow {
		Ok(MoveFlow::Terminal) => provider.send(response, context.context_id).await,
		Ok(MoveFlow::Exhausted) => {
			finish_retrieve(provider, response, &tracker, transfer_syntax, context.context_id)
				.await
		}
		Err(err) => Err(err),
	}
}

#[allow(clippy::too_many_arguments)]
async fn run_sub_operations(
	provider: &ServiceClassProvider,
	producer: &mut Producer,
	tracker: &mut SubOperationTracker,
	response: &mut DimseResponse,
	association: &dyn SubAssociation,
	transfer_syntax: &TransferSyntax,
	context: &PresentationContext,
	request_message_id: US,
	without_bulk_data: bool,
) -> Result<MoveFlow, DispatchError> {
	let registry = status::qr_move();
	let originator_aet = provider.config().ae_title();
	let mut index = 0_usize;

	while let Some(item) = producer.next().await {
		let (status, dataset) = match item {
			Ok(ProducerItem::Pair(status, dataset)) => (status, dataset),
			Ok(other) => {
				error!("C-MOVE handler yielded {other:?} instead of a (status, dataset) pair");
				(StatusValue::Code(0xC511), None)
			}
			Err(fault) => {
				error!("Fault in C-MOVE request handler: {fault}");
				(StatusValue::Code(0xC511), None)
			}
		};

		if tracker.remaining() == 0 {
			warn!(
				"C-MOVE handler yielded further (status, dataset) results, but these are \
				 ignored as the sub-operations are complete"
			);
			break;
		}

		validate_status(registry, status, response);
		let Some(entry) = registry.get(response.status()) else {
			// Unknown status codes are sent once, as the terminal response.
			return Ok(MoveFlow::Terminal);
		};

		match entry.status_type {
			StatusType::Cancel => {
				info!("Move SCP received C-CANCEL-MOVE RQ from peer");
				let identifier = subop::terminal_identifier_bytes(
					provider.codec(),
					dataset,
					tracker,
					transfer_syntax,
				);
				response.set_identifier(identifier);
				response.set_sub_operation_counts(
					Some(tracker.remaining()),
					tracker.completed(),
					tracker.failed(),
					tracker.warning(),
				);
				return Ok(MoveFlow::Terminal);
			}
			StatusType::Failure | StatusType::Warning => {
				info!(
					description = entry.description,
					"Move SCP result ({:?})", entry.status_type
				);
				let identifier = subop::terminal_identifier_bytes(
					provider.codec(),
					dataset,
					tracker,
					transfer_syntax,
				);
				response.set_identifier(identifier);
				response.set_sub_operation_counts(
					None,
					tracker.completed(),
					tracker.failed_with_remaining(),
					tracker.warning(),
				);
				return Ok(MoveFlow::Terminal);
			}
			StatusType::Success => return Ok(MoveFlow::Exhausted),
			StatusType::Pending => {
				let Some(mut dataset) = dataset else {
					error!("Received invalid dataset from C-MOVE handler");
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
				let outcome = association
					.send_c_store(
						&dataset,
						message_id,
						originator_aet,
						MOVE_ORIGINATOR_ID,
						provider.config().sub_operation_timeout(),
					)
					.await;
				let (status_type, _description) = subop::store_outcome(outcome);
				info!("Move SCP: received Store SCU response ({status_type:?})");
				tracker.record_outcome(status_type, &dataset);

				response.set_identifier(None);
				response.set_sub_operation_counts(
					Some(tracker.remaining()),
					tracker.completed(),
					tracker.failed(),
					tracker.warning(),
				);
				info!("Move SCP response {} (Pending)", index + 1);
				provider.send(response.clone(), context.context_id).await?;
				index += 1;
			}
		}
	}

	Ok(MoveFlow::Exhausted)
}

/// *Move Originator Message ID* attached to every C-MOVE sub-operation.
const MOVE_ORIGINATOR_ID: US = 1;
