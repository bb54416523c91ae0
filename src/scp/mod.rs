//! Service-class dispatch for the provider side of an association.
//!
//! [`ServiceClassProvider::dispatch`] selects the protocol that serves a
//! request primitive from the abstract syntax of its presentation context
//! and drives it to the terminal response. One invocation owns the response
//! channel of its context from the first emitted primitive through the
//! terminal one.

mod cecho;
mod cfind;
mod cget;
mod cmove;
mod cstore;
mod subop;

use std::sync::Arc;

use dicom::dictionary_std::tags;
use thiserror::Error;
use tracing::{error, instrument, warn};

use crate::association::{MoveConnector, StoreSubOperations};
use crate::channel::{CancelMap, MessageChannel, SendError};
use crate::codec::IdentifierCodec;
use crate::config::ScpConfig;
use crate::handler::{CancelProbe, ServiceHandlers, StatusValue};
use crate::primitives::{DimseRequest, DimseResponse, PresentationContext};
use crate::status::{self, StatusRegistry};
use crate::types::{UI, US};

/// Verification SOP Class.
pub const VERIFICATION_SOP_CLASS: &str = "1.2.840.10008.1.1";

/// SOP classes answered by the C-FIND protocol of the Query/Retrieve
/// service class.
pub const QUERY_RETRIEVE_FIND_SOP_CLASSES: [&str; 10] = [
	"1.2.840.10008.5.1.4.1.2.1.1",
	"1.2.840.10008.5.1.4.1.2.2.1",
	"1.2.840.10008.5.1.4.1.2.3.1",
	"1.2.840.10008.5.1.4.20.1",
	"1.2.840.10008.5.1.4.38.2",
	"1.2.840.10008.5.1.4.39.2",
	"1.2.840.10008.5.1.4.43.2",
	"1.2.840.10008.5.1.4.44.2",
	"1.2.840.10008.5.1.4.45.2",
	"1.2.840.10008.5.1.4.1.1.200.4",
];

/// SOP classes answered by the C-GET protocol.
pub const QUERY_RETRIEVE_GET_SOP_CLASSES: [&str; 12] = [
	"1.2.840.10008.5.1.4.1.2.1.3",
	"1.2.840.10008.5.1.4.1.2.2.3",
	"1.2.840.10008.5.1.4.1.2.3.3",
	"1.2.840.10008.5.1.4.1.2.4.3",
	"1.2.840.10008.5.1.4.1.2.5.3",
	"1.2.840.10008.5.1.4.20.3",
	"1.2.840.10008.5.1.4.38.4",
	"1.2.840.10008.5.1.4.39.4",
	"1.2.840.10008.5.1.4.43.4",
	"1.2.840.10008.5.1.4.44.4",
	"1.2.840.10008.5.1.4.45.4",
	"1.2.840.10008.5.1.4.1.1.200.6",
];

/// SOP classes answered by the C-MOVE protocol.
pub const QUERY_RETRIEVE_MOVE_SOP_CLASSES: [&str; 11] = [
	"1.2.840.10008.5.1.4.1.2.1.2",
	"1.2.840.10008.5.1.4.1.2.2.2",
	"1.2.840.10008.5.1.4.1.2.3.2",
	"1.2.840.10008.5.1.4.1.2.4.2",
	"1.2.840.10008.5.1.4.20.2",
	"1.2.840.10008.5.1.4.38.3",
	"1.2.840.10008.5.1.4.39.3",
	"1.2.840.10008.5.1.4.43.3",
	"1.2.840.10008.5.1.4.44.3",
	"1.2.840.10008.5.1.4.45.3",
	"1.2.840.10008.5.1.4.1.1.200.5",
];

/// Basic Worklist Management only permits C-FIND.
pub const BASIC_WORKLIST_SOP_CLASSES: [&str; 1] = ["1.2.840.10008.5.1.4.31"];

/// Relevant Patient Information Query only permits the single-match C-FIND
/// variant.
pub const RELEVANT_PATIENT_SOP_CLASSES: [&str; 3] = [
	"1.2.840.10008.5.1.4.37.1",
	"1.2.840.10008.5.1.4.37.2",
	"1.2.840.10008.5.1.4.37.3",
];

/// Substance Administration Query only permits C-FIND.
pub const SUBSTANCE_ADMINISTRATION_SOP_CLASSES: [&str; 2] =
	["1.2.840.10008.5.1.4.41", "1.2.840.10008.5.1.4.42"];

/// Composite Instance Retrieve Without Bulk Data - GET. Datasets relayed
/// under this SOP class have their bulk data elements removed.
pub const RETRIEVE_WITHOUT_BULK_DATA_SOP_CLASS: &str = "1.2.840.10008.5.1.4.1.2.5.3";

#[derive(Debug, Error)]
pub enum DispatchError {
	/// No service class claims the abstract syntax of the presentation
	/// context. The association layer decides how to answer (usually with an
	/// abort, since negotiation should have rejected the context).
	#[error("No service class supports the abstract syntax '{0}'")]
	InvalidAbstractSyntax(UI),
	/// Transmitting a response failed or timed out. Fatal to the request.
	#[error(transparent)]
	Send(#[from] SendError),
}

/// Collaborators and configuration of a [`ServiceClassProvider`].
pub struct ServiceClassProviderOptions {
	pub channel: Arc<dyn MessageChannel>,
	pub codec: Arc<dyn IdentifierCodec>,
	pub handlers: Arc<dyn ServiceHandlers>,
	pub sub_operations: Arc<dyn StoreSubOperations>,
	pub connector: Arc<dyn MoveConnector>,
	pub cancels: Arc<CancelMap>,
	pub config: ScpConfig,
}

/// Drives the DIMSE service protocols of one association.
pub struct ServiceClassProvider {
	channel: Arc<dyn MessageChannel>,
	codec: Arc<dyn IdentifierCodec>,
	handlers: Arc<dyn ServiceHandlers>,
	sub_operations: Arc<dyn StoreSubOperations>,
	connector: Arc<dyn MoveConnector>,
	cancels: Arc<CancelMap>,
	config: ScpConfig,
}

impl ServiceClassProvider {
	pub fn new(options: ServiceClassProviderOptions) -> Self {
		Self {
			channel: options.channel,
			codec: options.codec,
			handlers: options.handlers,
			sub_operations: options.sub_operations,
			connector: options.connector,
			cancels: options.cancels,
			config: options.config,
		}
	}

	/// The cancel map the DIMSE layer records C-CANCEL primitives into.
	pub fn cancels(&self) -> &Arc<CancelMap> {
		&self.cancels
	}

	/// Runs the service protocol for one request primitive, emitting every
	/// response it produces on the request's presentation context.
	///
	/// # Errors
	/// [`DispatchError::InvalidAbstractSyntax`] if no service class claims
	/// the context's abstract syntax, [`DispatchError::Send`] if a response
	/// could not be transmitted.
	#[instrument(
		skip_all,
		fields(
			message_id = request.message_id(),
			sop_class_uid = %request.affected_sop_class_uid(),
			context_id = context.context_id,
		)
	)]
	pub async fn dispatch(
		&self,
		request: DimseRequest,
		context: &PresentationContext,
	) -> Result<(), DispatchError> {
		let abstract_syntax = context.abstract_syntax.as_str();
		match request {
			DimseRequest::Echo(request) => {
				if abstract_syntax != VERIFICATION_SOP_CLASS {
					return Err(DispatchError::InvalidAbstractSyntax(UI::from(
						abstract_syntax,
					)));
				}
				cecho::scp(self, request, context).await
			}
			// Storage SOP classes are open-ended, so every abstract syntax
			// that negotiation accepted for a C-STORE is served.
			DimseRequest::Store(request) => cstore::scp(self, request, context).await,
			DimseRequest::Find(request) => {
				if QUERY_RETRIEVE_FIND_SOP_CLASSES.contains(&abstract_syntax) {
					cfind::scp(self, request, context, status::qr_find()).await
				} else if BASIC_WORKLIST_SOP_CLASSES.contains(&abstract_syntax) {
					cfind::scp(self, request, context, status::modality_worklist()).await
				} else if SUBSTANCE_ADMINISTRATION_SOP_CLASSES.contains(&abstract_syntax) {
					cfind::scp(self, request, context, status::substance_administration()).await
				} else if RELEVANT_PATIENT_SOP_CLASSES.contains(&abstract_syntax) {
					cfind::relevant_patient_scp(self, request, context).await
				} else {
					Err(DispatchError::InvalidAbstractSyntax(UI::from(
						abstract_syntax,
					)))
				}
			}
			DimseRequest::Get(request) => {
				if QUERY_RETRIEVE_GET_SOP_CLASSES.contains(&abstract_syntax) {
					cget::scp(self, request, context).await
				} else {
					Err(DispatchError::InvalidAbstractSyntax(UI::from(
						abstract_syntax,
					)))
				}
			}
			DimseRequest::Move(request) => {
				if QUERY_RETRIEVE_MOVE_SOP_CLASSES.contains(&abstract_syntax) {
					cmove::scp(self, request, context).await
				} else {
					Err(DispatchError::InvalidAbstractSyntax(UI::from(
						abstract_syntax,
					)))
				}
			}
		}
	}

	pub(crate) async fn send(
		&self,
		response: DimseResponse,
		context_id: u8,
	) -> Result<(), DispatchError> {
		self.channel
			.send(response, context_id, self.config.response_timeout())
			.await?;
		Ok(())
	}

	pub(crate) fn cancel_probe(&self) -> CancelProbe {
		CancelProbe::new(Arc::clone(&self.cancels))
	}

	pub(crate) fn codec(&self) -> &dyn IdentifierCodec {
		self.codec.as_ref()
	}

	pub(crate) fn handlers(&self) -> &dyn ServiceHandlers {
		self.handlers.as_ref()
	}

	pub(crate) fn sub_operations(&self) -> &dyn StoreSubOperations {
		self.sub_operations.as_ref()
	}

	pub(crate) fn connector(&self) -> &dyn MoveConnector {
		self.connector.as_ref()
	}

	pub(crate) const fn config(&self) -> &ScpConfig {
		&self.config
	}
}

/// Normalises a handler-returned status into the response primitive.
///
/// A status dataset must contain a (0000,0900) *Status* element; its other
/// elements are copied onto matching response attributes. Codes the service
/// registry does not know are still sent, with a warning.
pub(crate) fn validate_status(
	registry: &StatusRegistry,
	status: StatusValue,
	response: &mut DimseResponse,
) {
	match status {
		StatusValue::Dataset(dataset) => match dataset.get(tags::STATUS) {
			Some(elem) => match elem.to_int::<US>() {
				Ok(code) => {
					response.set_status(code);
					for elem in dataset.iter() {
						if elem.header().tag == tags::STATUS {
							continue;
						}
						if !response.set_attribute(elem) {
							warn!(
								tag = %elem.header().tag,
								"Status dataset returned by handler contained an unsupported element"
							);
						}
					}
				}
				Err(_) => {
					error!("Handler returned a Status element that is not an unsigned short");
					// Failure: Cannot Understand - invalid status type
					response.set_status(0xC002);
				}
			},
			None => {
				error!("Handler returned a status dataset without a Status element");
				// Failure: Cannot Understand - missing Status element
				response.set_status(0xC001);
			}
		},
		StatusValue::Code(code) => response.set_status(code),
	}

	let code = response.status();
	if !registry.contains(code) {
		warn!("Unknown status value returned by handler - 0x{code:04X}");
	}
}

#[cfg(test)]
pub(crate) mod testing;
