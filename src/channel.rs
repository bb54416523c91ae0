//! The DIMSE message channel the dispatch core emits responses through.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::primitives::{CancelRequest, DimseResponse};
use crate::types::US;

/// Outbound half of the DIMSE service provider for the association currently
/// being served. Implementations serialise the primitive into a command set
/// (and data set, if present) and transmit it on the given presentation
/// context.
///
/// A [`SendError`] is fatal to the request being processed: the dispatch core
/// stops the running protocol and propagates the error.
#[async_trait]
pub trait MessageChannel: Send + Sync {
	async fn send(
		&self,
		response: DimseResponse,
		context_id: u8,
		timeout: Duration,
	) -> Result<(), SendError>;
}

#[derive(Debug, Error)]
pub enum SendError {
	#[error("Timed out")]
	Timeout,
	#[error("Channel is closed")]
	Closed,
	#[error("Failed to transmit response: {0}")]
	Transport(String),
}

/// Pending C-CANCEL requests recorded by the DIMSE layer, keyed by the
/// *Message ID Being Responded To* of the cancel primitive.
///
/// Reads are destructive: [`CancelMap::take`] removes the entry it matched,
/// so a cancellation is reported exactly once.
#[derive(Debug, Default)]
pub struct CancelMap {
	pending: Mutex<HashMap<US, CancelRequest>>,
}

impl CancelMap {
	/// Records a cancel primitive received out-of-band by the DIMSE layer.
	pub fn record(&self, request: CancelRequest) {
		self.pending
			.lock()
			.expect("cancel map lock should not be poisoned")
			.insert(request.message_id_being_responded_to, request);
	}

	/// Returns true if a C-CANCEL for `message_id` was recorded, removing it.
	pub fn take(&self, message_id: US) -> bool {
		self.pending
			.lock()
			.expect("cancel map lock should not be poisoned")
			.remove(&message_id)
			.is_some()
	}
}
