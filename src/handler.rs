//! User-facing service handlers and the producer protocol that drives the
//! streamed services.
//!
//! The dispatch core pulls values out of a handler-supplied [`Producer`] and
//! turns each one into a response primitive. Handlers never talk to the peer
//! directly and never see partial responses; all wire concerns stay in the
//! dispatch core.

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use async_trait::async_trait;
use dicom::object::InMemDicomObject;
use futures::stream::{self, BoxStream, StreamExt};
use thiserror::Error;

use crate::channel::CancelMap;
use crate::primitives::{
	EchoRequest, FindRequest, GetRequest, MoveRequest, PresentationContext, StoreRequest,
};
use crate::types::US;

/// A status returned by a handler: either a bare status code or a status
/// dataset containing a (0000,0900) *Status* element plus optional
/// attributes such as *Error Comment*.
#[derive(Debug, Clone)]
pub enum StatusValue {
	Code(US),
	Dataset(InMemDicomObject),
}

impl From<US> for StatusValue {
	fn from(code: US) -> Self {
		Self::Code(code)
	}
}

impl From<InMemDicomObject> for StatusValue {
	fn from(dataset: InMemDicomObject) -> Self {
		Self::Dataset(dataset)
	}
}

/// A fault raised by user handler code. Carries the diagnostic trace the
/// handler produced; the dispatch core logs it and answers the peer with the
/// implementation-reserved failure status of the running service.
#[derive(Debug, Error, Clone)]
#[error("{trace}")]
pub struct HandlerFault {
	trace: String,
}

impl HandlerFault {
	pub fn new(trace: impl Into<String>) -> Self {
		Self {
			trace: trace.into(),
		}
	}
}

/// One-shot cancellation probe handed to FIND/GET/MOVE handlers.
///
/// Polls the cancel map maintained by the DIMSE layer. A match removes the
/// recorded C-CANCEL, so the probe reports each cancellation exactly once.
#[derive(Clone)]
pub struct CancelProbe {
	cancels: Arc<CancelMap>,
}

impl CancelProbe {
	pub(crate) fn new(cancels: Arc<CancelMap>) -> Self {
		Self { cancels }
	}

	/// Returns true if a C-CANCEL matching `message_id` has been received.
	pub fn is_cancelled(&self, message_id: US) -> bool {
		self.cancels.take(message_id)
	}
}

impl Debug for CancelProbe {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "CancelProbe")
	}
}

/// Event payload for `on_c_echo`.
#[derive(Debug, Clone)]
pub struct EchoEvent {
	pub request: EchoRequest,
	pub context: PresentationContext,
}

/// Event payload for `on_c_store`.
#[derive(Debug, Clone)]
pub struct StoreEvent {
	pub request: StoreRequest,
	pub context: PresentationContext,
}

/// Event payload for `on_c_find`.
#[derive(Debug, Clone)]
pub struct FindEvent {
	pub request: FindRequest,
	pub context: PresentationContext,
	pub cancelled: CancelProbe,
}

/// Event payload for `on_c_get`.
#[derive(Debug, Clone)]
pub struct GetEvent {
	pub request: GetRequest,
	pub context: PresentationContext,
	pub cancelled: CancelProbe,
}

/// Event payload for `on_c_move`.
#[derive(Debug, Clone)]
pub struct MoveEvent {
	pub request: MoveRequest,
	pub context: PresentationContext,
	pub cancelled: CancelProbe,
}

/// The destination a C-MOVE handler resolved from the requested AE title.
/// Unresolvable destinations are expressed by leaving a part unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MoveDestination {
	pub address: Option<String>,
	pub port: Option<u16>,
}

impl MoveDestination {
	pub fn new(address: impl Into<String>, port: u16) -> Self {
		Self {
			address: Some(address.into()),
			port: Some(port),
		}
	}

	/// An unknown destination, reported to the peer as 0xA801.
	pub const fn unknown() -> Self {
		Self {
			address: None,
			port: None,
		}
	}
}

/// A single value pulled out of a handler producer.
#[derive(Debug, Clone)]
pub enum ProducerItem {
	/// Prologue of C-GET/C-MOVE: the total number of C-STORE sub-operations
	/// the handler intends to perform.
	Count(u64),
	/// Prologue of C-MOVE: where to open the outbound association.
	Destination(MoveDestination),
	/// Body of every streamed service: a status and an optional dataset.
	Pair(StatusValue, Option<InMemDicomObject>),
}

impl ProducerItem {
	/// Convenience for the common pending yield.
	pub fn pending(dataset: InMemDicomObject) -> Self {
		Self::Pair(StatusValue::Code(0xFF00), Some(dataset))
	}
}

/// Pull-driven sequence of handler yields.
///
/// The producer is single-pass and owned by one protocol invocation. A fault
/// is surfaced exactly once; afterwards the producer is exhausted, so a
/// faulting handler cannot keep a dispatch loop alive.
pub struct Producer {
	stream: BoxStream<'static, Result<ProducerItem, HandlerFault>>,
	done: bool,
}

impl Producer {
	pub fn new(stream: BoxStream<'static, Result<ProducerItem, HandlerFault>>) -> Self {
		Self {
			stream,
			done: false,
		}
	}

	/// A producer over an in-memory list of yields.
	pub fn from_items(items: impl IntoIterator<Item = ProducerItem>) -> Self {
		let items: Vec<ProducerItem> = items.into_iter().collect();
		Self::new(stream::iter(items.into_iter().map(Ok)).boxed())
	}

	/// A producer that yields nothing.
	pub fn empty() -> Self {
		Self::new(stream::empty().boxed())
	}

	pub(crate) async fn next(&mut self) -> Option<Result<ProducerItem, HandlerFault>> {
		if self.done {
			return None;
		}
		match self.stream.next().await {
			Some(Err(fault)) => {
				self.done = true;
				Some(Err(fault))
			}
			None => {
				self.done = true;
				None
			}
			item => item,
		}
	}

	/// Consumes the next yield as a sub-operation count.
	pub(crate) async fn expect_count(&mut self) -> Result<US, PrologueError> {
		match self.next().await {
			Some(Ok(ProducerItem::Count(count))) => {
				US::try_from(count).map_err(|_| PrologueError::WrongShape)
			}
			Some(Ok(_)) => Err(PrologueError::WrongShape),
			Some(Err(fault)) => Err(PrologueError::Fault(fault)),
			None => Err(PrologueError::Exhausted),
		}
	}

	/// Consumes the next yield as a move destination.
	pub(crate) async fn expect_destination(&mut self) -> Result<MoveDestination, PrologueError> {
		match self.next().await {
			Some(Ok(ProducerItem::Destination(destination))) => Ok(destination),
			Some(Ok(_)) => Err(PrologueError::WrongShape),
			Some(Err(fault)) => Err(PrologueError::Fault(fault)),
			None => Err(PrologueError::Exhausted),
		}
	}
}

impl Debug for Producer {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "Producer {{ done: {} }}", self.done)
	}
}

/// Why a prologue value could not be obtained from the producer.
#[derive(Debug)]
pub(crate) enum PrologueError {
	Exhausted,
	WrongShape,
	Fault(HandlerFault),
}

/// User implementations of the DIMSE services.
///
/// Streamed services return a [`Producer`]; C-ECHO and C-STORE return a
/// single status. Returning `Err` from any method is treated as a handler
/// fault and answered with the service's implementation-reserved failure
/// status, except for C-ECHO where the standard mandates Success.
#[async_trait]
pub trait ServiceHandlers: Send + Sync {
	/// Called for every C-ECHO request. Defaults to Success.
	async fn on_c_echo(&self, _event: EchoEvent) -> Result<StatusValue, HandlerFault> {
		Ok(StatusValue::Code(0x0000))
	}

	/// Called for every C-STORE request.
	async fn on_c_store(&self, event: StoreEvent) -> Result<StatusValue, HandlerFault>;

	/// Called for every C-FIND request. The producer yields
	/// `(status, identifier)` pairs; the default produces no matches, which
	/// the dispatch core answers with an immediate Success.
	async fn on_c_find(&self, _event: FindEvent) -> Result<Producer, HandlerFault> {
		Ok(Producer::empty())
	}

	/// Called for every C-GET request. The first yield must be the
	/// sub-operation count, followed by `(status, dataset)` pairs.
	async fn on_c_get(&self, event: GetEvent) -> Result<Producer, HandlerFault>;

	/// Called for every C-MOVE request. The first yield must be the
	/// destination, the second the sub-operation count, followed by
	/// `(status, dataset)` pairs.
	async fn on_c_move(&self, event: MoveEvent) -> Result<Producer, HandlerFault>;
}
