//! Mock collaborators shared by the protocol tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dicom::core::{DataElement, VR};
use dicom::dicom_value;
use dicom::dictionary_std::tags;
use dicom::object::InMemDicomObject;

use crate::association::{
	AssociateError, MoveConnector, StoreSubOperations, SubAssociation, SubOperationError,
};
use crate::channel::{CancelMap, MessageChannel, SendError};
use crate::codec::{DicomCodec, IdentifierCodec};
use crate::config::ScpConfig;
use crate::handler::{
	EchoEvent, FindEvent, GetEvent, HandlerFault, MoveEvent, Producer, ServiceHandlers,
	StatusValue, StoreEvent,
};
use crate::primitives::{DimseResponse, PresentationContext, TransferSyntax};
use crate::scp::{ServiceClassProvider, ServiceClassProviderOptions};
use crate::types::{AeTitle, UI, US};

pub(crate) fn context_for(abstract_syntax: &str) -> PresentationContext {
	PresentationContext {
		context_id: 1,
		abstract_syntax: UI::from(abstract_syntax),
		transfer_syntax: TransferSyntax::implicit_vr_little_endian(),
	}
}

/// A dataset with a single *SOP Instance UID* element.
pub(crate) fn instance_dataset(sop_instance_uid: &str) -> InMemDicomObject {
	InMemDicomObject::from_element_iter([DataElement::new(
		tags::SOP_INSTANCE_UID,
		VR::UI,
		dicom_value!(Str, sop_instance_uid),
	)])
}

/// A study-level query identifier, encoded with the default transfer syntax.
pub(crate) fn encoded_identifier() -> Bytes {
	let identifier = InMemDicomObject::from_element_iter([DataElement::new(
		tags::QUERY_RETRIEVE_LEVEL,
		VR::CS,
		dicom_value!(Str, "STUDY"),
	)]);
	DicomCodec
		.encode(&identifier, true, true)
		.expect("encoding a valid identifier should succeed")
}

pub(crate) fn decode_identifier(bytes: &Bytes) -> InMemDicomObject {
	DicomCodec
		.decode(bytes, true, true)
		.expect("decoding a response identifier should succeed")
}

/// Message channel that records every emitted response.
#[derive(Default)]
pub(crate) struct RecordingChannel {
	sent: Mutex<Vec<(DimseResponse, u8)>>,
	fail_after: Mutex<Option<usize>>,
}

impl RecordingChannel {
	pub fn sent(&self) -> Vec<DimseResponse> {
		self.sent
			.lock()
			.unwrap()
			.iter()
			.map(|(response, _)| response.clone())
			.collect()
	}

	pub fn context_ids(&self) -> Vec<u8> {
		self.sent
			.lock()
			.unwrap()
			.iter()
			.map(|(_, context_id)| *context_id)
			.collect()
	}

	/// Makes every send after the first `count` fail with a timeout.
	pub fn fail_after(&self, count: usize) {
		*self.fail_after.lock().unwrap() = Some(count);
	}
}

#[async_trait]
impl MessageChannel for RecordingChannel {
	async fn send(
		&self,
		response: DimseResponse,
		context_id: u8,
		_timeout: Duration,
	) -> Result<(), SendError> {
		let mut sent = self.sent.lock().unwrap();
		if let Some(limit) = *self.fail_after.lock().unwrap() {
			if sent.len() >= limit {
				return Err(SendError::Timeout);
			}
		}
		sent.push((response, context_id));
		Ok(())
	}
}

/// Handler stub whose per-service results are configured up front and
/// consumed by the first request.
#[derive(Default)]
pub(crate) struct StubHandlers {
	echo: Mutex<Option<Result<StatusValue, HandlerFault>>>,
	store: Mutex<Option<Result<StatusValue, HandlerFault>>>,
	find: Mutex<Option<Result<Producer, HandlerFault>>>,
	get: Mutex<Option<Result<Producer, HandlerFault>>>,
	mv: Mutex<Option<Result<Producer, HandlerFault>>>,
}

impl StubHandlers {
	pub fn echo(self, result: Result<StatusValue, HandlerFault>) -> Self {
		*self.echo.lock().unwrap() = Some(result);
		self
	}

	pub fn store(self, result: Result<StatusValue, HandlerFault>) -> Self {
		*self.store.lock().unwrap() = Some(result);
		self
	}

	pub fn find(self, result: Result<Producer, HandlerFault>) -> Self {
		*self.find.lock().unwrap() = Some(result);
		self
	}

	pub fn get(self, result: Result<Producer, HandlerFault>) -> Self {
		*self.get.lock().unwrap() = Some(result);
		self
	}

	pub fn mv(self, result: Result<Producer, HandlerFault>) -> Self {
		*self.mv.lock().unwrap() = Some(result);
		self
	}
}

#[async_trait]
impl ServiceHandlers for StubHandlers {
	async fn on_c_echo(&self, _event: EchoEvent) -> Result<StatusValue, HandlerFault> {
		self.echo
			.lock()
			.unwrap()
			.take()
			.unwrap_or(Ok(StatusValue::Code(0x0000)))
	}

	async fn on_c_store(&self, _event: StoreEvent) -> Result<StatusValue, HandlerFault> {
		self.store
			.lock()
			.unwrap()
			.take()
			.unwrap_or(Ok(StatusValue::Code(0x0000)))
	}

	async fn on_c_find(&self, _event: FindEvent) -> Result<Producer, HandlerFault> {
		self.find
			.lock()
			.unwrap()
			.take()
			.unwrap_or_else(|| Ok(Producer::empty()))
	}

	async fn on_c_get(&self, _event: GetEvent) -> Result<Producer, HandlerFault> {
		self.get
			.lock()
			.unwrap()
			.take()
			.unwrap_or_else(|| Ok(Producer::empty()))
	}

	async fn on_c_move(&self, _event: MoveEvent) -> Result<Producer, HandlerFault> {
		self.mv
			.lock()
			.unwrap()
			.take()
			.unwrap_or_else(|| Ok(Producer::empty()))
	}
}

/// Records nested C-STORE sub-operations on the current association and
/// answers them from a scripted queue (Success when the queue is empty).
#[derive(Default)]
pub(crate) struct MockStoreSubOperations {
	outcomes: Mutex<VecDeque<Result<US, SubOperationError>>>,
	calls: Mutex<Vec<(Option<UI>, US)>>,
}

impl MockStoreSubOperations {
	pub fn script(&self, outcomes: impl IntoIterator<Item = Result<US, SubOperationError>>) {
		self.outcomes.lock().unwrap().extend(outcomes);
	}

	/// The (SOP Instance UID, message id) of every sub-operation received.
	pub fn calls(&self) -> Vec<(Option<UI>, US)> {
		self.calls.lock().unwrap().clone()
	}
}

fn sop_instance_uid(dataset: &InMemDicomObject) -> Option<UI> {
	dataset
		.get(tags::SOP_INSTANCE_UID)
		.and_then(|elem| elem.to_str().ok())
		.map(|uid| UI::from(uid.trim_end_matches('\0')))
}

#[async_trait]
impl StoreSubOperations for MockStoreSubOperations {
	async fn send_c_store(
		&self,
		dataset: &InMemDicomObject,
		message_id: US,
		_timeout: Duration,
	) -> Result<US, SubOperationError> {
		self.calls
			.lock()
			.unwrap()
			.push((sop_instance_uid(dataset), message_id));
		self.outcomes
			.lock()
			.unwrap()
			.pop_front()
			.unwrap_or(Ok(0x0000))
	}
}

/// Shared state of the outbound association mock, observable after the
/// association object itself has been consumed by `release`.
#[derive(Default)]
pub(crate) struct SubAssociationState {
	outcomes: Mutex<VecDeque<Result<US, SubOperationError>>>,
	calls: Mutex<Vec<(Option<UI>, US, AeTitle, US)>>,
	released: AtomicBool,
}

impl SubAssociationState {
	pub fn script(&self, outcomes: impl IntoIterator<Item = Result<US, SubOperationError>>) {
		self.outcomes.lock().unwrap().extend(outcomes);
	}

	pub fn calls(&self) -> Vec<(Option<UI>, US, AeTitle, US)> {
		self.calls.lock().unwrap().clone()
	}

	pub fn released(&self) -> bool {
		self.released.load(Ordering::SeqCst)
	}
}

struct MockSubAssociation {
	state: Arc<SubAssociationState>,
}

#[async_trait]
impl SubAssociation for MockSubAssociation {
	async fn send_c_store(
		&self,
		dataset: &InMemDicomObject,
		message_id: US,
		originator_aet: AeTitle,
		originator_id: US,
		_timeout: Duration,
	) -> Result<US, SubOperationError> {
		self.state.calls.lock().unwrap().push((
			sop_instance_uid(dataset),
			message_id,
			originator_aet,
			originator_id,
		));
		self.state
			.outcomes
			.lock()
			.unwrap()
			.pop_front()
			.unwrap_or(Ok(0x0000))
	}

	async fn release(self: Box<Self>) {
		self.state.released.store(true, Ordering::SeqCst);
	}
}

/// Connector returning mock sub-associations over a shared state, or
/// refusing to associate at all.
#[derive(Default)]
pub(crate) struct MockConnector {
	refuse: AtomicBool,
	state: Arc<SubAssociationState>,
	targets: Mutex<Vec<(String, u16, AeTitle)>>,
}

impl MockConnector {
	pub fn refuse(&self) {
		self.refuse.store(true, Ordering::SeqCst);
	}

	pub fn state(&self) -> &Arc<SubAssociationState> {
		&self.state
	}

	pub fn targets(&self) -> Vec<(String, u16, AeTitle)> {
		self.targets.lock().unwrap().clone()
	}
}

#[async_trait]
impl MoveConnector for MockConnector {
	async fn associate(
		&self,
		address: &str,
		port: u16,
		ae_title: AeTitle,
		_timeout: Duration,
	) -> Result<Box<dyn SubAssociation>, AssociateError> {
		self.targets
			.lock()
			.unwrap()
			.push((String::from(address), port, ae_title));
		if self.refuse.load(Ordering::SeqCst) {
			return Err(AssociateError::Connect {
				address: String::from(address),
				port,
				reason: String::from("connection refused"),
			});
		}
		Ok(Box::new(MockSubAssociation {
			state: Arc::clone(&self.state),
		}))
	}
}

pub(crate) struct TestBench {
	pub scp: ServiceClassProvider,
	pub channel: Arc<RecordingChannel>,
	pub store: Arc<MockStoreSubOperations>,
	pub connector: Arc<MockConnector>,
	pub cancels: Arc<CancelMap>,
}

pub(crate) fn provider() -> TestBench {
	provider_with(StubHandlers::default())
}

pub(crate) fn provider_with(handlers: impl ServiceHandlers + 'static) -> TestBench {
	let channel = Arc::new(RecordingChannel::default());
	let store = Arc::new(MockStoreSubOperations::default());
	let connector = Arc::new(MockConnector::default());
	let cancels = Arc::new(CancelMap::default());

	let scp = ServiceClassProvider::new(ServiceClassProviderOptions {
		channel: Arc::clone(&channel) as Arc<dyn MessageChannel>,
		codec: Arc::new(DicomCodec),
		handlers: Arc::new(handlers),
		sub_operations: Arc::clone(&store) as Arc<dyn StoreSubOperations>,
		connector: Arc::clone(&connector) as Arc<dyn MoveConnector>,
		cancels: Arc::clone(&cancels),
		config: ScpConfig::default(),
	});

	TestBench {
		scp,
		channel,
		store,
		connector,
		cancels,
	}
}
