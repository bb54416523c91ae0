//! Association surfaces used for C-STORE sub-operations.
//!
//! C-GET relays matched datasets over the association the request arrived
//! on; C-MOVE opens a fresh outbound association to the move destination.
//! Both surfaces are provided by the upper-layer implementation embedding
//! this crate.

use std::time::Duration;

use async_trait::async_trait;
use dicom::object::InMemDicomObject;
use thiserror::Error;

use crate::types::{AeTitle, US};

/// Issues nested C-STORE sub-operations on the association currently being
/// served (C-GET).
#[async_trait]
pub trait StoreSubOperations: Send + Sync {
	/// Sends the dataset as a C-STORE-RQ with the given message id and waits
	/// for the C-STORE-RSP, returning its status code.
	async fn send_c_store(
		&self,
		dataset: &InMemDicomObject,
		message_id: US,
		timeout: Duration,
	) -> Result<US, SubOperationError>;
}

/// Opens outbound associations to C-MOVE destinations.
#[async_trait]
pub trait MoveConnector: Send + Sync {
	/// Requests an association with the destination AE.
	///
	/// Implementations only return established associations. On any failure
	/// the underlying transport must already be closed when this returns;
	/// the dispatch core reports 0xA801 to the peer and has nothing left to
	/// clean up.
	async fn associate(
		&self,
		address: &str,
		port: u16,
		ae_title: AeTitle,
		timeout: Duration,
	) -> Result<Box<dyn SubAssociation>, AssociateError>;
}

/// An established outbound association used for C-MOVE sub-operations.
///
/// Implementations must close the transport when the association is dropped
/// without an explicit [`release`](Self::release), so that no exit path of
/// the move protocol can leak a socket.
#[async_trait]
pub trait SubAssociation: Send + Sync {
	/// Sends the dataset as a C-STORE-RQ carrying the move originator
	/// attributes and returns the response status code.
	async fn send_c_store(
		&self,
		dataset: &InMemDicomObject,
		message_id: US,
		originator_aet: AeTitle,
		originator_id: US,
		timeout: Duration,
	) -> Result<US, SubOperationError>;

	/// Releases the association. The transport is closed on return even if
	/// the release handshake failed.
	async fn release(self: Box<Self>);
}

#[derive(Debug, Error)]
pub enum SubOperationError {
	#[error("Timed out")]
	Timeout,
	#[error("Association is closed")]
	Closed,
	#[error("C-STORE sub-operation failed: {0}")]
	Transport(String),
}

#[derive(Debug, Error)]
pub enum AssociateError {
	#[error("Failed to connect to {address}:{port}: {reason}")]
	Connect {
		address: String,
		port: u16,
		reason: String,
	},
	#[error("Association was rejected by {ae_title}")]
	Rejected { ae_title: AeTitle },
	#[error("Timed out")]
	Timeout,
}
