//! Service-class dispatch core for a DICOM DIMSE service class provider.
//!
//! Given a request primitive and the presentation context it was received
//! on, [`scp::ServiceClassProvider`] selects the matching DIMSE service
//! (C-ECHO, C-STORE, C-FIND, C-GET, C-MOVE and the single-match C-FIND
//! variant of Relevant Patient Information Query), drives the user's
//! [`handler::ServiceHandlers`] implementation and emits the response
//! primitives back to the peer, including the nested C-STORE sub-operations
//! of the retrieve services.
//!
//! Transport, PDU framing, association negotiation and DIMSE message
//! encoding are not part of this crate; they are reached through the
//! collaborator traits in [`channel`], [`codec`] and [`association`].

pub mod association;
pub mod channel;
pub mod codec;
pub mod config;
pub mod handler;
pub mod primitives;
pub mod scp;
pub mod status;
pub mod types;

pub use scp::{DispatchError, ServiceClassProvider, ServiceClassProviderOptions};

/// The AE title used when no other value is configured.
pub const DEFAULT_AET: &str = "DIMSE-SCP";
