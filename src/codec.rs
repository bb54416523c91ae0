//! Dataset encoding and decoding under a negotiated transfer syntax.

use bytes::Bytes;
use dicom::object::InMemDicomObject;
use dicom::transfer_syntax::entries::{
	EXPLICIT_VR_BIG_ENDIAN, EXPLICIT_VR_LITTLE_ENDIAN, IMPLICIT_VR_LITTLE_ENDIAN,
};
use thiserror::Error;

/// Encodes and decodes identifier datasets using the byte-level rules of the
/// presentation context's transfer syntax.
pub trait IdentifierCodec: Send + Sync {
	fn encode(
		&self,
		dataset: &InMemDicomObject,
		implicit_vr: bool,
		little_endian: bool,
	) -> Result<Bytes, CodecError>;

	fn decode(
		&self,
		bytes: &[u8],
		implicit_vr: bool,
		little_endian: bool,
	) -> Result<InMemDicomObject, CodecError>;
}

#[derive(Debug, Error)]
pub enum CodecError {
	#[error("Failed to read DICOM object: {0}")]
	Read(#[from] dicom::object::ReadError),
	#[error("Failed to write DICOM object: {0}")]
	Write(#[from] dicom::object::WriteError),
	#[error("No transfer syntax encodes implicit VR with big endian byte order")]
	UnsupportedTransferSyntax,
}

/// [`IdentifierCodec`] backed by the dicom-rs dataset reader and writer.
#[derive(Debug, Default, Clone, Copy)]
pub struct DicomCodec;

fn transfer_syntax(
	implicit_vr: bool,
	little_endian: bool,
) -> Result<dicom::encoding::TransferSyntax, CodecError> {
	match (implicit_vr, little_endian) {
		(true, true) => Ok(IMPLICIT_VR_LITTLE_ENDIAN.erased()),
		(false, true) => Ok(EXPLICIT_VR_LITTLE_ENDIAN.erased()),
		(false, false) => Ok(EXPLICIT_VR_BIG_ENDIAN.erased()),
		(true, false) => Err(CodecError::UnsupportedTransferSyntax),
	}
}

impl IdentifierCodec for DicomCodec {
	fn encode(
		&self,
		dataset: &InMemDicomObject,
		implicit_vr: bool,
		little_endian: bool,
	) -> Result<Bytes, CodecError> {
		let transfer_syntax = transfer_syntax(implicit_vr, little_endian)?;
		let mut buffer = Vec::new();
		dataset.write_dataset_with_ts(&mut buffer, &transfer_syntax)?;
		Ok(Bytes::from(buffer))
	}

	fn decode(
		&self,
		bytes: &[u8],
		implicit_vr: bool,
		little_endian: bool,
	) -> Result<InMemDicomObject, CodecError> {
		let transfer_syntax = transfer_syntax(implicit_vr, little_endian)?;
		let object = InMemDicomObject::read_dataset_with_ts(bytes, &transfer_syntax)?;
		Ok(object)
	}
}
