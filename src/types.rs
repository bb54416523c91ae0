use std::fmt::{Display, Formatter};

use thiserror::Error;

/// UI (Unique Identifier) value representation.
pub type UI = String;

/// US (Unsigned Short) value representation.
pub type US = u16;

/// AE (Application Entity) value representation.
pub type AE = String;

/// Priority (0000,0700) values for DIMSE operations.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Priority {
	Low = 0x0002,
	Medium = 0x0000,
	High = 0x0001,
}

impl Default for Priority {
	fn default() -> Self {
		Self::Medium
	}
}

/// An application entity title in its wire form: 16 bytes of ASCII,
/// space-padded on the right.
/// <https://dicom.nema.org/medical/dicom/current/output/chtml/part05/sect_6.2.html>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AeTitle([u8; 16]);

impl AeTitle {
	/// Builds an AE title from a printable ASCII string of at most 16 bytes.
	pub fn new(value: &str) -> Result<Self, InvalidAeTitle> {
		let trimmed = value.trim_end_matches(' ');
		if trimmed.is_empty() {
			return Err(InvalidAeTitle::Empty);
		}
		if trimmed.len() > 16 {
			return Err(InvalidAeTitle::TooLong(trimmed.len()));
		}
		if !trimmed.bytes().all(|b| (0x20..=0x7E).contains(&b) && b != b'\\') {
			return Err(InvalidAeTitle::NotPrintableAscii);
		}
		let mut bytes = [b' '; 16];
		bytes[..trimmed.len()].copy_from_slice(trimmed.as_bytes());
		Ok(Self(bytes))
	}

	/// The full 16-byte, space-padded wire representation.
	pub const fn as_bytes(&self) -> &[u8; 16] {
		&self.0
	}

	/// The title with trailing padding removed.
	pub fn as_str(&self) -> &str {
		// new() only accepts printable ASCII
		std::str::from_utf8(&self.0)
			.unwrap_or_default()
			.trim_end_matches(' ')
	}
}

impl Display for AeTitle {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

impl TryFrom<&str> for AeTitle {
	type Error = InvalidAeTitle;

	fn try_from(value: &str) -> Result<Self, Self::Error> {
		Self::new(value)
	}
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidAeTitle {
	#[error("AE title must not be empty")]
	Empty,
	#[error("AE title is {0} bytes long, but at most 16 are allowed")]
	TooLong(usize),
	#[error("AE title contains characters outside the printable ASCII range")]
	NotPrintableAscii,
}
