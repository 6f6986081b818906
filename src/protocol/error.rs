//! Protocol error types
//!
//! Everything that can go wrong while turning bytes into frames and frames into
//! actions. Any of these tears down the connection it happened on.

use std::fmt;

/// Protocol error type
#[derive(Debug)]
pub enum ProtocolError {
	/// Header is missing one of the required fields
	MissingHeaderField(&'static str),
	/// Header bytes are not a valid JSON object
	InvalidHeader(String),
	/// Encoded header does not fit the 16-bit length prefix
	HeaderTooLarge(usize),
	/// Payload announced an encoding other than UTF-8
	UnsupportedEncoding(String),
	/// Payload bytes do not decode into the expected shape
	InvalidPayload(String),
	/// Action code outside 1..=6
	UnknownAction(i64),
	/// Base64 decoding error
	Base64(String),
}

impl fmt::Display for ProtocolError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ProtocolError::MissingHeaderField(name) => {
				write!(f, "Missing required header \"{}\"", name)
			}
			ProtocolError::InvalidHeader(msg) => write!(f, "Invalid header: {}", msg),
			ProtocolError::HeaderTooLarge(len) => {
				write!(f, "Header of {} bytes exceeds the {} byte limit", len, u16::MAX)
			}
			ProtocolError::UnsupportedEncoding(enc) => {
				write!(f, "Unsupported content encoding: {}", enc)
			}
			ProtocolError::InvalidPayload(msg) => write!(f, "Invalid payload: {}", msg),
			ProtocolError::UnknownAction(code) => write!(f, "Unknown file action {}", code),
			ProtocolError::Base64(msg) => write!(f, "Base64 decode error: {}", msg),
		}
	}
}

impl std::error::Error for ProtocolError {}

impl From<base64::DecodeError> for ProtocolError {
	fn from(e: base64::DecodeError) -> Self {
		ProtocolError::Base64(e.to_string())
	}
}

impl From<serde_json::Error> for ProtocolError {
	fn from(e: serde_json::Error) -> Self {
		ProtocolError::InvalidPayload(e.to_string())
	}
}


// vim: ts=4
