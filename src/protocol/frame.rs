//! Length-prefixed, header-described message frames
//!
//! ```text
//! +----------------+---------------------------+--------------------------+
//! | header_len: u16 | header (UTF-8 JSON object) | payload (content-length) |
//! |   big-endian   |   header_len bytes        |   bytes                  |
//! +----------------+---------------------------+--------------------------+
//! ```
//!
//! The header carries `byteorder`, `content-encoding` and `content-length`; all three
//! are required. Decoding is a pull over a receive buffer: each `take_*` step consumes
//! its slice only when enough bytes are buffered and leaves the rest in place for the
//! next step, so partial network reads simply resume on the next call.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::error::ProtocolError;

/// Size of the header length prefix
pub const HEADER_LEN_SIZE: usize = 2;

/// The only payload encoding this implementation speaks
pub const UTF8: &str = "utf-8";

/// Required header fields, in the order they are checked
const REQUIRED_HEADER_FIELDS: [&str; 3] = ["byteorder", "content-length", "content-encoding"];

/// Decoded frame header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameHeader {
	pub byteorder: String,
	#[serde(rename = "content-encoding")]
	pub content_encoding: String,
	#[serde(rename = "content-length")]
	pub content_length: usize,
}

impl FrameHeader {
	/// Header for a payload of `content_length` bytes produced on this host
	pub fn new(content_encoding: &str, content_length: usize) -> Self {
		FrameHeader {
			byteorder: native_byteorder().to_string(),
			content_encoding: content_encoding.to_string(),
			content_length,
		}
	}
}

/// Name of the host byte order as it appears in headers
pub fn native_byteorder() -> &'static str {
	if cfg!(target_endian = "little") {
		"little"
	} else {
		"big"
	}
}

fn check_encoding(encoding: &str) -> Result<(), ProtocolError> {
	match encoding.to_ascii_lowercase().as_str() {
		"utf-8" | "utf8" => Ok(()),
		_ => Err(ProtocolError::UnsupportedEncoding(encoding.to_string())),
	}
}

/// Build a complete frame around `payload`
pub fn encode_frame(payload: &[u8], content_encoding: &str) -> Result<Vec<u8>, ProtocolError> {
	let header = FrameHeader::new(content_encoding, payload.len());
	let header_bytes = serde_json::to_vec(&header)?;
	let header_len = u16::try_from(header_bytes.len())
		.map_err(|_| ProtocolError::HeaderTooLarge(header_bytes.len()))?;

	let mut frame = Vec::with_capacity(HEADER_LEN_SIZE + header_bytes.len() + payload.len());
	frame.extend_from_slice(&header_len.to_be_bytes());
	frame.extend_from_slice(&header_bytes);
	frame.extend_from_slice(payload);
	Ok(frame)
}

/// Consume the 2-byte header length, if buffered
pub fn take_header_len(buf: &mut Vec<u8>) -> Option<usize> {
	if buf.len() < HEADER_LEN_SIZE {
		return None;
	}
	let len = u16::from_be_bytes([buf[0], buf[1]]) as usize;
	buf.drain(..HEADER_LEN_SIZE);
	Some(len)
}

/// Consume and validate a `header_len`-byte header, if buffered
pub fn take_header(buf: &mut Vec<u8>, header_len: usize) -> Result<Option<FrameHeader>, ProtocolError> {
	if buf.len() < header_len {
		return Ok(None);
	}
	let header_bytes: Vec<u8> = buf.drain(..header_len).collect();
	parse_header(&header_bytes).map(Some)
}

/// Parse header bytes, reporting the first missing required field
pub fn parse_header(bytes: &[u8]) -> Result<FrameHeader, ProtocolError> {
	let value: serde_json::Value =
		serde_json::from_slice(bytes).map_err(|e| ProtocolError::InvalidHeader(e.to_string()))?;
	let object = value
		.as_object()
		.ok_or_else(|| ProtocolError::InvalidHeader("header is not a JSON object".to_string()))?;

	for field in REQUIRED_HEADER_FIELDS {
		if !object.contains_key(field) {
			return Err(ProtocolError::MissingHeaderField(field));
		}
	}

	serde_json::from_value(value).map_err(|e| ProtocolError::InvalidHeader(e.to_string()))
}

/// Consume exactly `content-length` payload bytes, if buffered
pub fn take_payload(buf: &mut Vec<u8>, header: &FrameHeader) -> Option<Vec<u8>> {
	if buf.len() < header.content_length {
		return None;
	}
	Some(buf.drain(..header.content_length).collect())
}

/// Serialize a payload object as JSON text in `encoding`
pub fn encode_json<T: Serialize>(value: &T, encoding: &str) -> Result<Vec<u8>, ProtocolError> {
	check_encoding(encoding)?;
	Ok(serde_json::to_vec(value)?)
}

/// Decode a payload object from JSON text in `encoding`
pub fn decode_json<T: DeserializeOwned>(bytes: &[u8], encoding: &str) -> Result<T, ProtocolError> {
	check_encoding(encoding)?;
	let text =
		std::str::from_utf8(bytes).map_err(|e| ProtocolError::InvalidPayload(e.to_string()))?;
	Ok(serde_json::from_str(text)?)
}

/// Decode one complete frame held entirely in `bytes`
///
/// Returns the header, the payload and whatever followed the frame.
pub fn decode_frame(bytes: &[u8]) -> Result<Option<(FrameHeader, Vec<u8>, Vec<u8>)>, ProtocolError> {
	let mut buf = bytes.to_vec();
	let header_len = match take_header_len(&mut buf) {
		Some(len) => len,
		None => return Ok(None),
	};
	let header = match take_header(&mut buf, header_len)? {
		Some(h) => h,
		None => return Ok(None),
	};
	match take_payload(&mut buf, &header) {
		Some(payload) => Ok(Some((header, payload, buf))),
		None => Ok(None),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_frame_layout() {
		let frame = encode_frame(b"{}", UTF8).unwrap();
		let header_len = u16::from_be_bytes([frame[0], frame[1]]) as usize;
		let header: serde_json::Value =
			serde_json::from_slice(&frame[2..2 + header_len]).unwrap();
		assert_eq!(header["content-length"], 2);
		assert_eq!(header["content-encoding"], "utf-8");
		assert_eq!(header["byteorder"], native_byteorder());
		assert_eq!(&frame[2 + header_len..], b"{}");
	}

	#[test]
	fn test_partial_reads_resume() {
		let frame = encode_frame(br#"{"a":1}"#, UTF8).unwrap();
		let mut buf = Vec::new();

		buf.push(frame[0]);
		assert_eq!(take_header_len(&mut buf), None);
		assert_eq!(buf.len(), 1, "nothing consumed on a short buffer");

		buf.extend_from_slice(&frame[1..5]);
		let header_len = take_header_len(&mut buf).unwrap();
		assert!(take_header(&mut buf, header_len).unwrap().is_none());

		buf.extend_from_slice(&frame[5..]);
		let header = take_header(&mut buf, header_len).unwrap().unwrap();
		let payload = take_payload(&mut buf, &header).unwrap();
		assert_eq!(payload, br#"{"a":1}"#.to_vec());
		assert!(buf.is_empty());
	}

	#[test]
	fn test_trailing_bytes_stay_buffered() {
		let mut bytes = encode_frame(b"[]", UTF8).unwrap();
		bytes.extend_from_slice(b"next");
		let (_, payload, rest) = decode_frame(&bytes).unwrap().unwrap();
		assert_eq!(payload, b"[]".to_vec());
		assert_eq!(rest, b"next".to_vec());
	}

	#[test]
	fn test_missing_header_field() {
		let err = parse_header(br#"{"byteorder":"little","content-encoding":"utf-8"}"#).unwrap_err();
		assert!(matches!(err, ProtocolError::MissingHeaderField("content-length")));

		let err = parse_header(br#"{"content-length":3,"content-encoding":"utf-8"}"#).unwrap_err();
		assert!(matches!(err, ProtocolError::MissingHeaderField("byteorder")));
	}

	#[test]
	fn test_header_not_an_object() {
		assert!(matches!(parse_header(b"[1,2]"), Err(ProtocolError::InvalidHeader(_))));
		assert!(matches!(parse_header(b"\xff"), Err(ProtocolError::InvalidHeader(_))));
	}

	#[test]
	fn test_negative_content_length_rejected() {
		let header = br#"{"byteorder":"big","content-length":-1,"content-encoding":"utf-8"}"#;
		assert!(matches!(parse_header(header), Err(ProtocolError::InvalidHeader(_))));
	}

	#[test]
	fn test_unsupported_encoding() {
		let err = decode_json::<serde_json::Value>(b"{}", "latin-1").unwrap_err();
		assert!(matches!(err, ProtocolError::UnsupportedEncoding(_)));
	}

	#[test]
	fn test_decode_json_rejects_invalid_utf8() {
		assert!(matches!(
			decode_json::<serde_json::Value>(b"\"\xff\"", UTF8),
			Err(ProtocolError::InvalidPayload(_))
		));
	}
}

// vim: ts=4
