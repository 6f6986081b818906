//! Wire protocol
//!
//! Three layers, bottom-up:
//! - `frame`: length-prefixed, JSON-header-described frames
//! - `actions`: the request/response vocabulary carried in frame payloads
//! - `file_operations`: the server-side handler that applies actions to a directory
//!
//! # Example Usage
//!
//! ```ignore
//! use dirmirror::protocol::{encode_request, ActionRequest};
//!
//! let frame = encode_request(&ActionRequest::FileRecipe { filename: "a.txt".into() })?;
//! ```

pub mod actions;
pub mod error;
pub mod file_operations;
pub mod frame;

pub use actions::{ActionCode, ActionRequest, ActionResponse, ActionStatus};
pub use error::ProtocolError;
pub use file_operations::{ActionHandler, DirectoryActionHandler};
pub use frame::FrameHeader;

/// Frame a request for the wire
pub fn encode_request(request: &ActionRequest) -> Result<Vec<u8>, ProtocolError> {
	let payload = frame::encode_json(&request.to_payload()?, frame::UTF8)?;
	frame::encode_frame(&payload, frame::UTF8)
}

/// Frame a response for the wire
pub fn encode_response(response: &ActionResponse) -> Result<Vec<u8>, ProtocolError> {
	let payload = frame::encode_json(&response.to_payload()?, frame::UTF8)?;
	frame::encode_frame(&payload, frame::UTF8)
}

/// Decode a request from a complete frame body
pub fn decode_request(header: &FrameHeader, payload: &[u8]) -> Result<ActionRequest, ProtocolError> {
	ActionRequest::from_payload(frame::decode_json(payload, &header.content_encoding)?)
}

/// Decode a response from a complete frame body
pub fn decode_response(header: &FrameHeader, payload: &[u8]) -> Result<ActionResponse, ProtocolError> {
	ActionResponse::from_payload(frame::decode_json(payload, &header.content_encoding)?)
}


// vim: ts=4
