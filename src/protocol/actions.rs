//! Request/response vocabulary carried inside frame payloads
//!
//! Requests travel as `{type, encoding, content: {action, data}}`; responses as
//! `{response: {action, ...}}`. Binary content (new files, update blocks) is base64
//! on the wire and raw bytes in memory.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use super::error::ProtocolError;
use super::frame::UTF8;
use crate::types::{FileEntry, FileRecipe, RawBlocks};

/// Request content type announced in the envelope
pub const REQUEST_CONTENT_TYPE: &str = "text/json";

/// Numeric action codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionCode {
	EnumerateDirectory = 1,
	NewFile = 2,
	MoveFile = 3,
	DeleteFile = 4,
	FileRecipe = 5,
	UpdateFile = 6,
}

impl ActionCode {
	pub fn code(self) -> u8 {
		self as u8
	}

	pub fn name(self) -> &'static str {
		match self {
			ActionCode::EnumerateDirectory => "EnumerateDirectory",
			ActionCode::NewFile => "NewFile",
			ActionCode::MoveFile => "MoveFile",
			ActionCode::DeleteFile => "DeleteFile",
			ActionCode::FileRecipe => "FileRecipe",
			ActionCode::UpdateFile => "UpdateFile",
		}
	}
}

impl TryFrom<i64> for ActionCode {
	type Error = ProtocolError;

	fn try_from(code: i64) -> Result<Self, Self::Error> {
		match code {
			1 => Ok(ActionCode::EnumerateDirectory),
			2 => Ok(ActionCode::NewFile),
			3 => Ok(ActionCode::MoveFile),
			4 => Ok(ActionCode::DeleteFile),
			5 => Ok(ActionCode::FileRecipe),
			6 => Ok(ActionCode::UpdateFile),
			other => Err(ProtocolError::UnknownAction(other)),
		}
	}
}

impl fmt::Display for ActionCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}({})", self.name(), self.code())
	}
}

impl Serialize for ActionCode {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_u8(self.code())
	}
}

impl<'de> Deserialize<'de> for ActionCode {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let code = i64::deserialize(deserializer)?;
		ActionCode::try_from(code).map_err(de::Error::custom)
	}
}

// Wire shapes of the request `data` objects

#[derive(Debug, Serialize, Deserialize)]
struct NewFileData {
	filename: String,
	#[serde(default)]
	filedata: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MoveFileData {
	source_filename: String,
	destination_filename: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct FilenameData {
	filename: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct UpdateInfo {
	filename: String,
	block_size: usize,
	blocks: BTreeMap<u64, String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct UpdateFileData {
	recipe_info: UpdateInfo,
}

#[derive(Debug, Serialize, Deserialize)]
struct RequestContent {
	action: i64,
	#[serde(default)]
	data: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RequestEnvelope {
	#[serde(rename = "type")]
	content_type: String,
	encoding: String,
	content: RequestContent,
}

/// One protocol operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionRequest {
	EnumerateDirectory,
	NewFile { filename: String, content: Vec<u8> },
	MoveFile { source: String, destination: String },
	DeleteFile { filename: String },
	FileRecipe { filename: String },
	UpdateFile { filename: String, block_size: usize, blocks: RawBlocks },
}

impl ActionRequest {
	pub fn code(&self) -> ActionCode {
		match self {
			ActionRequest::EnumerateDirectory => ActionCode::EnumerateDirectory,
			ActionRequest::NewFile { .. } => ActionCode::NewFile,
			ActionRequest::MoveFile { .. } => ActionCode::MoveFile,
			ActionRequest::DeleteFile { .. } => ActionCode::DeleteFile,
			ActionRequest::FileRecipe { .. } => ActionCode::FileRecipe,
			ActionRequest::UpdateFile { .. } => ActionCode::UpdateFile,
		}
	}

	fn data(&self) -> Result<Option<Value>, ProtocolError> {
		let data = match self {
			ActionRequest::EnumerateDirectory => return Ok(None),
			ActionRequest::NewFile { filename, content } => serde_json::to_value(NewFileData {
				filename: filename.clone(),
				filedata: Some(BASE64.encode(content)),
			})?,
			ActionRequest::MoveFile { source, destination } => {
				serde_json::to_value(MoveFileData {
					source_filename: source.clone(),
					destination_filename: destination.clone(),
				})?
			}
			ActionRequest::DeleteFile { filename } | ActionRequest::FileRecipe { filename } => {
				serde_json::to_value(FilenameData { filename: filename.clone() })?
			}
			ActionRequest::UpdateFile { filename, block_size, blocks } => {
				serde_json::to_value(UpdateFileData {
					recipe_info: UpdateInfo {
						filename: filename.clone(),
						block_size: *block_size,
						blocks: blocks.iter().map(|(i, b)| (*i, BASE64.encode(b))).collect(),
					},
				})?
			}
		};
		Ok(Some(data))
	}

	/// Client payload: `{type, encoding, content: {action, data}}`
	pub fn to_payload(&self) -> Result<Value, ProtocolError> {
		let envelope = RequestEnvelope {
			content_type: REQUEST_CONTENT_TYPE.to_string(),
			encoding: UTF8.to_string(),
			content: RequestContent { action: self.code().code() as i64, data: self.data()? },
		};
		Ok(serde_json::to_value(envelope)?)
	}

	/// Decode a request payload
	///
	/// Accepts the full envelope or a bare `{action, data}` content object.
	pub fn from_payload(payload: Value) -> Result<Self, ProtocolError> {
		let content = match payload {
			Value::Object(mut map) if !map.contains_key("action") && map.contains_key("content") => {
				map.remove("content").unwrap_or(Value::Null)
			}
			other => other,
		};
		let content: RequestContent = serde_json::from_value(content)?;
		let code = ActionCode::try_from(content.action)?;

		if code == ActionCode::EnumerateDirectory {
			return Ok(ActionRequest::EnumerateDirectory);
		}

		let data = content.data.ok_or_else(|| {
			ProtocolError::InvalidPayload(format!("{} request without data", code.name()))
		})?;

		let request = match code {
			ActionCode::EnumerateDirectory => ActionRequest::EnumerateDirectory,
			ActionCode::NewFile => {
				let d: NewFileData = serde_json::from_value(data)?;
				let content = match d.filedata {
					Some(encoded) => BASE64.decode(encoded)?,
					None => Vec::new(),
				};
				ActionRequest::NewFile { filename: d.filename, content }
			}
			ActionCode::MoveFile => {
				let d: MoveFileData = serde_json::from_value(data)?;
				ActionRequest::MoveFile { source: d.source_filename, destination: d.destination_filename }
			}
			ActionCode::DeleteFile => {
				let d: FilenameData = serde_json::from_value(data)?;
				ActionRequest::DeleteFile { filename: d.filename }
			}
			ActionCode::FileRecipe => {
				let d: FilenameData = serde_json::from_value(data)?;
				ActionRequest::FileRecipe { filename: d.filename }
			}
			ActionCode::UpdateFile => {
				let d: UpdateFileData = serde_json::from_value(data)?;
				let blocks = d
					.recipe_info
					.blocks
					.into_iter()
					.map(|(i, encoded)| BASE64.decode(encoded).map(|bytes| (i, bytes)))
					.collect::<Result<RawBlocks, _>>()?;
				ActionRequest::UpdateFile {
					filename: d.recipe_info.filename,
					block_size: d.recipe_info.block_size,
					blocks,
				}
			}
		};
		Ok(request)
	}
}

/// Outcome message of a mutating action (or of a failed query)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionStatus {
	pub action: ActionCode,
	#[serde(default = "default_success")]
	pub success: bool,
	pub msg: String,
}

fn default_success() -> bool {
	true
}

impl ActionStatus {
	pub fn ok(action: ActionCode, msg: impl Into<String>) -> Self {
		ActionStatus { action, success: true, msg: msg.into() }
	}

	pub fn failed(action: ActionCode, msg: impl Into<String>) -> Self {
		ActionStatus { action, success: false, msg: msg.into() }
	}
}

#[derive(Debug, Serialize, Deserialize)]
struct ListingBody {
	action: ActionCode,
	block_size: usize,
	file_info: Vec<FileEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RecipeBody {
	action: ActionCode,
	recipe_info: FileRecipe,
}

/// The server's answer to one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionResponse {
	Listing { block_size: usize, files: Vec<FileEntry> },
	Recipe(FileRecipe),
	Status(ActionStatus),
}

impl ActionResponse {
	pub fn action(&self) -> ActionCode {
		match self {
			ActionResponse::Listing { .. } => ActionCode::EnumerateDirectory,
			ActionResponse::Recipe(_) => ActionCode::FileRecipe,
			ActionResponse::Status(status) => status.action,
		}
	}

	/// False only for failure statuses
	pub fn is_success(&self) -> bool {
		match self {
			ActionResponse::Status(status) => status.success,
			_ => true,
		}
	}

	/// Server payload: `{response: {action, ...}}`
	pub fn to_payload(&self) -> Result<Value, ProtocolError> {
		let body = match self {
			ActionResponse::Listing { block_size, files } => serde_json::to_value(ListingBody {
				action: ActionCode::EnumerateDirectory,
				block_size: *block_size,
				file_info: files.clone(),
			})?,
			ActionResponse::Recipe(recipe) => serde_json::to_value(RecipeBody {
				action: ActionCode::FileRecipe,
				recipe_info: recipe.clone(),
			})?,
			ActionResponse::Status(status) => serde_json::to_value(status)?,
		};
		Ok(serde_json::json!({ "response": body }))
	}

	pub fn from_payload(mut payload: Value) -> Result<Self, ProtocolError> {
		let body = payload
			.get_mut("response")
			.map(Value::take)
			.ok_or_else(|| ProtocolError::InvalidPayload("missing \"response\" object".to_string()))?;
		let action = body
			.get("action")
			.and_then(Value::as_i64)
			.ok_or_else(|| ProtocolError::InvalidPayload("response without action".to_string()))?;
		let action = ActionCode::try_from(action)?;

		let response = match action {
			ActionCode::EnumerateDirectory if body.get("file_info").is_some() => {
				let b: ListingBody = serde_json::from_value(body)?;
				ActionResponse::Listing { block_size: b.block_size, files: b.file_info }
			}
			ActionCode::FileRecipe if body.get("recipe_info").is_some() => {
				let b: RecipeBody = serde_json::from_value(body)?;
				ActionResponse::Recipe(b.recipe_info)
			}
			_ => ActionResponse::Status(serde_json::from_value(body)?),
		};
		Ok(response)
	}
}


// vim: ts=4
