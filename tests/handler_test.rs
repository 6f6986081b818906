use std::fs;
use tempfile::TempDir;

use dirmirror::protocol::{self, frame, ActionHandler, ActionStatus, DirectoryActionHandler};
use dirmirror::types::RawBlocks;
use dirmirror::{ActionCode, ActionRequest, ActionResponse};

fn handler(dir: &TempDir) -> DirectoryActionHandler {
	DirectoryActionHandler::new(dir.path(), 4096).unwrap()
}

fn status(response: ActionResponse) -> ActionStatus {
	match response {
		ActionResponse::Status(status) => status,
		other => panic!("expected a status, got {:?}", other),
	}
}

#[test]
fn test_new_file_twice() {
	let dir = TempDir::new().unwrap();
	let h = handler(&dir);

	let first = status(h.handle(ActionRequest::NewFile {
		filename: "a.txt".to_string(),
		content: b"original".to_vec(),
	}));
	assert!(first.success);
	assert_eq!(first.action, ActionCode::NewFile);

	let second = status(h.handle(ActionRequest::NewFile {
		filename: "a.txt".to_string(),
		content: b"anything".to_vec(),
	}));
	assert!(!second.success);
	assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), b"original");
}

#[test]
fn test_delete_missing_file() {
	let dir = TempDir::new().unwrap();
	let s = status(handler(&dir).handle(ActionRequest::DeleteFile { filename: "missing.txt".to_string() }));
	assert!(s.success);
	assert!(s.msg.contains("nothing to delete"));
}

#[test]
fn test_move_onto_existing_destination() {
	let dir = TempDir::new().unwrap();
	fs::write(dir.path().join("a"), b"a").unwrap();
	fs::write(dir.path().join("b"), b"b").unwrap();

	let s = status(handler(&dir).handle(ActionRequest::MoveFile {
		source: "a".to_string(),
		destination: "b".to_string(),
	}));
	assert!(!s.success);
	assert_eq!(fs::read(dir.path().join("a")).unwrap(), b"a");
	assert_eq!(fs::read(dir.path().join("b")).unwrap(), b"b");
}

#[test]
fn test_update_is_idempotent() {
	let dir = TempDir::new().unwrap();
	fs::write(dir.path().join("f"), b"0123456789").unwrap();
	let h = DirectoryActionHandler::new(dir.path(), 4).unwrap();

	let blocks: RawBlocks = [(1, b"abcd".to_vec()), (3, b"wxyz".to_vec())].into_iter().collect();
	let request = ActionRequest::UpdateFile { filename: "f".to_string(), block_size: 4, blocks };

	assert!(h.handle(request.clone()).is_success());
	let once = fs::read(dir.path().join("f")).unwrap();
	assert!(h.handle(request).is_success());
	let twice = fs::read(dir.path().join("f")).unwrap();

	assert_eq!(once, b"0123abcd89wxyz");
	assert_eq!(once, twice);
}

#[test]
fn test_recipe_matches_block_count() {
	let dir = TempDir::new().unwrap();
	fs::write(dir.path().join("big"), vec![1u8; 12000]).unwrap();
	match handler(&dir).handle(ActionRequest::FileRecipe { filename: "big".to_string() }) {
		ActionResponse::Recipe(recipe) => {
			assert_eq!(recipe.block_size, 4096);
			assert_eq!(recipe.hash_algorithm, "sha256");
			assert_eq!(recipe.recipe.keys().copied().collect::<Vec<_>>(), vec![0, 1, 2]);
		}
		other => panic!("expected a recipe, got {:?}", other),
	}
}

#[test]
fn test_request_bytes_to_response_bytes() {
	let dir = TempDir::new().unwrap();
	fs::write(dir.path().join("one"), b"1").unwrap();
	let h = handler(&dir);

	let wire = protocol::encode_request(&ActionRequest::EnumerateDirectory).unwrap();
	let (header, payload, _) = frame::decode_frame(&wire).unwrap().unwrap();
	let response = h.handle(protocol::decode_request(&header, &payload).unwrap());

	let wire = protocol::encode_response(&response).unwrap();
	let (header, payload, _) = frame::decode_frame(&wire).unwrap().unwrap();
	let json: serde_json::Value = frame::decode_json(&payload, &header.content_encoding).unwrap();
	assert_eq!(json["response"]["action"], 1);
	assert_eq!(json["response"]["file_info"][0]["filename"], "one");
	assert_eq!(json["response"]["file_info"][0]["file_size"], 1);
}

// vim: ts=4
