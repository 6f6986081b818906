use std::fs;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::Path;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tempfile::TempDir;

use dirmirror::connect::{self, ExchangeOptions};
use dirmirror::protocol::frame;
use dirmirror::protocol::DirectoryActionHandler;
use dirmirror::serve::Server;
use dirmirror::validation::MAX_BLOCK_SIZE;
use dirmirror::{ActionRequest, ActionResponse, Config, FileEvent, SyncDispatcher};

const BLOCK_SIZE: usize = 4;

/// A server loop on an ephemeral port, stopped on drop
struct TestServer {
	addr: SocketAddr,
	shutdown: Arc<AtomicBool>,
	handle: Option<JoinHandle<()>>,
}

impl TestServer {
	fn start(dir: &Path) -> TestServer {
		TestServer::start_with_block_size(dir, BLOCK_SIZE)
	}

	/// The handler advertises `handler_block_size` in listings and recipes
	fn start_with_block_size(dir: &Path, handler_block_size: usize) -> TestServer {
		let dir = dir.to_path_buf();
		let shutdown = Arc::new(AtomicBool::new(false));
		let flag = Arc::clone(&shutdown);
		let (tx, rx) = mpsc::channel();

		let handle = thread::spawn(move || {
			let config = Config { port: 0, block_size: BLOCK_SIZE, poll_timeout_ms: 20, ..Config::default() };
			let handler = DirectoryActionHandler::new(&dir, handler_block_size).unwrap();
			let mut server = Server::bind(Rc::new(handler), &config).unwrap();
			tx.send(server.local_addr().unwrap()).unwrap();
			server.run(&flag).unwrap();
		});

		let addr = rx.recv_timeout(Duration::from_secs(5)).expect("server did not start");
		TestServer { addr, shutdown, handle: Some(handle) }
	}

	fn dispatcher(&self, dir: &Path) -> SyncDispatcher {
		let config = Config {
			host: self.addr.ip().to_string(),
			port: self.addr.port(),
			block_size: BLOCK_SIZE,
			poll_timeout_ms: 20,
			..Config::default()
		};
		SyncDispatcher::new(dir, &config, Arc::new(AtomicBool::new(false))).unwrap()
	}
}

impl Drop for TestServer {
	fn drop(&mut self) {
		self.shutdown.store(true, Ordering::SeqCst);
		if let Some(handle) = self.handle.take() {
			let _ = handle.join();
		}
	}
}

fn status_msg(response: &ActionResponse) -> &str {
	match response {
		ActionResponse::Status(status) => &status.msg,
		other => panic!("expected a status, got {:?}", other),
	}
}

#[test]
fn test_initial_reconciliation() {
	let local = TempDir::new().unwrap();
	let remote = TempDir::new().unwrap();
	fs::write(local.path().join("x.txt"), b"aaaa-one").unwrap();
	fs::write(local.path().join("z.txt"), b"only local").unwrap();
	fs::write(local.path().join("same.txt"), b"same").unwrap();
	fs::write(remote.path().join("x.txt"), b"aaaa-two").unwrap();
	fs::write(remote.path().join("y.txt"), b"only remote").unwrap();
	fs::write(remote.path().join("same.txt"), b"same").unwrap();

	let server = TestServer::start(remote.path());
	let report = server.dispatcher(local.path()).enumerate_and_reconcile().unwrap();

	assert_eq!(report.plan.update, vec!["x.txt"]);
	assert_eq!(report.plan.delete_remote, vec!["y.txt"]);
	assert_eq!(report.plan.upload, vec!["z.txt"]);
	assert_eq!(report.plan.same, vec!["same.txt"]);
	assert!(report.failed.is_empty());

	assert_eq!(fs::read(remote.path().join("x.txt")).unwrap(), b"aaaa-one");
	assert_eq!(fs::read(remote.path().join("z.txt")).unwrap(), b"only local");
	assert!(!remote.path().join("y.txt").exists());

	// A second pass finds nothing to do
	let again = server.dispatcher(local.path()).enumerate_and_reconcile().unwrap();
	assert!(again.plan.is_in_sync());
}

#[test]
fn test_live_events_mirror_changes() {
	let local = TempDir::new().unwrap();
	let remote = TempDir::new().unwrap();
	let server = TestServer::start(remote.path());
	let dispatcher = server.dispatcher(local.path());

	let content: Vec<u8> = (0..40u8).collect();
	fs::write(local.path().join("data.bin"), &content).unwrap();
	let resp = dispatcher.handle_event(&FileEvent::Created("data.bin".to_string())).unwrap();
	assert!(resp.is_success());
	assert_eq!(fs::read(remote.path().join("data.bin")).unwrap(), content);

	let mut edited = content.clone();
	edited[17] = 0xff;
	edited.extend_from_slice(b"tail");
	fs::write(local.path().join("data.bin"), &edited).unwrap();
	let resp = dispatcher.handle_event(&FileEvent::Modified("data.bin".to_string())).unwrap();
	assert!(status_msg(&resp).contains("Successfully updated"));
	assert_eq!(fs::read(remote.path().join("data.bin")).unwrap(), edited);

	fs::rename(local.path().join("data.bin"), local.path().join("moved.bin")).unwrap();
	let moved = FileEvent::Moved { from: "data.bin".to_string(), to: "moved.bin".to_string() };
	assert!(dispatcher.handle_event(&moved).unwrap().is_success());
	assert!(!remote.path().join("data.bin").exists());
	assert_eq!(fs::read(remote.path().join("moved.bin")).unwrap(), edited);

	fs::remove_file(local.path().join("moved.bin")).unwrap();
	assert!(dispatcher.handle_event(&FileEvent::Deleted("moved.bin".to_string())).unwrap().is_success());
	assert!(!remote.path().join("moved.bin").exists());
}

#[test]
fn test_unchanged_file_skips_update() {
	let local = TempDir::new().unwrap();
	let remote = TempDir::new().unwrap();
	fs::write(local.path().join("f"), b"identical").unwrap();
	fs::write(remote.path().join("f"), b"identical").unwrap();

	let server = TestServer::start(remote.path());
	let resp = server.dispatcher(local.path()).update_file("f").unwrap();
	assert!(resp.is_success());
	assert!(status_msg(&resp).contains("already up to date"));
}

#[test]
fn test_update_of_file_missing_remotely_reports_failure() {
	let local = TempDir::new().unwrap();
	let remote = TempDir::new().unwrap();
	fs::write(local.path().join("f"), b"x").unwrap();

	let server = TestServer::start(remote.path());
	let resp = server.dispatcher(local.path()).update_file("f").unwrap();
	assert!(!resp.is_success());
	assert!(!remote.path().join("f").exists());
}

#[test]
fn test_new_file_twice_keeps_original() {
	let local = TempDir::new().unwrap();
	let remote = TempDir::new().unwrap();
	let server = TestServer::start(remote.path());
	let dispatcher = server.dispatcher(local.path());

	fs::write(local.path().join("a.txt"), b"first").unwrap();
	assert!(dispatcher.new_file("a.txt").unwrap().is_success());

	fs::write(local.path().join("a.txt"), b"second").unwrap();
	let resp = dispatcher.new_file("a.txt").unwrap();
	assert!(!resp.is_success());
	assert!(status_msg(&resp).contains("already exists"));
	assert_eq!(fs::read(remote.path().join("a.txt")).unwrap(), b"first");
}

#[test]
fn test_unreadable_local_file_uploads_empty() {
	let local = TempDir::new().unwrap();
	let remote = TempDir::new().unwrap();
	let server = TestServer::start(remote.path());

	let resp = server.dispatcher(local.path()).new_file("vanished.txt").unwrap();
	assert!(resp.is_success());
	assert_eq!(fs::read(remote.path().join("vanished.txt")).unwrap(), b"");
}

#[test]
fn test_shrunk_file_keeps_remote_tail() {
	let local = TempDir::new().unwrap();
	let remote = TempDir::new().unwrap();
	fs::write(remote.path().join("f"), b"AAAABBBBCCCC").unwrap();
	fs::write(local.path().join("f"), b"XXXX").unwrap();

	let server = TestServer::start(remote.path());
	server.dispatcher(local.path()).update_file("f").unwrap();
	// Overlay never truncates
	assert_eq!(fs::read(remote.path().join("f")).unwrap(), b"XXXXBBBBCCCC");
}

#[test]
fn test_bad_connection_does_not_stop_server() {
	let local = TempDir::new().unwrap();
	let remote = TempDir::new().unwrap();
	let server = TestServer::start(remote.path());

	// Header without content-length: the server drops this connection
	let mut bad = TcpStream::connect(server.addr).unwrap();
	let header = br#"{"byteorder":"little","content-encoding":"utf-8"}"#;
	bad.write_all(&(header.len() as u16).to_be_bytes()).unwrap();
	bad.write_all(header).unwrap();
	bad.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
	let mut buf = [0u8; 16];
	assert_eq!(bad.read(&mut buf).unwrap_or(0), 0);

	// Unknown action: closed without a response
	let mut unknown = TcpStream::connect(server.addr).unwrap();
	unknown.write_all(&frame::encode_frame(br#"{"action":99}"#, frame::UTF8).unwrap()).unwrap();
	unknown.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
	assert_eq!(unknown.read(&mut buf).unwrap_or(0), 0);

	// Well-formed traffic still works
	fs::write(local.path().join("ok.txt"), b"ok").unwrap();
	assert!(server.dispatcher(local.path()).new_file("ok.txt").unwrap().is_success());
}

#[test]
fn test_huge_update_block_size_is_refused_and_server_survives() {
	let local = TempDir::new().unwrap();
	let remote = TempDir::new().unwrap();
	fs::write(remote.path().join("f"), b"abcdefgh").unwrap();
	let server = TestServer::start(remote.path());

	let request = ActionRequest::UpdateFile {
		filename: "f".to_string(),
		block_size: usize::MAX,
		blocks: [(0, b"XXXX".to_vec())].into_iter().collect(),
	};
	let options = ExchangeOptions { poll_timeout: Duration::from_millis(20), recv_buffer_size: 4096 };
	let response = connect::exchange(server.addr, &request, options, &AtomicBool::new(false)).unwrap();
	assert!(!response.is_success());
	assert!(status_msg(&response).contains("Invalid block size"));
	assert_eq!(fs::read(remote.path().join("f")).unwrap(), b"abcdefgh");

	fs::write(local.path().join("next.txt"), b"still serving").unwrap();
	assert!(server.dispatcher(local.path()).new_file("next.txt").unwrap().is_success());
}

#[test]
fn test_unusable_recipe_block_size_is_a_client_error() {
	let local = TempDir::new().unwrap();
	let remote = TempDir::new().unwrap();
	fs::write(local.path().join("f"), b"local").unwrap();
	fs::write(remote.path().join("f"), b"remote").unwrap();

	let server = TestServer::start_with_block_size(remote.path(), MAX_BLOCK_SIZE + 1);
	assert!(server.dispatcher(local.path()).update_file("f").is_err());
	assert_eq!(fs::read(remote.path().join("f")).unwrap(), b"remote");
}

#[test]
fn test_failed_file_does_not_stop_initial_sync() {
	let local = TempDir::new().unwrap();
	let remote = TempDir::new().unwrap();
	fs::write(local.path().join("changed.txt"), b"local version").unwrap();
	fs::write(remote.path().join("changed.txt"), b"remote version").unwrap();
	fs::write(remote.path().join("stale.txt"), b"gone locally").unwrap();
	fs::write(local.path().join("fresh.txt"), b"new").unwrap();

	// Every recipe from this server is rejected, so only the update fails
	let server = TestServer::start_with_block_size(remote.path(), MAX_BLOCK_SIZE + 1);
	let report = server.dispatcher(local.path()).enumerate_and_reconcile().unwrap();

	assert_eq!(report.plan.update, vec!["changed.txt"]);
	assert_eq!(report.failed, vec!["changed.txt"]);
	assert!(!remote.path().join("stale.txt").exists());
	assert_eq!(fs::read(remote.path().join("fresh.txt")).unwrap(), b"new");
	assert_eq!(fs::read(remote.path().join("changed.txt")).unwrap(), b"remote version");
}

#[cfg(unix)]
#[test]
fn test_unreadable_local_file_keeps_remote_copy() {
	let local = TempDir::new().unwrap();
	let remote = TempDir::new().unwrap();
	std::os::unix::fs::symlink(local.path().join("nowhere"), local.path().join("kept.txt")).unwrap();
	fs::write(remote.path().join("kept.txt"), b"remote copy").unwrap();
	fs::write(remote.path().join("stale.txt"), b"stale").unwrap();

	let server = TestServer::start(remote.path());
	let report = server.dispatcher(local.path()).enumerate_and_reconcile().unwrap();

	assert_eq!(report.unreadable, vec!["kept.txt"]);
	assert_eq!(report.plan.delete_remote, vec!["stale.txt"]);
	assert!(report.failed.is_empty());
	assert_eq!(fs::read(remote.path().join("kept.txt")).unwrap(), b"remote copy");
	assert!(!remote.path().join("stale.txt").exists());
}

#[test]
fn test_server_unreachable() {
	let local = TempDir::new().unwrap();
	let addr = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
	let config = Config { port: addr.port(), poll_timeout_ms: 20, ..Config::default() };
	let dispatcher = SyncDispatcher::new(local.path(), &config, Arc::new(AtomicBool::new(false))).unwrap();
	assert!(dispatcher.delete_file("anything").is_err());
}

// vim: ts=4
