use mio::net::{TcpListener, TcpStream};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::config::Config;
use crate::error::{ConnectionError, SyncError};
use crate::event::{Interest, MioMultiplexer, Multiplexer, Poller, Readiness, Token};
use crate::logging::*;
use crate::protocol::{ActionHandler, DirectoryActionHandler};
use crate::session::{ServerSession, Session};

const LISTENER: Token = Token(0);
const EVENT_CAPACITY: usize = 256;

////////////
// Server //
////////////

/// Single-threaded accept + session loop
///
/// Every connection carries exactly one request. A failing connection is logged and
/// closed; the others keep going.
pub struct Server {
	listener: TcpListener,
	mux: MioMultiplexer,
	sessions: HashMap<Token, ServerSession<TcpStream>>,
	handler: Rc<dyn ActionHandler>,
	next_token: usize,
	poll_timeout: Duration,
	recv_buffer_size: usize,
}

impl Server {
	/// Bind to `config.host:config.port`; port 0 picks an ephemeral port
	pub fn bind(handler: Rc<dyn ActionHandler>, config: &Config) -> Result<Server, SyncError> {
		let addr = config.socket_addr()?;
		let mut listener = TcpListener::bind(addr)?;
		let mut mux = MioMultiplexer::new(EVENT_CAPACITY)?;
		mux.register(&mut listener, LISTENER, Interest::Readable)?;

		Ok(Server {
			listener,
			mux,
			sessions: HashMap::new(),
			handler,
			next_token: LISTENER.0 + 1,
			poll_timeout: config.poll_timeout(),
			recv_buffer_size: config.recv_buffer_size,
		})
	}

	pub fn local_addr(&self) -> io::Result<SocketAddr> {
		self.listener.local_addr()
	}

	pub fn connection_count(&self) -> usize {
		self.sessions.len()
	}

	/// Serve until `shutdown` is raised, then close every open connection
	pub fn run(&mut self, shutdown: &AtomicBool) -> Result<(), SyncError> {
		info!("Listening on {}", self.local_addr()?);

		while !shutdown.load(Ordering::SeqCst) {
			let ready = self.mux.wait(Some(self.poll_timeout))?;
			for readiness in ready {
				if readiness.token == LISTENER {
					self.accept();
				} else {
					self.dispatch(&readiness);
				}
			}
		}

		info!("Shutting down, closing {} connection(s)", self.sessions.len());
		for (_, mut session) in self.sessions.drain() {
			session.close(&mut self.mux);
		}
		Ok(())
	}

	fn accept(&mut self) {
		loop {
			let (stream, addr) = match self.listener.accept() {
				Ok(pair) => pair,
				Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
				Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
				Err(e) => {
					error!("Accept failed: {}", e);
					return;
				}
			};

			let token = Token(self.next_token);
			self.next_token += 1;

			let mut session =
				ServerSession::new(stream, token, Rc::clone(&self.handler), self.recv_buffer_size);
			match session.register(&mut self.mux) {
				Ok(()) => {
					info!("Accepted connection from {}", addr);
					self.sessions.insert(token, session);
				}
				Err(e) => {
					error!("Cannot register connection from {}: {}", addr, e);
					session.close(&mut self.mux);
				}
			}
		}
	}

	fn dispatch(&mut self, readiness: &Readiness) {
		let session = match self.sessions.get_mut(&readiness.token) {
			Some(s) => s,
			// Stale notification for a connection closed earlier in this batch
			None => return,
		};

		let result = session.process_events(&mut self.mux, readiness);
		match result {
			Ok(()) if !session.is_finished() => return,
			Ok(()) => debug!("Exchange with {} complete", session.peer()),
			Err(ConnectionError::PeerClosed { address }) => info!("Peer {} has closed", address),
			Err(e) => error!("Closing connection to {}: {}", session.peer(), e),
		}

		if let Some(mut session) = self.sessions.remove(&readiness.token) {
			session.close(&mut self.mux);
		}
	}
}

/// Run the server role for `dir` until `shutdown` is raised
pub fn serve(dir: &Path, config: &Config, shutdown: &AtomicBool) -> Result<(), SyncError> {
	let handler = DirectoryActionHandler::new(dir, config.block_size)?;
	info!("Serving {} with block size {}", handler.directory().display(), handler.block_size());

	let mut server = Server::bind(Rc::new(handler), config)?;
	server.run(shutdown)
}


// vim: ts=4
