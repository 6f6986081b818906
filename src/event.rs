//! Readiness multiplexing
//!
//! Sessions never talk to `mio` directly. They see a `Multiplexer` (register, re-arm,
//! deregister, wait) and a `Channel` (a non-blocking byte stream), which lets the state
//! machines run against scripted fakes in tests.

use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::time::Duration;

/// Identifies one registered source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(pub usize);

/// What a registration waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
	Readable,
	Writable,
}

impl Interest {
	fn to_mio(self) -> mio::Interest {
		match self {
			Interest::Readable => mio::Interest::READABLE,
			Interest::Writable => mio::Interest::WRITABLE,
		}
	}
}

/// One readiness notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
	pub token: Token,
	pub readable: bool,
	pub writable: bool,
	pub error: bool,
	/// Either direction was closed by the peer
	pub closed: bool,
}

impl Readiness {
	pub fn readable(token: Token) -> Self {
		Readiness { token, readable: true, writable: false, error: false, closed: false }
	}

	pub fn writable(token: Token) -> Self {
		Readiness { token, readable: false, writable: true, error: false, closed: false }
	}
}

/// The wait half of a multiplexer, independent of what is registered
pub trait Poller {
	/// Block for at most `timeout` and report ready sources
	///
	/// An interrupted wait reports nothing rather than failing.
	fn wait(&mut self, timeout: Option<Duration>) -> io::Result<Vec<Readiness>>;
}

/// Registration over sources of type `S`
pub trait Multiplexer<S: ?Sized>: Poller {
	fn register(&mut self, source: &mut S, token: Token, interest: Interest) -> io::Result<()>;
	fn reregister(&mut self, source: &mut S, token: Token, interest: Interest) -> io::Result<()>;
	fn deregister(&mut self, source: &mut S) -> io::Result<()>;
}

/// `mio::Poll` behind the `Multiplexer` trait
pub struct MioMultiplexer {
	poll: mio::Poll,
	events: mio::Events,
}

impl MioMultiplexer {
	pub fn new(capacity: usize) -> io::Result<Self> {
		Ok(MioMultiplexer { poll: mio::Poll::new()?, events: mio::Events::with_capacity(capacity) })
	}
}

impl Poller for MioMultiplexer {
	fn wait(&mut self, timeout: Option<Duration>) -> io::Result<Vec<Readiness>> {
		match self.poll.poll(&mut self.events, timeout) {
			Ok(()) => {}
			Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(Vec::new()),
			Err(e) => return Err(e),
		}

		Ok(self
			.events
			.iter()
			.map(|event| Readiness {
				token: Token(event.token().0),
				readable: event.is_readable(),
				writable: event.is_writable(),
				error: event.is_error(),
				closed: event.is_read_closed() || event.is_write_closed(),
			})
			.collect())
	}
}

impl<S: mio::event::Source + ?Sized> Multiplexer<S> for MioMultiplexer {
	fn register(&mut self, source: &mut S, token: Token, interest: Interest) -> io::Result<()> {
		self.poll.registry().register(source, mio::Token(token.0), interest.to_mio())
	}

	fn reregister(&mut self, source: &mut S, token: Token, interest: Interest) -> io::Result<()> {
		self.poll.registry().reregister(source, mio::Token(token.0), interest.to_mio())
	}

	fn deregister(&mut self, source: &mut S) -> io::Result<()> {
		self.poll.registry().deregister(source)
	}
}

/// A non-blocking byte stream
///
/// Reads and writes return `WouldBlock` when no progress is possible.
pub trait Channel: Read + Write {
	/// Human readable peer address, for logs
	fn peer(&self) -> String;

	/// Pending socket error (e.g. a refused connect)
	fn take_error(&self) -> io::Result<Option<io::Error>>;

	fn shutdown(&self) -> io::Result<()>;
}

impl Channel for mio::net::TcpStream {
	fn peer(&self) -> String {
		self.peer_addr().map(|a| a.to_string()).unwrap_or_else(|_| "<unconnected>".to_string())
	}

	fn take_error(&self) -> io::Result<Option<io::Error>> {
		mio::net::TcpStream::take_error(self)
	}

	fn shutdown(&self) -> io::Result<()> {
		mio::net::TcpStream::shutdown(self, Shutdown::Both)
	}
}



// vim: ts=4
