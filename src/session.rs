//! Per-connection state machines
//!
//! A session owns one channel, its send/receive buffers and a phase marker. The event
//! loop feeds it readiness notifications; the session reads or writes as far as the
//! channel allows, advances its phase, and re-arms its registration to match.
//!
//! ```text
//! client: Connecting -> SendingRequest -> AwaitingHeaderLength -> AwaitingHeader
//!             -> AwaitingBody -> Done
//! server: AwaitingHeaderLength -> AwaitingHeader -> AwaitingBody -> Processing
//!             -> SendingResponse -> Done
//! ```
//!
//! Any error moves a session to `Failed`; the owner closes it and drops it.

use std::io::{self, Read, Write};
use std::rc::Rc;

use crate::error::ConnectionError;
use crate::event::{Channel, Interest, Multiplexer, Readiness, Token};
use crate::logging::*;
use crate::protocol::frame::{self, FrameHeader};
use crate::protocol::{self, ActionHandler, ActionRequest, ActionResponse, ProtocolError};

/// Where a session is in its exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
	Connecting,
	SendingRequest,
	AwaitingHeaderLength,
	AwaitingHeader { header_len: usize },
	AwaitingBody { header: FrameHeader },
	Processing,
	SendingResponse,
	Done,
	Failed,
}

impl Phase {
	fn wants_input(&self) -> bool {
		matches!(
			self,
			Phase::AwaitingHeaderLength | Phase::AwaitingHeader { .. } | Phase::AwaitingBody { .. }
		)
	}

	fn wants_output(&self) -> bool {
		matches!(self, Phase::Connecting | Phase::SendingRequest | Phase::SendingResponse)
	}

	fn interest(&self) -> Interest {
		if self.wants_output() {
			Interest::Writable
		} else {
			Interest::Readable
		}
	}
}

/// Operations the event loop drives on every connection
pub trait Session {
	type Channel: Channel;

	fn token(&self) -> Token;

	fn phase(&self) -> &Phase;

	/// Register the channel with its initial interest
	fn register<M>(&mut self, mux: &mut M) -> Result<(), ConnectionError>
	where
		M: Multiplexer<Self::Channel> + ?Sized;

	/// React to one readiness notification
	fn process_events<M>(&mut self, mux: &mut M, readiness: &Readiness) -> Result<(), ConnectionError>
	where
		M: Multiplexer<Self::Channel> + ?Sized;

	/// Pull whatever is available and decode as far as possible
	fn read(&mut self) -> Result<(), ConnectionError>;

	/// Push buffered output until drained or the channel would block
	fn write(&mut self) -> Result<(), ConnectionError>;

	/// Deregister and shut the channel down; safe to call more than once
	fn close<M>(&mut self, mux: &mut M)
	where
		M: Multiplexer<Self::Channel> + ?Sized;

	fn is_finished(&self) -> bool {
		matches!(self.phase(), Phase::Done | Phase::Failed)
	}
}

/// Buffers and bookkeeping shared by both session kinds
struct Conn<S> {
	channel: S,
	token: Token,
	peer: String,
	phase: Phase,
	interest: Interest,
	recv_buf: Vec<u8>,
	send_buf: Vec<u8>,
	recv_buffer_size: usize,
	closed: bool,
}

impl<S: Channel> Conn<S> {
	fn new(channel: S, token: Token, phase: Phase, recv_buffer_size: usize) -> Self {
		let peer = channel.peer();
		let interest = phase.interest();
		Conn {
			channel,
			token,
			peer,
			phase,
			interest,
			recv_buf: Vec::new(),
			send_buf: Vec::new(),
			recv_buffer_size: recv_buffer_size.max(1),
			closed: false,
		}
	}

	/// Receive until the phase stops wanting input or the channel would block
	///
	/// `on_frame` runs as soon as a complete frame is buffered; it must move the phase
	/// out of the receiving states.
	fn receive<F>(&mut self, mut on_frame: F) -> Result<(), ConnectionError>
	where
		F: FnMut(&mut Self, FrameHeader, Vec<u8>) -> Result<(), ConnectionError>,
	{
		let mut chunk = vec![0u8; self.recv_buffer_size];

		while self.phase.wants_input() {
			match self.channel.read(&mut chunk) {
				Ok(0) => {
					return Err(ConnectionError::PeerClosed { address: self.peer.clone() });
				}
				Ok(n) => {
					self.recv_buf.extend_from_slice(&chunk[..n]);
					if let Some((header, payload)) = self.decode_step()? {
						on_frame(self, header, payload)?;
					}
				}
				Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
				Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
				Err(e) => return Err(ConnectionError::Io(e)),
			}
		}
		Ok(())
	}

	/// Advance through the header states as far as the buffered bytes allow
	fn decode_step(&mut self) -> Result<Option<(FrameHeader, Vec<u8>)>, ProtocolError> {
		loop {
			match &self.phase {
				Phase::AwaitingHeaderLength => match frame::take_header_len(&mut self.recv_buf) {
					Some(header_len) => self.phase = Phase::AwaitingHeader { header_len },
					None => return Ok(None),
				},
				Phase::AwaitingHeader { header_len } => {
					let header_len = *header_len;
					match frame::take_header(&mut self.recv_buf, header_len)? {
						Some(header) => {
							log_header(&self.peer, &header);
							self.phase = Phase::AwaitingBody { header };
						}
						None => return Ok(None),
					}
				}
				Phase::AwaitingBody { header } => {
					let header = header.clone();
					return match frame::take_payload(&mut self.recv_buf, &header) {
						Some(payload) => {
							self.phase = Phase::Processing;
							Ok(Some((header, payload)))
						}
						None => Ok(None),
					};
				}
				_ => return Ok(None),
			}
		}
	}

	fn send(&mut self) -> Result<(), ConnectionError> {
		while !self.send_buf.is_empty() {
			match self.channel.write(&self.send_buf) {
				Ok(0) => {
					return Err(ConnectionError::Io(io::Error::new(
						io::ErrorKind::WriteZero,
						"channel accepted no bytes",
					)));
				}
				Ok(n) => {
					self.send_buf.drain(..n);
				}
				Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
				Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
				Err(e) => return Err(ConnectionError::Io(e)),
			}
		}
		Ok(())
	}

	fn check_error(&mut self) -> Result<(), ConnectionError> {
		match self.channel.take_error()? {
			Some(e) => Err(ConnectionError::Io(e)),
			None => Ok(()),
		}
	}

	/// Re-arm the registration when the phase needs a different interest
	fn sync_interest<M>(&mut self, mux: &mut M) -> Result<(), ConnectionError>
	where
		M: Multiplexer<S> + ?Sized,
	{
		if matches!(self.phase, Phase::Done | Phase::Failed) {
			return Ok(());
		}
		let wanted = self.phase.interest();
		if wanted != self.interest {
			mux.reregister(&mut self.channel, self.token, wanted)?;
			self.interest = wanted;
		}
		Ok(())
	}

	fn close<M>(&mut self, mux: &mut M)
	where
		M: Multiplexer<S> + ?Sized,
	{
		if self.closed {
			return;
		}
		self.closed = true;
		debug!("Closing connection to {}", self.peer);
		if let Err(e) = mux.deregister(&mut self.channel) {
			debug!("Deregistering {} failed: {}", self.peer, e);
		}
		if let Err(e) = self.channel.shutdown() {
			debug!("Shutting down {} failed: {}", self.peer, e);
		}
		if self.phase != Phase::Done {
			self.phase = Phase::Failed;
		}
	}

	fn fail(&mut self, e: ConnectionError) -> ConnectionError {
		self.phase = Phase::Failed;
		e
	}
}

fn log_header(peer: &str, header: &FrameHeader) {
	debug!(
		"Header from {}: {} bytes, {}, {} endian",
		peer, header.content_length, header.content_encoding, header.byteorder
	);
}

/// Client side of one request/response exchange
pub struct ClientSession<S> {
	conn: Conn<S>,
	response: Option<ActionResponse>,
}

impl<S: Channel> ClientSession<S> {
	/// Prepare a session for a channel whose connect may still be in progress
	///
	/// The request is serialized once, up front.
	pub fn new(
		channel: S,
		token: Token,
		request: &ActionRequest,
		recv_buffer_size: usize,
	) -> Result<Self, ConnectionError> {
		let mut conn = Conn::new(channel, token, Phase::Connecting, recv_buffer_size);
		conn.send_buf = protocol::encode_request(request)?;
		debug!("Prepared {} request for {} ({} bytes)", request.code(), conn.peer, conn.send_buf.len());
		Ok(ClientSession { conn, response: None })
	}

	/// The decoded response, once the session is `Done`
	pub fn take_response(&mut self) -> Option<ActionResponse> {
		self.response.take()
	}

	pub fn peer(&self) -> &str {
		&self.conn.peer
	}

	fn step(&mut self, readiness: &Readiness) -> Result<(), ConnectionError> {
		if readiness.error {
			if let Some(e) = self.conn.channel.take_error()? {
				return Err(match self.conn.phase {
					Phase::Connecting => {
						ConnectionError::ConnectFailed { address: self.conn.peer.clone(), source: e }
					}
					_ => ConnectionError::Io(e),
				});
			}
		}

		if readiness.writable && self.conn.phase == Phase::Connecting {
			if let Some(e) = self.conn.channel.take_error()? {
				return Err(ConnectionError::ConnectFailed { address: self.conn.peer.clone(), source: e });
			}
			// Resolved only once connected
			self.conn.peer = self.conn.channel.peer();
			debug!("Connected to {}", self.conn.peer);
			self.conn.phase = Phase::SendingRequest;
		}

		if readiness.writable && self.conn.phase.wants_output() {
			self.write()?;
		}

		if (readiness.readable || readiness.closed) && self.conn.phase.wants_input() {
			self.read()?;
		}
		Ok(())
	}
}

impl<S: Channel> Session for ClientSession<S> {
	type Channel = S;

	fn token(&self) -> Token {
		self.conn.token
	}

	fn phase(&self) -> &Phase {
		&self.conn.phase
	}

	fn register<M>(&mut self, mux: &mut M) -> Result<(), ConnectionError>
	where
		M: Multiplexer<S> + ?Sized,
	{
		mux.register(&mut self.conn.channel, self.conn.token, self.conn.interest)?;
		Ok(())
	}

	fn process_events<M>(&mut self, mux: &mut M, readiness: &Readiness) -> Result<(), ConnectionError>
	where
		M: Multiplexer<S> + ?Sized,
	{
		match self.step(readiness).and_then(|_| self.conn.sync_interest(mux)) {
			Ok(()) => Ok(()),
			Err(e) => Err(self.conn.fail(e)),
		}
	}

	fn read(&mut self) -> Result<(), ConnectionError> {
		let response = &mut self.response;
		self.conn.receive(|conn, header, payload| {
			let decoded = protocol::decode_response(&header, &payload)?;
			debug!("Response from {}: {}", conn.peer, decoded.action());
			*response = Some(decoded);
			conn.phase = Phase::Done;
			Ok(())
		})
	}

	fn write(&mut self) -> Result<(), ConnectionError> {
		self.conn.send()?;
		if self.conn.send_buf.is_empty() && self.conn.phase == Phase::SendingRequest {
			self.conn.phase = Phase::AwaitingHeaderLength;
		}
		Ok(())
	}

	fn close<M>(&mut self, mux: &mut M)
	where
		M: Multiplexer<S> + ?Sized,
	{
		self.conn.close(mux);
	}
}

/// Server side of one connection: one request in, one response out, then close
pub struct ServerSession<S> {
	conn: Conn<S>,
	handler: Rc<dyn ActionHandler>,
}

impl<S: Channel> ServerSession<S> {
	pub fn new(channel: S, token: Token, handler: Rc<dyn ActionHandler>, recv_buffer_size: usize) -> Self {
		ServerSession {
			conn: Conn::new(channel, token, Phase::AwaitingHeaderLength, recv_buffer_size),
			handler,
		}
	}

	pub fn peer(&self) -> &str {
		&self.conn.peer
	}

	fn step(&mut self, readiness: &Readiness) -> Result<(), ConnectionError> {
		if readiness.error {
			self.conn.check_error()?;
		}
		if (readiness.readable || readiness.closed) && self.conn.phase.wants_input() {
			self.read()?;
		}
		// A response is attempted right away; most fit in the socket buffer.
		if self.conn.phase.wants_output() {
			self.write()?;
		}
		Ok(())
	}
}

impl<S: Channel> Session for ServerSession<S> {
	type Channel = S;

	fn token(&self) -> Token {
		self.conn.token
	}

	fn phase(&self) -> &Phase {
		&self.conn.phase
	}

	fn register<M>(&mut self, mux: &mut M) -> Result<(), ConnectionError>
	where
		M: Multiplexer<S> + ?Sized,
	{
		mux.register(&mut self.conn.channel, self.conn.token, self.conn.interest)?;
		Ok(())
	}

	fn process_events<M>(&mut self, mux: &mut M, readiness: &Readiness) -> Result<(), ConnectionError>
	where
		M: Multiplexer<S> + ?Sized,
	{
		match self.step(readiness).and_then(|_| self.conn.sync_interest(mux)) {
			Ok(()) => Ok(()),
			Err(e) => Err(self.conn.fail(e)),
		}
	}

	fn read(&mut self) -> Result<(), ConnectionError> {
		let handler = Rc::clone(&self.handler);
		self.conn.receive(|conn, header, payload| {
			let request = protocol::decode_request(&header, &payload)?;
			info!("{} request from {}", request.code(), conn.peer);
			let response = handler.handle(request);
			conn.send_buf = protocol::encode_response(&response)?;
			conn.phase = Phase::SendingResponse;
			Ok(())
		})
	}

	fn write(&mut self) -> Result<(), ConnectionError> {
		self.conn.send()?;
		if self.conn.send_buf.is_empty() && self.conn.phase == Phase::SendingResponse {
			debug!("Response sent to {}", self.conn.peer);
			self.conn.phase = Phase::Done;
		}
		Ok(())
	}

	fn close<M>(&mut self, mux: &mut M)
	where
		M: Multiplexer<S> + ?Sized,
	{
		self.conn.close(mux);
	}
}


// vim: ts=4
