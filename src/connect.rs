use mio::net::TcpStream;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::ConnectionError;
use crate::event::{MioMultiplexer, Poller, Token};
use crate::logging::*;
use crate::protocol::{ActionRequest, ActionResponse, ProtocolError};
use crate::session::{ClientSession, Session};

const CLIENT: Token = Token(0);

/// Tuning for one client exchange
#[derive(Debug, Clone, Copy)]
pub struct ExchangeOptions {
	pub poll_timeout: Duration,
	pub recv_buffer_size: usize,
}

/// Open a fresh connection to `addr`, send `request` and wait for its response
///
/// Blocks the caller, not a shared loop: the exchange gets its own multiplexer. Raising
/// `shutdown` abandons the exchange at the next wait boundary.
pub fn exchange(
	addr: SocketAddr,
	request: &ActionRequest,
	options: ExchangeOptions,
	shutdown: &AtomicBool,
) -> Result<ActionResponse, ConnectionError> {
	let stream = TcpStream::connect(addr)
		.map_err(|source| ConnectionError::ConnectFailed { address: addr.to_string(), source })?;
	let mut mux = MioMultiplexer::new(8)?;
	let mut session = ClientSession::new(stream, CLIENT, request, options.recv_buffer_size)?;
	session.register(&mut mux)?;
	debug!("Starting {} exchange with {}", request.code(), addr);

	let result = drive(&mut session, &mut mux, options.poll_timeout, shutdown);
	session.close(&mut mux);
	result.map_err(|e| match e {
		// The session cannot name an unconnected peer
		ConnectionError::ConnectFailed { source, .. } => {
			ConnectionError::ConnectFailed { address: addr.to_string(), source }
		}
		other => other,
	})?;

	session.take_response().ok_or_else(|| {
		ConnectionError::Protocol(ProtocolError::InvalidPayload("exchange ended without a response".to_string()))
	})
}

fn drive(
	session: &mut ClientSession<TcpStream>,
	mux: &mut MioMultiplexer,
	poll_timeout: Duration,
	shutdown: &AtomicBool,
) -> Result<(), ConnectionError> {
	while !session.is_finished() {
		if shutdown.load(Ordering::SeqCst) {
			return Err(ConnectionError::Interrupted);
		}
		for readiness in mux.wait(Some(poll_timeout))? {
			if readiness.token == CLIENT {
				session.process_events(mux, &readiness)?;
			}
		}
	}
	Ok(())
}


// vim: ts=4
