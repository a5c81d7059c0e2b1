use std::{collections::VecDeque, io, net::SocketAddr};

use thiserror::Error;
use tokio::{io::AsyncWriteExt, net::TcpStream};
use tracing::{debug, warn};

use crate::{
    emulator::Emulator,
    error::{CommandError, FrameError},
    frame::{Frame, ReceiveBuffer},
    message::Reply,
    session::Session,
};

/// Why a connection stopped being serviceable.
#[derive(Debug, Error)]
pub enum ConnectionFault {
    #[error("peer closed the connection")]
    Closed,
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
    #[error("{pending} unsent reply bytes exceed the {limit} byte backlog")]
    Backlog { pending: usize, limit: usize },
    #[error("protocol fault: {0}")]
    Framing(#[from] FrameError),
}

/// One client socket plus its framing and protocol state.
///
/// Owned exclusively by the server's polling task, so neither the buffers nor
/// the session need a lock. Neither direction ever waits on the socket:
/// reads take what is available and replies queue in `outbound` until the
/// peer accepts them.
pub struct Connection {
    stream: Option<TcpStream>,
    peer: SocketAddr,
    buffer: ReceiveBuffer,
    outbound: VecDeque<u8>,
    max_backlog: usize,
    session: Session,
    fault: Option<ConnectionFault>,
}

impl Connection {
    pub fn new(
        id: u64,
        stream: TcpStream,
        peer: SocketAddr,
        buffer_capacity: usize,
        max_backlog: usize,
    ) -> Self {
        Self {
            stream: Some(stream),
            peer,
            buffer: ReceiveBuffer::with_capacity(buffer_capacity),
            outbound: VecDeque::new(),
            max_backlog,
            session: Session::new(id),
            fault: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.session.id()
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn client_name(&self) -> Option<&str> {
        self.session.client_name()
    }

    pub fn fault(&self) -> Option<&ConnectionFault> {
        self.fault.as_ref()
    }

    pub fn has_error(&self) -> bool {
        self.fault.is_some() || self.stream.is_none()
    }

    /// Reads whatever is available, handles every complete frame, and sends
    /// as much of the queued output as the socket takes.
    pub async fn process(&mut self, emulator: &dyn Emulator) {
        self.fill();

        while self.stream.is_some() {
            let frame = match self.buffer.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(err) => {
                    warn!(id = self.id(), error = %err, "dropping client after framing fault");
                    self.enqueue(&[Reply::error(&CommandError::from(err.clone()))]);
                    self.disconnect(ConnectionFault::Framing(err)).await;
                    return;
                }
            };

            let replies: Vec<Reply> = match frame {
                Frame::Text(line) => self
                    .session
                    .handle_line(&line, emulator)
                    .into_iter()
                    .collect(),
                Frame::Binary(payload) => {
                    debug!(id = self.id(), len = payload.len(), "binary frame");
                    self.session.handle_binary(&payload, emulator)
                }
            };
            self.enqueue(&replies);

            // Stop taking commands from a client that is not reading its replies.
            self.flush();
            if self.outbound.len() > self.max_backlog {
                let fault = ConnectionFault::Backlog {
                    pending: self.outbound.len(),
                    limit: self.max_backlog,
                };
                warn!(id = self.id(), error = %fault, "dropping slow client");
                self.disconnect(fault).await;
                return;
            }
        }

        self.flush();
    }

    // Drains the socket without waiting; end-of-stream and errors are recorded
    // as a fault for the server to act on during its next pass.
    fn fill(&mut self) {
        let Some(stream) = self.stream.as_ref() else {
            return;
        };

        while !self.buffer.is_full() {
            match stream.try_read(self.buffer.spare_mut()) {
                Ok(0) => {
                    self.fault.get_or_insert(ConnectionFault::Closed);
                    break;
                }
                Ok(count) => self.buffer.commit(count),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.fault.get_or_insert(ConnectionFault::Io(err));
                    break;
                }
            }
        }
    }

    // Each reply is encoded whole before it is queued so replies never interleave.
    fn enqueue(&mut self, replies: &[Reply]) {
        let mut encoded = Vec::new();
        for reply in replies {
            encoded.clear();
            if let Err(err) = reply.encode(&mut encoded) {
                warn!(id = self.id(), error = %err, "failed to encode reply");
                continue;
            }
            self.outbound.extend(&encoded);
        }
    }

    // Writes until the queue is empty or the socket would block.
    fn flush(&mut self) {
        let Some(stream) = self.stream.as_ref() else {
            return;
        };

        while !self.outbound.is_empty() {
            let (pending, _) = self.outbound.as_slices();
            match stream.try_write(pending) {
                Ok(0) => {
                    self.fault.get_or_insert(ConnectionFault::Closed);
                    break;
                }
                Ok(count) => {
                    self.outbound.drain(..count);
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.fault.get_or_insert(ConnectionFault::Io(err));
                    break;
                }
            }
        }
    }

    /// Sends what the socket takes right now, then closes it, keeping the
    /// first recorded fault.
    pub async fn disconnect(&mut self, fault: ConnectionFault) {
        self.flush();
        self.fault.get_or_insert(fault);
        self.outbound.clear();
        if let Some(mut stream) = self.stream.take() {
            if let Err(err) = stream.shutdown().await {
                debug!(id = self.id(), error = %err, "socket shutdown failed");
            }
        }
    }
}
