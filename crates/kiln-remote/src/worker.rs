use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, warn};

use kiln_protocol::{Frame, SourcedMessage};

/// Reconnect backoff bounds.
const BACKOFF_MIN: Duration = Duration::from_secs(2);
const BACKOFF_MAX: Duration = Duration::from_secs(60);

pub(crate) enum Command {
    Request {
        message: SourcedMessage,
        reply: mpsc::Sender<Option<SourcedMessage>>,
    },
    Shutdown,
}

/// Connection owner. Lives on the dedicated client thread; nothing else
/// ever touches the socket.
pub(crate) struct Worker {
    addr: String,
    stream: Option<TcpStream>,
    connected: Arc<AtomicBool>,
    /// Earliest time the next connect attempt is allowed.
    retry_at: Option<Instant>,
    backoff: Duration,
}

impl Worker {
    pub(crate) fn new(addr: String, connected: Arc<AtomicBool>) -> Self {
        Self {
            addr,
            stream: None,
            connected,
            retry_at: None,
            backoff: BACKOFF_MIN,
        }
    }

    pub(crate) fn run(mut self, mailbox: mpsc::Receiver<Command>) {
        // Establish eagerly so is_connected() is meaningful before the
        // first request.
        self.ensure_connected();
        while let Ok(command) = mailbox.recv() {
            match command {
                Command::Shutdown => break,
                Command::Request { message, reply } => {
                    let response = self.roundtrip(&message);
                    // Caller may have given up; a dead reply channel is fine.
                    let _ = reply.send(response);
                }
            }
        }
        self.disconnect();
    }

    /// Send one request and block for its result, skipping any pushed
    /// notifications that arrive in between. `None` covers every failure:
    /// not connected, write failed, stream died mid-reply.
    fn roundtrip(&mut self, message: &SourcedMessage) -> Option<SourcedMessage> {
        if !self.ensure_connected() {
            return None;
        }
        let frame = match message.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "request encode failed");
                return None;
            }
        };

        let stream = self.stream.as_mut()?;
        if let Err(e) = frame.write_to(stream) {
            warn!(error = %e, "request write failed, dropping connection");
            self.drop_connection();
            return None;
        }

        loop {
            let stream = self.stream.as_mut()?;
            let reply = match Frame::read_from(stream).and_then(|f| SourcedMessage::decode(&f)) {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(error = %e, "reply read failed, dropping connection");
                    self.drop_connection();
                    return None;
                }
            };
            match reply {
                SourcedMessage::NotifyCreate { uuid, .. }
                | SourcedMessage::NotifyModify { uuid, .. }
                | SourcedMessage::NotifyDelete { uuid, .. } => {
                    debug!(%uuid, "notification while awaiting reply");
                }
                reply => return Some(reply),
            }
        }
    }

    /// Connect if disconnected and the backoff window has passed.
    fn ensure_connected(&mut self) -> bool {
        if self.stream.is_some() {
            return true;
        }
        if let Some(retry_at) = self.retry_at {
            if Instant::now() < retry_at {
                return false;
            }
        }
        match TcpStream::connect(&self.addr) {
            Ok(stream) => {
                let _ = stream.set_nodelay(true);
                debug!(addr = %self.addr, "sourced service connected");
                self.stream = Some(stream);
                self.connected.store(true, Ordering::Release);
                self.retry_at = None;
                self.backoff = BACKOFF_MIN;
                true
            }
            Err(e) => {
                warn!(addr = %self.addr, error = %e, "connect failed");
                self.schedule_retry();
                false
            }
        }
    }

    fn drop_connection(&mut self) {
        self.disconnect();
        self.schedule_retry();
    }

    fn disconnect(&mut self) {
        self.stream = None;
        self.connected.store(false, Ordering::Release);
    }

    /// Exponential backoff with jitter so a restarted server is not hit
    /// by every client at once.
    fn schedule_retry(&mut self) {
        let jitter = rand::thread_rng().gen_range(Duration::ZERO..self.backoff / 2);
        self.retry_at = Some(Instant::now() + self.backoff + jitter);
        self.backoff = (self.backoff * 2).min(BACKOFF_MAX);
    }
}
