use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;

use tracing::debug;

use kiln_platform::Platform;
use kiln_protocol::{SourcedMessage, Status};
use kiln_source::{ChangeLog, ChangeOp};
use kiln_store::RemoteSource;
use kiln_types::{ContentHash, KeyHash, ResourceId, Signature};

use crate::worker::{Command, Worker};

/// Handle to a remote sourced service.
///
/// Cheap to share behind an [`Arc`]; all callers funnel into the one
/// worker thread, which serializes requests onto the single connection.
/// Every accessor is best-effort: `None` when disconnected, the request
/// failed, or the server answered with a failure status.
pub struct RemoteSourcedClient {
    mailbox: mpsc::Sender<Command>,
    connected: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RemoteSourcedClient {
    /// Start the worker thread for a service at `addr`. Connection is
    /// attempted immediately but failure is not an error; the worker
    /// keeps retrying with backoff.
    pub fn connect(addr: impl Into<String>) -> Self {
        let addr = addr.into();
        let connected = Arc::new(AtomicBool::new(false));
        let (sender, receiver) = mpsc::channel();
        let worker = Worker::new(addr.clone(), connected.clone());
        let handle = std::thread::Builder::new()
            .name(format!("kiln-sourced-{addr}"))
            .spawn(move || worker.run(receiver))
            .expect("spawn sourced client thread");
        Self {
            mailbox: sender,
            connected,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Send one request and block for its reply.
    pub fn request(&self, message: SourcedMessage) -> Option<SourcedMessage> {
        let (reply, response) = mpsc::channel();
        self.mailbox
            .send(Command::Request { message, reply })
            .ok()?;
        response.recv().ok()?
    }
}

impl Drop for RemoteSourcedClient {
    fn drop(&mut self) {
        let _ = self.mailbox.send(Command::Shutdown);
        if let Ok(mut worker) = self.worker.lock() {
            if let Some(handle) = worker.take() {
                let _ = handle.join();
            }
        }
    }
}

impl RemoteSource for RemoteSourcedClient {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn lookup(&self, path: &str) -> Option<Signature> {
        match self.request(SourcedMessage::Lookup { path: path.into() })? {
            SourcedMessage::LookupResult { status, signature }
                if status.is_ok() && !signature.is_null() =>
            {
                Some(signature)
            }
            _ => None,
        }
    }

    fn read(&self, uuid: ResourceId) -> Option<ChangeLog> {
        match self.request(SourcedMessage::Read { uuid })? {
            SourcedMessage::ReadResult {
                status: Status::Ok,
                changes,
            } => {
                let mut log = ChangeLog::new();
                for change in changes {
                    match change.op {
                        ChangeOp::Value(value) => {
                            log.set(change.timestamp, change.key, change.platform, &value)
                        }
                        ChangeOp::Blob(blob) => {
                            log.set_blob(change.timestamp, change.key, change.platform, blob)
                        }
                        ChangeOp::Unset => {
                            log.unset(change.timestamp, change.key, change.platform)
                        }
                    }
                }
                debug!(%uuid, changes = log.len(), "change log fetched from remote");
                Some(log)
            }
            _ => None,
        }
    }

    fn hash(&self, uuid: ResourceId, platform: Platform) -> Option<ContentHash> {
        match self.request(SourcedMessage::Hash { uuid, platform })? {
            SourcedMessage::HashResult {
                status: Status::Ok,
                hash,
            } if !hash.is_null() => Some(hash),
            _ => None,
        }
    }

    fn dependencies(&self, uuid: ResourceId, platform: Platform) -> Option<Vec<ResourceId>> {
        match self.request(SourcedMessage::Dependencies { uuid, platform })? {
            SourcedMessage::DependenciesResult {
                status: Status::Ok,
                deps,
            } => Some(deps.into_iter().map(|d| d.uuid).collect()),
            _ => None,
        }
    }

    fn read_blob(
        &self,
        uuid: ResourceId,
        key: KeyHash,
        platform: Platform,
        checksum: u64,
    ) -> Option<Vec<u8>> {
        match self.request(SourcedMessage::ReadBlob {
            uuid,
            key,
            platform,
            checksum,
        })? {
            SourcedMessage::ReadBlobResult {
                status: Status::Ok,
                data,
            } => Some(data),
            _ => None,
        }
    }
}
