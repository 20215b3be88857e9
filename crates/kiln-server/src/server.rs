use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use kiln_import::ImportMap;
use kiln_protocol::{Frame, ProtocolError, ProtocolResult, SourcedMessage, Status};
use kiln_store::LocalStore;
use kiln_types::{ContentHash, ResourceId, Signature};

use crate::config::ServerConfig;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ServerResult<T> = Result<T, ServerError>;

/// Notification kinds broadcast to connected clients.
#[derive(Clone, Copy, Debug)]
pub enum Notify {
    Create,
    Modify,
    Delete,
}

/// The sourced service.
///
/// One task per connection; request handling itself runs on the
/// blocking pool since the store is synchronous file I/O.
pub struct SourcedServer {
    store: Arc<LocalStore>,
    import_base: Option<PathBuf>,
    notify: broadcast::Sender<SourcedMessage>,
    token: AtomicU64,
}

impl SourcedServer {
    pub fn new(config: &ServerConfig) -> Self {
        let (notify, _) = broadcast::channel(256);
        Self {
            store: Arc::new(LocalStore::new(config.store_path.clone())),
            import_base: config.import_base.clone(),
            notify,
            token: AtomicU64::new(1),
        }
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// Broadcast a change notification to every connected client.
    pub fn notify(&self, kind: Notify, uuid: ResourceId) {
        let token = self.token.fetch_add(1, Ordering::Relaxed);
        let message = match kind {
            Notify::Create => SourcedMessage::NotifyCreate { uuid, token },
            Notify::Modify => SourcedMessage::NotifyModify { uuid, token },
            Notify::Delete => SourcedMessage::NotifyDelete { uuid, token },
        };
        // No receivers is fine; nobody is connected.
        let _ = self.notify.send(message);
    }

    /// Bind and serve until the task is cancelled.
    pub async fn run(self: Arc<Self>, bind: &str) -> ServerResult<()> {
        let listener = TcpListener::bind(bind).await?;
        info!(addr = %listener.local_addr()?, "sourced service listening");
        self.serve(listener).await
    }

    /// Accept loop over an already-bound listener.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> ServerResult<()> {
        loop {
            let (stream, peer) = listener.accept().await?;
            debug!(%peer, "client connected");
            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.serve_connection(stream).await {
                    match e {
                        ProtocolError::Io(ref io)
                            if io.kind() == std::io::ErrorKind::UnexpectedEof =>
                        {
                            debug!(%peer, "client disconnected");
                        }
                        e => warn!(%peer, error = %e, "connection failed"),
                    }
                }
            });
        }
    }

    /// One connection: interleave request handling with pushed
    /// notifications. Any protocol error tears the connection down;
    /// there is no resynchronization.
    ///
    /// Frame reads are not cancel-safe (a cancelled `read_exact` loses
    /// the bytes already consumed), so they run on a task of their own
    /// feeding a channel; the select below only ever cancels channel
    /// receives, which are.
    async fn serve_connection(
        self: Arc<Self>,
        stream: TcpStream,
    ) -> Result<(), ProtocolError> {
        let (mut reader, mut writer) = stream.into_split();
        let mut notifications = self.notify.subscribe();

        let (frame_tx, mut frames) = mpsc::channel::<ProtocolResult<Frame>>(1);
        let read_task = tokio::spawn(async move {
            loop {
                let frame = Frame::read_async(&mut reader).await;
                let failed = frame.is_err();
                if frame_tx.send(frame).await.is_err() || failed {
                    break;
                }
            }
        });

        let result = async {
            loop {
                tokio::select! {
                    frame = frames.recv() => {
                        let Some(frame) = frame else { return Ok(()) };
                        let request = SourcedMessage::decode(&frame?)?;
                        let server = self.clone();
                        let reply = tokio::task::spawn_blocking(move || {
                            server.handle(request)
                        })
                        .await
                        .map_err(|e| {
                            ProtocolError::Io(std::io::Error::other(e.to_string()))
                        })?;
                        reply.encode()?.write_async(&mut writer).await?;
                    }
                    notification = notifications.recv() => {
                        // Lagged receivers just miss notifications; the
                        // client's next hash check catches it up.
                        if let Ok(message) = notification {
                            message.encode()?.write_async(&mut writer).await?;
                        }
                    }
                }
            }
        }
        .await;
        read_task.abort();
        result
    }

    /// Serve one request. Infallible by construction: store errors map
    /// to failed results, unimplemented requests to unsupported results.
    fn handle(&self, request: SourcedMessage) -> SourcedMessage {
        match request {
            SourcedMessage::Lookup { path } => self.handle_lookup(&path),
            SourcedMessage::Read { uuid } => self.handle_read(uuid),
            SourcedMessage::Hash { uuid, platform } => {
                match self.store.signature_hash(uuid, platform) {
                    Ok(Some(hash)) => SourcedMessage::HashResult {
                        status: Status::Ok,
                        hash,
                    },
                    Ok(None) => SourcedMessage::HashResult {
                        status: Status::Failed,
                        hash: ContentHash::null(),
                    },
                    Err(e) => {
                        warn!(%uuid, error = %e, "hash request failed");
                        SourcedMessage::HashResult {
                            status: Status::Failed,
                            hash: ContentHash::null(),
                        }
                    }
                }
            }
            SourcedMessage::Dependencies { uuid, platform } => {
                match self.store.dependencies(uuid, platform) {
                    Ok(deps) => SourcedMessage::DependenciesResult {
                        status: Status::Ok,
                        deps,
                    },
                    Err(e) => {
                        warn!(%uuid, error = %e, "dependencies request failed");
                        SourcedMessage::DependenciesResult {
                            status: Status::Failed,
                            deps: Vec::new(),
                        }
                    }
                }
            }
            SourcedMessage::ReadBlob {
                uuid,
                key,
                platform,
                checksum,
            } => match self.store.read_blob_by_checksum(uuid, key, platform, checksum) {
                Ok(Some(data)) => SourcedMessage::ReadBlobResult {
                    status: Status::Ok,
                    data,
                },
                Ok(None) => SourcedMessage::ReadBlobResult {
                    status: Status::Failed,
                    data: Vec::new(),
                },
                Err(e) => {
                    warn!(%uuid, error = %e, "blob request failed");
                    SourcedMessage::ReadBlobResult {
                        status: Status::Failed,
                        data: Vec::new(),
                    }
                }
            },
            request => match request.unsupported_reply() {
                Some(reply) => reply,
                // A result or notification from a client is a protocol
                // violation; answer it like an unknown request would be.
                None => SourcedMessage::LookupResult {
                    status: Status::Failed,
                    signature: Signature::null(),
                },
            },
        }
    }

    fn handle_lookup(&self, path: &str) -> SourcedMessage {
        let map = ImportMap::new();
        let full = match &self.import_base {
            Some(base) => base.join(path),
            None => PathBuf::from(path),
        };
        match map.lookup_local(&full) {
            Ok(Some(signature)) => SourcedMessage::LookupResult {
                status: Status::Ok,
                signature,
            },
            Ok(None) => SourcedMessage::LookupResult {
                status: Status::Ok,
                signature: Signature::null(),
            },
            Err(e) => {
                warn!(path, error = %e, "lookup failed");
                SourcedMessage::LookupResult {
                    status: Status::Failed,
                    signature: Signature::null(),
                }
            }
        }
    }

    fn handle_read(&self, uuid: ResourceId) -> SourcedMessage {
        match self.store.read_local_source(uuid) {
            Ok(Some(log)) => SourcedMessage::ReadResult {
                status: Status::Ok,
                changes: log.iter().cloned().collect(),
            },
            Ok(None) => SourcedMessage::ReadResult {
                status: Status::Failed,
                changes: Vec::new(),
            },
            Err(e) => {
                warn!(%uuid, error = %e, "read failed");
                SourcedMessage::ReadResult {
                    status: Status::Failed,
                    changes: Vec::new(),
                }
            }
        }
    }
}
