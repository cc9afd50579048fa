//! Streaming-transport sessions.
//!
//! A session starts `Pending`: messages posted before its event stream is attached are queued in
//! arrival order. `attach` swaps the queue for a per-session worker under the session lock, so a
//! concurrent `deliver` either lands in the queue before the swap or in the worker after it.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::Duration;

use bifrost_lsp::Provider;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::SessionError;
use crate::protocol::ProtocolServer;

/// Outbound event for an attached session.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Message(Value),
    Heartbeat,
}

/// Outcome of [`SessionManager::deliver`].
#[derive(Debug, PartialEq)]
pub enum Delivery {
    /// The session has no stream yet; the message will run once it attaches.
    Queued,
    /// The message ran; `None` for notifications.
    Response(Option<Value>),
}

struct Inbound {
    message: Value,
    reply: Option<oneshot::Sender<Option<Value>>>,
}

enum ChannelState {
    Pending(VecDeque<Value>),
    Attached(mpsc::UnboundedSender<Inbound>),
}

struct Session {
    state: Mutex<ChannelState>,
    cancel: CancellationToken,
}

pub struct SessionManager<P> {
    server: RwLock<Option<Arc<ProtocolServer<P>>>>,
    sessions: StdMutex<HashMap<String, Arc<Session>>>,
    heartbeat_interval: Duration,
}

fn lock<T>(mutex: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<P: Provider> SessionManager<P> {
    pub fn new(heartbeat_interval: Duration) -> Self {
        Self {
            server: RwLock::new(None),
            sessions: StdMutex::new(HashMap::new()),
            heartbeat_interval,
        }
    }

    /// Makes `server` the handler for sessions attached from now on.
    pub fn install(&self, server: Arc<ProtocolServer<P>>) {
        let mut slot = self.server.write().unwrap_or_else(|p| p.into_inner());
        *slot = Some(server);
    }

    /// Removes the handler and closes every session.
    pub fn uninstall(&self) {
        {
            let mut slot = self.server.write().unwrap_or_else(|p| p.into_inner());
            *slot = None;
        }
        self.close_all();
    }

    pub fn server(&self) -> Option<Arc<ProtocolServer<P>>> {
        self.server
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        lock(&self.sessions).contains_key(id)
    }

    pub fn open_session(&self) -> Result<String, SessionError> {
        if self.server().is_none() {
            return Err(SessionError::NotInitialized);
        }
        let id = Uuid::new_v4().to_string();
        let session = Arc::new(Session {
            state: Mutex::new(ChannelState::Pending(VecDeque::new())),
            cancel: CancellationToken::new(),
        });
        lock(&self.sessions).insert(id.clone(), session);
        debug!("session {id} opened");
        Ok(id)
    }

    fn get(&self, id: &str) -> Result<Arc<Session>, SessionError> {
        lock(&self.sessions)
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    /// Binds `outbound` to the session, replays queued messages in order and starts the heartbeat.
    pub async fn attach(
        self: &Arc<Self>,
        id: &str,
        outbound: mpsc::Sender<Frame>,
    ) -> Result<(), SessionError> {
        let server = self.server().ok_or(SessionError::NotInitialized)?;
        let session = self.get(id)?;
        let (tx, rx) = mpsc::unbounded_channel();

        {
            let mut state = session.state.lock().await;
            let queued = match &mut *state {
                ChannelState::Pending(queue) => std::mem::take(queue),
                ChannelState::Attached(_) => {
                    return Err(SessionError::Transport(format!("session {id} already attached")));
                }
            };
            if !queued.is_empty() {
                debug!("session {id}: replaying {} queued message(s)", queued.len());
            }
            for message in queued {
                // The receiver is alive: it is only moved into the worker below.
                let _ = tx.send(Inbound {
                    message,
                    reply: None,
                });
            }
            *state = ChannelState::Attached(tx);
        }

        tokio::spawn(run_worker(
            id.to_string(),
            server,
            rx,
            outbound.clone(),
            session.cancel.clone(),
        ));
        self.spawn_heartbeat(id.to_string(), outbound, session.cancel.clone());
        info!("session {id} attached");
        Ok(())
    }

    /// Routes `message` to the session: queued while pending, executed once attached.
    pub async fn deliver(&self, id: &str, message: Value) -> Result<Delivery, SessionError> {
        let session = self.get(id)?;
        let sender = {
            let mut state = session.state.lock().await;
            match &mut *state {
                ChannelState::Pending(queue) => {
                    queue.push_back(message);
                    return Ok(Delivery::Queued);
                }
                ChannelState::Attached(tx) => tx.clone(),
            }
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        sender
            .send(Inbound {
                message,
                reply: Some(reply_tx),
            })
            .map_err(|_| SessionError::Transport(format!("session {id} is closed")))?;
        reply_rx
            .await
            .map(Delivery::Response)
            .map_err(|_| SessionError::Transport(format!("session {id} closed before replying")))
    }

    /// Drops the session and cancels its in-flight work. Unknown ids are ignored.
    pub fn close(&self, id: &str) {
        let removed = lock(&self.sessions).remove(id);
        if let Some(session) = removed {
            session.cancel.cancel();
            info!("session {id} closed");
        }
    }

    pub fn close_all(&self) {
        let drained: Vec<(String, Arc<Session>)> = lock(&self.sessions).drain().collect();
        for (id, session) in drained {
            session.cancel.cancel();
            debug!("session {id} closed");
        }
    }

    fn spawn_heartbeat(self: &Arc<Self>, id: String, outbound: mpsc::Sender<Frame>, cancel: CancellationToken) {
        let manager = Arc::downgrade(self);
        let period = self.heartbeat_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if outbound.send(Frame::Heartbeat).await.is_err() {
                            warn!("session {id}: heartbeat failed, closing");
                            if let Some(manager) = manager.upgrade() {
                                manager.close(&id);
                            }
                            break;
                        }
                    }
                }
            }
        });
    }
}

async fn run_worker<P: Provider>(
    id: String,
    server: Arc<ProtocolServer<P>>,
    mut inbound: mpsc::UnboundedReceiver<Inbound>,
    outbound: mpsc::Sender<Frame>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = inbound.recv() => next,
        };
        let Some(Inbound { message, reply }) = next else {
            break;
        };

        let response = tokio::select! {
            _ = cancel.cancelled() => break,
            response = server.handle(message) => response,
        };

        if let Some(response) = response.as_ref()
            && outbound.send(Frame::Message(response.clone())).await.is_err()
        {
            debug!("session {id}: event stream gone, response not streamed");
        }
        if let Some(reply) = reply {
            let _ = reply.send(response);
        }
    }
    debug!("session {id}: worker stopped");
}
