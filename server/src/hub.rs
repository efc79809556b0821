//! Broadcast hub: a single task that owns the player registry.
//!
//! Every join, leave, broadcast and query is a message on one bounded
//! mailbox, so they are applied strictly one at a time in submission order.
//! Fan-out never waits on a session: a full outbound queue loses the frame
//! for that session only (see [`SessionHandle::deliver`]).

use crate::error::ServerError;
use crate::registry::{Registry, SessionHandle};
use log::{debug, info, warn};
use shared::{ChatMessage, Frame, Packet};
use tokio::sync::{mpsc, oneshot};

/// Messages processed by the hub task
#[derive(Debug)]
pub enum HubCommand {
    Join {
        handle: SessionHandle,
        reply: oneshot::Sender<Result<(), ServerError>>,
    },
    Leave {
        name: String,
        session_id: u32,
    },
    Broadcast {
        frame: Frame,
    },
    Online {
        reply: oneshot::Sender<usize>,
    },
    Names {
        reply: oneshot::Sender<Vec<String>>,
    },
}

/// Cloneable handle to the hub task
#[derive(Debug, Clone)]
pub struct Hub {
    tx: mpsc::Sender<HubCommand>,
}

impl Hub {
    /// Spawns the hub task; it runs until every handle has been dropped.
    pub fn spawn(max_players: usize, mailbox_size: usize) -> Self {
        let (tx, rx) = mpsc::channel(mailbox_size);
        let actor = HubActor {
            registry: Registry::new(max_players),
            rx,
        };
        tokio::spawn(actor.run());
        Self { tx }
    }

    async fn submit(&self, command: HubCommand) -> Result<(), ServerError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| ServerError::HubClosed)
    }

    /// Registers a session and announces it to everyone, the newcomer included.
    pub async fn join(&self, handle: SessionHandle) -> Result<(), ServerError> {
        let (reply, response) = oneshot::channel();
        self.submit(HubCommand::Join { handle, reply }).await?;
        response.await.map_err(|_| ServerError::HubClosed)?
    }

    /// Unregisters a session and announces its departure to the rest.
    pub async fn leave(&self, name: impl Into<String>, session_id: u32) -> Result<(), ServerError> {
        self.submit(HubCommand::Leave {
            name: name.into(),
            session_id,
        })
        .await
    }

    pub async fn broadcast(&self, frame: Frame) -> Result<(), ServerError> {
        self.submit(HubCommand::Broadcast { frame }).await
    }

    /// Broadcasts a plain chat line.
    pub async fn chat(&self, text: impl Into<String>) -> Result<(), ServerError> {
        let frame = ChatMessage::new(text).to_frame()?;
        self.broadcast(frame).await
    }

    pub async fn online(&self) -> Result<usize, ServerError> {
        let (reply, response) = oneshot::channel();
        self.submit(HubCommand::Online { reply }).await?;
        response.await.map_err(|_| ServerError::HubClosed)
    }

    pub async fn names(&self) -> Result<Vec<String>, ServerError> {
        let (reply, response) = oneshot::channel();
        self.submit(HubCommand::Names { reply }).await?;
        response.await.map_err(|_| ServerError::HubClosed)
    }
}

struct HubActor {
    registry: Registry,
    rx: mpsc::Receiver<HubCommand>,
}

impl HubActor {
    async fn run(mut self) {
        debug!("Hub started");
        while let Some(command) = self.rx.recv().await {
            self.handle(command);
        }
        info!("Hub stopped with {} players registered", self.registry.len());
    }

    fn handle(&mut self, command: HubCommand) {
        match command {
            HubCommand::Join { handle, reply } => {
                let name = handle.name.clone();
                let result = self.registry.insert(handle).map(|replaced| {
                    if let Some(previous) = replaced {
                        warn!(
                            "Player {} logged in again, session {} no longer receives broadcasts",
                            name, previous.id
                        );
                    }
                });
                let joined = result.is_ok();
                // The joining session may have given up waiting; nothing to undo.
                let _ = reply.send(result);

                if joined {
                    self.announce(format!("{} joined the game", name));
                }
            }
            HubCommand::Leave { name, session_id } => {
                if self.registry.remove(&name, session_id) {
                    self.announce(format!("{} left the game", name));
                }
            }
            HubCommand::Broadcast { frame } => {
                self.registry.fan_out(&frame);
            }
            HubCommand::Online { reply } => {
                let _ = reply.send(self.registry.len());
            }
            HubCommand::Names { reply } => {
                let _ = reply.send(self.registry.names());
            }
        }
    }

    fn announce(&self, text: String) {
        info!("{}", text);
        match ChatMessage::new(text).to_frame() {
            Ok(frame) => {
                self.registry.fan_out(&frame);
            }
            Err(e) => warn!("Failed to encode announcement: {}", e),
        }
    }
}
