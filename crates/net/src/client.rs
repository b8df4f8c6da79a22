//! TCP client for connecting to a room server
//!
//! A thin handle for tools and tests: establish a session with the first
//! frame, then send commands and drain server events.

use std::net::SocketAddr;

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use lantern_core::{Command, RejectionKind, RoomSnapshot};

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::protocol::Message;

/// Event received from the server
#[derive(Debug, Clone)]
pub enum ServerEvent {
    Snapshot(Box<RoomSnapshot>),
    Rejected { kind: RejectionKind, detail: String },
    Pong,
    ServerShutdown,
    Disconnected,
}

/// The identity the server issued for this connection
#[derive(Debug, Clone, Copy)]
pub struct SessionInfo {
    pub room_id: Uuid,
    pub player_id: Uuid,
    pub seat: u8,
    pub is_host: bool,
}

/// Client handle for one room session
#[derive(Debug)]
pub struct Client {
    session: SessionInfo,
    cmd_tx: mpsc::Sender<Message>,
    event_rx: mpsc::Receiver<ServerEvent>,
}

impl Client {
    /// Create a room and connect as its storyteller.
    pub async fn create_room(
        addr: SocketAddr,
        script_id: Option<String>,
        host_name: String,
    ) -> Result<Self> {
        Self::connect_with(
            addr,
            Message::CreateRoom {
                script_id,
                host_name,
            },
        )
        .await
    }

    /// Join an existing room by code.
    pub async fn join_room(addr: SocketAddr, join_code: String, name: String) -> Result<Self> {
        Self::connect_with(addr, Message::JoinRoom { join_code, name }).await
    }

    /// Reconnect with a previously issued identity.
    pub async fn resume(addr: SocketAddr, room_id: Uuid, player_id: Uuid) -> Result<Self> {
        Self::connect_with(addr, Message::Resume { room_id, player_id }).await
    }

    async fn connect_with(addr: SocketAddr, hello: Message) -> Result<Self> {
        info!(addr = %addr, "Connecting to room server");
        let stream = TcpStream::connect(addr).await?;
        let (mut reader, mut writer) = tokio::io::split(stream);

        write_frame(&mut writer, &hello).await?;

        // The server answers with welcome or a rejection.
        let session = match read_frame(&mut reader).await? {
            Message::Welcome {
                room_id,
                player_id,
                seat,
                is_host,
            } => SessionInfo {
                room_id,
                player_id,
                seat,
                is_host,
            },
            Message::Rejected { kind, detail } => {
                return Err(Error::Rejected { kind, detail });
            }
            other => {
                return Err(Error::Protocol(format!(
                    "expected welcome, got {other:?}"
                )));
            }
        };

        let (event_tx, event_rx) = mpsc::channel(64);
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<Message>(64);

        // Reader task: frames in, events out.
        tokio::spawn(async move {
            loop {
                match read_frame(&mut reader).await {
                    Ok(Message::Snapshot { snapshot }) => {
                        if event_tx.send(ServerEvent::Snapshot(snapshot)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Rejected { kind, detail }) => {
                        if event_tx
                            .send(ServerEvent::Rejected { kind, detail })
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Ok(Message::Pong) => {
                        if event_tx.send(ServerEvent::Pong).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::ServerShutdown) => {
                        let _ = event_tx.send(ServerEvent::ServerShutdown).await;
                        break;
                    }
                    Ok(other) => {
                        debug!(?other, "Ignoring unexpected server message");
                    }
                    Err(e) => {
                        eprintln!("DIAG client reader err: {e:?}");
                        let _ = event_tx.send(ServerEvent::Disconnected).await;
                        break;
                    }
                }
            }
        });

        // Writer task: queued messages onto the wire.
        tokio::spawn(async move {
            while let Some(msg) = cmd_rx.recv().await {
                if let Err(e) = write_frame(&mut writer, &msg).await {
                    debug!(error = %e, "Client write failed");
                    break;
                }
            }
        });

        Ok(Self {
            session,
            cmd_tx,
            event_rx,
        })
    }

    pub fn session(&self) -> SessionInfo {
        self.session
    }

    /// Queue a room command.
    pub async fn send_command(&self, command: Command) -> Result<()> {
        self.cmd_tx
            .send(Message::Command { command })
            .await
            .map_err(|_| Error::NotConnected)
    }

    /// Ask for a fresh full snapshot.
    pub async fn request_snapshot(&self) -> Result<()> {
        self.cmd_tx
            .send(Message::RequestSnapshot)
            .await
            .map_err(|_| Error::NotConnected)
    }

    pub async fn ping(&self) -> Result<()> {
        self.cmd_tx
            .send(Message::Ping)
            .await
            .map_err(|_| Error::NotConnected)
    }

    /// Next server event; `None` once both tasks are gone.
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        self.event_rx.recv().await
    }

    /// Wait for the next snapshot, skipping other events.
    pub async fn next_snapshot(&mut self) -> Option<Box<RoomSnapshot>> {
        while let Some(event) = self.next_event().await {
            if let ServerEvent::Snapshot(snapshot) = event {
                return Some(snapshot);
            }
        }
        None
    }
}
