//! Server network layer: TCP connections and the simulation loop
//!
//! The [`Server`] owns the [`Race`] and runs it at a fixed tick rate. Every
//! accepted connection gets a reader task and a writer task:
//! - the reader decodes frames and forwards requests as [`RaceCommand`]s,
//!   which the loop applies at the start of the next tick
//! - the writer drains the shared broadcast channel of encoded frames plus a
//!   private queue for replies meant for that client alone
//!
//! After each tick the loop publishes a [`RaceSnapshot`] on a watch channel,
//! so connection tasks never need access to the race itself.

use crate::client_manager::ClientManager;
use crate::config::ServerConfig;
use crate::events::{RaceEvent, ANNOUNCEMENT_CHATTER};
use crate::race::{Race, RaceError, RaceSnapshot};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::protocol::{
    now_millis, BoatAction, ClientType, CustomizeRequestType, CustomizeStatus, FrameError,
    FrameReader, Message, MessageType, ProtocolError, RaceStage, RegistrationStatus, XmlSubType,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Buffered frame reader over the read half of a client socket
type ClientReader = FrameReader<BufReader<OwnedReadHalf>>;

/// An encoded frame, shared between every writer that sends it
pub type EncodedFrame = Arc<[u8]>;

/// Requests from connection tasks to the simulation loop
#[derive(Debug)]
pub enum RaceCommand {
    Join {
        source_id: u32,
        reply: oneshot::Sender<Result<(), RaceError>>,
    },
    Leave {
        source_id: u32,
    },
    Action {
        source_id: u32,
        action: BoatAction,
    },
    Chatter {
        source_id: u32,
        message_type: u8,
        text: String,
        is_host: bool,
    },
    Customize {
        source_id: u32,
        request: CustomizeRequestType,
        data: Vec<u8>,
        reply: oneshot::Sender<CustomizeStatus>,
    },
}

/// Why a connection was closed by the server
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("transport error: {0}")]
    Frame(#[from] FrameError),
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("unexpected {0:?} message")]
    Unexpected(MessageType),
    #[error("registration refused with {0:?}")]
    Refused(RegistrationStatus),
    #[error("race loop has stopped")]
    RaceClosed,
}

/// Course documents handed to every client after registration
///
/// The server does not interpret these; they are produced by whatever tool
/// generated the course.
#[derive(Debug, Clone, Default)]
pub struct CourseDocuments {
    pub regatta: Option<String>,
    pub race: Option<String>,
    pub boats: Option<String>,
}

impl CourseDocuments {
    pub fn to_messages(&self) -> Vec<Message> {
        [
            (XmlSubType::Regatta, &self.regatta),
            (XmlSubType::Race, &self.race),
            (XmlSubType::Boats, &self.boats),
        ]
        .into_iter()
        .filter_map(|(sub_type, text)| {
            text.as_ref().map(|text| Message::Xml {
                sub_type,
                sequence: 1,
                text: text.clone(),
            })
        })
        .collect()
    }
}

/// Handles shared by every connection task
#[derive(Clone)]
struct ConnectionContext {
    race_id: u32,
    clients: Arc<RwLock<ClientManager>>,
    command_tx: mpsc::UnboundedSender<RaceCommand>,
    broadcast_tx: broadcast::Sender<EncodedFrame>,
    snapshot_rx: watch::Receiver<RaceSnapshot>,
    documents: Arc<CourseDocuments>,
}

impl ConnectionContext {
    fn send_command(&self, command: RaceCommand) -> Result<(), SessionError> {
        self.command_tx
            .send(command)
            .map_err(|_| SessionError::RaceClosed)
    }
}

/// Main server coordinating connections and race simulation
pub struct Server {
    listener: Arc<TcpListener>,
    config: ServerConfig,
    race: Race,
    documents: Arc<CourseDocuments>,
    clients: Arc<RwLock<ClientManager>>,

    // Communication channels
    command_tx: mpsc::UnboundedSender<RaceCommand>,
    command_rx: mpsc::UnboundedReceiver<RaceCommand>,
    broadcast_tx: broadcast::Sender<EncodedFrame>,
    snapshot_tx: watch::Sender<RaceSnapshot>,

    tick: u64,
    location_sequence: u32,
    heartbeat_sequence: u32,
}

impl Server {
    /// Binds the listener and prepares the channels for a single race
    ///
    /// No connections are accepted until [`Server::run`] is called. Binding
    /// to port 0 picks a free port; see [`Server::local_addr`].
    pub async fn new(
        config: ServerConfig,
        race: Race,
        documents: CourseDocuments,
    ) -> Result<Self, BoxError> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (broadcast_tx, _) = broadcast::channel(config.broadcast_capacity.max(1));
        let (snapshot_tx, _) = watch::channel(race.snapshot());

        Ok(Server {
            listener: Arc::new(listener),
            clients: Arc::new(RwLock::new(ClientManager::new(config.max_players))),
            config,
            race,
            documents: Arc::new(documents),
            command_tx,
            command_rx,
            broadcast_tx,
            snapshot_tx,
            tick: 0,
            location_sequence: 0,
            heartbeat_sequence: 0,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The race as of the last completed tick
    pub fn race(&self) -> &Race {
        &self.race
    }

    /// Channel for feeding commands to the race without a connection
    pub fn command_sender(&self) -> mpsc::UnboundedSender<RaceCommand> {
        self.command_tx.clone()
    }

    /// Receiver that always holds the snapshot published after the last tick
    pub fn subscribe_snapshots(&self) -> watch::Receiver<RaceSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Receiver for every encoded frame broadcast to clients from now on
    pub fn subscribe_frames(&self) -> broadcast::Receiver<EncodedFrame> {
        self.broadcast_tx.subscribe()
    }

    fn connection_context(&self) -> ConnectionContext {
        ConnectionContext {
            race_id: self.config.race_id,
            clients: Arc::clone(&self.clients),
            command_tx: self.command_tx.clone(),
            broadcast_tx: self.broadcast_tx.clone(),
            snapshot_rx: self.snapshot_tx.subscribe(),
            documents: Arc::clone(&self.documents),
        }
    }

    /// Spawns task that accepts connections and starts a session for each
    ///
    /// The returned handle is aborted when the race loop ends, so no new
    /// sessions start on a server that is shutting down.
    fn spawn_acceptor(&self) -> JoinHandle<()> {
        let listener = Arc::clone(&self.listener);
        let context = self.connection_context();

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        debug!("Accepted connection from {}", addr);
                        let context = context.clone();
                        tokio::spawn(async move {
                            match handle_connection(stream, addr, context).await {
                                Ok(()) => {}
                                Err(SessionError::Frame(e)) => {
                                    debug!("Connection from {} closed: {}", addr, e)
                                }
                                Err(e) => warn!("Closed connection from {}: {}", addr, e),
                            }
                        });
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        })
    }

    /// Applies queued commands, advances the race one tick and publishes the result
    ///
    /// Commands are applied in arrival order before the race ticks. The
    /// resulting events are turned into messages, followed by the periodic
    /// broadcasts that fall due on this tick:
    /// - boat locations every `location_interval_ticks`
    /// - race status every `status_interval_ticks`, and on any stage change,
    ///   join or leave
    /// - a heartbeat every `heartbeat_interval_ticks`
    ///
    /// The loop calls this with the wall clock; tests drive it directly.
    pub fn step<R: Rng + ?Sized>(&mut self, commands: Vec<RaceCommand>, now_ms: u64, rng: &mut R) {
        let mut events = Vec::new();
        for command in commands {
            self.apply_command(command, now_ms, &mut events);
        }
        events.extend(self.race.tick(now_ms, rng));
        self.tick += 1;

        let snapshot = self.race.snapshot();
        let race_id = self.config.race_id;
        let mut status_changed = false;
        let mut outbound = Vec::new();

        for event in &events {
            match event {
                RaceEvent::StageChanged(stage) => {
                    info!("Race stage is now {:?}", stage);
                    status_changed = true;
                }
                RaceEvent::YachtJoined { .. } | RaceEvent::YachtLeft { .. } => {
                    status_changed = true;
                }
                _ => {}
            }
            outbound.extend(event.to_messages(race_id, now_ms));
        }

        if self.tick % self.config.location_interval_ticks.max(1) == 0 {
            outbound.extend(snapshot.boat_locations(self.location_sequence));
            self.location_sequence = self
                .location_sequence
                .wrapping_add(snapshot.yachts.len() as u32);
        }
        if status_changed || self.tick % self.config.status_interval_ticks.max(1) == 0 {
            outbound.push(snapshot.race_status(race_id));
        }
        if self.tick % self.config.heartbeat_interval_ticks.max(1) == 0 {
            outbound.push(Message::Heartbeat {
                sequence: self.heartbeat_sequence,
            });
            self.heartbeat_sequence = self.heartbeat_sequence.wrapping_add(1);
        }

        for message in &outbound {
            if let Some(frame) = encode(message, now_ms) {
                // No receivers just means nobody is connected
                let _ = self.broadcast_tx.send(frame);
            }
        }
        self.snapshot_tx.send_replace(snapshot);
    }

    fn apply_command(&mut self, command: RaceCommand, now_ms: u64, events: &mut Vec<RaceEvent>) {
        match command {
            RaceCommand::Join { source_id, reply } => match self.race.add_yacht(source_id) {
                Ok(_) => {
                    if reply.send(Ok(())).is_err() {
                        // The connection went away while waiting
                        self.race.remove_yacht(source_id);
                    } else {
                        events.push(RaceEvent::YachtJoined { source_id });
                    }
                }
                Err(e) => {
                    debug!("Yacht {} could not join: {}", source_id, e);
                    let _ = reply.send(Err(e));
                }
            },
            RaceCommand::Leave { source_id } => {
                if self.race.remove_yacht(source_id).is_some() {
                    events.push(RaceEvent::YachtLeft { source_id });
                }
            }
            RaceCommand::Action { source_id, action } => {
                if let Err(e) = self.race.apply_action(source_id, action) {
                    debug!("Ignoring {:?} from client {}: {}", action, source_id, e);
                }
            }
            RaceCommand::Chatter {
                source_id,
                message_type,
                text,
                is_host,
            } => {
                debug!("Chatter from client {}: {}", source_id, text);
                events.extend(self.race.handle_chatter(message_type, &text, is_host, now_ms));
            }
            RaceCommand::Customize {
                source_id,
                request,
                data,
                reply,
            } => {
                let status = match self.race.customize(source_id, request, &data) {
                    Ok(()) => CustomizeStatus::Success,
                    Err(e) => {
                        debug!("Customisation from client {} rejected: {}", source_id, e);
                        CustomizeStatus::Failure
                    }
                };
                let _ = reply.send(status);
            }
        }
    }

    /// Main server loop: accepts connections and ticks the race until it ends
    ///
    /// Returns once the race reaches [`RaceStage::Finished`] and the final
    /// race status has been broadcast, after waiting
    /// [`ServerConfig::finish_grace`] so connection writers can flush it.
    /// Also returns if every command sender has been dropped.
    pub async fn run(&mut self) -> Result<(), BoxError> {
        let acceptor = self.spawn_acceptor();

        let mut tick_interval = interval(self.config.tick_duration());
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut rng = StdRng::from_entropy();
        let mut pending = Vec::new();

        info!(
            "Race '{}' open at {} Hz, waiting for players",
            self.race.name(),
            self.config.tick_rate
        );

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    let commands = std::mem::take(&mut pending);
                    self.step(commands, now_millis(), &mut rng);
                    if self.race.stage() == RaceStage::Finished {
                        info!("Race '{}' finished, closing the server", self.race.name());
                        tokio::time::sleep(self.config.finish_grace).await;
                        break;
                    }
                }
                command = self.command_rx.recv() => match command {
                    Some(command) => pending.push(command),
                    None => break,
                },
            }
        }

        acceptor.abort();
        Ok(())
    }
}

fn encode(message: &Message, now_ms: u64) -> Option<EncodedFrame> {
    match message.encode(now_ms) {
        Ok(bytes) => Some(Arc::from(bytes)),
        Err(e) => {
            error!("Failed to encode {:?}: {}", message.message_type(), e);
            None
        }
    }
}

async fn write_message(writer: &mut OwnedWriteHalf, message: &Message) -> Result<(), SessionError> {
    if let Some(frame) = encode(message, now_millis()) {
        writer.write_all(&frame).await?;
    }
    Ok(())
}

/// Runs one client from registration to disconnect
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    context: ConnectionContext,
) -> Result<(), SessionError> {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Could not disable Nagle for {}: {}", addr, e);
    }
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = FrameReader::buffered(read_half);

    let first = reader.next_frame().await?;
    let client_type = match Message::from_frame(&first) {
        Ok(Message::RegistrationRequest { client_type }) => client_type,
        other => {
            refuse(&mut write_half, RegistrationStatus::FailureGeneral).await?;
            return Err(match other {
                Ok(message) => SessionError::Unexpected(message.message_type()),
                Err(e) => e.into(),
            });
        }
    };

    // Subscribe before joining so no broadcast after registration is missed
    let broadcast_rx = context.broadcast_tx.subscribe();
    let source_id = match register(addr, client_type, &context).await {
        Ok(source_id) => source_id,
        Err(status) => {
            refuse(&mut write_half, status).await?;
            return Err(SessionError::Refused(status));
        }
    };

    let outcome = serve(source_id, client_type, reader, write_half, broadcast_rx, &context).await;

    context.clients.write().await.remove_client(&source_id);
    if client_type == ClientType::Player {
        let _ = context.send_command(RaceCommand::Leave { source_id });
    }
    outcome
}

async fn refuse(writer: &mut OwnedWriteHalf, status: RegistrationStatus) -> Result<(), SessionError> {
    let response = Message::RegistrationResponse {
        source_id: 0,
        status,
    };
    write_message(writer, &response).await?;
    writer.shutdown().await?;
    Ok(())
}

/// Registers the client, adding a yacht to the race for players
///
/// Spectators are always admitted. Players are refused with
/// `FailureGeneral` once the race has left the lobby and with `FailureFull`
/// when the player limit is reached. A player only counts as registered
/// after the race loop has confirmed their yacht; if the join fails the
/// registry entry is rolled back.
async fn register(
    addr: SocketAddr,
    client_type: ClientType,
    context: &ConnectionContext,
) -> Result<u32, RegistrationStatus> {
    if client_type == ClientType::Spectator {
        return context
            .clients
            .write()
            .await
            .add_client(addr, client_type)
            .ok_or(RegistrationStatus::FailureGeneral);
    }

    let stage = context.snapshot_rx.borrow().stage;
    if stage != RaceStage::Lobbying {
        info!("Refusing player {}: race is {:?}", addr, stage);
        return Err(RegistrationStatus::FailureGeneral);
    }

    let source_id = context
        .clients
        .write()
        .await
        .add_client(addr, client_type)
        .ok_or(RegistrationStatus::FailureFull)?;

    let (reply_tx, reply_rx) = oneshot::channel();
    let joined = match context.send_command(RaceCommand::Join {
        source_id,
        reply: reply_tx,
    }) {
        Ok(()) => reply_rx.await.ok(),
        Err(_) => None,
    };

    match joined {
        Some(Ok(())) => Ok(source_id),
        other => {
            context.clients.write().await.remove_client(&source_id);
            Err(match other {
                Some(Err(RaceError::Full(_))) => RegistrationStatus::FailureFull,
                _ => RegistrationStatus::FailureGeneral,
            })
        }
    }
}

/// Sends the handshake, then runs the writer task and the read loop
///
/// The handshake is the registration response, the course documents and
/// the current race status, written before any broadcast so clients always
/// see them first. When the client breaks protocol, a chatter notice is
/// queued ahead of the close.
async fn serve(
    source_id: u32,
    client_type: ClientType,
    mut reader: ClientReader,
    mut write_half: OwnedWriteHalf,
    broadcast_rx: broadcast::Receiver<EncodedFrame>,
    context: &ConnectionContext,
) -> Result<(), SessionError> {
    let status = match client_type {
        ClientType::Player => RegistrationStatus::SuccessPlaying,
        ClientType::Spectator => RegistrationStatus::SuccessSpectating,
    };
    let race_status = context.snapshot_rx.borrow().race_status(context.race_id);

    let mut handshake = vec![Message::RegistrationResponse { source_id, status }];
    handshake.extend(context.documents.to_messages());
    handshake.push(race_status);
    for message in &handshake {
        write_message(&mut write_half, message).await?;
    }

    let (unicast_tx, unicast_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_frames(source_id, write_half, unicast_rx, broadcast_rx));

    let outcome = read_requests(source_id, &mut reader, &unicast_tx, context).await;
    if let Err(e @ (SessionError::Protocol(_) | SessionError::Unexpected(_))) = &outcome {
        let notice = Message::Chatter {
            message_type: ANNOUNCEMENT_CHATTER,
            text: format!("Protocol error: {}. Closing connection.", e),
        };
        if let Some(frame) = encode(&notice, now_millis()) {
            let _ = unicast_tx.send(frame);
        }
    }

    drop(unicast_tx);
    if let Err(e) = writer.await {
        error!("Writer task for client {} failed: {}", source_id, e);
    }
    outcome
}

/// Decodes frames from a registered client until it disconnects or misbehaves
async fn read_requests(
    source_id: u32,
    reader: &mut ClientReader,
    unicast_tx: &mpsc::UnboundedSender<EncodedFrame>,
    context: &ConnectionContext,
) -> Result<(), SessionError> {
    loop {
        let frame = match reader.next_frame().await {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Client {} stopped reading: {}", source_id, e);
                return Ok(());
            }
        };

        match Message::from_frame(&frame)? {
            Message::BoatAction {
                action,
                source_id: claimed,
            } => {
                if claimed != source_id {
                    debug!("Client {} sent an action for {}", source_id, claimed);
                }
                context.send_command(RaceCommand::Action { source_id, action })?;
            }
            Message::Chatter { message_type, text } => {
                let is_host = context.clients.read().await.is_host(source_id);
                context.send_command(RaceCommand::Chatter {
                    source_id,
                    message_type,
                    text,
                    is_host,
                })?;
            }
            Message::CustomizeRequest { request, data, .. } => {
                let (reply_tx, reply_rx) = oneshot::channel();
                context.send_command(RaceCommand::Customize {
                    source_id,
                    request,
                    data: data.clone(),
                    reply: reply_tx,
                })?;
                let status = reply_rx.await.map_err(|_| SessionError::RaceClosed)?;
                let response = Message::CustomizeResponse {
                    request,
                    source_id,
                    status,
                    data,
                };
                if let Some(frame) = encode(&response, now_millis()) {
                    let _ = unicast_tx.send(frame);
                }
            }
            other => return Err(SessionError::Unexpected(other.message_type())),
        }
    }
}

/// Spawned per connection: forwards private replies and broadcasts to the socket
async fn write_frames(
    source_id: u32,
    mut writer: OwnedWriteHalf,
    mut unicast_rx: mpsc::UnboundedReceiver<EncodedFrame>,
    mut broadcast_rx: broadcast::Receiver<EncodedFrame>,
) {
    loop {
        let frame = tokio::select! {
            biased;
            frame = unicast_rx.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
            frame = broadcast_rx.recv() => match frame {
                Ok(frame) => frame,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Client {} lagged behind, skipped {} frames", source_id, skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
        };

        if let Err(e) = writer.write_all(&frame).await {
            debug!("Write to client {} failed: {}", source_id, e);
            break;
        }
    }
    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RaceTuning;
    use shared::course::CourseDefinition;
    use shared::protocol::Frame;

    fn test_race() -> Race {
        Race::new(&CourseDefinition::default_course(), RaceTuning::default()).unwrap()
    }

    async fn test_server() -> Server {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            ..ServerConfig::default()
        };
        Server::new(config, test_race(), CourseDocuments::default())
            .await
            .unwrap()
    }

    fn decode(frame: &[u8]) -> Message {
        let len = frame.len();
        let message_type = frame[2];
        let payload = frame[15..len - 4].to_vec();
        Message::from_frame(&Frame::new(message_type, 0, payload)).unwrap()
    }

    fn drain(rx: &mut broadcast::Receiver<EncodedFrame>) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            messages.push(decode(&frame));
        }
        messages
    }

    #[test]
    fn test_course_documents_skip_missing() {
        let documents = CourseDocuments {
            regatta: Some("<Regatta/>".to_string()),
            race: None,
            boats: Some("<BoatConfig/>".to_string()),
        };

        let messages = documents.to_messages();
        assert_eq!(messages.len(), 2);
        match &messages[1] {
            Message::Xml { sub_type, text, .. } => {
                assert_eq!(*sub_type, XmlSubType::Boats);
                assert_eq!(text, "<BoatConfig/>");
            }
            other => panic!("unexpected message {:?}", other),
        }
        assert!(CourseDocuments::default().to_messages().is_empty());
    }

    #[test]
    fn test_session_error_formatting() {
        let error = SessionError::Unexpected(MessageType::BoatLocation);
        assert_eq!(error.to_string(), "unexpected BoatLocation message");

        let error = SessionError::Refused(RegistrationStatus::FailureFull);
        assert!(error.to_string().contains("FailureFull"));
    }

    #[tokio::test]
    async fn test_join_command_replies_and_broadcasts_status() {
        let mut server = test_server().await;
        let mut frames = server.subscribe_frames();
        let mut rng = StdRng::seed_from_u64(1);

        let (reply_tx, reply_rx) = oneshot::channel();
        server.step(
            vec![RaceCommand::Join {
                source_id: 1,
                reply: reply_tx,
            }],
            1_000,
            &mut rng,
        );

        assert_eq!(reply_rx.await.unwrap(), Ok(()));
        assert_eq!(server.race().yacht_count(), 1);
        assert_eq!(server.subscribe_snapshots().borrow().yachts.len(), 1);

        let messages = drain(&mut frames);
        assert!(messages
            .iter()
            .any(|m| matches!(m, Message::RaceStatus(status) if status.boats.len() == 1)));
    }

    #[tokio::test]
    async fn test_join_after_lobby_is_refused() {
        let mut server = test_server().await;
        let mut rng = StdRng::seed_from_u64(2);
        let (host_tx, _host_rx) = oneshot::channel();
        server.step(
            vec![
                RaceCommand::Join {
                    source_id: 1,
                    reply: host_tx,
                },
                RaceCommand::Chatter {
                    source_id: 1,
                    message_type: 1,
                    text: "/start".to_string(),
                    is_host: true,
                },
            ],
            1_000,
            &mut rng,
        );
        assert_eq!(server.race().stage(), RaceStage::PreRace);

        let (reply_tx, reply_rx) = oneshot::channel();
        server.step(
            vec![RaceCommand::Join {
                source_id: 2,
                reply: reply_tx,
            }],
            1_020,
            &mut rng,
        );
        assert_eq!(reply_rx.await.unwrap(), Err(RaceError::NotInLobby));
        assert_eq!(server.race().yacht_count(), 1);
    }

    #[tokio::test]
    async fn test_leave_removes_yacht() {
        let mut server = test_server().await;
        let mut rng = StdRng::seed_from_u64(3);
        let (reply_tx, _reply_rx) = oneshot::channel();
        server.step(
            vec![RaceCommand::Join {
                source_id: 7,
                reply: reply_tx,
            }],
            0,
            &mut rng,
        );
        server.step(vec![RaceCommand::Leave { source_id: 7 }], 16, &mut rng);

        assert_eq!(server.race().yacht_count(), 0);
        assert!(server.subscribe_snapshots().borrow().yachts.is_empty());
    }

    #[tokio::test]
    async fn test_abandoned_join_is_rolled_back() {
        let mut server = test_server().await;
        let mut rng = StdRng::seed_from_u64(4);
        let (reply_tx, reply_rx) = oneshot::channel();
        drop(reply_rx);

        server.step(
            vec![RaceCommand::Join {
                source_id: 1,
                reply: reply_tx,
            }],
            0,
            &mut rng,
        );
        assert_eq!(server.race().yacht_count(), 0);
    }

    #[tokio::test]
    async fn test_customize_reply_status() {
        let mut server = test_server().await;
        let mut rng = StdRng::seed_from_u64(5);
        let (join_tx, _join_rx) = oneshot::channel();
        let (good_tx, good_rx) = oneshot::channel();
        let (bad_tx, bad_rx) = oneshot::channel();

        server.step(
            vec![
                RaceCommand::Join {
                    source_id: 1,
                    reply: join_tx,
                },
                RaceCommand::Customize {
                    source_id: 1,
                    request: CustomizeRequestType::Name,
                    data: b"Aotearoa".to_vec(),
                    reply: good_tx,
                },
                RaceCommand::Customize {
                    source_id: 1,
                    request: CustomizeRequestType::Color,
                    data: vec![1],
                    reply: bad_tx,
                },
            ],
            0,
            &mut rng,
        );

        assert_eq!(good_rx.await.unwrap(), CustomizeStatus::Success);
        assert_eq!(bad_rx.await.unwrap(), CustomizeStatus::Failure);
        assert_eq!(server.race().yacht(1).unwrap().name, "Aotearoa");
    }

    #[tokio::test]
    async fn test_periodic_broadcasts() {
        let mut server = test_server().await;
        let mut frames = server.subscribe_frames();
        let mut rng = StdRng::seed_from_u64(6);
        let (reply_tx, _reply_rx) = oneshot::channel();
        server.step(
            vec![RaceCommand::Join {
                source_id: 1,
                reply: reply_tx,
            }],
            0,
            &mut rng,
        );
        drain(&mut frames);

        for tick in 1..60 {
            server.step(Vec::new(), tick * 16, &mut rng);
        }
        let messages = drain(&mut frames);

        let locations = messages
            .iter()
            .filter(|m| matches!(m, Message::BoatLocation(_)))
            .count();
        let statuses = messages
            .iter()
            .filter(|m| matches!(m, Message::RaceStatus(_)))
            .count();
        let heartbeats = messages
            .iter()
            .filter(|m| matches!(m, Message::Heartbeat { .. }))
            .count();

        // Ticks 2..=60: locations every 6th, status every 30th, heartbeat every 60th
        assert_eq!(locations, 10);
        assert_eq!(statuses, 2);
        assert_eq!(heartbeats, 1);
    }

    #[tokio::test]
    async fn test_chatter_is_relayed() {
        let mut server = test_server().await;
        let mut frames = server.subscribe_frames();
        let mut rng = StdRng::seed_from_u64(7);

        server.step(
            vec![RaceCommand::Chatter {
                source_id: 3,
                message_type: 2,
                text: "ahoy".to_string(),
                is_host: false,
            }],
            0,
            &mut rng,
        );

        let messages = drain(&mut frames);
        assert!(messages.contains(&Message::Chatter {
            message_type: 2,
            text: "ahoy".to_string()
        }));
    }
}
