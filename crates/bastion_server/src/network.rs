//! Session host event loop and TCP front end.
//!
//! Connections never touch the simulation directly. Socket tasks turn
//! traffic into [`HostEvent`]s on one mpsc channel, and the
//! [`SessionHost`] drains that channel one event at a time between ticks,
//! so requests are applied strictly in arrival order.
//!
//! Frames on the wire are a big-endian `u32` length followed by a bincode
//! payload: a `Request` from clients, a `ServerMessage` from the host.

use std::collections::BTreeMap;
use std::io;
use std::time::Duration;

use bastion_core::components::ConnectionId;
use bastion_core::error::{GameError, Result as CoreResult};
use bastion_core::protocol::{decode_request, encode_message, Request, ServerMessage};
use bastion_core::router::{Role, Router, Transport};
use bastion_core::simulation::Simulation;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use crate::lobby::{Lobby, Refusal};
use crate::{Result, ServerConfig, ServerError};

/// Largest accepted frame payload.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Channel carrying encoded server messages to one peer.
pub type Outbound = mpsc::UnboundedSender<Vec<u8>>;

/// Input to the session host.
#[derive(Debug)]
pub enum HostEvent {
    /// A peer wants a seat.
    Connected {
        /// Where the peer's messages go.
        outbound: Outbound,
        /// Admission result.
        reply: oneshot::Sender<std::result::Result<ConnectionId, Refusal>>,
    },
    /// An encoded request arrived.
    Request {
        /// Sending connection.
        from: ConnectionId,
        /// Encoded `Request`.
        bytes: Vec<u8>,
    },
    /// A peer's connection closed.
    Disconnected {
        /// Closed connection.
        connection: ConnectionId,
    },
    /// Stop the loop.
    Shutdown,
}

struct Peers<'a> {
    peers: &'a mut BTreeMap<ConnectionId, Outbound>,
}

impl Transport for Peers<'_> {
    fn send_request_to_server(&mut self, from: ConnectionId, _request: Request) -> CoreResult<()> {
        Err(GameError::InvalidState(format!(
            "the host does not forward requests (from connection {from})"
        )))
    }

    fn broadcast_to_all(&mut self, message: ServerMessage) -> CoreResult<()> {
        let bytes = encode_message(&message)?;
        for (connection, outbound) in self.peers.iter() {
            if outbound.send(bytes.clone()).is_err() {
                tracing::debug!("Outbound channel of connection {connection} is closed");
            }
        }
        Ok(())
    }

    fn send_to_connection(&mut self, connection: ConnectionId, message: ServerMessage) -> CoreResult<()> {
        let Some(outbound) = self.peers.get(&connection) else {
            return Ok(());
        };
        if outbound.send(encode_message(&message)?).is_err() {
            tracing::debug!("Outbound channel of connection {connection} is closed");
        }
        Ok(())
    }
}

/// Owns one session and applies events to it.
pub struct SessionHost {
    sim: Simulation,
    router: Router,
    lobby: Lobby,
    peers: BTreeMap<ConnectionId, Outbound>,
    tick_interval: Duration,
}

impl SessionHost {
    /// Build a host from config.
    pub fn new(config: &ServerConfig) -> Result<Self> {
        Ok(Self::with_simulation(
            config.build_simulation()?,
            Lobby::new(config.max_players),
            config.tick_interval(),
        ))
    }

    /// Wrap an existing simulation.
    #[must_use]
    pub fn with_simulation(sim: Simulation, lobby: Lobby, tick_interval: Duration) -> Self {
        Self {
            sim,
            router: Router::new(Role::Server),
            lobby,
            peers: BTreeMap::new(),
            tick_interval,
        }
    }

    /// Seat a peer, spawn its player and send it the world.
    pub fn admit(&mut self, outbound: Outbound) -> Result<std::result::Result<ConnectionId, Refusal>> {
        let connection = match self.lobby.admit() {
            Ok(connection) => connection,
            Err(refusal) => {
                tracing::info!("Refused a connection: {refusal}");
                return Ok(Err(refusal));
            }
        };

        self.peers.insert(connection, outbound);
        self.sim.connect(connection)?;
        self.after_change()?;
        Ok(Ok(connection))
    }

    /// Decode and apply one request.
    ///
    /// Undecodable bytes and requests from unknown connections are logged
    /// and dropped.
    pub fn receive(&mut self, from: ConnectionId, bytes: &[u8]) -> Result<()> {
        if !self.peers.contains_key(&from) {
            tracing::warn!("Request from unknown connection {from} dropped");
            return Ok(());
        }
        let request = match decode_request(bytes) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("Undecodable request from connection {from} dropped: {e}");
                return Ok(());
            }
        };

        let admitted = self.router.accept(from, request)?;
        self.sim.handle_request(admitted.from, admitted.request)?;

        // A LeaveGame request ends the player's presence.
        if !self.sim.is_connected(from) {
            self.drop_peer(from);
        }
        self.after_change()
    }

    /// Tear down a closed connection.
    pub fn disconnect(&mut self, connection: ConnectionId) -> Result<()> {
        self.sim.disconnect(connection)?;
        self.drop_peer(connection);
        self.after_change()
    }

    /// Advance the simulation one tick and flush its output.
    pub fn step(&mut self) -> Result<()> {
        self.sim.tick()?;
        self.after_change()
    }

    /// Apply one event. Returns `false` when the loop should stop.
    pub fn handle(&mut self, event: HostEvent) -> Result<bool> {
        match event {
            HostEvent::Connected { outbound, reply } => {
                let admission = self.admit(outbound)?;
                if reply.send(admission).is_err() {
                    // Peer vanished while waiting; undo the seat.
                    if let Ok(connection) = admission {
                        self.disconnect(connection)?;
                    }
                }
                Ok(true)
            }
            HostEvent::Request { from, bytes } => self.receive(from, &bytes).map(|()| true),
            HostEvent::Disconnected { connection } => self.disconnect(connection).map(|()| true),
            HostEvent::Shutdown => Ok(false),
        }
    }

    /// Run until shutdown or until every event sender is gone.
    ///
    /// Returns the final simulation.
    pub async fn run(mut self, mut events: mpsc::Receiver<HostEvent>) -> Result<Simulation> {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!("Session host running at {:?} per tick", self.tick_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.step()?,
                event = events.recv() => match event {
                    Some(event) => {
                        if !self.handle(event)? {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        tracing::info!("Session host stopped at tick {}", self.sim.get_tick());
        Ok(self.sim)
    }

    fn drop_peer(&mut self, connection: ConnectionId) {
        self.peers.remove(&connection);
        self.lobby.release(connection);
    }

    fn after_change(&mut self) -> Result<()> {
        if self.sim.session().is_over() {
            self.lobby.close();
        }
        let mut transport = Peers {
            peers: &mut self.peers,
        };
        for envelope in self.sim.drain_outbox() {
            self.router.deliver(envelope, &mut transport)?;
        }
        Ok(())
    }

    /// The hosted simulation.
    #[must_use]
    pub const fn simulation(&self) -> &Simulation {
        &self.sim
    }

    /// Seat bookkeeping.
    #[must_use]
    pub const fn lobby(&self) -> &Lobby {
        &self.lobby
    }

    /// Number of peers with an outbound channel.
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}

/// Read one frame. `None` on a clean end of stream.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut len = [0u8; 4];
    match reader.read_exact(&mut len).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_be_bytes(len) as usize;
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds {MAX_FRAME_LEN}"),
        ));
    }

    let mut payload = vec![0; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

/// Write one frame.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame too large"))?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await
}

/// Accept TCP peers forever, feeding their traffic to the host.
pub async fn serve(listener: TcpListener, events: mpsc::Sender<HostEvent>) -> Result<()> {
    tracing::info!("Listening on {}", listener.local_addr()?);
    loop {
        let (stream, addr) = listener.accept().await?;
        let events = events.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_peer(stream, events).await {
                tracing::warn!("Peer {addr}: {e}");
            }
        });
    }
}

async fn handle_peer(stream: TcpStream, events: mpsc::Sender<HostEvent>) -> Result<()> {
    let (outbound, mut outgoing) = mpsc::unbounded_channel();
    let (reply, admission) = oneshot::channel();
    events
        .send(HostEvent::Connected { outbound, reply })
        .await
        .map_err(|_| ServerError::HostClosed)?;

    let connection = match admission.await.map_err(|_| ServerError::HostClosed)? {
        Ok(connection) => connection,
        Err(refusal) => {
            tracing::info!("Peer turned away: {refusal}");
            return Ok(());
        }
    };

    let (mut reader, mut writer) = stream.into_split();
    let writer_task = tokio::spawn(async move {
        while let Some(payload) = outgoing.recv().await {
            if write_frame(&mut writer, &payload).await.is_err() {
                break;
            }
        }
    });

    let result = loop {
        match read_frame(&mut reader).await {
            Ok(Some(bytes)) => {
                let event = HostEvent::Request {
                    from: connection,
                    bytes,
                };
                if events.send(event).await.is_err() {
                    break Err(ServerError::HostClosed);
                }
            }
            Ok(None) => break Ok(()),
            Err(e) => break Err(e.into()),
        }
    };

    if events
        .send(HostEvent::Disconnected { connection })
        .await
        .is_err()
    {
        tracing::debug!("Host gone before connection {connection} closed");
    }
    writer_task.abort();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_core::components::EntityKind;
    use bastion_core::protocol::{decode_message, encode_request};

    fn host(max_players: u8) -> SessionHost {
        let config = ServerConfig {
            max_players,
            ..ServerConfig::default()
        };
        SessionHost::new(&config).unwrap()
    }

    fn join(host: &mut SessionHost) -> (ConnectionId, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = host.admit(tx).unwrap().unwrap();
        (connection, rx)
    }

    fn received(rx: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(bytes) = rx.try_recv() {
            messages.push(decode_message(&bytes).unwrap());
        }
        messages
    }

    #[test]
    fn test_admitted_peer_gets_its_player() {
        let mut host = host(2);
        let (connection, mut rx) = join(&mut host);
        let messages = received(&mut rx);

        assert!(matches!(
            messages[0],
            ServerMessage::Spawned {
                kind: EntityKind::Player,
                owner: Some(c),
                ..
            } if c == connection
        ));
        assert!(messages
            .iter()
            .any(|m| matches!(m, ServerMessage::AuthorityGranted { .. })));
    }

    #[test]
    fn test_targeted_messages_stay_private() {
        let mut host = host(2);
        let (_, mut first) = join(&mut host);
        received(&mut first);
        let (second_id, _second) = join(&mut host);

        // The first peer sees the new player but not its authority grants
        // or its snapshot.
        let messages = received(&mut first);
        assert!(messages.iter().any(|m| matches!(
            m,
            ServerMessage::Spawned { owner: Some(c), .. } if *c == second_id
        )));
        assert!(!messages
            .iter()
            .any(|m| matches!(m, ServerMessage::AuthorityGranted { .. })));
    }

    #[test]
    fn test_seat_limit() {
        let mut host = host(1);
        join(&mut host);
        let (tx, _rx) = mpsc::unbounded_channel();
        assert_eq!(host.admit(tx).unwrap(), Err(Refusal::Full { max: 1 }));
    }

    #[test]
    fn test_request_bytes_are_applied() {
        let mut host = host(2);
        let (connection, _rx) = join(&mut host);
        let bytes = encode_request(&Request::SetDisplayName { name: "Ada".into() }).unwrap();

        host.receive(connection, &bytes).unwrap();

        assert_eq!(host.simulation().display_name(connection), Some("Ada"));
    }

    #[test]
    fn test_garbage_is_dropped() {
        let mut host = host(2);
        let (connection, _rx) = join(&mut host);
        host.receive(connection, &[0xff, 0xff, 0xff]).unwrap();
        host.receive(ConnectionId(99), &[]).unwrap();
        assert_eq!(host.simulation().get_tick(), 0);
    }

    #[test]
    fn test_leave_frees_seat() {
        let mut host = host(3);
        let (first, _a) = join(&mut host);
        let (_second, _b) = join(&mut host);
        let (_third, _c) = join(&mut host);

        let bytes = encode_request(&Request::LeaveGame).unwrap();
        host.receive(first, &bytes).unwrap();

        assert_eq!(host.peer_count(), 2);
        assert_eq!(host.lobby().len(), 2);
        assert!(!host.simulation().is_connected(first));
    }

    #[test]
    fn test_game_over_closes_lobby() {
        let mut host = host(4);
        let (first, _a) = join(&mut host);
        let (_second, mut b) = join(&mut host);
        received(&mut b);

        host.disconnect(first).unwrap();

        assert!(host.lobby().is_closed());
        assert!(received(&mut b)
            .iter()
            .any(|m| matches!(m, ServerMessage::GameOver { .. })));
        let (tx, _rx) = mpsc::unbounded_channel();
        assert_eq!(host.admit(tx).unwrap(), Err(Refusal::Closed));
    }

    #[tokio::test]
    async fn test_frame_roundtrip() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        write_frame(&mut client, b"hello").await.unwrap();
        drop(client);

        assert_eq!(read_frame(&mut server).await.unwrap(), Some(b"hello".to_vec()));
        assert_eq!(read_frame(&mut server).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_oversized_frame_is_refused() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let len = u32::try_from(MAX_FRAME_LEN + 1).unwrap();
        client.write_all(&len.to_be_bytes()).await.unwrap();

        let err = read_frame(&mut server).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_run_applies_events_in_order() {
        let config = ServerConfig {
            tick_rate: 1,
            ..ServerConfig::default()
        };
        let host = SessionHost::new(&config).unwrap();
        let (events, rx) = mpsc::channel(16);
        let task = tokio::spawn(host.run(rx));

        let (outbound, _incoming) = mpsc::unbounded_channel();
        let (reply, admission) = oneshot::channel();
        events
            .send(HostEvent::Connected { outbound, reply })
            .await
            .unwrap();
        let connection = admission.await.unwrap().unwrap();

        for name in ["First", "Second"] {
            let bytes = encode_request(&Request::SetDisplayName { name: name.into() }).unwrap();
            events
                .send(HostEvent::Request {
                    from: connection,
                    bytes,
                })
                .await
                .unwrap();
        }
        events.send(HostEvent::Shutdown).await.unwrap();

        let sim = task.await.unwrap().unwrap();
        assert_eq!(sim.display_name(connection), Some("Second"));
    }

    #[tokio::test]
    async fn test_tcp_peer_receives_snapshot() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (events, rx) = mpsc::channel(16);

        let config = ServerConfig {
            tick_rate: 1,
            ..ServerConfig::default()
        };
        let host = tokio::spawn(SessionHost::new(&config).unwrap().run(rx));
        let front = tokio::spawn(serve(listener, events.clone()));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let frame = read_frame(&mut stream).await.unwrap().unwrap();
        assert!(matches!(
            decode_message(&frame).unwrap(),
            ServerMessage::Spawned {
                kind: EntityKind::Player,
                ..
            }
        ));

        events.send(HostEvent::Shutdown).await.unwrap();
        host.await.unwrap().unwrap();
        front.abort();
    }
}
