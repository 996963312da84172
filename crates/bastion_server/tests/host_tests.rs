//! Session host tests with real client replicas on the other end of the
//! outbound channels.

use bastion_core::client::ClientSession;
use bastion_core::components::ConnectionId;
use bastion_core::math::Fixed;
use bastion_core::protocol::{decode_message, encode_request, Request};
use bastion_core::router::Role;
use bastion_server::lobby::Lobby;
use bastion_server::network::{SessionHost, MAX_FRAME_LEN};
use bastion_server::ServerConfig;
use bastion_test_utils::fixtures::{beside, first_base, BARRACKS};
use tokio::sync::mpsc;

struct Peer {
    client: ClientSession,
    inbox: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl Peer {
    fn join(host: &mut SessionHost) -> Self {
        let (outbound, inbox) = mpsc::unbounded_channel();
        let connection = host.admit(outbound).unwrap().unwrap();
        let mut peer = Self {
            client: ClientSession::new(Role::Client(connection)).unwrap(),
            inbox,
        };
        peer.sync();
        peer
    }

    fn sync(&mut self) {
        while let Ok(bytes) = self.inbox.try_recv() {
            assert!(bytes.len() <= MAX_FRAME_LEN);
            self.client.on_message(decode_message(&bytes).unwrap());
        }
    }

    fn connection(&self) -> ConnectionId {
        self.client.connection()
    }
}

fn host() -> SessionHost {
    SessionHost::new(&ServerConfig::default()).unwrap()
}

#[test]
fn test_purchase_reaches_both_peers() {
    let mut host = host();
    let mut first = Peer::join(&mut host);
    let mut second = Peer::join(&mut host);
    first.sync();

    let base = first_base(host.simulation(), first.connection());
    let request = Request::PlaceBuilding {
        buyable: BARRACKS,
        base,
        position: beside(host.simulation(), base, 5, 0),
        heading: Fixed::ZERO,
    };
    host.receive(first.connection(), &encode_request(&request).unwrap())
        .unwrap();
    first.sync();
    second.sync();

    let server_gold = host.simulation().gold(first.connection());
    assert_eq!(first.client.gold(), server_gold);
    assert_eq!(
        first.client.entity_count(),
        host.simulation().registry().len()
    );
    assert_eq!(
        second.client.entity_count(),
        host.simulation().registry().len()
    );
}

#[test]
fn test_ticks_keep_replicas_current() {
    let mut host = host();
    let mut first = Peer::join(&mut host);
    let mut second = Peer::join(&mut host);

    for _ in 0..20 {
        host.step().unwrap();
    }
    first.sync();
    second.sync();

    assert_eq!(host.simulation().get_tick(), 20);
    assert_eq!(
        first.client.entity_count(),
        second.client.entity_count()
    );
}

#[test]
fn test_last_player_standing_wins() {
    let mut host = SessionHost::with_simulation(
        ServerConfig::default().build_simulation().unwrap(),
        Lobby::new(2),
        ServerConfig::default().tick_interval(),
    );
    let first = Peer::join(&mut host);
    let mut second = Peer::join(&mut host);

    host.receive(first.connection(), &encode_request(&Request::LeaveGame).unwrap())
        .unwrap();
    second.sync();

    assert_eq!(second.client.winner(), Some("Player 2"));
    assert!(host.lobby().is_closed());
}
