//! Integration tests for the race server
//!
//! These tests validate cross-component interactions and real network behavior.

use rand::rngs::StdRng;
use rand::SeedableRng;
use server::config::{RaceTuning, ServerConfig};
use server::events::RaceEvent;
use server::network::{BoxError, CourseDocuments, Server};
use server::race::Race;
use shared::course::{CompoundMark, CourseDefinition, Mark, RoundingSide};
use shared::geo::{self, GeoPoint};
use shared::protocol::{
    now_millis, BoatAction, BoatStatus, ClientType, FrameReader, Message, RaceStage,
    RegistrationStatus, XmlSubType,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;

const METRES_PER_DEGREE: f64 = 111_319.5;

/// Point `north` and `east` metres from the origin near the equator
fn p(north: f64, east: f64) -> GeoPoint {
    GeoPoint::new(north / METRES_PER_DEGREE, east / METRES_PER_DEGREE)
}

/// Start line, one port rounding mark and a finish line to the north east
fn test_course(max_players: usize) -> CourseDefinition {
    CourseDefinition {
        name: "Integration Course".to_string(),
        compound_marks: vec![
            CompoundMark::new(
                1,
                "Start",
                vec![
                    Mark::new(11, "Start West", p(0.0, -100.0)),
                    Mark::new(12, "Start East", p(0.0, 100.0)),
                ],
            ),
            CompoundMark::new(
                2,
                "Windward",
                vec![Mark::new(21, "Windward", p(400.0, 0.0)).with_rounding(RoundingSide::Port)],
            ),
            CompoundMark::new(
                3,
                "Finish",
                vec![
                    Mark::new(31, "Finish South", p(350.0, 300.0)),
                    Mark::new(32, "Finish North", p(550.0, 300.0)),
                ],
            ),
        ],
        boundary: vec![
            p(-200.0, -200.0),
            p(700.0, -200.0),
            p(700.0, 600.0),
            p(-200.0, 600.0),
        ],
        max_players,
        leg_repeats: 1,
        tokens_enabled: false,
    }
}

/// NETWORK PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// Tests framed messages across a real TCP socket, including a corrupted frame
    #[tokio::test]
    async fn frames_survive_tcp_and_bad_checksums_are_dropped() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let messages = vec![
            Message::RegistrationRequest {
                client_type: ClientType::Player,
            },
            Message::Chatter {
                message_type: 1,
                text: "ready to race".to_string(),
            },
            Message::BoatAction {
                action: BoatAction::TackGybe,
                source_id: 3,
            },
        ];

        let to_send = messages.clone();
        let sender = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            let mut corrupted = Message::Heartbeat { sequence: 9 }
                .encode(now_millis())
                .unwrap();
            let last = corrupted.len() - 1;
            corrupted[last] ^= 0x01;

            stream.write_all(&to_send[0].encode(now_millis()).unwrap()).await.unwrap();
            stream.write_all(&corrupted).await.unwrap();
            // Junk between frames is skipped while resynchronising
            stream.write_all(&[0x00, 0x13, 0x37]).await.unwrap();
            for message in &to_send[1..] {
                stream.write_all(&message.encode(now_millis()).unwrap()).await.unwrap();
            }
            stream.shutdown().await.unwrap();
        });

        let (stream, _) = listener.accept().await.unwrap();
        let mut reader = FrameReader::buffered(stream);
        let mut received = Vec::new();
        while let Ok(frame) = reader.next_frame().await {
            received.push(Message::from_frame(&frame).unwrap());
        }

        sender.await.unwrap();
        assert_eq!(received, messages);
    }
}

/// Helpers for talking to a running server
struct TestClient {
    reader: FrameReader<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, writer) = stream.into_split();
        Self {
            reader: FrameReader::buffered(read_half),
            writer,
        }
    }

    async fn send(&mut self, message: &Message) {
        let bytes = message.encode(now_millis()).unwrap();
        self.writer.write_all(&bytes).await.unwrap();
    }

    async fn register(addr: SocketAddr, client_type: ClientType) -> (Self, u32, RegistrationStatus) {
        let mut client = Self::connect(addr).await;
        client.send(&Message::RegistrationRequest { client_type }).await;
        match client.next().await {
            Some(Message::RegistrationResponse { source_id, status }) => (client, source_id, status),
            other => panic!("expected a registration response, got {:?}", other),
        }
    }

    /// Next message, or None on disconnect or after two quiet seconds
    async fn next(&mut self) -> Option<Message> {
        match timeout(Duration::from_secs(2), self.reader.next_frame()).await {
            Ok(Ok(frame)) => Some(Message::from_frame(&frame).unwrap()),
            _ => None,
        }
    }

    async fn wait_for<F>(&mut self, mut predicate: F) -> Message
    where
        F: FnMut(&Message) -> bool,
    {
        for _ in 0..2_000 {
            match self.next().await {
                Some(message) if predicate(&message) => return message,
                Some(_) => continue,
                None => break,
            }
        }
        panic!("expected message never arrived");
    }

    /// True when the server closes the connection within a few seconds
    async fn closed_by_server(&mut self) -> bool {
        for _ in 0..2_000 {
            match timeout(Duration::from_secs(2), self.reader.next_frame()).await {
                Ok(Ok(_)) => continue,
                Ok(Err(_)) => return true,
                Err(_) => return false,
            }
        }
        false
    }
}

async fn start_server(max_players: usize) -> SocketAddr {
    spawn_server(max_players).await.0
}

async fn spawn_server(max_players: usize) -> (SocketAddr, JoinHandle<Result<(), BoxError>>) {
    let config = ServerConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        max_players,
        ..ServerConfig::default()
    };
    let race = Race::new(&test_course(max_players), RaceTuning::default()).unwrap();
    let documents = CourseDocuments {
        race: Some("<Race><RaceID>1</RaceID></Race>".to_string()),
        ..CourseDocuments::default()
    };

    let mut server = Server::new(config, race, documents).await.unwrap();
    let addr = server.local_addr().unwrap();
    let handle = tokio::spawn(async move { server.run().await });
    (addr, handle)
}

/// SERVER HANDSHAKE TESTS
mod handshake_tests {
    use super::*;

    #[tokio::test]
    async fn player_and_spectator_registration() {
        let addr = start_server(4).await;

        let (mut player, player_id, status) = TestClient::register(addr, ClientType::Player).await;
        assert_eq!(status, RegistrationStatus::SuccessPlaying);
        assert_eq!(player_id, 1);

        match player.next().await {
            Some(Message::Xml { sub_type, text, .. }) => {
                assert_eq!(sub_type, XmlSubType::Race);
                assert!(text.contains("RaceID"));
            }
            other => panic!("expected the race document, got {:?}", other),
        }
        match player.next().await {
            Some(Message::RaceStatus(status)) => assert_eq!(status.stage, RaceStage::Lobbying),
            other => panic!("expected a race status, got {:?}", other),
        }

        let (_spectator, spectator_id, status) =
            TestClient::register(addr, ClientType::Spectator).await;
        assert_eq!(status, RegistrationStatus::SuccessSpectating);
        assert_eq!(spectator_id, 2);

        // The player's yacht shows up in location broadcasts
        player
            .wait_for(|m| matches!(m, Message::BoatLocation(l) if l.source_id == player_id))
            .await;
    }

    #[tokio::test]
    async fn first_frame_must_be_registration() {
        let addr = start_server(4).await;
        let mut client = TestClient::connect(addr).await;

        client
            .send(&Message::Chatter {
                message_type: 1,
                text: "hello?".to_string(),
            })
            .await;

        assert_eq!(
            client.next().await,
            Some(Message::RegistrationResponse {
                source_id: 0,
                status: RegistrationStatus::FailureGeneral
            })
        );
        assert!(client.closed_by_server().await);
    }

    #[tokio::test]
    async fn full_race_refuses_players_but_not_spectators() {
        let addr = start_server(1).await;

        let (_first, _, status) = TestClient::register(addr, ClientType::Player).await;
        assert_eq!(status, RegistrationStatus::SuccessPlaying);

        let (_second, _, status) = TestClient::register(addr, ClientType::Player).await;
        assert_eq!(status, RegistrationStatus::FailureFull);

        let (_spectator, _, status) = TestClient::register(addr, ClientType::Spectator).await;
        assert_eq!(status, RegistrationStatus::SuccessSpectating);
    }

    #[tokio::test]
    async fn host_start_closes_the_lobby() {
        let addr = start_server(4).await;
        let (mut host, _, _) = TestClient::register(addr, ClientType::Player).await;

        host.send(&Message::Chatter {
            message_type: 1,
            text: "Host: /start".to_string(),
        })
        .await;
        host.wait_for(|m| matches!(m, Message::RaceStatus(s) if s.stage == RaceStage::PreRace))
            .await;

        let (_late, _, status) = TestClient::register(addr, ClientType::Player).await;
        assert_eq!(status, RegistrationStatus::FailureGeneral);
    }

    #[tokio::test]
    async fn non_host_commands_are_relayed() {
        let addr = start_server(4).await;
        let (_host, _, _) = TestClient::register(addr, ClientType::Player).await;
        let (mut guest, _, _) = TestClient::register(addr, ClientType::Player).await;

        guest
            .send(&Message::Chatter {
                message_type: 1,
                text: "/finish".to_string(),
            })
            .await;

        guest
            .wait_for(|m| matches!(m, Message::Chatter { text, .. } if text == "/finish"))
            .await;
        match guest.wait_for(|m| matches!(m, Message::RaceStatus(_))).await {
            Message::RaceStatus(status) => assert_eq!(status.stage, RaceStage::Lobbying),
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn server_stops_once_the_race_is_finished() {
        let (addr, handle) = spawn_server(4).await;
        let (mut host, _, _) = TestClient::register(addr, ClientType::Player).await;

        host.send(&Message::Chatter {
            message_type: 1,
            text: "Host: /finish".to_string(),
        })
        .await;
        host.wait_for(|m| matches!(m, Message::RaceStatus(s) if s.stage == RaceStage::Finished))
            .await;

        let result = timeout(Duration::from_secs(3), handle)
            .await
            .expect("server kept running after the race finished")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn repeated_registration_closes_the_connection() {
        let addr = start_server(4).await;
        let (mut client, _, _) = TestClient::register(addr, ClientType::Player).await;

        client
            .send(&Message::RegistrationRequest {
                client_type: ClientType::Player,
            })
            .await;

        client
            .wait_for(|m| matches!(m, Message::Chatter { text, .. } if text.starts_with("Protocol error")))
            .await;
        assert!(client.closed_by_server().await);
    }
}

/// RACE SIMULATION TESTS
mod race_tests {
    use super::*;

    const TICK_MS: u64 = 16;
    const MAX_TICKS: u64 = 20_000;

    /// Points a yacht at its next waypoint, dropping waypoints once reached
    fn steer(race: &mut Race, source_id: u32, waypoints: &mut Vec<GeoPoint>) {
        let Some(yacht) = race.yacht_mut(source_id) else {
            return;
        };
        while let Some(target) = waypoints.first().copied() {
            if geo::distance(yacht.location, target) < 10.0 && waypoints.len() > 1 {
                waypoints.remove(0);
            } else {
                yacht.heading = geo::bearing(yacht.location, target);
                break;
            }
        }
    }

    fn roundings(events: &[RaceEvent], source_id: u32) -> Vec<u8> {
        events
            .iter()
            .filter_map(|event| match event {
                RaceEvent::MarkRounded(progress) if progress.source_id == source_id => {
                    Some(progress.mark_id)
                }
                _ => None,
            })
            .collect()
    }

    /// Two yachts, three legs: the stage finishes only once both are home
    #[test]
    fn two_yachts_sail_the_course() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut race = Race::new(&test_course(2), RaceTuning::default()).unwrap();
        race.add_yacht(1).unwrap();
        race.add_yacht(2).unwrap();

        race.schedule_start(0);
        let mut now = race.start_time_ms();
        race.tick(now, &mut rng);
        assert_eq!(race.stage(), RaceStage::Racing);

        race.set_speed_multiplier(4.0);
        race.apply_action(1, BoatAction::SailsIn).unwrap();

        let mut waypoints = vec![p(440.0, -20.0), p(440.0, 400.0)];
        let mut rounded = Vec::new();
        let mut ticks = 0;
        while race.yacht(1).map(|y| y.status) != Some(BoatStatus::Finished) {
            assert!(ticks < MAX_TICKS, "yacht 1 never finished");
            steer(&mut race, 1, &mut waypoints);
            now += TICK_MS;
            rounded.extend(roundings(&race.tick(now, &mut rng), 1));
            ticks += 1;
        }

        assert_eq!(rounded, vec![1, 2, 3]);
        assert_eq!(race.yacht(2).map(|y| y.status), Some(BoatStatus::Racing));
        assert_eq!(race.stage(), RaceStage::Racing);

        race.apply_action(1, BoatAction::SailsOut).unwrap();
        race.apply_action(2, BoatAction::SailsIn).unwrap();

        let mut waypoints = vec![p(300.0, -40.0), p(480.0, -40.0), p(480.0, 400.0)];
        let mut rounded = Vec::new();
        let mut ticks = 0;
        while race.stage() != RaceStage::Finished {
            assert!(ticks < MAX_TICKS, "race never finished");
            steer(&mut race, 2, &mut waypoints);
            now += TICK_MS;
            rounded.extend(roundings(&race.tick(now, &mut rng), 2));
            ticks += 1;
        }

        assert_eq!(rounded, vec![1, 2, 3]);
        assert!(race.yachts().all(|yacht| yacht.is_finished()));
        assert_eq!(race.yacht(1).map(|y| y.leg_number), race.yacht(2).map(|y| y.leg_number));
    }

    /// A yacht that never crosses the start line keeps its start status
    #[test]
    fn idle_yacht_never_progresses() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut race = Race::new(&test_course(2), RaceTuning::default()).unwrap();
        race.add_yacht(1).unwrap();
        race.schedule_start(0);

        let mut now = race.start_time_ms();
        for _ in 0..600 {
            assert!(roundings(&race.tick(now, &mut rng), 1).is_empty());
            now += TICK_MS;
        }

        let yacht = race.yacht(1).unwrap();
        assert_eq!(yacht.current_mark_seq(), 0);
        assert_eq!(yacht.velocity, 0.0);
        assert_eq!(race.stage(), RaceStage::Racing);
    }
}
