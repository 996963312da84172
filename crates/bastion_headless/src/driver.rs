//! Command execution and the JSON-lines loop.

use std::io::{BufRead, Write};

use bastion_core::components::{ConnectionId, EntityKind};
use bastion_core::error::RequestOutcome;
use bastion_core::replication::FieldId;

use crate::error::{Result, ScriptError};
use crate::protocol::{Command, EntityState, Response, StateReport};
use crate::session::LocalSession;

/// Executes commands against one [`LocalSession`].
#[derive(Debug)]
pub struct Driver {
    session: LocalSession,
    game_over_reported: bool,
}

impl Driver {
    /// Drive an existing session.
    #[must_use]
    pub fn new(session: LocalSession) -> Self {
        Self {
            session,
            game_over_reported: false,
        }
    }

    /// Driver over a standard session.
    pub fn standard() -> Result<Self> {
        Ok(Self::new(LocalSession::standard()?))
    }

    /// Run one command. Failures become error responses.
    pub fn execute(&mut self, command: Command) -> Vec<Response> {
        let name = command.name();
        match self.try_execute(command) {
            Ok(mut responses) => {
                if let Some(over) = self.game_over() {
                    responses.push(over);
                }
                responses
            }
            Err(e) => {
                tracing::warn!("Command {name} failed: {e}");
                vec![Response::error(e.to_string(), Some(name))]
            }
        }
    }

    /// Run one command, propagating failures.
    pub fn try_execute(&mut self, command: Command) -> Result<Vec<Response>> {
        let response = match command {
            Command::Connect { connection } => {
                let (connection, player) = self.session.connect(connection.map(ConnectionId))?;
                Response::Connected {
                    connection: connection.0,
                    player: player.0,
                }
            }
            Command::Disconnect { connection } => {
                self.session.disconnect(ConnectionId(connection))?;
                Response::Disconnected { connection }
            }
            Command::Request {
                connection,
                request,
            } => {
                let request = request.to_request();
                let op = request.name().to_string();
                let outcome = self.session.request(ConnectionId(connection), request)?;
                let (accepted, reason) = match outcome {
                    RequestOutcome::Accepted => (true, None),
                    RequestOutcome::Rejected(reason) => (false, Some(reason.to_string())),
                };
                Response::Outcome {
                    connection,
                    op,
                    accepted,
                    reason,
                }
            }
            Command::Tick { count } => {
                self.session.tick(count)?;
                Response::Ticked {
                    tick: self.session.simulation().get_tick(),
                }
            }
            Command::Query { connection } => {
                Response::State(self.report(connection.map(ConnectionId))?)
            }
            Command::Hash => Response::StateHash {
                tick: self.session.simulation().get_tick(),
                hash: self.session.hash(),
            },
            Command::Quit => Response::Bye,
        };
        Ok(vec![response])
    }

    fn game_over(&mut self) -> Option<Response> {
        if self.game_over_reported {
            return None;
        }
        let winner = self.session.simulation().winner_text()?.to_string();
        self.game_over_reported = true;
        Some(Response::GameOver {
            tick: self.session.simulation().get_tick(),
            winner,
        })
    }

    /// Build a state report from the server or from one replica.
    pub fn report(&self, connection: Option<ConnectionId>) -> Result<StateReport> {
        let sim = self.session.simulation();
        let Some(connection) = connection else {
            let entities = sim
                .registry()
                .iter()
                .map(|record| EntityState {
                    id: record.id.0,
                    kind: record.kind.into(),
                    owner: record.owner.map(|c| c.0),
                    x: record.transform.position.x.to_num(),
                    y: record.transform.position.y.to_num(),
                    health: sim.fields().count(record.id, FieldId::Health),
                    authority: false,
                })
                .collect();
            return Ok(StateReport {
                tick: sim.get_tick(),
                connection: None,
                entities,
                gold: None,
                winner: sim.winner_text().map(String::from),
                hash: self.session.hash(),
            });
        };

        let replica = self
            .session
            .replica(connection)
            .ok_or(ScriptError::UnknownConnection(connection))?;
        let mut entities = Vec::new();
        for kind in [
            EntityKind::Player,
            EntityKind::Base,
            EntityKind::Building,
            EntityKind::Unit,
        ] {
            for id in replica.entities_of(kind) {
                let Some(remote) = replica.entity(id) else {
                    continue;
                };
                let position = replica
                    .field(id, FieldId::Position)
                    .and_then(|v| v.as_point())
                    .unwrap_or(remote.transform.position);
                entities.push(EntityState {
                    id: id.0,
                    kind: kind.into(),
                    owner: remote.owner.map(|c| c.0),
                    x: position.x.to_num(),
                    y: position.y.to_num(),
                    health: replica.field(id, FieldId::Health).and_then(|v| v.as_count()),
                    authority: replica.has_authority(id),
                });
            }
        }
        entities.sort_by_key(|e| e.id);

        Ok(StateReport {
            tick: sim.get_tick(),
            connection: Some(connection.0),
            entities,
            gold: replica.gold(),
            winner: replica.winner().map(String::from),
            hash: self.session.hash(),
        })
    }

    /// The driven session.
    #[must_use]
    pub const fn session(&self) -> &LocalSession {
        &self.session
    }
}

/// Read JSON commands line by line and write JSON responses.
///
/// Stops after `quit` or at end of input. Unparseable lines produce an
/// error response and are skipped.
pub fn run_lines<R: BufRead, W: Write>(driver: &mut Driver, input: R, mut output: W) -> Result<()> {
    let tick = driver.session().simulation().get_tick();
    output.write_all(Response::ready(tick).to_json_line().as_bytes())?;
    output.flush()?;

    for line in input.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let command = match Command::from_json(line) {
            Ok(command) => command,
            Err(e) => {
                let error = Response::error(format!("Parse error: {e}"), None);
                output.write_all(error.to_json_line().as_bytes())?;
                output.flush()?;
                continue;
            }
        };

        #[cfg(debug_assertions)]
        tracing::debug!("Command: {}", command.name());

        let quit = matches!(command, Command::Quit);
        for response in driver.execute(command) {
            output.write_all(response.to_json_line().as_bytes())?;
        }
        output.flush()?;
        if quit {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{EntityKindName, RequestSpec};

    fn lines(output: &[u8]) -> Vec<Response> {
        String::from_utf8_lossy(output)
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_ready_then_bye() {
        let mut driver = Driver::standard().unwrap();
        let mut output = Vec::new();
        let input = "{\"cmd\":\"quit\"}\n{\"cmd\":\"tick\"}\n";

        run_lines(&mut driver, input.as_bytes(), &mut output).unwrap();

        let responses = lines(&output);
        assert!(matches!(responses[0], Response::Ready { tick: 0, .. }));
        assert_eq!(responses[1], Response::Bye);
        assert_eq!(responses.len(), 2);
    }

    #[test]
    fn test_parse_error_keeps_going() {
        let mut driver = Driver::standard().unwrap();
        let mut output = Vec::new();
        let input = "not json\n\n{\"cmd\":\"hash\"}\n";

        run_lines(&mut driver, input.as_bytes(), &mut output).unwrap();

        let responses = lines(&output);
        assert!(matches!(responses[1], Response::Error { cmd: None, .. }));
        assert!(matches!(responses[2], Response::StateHash { tick: 0, .. }));
    }

    #[test]
    fn test_replica_query_matches_server() {
        let mut driver = Driver::standard().unwrap();
        driver.execute(Command::Connect { connection: None });
        driver.execute(Command::Connect { connection: None });
        driver.execute(Command::Tick { count: 5 });

        let server = driver.report(None).unwrap();
        let replica = driver.report(Some(ConnectionId(1))).unwrap();

        let ids = |r: &StateReport| r.entities.iter().map(|e| e.id).collect::<Vec<_>>();
        assert_eq!(ids(&server), ids(&replica));
        assert_eq!(replica.gold, Some(500));
        let own_base = replica
            .entities
            .iter()
            .find(|e| e.kind == EntityKindName::Base && e.owner == Some(1))
            .unwrap();
        assert!(own_base.authority);
        assert_eq!(own_base.health, Some(100));
    }

    #[test]
    fn test_rejected_request_outcome() {
        let mut driver = Driver::standard().unwrap();
        driver.execute(Command::Connect { connection: None });

        let responses = driver.execute(Command::Request {
            connection: 1,
            request: RequestSpec::TrainUnit { spawner: 999 },
        });

        assert!(matches!(
            &responses[0],
            Response::Outcome { accepted: false, reason: Some(_), op, .. } if op == "train_unit"
        ));
    }

    #[test]
    fn test_game_over_reported_once() {
        let mut driver = Driver::standard().unwrap();
        driver.execute(Command::Connect { connection: None });
        driver.execute(Command::Connect { connection: None });

        let responses = driver.execute(Command::Disconnect { connection: 1 });
        assert_eq!(
            responses.last(),
            Some(&Response::GameOver {
                tick: 0,
                winner: "Player 2".to_string()
            })
        );

        let responses = driver.execute(Command::Tick { count: 3 });
        assert!(!responses
            .iter()
            .any(|r| matches!(r, Response::GameOver { .. })));
    }

    #[test]
    fn test_unknown_connection_is_error_response() {
        let mut driver = Driver::standard().unwrap();
        let responses = driver.execute(Command::Query {
            connection: Some(4),
        });
        assert!(matches!(
            &responses[0],
            Response::Error { cmd: Some(cmd), .. } if cmd == "query"
        ));
    }
}
