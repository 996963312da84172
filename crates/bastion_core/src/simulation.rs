//! Authoritative server simulation.
//!
//! [`Simulation`] is one session's server-side world. It owns the entity
//! registry, the replicated field store, the ownership tracker and the
//! session coordinator, and it is the only place that mutates any of
//! them. Everything observers need to know leaves through the outbox in
//! production order.
//!
//! # Request handling
//!
//! Requests are handled one at a time. Each handler validates everything
//! it needs before its first mutation, so a rejected request leaves no
//! trace, with one deliberate exception: a move order clears the unit's
//! target before the destination is validated.
//!
//! # Determinism
//!
//! - No floating-point math (uses fixed-point via [`Fixed`])
//! - No system randomness
//! - Consistent iteration order (sorted entity IDs)
//!
//! # Example
//!
//! ```
//! use bastion_core::components::ConnectionId;
//! use bastion_core::protocol::Request;
//! use bastion_core::simulation::Simulation;
//!
//! let mut sim = Simulation::standard().unwrap();
//! sim.connect(ConnectionId(1)).unwrap();
//!
//! let outcome = sim
//!     .handle_request(ConnectionId(1), Request::SetDisplayName { name: "Ada".into() })
//!     .unwrap();
//! assert!(outcome.is_accepted());
//!
//! sim.tick().unwrap();
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::catalog::{BuyableCatalog, BuyableKind, SpawnerSpec};
use crate::combat::{is_targetable, Weapon};
use crate::components::{
    BuyableId, ConnectionId, EntityId, EntityKind, Health, TeamColor, Transform,
};
use crate::config::SimulationConfig;
use crate::data::UnitData;
use crate::economy::{GoldMine, Wallet};
use crate::error::{GameError, RejectReason, RequestOutcome, Result};
use crate::hierarchy::{Holdings, OwnershipTracker};
use crate::lifecycle::{EntityRecord, EntityRegistry, Notice, SpawnParams};
use crate::math::{Fixed, Vec2Fixed};
use crate::navigation::{NavigationQuery, OpenField};
use crate::production::TrainingQueue;
use crate::protocol::{Envelope, Request, ServerMessage};
use crate::replication::{Caller, FieldId, FieldStore, FieldValue, ReplicaEvent};
use crate::router::Outbox;
use crate::session::{RosterChange, SessionCoordinator};

/// Ticks per second for the simulation.
pub const TICK_RATE: u32 = 20;

/// Duration of one tick in milliseconds.
pub const TICK_DURATION_MS: u32 = 1000 / TICK_RATE;

/// Events generated since the last drain.
///
/// For the server's own presentation layer; observers learn the same
/// things through the outbox.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickEvents {
    /// Entities spawned.
    pub spawned: Vec<EntityId>,
    /// Entities despawned.
    pub despawned: Vec<EntityId>,
    /// Field hook events.
    pub replica: Vec<ReplicaEvent>,
    /// Set when the session ended; the simulation is now frozen.
    pub game_over: Option<ConnectionId>,
}

#[derive(Debug, Clone)]
enum Behavior {
    Player,
    Base { range: Fixed },
    Spawner { queue: TrainingQueue, spec: SpawnerSpec },
    Mine(GoldMine),
    Structure,
    Unit { weapon: Weapon, speed: Fixed },
}

#[derive(Debug, Clone)]
struct Actor {
    max_health: u32,
    behavior: Behavior,
}

// Request handlers separate expected refusals from broken invariants.
enum Failure {
    Reject(RejectReason),
    Fatal(GameError),
}

impl From<RejectReason> for Failure {
    fn from(reason: RejectReason) -> Self {
        Self::Reject(reason)
    }
}

impl From<GameError> for Failure {
    fn from(error: GameError) -> Self {
        Self::Fatal(error)
    }
}

type Outcome<T> = std::result::Result<T, Failure>;

/// Check a proposed display name.
pub fn validate_display_name(name: &str, max_len: usize) -> std::result::Result<(), RejectReason> {
    if name.is_empty() {
        return Err(RejectReason::InvalidName("name is empty".to_string()));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(RejectReason::InvalidName(
            "name contains whitespace".to_string(),
        ));
    }
    if name.chars().count() > max_len {
        return Err(RejectReason::InvalidName(format!(
            "name is longer than {max_len} characters"
        )));
    }
    Ok(())
}

/// One session's authoritative world.
pub struct Simulation {
    tick: u64,
    config: SimulationConfig,
    catalog: BuyableCatalog,
    navigation: Box<dyn NavigationQuery + Send + Sync>,
    registry: EntityRegistry,
    fields: FieldStore,
    tracker: OwnershipTracker,
    session: SessionCoordinator,
    players: BTreeMap<ConnectionId, EntityId>,
    actors: HashMap<EntityId, Actor>,
    outbox: Outbox,
    journal: TickEvents,
    winner_text: Option<String>,
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("tick", &self.tick)
            .field("entities", &self.registry.len())
            .field("players", &self.players)
            .field("state", &self.session.state())
            .finish_non_exhaustive()
    }
}

impl Simulation {
    /// Create an empty session on an open map sized by the config.
    #[must_use]
    pub fn new(config: SimulationConfig, catalog: BuyableCatalog) -> Self {
        let navigation = OpenField::new(config.map_half_extent);
        Self {
            tick: 0,
            config,
            catalog,
            navigation: Box::new(navigation),
            registry: EntityRegistry::new(),
            fields: FieldStore::new(),
            tracker: OwnershipTracker::new(),
            session: SessionCoordinator::new(),
            players: BTreeMap::new(),
            actors: HashMap::new(),
            outbox: Outbox::new(),
            journal: TickEvents::default(),
            winner_text: None,
        }
    }

    /// Default config with the built-in catalog.
    pub fn standard() -> Result<Self> {
        Ok(Self::new(SimulationConfig::default(), BuyableCatalog::standard()?))
    }

    /// Replace the navigation collaborator.
    #[must_use]
    pub fn with_navigation(mut self, navigation: impl NavigationQuery + Send + Sync + 'static) -> Self {
        self.navigation = Box::new(navigation);
        self
    }

    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    /// Admit a connection: snapshot existing entities to it, spawn its
    /// player with starting gold, and give it a starting base.
    pub fn connect(&mut self, connection: ConnectionId) -> Result<EntityId> {
        if self.players.contains_key(&connection) {
            return Err(GameError::InvariantViolation(format!(
                "connection {connection} connected twice"
            )));
        }

        self.registry.add_observer(connection);
        self.send_snapshot(connection);

        let player = self.spawn(
            SpawnParams {
                kind: EntityKind::Player,
                template: None,
                transform: Transform::default(),
                owner: Some(connection),
            },
            vec![
                (FieldId::Gold, FieldValue::Count(self.config.starting_gold)),
                (
                    FieldId::DisplayName,
                    FieldValue::Text(format!("Player {connection}")),
                ),
                (
                    FieldId::TeamColor,
                    FieldValue::Color(TeamColor::for_connection(connection)),
                ),
            ],
            Actor {
                max_health: 0,
                behavior: Behavior::Player,
            },
            None,
        )?;
        self.registry.subscribe(
            player,
            &[EntityKind::Base, EntityKind::Building, EntityKind::Unit],
        )?;
        self.tracker.add_player(connection, player)?;
        self.players.insert(connection, player);

        tracing::info!("Connection {connection} joined as player {player}");

        if self.session.is_over() {
            return Ok(player);
        }
        self.session.add_player(connection);

        if let Some(base) = self.catalog.starting_base().map(|b| b.id) {
            let position = self.config.spawn_point(connection);
            self.spawn_base(connection, base, Transform::at(position))?;
        }
        Ok(player)
    }

    /// Handle a lost connection or a voluntary exit.
    ///
    /// Remaining bases are destroyed through the normal cascade, so the
    /// player is eliminated exactly as if it had lost them in combat.
    /// Unknown connections are ignored.
    pub fn disconnect(&mut self, connection: ConnectionId) -> Result<()> {
        let Some(player) = self.players.get(&connection).copied() else {
            return Ok(());
        };
        tracing::info!("Connection {connection} left");

        let bases = self.tracker.get(connection).map(Holdings::bases).unwrap_or_default();
        for base in bases {
            self.damage(base, u32::MAX)?;
        }
        self.eliminate(connection)?;

        self.despawn(player)?;
        self.tracker.remove_player(connection);
        self.players.remove(&connection);
        self.registry.remove_observer(connection);
        Ok(())
    }

    fn send_snapshot(&mut self, connection: ConnectionId) {
        for record in self.registry.iter() {
            self.outbox.send_to(
                connection,
                ServerMessage::Spawned {
                    entity: record.id,
                    kind: record.kind,
                    owner: record.owner,
                    template: record.template,
                    transform: record.transform,
                    fields: self.fields.snapshot(record.id),
                },
            );
        }
    }

    // ------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------

    /// Validate and execute one client request.
    ///
    /// Validation failures are logged and reported as
    /// [`RequestOutcome::Rejected`]; only broken invariants are errors.
    pub fn handle_request(&mut self, from: ConnectionId, request: Request) -> Result<RequestOutcome> {
        #[cfg(debug_assertions)]
        tracing::debug!("Handling {request:?} from connection {from}");

        let name = request.name();
        let result = match request {
            Request::SetDisplayName { name } => self.set_display_name(from, name),
            Request::PlaceBuilding {
                buyable,
                base,
                position,
                heading,
            } => self.place_building(from, buyable, base, Transform::new(position, heading)),
            Request::TrainUnit { spawner } => self.train_unit(from, spawner),
            Request::MoveUnit { unit, destination } => self.move_unit(from, unit, destination),
            Request::SetTarget { unit, target } => self.set_target(from, unit, target),
            Request::LeaveGame => self.disconnect(from).map_err(Failure::from),
        };

        match result {
            Ok(()) => Ok(RequestOutcome::Accepted),
            Err(Failure::Reject(reason)) => {
                tracing::warn!("Rejected {name} from connection {from}: {reason}");
                if self.config.acknowledge_rejections && self.players.contains_key(&from) {
                    self.outbox.send_to(
                        from,
                        ServerMessage::RequestRejected {
                            request: name.to_string(),
                            reason: reason.clone(),
                        },
                    );
                }
                Ok(RequestOutcome::Rejected(reason))
            }
            Err(Failure::Fatal(error)) => Err(error),
        }
    }

    fn set_display_name(&mut self, from: ConnectionId, name: String) -> Outcome<()> {
        let player = self.require_player(from)?;
        validate_display_name(&name, self.config.max_name_len)?;

        let old = self
            .fields
            .text(player, FieldId::DisplayName)
            .unwrap_or_default()
            .to_string();
        if old == name {
            return Ok(());
        }

        self.set_field(player, FieldId::DisplayName, FieldValue::Text(name.clone()))?;
        tracing::info!("Player Name changed from \"{old}\" to \"{name}\"");
        self.outbox.broadcast(ServerMessage::NameChanged {
            player,
            old,
            new: name,
        });
        Ok(())
    }

    fn place_building(
        &mut self,
        from: ConnectionId,
        buyable: BuyableId,
        base: EntityId,
        transform: Transform,
    ) -> Outcome<()> {
        self.require_running()?;
        let player = self.require_player(from)?;
        let template = self
            .catalog
            .get(buyable)
            .cloned()
            .ok_or(RejectReason::UnknownBuyable(buyable))?;

        let anchor = self
            .registry
            .get(base)
            .copied()
            .filter(|r| r.kind == EntityKind::Base && r.owner == Some(from))
            .filter(|_| self.tracker.holds_base(from, base))
            .ok_or(RejectReason::BaseUnavailable(base))?;
        let Some(Behavior::Base { range }) = self.actors.get(&base).map(|a| &a.behavior) else {
            return Err(RejectReason::BaseUnavailable(base).into());
        };
        if !anchor.transform.position.within(transform.position, *range) {
            return Err(RejectReason::OutOfRange.into());
        }

        self.charge(player, template.price)?;

        if template.is_base() {
            self.spawn_base(from, buyable, transform)?;
        } else {
            self.spawn_building(from, base, buyable, transform)?;
        }
        Ok(())
    }

    fn train_unit(&mut self, from: ConnectionId, spawner: EntityId) -> Outcome<()> {
        self.require_running()?;
        let player = self.require_player(from)?;
        self.require_owned(from, spawner)?;

        let (full, cost) = match self.actors.get(&spawner).map(|a| &a.behavior) {
            Some(Behavior::Spawner { queue, spec }) => (queue.is_full(), spec.unit.training_cost),
            _ => return Err(RejectReason::NotASpawner(spawner).into()),
        };
        if full {
            return Err(RejectReason::QueueFull.into());
        }

        self.charge(player, cost)?;

        let refused = || {
            GameError::InvariantViolation(format!(
                "spawner {spawner} refused a unit after validation"
            ))
        };
        let Some(Behavior::Spawner { queue, .. }) =
            self.actors.get_mut(&spawner).map(|a| &mut a.behavior)
        else {
            return Err(refused().into());
        };
        queue.add().map_err(|_| refused())?;
        let queued = queue.queued();
        self.set_field(spawner, FieldId::TrainingQueue, FieldValue::Count(queued))?;
        Ok(())
    }

    fn move_unit(&mut self, from: ConnectionId, unit: EntityId, destination: Vec2Fixed) -> Outcome<()> {
        self.require_running()?;
        self.require_player(from)?;
        let record = self.require_owned(from, unit)?;
        if record.kind != EntityKind::Unit {
            return Err(RejectReason::NotAUnit(unit).into());
        }

        // A move order drops the target even when the destination is refused.
        self.set_field(unit, FieldId::Target, FieldValue::OptionalEntity(None))?;

        let point = self
            .navigation
            .sample_position(destination, self.config.nav_sample_distance)
            .ok_or(RejectReason::NoNavigablePoint)?;
        self.set_field(unit, FieldId::Destination, FieldValue::OptionalPoint(Some(point)))?;
        Ok(())
    }

    fn set_target(&mut self, from: ConnectionId, unit: EntityId, target: EntityId) -> Outcome<()> {
        self.require_running()?;
        self.require_player(from)?;
        let record = self.require_owned(from, unit)?;
        if record.kind != EntityKind::Unit {
            return Err(RejectReason::NotAUnit(unit).into());
        }

        let victim = self
            .registry
            .get(target)
            .copied()
            .ok_or(RejectReason::EntityNotFound(target))?;
        if target == unit || !is_targetable(victim.kind) || victim.owner == Some(from) {
            return Err(RejectReason::NotTargetable(target).into());
        }

        self.set_field(unit, FieldId::Target, FieldValue::OptionalEntity(Some(target)))?;
        Ok(())
    }

    fn require_running(&self) -> Outcome<()> {
        if self.session.is_over() {
            return Err(RejectReason::GameOver.into());
        }
        Ok(())
    }

    fn require_player(&self, from: ConnectionId) -> Outcome<EntityId> {
        self.players
            .get(&from)
            .copied()
            .ok_or(Failure::Reject(RejectReason::UnknownPlayer(from)))
    }

    fn require_owned(&self, from: ConnectionId, entity: EntityId) -> Outcome<EntityRecord> {
        let record = self
            .registry
            .get(entity)
            .copied()
            .ok_or(RejectReason::EntityNotFound(entity))?;
        if record.owner != Some(from) {
            return Err(RejectReason::NotOwner(entity).into());
        }
        Ok(record)
    }

    fn charge(&mut self, player: EntityId, amount: u32) -> Outcome<()> {
        let mut wallet = Wallet::new(self.fields.count(player, FieldId::Gold).unwrap_or(0));
        if !wallet.spend(amount) {
            return Err(RejectReason::InsufficientGold {
                required: amount,
                available: wallet.gold,
            }
            .into());
        }
        self.set_field(player, FieldId::Gold, FieldValue::Count(wallet.gold))?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Gold
    // ------------------------------------------------------------------

    /// Deduct gold from a player if the balance covers it.
    ///
    /// Returns `false` and leaves the balance unchanged otherwise.
    pub fn deduct_gold(&mut self, connection: ConnectionId, amount: u32) -> Result<bool> {
        let player = self.player_entity(connection)?;
        match self.charge(player, amount) {
            Ok(()) => Ok(true),
            Err(Failure::Reject(_)) => Ok(false),
            Err(Failure::Fatal(error)) => Err(error),
        }
    }

    /// Add gold to a player. Returns the amount credited.
    pub fn add_gold(&mut self, connection: ConnectionId, amount: u32) -> Result<u32> {
        let player = self.player_entity(connection)?;
        let mut wallet = Wallet::new(self.fields.count(player, FieldId::Gold).unwrap_or(0));
        let credited = wallet.deposit(amount);
        self.set_field(player, FieldId::Gold, FieldValue::Count(wallet.gold))?;
        Ok(credited)
    }

    fn player_entity(&self, connection: ConnectionId) -> Result<EntityId> {
        self.players
            .get(&connection)
            .copied()
            .ok_or(GameError::UnknownConnection(connection))
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    fn set_field(&mut self, entity: EntityId, field: FieldId, value: FieldValue) -> Result<()> {
        if let Some(record) = self.fields.set(Caller::Server, entity, field, value)? {
            self.outbox.broadcast(ServerMessage::FieldChanged(record));
        }
        Ok(())
    }

    fn spawn(
        &mut self,
        params: SpawnParams,
        fields: Vec<(FieldId, FieldValue)>,
        actor: Actor,
        parent: Option<EntityId>,
    ) -> Result<EntityId> {
        let notice = self.registry.spawn(params);
        let id = notice.event.entity();

        if let Err(error) = self.fields.register(id, params.kind, fields.clone()) {
            // Never announced, so nobody needs to hear about the removal.
            self.registry.despawn(id);
            return Err(error);
        }
        self.actors.insert(id, actor);

        self.outbox.broadcast(ServerMessage::Spawned {
            entity: id,
            kind: params.kind,
            owner: params.owner,
            template: params.template,
            transform: params.transform,
            fields,
        });
        if let Some(owner) = params.owner {
            self.outbox
                .send_to(owner, ServerMessage::AuthorityGranted { entity: id });
        }
        self.journal.spawned.push(id);

        self.dispatch(&notice, parent)?;
        Ok(id)
    }

    fn dispatch(&mut self, notice: &Notice, parent: Option<EntityId>) -> Result<()> {
        for watcher in &notice.subscribers {
            let Some(connection) = self.registry.get(*watcher).and_then(|r| r.owner) else {
                continue;
            };
            self.tracker.apply(connection, &notice.event, parent)?;
        }
        Ok(())
    }

    /// Spawn a base for `owner` from a base template.
    pub fn spawn_base(
        &mut self,
        owner: ConnectionId,
        template: BuyableId,
        transform: Transform,
    ) -> Result<EntityId> {
        let buyable = self.catalog.require(template)?.clone();
        let BuyableKind::Base { range } = buyable.kind else {
            return Err(GameError::InvalidState(format!(
                "buyable {template} is not a base"
            )));
        };

        let base = self.spawn(
            SpawnParams {
                kind: EntityKind::Base,
                template: Some(template),
                transform,
                owner: Some(owner),
            },
            vec![(FieldId::Health, FieldValue::Count(buyable.max_health))],
            Actor {
                max_health: buyable.max_health,
                behavior: Behavior::Base { range },
            },
            None,
        )?;
        tracing::info!("Connection {owner} gained base {base}");
        Ok(base)
    }

    /// Spawn a building attributed to `base`.
    ///
    /// Fails with [`GameError::InvariantViolation`] before anything is
    /// spawned if `base` is not an active base of `owner`.
    pub fn spawn_building(
        &mut self,
        owner: ConnectionId,
        base: EntityId,
        template: BuyableId,
        transform: Transform,
    ) -> Result<EntityId> {
        let buyable = self.catalog.require(template)?.clone();
        self.tracker.resolve_base(owner, Some(base))?;

        let mut fields = vec![(FieldId::Health, FieldValue::Count(buyable.max_health))];
        let behavior = match buyable.kind {
            BuyableKind::Base { .. } => {
                return Err(GameError::InvalidState(format!(
                    "buyable {template} is a base, not a building"
                )))
            }
            BuyableKind::UnitSpawner(spec) => {
                fields.push((FieldId::TrainingQueue, FieldValue::Count(0)));
                fields.push((FieldId::TrainingProgress, FieldValue::Count(0)));
                Behavior::Spawner {
                    queue: TrainingQueue::new(spec.max_queue, spec.training_ticks),
                    spec,
                }
            }
            BuyableKind::GoldMine {
                amount,
                interval_ticks,
            } => Behavior::Mine(GoldMine::new(amount, interval_ticks)),
            BuyableKind::Structure => Behavior::Structure,
        };

        self.spawn(
            SpawnParams {
                kind: EntityKind::Building,
                template: Some(template),
                transform,
                owner: Some(owner),
            },
            fields,
            Actor {
                max_health: buyable.max_health,
                behavior,
            },
            Some(base),
        )
    }

    /// Spawn a unit for `owner`.
    pub fn spawn_unit(
        &mut self,
        owner: ConnectionId,
        unit: &UnitData,
        position: Vec2Fixed,
        destination: Option<Vec2Fixed>,
    ) -> Result<EntityId> {
        self.spawn(
            SpawnParams {
                kind: EntityKind::Unit,
                template: None,
                transform: Transform::at(position),
                owner: Some(owner),
            },
            vec![
                (FieldId::Health, FieldValue::Count(unit.health)),
                (FieldId::Position, FieldValue::Point(position)),
                (FieldId::Destination, FieldValue::OptionalPoint(destination)),
                (FieldId::Target, FieldValue::OptionalEntity(None)),
            ],
            Actor {
                max_health: unit.health,
                behavior: Behavior::Unit {
                    weapon: Weapon::from_unit(unit),
                    speed: unit.speed,
                },
            },
            None,
        )
    }

    /// Remove an entity. Returns `false` if it was already gone.
    pub fn despawn(&mut self, entity: EntityId) -> Result<bool> {
        let Some((_, notice)) = self.registry.despawn(entity) else {
            return Ok(false);
        };
        self.fields.unregister(entity);
        self.actors.remove(&entity);

        self.outbox
            .broadcast(ServerMessage::Despawned { entity });
        self.journal.despawned.push(entity);

        self.dispatch(&notice, None)?;
        Ok(true)
    }

    /// Deal damage. Dead, missing and untargetable entities ignore it;
    /// reaching zero triggers the entity's death exactly once.
    pub fn damage(&mut self, entity: EntityId, amount: u32) -> Result<()> {
        let Some(record) = self.registry.get(entity).copied() else {
            return Ok(());
        };
        if !is_targetable(record.kind) {
            return Ok(());
        }
        let Some(current) = self.fields.count(entity, FieldId::Health) else {
            return Ok(());
        };
        let max = self.actors.get(&entity).map_or(current, |a| a.max_health);

        let mut health = Health { current, max };
        if health.is_dead() {
            return Ok(());
        }
        health.apply_damage(amount);
        self.set_field(entity, FieldId::Health, FieldValue::Count(health.current))?;

        if health.is_dead() {
            self.on_death(record)?;
        }
        Ok(())
    }

    fn on_death(&mut self, record: EntityRecord) -> Result<()> {
        match (record.kind, record.owner) {
            (EntityKind::Base, Some(owner)) => self.destroy_base(owner, record.id),
            (EntityKind::Player, _) => Ok(()),
            _ => self.despawn(record.id).map(|_| ()),
        }
    }

    /// Cascade teardown of a base: retire it from the hierarchy, kill each
    /// of its buildings through their own death path, remove the base,
    /// and eliminate the owner if that was its last base.
    fn destroy_base(&mut self, owner: ConnectionId, base: EntityId) -> Result<()> {
        let buildings = self.tracker.begin_teardown(owner, base).unwrap_or_default();
        tracing::info!(
            "Base {base} of connection {owner} destroyed with {} buildings",
            buildings.len()
        );

        for building in buildings {
            self.damage(building, u32::MAX)?;
        }
        self.despawn(base)?;

        if self.tracker.get(owner).is_some() && self.tracker.base_count(owner) == 0 {
            self.eliminate(owner)?;
        }
        Ok(())
    }

    fn eliminate(&mut self, owner: ConnectionId) -> Result<()> {
        if !self.session.is_active(owner) {
            return Ok(());
        }

        let units = self.tracker.get(owner).map(Holdings::units).unwrap_or_default();
        for unit in units {
            self.damage(unit, u32::MAX)?;
        }

        tracing::info!("Connection {owner} eliminated");
        if let RosterChange::GameOver { winner } = self.session.remove_player(owner) {
            self.announce_game_over(winner);
        }
        Ok(())
    }

    fn announce_game_over(&mut self, winner: ConnectionId) {
        let text = self
            .players
            .get(&winner)
            .and_then(|player| self.fields.text(*player, FieldId::DisplayName))
            .map_or_else(|| format!("Player {winner}"), str::to_string);

        self.outbox.broadcast(ServerMessage::GameOver {
            winner: text.clone(),
        });
        self.journal.game_over = Some(winner);
        self.winner_text = Some(text);
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Advance one tick and return the events since the last drain.
    ///
    /// After game over the world is frozen: spawners, mines, movement and
    /// firing stop.
    ///
    /// # System Order
    ///
    /// 1. Gold mines
    /// 2. Unit training
    /// 3. Target tracking
    /// 4. Movement
    /// 5. Firing
    pub fn tick(&mut self) -> Result<TickEvents> {
        self.tick += 1;

        if !self.session.is_over() {
            let ids = self.registry.sorted_ids();
            self.run_gold_mines(&ids)?;
            self.run_training(&ids)?;
            self.run_target_tracking(&ids)?;
            self.run_movement(&ids)?;
            self.run_firing(&ids)?;
        }

        Ok(self.drain_events())
    }

    fn run_gold_mines(&mut self, ids: &[EntityId]) -> Result<()> {
        let mut payouts = Vec::new();
        for id in ids {
            if let Some(Actor {
                behavior: Behavior::Mine(mine),
                ..
            }) = self.actors.get_mut(id)
            {
                if let Some(amount) = mine.tick() {
                    if let Some(owner) = self.registry.get(*id).and_then(|r| r.owner) {
                        payouts.push((owner, amount));
                    }
                }
            }
        }

        for (owner, amount) in payouts {
            if self.players.contains_key(&owner) {
                self.add_gold(owner, amount)?;
            }
        }
        Ok(())
    }

    fn run_training(&mut self, ids: &[EntityId]) -> Result<()> {
        let mut progress = Vec::new();
        let mut finished = Vec::new();
        for id in ids {
            if let Some(Actor {
                behavior: Behavior::Spawner { queue, spec },
                ..
            }) = self.actors.get_mut(id)
            {
                if queue.tick() {
                    finished.push((*id, spec.clone(), queue.produced()));
                }
                progress.push((*id, queue.queued(), queue.progress()));
            }
        }

        for (spawner, queued, ticks) in progress {
            self.set_field(spawner, FieldId::TrainingQueue, FieldValue::Count(queued))?;
            self.set_field(spawner, FieldId::TrainingProgress, FieldValue::Count(ticks))?;
        }

        for (spawner, spec, produced) in finished {
            let Some(record) = self.registry.get(spawner).copied() else {
                continue;
            };
            let Some(owner) = record.owner else {
                continue;
            };
            let origin = record.transform.position;
            let rally = origin.ring_point(produced.saturating_sub(1), spec.spawn_range);
            let destination = self
                .navigation
                .sample_position(rally, self.config.nav_sample_distance);
            self.spawn_unit(owner, &spec.unit, origin, destination)?;
        }
        Ok(())
    }

    fn run_target_tracking(&mut self, ids: &[EntityId]) -> Result<()> {
        for id in ids {
            let Some(Behavior::Unit { weapon, .. }) = self.actors.get(id).map(|a| &a.behavior) else {
                continue;
            };
            let weapon = *weapon;
            let Some(target) = self.fields.get(*id, FieldId::Target).and_then(FieldValue::as_entity)
            else {
                continue;
            };

            let Some(target_pos) = self.position_of(target) else {
                self.set_field(*id, FieldId::Target, FieldValue::OptionalEntity(None))?;
                continue;
            };
            let Some(pos) = self.position_of(*id) else {
                continue;
            };

            let destination = if weapon.in_range(pos, target_pos) {
                None
            } else {
                Some(target_pos)
            };
            self.set_field(*id, FieldId::Destination, FieldValue::OptionalPoint(destination))?;
        }
        Ok(())
    }

    fn run_movement(&mut self, ids: &[EntityId]) -> Result<()> {
        for id in ids {
            let Some(Behavior::Unit { speed, .. }) = self.actors.get(id).map(|a| &a.behavior) else {
                continue;
            };
            let speed = *speed;
            let Some(destination) = self
                .fields
                .get(*id, FieldId::Destination)
                .and_then(FieldValue::as_point)
            else {
                continue;
            };
            let Some(pos) = self.fields.get(*id, FieldId::Position).and_then(FieldValue::as_point)
            else {
                continue;
            };

            let next = pos.step_toward(destination, speed);
            self.set_field(*id, FieldId::Position, FieldValue::Point(next))?;
            if let Some(record) = self.registry.get(*id).copied() {
                self.registry
                    .set_transform(*id, Transform::new(next, record.transform.heading))?;
            }
            if next == destination {
                self.set_field(*id, FieldId::Destination, FieldValue::OptionalPoint(None))?;
            }
        }
        Ok(())
    }

    fn run_firing(&mut self, ids: &[EntityId]) -> Result<()> {
        for id in ids {
            if self.session.is_over() {
                break;
            }
            if !self.registry.is_alive(*id) {
                continue;
            }
            let target = self.fields.get(*id, FieldId::Target).and_then(FieldValue::as_entity);
            let positions = target.and_then(|t| Some((self.position_of(*id)?, self.position_of(t)?)));

            let shot = match self.actors.get_mut(id) {
                Some(Actor {
                    behavior: Behavior::Unit { weapon, .. },
                    ..
                }) => {
                    weapon.tick();
                    match positions {
                        Some((from, to)) if weapon.in_range(from, to) => weapon.try_fire(),
                        _ => None,
                    }
                }
                _ => None,
            };

            if let (Some(damage), Some(target)) = (shot, target) {
                self.damage(target, damage)?;
            }
        }
        Ok(())
    }

    fn position_of(&self, entity: EntityId) -> Option<Vec2Fixed> {
        let record = self.registry.get(entity)?;
        self.fields
            .get(entity, FieldId::Position)
            .and_then(FieldValue::as_point)
            .or(Some(record.transform.position))
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Take events accumulated since the last drain.
    pub fn drain_events(&mut self) -> TickEvents {
        let mut events = std::mem::take(&mut self.journal);
        events.replica = self.fields.drain_events();
        events
    }

    /// Take queued outgoing messages in production order.
    pub fn drain_outbox(&mut self) -> Vec<Envelope> {
        self.outbox.drain()
    }

    /// Queued outgoing messages.
    #[must_use]
    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Get the current tick number.
    #[must_use]
    pub const fn get_tick(&self) -> u64 {
        self.tick
    }

    /// Session settings.
    #[must_use]
    pub const fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Buyable catalog.
    #[must_use]
    pub const fn catalog(&self) -> &BuyableCatalog {
        &self.catalog
    }

    /// Live entities.
    #[must_use]
    pub const fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// Authoritative field values.
    #[must_use]
    pub const fn fields(&self) -> &FieldStore {
        &self.fields
    }

    /// Ownership hierarchy.
    #[must_use]
    pub const fn tracker(&self) -> &OwnershipTracker {
        &self.tracker
    }

    /// Roster and game state.
    #[must_use]
    pub const fn session(&self) -> &SessionCoordinator {
        &self.session
    }

    /// Player entity of a connection.
    #[must_use]
    pub fn player(&self, connection: ConnectionId) -> Option<EntityId> {
        self.players.get(&connection).copied()
    }

    /// Connected connections in id order.
    pub fn connections(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.players.keys().copied()
    }

    /// Whether the connection still has a player.
    #[must_use]
    pub fn is_connected(&self, connection: ConnectionId) -> bool {
        self.players.contains_key(&connection)
    }

    /// Gold balance of a connection's player.
    #[must_use]
    pub fn gold(&self, connection: ConnectionId) -> Option<u32> {
        self.fields.count(self.player(connection)?, FieldId::Gold)
    }

    /// Display name of a connection's player.
    #[must_use]
    pub fn display_name(&self, connection: ConnectionId) -> Option<&str> {
        self.fields.text(self.player(connection)?, FieldId::DisplayName)
    }

    /// Units waiting at a spawner.
    #[must_use]
    pub fn queued_units(&self, spawner: EntityId) -> Option<u32> {
        self.fields.count(spawner, FieldId::TrainingQueue)
    }

    /// Winner announcement, once the game is over.
    #[must_use]
    pub fn winner_text(&self) -> Option<&str> {
        self.winner_text.as_deref()
    }

    /// Calculate a hash of the current simulation state.
    ///
    /// Two simulations fed the same connections and requests produce the
    /// same hash.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        self.tick.hash(&mut hasher);
        self.session.state().hash(&mut hasher);

        let ids = self.registry.sorted_ids();
        ids.len().hash(&mut hasher);

        for id in ids {
            if let Some(record) = self.registry.get(id) {
                id.hash(&mut hasher);
                record.kind.hash(&mut hasher);
                record.owner.hash(&mut hasher);
                record.transform.hash(&mut hasher);
                self.fields.snapshot(id).hash(&mut hasher);
            }
        }

        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Target;

    const P1: ConnectionId = ConnectionId(1);
    const P2: ConnectionId = ConnectionId(2);
    const BARRACKS: BuyableId = BuyableId(1);
    const GOLD_MINE: BuyableId = BuyableId(2);
    const WALL: BuyableId = BuyableId(3);

    fn two_player_sim() -> Simulation {
        let mut sim = Simulation::standard().unwrap();
        sim.connect(P1).unwrap();
        sim.connect(P2).unwrap();
        sim.drain_outbox();
        sim
    }

    fn first_base(sim: &Simulation, connection: ConnectionId) -> EntityId {
        sim.tracker().get(connection).unwrap().bases()[0]
    }

    fn near(sim: &Simulation, base: EntityId, dx: i32) -> Vec2Fixed {
        sim.registry().get(base).unwrap().transform.position + Vec2Fixed::from_ints(dx, 0)
    }

    fn place(sim: &mut Simulation, from: ConnectionId, buyable: BuyableId, dx: i32) -> RequestOutcome {
        let base = first_base(sim, from);
        let position = near(sim, base, dx);
        sim.handle_request(
            from,
            Request::PlaceBuilding {
                buyable,
                base,
                position,
                heading: Fixed::ZERO,
            },
        )
        .unwrap()
    }

    fn tank(sim: &Simulation) -> UnitData {
        match &sim.catalog().get(BARRACKS).unwrap().kind {
            BuyableKind::UnitSpawner(spec) => spec.unit.clone(),
            other => panic!("barracks is {other:?}"),
        }
    }

    fn spawned_buildings(envelopes: &[Envelope]) -> usize {
        envelopes
            .iter()
            .filter(|e| {
                matches!(
                    e.message,
                    ServerMessage::Spawned {
                        kind: EntityKind::Building,
                        ..
                    }
                )
            })
            .count()
    }

    #[test]
    fn test_connect_sets_up_player() {
        let sim = two_player_sim();
        assert_eq!(sim.gold(P1), Some(500));
        assert_eq!(sim.display_name(P1), Some("Player 1"));
        assert_eq!(sim.tracker().base_count(P1), 1);
        assert_eq!(sim.session().active_count(), 2);
    }

    #[test]
    fn test_connect_grants_authority_only_to_owner() {
        let mut sim = Simulation::standard().unwrap();
        let player = sim.connect(P1).unwrap();
        let envelopes = sim.drain_outbox();
        assert!(envelopes.contains(&Envelope {
            target: Target::Connection(P1),
            message: ServerMessage::AuthorityGranted { entity: player },
        }));
        assert!(!envelopes.iter().any(|e| matches!(
            e,
            Envelope {
                target: Target::All,
                message: ServerMessage::AuthorityGranted { .. }
            }
        )));
    }

    #[test]
    fn test_late_joiner_gets_snapshot() {
        let mut sim = Simulation::standard().unwrap();
        let p1 = sim.connect(P1).unwrap();
        sim.drain_outbox();

        sim.connect(P2).unwrap();
        let envelopes = sim.drain_outbox();
        let first = &envelopes[0];
        assert_eq!(first.target, Target::Connection(P2));
        assert!(matches!(first.message, ServerMessage::Spawned { entity, .. } if entity == p1));
    }

    #[test]
    fn test_purchase_then_insufficient_funds() {
        let mut sim = two_player_sim();

        assert!(place(&mut sim, P1, BARRACKS, 5).is_accepted());
        assert_eq!(sim.gold(P1), Some(200));
        let envelopes = sim.drain_outbox();
        assert_eq!(spawned_buildings(&envelopes), 1);
        assert!(envelopes.iter().any(|e| matches!(
            e.message,
            ServerMessage::Spawned { kind: EntityKind::Building, owner: Some(P1), .. }
        )));

        let outcome = place(&mut sim, P1, BARRACKS, -5);
        assert_eq!(
            outcome,
            RequestOutcome::Rejected(RejectReason::InsufficientGold {
                required: 300,
                available: 200
            })
        );
        assert_eq!(sim.gold(P1), Some(200));
        assert_eq!(spawned_buildings(&sim.drain_outbox()), 0);
    }

    #[test]
    fn test_placement_outside_range_is_rejected() {
        let mut sim = two_player_sim();
        assert_eq!(
            place(&mut sim, P1, WALL, 15),
            RequestOutcome::Rejected(RejectReason::OutOfRange)
        );
        assert_eq!(sim.gold(P1), Some(500));
    }

    #[test]
    fn test_placement_at_extreme_coordinates_is_rejected() {
        let mut sim = two_player_sim();
        let base = first_base(&sim, P1);
        let corners = [
            Vec2Fixed::new(Fixed::MIN, Fixed::ZERO),
            Vec2Fixed::new(Fixed::MAX, Fixed::ZERO),
            Vec2Fixed::new(Fixed::ZERO, Fixed::MIN),
            Vec2Fixed::new(Fixed::MAX, Fixed::MIN),
        ];
        for position in corners {
            let outcome = sim
                .handle_request(
                    P1,
                    Request::PlaceBuilding {
                        buyable: WALL,
                        base,
                        position,
                        heading: Fixed::MAX,
                    },
                )
                .unwrap();
            assert_eq!(outcome, RequestOutcome::Rejected(RejectReason::OutOfRange));
        }
        assert_eq!(sim.gold(P1), Some(500));
        assert_eq!(spawned_buildings(&sim.drain_outbox()), 0);
    }

    #[test]
    fn test_move_to_extreme_coordinates_is_rejected() {
        let mut sim = two_player_sim();
        let start = Vec2Fixed::from_ints(2, 2);
        let unit = sim.spawn_unit(P1, &tank(&sim), start, None).unwrap();
        let outcome = sim
            .handle_request(
                P1,
                Request::MoveUnit {
                    unit,
                    destination: Vec2Fixed::new(Fixed::MIN, Fixed::MAX),
                },
            )
            .unwrap();
        assert_eq!(outcome, RequestOutcome::Rejected(RejectReason::NoNavigablePoint));

        sim.tick().unwrap();
        assert_eq!(
            sim.fields().get(unit, FieldId::Position),
            Some(&FieldValue::Point(start))
        );
    }

    #[test]
    fn test_placement_on_foreign_base_is_rejected() {
        let mut sim = two_player_sim();
        let enemy_base = first_base(&sim, P2);
        let position = near(&sim, enemy_base, 3);
        let outcome = sim
            .handle_request(
                P1,
                Request::PlaceBuilding {
                    buyable: WALL,
                    base: enemy_base,
                    position,
                    heading: Fixed::ZERO,
                },
            )
            .unwrap();
        assert_eq!(
            outcome,
            RequestOutcome::Rejected(RejectReason::BaseUnavailable(enemy_base))
        );
    }

    #[test]
    fn test_unknown_buyable_is_rejected() {
        let mut sim = two_player_sim();
        assert_eq!(
            place(&mut sim, P1, BuyableId(42), 3),
            RequestOutcome::Rejected(RejectReason::UnknownBuyable(BuyableId(42)))
        );
    }

    #[test]
    fn test_building_goes_to_requested_base() {
        let mut sim = two_player_sim();
        sim.add_gold(P1, 1000).unwrap();
        let first = first_base(&sim, P1);

        // Second base becomes the "latest" one; placement still names the first.
        let position = near(&sim, first, 10);
        sim.handle_request(
            P1,
            Request::PlaceBuilding {
                buyable: BuyableId(0),
                base: first,
                position,
                heading: Fixed::ZERO,
            },
        )
        .unwrap();
        assert_eq!(sim.tracker().base_count(P1), 2);

        assert!(place(&mut sim, P1, WALL, 3).is_accepted());
        assert_eq!(sim.tracker().buildings_of(first).len(), 1);
    }

    #[test]
    fn test_spawn_building_without_base_is_hard_error() {
        let mut sim = two_player_sim();
        let before = sim.registry().len();
        let result = sim.spawn_building(P1, EntityId(999), WALL, Transform::default());
        assert!(matches!(result, Err(GameError::InvariantViolation(_))));
        assert_eq!(sim.registry().len(), before);
    }

    #[test]
    fn test_rename_validation_and_broadcast() {
        let mut sim = two_player_sim();
        let player = sim.player(P1).unwrap();

        let outcome = sim
            .handle_request(P1, Request::SetDisplayName { name: "bad name".into() })
            .unwrap();
        assert!(matches!(outcome, RequestOutcome::Rejected(RejectReason::InvalidName(_))));
        assert!(sim.drain_outbox().is_empty());

        sim.handle_request(P1, Request::SetDisplayName { name: "Ada".into() })
            .unwrap();
        let envelopes = sim.drain_outbox();
        assert!(envelopes.contains(&Envelope {
            target: Target::All,
            message: ServerMessage::NameChanged {
                player,
                old: "Player 1".into(),
                new: "Ada".into(),
            },
        }));
        assert_eq!(sim.display_name(P1), Some("Ada"));
    }

    #[test]
    fn test_rejection_ack_is_opt_in() {
        let mut sim = two_player_sim();
        place(&mut sim, P1, BuyableId(42), 3);
        assert!(sim.drain_outbox().is_empty());

        let config = SimulationConfig {
            acknowledge_rejections: true,
            ..SimulationConfig::default()
        };
        let mut sim = Simulation::new(config, BuyableCatalog::standard().unwrap());
        sim.connect(P1).unwrap();
        sim.drain_outbox();
        place(&mut sim, P1, BuyableId(42), 3);
        let envelopes = sim.drain_outbox();
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].target, Target::Connection(P1));
        assert!(matches!(
            envelopes[0].message,
            ServerMessage::RequestRejected { reason: RejectReason::UnknownBuyable(_), .. }
        ));
    }

    #[test]
    fn test_training_produces_unit() {
        let mut sim = two_player_sim();
        place(&mut sim, P1, BARRACKS, 5);
        let barracks = sim.tracker().buildings_of(first_base(&sim, P1))[0];

        let outcome = sim
            .handle_request(P1, Request::TrainUnit { spawner: barracks })
            .unwrap();
        assert!(outcome.is_accepted());
        assert_eq!(sim.gold(P1), Some(100));
        assert_eq!(sim.queued_units(barracks), Some(1));

        for _ in 0..100 {
            sim.tick().unwrap();
        }
        assert_eq!(sim.queued_units(barracks), Some(0));
        assert_eq!(sim.tracker().get(P1).unwrap().units().len(), 1);
    }

    #[test]
    fn test_training_queue_limit() {
        let mut sim = two_player_sim();
        place(&mut sim, P1, BARRACKS, 5);
        sim.add_gold(P1, 10_000).unwrap();
        let barracks = sim.tracker().buildings_of(first_base(&sim, P1))[0];

        for _ in 0..5 {
            assert!(sim
                .handle_request(P1, Request::TrainUnit { spawner: barracks })
                .unwrap()
                .is_accepted());
        }
        let gold = sim.gold(P1);
        assert_eq!(
            sim.handle_request(P1, Request::TrainUnit { spawner: barracks })
                .unwrap(),
            RequestOutcome::Rejected(RejectReason::QueueFull)
        );
        assert_eq!(sim.gold(P1), gold);
    }

    #[test]
    fn test_foreign_spawner_is_refused_without_field_change() {
        let mut sim = two_player_sim();
        place(&mut sim, P1, BARRACKS, 5);
        let barracks = sim.tracker().buildings_of(first_base(&sim, P1))[0];
        sim.drain_outbox();

        let outcome = sim
            .handle_request(P2, Request::TrainUnit { spawner: barracks })
            .unwrap();

        assert_eq!(outcome, RequestOutcome::Rejected(RejectReason::NotOwner(barracks)));
        assert!(!sim
            .drain_outbox()
            .iter()
            .any(|e| matches!(e.message, ServerMessage::FieldChanged(_))));
    }

    #[test]
    fn test_gold_mine_pays_owner() {
        let mut sim = two_player_sim();
        place(&mut sim, P1, GOLD_MINE, 5);
        assert_eq!(sim.gold(P1), Some(300));
        for _ in 0..50 {
            sim.tick().unwrap();
        }
        assert_eq!(sim.gold(P1), Some(310));
        assert_eq!(sim.gold(P2), Some(500));
    }

    #[test]
    fn test_move_clears_target_even_when_rejected() {
        let mut sim = two_player_sim();
        let unit = sim.spawn_unit(P1, &tank(&sim), Vec2Fixed::ZERO, None).unwrap();
        let enemy = first_base(&sim, P2);

        assert!(sim
            .handle_request(P1, Request::SetTarget { unit, target: enemy })
            .unwrap()
            .is_accepted());
        assert_eq!(
            sim.fields().get(unit, FieldId::Target),
            Some(&FieldValue::OptionalEntity(Some(enemy)))
        );

        let outcome = sim
            .handle_request(
                P1,
                Request::MoveUnit {
                    unit,
                    destination: Vec2Fixed::from_ints(5000, 0),
                },
            )
            .unwrap();
        assert_eq!(outcome, RequestOutcome::Rejected(RejectReason::NoNavigablePoint));
        assert_eq!(
            sim.fields().get(unit, FieldId::Target),
            Some(&FieldValue::OptionalEntity(None))
        );
    }

    #[test]
    fn test_unit_moves_to_destination() {
        let mut sim = two_player_sim();
        let unit = sim.spawn_unit(P1, &tank(&sim), Vec2Fixed::ZERO, None).unwrap();
        sim.handle_request(
            P1,
            Request::MoveUnit {
                unit,
                destination: Vec2Fixed::from_ints(2, 0),
            },
        )
        .unwrap();

        for _ in 0..12 {
            sim.tick().unwrap();
        }
        assert_eq!(
            sim.fields().get(unit, FieldId::Position),
            Some(&FieldValue::Point(Vec2Fixed::from_ints(2, 0)))
        );
        assert_eq!(
            sim.fields().get(unit, FieldId::Destination),
            Some(&FieldValue::OptionalPoint(None))
        );
    }

    #[test]
    fn test_damage_after_death_is_ignored() {
        let mut sim = two_player_sim();
        place(&mut sim, P1, WALL, 5);
        let wall = sim.tracker().buildings_of(first_base(&sim, P1))[0];
        sim.drain_outbox();

        sim.damage(wall, 100).unwrap();
        sim.damage(wall, 100).unwrap();

        let despawns = sim
            .drain_outbox()
            .iter()
            .filter(|e| matches!(e.message, ServerMessage::Despawned { entity } if entity == wall))
            .count();
        assert_eq!(despawns, 1);
        assert!(sim.tracker().buildings_of(first_base(&sim, P1)).is_empty());
    }

    #[test]
    fn test_players_are_not_damageable() {
        let mut sim = two_player_sim();
        let player = sim.player(P1).unwrap();
        sim.damage(player, u32::MAX).unwrap();
        assert!(sim.registry().is_alive(player));
    }

    #[test]
    fn test_game_over_freezes_world() {
        let mut sim = two_player_sim();
        place(&mut sim, P2, GOLD_MINE, 5);
        let base = first_base(&sim, P1);
        sim.damage(base, u32::MAX).unwrap();

        assert!(sim.session().is_over());
        assert_eq!(sim.winner_text(), Some("Player 2"));
        let gold = sim.gold(P2);
        for _ in 0..100 {
            sim.tick().unwrap();
        }
        assert_eq!(sim.gold(P2), gold);
        assert_eq!(
            place(&mut sim, P2, WALL, -5),
            RequestOutcome::Rejected(RejectReason::GameOver)
        );
    }

    #[test]
    fn test_disconnect_eliminates_and_removes_player() {
        let mut sim = two_player_sim();
        let player = sim.player(P1).unwrap();
        sim.disconnect(P1).unwrap();

        assert!(!sim.is_connected(P1));
        assert!(!sim.registry().is_alive(player));
        assert!(sim.session().is_over());
        assert_eq!(sim.session().winner(), Some(P2));

        // Second disconnect is a no-op.
        sim.disconnect(P1).unwrap();
    }

    #[test]
    fn test_state_hash_is_reproducible() {
        let run = || {
            let mut sim = two_player_sim();
            place(&mut sim, P1, BARRACKS, 5);
            for _ in 0..10 {
                sim.tick().unwrap();
            }
            sim.state_hash()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_display_name_rules() {
        assert!(validate_display_name("Ada", 24).is_ok());
        assert!(validate_display_name("", 24).is_err());
        assert!(validate_display_name("a\tb", 24).is_err());
        assert!(validate_display_name(&"x".repeat(25), 24).is_err());
    }
}
