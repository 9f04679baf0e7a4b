//! The game extension of a room: ready checks, the phase state machine,
//! turn order, timers, and the grid actions.
//!
//! Every public handler here takes the room lock once, runs the guard
//! chain, mutates, and broadcasts before releasing. Timer expirations
//! arrive on their own tasks and re-enter through the `*_timer_expired`
//! methods, which take the lock fresh; an epoch stamped into each timer
//! callback makes a superseded timer a no-op.

use std::sync::Arc;

use armada_protocol::{ClientId, Envelope, PayloadKind, Phase, TimerType};
use armada_timer::Countdown;
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::client::RoomClient;
use crate::grid::{AttackOutcome, Grid};
use crate::room::{Room, RoomState};
use crate::user::MAX_SHIPS;
use crate::RoomError;

/// Ready members required for a session to start.
pub const READY_QUORUM: usize = 2;
/// Points that end the session with a win.
pub const WINNING_POINTS: u32 = 6;
/// Rounds played before the session is called.
pub const MAX_ROUNDS: u32 = 3;
/// Board dimensions.
pub const GRID_ROWS: u32 = 5;
pub const GRID_COLS: u32 = 5;

const READY_SECONDS: u64 = 30;
const ROUND_SECONDS: u64 = 30;
const TURN_SECONDS: u64 = 30;

/// One countdown slot plus an epoch. Arming or clearing the slot bumps
/// the epoch, so a callback from a superseded countdown can detect that
/// it is stale.
#[derive(Default)]
struct TimerSlot {
    countdown: Option<Countdown>,
    epoch: u64,
}

impl TimerSlot {
    /// Drops any running countdown and reserves the next epoch.
    fn next_epoch(&mut self) -> u64 {
        self.countdown = None;
        self.epoch += 1;
        self.epoch
    }

    fn set(&mut self, countdown: Countdown) {
        self.countdown = Some(countdown);
    }

    fn clear(&mut self) {
        self.countdown = None;
        self.epoch += 1;
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch == epoch && self.countdown.is_some()
    }
}

/// Per-room game state. Lives inside the room lock.
pub(crate) struct GameState {
    pub(crate) phase: Phase,
    round: u32,
    turn_order: Vec<ClientId>,
    pub(crate) current_turn: ClientId,
    grid: Option<Grid>,
    ready_timer: TimerSlot,
    round_timer: TimerSlot,
    turn_timer: TimerSlot,
}

impl GameState {
    pub(crate) fn new() -> Self {
        Self {
            phase: Phase::Ready,
            round: 0,
            turn_order: Vec::new(),
            current_turn: ClientId::NONE,
            grid: None,
            ready_timer: TimerSlot::default(),
            round_timer: TimerSlot::default(),
            turn_timer: TimerSlot::default(),
        }
    }

    pub(crate) fn cancel_timers(&mut self) {
        self.ready_timer.clear();
        self.round_timer.clear();
        self.turn_timer.clear();
    }

    /// Advances `current_turn` round-robin through the turn order. If the
    /// current player is no longer in the order (mid-turn disconnect),
    /// play resumes from the head rather than stalling.
    fn next_player(&mut self) -> Option<ClientId> {
        if self.turn_order.is_empty() {
            return None;
        }
        let index = match self.turn_order.iter().position(|id| *id == self.current_turn) {
            Some(current) => (current + 1) % self.turn_order.len(),
            None => 0,
        };
        self.current_turn = self.turn_order[index];
        Some(self.current_turn)
    }

    fn is_last_player(&self, id: ClientId) -> bool {
        self.turn_order.last() == Some(&id)
    }
}

impl Room {
    // -----------------------------------------------------------------
    // Ready check
    // -----------------------------------------------------------------

    /// Toggles the client's ready flag. Each toggle restarts the ready
    /// countdown; once the quorum is met the check runs immediately
    /// instead of waiting out the timer.
    pub fn handle_ready(&self, client: &Arc<RoomClient>) -> Result<(), RoomError> {
        let mut state = self.state();
        let member = state
            .members
            .get(&client.id())
            .cloned()
            .ok_or(RoomError::PlayerNotFound)?;
        {
            let game = state.game().ok_or(RoomError::NotGameRoom)?;
            if game.phase != Phase::Ready {
                return Err(RoomError::PhaseMismatch(game.phase));
            }
        }

        let now_ready = {
            let mut user = member.user();
            user.ready = !user.ready;
            user.ready
        };
        debug!(room = %self.name(), client_id = %member.id(), ready = now_ready, "ready toggled");
        let envelope =
            Envelope::from_client(member.id(), PayloadKind::Ready { ready: now_ready });
        self.broadcast_locked(&mut state, &envelope);

        let ready_count = state
            .members
            .values()
            .filter(|m| m.user().ready)
            .count();
        if ready_count >= READY_QUORUM {
            if let Some(game) = state.game_mut() {
                game.ready_timer.clear();
            }
            self.broadcast_time_locked(&mut state, TimerType::Ready, -1);
            self.check_ready_locked(&mut state);
        } else {
            self.start_ready_timer_locked(&mut state);
        }
        Ok(())
    }

    fn check_ready_locked(&self, state: &mut RoomState) {
        let ready_count = state
            .members
            .values()
            .filter(|m| m.user().ready)
            .count();
        if ready_count >= READY_QUORUM {
            self.start_session_locked(state);
        } else {
            self.game_event_locked(
                state,
                format!("Not enough players readied up ({ready_count}/{READY_QUORUM})"),
            );
            self.end_session_locked(state);
        }
    }

    // -----------------------------------------------------------------
    // Session / round / turn transitions
    // -----------------------------------------------------------------

    fn start_session_locked(&self, state: &mut RoomState) {
        let mut order: Vec<ClientId> = state
            .members
            .values()
            .filter(|m| m.user().ready)
            .map(|m| m.id())
            .collect();
        order.shuffle(&mut rand::rng());
        {
            let Some(game) = state.game_mut() else { return };
            if game.phase != Phase::Ready {
                return;
            }
            game.phase = Phase::Place;
            game.round = 0;
            game.turn_order = order;
            game.current_turn = ClientId::NONE;
            game.grid = Some(Grid::new(GRID_ROWS, GRID_COLS));
        }
        info!(room = %self.name(), "session started");
        self.broadcast_locked(
            state,
            &Envelope::server(PayloadKind::Phase { phase: Phase::Place }),
        );
        self.game_event_locked(
            state,
            format!("The session has started, place your ships ({MAX_SHIPS} each)"),
        );
        self.start_round_locked(state);
    }

    fn start_round_locked(&self, state: &mut RoomState) {
        let (round, entered_attack) = {
            let Some(game) = state.game_mut() else { return };
            let entered_attack = game.phase == Phase::Place && game.round >= 1;
            if entered_attack {
                game.phase = Phase::Attack;
            }
            game.round += 1;
            (game.round, entered_attack)
        };
        if entered_attack {
            self.broadcast_locked(
                state,
                &Envelope::server(PayloadKind::Phase { phase: Phase::Attack }),
            );
            self.game_event_locked(state, "The attack phase has begun");
        }
        for member in state.members.values() {
            member.user().took_turn = false;
        }
        self.broadcast_locked(state, &Envelope::server(PayloadKind::ResetTurn));
        self.game_event_locked(state, format!("Round {round} has started"));
        self.start_round_timer_locked(state);
        self.start_turn_locked(state);
    }

    fn start_turn_locked(&self, state: &mut RoomState) {
        let turn_based = matches!(
            state.game().map(|g| g.phase),
            Some(Phase::Attack | Phase::InProgress)
        );
        if !turn_based {
            // PLACE has no turn rotation; everyone places concurrently
            // under the round timer.
            return;
        }
        let picked = state.game_mut().and_then(|g| g.next_player());
        let Some(current) = picked else {
            self.game_event_locked(state, "No players remain in the turn order");
            self.end_session_locked(state);
            return;
        };
        let display = state
            .members
            .get(&current)
            .map(|m| m.display_name())
            .unwrap_or_else(|| format!("player#{current}"));
        self.game_event_locked(state, format!("It's {display}'s turn"));
        self.start_turn_timer_locked(state);
    }

    fn end_turn_locked(&self, state: &mut RoomState) {
        if let Some(game) = state.game_mut() {
            game.turn_timer.clear();
        }
        self.broadcast_time_locked(state, TimerType::Turn, -1);
        let Some((phase, was_last)) = state
            .game()
            .map(|g| (g.phase, g.is_last_player(g.current_turn)))
        else {
            return;
        };
        match phase {
            // ATTACK and the demo mode advance the round once the last
            // player in the order has acted; PLACE reaches here only when
            // every ready member has finished placing.
            Phase::Attack | Phase::InProgress if !was_last => self.start_turn_locked(state),
            _ => self.end_round_locked(state),
        }
    }

    fn end_round_locked(&self, state: &mut RoomState) {
        let round = {
            let Some(game) = state.game_mut() else { return };
            game.round_timer.clear();
            game.turn_timer.clear();
            game.round
        };
        self.broadcast_time_locked(state, TimerType::Round, -1);
        if round >= MAX_ROUNDS {
            self.game_event_locked(
                state,
                format!("The round limit ({MAX_ROUNDS}) has been reached"),
            );
            self.end_session_locked(state);
        } else {
            self.start_round_locked(state);
        }
    }

    /// Resets the room back to READY: timers cancelled, turn order and
    /// grid dropped, every member's session state cleared, and the reset
    /// triggers broadcast so clients can wipe their local view.
    fn end_session_locked(&self, state: &mut RoomState) {
        {
            let Some(game) = state.game_mut() else { return };
            game.cancel_timers();
            game.phase = Phase::Ready;
            game.round = 0;
            game.turn_order.clear();
            game.current_turn = ClientId::NONE;
            game.grid = None;
        }
        for member in state.members.values() {
            member.user().reset();
        }
        self.game_event_locked(state, "The session has ended");
        self.broadcast_locked(
            state,
            &Envelope::server(PayloadKind::Phase { phase: Phase::Ready }),
        );
        self.broadcast_locked(state, &Envelope::server(PayloadKind::ResetReady));
        self.broadcast_locked(state, &Envelope::server(PayloadKind::ResetTurn));
        self.broadcast_time_locked(state, TimerType::Ready, -1);
        self.broadcast_time_locked(state, TimerType::Round, -1);
        self.broadcast_time_locked(state, TimerType::Turn, -1);
        info!(room = %self.name(), "session ended");
    }

    // -----------------------------------------------------------------
    // Player actions
    // -----------------------------------------------------------------

    /// PLACE-phase ship placement. The placement echo goes only to the
    /// placer; other players must not learn ship positions.
    pub fn handle_place(
        &self,
        client: &Arc<RoomClient>,
        row: u32,
        col: u32,
    ) -> Result<(), RoomError> {
        let mut state = self.state();
        let member = state
            .members
            .get(&client.id())
            .cloned()
            .ok_or(RoomError::PlayerNotFound)?;
        {
            let game = state.game().ok_or(RoomError::NotGameRoom)?;
            if game.phase != Phase::Place {
                return Err(RoomError::PhaseMismatch(game.phase));
            }
            let user = member.user();
            if !user.ready {
                return Err(RoomError::NotReady);
            }
            if user.took_turn {
                return Err(RoomError::AlreadyTookTurn);
            }
        }
        {
            let Some(game) = state.game_mut() else { return Ok(()) };
            let grid = game
                .grid
                .as_mut()
                .ok_or(RoomError::InvalidCoordinate(row, col))?;
            grid.place_ship(row, col, member.id())?;
        }
        let (placed, all_placed) = {
            let mut user = member.user();
            user.placed_ships += 1;
            (user.placed_ships, user.all_ships_placed())
        };
        member.send(
            Envelope::from_client(member.id(), PayloadKind::Place { row, col })
                .with_message(format!("Ship placed at ({row}, {col}), {placed}/{MAX_SHIPS}")),
        );

        if all_placed {
            member.user().took_turn = true;
            self.broadcast_locked(
                &mut state,
                &Envelope::from_client(member.id(), PayloadKind::Turn { took_turn: true }),
            );
            self.game_event_locked(
                &mut state,
                format!("{} has placed all of their ships", member.display_name()),
            );
            let all_done = state
                .members
                .values()
                .all(|m| {
                    let user = m.user();
                    !user.ready || user.took_turn
                });
            if all_done {
                self.end_turn_locked(&mut state);
            }
        }
        Ok(())
    }

    /// ATTACK-phase shot at a coordinate.
    pub fn handle_attack(
        &self,
        client: &Arc<RoomClient>,
        row: u32,
        col: u32,
    ) -> Result<(), RoomError> {
        let mut state = self.state();
        let member = guard_turn_action(&state, client.id(), Phase::Attack)?;
        let outcome = {
            let Some(game) = state.game_mut() else { return Ok(()) };
            let grid = game
                .grid
                .as_mut()
                .ok_or(RoomError::InvalidCoordinate(row, col))?;
            grid.attack(row, col)?
        };

        member.user().took_turn = true;
        self.broadcast_locked(
            &mut state,
            &Envelope::from_client(member.id(), PayloadKind::Turn { took_turn: true }),
        );

        let display = member.display_name();
        match outcome {
            AttackOutcome::Hit { ships_destroyed } => {
                let points = {
                    let mut user = member.user();
                    user.points += ships_destroyed;
                    user.points
                };
                self.broadcast_locked(
                    &mut state,
                    &Envelope::from_client(member.id(), PayloadKind::Points { points }),
                );
                self.game_event_locked(
                    &mut state,
                    format!(
                        "{display} hit ({row}, {col}) and destroyed {ships_destroyed} ship(s)"
                    ),
                );
                if points >= WINNING_POINTS {
                    self.game_event_locked(
                        &mut state,
                        format!("{display} reached {WINNING_POINTS} points and wins"),
                    );
                    self.end_session_locked(&mut state);
                    return Ok(());
                }
            }
            AttackOutcome::Miss => {
                self.game_event_locked(
                    &mut state,
                    format!("{display} attacked ({row}, {col}) and missed"),
                );
            }
            AttackOutcome::AlreadyStruck => {
                self.game_event_locked(
                    &mut state,
                    format!("{display} attacked ({row}, {col}), already struck"),
                );
            }
        }
        self.end_turn_locked(&mut state);
        Ok(())
    }

    /// ATTACK-phase pass: the turn is consumed without a shot.
    pub fn handle_skip(&self, client: &Arc<RoomClient>) -> Result<(), RoomError> {
        let mut state = self.state();
        let member = guard_turn_action(&state, client.id(), Phase::Attack)?;
        member.user().took_turn = true;
        self.broadcast_locked(
            &mut state,
            &Envelope::from_client(member.id(), PayloadKind::Turn { took_turn: true }),
        );
        self.game_event_locked(
            &mut state,
            format!("{} skipped their turn", member.display_name()),
        );
        self.end_turn_locked(&mut state);
        Ok(())
    }

    /// Generic-turn demo mode: the current player rolls for a point.
    pub fn handle_turn(&self, client: &Arc<RoomClient>) -> Result<(), RoomError> {
        let mut state = self.state();
        let member = guard_turn_action(&state, client.id(), Phase::InProgress)?;
        let display = member.display_name();
        if rand::rng().random_range(0..4) == 0 {
            let points = {
                let mut user = member.user();
                user.points += 1;
                user.points
            };
            self.broadcast_locked(
                &mut state,
                &Envelope::from_client(member.id(), PayloadKind::Points { points }),
            );
            self.game_event_locked(&mut state, format!("{display} rolled a point"));
        } else {
            self.game_event_locked(&mut state, format!("{display} rolled nothing"));
        }
        member.user().took_turn = true;
        self.broadcast_locked(
            &mut state,
            &Envelope::from_client(member.id(), PayloadKind::Turn { took_turn: true }),
        );
        self.end_turn_locked(&mut state);
        Ok(())
    }

    // -----------------------------------------------------------------
    // Membership hooks
    // -----------------------------------------------------------------

    /// Brings a newcomer up to date with the game state: phase, everyone's
    /// ready and turn flags, and (outside READY) everyone's points. Send
    /// failures are left for the next broadcast to evict.
    pub(crate) fn sync_game_state_locked(&self, state: &mut RoomState, newcomer: &Arc<RoomClient>) {
        let Some(phase) = state.game().map(|g| g.phase) else {
            return;
        };
        newcomer.send_phase(phase);
        for member in state.members.values() {
            if member.id() == newcomer.id() {
                continue;
            }
            let user = member.user();
            newcomer.send_sync_ready(member.id(), user.ready);
            newcomer.send_sync_turn(member.id(), user.took_turn);
            if phase != Phase::Ready {
                newcomer.send_points(member.id(), user.points);
            }
        }
    }

    /// Adjusts game state after a member has already been removed from
    /// the member map.
    pub(crate) fn on_client_removed_locked(&self, state: &mut RoomState, removed: ClientId) {
        let Some((order_empty, was_current)) = ({
            let Some(game) = state.game_mut() else { return };
            game.turn_order.retain(|id| *id != removed);
            if game.phase == Phase::Ready {
                None
            } else {
                Some((
                    game.turn_order.is_empty(),
                    game.current_turn == removed,
                ))
            }
        }) else {
            return;
        };
        if order_empty {
            self.game_event_locked(state, "No players remain in the session");
            self.end_session_locked(state);
        } else if was_current {
            self.start_turn_locked(state);
        }
    }

    // -----------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------

    /// Broadcasts the remaining seconds of a countdown (-1 clears).
    pub(crate) fn broadcast_time(&self, timer: TimerType, seconds: i64) {
        let mut state = self.state();
        self.broadcast_time_locked(&mut state, timer, seconds);
    }

    fn broadcast_time_locked(&self, state: &mut RoomState, timer: TimerType, seconds: i64) {
        self.broadcast_locked(
            state,
            &Envelope::server(PayloadKind::Time { timer, seconds }),
        );
    }

    fn start_ready_timer_locked(&self, state: &mut RoomState) {
        let Some(game) = state.game_mut() else { return };
        let epoch = game.ready_timer.next_epoch();
        let tick = {
            let weak = self.weak();
            move |seconds| {
                if let Some(room) = weak.upgrade() {
                    room.broadcast_time(TimerType::Ready, seconds);
                }
            }
        };
        let weak = self.weak();
        let expire = move || {
            if let Some(room) = weak.upgrade() {
                room.ready_timer_expired(epoch);
            }
        };
        game.ready_timer.set(Countdown::start(READY_SECONDS, tick, expire));
    }

    fn start_round_timer_locked(&self, state: &mut RoomState) {
        let Some(game) = state.game_mut() else { return };
        let epoch = game.round_timer.next_epoch();
        let tick = {
            let weak = self.weak();
            move |seconds| {
                if let Some(room) = weak.upgrade() {
                    room.broadcast_time(TimerType::Round, seconds);
                }
            }
        };
        let weak = self.weak();
        let expire = move || {
            if let Some(room) = weak.upgrade() {
                room.round_timer_expired(epoch);
            }
        };
        game.round_timer.set(Countdown::start(ROUND_SECONDS, tick, expire));
    }

    fn start_turn_timer_locked(&self, state: &mut RoomState) {
        let Some(game) = state.game_mut() else { return };
        let epoch = game.turn_timer.next_epoch();
        let tick = {
            let weak = self.weak();
            move |seconds| {
                if let Some(room) = weak.upgrade() {
                    room.broadcast_time(TimerType::Turn, seconds);
                }
            }
        };
        let weak = self.weak();
        let expire = move || {
            if let Some(room) = weak.upgrade() {
                room.turn_timer_expired(epoch);
            }
        };
        game.turn_timer.set(Countdown::start(TURN_SECONDS, tick, expire));
    }

    fn ready_timer_expired(&self, epoch: u64) {
        let mut state = self.state();
        {
            let Some(game) = state.game_mut() else { return };
            if !game.ready_timer.is_current(epoch) {
                return;
            }
            game.ready_timer.clear();
        }
        debug!(room = %self.name(), "ready timer expired");
        self.broadcast_time_locked(&mut state, TimerType::Ready, -1);
        self.check_ready_locked(&mut state);
    }

    fn round_timer_expired(&self, epoch: u64) {
        let mut state = self.state();
        {
            let Some(game) = state.game_mut() else { return };
            if !game.round_timer.is_current(epoch) {
                return;
            }
            game.round_timer.clear();
        }
        debug!(room = %self.name(), "round timer expired");
        self.game_event_locked(&mut state, "Time for the round has run out");
        self.end_round_locked(&mut state);
    }

    fn turn_timer_expired(&self, epoch: u64) {
        let mut state = self.state();
        let current = {
            let Some(game) = state.game_mut() else { return };
            if !game.turn_timer.is_current(epoch) {
                return;
            }
            game.turn_timer.clear();
            game.current_turn
        };
        debug!(room = %self.name(), client_id = %current, "turn timer expired");
        if let Some(member) = state.members.get(&current).cloned() {
            member.user().took_turn = true;
            self.broadcast_locked(
                &mut state,
                &Envelope::from_client(current, PayloadKind::Turn { took_turn: true }),
            );
            self.game_event_locked(
                &mut state,
                format!("{} ran out of time", member.display_name()),
            );
        }
        self.end_turn_locked(&mut state);
    }
}

/// The shared guard chain for turn-based actions, in rejection order:
/// membership, game room, phase, readiness, turn ownership, repeat action.
fn guard_turn_action(
    state: &RoomState,
    client_id: ClientId,
    expected: Phase,
) -> Result<Arc<RoomClient>, RoomError> {
    let member = state
        .members
        .get(&client_id)
        .cloned()
        .ok_or(RoomError::PlayerNotFound)?;
    let game = state.game().ok_or(RoomError::NotGameRoom)?;
    if game.phase != expected {
        return Err(RoomError::PhaseMismatch(game.phase));
    }
    let user = member.user();
    if !user.ready {
        return Err(RoomError::NotReady);
    }
    if game.current_turn != client_id {
        return Err(RoomError::NotPlayersTurn);
    }
    if user.took_turn {
        return Err(RoomError::AlreadyTookTurn);
    }
    drop(user);
    Ok(member)
}
