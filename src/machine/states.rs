//! Hierarchical state machine of the coffee maker
//! States: Off, SelfCheck, StandBy, BinFull, OverflowFull, CleaningRequired,
//! CommandMode, Grinding, BeansEmpty, Brewing, WaterEmpty, PrepMilk, MilkEmpty
//!
//! Superstates carry the transitions shared by several states:
//! `powered` (turn off), `fault_watch` (escalation from SelfCheck/StandBy),
//! `busy` (cancel and turn off while a cycle is in progress). The timed
//! composites `self_check`, `grinding`, `brewing` and `prep_milk` own the
//! phase timer through their inner state's entry and exit actions.

use embassy_time::Instant;
use log::{debug, error, info, trace};
use statig::prelude::*;
use std::collections::VecDeque;

use super::supervisor::{self, ThresholdReading};
use super::timer::{PhaseTimer, TimedPhase, TimerToken};
use crate::hardware::CupSensor;
use crate::resources::{ResourceStore, StoreChange};
use crate::system::{MachineConfig, Notification};
use crate::types::*;

const OUTPUT_CAPACITY: usize = 16;

// Input events to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineEvent {
    // Commands
    TurnOn,
    TurnOff,
    Start,
    Cancel,
    Finish,
    CheckOk,

    // Self-check re-broadcast of one gauge
    Threshold(ThresholdReading),

    // Command mode operations
    Grind(GrindOptions),
    Brew(BrewOptions),
    MilkPrep(MilkOptions),

    // Phase timer of the active timed sub-state
    TimerElapsed(TimerToken),
}

// Shared context for the state machine
pub struct MachineContext {
    pub resources: ResourceStore,
    pub cup: CupSensor,
    pub pending: PendingOperation,
    pub ground_coffee: u32,
    pub timer: PhaseTimer,
    pub config: MachineConfig,
    pub now: Instant,
    pub queue: VecDeque<MachineEvent>,
    outputs: heapless::Vec<Notification, OUTPUT_CAPACITY>,
}

impl MachineContext {
    pub fn new(resources: ResourceStore, config: MachineConfig) -> Self {
        Self {
            resources,
            cup: CupSensor::new(),
            pending: PendingOperation::None,
            ground_coffee: 0,
            timer: PhaseTimer::new(),
            config,
            now: Instant::from_ticks(0),
            queue: VecDeque::new(),
            outputs: heapless::Vec::new(),
        }
    }

    /// Appends to the event queue; never dispatches.
    pub fn post(&mut self, event: MachineEvent) {
        trace!("Posting {:?}", event);
        self.queue.push_back(event);
    }

    pub fn notify(&mut self, notification: Notification) {
        if self.outputs.push(notification).is_err() {
            error!("Notification buffer full, dropping {:?}", notification);
        }
    }

    pub fn take_outputs(&mut self) -> heapless::Vec<Notification, OUTPUT_CAPACITY> {
        core::mem::take(&mut self.outputs)
    }

    /// Posts the events of one self-check pass.
    pub fn run_self_check(&mut self) {
        let report = supervisor::self_check(&self.resources);
        for event in report.events() {
            self.post(event);
        }
    }

    /// Publishes every store write since the last call and re-runs the
    /// self-check after each one.
    pub fn settle_changes(&mut self) {
        for change in self.resources.take_changes() {
            let notification = match change {
                StoreChange::Level { resource, level } => {
                    Notification::LevelChanged { resource, level }
                }
                StoreChange::CupsProcessed(cups) => Notification::CupsProcessedChanged(cups),
            };
            self.notify(notification);
            self.run_self_check();
        }
    }

    pub fn consume(&mut self, resource: Resource, amount: u32) -> u32 {
        let taken = self.resources.consume(resource, amount);
        self.settle_changes();
        taken
    }

    pub fn replenish(&mut self, resource: Resource, amount: u32) {
        self.resources.replenish(resource, amount);
        self.settle_changes();
    }

    pub fn set_level(&mut self, resource: Resource, level: u32) {
        self.resources.set(resource, level);
        self.settle_changes();
    }

    pub fn set_cups_processed(&mut self, cups: u32) {
        self.resources.set_cups_processed(cups);
        self.settle_changes();
    }

    pub fn add_cups_processed(&mut self, cups: u32) {
        self.resources.add_cups_processed(cups);
        self.settle_changes();
    }

    pub fn place_cup(&mut self) {
        if self.cup.place() {
            self.notify(Notification::CupPresenceChanged(true));
        }
    }

    pub fn remove_cup(&mut self) {
        if self.cup.remove() {
            self.notify(Notification::CupPresenceChanged(false));
        }
    }

    fn arm_timer(&mut self, phase: TimedPhase) {
        let delay = phase.delay(&self.config);
        self.timer.arm(phase, self.now, delay);
    }

    fn capacity(&self, resource: Resource) -> u32 {
        self.resources.capacity(resource)
    }

    /// Liquid that was dispensed without a cup ends up in the overflow tray.
    fn dispense(&mut self, amount: u32) {
        if !self.cup.is_present() {
            debug!("No cup detected, {} spilled into overflow", amount);
            self.replenish(Resource::Overflow, amount);
        }
    }
}

#[derive(Debug, Default)]
pub struct CoffeeMachine;

#[state_machine(
    initial = "State::off()",
    state(derive(Debug)),
    superstate(derive(Debug)),
    on_transition = "Self::on_transition"
)]
impl CoffeeMachine {
    /// Powered down; only turn on is accepted
    #[state]
    fn off(event: &MachineEvent) -> Response<State> {
        use Response::*;

        match event {
            MachineEvent::TurnOn => Transition(State::self_check_settling()),
            _ => Handled,
        }
    }

    /// Every state but Off
    #[superstate]
    fn powered(event: &MachineEvent) -> Response<State> {
        use Response::*;

        match event {
            MachineEvent::TurnOff => Transition(State::off()),
            _ => Handled,
        }
    }

    /// SelfCheck and StandBy escalate into the maintenance states
    #[superstate(superstate = "powered")]
    fn fault_watch(context: &mut MachineContext, event: &MachineEvent) -> Response<State> {
        use Response::*;

        match event {
            MachineEvent::Threshold(ThresholdReading {
                gauge: Gauge::RestBin,
                value,
            }) if *value >= context.capacity(Resource::RestBin) => Transition(State::bin_full()),
            MachineEvent::Threshold(ThresholdReading {
                gauge: Gauge::CupsProcessed,
                value,
            }) if *value >= context.resources.cleaning_threshold() => {
                Transition(State::cleaning_required())
            }
            MachineEvent::Threshold(ThresholdReading {
                gauge: Gauge::Overflow,
                value,
            }) if *value >= context.capacity(Resource::Overflow) => {
                Transition(State::overflow_full())
            }
            _ => Super,
        }
    }

    /// 🔍 SELF-CHECK - leaves for StandBy only when the self-check reports ok
    #[superstate(superstate = "fault_watch")]
    fn self_check(event: &MachineEvent) -> Response<State> {
        use Response::*;

        match event {
            MachineEvent::CheckOk => Transition(State::stand_by()),
            _ => Super,
        }
    }

    #[state(
        superstate = "self_check",
        entry_action = "enter_self_check_settling",
        exit_action = "exit_timed_phase"
    )]
    fn self_check_settling(context: &mut MachineContext, event: &MachineEvent) -> Response<State> {
        use Response::*;

        match event {
            MachineEvent::TimerElapsed(token) if context.timer.accepts(*token) => {
                Transition(State::self_check_complete())
            }
            _ => Super,
        }
    }

    /// Settle delay is over; waiting for the self-check to report ok.
    #[state(superstate = "self_check")]
    fn self_check_complete(event: &MachineEvent) -> Response<State> {
        use Response::*;

        trace!("Self-check complete, deferring {:?}", event);
        Super
    }

    /// ⏸️ STANDBY - idle, fault free
    #[state(superstate = "fault_watch", entry_action = "enter_stand_by")]
    fn stand_by(event: &MachineEvent) -> Response<State> {
        use Response::*;

        match event {
            MachineEvent::Start => Transition(State::command_mode()),
            _ => Super,
        }
    }

    /// 🗑️ Rest bin at capacity
    #[state(superstate = "powered")]
    fn bin_full(context: &mut MachineContext, event: &MachineEvent) -> Response<State> {
        use Response::*;

        match event {
            MachineEvent::Threshold(ThresholdReading {
                gauge: Gauge::RestBin,
                value,
            }) if *value < context.capacity(Resource::RestBin) => Transition(State::stand_by()),
            _ => Super,
        }
    }

    /// 🧽 Cleaning threshold reached
    #[state(superstate = "powered")]
    fn cleaning_required(context: &mut MachineContext, event: &MachineEvent) -> Response<State> {
        use Response::*;

        match event {
            MachineEvent::Threshold(ThresholdReading {
                gauge: Gauge::CupsProcessed,
                value,
            }) if *value < context.resources.cleaning_threshold() => Transition(State::stand_by()),
            _ => Super,
        }
    }

    /// 💧 Overflow tray at capacity
    #[state(superstate = "powered")]
    fn overflow_full(context: &mut MachineContext, event: &MachineEvent) -> Response<State> {
        use Response::*;

        match event {
            MachineEvent::Threshold(ThresholdReading {
                gauge: Gauge::Overflow,
                value,
            }) if *value < context.capacity(Resource::Overflow) => Transition(State::stand_by()),
            _ => Super,
        }
    }

    /// A cycle is in progress; interrupting it still counts a cup
    #[superstate(superstate = "powered")]
    fn busy(context: &mut MachineContext, event: &MachineEvent) -> Response<State> {
        use Response::*;

        match event {
            MachineEvent::Cancel => {
                context.add_cups_processed(1);
                Transition(State::stand_by())
            }
            MachineEvent::TurnOff => {
                context.add_cups_processed(1);
                Transition(State::off())
            }
            _ => Super,
        }
    }

    /// ☕ COMMAND MODE - accepts grind, brew and milk operations
    #[state(superstate = "busy")]
    fn command_mode(context: &mut MachineContext, event: &MachineEvent) -> Response<State> {
        use Response::*;

        match event {
            MachineEvent::Grind(options) => {
                context.pending = PendingOperation::Grind(*options);
                Transition(State::grinding_timed())
            }
            MachineEvent::Brew(options) => {
                context.pending = PendingOperation::Brew(*options);
                Transition(State::brewing_timed())
            }
            MachineEvent::MilkPrep(options) => {
                context.pending = PendingOperation::MilkPrep(*options);
                Transition(State::prep_milk_timed())
            }
            MachineEvent::Finish => {
                context.add_cups_processed(1);
                Transition(State::stand_by())
            }
            _ => Super,
        }
    }

    #[superstate(superstate = "busy", entry_action = "enter_grinding")]
    fn grinding(event: &MachineEvent) -> Response<State> {
        use Response::*;

        match event {
            MachineEvent::Threshold(ThresholdReading {
                gauge: Gauge::Beans,
                value,
            }) if *value < 1 => Transition(State::beans_empty()),
            _ => Super,
        }
    }

    #[state(
        superstate = "grinding",
        entry_action = "enter_grinding_timed",
        exit_action = "exit_timed_phase"
    )]
    fn grinding_timed(context: &mut MachineContext, event: &MachineEvent) -> Response<State> {
        use Response::*;

        match event {
            MachineEvent::TimerElapsed(token) if context.timer.accepts(*token) => {
                Transition(State::command_mode())
            }
            _ => Super,
        }
    }

    #[state(superstate = "busy")]
    fn beans_empty(event: &MachineEvent) -> Response<State> {
        use Response::*;

        match event {
            MachineEvent::Threshold(ThresholdReading {
                gauge: Gauge::Beans,
                value,
            }) if *value > 0 => Transition(State::grinding_timed()),
            _ => Super,
        }
    }

    #[superstate(superstate = "busy", entry_action = "enter_brewing")]
    fn brewing(event: &MachineEvent) -> Response<State> {
        use Response::*;

        match event {
            MachineEvent::Threshold(ThresholdReading {
                gauge: Gauge::Water,
                value,
            }) if *value < 1 => Transition(State::water_empty()),
            _ => Super,
        }
    }

    #[state(
        superstate = "brewing",
        entry_action = "enter_brewing_timed",
        exit_action = "exit_timed_phase"
    )]
    fn brewing_timed(context: &mut MachineContext, event: &MachineEvent) -> Response<State> {
        use Response::*;

        match event {
            MachineEvent::TimerElapsed(token) if context.timer.accepts(*token) => {
                Transition(State::command_mode())
            }
            _ => Super,
        }
    }

    #[state(superstate = "busy")]
    fn water_empty(event: &MachineEvent) -> Response<State> {
        use Response::*;

        match event {
            MachineEvent::Threshold(ThresholdReading {
                gauge: Gauge::Water,
                value,
            }) if *value > 0 => Transition(State::brewing_timed()),
            _ => Super,
        }
    }

    #[superstate(superstate = "busy", entry_action = "enter_prep_milk")]
    fn prep_milk(event: &MachineEvent) -> Response<State> {
        use Response::*;

        match event {
            MachineEvent::Threshold(ThresholdReading {
                gauge: Gauge::Milk,
                value,
            }) if *value < 1 => Transition(State::milk_empty()),
            _ => Super,
        }
    }

    #[state(
        superstate = "prep_milk",
        entry_action = "enter_prep_milk_timed",
        exit_action = "exit_timed_phase"
    )]
    fn prep_milk_timed(context: &mut MachineContext, event: &MachineEvent) -> Response<State> {
        use Response::*;

        match event {
            MachineEvent::TimerElapsed(token) if context.timer.accepts(*token) => {
                Transition(State::command_mode())
            }
            _ => Super,
        }
    }

    #[state(superstate = "busy")]
    fn milk_empty(event: &MachineEvent) -> Response<State> {
        use Response::*;

        match event {
            MachineEvent::Threshold(ThresholdReading {
                gauge: Gauge::Milk,
                value,
            }) if *value > 0 => Transition(State::prep_milk_timed()),
            _ => Super,
        }
    }

    #[action]
    fn enter_self_check_settling(context: &mut MachineContext) {
        context.arm_timer(TimedPhase::SelfCheck);
    }

    #[action]
    fn enter_grinding_timed(context: &mut MachineContext) {
        context.arm_timer(TimedPhase::Grinding);
    }

    #[action]
    fn enter_brewing_timed(context: &mut MachineContext) {
        context.arm_timer(TimedPhase::Brewing);
    }

    #[action]
    fn enter_prep_milk_timed(context: &mut MachineContext) {
        context.arm_timer(TimedPhase::MilkPrep);
    }

    #[action]
    fn exit_timed_phase(context: &mut MachineContext) {
        context.timer.cancel();
    }

    #[action]
    fn enter_stand_by(context: &mut MachineContext) {
        // coffee ground left in the chamber goes to the rest bin
        let grounds = core::mem::take(&mut context.ground_coffee);
        debug!("Flushing {}g of coffee ground into the rest bin", grounds);
        context.replenish(Resource::RestBin, grounds);
    }

    #[action]
    fn enter_grinding(context: &mut MachineContext) {
        let PendingOperation::Grind(mut options) = context.pending else {
            error!("Entered grinding without grind options: {:?}", context.pending);
            return;
        };
        info!(
            "Start grinding: {}g {:?} (beans {}/{})",
            options.beans_in_gram,
            options.grind_level,
            context.resources.level(Resource::Beans),
            context.capacity(Resource::Beans)
        );
        let beans = context.consume(Resource::Beans, options.beans_in_gram);
        context.ground_coffee += beans;
        options.beans_in_gram -= beans;
        context.pending = PendingOperation::Grind(options);
    }

    #[action]
    fn enter_brewing(context: &mut MachineContext) {
        let PendingOperation::Brew(mut options) = context.pending else {
            error!("Entered brewing without brew options: {:?}", context.pending);
            return;
        };
        info!(
            "Start brewing: {}ml at {}°C (water {}/{})",
            options.water_ml,
            options.temperature_c,
            context.resources.level(Resource::Water),
            context.capacity(Resource::Water)
        );
        let water = context.consume(Resource::Water, options.water_ml);
        options.water_ml -= water;
        context.pending = PendingOperation::Brew(options);
        context.dispense(water);
    }

    #[action]
    fn enter_prep_milk(context: &mut MachineContext) {
        let PendingOperation::MilkPrep(mut options) = context.pending else {
            error!("Entered milk prep without milk options: {:?}", context.pending);
            return;
        };
        info!(
            "Start prepping milk: {}ml at {}°C, foam: {} (milk {}/{})",
            options.milk_ml,
            options.temperature_c,
            options.foam,
            context.resources.level(Resource::Milk),
            context.capacity(Resource::Milk)
        );
        let milk = context.consume(Resource::Milk, options.milk_ml);
        options.milk_ml -= milk;
        context.pending = PendingOperation::MilkPrep(options);
        context.dispense(milk);
    }

    fn on_transition(&mut self, source: &State, target: &State) {
        let source_state = Self::machine_state(source);
        let target_state = Self::machine_state(target);

        if source_state != target_state {
            info!("🔄 Machine state transition: {:?} -> {:?}", source_state, target_state);
        }
    }

    /// Convert internal State to MachineState for external interface
    pub fn machine_state(state: &State) -> MachineState {
        match state {
            State::Off {} => MachineState::Off,
            State::SelfCheckSettling {} | State::SelfCheckComplete {} => MachineState::SelfCheck,
            State::StandBy {} => MachineState::StandBy,
            State::BinFull {} => MachineState::BinFull,
            State::CleaningRequired {} => MachineState::CleaningRequired,
            State::OverflowFull {} => MachineState::OverflowFull,
            State::CommandMode {} => MachineState::CommandMode,
            State::GrindingTimed {} => MachineState::Grinding,
            State::BeansEmpty {} => MachineState::BeansEmpty,
            State::BrewingTimed {} => MachineState::Brewing,
            State::WaterEmpty {} => MachineState::WaterEmpty,
            State::PrepMilkTimed {} => MachineState::PrepMilk,
            State::MilkEmpty {} => MachineState::MilkEmpty,
        }
    }
}
