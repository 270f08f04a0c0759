use crate::{
    machine::{CoffeeMachine, MachineContext, MachineEvent},
    resources::ResourceStore,
    system::{MachineConfig, Notification, NotificationBus, SettingsStore},
    types::*,
};
use embassy_time::{Duration, Instant};
use log::{debug, info};
use rand::Rng;
use statig::prelude::*;
use std::sync::Arc;

/// Command/query façade of the coffee maker.
///
/// Every command appends to the event queue and then drains it to quiescence
/// before returning, so the state read back afterwards is the settled one.
/// Time only moves through [`CoffeeController::advance`] and
/// [`CoffeeController::advance_to`].
pub struct CoffeeController {
    machine: StateMachine<CoffeeMachine>,
    context: MachineContext,
    bus: Arc<NotificationBus>,
}

impl CoffeeController {
    pub fn new(persistence: Box<dyn SettingsStore>, config: MachineConfig) -> Self {
        Self::with_rng(persistence, config, &mut rand::thread_rng())
    }

    /// Like [`CoffeeController::new`], seeding absent levels from `rng`.
    pub fn with_rng<R: Rng>(
        persistence: Box<dyn SettingsStore>,
        config: MachineConfig,
        rng: &mut R,
    ) -> Self {
        let resources = ResourceStore::load(persistence, &config, rng);
        Self {
            machine: CoffeeMachine::default().state_machine(),
            context: MachineContext::new(resources, config),
            bus: Arc::new(NotificationBus::new()),
        }
    }

    pub fn notifications(&self) -> Arc<NotificationBus> {
        Arc::clone(&self.bus)
    }

    // Commands

    pub fn turn_on(&mut self) {
        info!("🔌 Turning machine on");
        self.post(MachineEvent::TurnOn);
    }

    pub fn turn_off(&mut self) {
        info!("🔌 Turning machine off");
        self.post(MachineEvent::TurnOff);
    }

    pub fn start_command_mode(&mut self) {
        self.post(MachineEvent::Start);
    }

    pub fn cancel_command_mode(&mut self) {
        self.post(MachineEvent::Cancel);
    }

    pub fn finish_command_mode(&mut self) {
        self.post(MachineEvent::Finish);
    }

    pub fn do_grinding(&mut self, options: GrindOptions) {
        self.post(MachineEvent::Grind(options));
    }

    pub fn do_brew(&mut self, options: BrewOptions) {
        self.post(MachineEvent::Brew(options));
    }

    pub fn do_milk_prep(&mut self, options: MilkOptions) {
        self.post(MachineEvent::MilkPrep(options));
    }

    /// Resets the processed-cups counter.
    pub fn clean_the_machine(&mut self) {
        info!("🧽 Cleaning the machine");
        self.context.set_cups_processed(0);
        self.settle();
    }

    pub fn empty_overflow_container(&mut self) {
        self.context.set_level(Resource::Overflow, 0);
        self.settle();
    }

    pub fn empty_rest_bin_container(&mut self) {
        self.context.set_level(Resource::RestBin, 0);
        self.settle();
    }

    pub fn add_water(&mut self, ml: u32) {
        self.context.replenish(Resource::Water, ml);
        self.settle();
    }

    pub fn add_milk(&mut self, ml: u32) {
        self.context.replenish(Resource::Milk, ml);
        self.settle();
    }

    pub fn add_beans(&mut self, grams: u32) {
        self.context.replenish(Resource::Beans, grams);
        self.settle();
    }

    pub fn place_cup(&mut self) {
        self.context.place_cup();
        self.settle();
    }

    pub fn remove_cup(&mut self) {
        self.context.remove_cup();
        self.settle();
    }

    // Queries

    pub fn current_state(&self) -> MachineState {
        CoffeeMachine::machine_state(self.machine.state())
    }

    pub fn is_powered_on(&self) -> bool {
        !matches!(
            self.current_state(),
            MachineState::Off | MachineState::Unknown
        )
    }

    pub fn level(&self, resource: Resource) -> u32 {
        self.context.resources.level(resource)
    }

    pub fn capacity(&self, resource: Resource) -> u32 {
        self.context.resources.capacity(resource)
    }

    pub fn cups_processed(&self) -> u32 {
        self.context.resources.cups_processed()
    }

    pub fn cups_until_cleaning(&self) -> u32 {
        self.context.resources.cleaning_threshold()
    }

    pub fn cup_detected(&self) -> bool {
        self.context.cup.is_present()
    }

    // Clock

    pub fn now(&self) -> Instant {
        self.context.now
    }

    /// Deadline of the armed phase timer, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.context.timer.next_deadline()
    }

    pub fn advance(&mut self, duration: Duration) {
        self.advance_to(self.context.now + duration);
    }

    /// Moves the clock forward to `target`, firing every timer that falls due
    /// on the way and draining the queue after each one.
    pub fn advance_to(&mut self, target: Instant) {
        while let Some(deadline) = self.next_deadline().filter(|deadline| *deadline <= target) {
            self.context.now = deadline;
            if let Some(token) = self.context.timer.fire_due(deadline) {
                self.post(MachineEvent::TimerElapsed(token));
            }
        }
        if target > self.context.now {
            self.context.now = target;
        }
    }

    fn post(&mut self, event: MachineEvent) {
        self.context.post(event);
        self.settle();
    }

    /// Publishes pending notifications and runs the queue until it is empty.
    fn settle(&mut self) {
        self.publish_outputs();
        while let Some(event) = self.context.queue.pop_front() {
            self.dispatch(event);
        }
    }

    fn dispatch(&mut self, event: MachineEvent) {
        let previous_state = self.current_state();

        let _ = self.machine.handle_with_context(&event, &mut self.context);

        let new_state = self.current_state();
        if previous_state != new_state {
            self.context.notify(Notification::StateChanged(new_state));
            if new_state != MachineState::Off {
                self.context.run_self_check();
            }
        } else {
            debug!("{:?} left state {:?} unchanged", event, new_state);
        }

        self.publish_outputs();
    }

    fn publish_outputs(&mut self) {
        for notification in self.context.take_outputs() {
            self.bus.publish(notification);
        }
    }
}
