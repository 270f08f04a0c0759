//! Async driver: feeds commands into the controller and wakes up for timers.

use crate::{
    catalog::{CatalogResponse, Recipe, RecipeCatalog},
    controller::CoffeeController,
    types::*,
};
use embassy_futures::select::{select, Either};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};
use embassy_time::{Duration, Instant, Timer};
use log::{debug, info, warn};
use std::sync::Arc;

const IDLE_WAKEUP: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    TurnOn,
    TurnOff,
    StartCommandMode,
    CancelCommandMode,
    FinishCommandMode,
    CleanTheMachine,
    EmptyOverflowContainer,
    EmptyRestBinContainer,
    AddMilk(u32),
    AddWater(u32),
    AddBeans(u32),
    DoGrinding(GrindOptions),
    DoBrew(BrewOptions),
    DoMilkPrep(MilkOptions),
    PlaceCup,
    RemoveCup,
    RequestRecipes,
    Shutdown,
}

pub type CommandChannel = Channel<CriticalSectionRawMutex, Command, 8>;

pub struct MachineRunner {
    controller: Box<CoffeeController>,
    catalog: RecipeCatalog,
    commands: Arc<CommandChannel>,
    recipes: Vec<Recipe>,
}

impl MachineRunner {
    pub fn new(
        controller: Box<CoffeeController>,
        catalog: RecipeCatalog,
        commands: Arc<CommandChannel>,
    ) -> Self {
        Self {
            controller,
            catalog,
            commands,
            recipes: Vec::new(),
        }
    }

    pub fn controller(&self) -> &CoffeeController {
        &self.controller
    }

    /// Recipes from the most recent successful catalog reply.
    pub fn recipes(&self) -> &[Recipe] {
        &self.recipes
    }

    /// Runs until a [`Command::Shutdown`] is received.
    pub async fn run(&mut self) {
        info!("Starting machine runner");
        let commands = Arc::clone(&self.commands);

        loop {
            let wakeup = match self.next_deadline() {
                Some(deadline) => Timer::at(deadline),
                None => Timer::after(IDLE_WAKEUP),
            };

            match select(commands.receive(), wakeup).await {
                Either::First(command) => {
                    self.sync_clock(Instant::now());
                    if !self.apply(command) {
                        break;
                    }
                }
                Either::Second(_) => {
                    self.sync_clock(Instant::now());
                }
            }
        }

        info!("Machine runner stopped in {:?}", self.controller.current_state());
    }

    fn next_deadline(&self) -> Option<Instant> {
        [self.controller.next_deadline(), self.catalog.next_deadline()]
            .into_iter()
            .flatten()
            .min()
    }

    /// Fires controller timers and catalog deadlines up to `now`.
    pub fn sync_clock(&mut self, now: Instant) {
        self.controller.advance_to(now);
        for response in self.catalog.poll(now) {
            self.handle_catalog_response(response);
        }
    }

    /// Applies one command. Returns false on shutdown.
    pub fn apply(&mut self, command: Command) -> bool {
        debug!("Applying {:?}", command);
        let controller = &mut self.controller;
        match command {
            Command::TurnOn => controller.turn_on(),
            Command::TurnOff => controller.turn_off(),
            Command::StartCommandMode => controller.start_command_mode(),
            Command::CancelCommandMode => controller.cancel_command_mode(),
            Command::FinishCommandMode => controller.finish_command_mode(),
            Command::CleanTheMachine => controller.clean_the_machine(),
            Command::EmptyOverflowContainer => controller.empty_overflow_container(),
            Command::EmptyRestBinContainer => controller.empty_rest_bin_container(),
            Command::AddMilk(ml) => controller.add_milk(ml),
            Command::AddWater(ml) => controller.add_water(ml),
            Command::AddBeans(grams) => controller.add_beans(grams),
            Command::DoGrinding(options) => controller.do_grinding(options),
            Command::DoBrew(options) => controller.do_brew(options),
            Command::DoMilkPrep(options) => controller.do_milk_prep(options),
            Command::PlaceCup => controller.place_cup(),
            Command::RemoveCup => controller.remove_cup(),
            Command::RequestRecipes => {
                let id = self.catalog.request(controller.now());
                info!("📖 Requested recipes (#{})", id);
            }
            Command::Shutdown => {
                info!("Shutdown requested");
                return false;
            }
        }
        true
    }

    fn handle_catalog_response(&mut self, response: CatalogResponse) {
        match response.parse() {
            Ok(reply) if reply.is_ok() => {
                let names: Vec<&str> = reply.recipes.iter().map(|r| r.name.as_str()).collect();
                info!("📖 Recipes (#{}): {}", response.request_id, names.join(", "));
                self.recipes = reply.recipes;
            }
            Ok(reply) => {
                warn!(
                    "Recipe request #{} failed: {} {}",
                    response.request_id, reply.return_code, reply.error_message
                );
            }
            Err(e) => {
                warn!("Malformed recipe reply #{}: {:?}", response.request_id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::{MachineConfig, MemoryStore, SettingKey};
    use rand::{rngs::StdRng, SeedableRng};

    fn runner() -> MachineRunner {
        let store = MemoryStore::with_values(&[
            (SettingKey::WaterLevel, 1000),
            (SettingKey::MilkLevel, 500),
            (SettingKey::BeansLevel, 300),
            (SettingKey::RestBinLevel, 0),
            (SettingKey::OverflowLevel, 0),
            (SettingKey::CupsProcessed, 0),
        ]);
        let controller = CoffeeController::with_rng(
            Box::new(store),
            MachineConfig::default(),
            &mut StdRng::seed_from_u64(9),
        );
        let catalog =
            RecipeCatalog::with_rng(Duration::from_millis(4000), StdRng::seed_from_u64(9));
        MachineRunner::new(Box::new(controller), catalog, Arc::new(Channel::new()))
    }

    #[test]
    fn test_commands_drive_the_controller() {
        let mut runner = runner();
        assert!(runner.apply(Command::TurnOn));
        assert!(runner.apply(Command::StartCommandMode));
        assert!(runner.apply(Command::DoGrinding(GrindOptions::new(
            18,
            GrindLevel::Medium
        ))));
        assert_eq!(runner.controller().current_state(), MachineState::Grinding);

        runner.sync_clock(Instant::from_millis(2500));
        assert_eq!(runner.controller().current_state(), MachineState::CommandMode);
        assert!(!runner.apply(Command::Shutdown));
    }

    #[test]
    fn test_recipe_reply_is_kept() {
        let mut runner = runner();
        runner.apply(Command::RequestRecipes);
        assert!(runner.next_deadline().is_some());

        runner.sync_clock(Instant::from_millis(5000));
        assert_eq!(runner.next_deadline(), None);
        // either answered or timed out, never both
        assert!(runner.recipes().is_empty() || runner.recipes().len() == 5);
    }
}
