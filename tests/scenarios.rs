//! End-to-end behaviour of the controller against an in-memory store.

use brewmaster::system::{
    JsonFileStore, MachineConfig, MemoryStore, Notification, SettingKey, SettingsStore,
};
use brewmaster::{
    BrewOptions, CoffeeController, GrindLevel, GrindOptions, MachineState, MilkOptions, Resource,
};
use embassy_time::{Duration, Instant};
use rand::{rngs::StdRng, SeedableRng};

struct Levels {
    water: u32,
    milk: u32,
    beans: u32,
    rest_bin: u32,
    overflow: u32,
    cups: u32,
}

const NOMINAL: Levels = Levels {
    water: 1000,
    milk: 500,
    beans: 300,
    rest_bin: 0,
    overflow: 0,
    cups: 0,
};

fn memory_store(levels: &Levels) -> MemoryStore {
    MemoryStore::with_values(&[
        (SettingKey::WaterLevel, levels.water),
        (SettingKey::MilkLevel, levels.milk),
        (SettingKey::BeansLevel, levels.beans),
        (SettingKey::RestBinLevel, levels.rest_bin),
        (SettingKey::OverflowLevel, levels.overflow),
        (SettingKey::CupsProcessed, levels.cups),
    ])
}

fn controller(store: &MemoryStore) -> CoffeeController {
    CoffeeController::with_rng(
        Box::new(store.clone()),
        MachineConfig::default(),
        &mut StdRng::seed_from_u64(11),
    )
}

fn in_command_mode(levels: &Levels) -> CoffeeController {
    let mut controller = controller(&memory_store(levels));
    controller.turn_on();
    controller.start_command_mode();
    assert_eq!(controller.current_state(), MachineState::CommandMode);
    controller
}

#[test]
fn turn_on_settles_into_standby() {
    let mut controller = controller(&memory_store(&NOMINAL));
    assert_eq!(controller.current_state(), MachineState::Off);

    controller.turn_on();
    controller.advance(Duration::from_millis(1234));
    assert_eq!(controller.current_state(), MachineState::StandBy);
}

#[test]
fn grinding_without_beans_suspends() {
    let mut controller = in_command_mode(&Levels { beans: 0, ..NOMINAL });

    controller.do_grinding(GrindOptions::new(50, GrindLevel::Medium));
    assert_eq!(controller.current_state(), MachineState::BeansEmpty);
    assert_eq!(controller.level(Resource::Beans), 0);
    assert_eq!(controller.next_deadline(), None);
}

#[test]
fn resumed_grinding_takes_the_residue_and_restarts_its_delay() {
    let mut controller = in_command_mode(&Levels { beans: 10, ..NOMINAL });

    controller.do_grinding(GrindOptions::new(18, GrindLevel::Fine));
    assert_eq!(controller.current_state(), MachineState::BeansEmpty);
    assert_eq!(controller.level(Resource::Beans), 0);

    controller.advance(Duration::from_millis(1000));
    controller.add_beans(100);
    assert_eq!(controller.current_state(), MachineState::Grinding);
    assert_eq!(controller.level(Resource::Beans), 92);
    assert_eq!(controller.next_deadline(), Some(Instant::from_millis(3500)));

    controller.advance(Duration::from_millis(2500));
    assert_eq!(controller.current_state(), MachineState::CommandMode);

    controller.finish_command_mode();
    assert_eq!(controller.level(Resource::RestBin), 18);
}

#[test]
fn finishing_the_last_cup_requires_cleaning() {
    let mut controller = in_command_mode(&Levels { cups: 24, ..NOMINAL });

    controller.finish_command_mode();
    assert_eq!(controller.cups_processed(), 25);
    assert_eq!(controller.current_state(), MachineState::CleaningRequired);

    // no way out but cleaning
    controller.start_command_mode();
    controller.advance(Duration::from_secs(10));
    assert_eq!(controller.current_state(), MachineState::CleaningRequired);
}

#[test]
fn cleaning_returns_to_standby() {
    let mut controller = controller(&memory_store(&Levels { cups: 30, ..NOMINAL }));
    controller.turn_on();
    assert_eq!(controller.current_state(), MachineState::CleaningRequired);

    let bus = controller.notifications();
    let mut subscriber = bus.subscriber().unwrap();
    controller.clean_the_machine();

    assert_eq!(controller.cups_processed(), 0);
    assert_eq!(controller.current_state(), MachineState::StandBy);
    let notifications = subscriber.drain();
    assert_eq!(notifications[0], Notification::CupsProcessedChanged(0));
    assert!(notifications.contains(&Notification::StateChanged(MachineState::StandBy)));
}

#[test]
fn cleaning_mid_cycle_only_resets_the_counter() {
    let mut controller = in_command_mode(&Levels { cups: 7, ..NOMINAL });
    controller.clean_the_machine();
    assert_eq!(controller.cups_processed(), 0);
    assert_eq!(controller.current_state(), MachineState::CommandMode);
}

#[test]
fn levels_survive_a_restart() {
    let store = memory_store(&NOMINAL);
    {
        let mut controller = controller(&store);
        controller.turn_on();
        controller.start_command_mode();
        controller.do_grinding(GrindOptions::new(18, GrindLevel::Medium));
        controller.advance(Duration::from_secs(3));
        controller.do_brew(BrewOptions::new(40, 95));
        controller.advance(Duration::from_secs(4));
        controller.finish_command_mode();
    }

    let reloaded = controller(&store);
    assert_eq!(reloaded.level(Resource::Beans), 282);
    assert_eq!(reloaded.level(Resource::Water), 960);
    assert_eq!(reloaded.level(Resource::Milk), 500);
    assert_eq!(reloaded.level(Resource::RestBin), 18);
    assert_eq!(reloaded.level(Resource::Overflow), 40);
    assert_eq!(reloaded.cups_processed(), 1);
    assert_eq!(reloaded.current_state(), MachineState::Off);
}

#[test]
fn levels_survive_a_restart_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    {
        let mut store = JsonFileStore::open(&path).unwrap();
        for key in SettingKey::ALL {
            store.save(key, 5);
        }
        let mut controller = CoffeeController::with_rng(
            Box::new(store),
            MachineConfig::default(),
            &mut StdRng::seed_from_u64(1),
        );
        controller.add_milk(100);
    }

    let store = JsonFileStore::open(&path).unwrap();
    let controller = CoffeeController::with_rng(
        Box::new(store),
        MachineConfig::default(),
        &mut StdRng::seed_from_u64(2),
    );
    assert_eq!(controller.level(Resource::Milk), 105);
    assert_eq!(controller.level(Resource::Water), 5);
    assert_eq!(controller.cups_processed(), 5);
}

#[test]
fn brewing_without_a_cup_spills_into_overflow() {
    let mut controller = in_command_mode(&NOMINAL);

    controller.do_brew(BrewOptions::new(120, 95));
    assert_eq!(controller.current_state(), MachineState::Brewing);
    assert_eq!(controller.level(Resource::Water), 880);
    assert_eq!(controller.level(Resource::Overflow), 120);

    controller.advance(Duration::from_millis(3003));
    controller.place_cup();
    controller.do_milk_prep(MilkOptions::new(100, 85, true));
    assert_eq!(controller.current_state(), MachineState::PrepMilk);
    assert_eq!(controller.level(Resource::Milk), 400);
    assert_eq!(controller.level(Resource::Overflow), 120);
}

#[test]
fn milk_prep_with_a_cup_returns_to_command_mode_after_its_delay() {
    let mut controller = in_command_mode(&NOMINAL);
    controller.place_cup();
    assert!(controller.cup_detected());

    controller.do_milk_prep(MilkOptions::new(150, 85, true));
    assert_eq!(controller.current_state(), MachineState::PrepMilk);
    assert_eq!(controller.level(Resource::Milk), 350);
    assert_eq!(controller.level(Resource::Overflow), 0);

    controller.advance(Duration::from_millis(3499));
    assert_eq!(controller.current_state(), MachineState::PrepMilk);
    controller.advance(Duration::from_millis(1));
    assert_eq!(controller.current_state(), MachineState::CommandMode);
    assert_eq!(controller.next_deadline(), None);

    controller.remove_cup();
    assert!(!controller.cup_detected());
}

#[test]
fn spillage_can_fill_the_overflow_tray() {
    let mut controller = in_command_mode(&Levels { overflow: 650, ..NOMINAL });

    controller.do_brew(BrewOptions::new(100, 95));
    assert_eq!(controller.level(Resource::Overflow), 700);
    controller.advance(Duration::from_secs(4));
    assert_eq!(controller.current_state(), MachineState::CommandMode);

    controller.finish_command_mode();
    assert_eq!(controller.current_state(), MachineState::OverflowFull);

    controller.empty_overflow_container();
    assert_eq!(controller.current_state(), MachineState::StandBy);
}

#[test]
fn running_out_of_water_and_milk_suspends_until_refilled() {
    let mut controller = in_command_mode(&Levels { water: 20, milk: 0, ..NOMINAL });
    controller.place_cup();

    controller.do_brew(BrewOptions::new(40, 95));
    assert_eq!(controller.current_state(), MachineState::WaterEmpty);
    controller.add_water(100);
    assert_eq!(controller.current_state(), MachineState::Brewing);
    assert_eq!(controller.level(Resource::Water), 80);
    controller.advance(Duration::from_secs(4));

    controller.do_milk_prep(MilkOptions::new(50, 85, false));
    assert_eq!(controller.current_state(), MachineState::MilkEmpty);
    controller.add_milk(60);
    assert_eq!(controller.current_state(), MachineState::PrepMilk);
    assert_eq!(controller.level(Resource::Milk), 10);
}

#[test]
fn cancel_from_any_busy_state_counts_a_cup() {
    let mut controller = in_command_mode(&Levels { beans: 0, ..NOMINAL });
    controller.do_grinding(GrindOptions::new(18, GrindLevel::Medium));
    assert_eq!(controller.current_state(), MachineState::BeansEmpty);

    controller.cancel_command_mode();
    assert_eq!(controller.current_state(), MachineState::StandBy);
    assert_eq!(controller.cups_processed(), 1);

    controller.start_command_mode();
    controller.cancel_command_mode();
    assert_eq!(controller.cups_processed(), 2);

    // nothing to cancel in standby
    controller.cancel_command_mode();
    assert_eq!(controller.cups_processed(), 2);
}

#[test]
fn cancelled_phase_timer_never_fires() {
    let mut controller = in_command_mode(&NOMINAL);
    controller.do_brew(BrewOptions::new(40, 95));
    controller.cancel_command_mode();
    assert_eq!(controller.next_deadline(), None);

    controller.start_command_mode();
    controller.advance(Duration::from_secs(10));
    assert_eq!(controller.current_state(), MachineState::CommandMode);
}

#[test]
fn notifications_fire_only_on_change() {
    let mut controller = controller(&memory_store(&NOMINAL));
    let bus = controller.notifications();
    let mut subscriber = bus.subscriber().unwrap();

    controller.add_water(0);
    controller.empty_rest_bin_container();
    controller.remove_cup();
    assert_eq!(subscriber.drain(), vec![]);

    controller.place_cup();
    controller.place_cup();
    controller.add_water(10);
    assert_eq!(
        subscriber.drain(),
        vec![
            Notification::CupPresenceChanged(true),
            Notification::LevelChanged {
                resource: Resource::Water,
                level: 1010,
            },
        ]
    );

    controller.turn_on();
    assert_eq!(
        subscriber.drain(),
        vec![
            Notification::StateChanged(MachineState::SelfCheck),
            Notification::StateChanged(MachineState::StandBy),
        ]
    );
}

#[test]
fn booting_into_a_full_bin_escalates() {
    let mut controller = controller(&memory_store(&Levels { rest_bin: 600, ..NOMINAL }));
    controller.turn_on();
    assert_eq!(controller.current_state(), MachineState::BinFull);
    assert_eq!(controller.next_deadline(), None);

    controller.empty_rest_bin_container();
    assert_eq!(controller.current_state(), MachineState::StandBy);
}

#[test]
fn turning_off_works_from_every_powered_state() {
    let mut controller = controller(&memory_store(&Levels { rest_bin: 600, ..NOMINAL }));
    controller.turn_on();
    controller.turn_off();
    assert_eq!(controller.current_state(), MachineState::Off);
    assert!(!controller.is_powered_on());
    assert_eq!(controller.cups_processed(), 0);
}
