use brewmaster::catalog::{bundled_recipes, RecipeCatalog};
use brewmaster::runner::{Command, CommandChannel, MachineRunner};
use brewmaster::system::{JsonFileStore, MachineConfig, NotificationBus};
use brewmaster::{BrewOptions, CoffeeController, GrindLevel, GrindOptions, MilkOptions};
use embassy_executor::Spawner;
use embassy_sync::channel::Channel;
use embassy_time::{Duration, Timer};
use log::{error, info, warn, LevelFilter};
use std::sync::Arc;

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_millis()
        .init();

    info!("☕ Starting brewmaster");

    let commands: Arc<CommandChannel> = Arc::new(Channel::new());
    let mut runner = match build_runner(Arc::clone(&commands)) {
        Ok(runner) => runner,
        Err(e) => {
            error!("Failed to start: {:#}", e);
            std::process::exit(1);
        }
    };

    if spawner
        .spawn(notification_task(runner.controller().notifications()))
        .is_err()
    {
        warn!("Failed to spawn notification task - continuing without change log");
    }
    if let Err(e) = spawner.spawn(barista_task(Arc::clone(&commands))) {
        error!("Failed to spawn barista task: {:?}", e);
        std::process::exit(1);
    }

    runner.run().await;
    std::process::exit(0);
}

fn build_runner(commands: Arc<CommandChannel>) -> anyhow::Result<MachineRunner> {
    // optional config file as first argument
    let config = match std::env::args().nth(1) {
        Some(path) => MachineConfig::from_json_file(path)?,
        None => MachineConfig::default(),
    };

    let store = JsonFileStore::open(&config.state_file)?;
    let catalog = RecipeCatalog::new(config.catalog_timeout());
    let controller = CoffeeController::new(Box::new(store), config);

    Ok(MachineRunner::new(Box::new(controller), catalog, commands))
}

#[embassy_executor::task]
async fn notification_task(bus: Arc<NotificationBus>) {
    let mut subscriber = match bus.subscriber() {
        Ok(subscriber) => subscriber,
        Err(e) => {
            warn!("No notification subscriber: {:?}", e);
            return;
        }
    };

    loop {
        let notification = subscriber.next().await;
        info!("📣 {:?}", notification);
    }
}

/// Scripted customer: tops everything up and makes one cappuccino.
#[embassy_executor::task]
async fn barista_task(commands: Arc<CommandChannel>) {
    let (grind, brew, milk) = match bundled_recipes() {
        Ok(recipes) => match recipes.into_iter().find(|r| r.name == "Cappuccino") {
            Some(recipe) => (
                recipe.grind_options(),
                recipe.brew_options(),
                recipe.milk_options().unwrap_or_default(),
            ),
            None => cappuccino(),
        },
        Err(e) => {
            warn!("Bundled recipes unreadable: {:?}", e);
            cappuccino()
        }
    };

    let script = [
        (Command::TurnOn, 0),
        (Command::EmptyRestBinContainer, 0),
        (Command::EmptyOverflowContainer, 0),
        (Command::CleanTheMachine, 0),
        (Command::AddWater(500), 0),
        (Command::AddBeans(200), 0),
        (Command::AddMilk(300), 0),
        (Command::RequestRecipes, 1500),
        (Command::StartCommandMode, 0),
        (Command::DoGrinding(grind), 2600),
        (Command::PlaceCup, 0),
        (Command::DoBrew(brew), 3100),
        (Command::DoMilkPrep(milk), 3600),
        (Command::FinishCommandMode, 500),
        (Command::RemoveCup, 500),
        (Command::TurnOff, 0),
        (Command::Shutdown, 0),
    ];

    for (command, pause_ms) in script {
        commands.send(command).await;
        if pause_ms > 0 {
            Timer::after(Duration::from_millis(pause_ms)).await;
        }
    }
}

fn cappuccino() -> (GrindOptions, BrewOptions, MilkOptions) {
    (
        GrindOptions::new(18, GrindLevel::Medium),
        BrewOptions::new(40, 95),
        MilkOptions::new(120, 85, true),
    )
}
