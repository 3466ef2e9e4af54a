mod access;
mod app;
mod config;
mod console;
mod controller;
mod energy;
mod error;
mod leaderboard;
mod poller;
mod reading;
mod session;
mod store;
mod tracker;

use access::SharedPassword;
use app::PedalPower;
use config::Config;
use controller::Controller;
use energy::EnergyModel;
use std::io::BufRead;
use std::sync::Arc;

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = Config::config_path();
    let config = Config::load_from(&config_path).unwrap_or_else(|e| {
        log::error!("{}; falling back to defaults", e);
        Config::default()
    });

    let data_dir = config.data_dir();
    log::info!("Session data in {}", data_dir.display());
    let store = store::open_store(config.log_layout, &data_dir);

    let model: Arc<dyn EnergyModel> = Arc::from(config.energy.build());
    let controller = Controller::new(
        config.cycle_count,
        model,
        store,
        Box::new(SharedPassword::new(config.admin_password.clone())),
    );

    // Stdin blocks, so it gets its own thread and feeds the event loop
    let (line_sender, lines) = crossbeam_channel::unbounded::<String>();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if line_sender.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    log::error!("Failed to read input: {}", e);
                    break;
                }
            }
        }
    });

    PedalPower::new(controller, config, config_path).run(lines);
}
