use crate::config::Config;
use crate::console::{self, AdminAction, Command};
use crate::controller::{Controller, ReadingRouter};
use crate::leaderboard::{self, BoardQuery};
use crate::poller::{DevicePoller, HttpSource, PollerHandle};
use crate::reading::ReadingBatch;
use crossbeam_channel::{never, select, Receiver};
use std::path::PathBuf;

/// What the foreground loop reacts to
#[derive(Debug)]
pub enum Message {
    Readings(ReadingBatch),
    PollerClosed,
    Line(String),
    InputClosed,
}

/// Foreground state: the controller plus the poller feeding it
pub struct PedalPower {
    controller: Controller,
    router: ReadingRouter,
    config: Config,
    config_path: PathBuf,
    poller: Option<PollerHandle>,
    readings: Receiver<ReadingBatch>,
}

impl PedalPower {
    pub fn new(controller: Controller, config: Config, config_path: PathBuf) -> Self {
        let mut app = PedalPower {
            router: controller.router(),
            controller,
            config,
            config_path,
            poller: None,
            readings: never(),
        };
        app.restart_poller();
        app
    }

    /// Replace the running poller with one for the current device URL
    fn restart_poller(&mut self) {
        // Dropping the handle stops and joins the old thread
        self.poller = None;
        self.readings = never();

        match HttpSource::new(self.config.device_url.clone(), self.config.request_timeout()) {
            Ok(source) => {
                let (poller, readings) = DevicePoller::new(source, self.config.poll_interval());
                self.poller = Some(poller.spawn());
                self.readings = readings;
                log::info!("Polling {}", self.config.device_url);
            }
            Err(e) => log::error!("Device polling disabled: {}", e),
        }
    }

    /// Multiplex readings and operator input until the operator quits
    pub fn run(mut self, lines: Receiver<String>) {
        println!("{}", console::HELP);

        loop {
            let message = select! {
                recv(self.readings) -> batch => match batch {
                    Ok(batch) => Message::Readings(batch),
                    Err(_) => Message::PollerClosed,
                },
                recv(lines) -> line => match line {
                    Ok(line) => Message::Line(line),
                    Err(_) => Message::InputClosed,
                },
            };

            if !self.update(message) {
                break;
            }
        }

        self.shutdown();
    }

    /// Returns `false` when the loop should end
    pub fn update(&mut self, message: Message) -> bool {
        match message {
            Message::Readings(batch) => {
                self.router.apply(&batch);
                true
            }
            Message::PollerClosed => {
                log::warn!("Device poller stopped; readings are no longer collected");
                self.readings = never();
                true
            }
            Message::Line(line) => {
                if line.trim().is_empty() {
                    return true;
                }
                match line.parse::<Command>() {
                    Ok(command) => self.execute(command),
                    Err(e) => {
                        println!("{}", e);
                        true
                    }
                }
            }
            Message::InputClosed => false,
        }
    }

    fn execute(&mut self, command: Command) -> bool {
        match command {
            Command::Start { cycle, student } => {
                match self.controller.start_session(cycle, &student) {
                    Ok(()) => println!("{} started on {}", student, cycle),
                    Err(e) => println!("Error: {}", e),
                }
            }
            Command::Stop(cycle) => match self.controller.stop_session(cycle) {
                Ok(Some(session)) => println!(
                    "{} logged {:.3} kWh in {}s",
                    session.student, session.energy_kwh, session.duration_secs
                ),
                Ok(None) => println!("{} is not running", cycle),
                Err(e) => println!("Error: {}", e),
            },
            Command::Reset => match self.controller.reset_all() {
                Ok(stopped) => println!("Stopped {} sessions", stopped),
                Err(e) => println!("Error: {}", e),
            },
            Command::Status => {
                let now = chrono::Local::now().naive_local();
                let rows = self.controller.live_rows_at(now);
                println!("{}", console::render_live(&rows, &self.controller.status_line()));
            }
            Command::Board(query) => {
                let store = self.controller.store();
                let sessions = store.load_all();
                let view = leaderboard::query(&sessions, &store.list_roster(), &query);
                print!("{}", console::render_board(&view));
                if query == BoardQuery::AllStudents {
                    let names = leaderboard::students_with_history(&sessions);
                    if !names.is_empty() {
                        println!("Details: board <{}>", names.join("|"));
                    }
                }
            }
            Command::Students => {
                if self.controller.roster().is_empty() {
                    println!("Roster is empty");
                }
                for name in self.controller.roster() {
                    println!("{}", name);
                }
            }
            Command::Refresh => {
                self.controller.refresh_roster();
                println!("Student list refreshed ({})", self.controller.roster().len());
            }
            Command::Admin { password, action } => self.administer(&password, action),
            Command::Help => println!("{}", console::HELP),
            Command::Quit => return false,
        }
        true
    }

    fn administer(&mut self, password: &str, action: AdminAction) {
        let result = match action {
            AdminAction::AddStudent(name) => self
                .controller
                .admin(password)
                .and_then(|mut admin| admin.add_student(&name)),
            AdminAction::RemoveStudent(name) => self
                .controller
                .admin(password)
                .and_then(|mut admin| admin.remove_student(&name)),
            AdminAction::SetDevice(url) => match self.controller.authorize(password) {
                Ok(()) => {
                    self.set_device(url);
                    Ok(())
                }
                Err(e) => Err(e),
            },
        };

        match result {
            Ok(()) => println!("Saved"),
            Err(e) => println!("Error: {}", e),
        }
    }

    fn set_device(&mut self, url: String) {
        self.config.device_url = url;
        if let Err(e) = self.config.save_to(&self.config_path) {
            log::error!("{}", e);
            println!("Device changed for this run only: {}", e);
        }
        self.restart_poller();
    }

    /// Running sessions are closed and logged rather than lost
    fn shutdown(mut self) {
        if self.controller.active_count() > 0 {
            match self.controller.reset_all() {
                Ok(stopped) => log::info!("Logged {} running sessions on exit", stopped),
                Err(e) => log::error!("Could not log running sessions on exit: {}", e),
            }
        }
        if let Some(poller) = self.poller.take() {
            poller.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::SharedPassword;
    use crate::energy::ScaledSum;
    use crate::reading::ChannelReading;
    use crate::error::StoreError;
    use crate::session::Session;
    use crate::store::{open_store, LogLayout, SessionStore};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    /// Counts full log reads on top of a real store
    struct CountingStore {
        inner: Box<dyn SessionStore>,
        loads: Arc<AtomicUsize>,
    }

    impl SessionStore for CountingStore {
        fn append(&self, session: &Session) -> Result<(), StoreError> {
            self.inner.append(session)
        }

        fn load_all(&self) -> Vec<Session> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.inner.load_all()
        }

        fn list_roster(&self) -> Vec<String> {
            self.inner.list_roster()
        }

        fn save_roster(&self, names: &[String]) -> Result<(), StoreError> {
            self.inner.save_roster(names)
        }
    }

    /// App without a poller, so no network is touched
    fn offline_app(dir: &std::path::Path) -> PedalPower {
        app_with_store(dir, open_store(LogLayout::Flat, dir))
    }

    fn app_with_store(dir: &std::path::Path, store: Box<dyn SessionStore>) -> PedalPower {
        let controller = Controller::new(
            8,
            Arc::new(ScaledSum { divisor: 1000.0 }),
            store,
            Box::new(SharedPassword::new("pw")),
        );
        PedalPower {
            router: controller.router(),
            controller,
            config: Config::default(),
            config_path: dir.join("config.toml"),
            poller: None,
            readings: never(),
        }
    }

    fn line(app: &mut PedalPower, text: &str) -> bool {
        app.update(Message::Line(text.to_string()))
    }

    #[test]
    fn test_commands_drive_controller() {
        let dir = tempdir().unwrap();
        let mut app = offline_app(dir.path());

        assert!(line(&mut app, "admin pw add Ada"));
        assert!(line(&mut app, "start 1 Ada"));
        assert!(app.update(Message::Readings(ReadingBatch {
            channels: vec![ChannelReading { channel: "C1".into(), voltage: 500.0 }],
        })));
        assert!(line(&mut app, "stop 1"));

        let logged = app.controller.store().load_all();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].energy_kwh, 0.5);
        assert_eq!(app.controller.roster(), ["Ada".to_string()]);
    }

    #[test]
    fn test_bad_input_keeps_running() {
        let dir = tempdir().unwrap();
        let mut app = offline_app(dir.path());

        assert!(line(&mut app, "fly away"));
        assert!(line(&mut app, "admin wrong add Ada"));
        assert!(app.controller.roster().is_empty());
        assert!(app.update(Message::PollerClosed));
        assert!(!line(&mut app, "quit"));
        assert!(!app.update(Message::InputClosed));
    }

    #[test]
    fn test_board_reads_log_once() {
        let dir = tempdir().unwrap();
        let loads = Arc::new(AtomicUsize::new(0));
        let store = CountingStore {
            inner: open_store(LogLayout::Flat, dir.path()),
            loads: Arc::clone(&loads),
        };
        let mut app = app_with_store(dir.path(), Box::new(store));
        line(&mut app, "start 1 Ada");
        line(&mut app, "stop 1");

        loads.store(0, Ordering::SeqCst);
        assert!(line(&mut app, "board"));
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        assert!(line(&mut app, "board Ada"));
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_device_change_is_saved() {
        let dir = tempdir().unwrap();
        let mut app = offline_app(dir.path());

        line(&mut app, "admin pw device http://127.0.0.1:9/");
        assert_eq!(app.config.device_url, "http://127.0.0.1:9/");
        assert!(app.poller.is_some());
        assert_eq!(Config::load_from(&dir.path().join("config.toml")).unwrap().device_url, "http://127.0.0.1:9/");
    }

    #[test]
    fn test_shutdown_logs_running_sessions() {
        let dir = tempdir().unwrap();
        let mut app = offline_app(dir.path());
        line(&mut app, "start 2 Grace");

        let store_dir = dir.path().to_path_buf();
        app.shutdown();
        assert_eq!(open_store(LogLayout::Flat, &store_dir).load_all().len(), 1);
    }
}
