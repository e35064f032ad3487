use chrono::{DateTime, Utc};
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Duration, interval};

mod alert;
mod config;
mod countdown;
mod images;
mod remote;
mod session;
mod ws;

use crate::alert::alert::notify_completion;
use crate::config::config::Config;
use crate::countdown::countdown::{Countdown, TimerEvent, TimerSender, create_timer_channel};
use crate::images::images::ImageStore;
use crate::remote::remote::{SessionRecord, log_session};
use crate::session::clock::{Clock, SystemClock};
use crate::session::session::{Preset, Session, format_time};
use crate::ws::control_server::{self, ControlCommand, ControlResponse, StateSnapshot};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Vec<String> = std::env::args().collect();
    let cfg = Config::load();

    if args.contains(&"--init-config".to_string()) {
        cfg.save()?;
        println!("Wrote config defaults");
        return Ok(());
    }

    // Check if running in daemon mode (WebSocket control server)
    if args.contains(&"--daemon".to_string()) {
        return run_daemon_mode(cfg).await;
    }

    run_cli_mode(cfg, &args).await
}

fn flag_value(args: &[String], long: &str, short: &str) -> Option<String> {
    args.iter()
        .position(|a| a == long || (!short.is_empty() && a == short))
        .and_then(|pos| args.get(pos + 1).cloned())
}

/// Foreground mode: run one preset to completion and exit.
async fn run_cli_mode(cfg: Config, args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let preset_id = flag_value(args, "--preset", "-p")
        .unwrap_or_else(|| format!("{}-{}", cfg.work_minutes, cfg.break_minutes));
    let preset =
        Preset::parse(&preset_id).ok_or_else(|| format!("Unknown preset: {preset_id}"))?;
    let purpose = flag_value(args, "--purpose", "").unwrap_or_default();
    let note = flag_value(args, "--note", "").unwrap_or_default();
    let no_log = args.contains(&"--no-log".to_string());

    println!("🍅 Focus It - Pomodoro Timer");
    println!("======================================================");
    match preset.break_seconds {
        Some(break_seconds) => println!(
            "Pomodoro settings: {}min work / {}min break",
            preset.work_seconds / 60,
            break_seconds / 60
        ),
        None => println!("Standalone timer: {}min", preset.work_seconds / 60),
    }
    println!("Press Ctrl+C to abandon the session\n");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mut session = Session::new(preset);
    let mut driver = Countdown::new(cfg.poll_interval_ms);
    let (timer_tx, mut timer_rx) = create_timer_channel();
    let mut log_tasks: Vec<JoinHandle<()>> = Vec::new();
    let mut alert_tasks: Vec<std::thread::JoinHandle<()>> = Vec::new();

    let mut started_at = clock.now();
    session.start();
    driver.start(
        session.remaining_seconds,
        Arc::clone(&clock),
        timer_tx.clone(),
    );

    while let Some(event) = timer_rx.recv().await {
        match event {
            TimerEvent::Tick(remaining) => {
                session.sync_remaining(remaining);
                print!(
                    "\r{} {} {}  ",
                    session.phase.emoji(),
                    session.phase.as_str(),
                    format_time(remaining)
                );
                let _ = std::io::stdout().flush();
            }
            TimerEvent::Expired => {
                let completion = session.complete();
                println!();
                alert_tasks.push(notify_completion(completion.finished));
                if completion.log_session && !no_log {
                    let record = SessionRecord::new(started_at, clock.now(), &purpose, &note);
                    log_tasks.push(log_session(cfg.log_endpoint.clone(), record));
                }
                match completion.auto_break {
                    Some(break_seconds) => {
                        println!(
                            "☕ Work session complete - starting {}-minute break",
                            break_seconds / 60
                        );
                        started_at = clock.now();
                        session.start();
                        driver.start(
                            session.remaining_seconds,
                            Arc::clone(&clock),
                            timer_tx.clone(),
                        );
                    }
                    None => break,
                }
            }
        }
    }

    // Let the alarm finish and any in-flight session log land before the
    // process goes away.
    for task in log_tasks {
        let _ = task.await;
    }
    for task in alert_tasks {
        let _ = task.join();
    }
    println!("🛑 Session finished");
    Ok(())
}

/// Run in daemon mode - WebSocket control server + timer event loop
async fn run_daemon_mode(cfg: Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("🍅 Focus It - Daemon Mode");
    println!("======================================================");
    println!(
        "Pomodoro settings: {}min work / {}min break",
        cfg.work_minutes, cfg.break_minutes
    );
    println!("Control server on ws://{}", cfg.ws_bind);
    println!("Session logs go to {}\n", cfg.log_endpoint);

    let addr: SocketAddr = cfg.ws_bind.parse()?;
    let listener = TcpListener::bind(&addr).await?;

    let (command_tx, mut command_rx) = control_server::create_command_channel();
    let (state_tx, state_rx) = watch::channel(StateSnapshot::default());
    tokio::spawn(async move {
        if let Err(e) = control_server::start_control_server(listener, command_tx, state_rx).await
        {
            log::error!("Control server error: {e}");
        }
    });

    let (timer_tx, mut timer_rx) = create_timer_channel();
    let (slide_tx, mut slide_rx) = mpsc::unbounded_channel();

    let preset = Preset {
        work_seconds: cfg.work_minutes * 60,
        break_seconds: Some(cfg.break_minutes * 60),
    };
    let mut daemon = TimerDaemon::new(cfg, preset, timer_tx, slide_tx, state_tx);
    daemon.push_state();

    loop {
        tokio::select! {
            Some(envelope) = command_rx.recv() => {
                let response = daemon.handle_command(envelope.command);
                if envelope.reply.send(response).is_err() {
                    log::debug!("Command reply dropped");
                }
            }
            Some(event) = timer_rx.recv() => {
                daemon.handle_timer_event(event);
            }
            Some(_) = slide_rx.recv() => {
                daemon.rotate_background();
            }
        }
    }
}

/// Everything the daemon event loop owns. All timer state is mutated here
/// and nowhere else; the countdown and slideshow tasks only feed events
/// back through their channels.
struct TimerDaemon {
    cfg: Config,
    clock: Arc<dyn Clock>,
    session: Session,
    driver: Countdown,
    timer_tx: TimerSender,
    store: ImageStore,
    purpose: String,
    note: String,
    started_at: DateTime<Utc>,
    background: Option<String>,
    slideshow: Option<JoinHandle<()>>,
    slide_tx: mpsc::UnboundedSender<()>,
    state_tx: watch::Sender<StateSnapshot>,
}

impl TimerDaemon {
    fn new(
        cfg: Config,
        preset: Preset,
        timer_tx: TimerSender,
        slide_tx: mpsc::UnboundedSender<()>,
        state_tx: watch::Sender<StateSnapshot>,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = ImageStore::open(
            ImageStore::default_dir(),
            cfg.max_image_bytes,
            cfg.max_gif_bytes,
            cfg.storage_quota_bytes,
        );
        let background = store.pick_random().map(str::to_string);
        let driver = Countdown::new(cfg.poll_interval_ms);
        let started_at = clock.now();
        TimerDaemon {
            session: Session::new(preset),
            cfg,
            clock,
            driver,
            timer_tx,
            store,
            purpose: String::new(),
            note: String::new(),
            started_at,
            background,
            slideshow: None,
            slide_tx,
            state_tx,
        }
    }

    fn handle_command(&mut self, command: ControlCommand) -> ControlResponse {
        let response = match command {
            ControlCommand::Start => {
                if self.start_timer() {
                    ok("Timer started")
                } else {
                    ok("Already running")
                }
            }
            ControlCommand::Pause => {
                if self.pause_timer() {
                    ok("Timer paused")
                } else {
                    ok("Not running")
                }
            }
            ControlCommand::Reset => {
                self.driver.cancel();
                self.stop_slideshow();
                self.session.reset();
                ok("Timer reset")
            }
            ControlCommand::Preset { id } => match Preset::parse(&id) {
                Some(preset) => {
                    self.driver.cancel();
                    self.stop_slideshow();
                    self.session.select_preset(preset);
                    ok(format!("Preset {id} selected"))
                }
                None => fail(format!("Unknown preset: {id}")),
            },
            ControlCommand::Purpose { value } => {
                self.purpose = value;
                ok("Purpose updated")
            }
            ControlCommand::Note { value } => {
                self.note = value;
                ok("Note updated")
            }
            ControlCommand::AddImages { images } => {
                let report = self.store.add(images);
                self.background = self.store.pick_random().map(str::to_string);
                ControlResponse {
                    success: report.rejected == 0,
                    message: Some(format!(
                        "Stored {}, rejected {}, evicted {} image(s)",
                        report.stored, report.rejected, report.evicted
                    )),
                }
            }
            ControlCommand::ClearImages => {
                self.store.clear();
                self.background = None;
                ok("Images cleared")
            }
            ControlCommand::Status => ok(format!(
                "{} {} {}",
                self.session.phase.emoji(),
                self.session.phase.as_str(),
                format_time(self.session.remaining_seconds)
            )),
        };
        self.push_state();
        response
    }

    fn handle_timer_event(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::Tick(remaining) => {
                self.session.sync_remaining(remaining);
            }
            TimerEvent::Expired => {
                // A poller cancelled mid-flight can still have an expiry
                // queued; a stopped session ignores it.
                if !self.session.is_running {
                    return;
                }
                let completion = self.session.complete();
                notify_completion(completion.finished);
                if completion.log_session {
                    let record = SessionRecord::new(
                        self.started_at,
                        self.clock.now(),
                        &self.purpose,
                        &self.note,
                    );
                    log_session(self.cfg.log_endpoint.clone(), record);
                }
                if completion.auto_break.is_some() {
                    self.start_timer();
                } else {
                    self.stop_slideshow();
                }
            }
        }
        self.push_state();
    }

    fn start_timer(&mut self) -> bool {
        if !self.session.start() {
            return false;
        }
        self.started_at = self.clock.now();
        self.driver.start(
            self.session.remaining_seconds,
            Arc::clone(&self.clock),
            self.timer_tx.clone(),
        );
        self.start_slideshow();
        true
    }

    fn pause_timer(&mut self) -> bool {
        if !self.session.pause() {
            return false;
        }
        self.driver.cancel();
        self.stop_slideshow();
        true
    }

    fn start_slideshow(&mut self) {
        self.stop_slideshow();
        if self.store.is_empty() || self.cfg.slideshow_interval_secs == 0 {
            return;
        }
        let tx = self.slide_tx.clone();
        let period = Duration::from_secs(self.cfg.slideshow_interval_secs);
        self.slideshow = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.tick().await; // fires immediately; the first rotation waits a full period
            loop {
                ticker.tick().await;
                if tx.send(()).is_err() {
                    break;
                }
            }
        }));
    }

    fn stop_slideshow(&mut self) {
        if let Some(handle) = self.slideshow.take() {
            handle.abort();
        }
    }

    fn rotate_background(&mut self) {
        self.background = self.store.pick_random().map(str::to_string);
        self.push_state();
    }

    fn push_state(&self) {
        let snapshot = StateSnapshot {
            phase: self.session.phase.as_str().to_string(),
            remaining_seconds: self.session.remaining_seconds,
            display: format_time(self.session.remaining_seconds),
            is_running: self.session.is_running,
            image_count: self.store.len(),
            background: self.background.clone(),
        };
        self.state_tx.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });
    }
}

fn ok(message: impl Into<String>) -> ControlResponse {
    ControlResponse {
        success: true,
        message: Some(message.into()),
    }
}

fn fail(message: impl Into<String>) -> ControlResponse {
    ControlResponse {
        success: false,
        message: Some(message.into()),
    }
}
