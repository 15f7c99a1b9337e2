use crate::audio::{AudioSink, OUTPUT_SAMPLE_RATE, Speaker};
use crate::browser::Browser;
use crate::config::{self, Settings};
use crate::logging;
use crate::queue::{QueueEvent, Track, TrackQueue};
use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::io::stdout;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Controller state: the directory browser, the playback queue and what the
/// view needs to draw them.
pub struct App {
    browser: Browser,
    queue: TrackQueue,
    events: Receiver<QueueEvent>,
    settings: Settings,
    pub status: String,
    pub show_help: bool,
    pub dirty: bool,
}

impl App {
    pub fn new(browser: Browser, sink: Box<dyn AudioSink>, settings: Settings) -> Self {
        let (tx, rx) = mpsc::channel();
        let mut queue = TrackQueue::new(sink, tx);
        if settings.volume_change != 0 && !queue.change(settings.volume_change) {
            debug!(volume_change = settings.volume_change, "saved volume ignored");
        }
        Self {
            browser,
            queue,
            events: rx,
            settings,
            status: String::from("Ready"),
            show_help: false,
            dirty: true,
        }
    }

    pub fn browser(&self) -> &Browser {
        &self.browser
    }

    pub fn queue(&self) -> &TrackQueue {
        &self.queue
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Applies end-of-track events that arrived since the last call.
    pub fn pump_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.queue.handle(event);
            self.dirty = true;
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Result<Flow> {
        self.dirty = true;
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Ok(Flow::Quit);
            }
            KeyCode::Char('q') => return Ok(Flow::Quit),
            KeyCode::Up | KeyCode::Char('k') => self.browser.select_prev(),
            KeyCode::Down | KeyCode::Char('j') => self.browser.select_next(),
            KeyCode::Enter => {
                if self.browser.enter()? {
                    self.set_status(format!("Opened {}", self.browser.dir().display()));
                }
            }
            KeyCode::Char('-') => {
                if self.browser.up()? {
                    self.set_status(format!("Opened {}", self.browser.dir().display()));
                }
            }
            KeyCode::Char(' ') => self.enqueue_selected()?,
            KeyCode::Char('d') => self.remove_selected(),
            KeyCode::Char('f') => self.queue.next(),
            KeyCode::Char('F') => self.queue.previous(),
            KeyCode::Char('r') => self.queue.restart_current(),
            KeyCode::Char('R') => self.queue.restart_all(),
            KeyCode::Char('c') => {
                self.queue.clear();
                self.set_status("Queue cleared");
            }
            KeyCode::Char('p') => self.queue.toggle_pause(),
            KeyCode::Char(']') => self.change_volume(self.settings.volume_step),
            KeyCode::Char('[') => self.change_volume(-self.settings.volume_step),
            KeyCode::Char('?') => self.show_help = !self.show_help,
            _ => self.dirty = false,
        }
        Ok(Flow::Continue)
    }

    fn enqueue_selected(&mut self) -> Result<()> {
        let Some(path) = self.browser.selected_path() else {
            return Ok(());
        };
        if self.queue.has(&path) {
            self.set_status("Already queued");
            return Ok(());
        }

        match Track::load(&path, &self.settings.formats, self.settings.resample_quality) {
            Ok(track) => {
                let name = track.name();
                self.queue.add(track);
                self.queue.play();
                self.browser.select_next();
                self.set_status(format!("Queued {name}"));
                Ok(())
            }
            Err(err) if err.is_skippable() => {
                debug!("skipped selection: {err}");
                self.set_status(format!("Skipped: {err}"));
                Ok(())
            }
            Err(err) => {
                self.queue.clear();
                error!("{err:#}");
                Err(err).with_context(|| format!("failed to load {}", path.display()))
            }
        }
    }

    fn remove_selected(&mut self) {
        let Some(name) = self.browser.selected_name().map(str::to_owned) else {
            return;
        };
        if self.queue.remove(&name) {
            self.set_status(format!("Removed {name}"));
        }
    }

    fn change_volume(&mut self, delta: i32) {
        if self.queue.change(delta) {
            self.set_status(format!("Volume: {}%", self.queue.percent()));
        } else {
            self.set_status("Volume is already muted");
        }
    }

    /// Releases every decoder and records the volume for the next start.
    pub fn shutdown(&mut self) {
        self.queue.clear();
        self.settings.volume_change = self.queue.gain().deviation();
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status = message.into();
        self.dirty = true;
    }
}

pub fn run(root: PathBuf) -> Result<()> {
    logging::init()?;
    let settings = config::load_settings()?;
    let browser = Browser::open(&root)
        .with_context(|| format!("failed to open {}", root.display()))?;
    let speaker = Speaker::init(
        OUTPUT_SAMPLE_RATE,
        settings.buffer_frames(OUTPUT_SAMPLE_RATE),
    )?;
    let mut app = App::new(browser, Box::new(speaker), settings);
    info!(root = %root.display(), output = %app.queue().output_name(), "starting");

    enable_raw_mode()?;
    let mut out = stdout();
    execute!(out, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(out);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let mut last_tick = Instant::now();

    let result: Result<()> = loop {
        app.pump_events();

        if app.dirty || last_tick.elapsed() > Duration::from_millis(250) {
            if let Err(err) = terminal.draw(|frame| crate::ui::draw(frame, &app)) {
                break Err(err.into());
            }
            app.dirty = false;
            last_tick = Instant::now();
        }

        match event::poll(Duration::from_millis(33)) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(err) => break Err(err.into()),
        }

        let event = match event::read() {
            Ok(event) => event,
            Err(err) => break Err(err.into()),
        };
        let Event::Key(key) = event else {
            app.dirty = true;
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match app.handle_key(key) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => break Ok(()),
            Err(err) => break Err(err),
        }
    };

    app.shutdown();
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    let save_result = config::save_settings(app.settings());
    info!("stopped");
    result?;
    save_result?;
    Ok(())
}
