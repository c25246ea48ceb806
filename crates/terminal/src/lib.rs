mod controls;
mod view;

use std::io;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

use crossterm::event::{self, DisableMouseCapture, EnableMouseCapture};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use glam::Vec2;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::text::Line;

use swarm::{FrameClock, FrameStats, Role, Session, Settings, Viewport, frame_budget};

pub use controls::Controls;
pub use view::{Overlay, stat};

/// Full-screen front end shared by both roles: a braille canvas of the world and a
/// stats panel.
pub struct Tui {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
    controls: Controls,
    viewport: Viewport,
}

impl Tui {
    pub fn new() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture, cursor::Hide)?;

        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;

        Ok(Self {
            terminal,
            controls: Controls::new(),
            viewport: Viewport::new(0, 0, 0, 0, Vec2::ZERO),
        })
    }

    /// Runs frames until the user quits or the session's running flag is cleared.
    /// `panel` supplies the role-specific stats lines.
    pub fn run<R, F>(
        &mut self,
        session: &mut Session<R>,
        settings: &Settings,
        title: &str,
        panel: F,
    ) -> io::Result<()>
    where
        R: Role,
        F: Fn(&R) -> Vec<Line<'static>>,
    {
        let world = Vec2::new(
            settings.display.width as f32,
            settings.display.height as f32,
        );
        self.viewport.world = world;

        let budget = frame_budget(settings.renderer.framerate_limit);
        let running = session.running();
        let mut clock = FrameClock::new();
        let mut stats = FrameStats::new();

        while running.load(Ordering::SeqCst) && !self.controls.should_quit() {
            let frame_start = Instant::now();

            while event::poll(Duration::ZERO)? {
                self.controls.handle(&event::read()?);
            }
            let input = self.controls.take_input(&self.viewport);

            let dt = clock.tick();
            stats.record_frame(dt);
            session.frame(dt, &input);

            let overlay = Overlay {
                title,
                fps: stats.fps(),
                transport: session.transport_name(),
                status: session.status().to_string(),
                error: session.error(),
                lines: panel(session.role()),
            };

            let store = session.role().store();
            let mut viewport = self.viewport;
            self.terminal.draw(|frame| {
                viewport = view::render(frame, store, world, &overlay);
            })?;
            self.viewport = viewport;

            if let Some(remaining) = budget.checked_sub(frame_start.elapsed()) {
                thread::sleep(remaining);
            }
        }

        Ok(())
    }

    pub fn restore_terminal(&mut self) -> io::Result<()> {
        terminal::disable_raw_mode()?;
        execute!(
            self.terminal.backend_mut(),
            DisableMouseCapture,
            LeaveAlternateScreen,
            cursor::Show
        )?;
        Ok(())
    }
}

impl Drop for Tui {
    fn drop(&mut self) {
        let _ = self.restore_terminal();
    }
}
