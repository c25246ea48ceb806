use crossterm::event::{
    Event, KeyCode, KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use glam::Vec2;

use swarm::{FrameInput, Triggers, Viewport};

/// Mouse and key state carried between frames.
///
/// Holding the left button spawns every frame, Space spawns once. Holding the right
/// button destroys every frame, Backspace destroys once.
#[derive(Debug, Default)]
pub struct Controls {
    left_held: bool,
    right_held: bool,
    spawn_pressed: bool,
    destroy_pressed: bool,
    pointer: Option<(u16, u16)>,
    quit: bool,
}

impl Controls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    pub fn handle(&mut self, event: &Event) {
        match event {
            Event::Key(key) if key.kind == KeyEventKind::Press => match key.code {
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    self.quit = true
                }
                KeyCode::Char('q') | KeyCode::Esc => self.quit = true,
                KeyCode::Char(' ') => self.spawn_pressed = true,
                KeyCode::Backspace => self.destroy_pressed = true,
                _ => {}
            },
            Event::Mouse(mouse) => self.handle_mouse(mouse),
            _ => {}
        }
    }

    fn handle_mouse(&mut self, mouse: &MouseEvent) {
        self.pointer = Some((mouse.column, mouse.row));
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => self.left_held = true,
            MouseEventKind::Up(MouseButton::Left) => self.left_held = false,
            MouseEventKind::Down(MouseButton::Right) => self.right_held = true,
            MouseEventKind::Up(MouseButton::Right) => self.right_held = false,
            _ => {}
        }
    }

    /// Builds this frame's input and clears one-shot presses. The pointer falls back to
    /// the world center when the mouse is outside the viewport.
    pub fn take_input(&mut self, viewport: &Viewport) -> FrameInput {
        let mut triggers = Triggers::empty();
        if self.left_held || self.spawn_pressed {
            triggers |= Triggers::SPAWN;
        }
        if self.right_held || self.destroy_pressed {
            triggers |= Triggers::DESTROY;
        }
        self.spawn_pressed = false;
        self.destroy_pressed = false;

        let pointer = self
            .pointer
            .and_then(|(column, row)| viewport.cell_to_world(column, row))
            .unwrap_or(viewport.world / 2.0);

        FrameInput { triggers, pointer }
    }
}
