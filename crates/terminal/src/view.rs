use std::collections::BTreeMap;

use glam::Vec2;
use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Margin, Rect};
use ratatui::style::{Color, Style};
use ratatui::symbols::Marker;
use ratatui::text::{Line, Span};
use ratatui::widgets::canvas::{Canvas, Points};
use ratatui::widgets::{Block, Borders, Paragraph};

use swarm::role::ENTITY_EXTENT;
use swarm::{EntityStore, Viewport};

const PANEL_WIDTH: u16 = 36;

/// What the panel shows besides the role's own lines.
pub struct Overlay<'a> {
    pub title: &'a str,
    pub fps: f32,
    pub transport: &'a str,
    pub status: String,
    pub error: Option<&'a str>,
    pub lines: Vec<Line<'static>>,
}

/// A gray label followed by a white value, the panel's line format.
pub fn stat(label: &str, value: impl Into<String>) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{label}: "), Style::default().fg(Color::Gray)),
        Span::styled(value.into(), Style::default().fg(Color::White)),
    ])
}

/// Draws the world canvas and side panel, returning the cells the canvas covers.
pub fn render(frame: &mut Frame, store: &EntityStore, world: Vec2, overlay: &Overlay) -> Viewport {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(0), Constraint::Length(PANEL_WIDTH)])
        .split(frame.area());

    let canvas_area = chunks[0];
    let inner = canvas_area.inner(Margin::new(1, 1));
    let viewport = Viewport::new(inner.x, inner.y, inner.width, inner.height, world);

    match overlay.error {
        Some(error) => render_error(frame, canvas_area, overlay.title, error),
        None => render_world(frame, canvas_area, store, &viewport, overlay.title),
    }
    render_panel(frame, chunks[1], store, overlay);

    viewport
}

/// Groups live entity positions by color, in canvas coordinates.
fn points_by_color(store: &EntityStore, viewport: &Viewport) -> BTreeMap<(u8, u8, u8), Vec<(f64, f64)>> {
    let mut groups: BTreeMap<(u8, u8, u8), Vec<(f64, f64)>> = BTreeMap::new();
    if !store.exists() {
        return groups;
    }

    let center = Vec2::splat(ENTITY_EXTENT / 2.0);
    let count = store.count() as usize;
    for (position, color) in store.positions()[..count].iter().zip(&store.colors()[..count]) {
        if color.is_tombstone() {
            continue;
        }
        groups
            .entry((color.r, color.g, color.b))
            .or_default()
            .push(viewport.world_to_canvas(*position + center));
    }
    groups
}

fn render_world(frame: &mut Frame, area: Rect, store: &EntityStore, viewport: &Viewport, title: &str) {
    let groups = points_by_color(store, viewport);

    let canvas = Canvas::default()
        .block(
            Block::default()
                .title(format!(" {title} "))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .marker(Marker::Braille)
        .background_color(Color::Rgb(10, 10, 10))
        .x_bounds([0.0, viewport.world.x as f64])
        .y_bounds([0.0, viewport.world.y as f64])
        .paint(|ctx| {
            for ((r, g, b), coords) in &groups {
                ctx.draw(&Points {
                    coords,
                    color: Color::Rgb(*r, *g, *b),
                });
            }
        });

    frame.render_widget(canvas, area);
}

fn render_error(frame: &mut Frame, area: Rect, title: &str, error: &str) {
    let block = Block::default()
        .title(format!(" {title} "))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red));

    let paragraph = Paragraph::new(format!("ERROR {error}"))
        .block(block)
        .style(Style::default().fg(Color::Red))
        .alignment(Alignment::Center);

    frame.render_widget(paragraph, area);
}

fn render_panel(frame: &mut Frame, area: Rect, store: &EntityStore, overlay: &Overlay) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(6)])
        .split(area);

    let mut lines = vec![
        stat("FPS", format!("{:.0}", overlay.fps)),
        stat("ENTITIES", store.count().to_string()),
        stat("TRANSPORT", overlay.transport),
        stat("STATUS", overlay.status.clone()),
        Line::default(),
    ];
    lines.extend(overlay.lines.iter().cloned());

    let stats = Paragraph::new(lines).block(
        Block::default()
            .title(" Stats ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow)),
    );
    frame.render_widget(stats, chunks[0]);

    let help = Paragraph::new(vec![
        Line::from("Left mouse / Space: spawn"),
        Line::from("Right mouse / Backspace: destroy"),
        Line::from("q / Esc: quit"),
    ])
    .style(Style::default().fg(Color::Gray))
    .block(
        Block::default()
            .title(" Controls ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    frame.render_widget(help, chunks[1]);
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn empty_store_draws_nothing() {
        let store = EntityStore::authoritative(16);
        let viewport = Viewport::new(0, 0, 80, 24, Vec2::new(800.0, 600.0));
        assert!(points_by_color(&store, &viewport).is_empty());
    }

    #[test]
    fn points_are_centered_and_flipped() {
        let mut store = EntityStore::authoritative(16);
        store.allocate_batch(Vec2::new(100.0, 50.0), 4, &mut StdRng::seed_from_u64(3));
        let viewport = Viewport::new(0, 0, 80, 24, Vec2::new(800.0, 600.0));

        let groups = points_by_color(&store, &viewport);
        let total: usize = groups.values().map(Vec::len).sum();
        assert_eq!(total, 4);
        for coords in groups.values() {
            for &(x, y) in coords {
                assert_eq!((x, y), (116.0, 534.0));
            }
        }
    }

    #[test]
    fn stat_line_has_label_and_value() {
        let line = stat("RTT", "12 ms");
        assert_eq!(line.spans.len(), 2);
        assert_eq!(line.spans[0].content, "RTT: ");
        assert_eq!(line.spans[1].content, "12 ms");
    }
}
