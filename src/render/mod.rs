pub mod bar;
pub mod card;
pub mod line;
pub mod style;
pub mod terminal;

use crate::frame::Frame;

use line::Line;
use style::BOLD;

// Everything the dashboard layout depends on besides the frame itself
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub width: usize,
    pub username: Option<String>,
    pub threshold: f64,
    pub compact: bool,
    pub color: bool,
}

/// Render a whole frame: every card in order, then a dotted footer.
///
/// Each line is cut to `options.width` visible characters.
pub fn render_frame(frame: &Frame, options: &RenderOptions) -> String {
    let mut lines: Vec<Line> = frame
        .cards
        .iter()
        .flat_map(|card| card::card_lines(card, options))
        .collect();

    let mut footer = Line::new();
    footer.push(&[BOLD], ".".repeat(options.width));
    lines.push(footer);

    lines
        .iter()
        .map(|line| line.render(options.width, options.color))
        .collect::<Vec<_>>()
        .join("\n")
}
