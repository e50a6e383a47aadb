use super::{
    line::Line,
    style::{DIM, GREEN, RED, UNDERLINED, BOLD},
};

pub const DEFAULT_THRESHOLD: f64 = 0.75;

const FILL: char = '-';
const OVERFLOW: char = '!';

/// Horizontal ratio bar, green below the threshold and red from the
/// threshold up.
#[derive(Debug, Clone, Copy)]
pub struct Bar {
    size: usize,
    threshold: f64,
}

impl Bar {
    pub fn new(size: usize, threshold: f64) -> Self {
        Self { size, threshold }
    }

    /// Draw the bar for `ratio`, always exactly `size` characters wide.
    ///
    /// A ratio above one fills the bar and ends it with `!`, negative
    /// or non finite ratios draw an empty bar.
    pub fn draw(&self, ratio: f64) -> Line {
        let ratio = if ratio.is_finite() { ratio.max(0.) } else { 0. };
        let color = if ratio >= self.threshold { RED } else { GREEN };

        let (filled, empty) = if ratio > 1. {
            let mut filled: String =
                std::iter::repeat_n(FILL, self.size.saturating_sub(1)).collect();
            if self.size > 0 {
                filled.push(OVERFLOW);
            }

            (filled, 0)
        } else {
            let n = ((ratio * self.size as f64) as usize).min(self.size);
            (std::iter::repeat_n(FILL, n).collect(), self.size - n)
        };

        let mut line = Line::new();
        line.push(&[UNDERLINED, BOLD, color], filled)
            .push(&[DIM, UNDERLINED], " ".repeat(empty));
        line
    }
}
