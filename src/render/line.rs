use super::style::RESET;

// A piece of text printed with one set of escape codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub style: String,
    pub text: String,
}

/// One dashboard line made of styled spans.
///
/// Width handling counts visible characters only, so escape codes
/// never push a line past the terminal edge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Line {
    spans: Vec<Span>,
}

impl Line {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, styles: &[&str], text: impl Into<String>) -> &mut Self {
        self.spans.push(Span {
            style: styles.concat(),
            text: text.into(),
        });
        self
    }

    pub fn extend(&mut self, other: Line) -> &mut Self {
        self.spans.extend(other.spans);
        self
    }

    pub fn visible_len(&self) -> usize {
        self.spans.iter().map(|s| s.text.chars().count()).sum()
    }

    pub fn plain(&self) -> String {
        self.spans.iter().map(|s| s.text.as_str()).collect()
    }

    // Pad the last span with spaces up to `width` visible characters
    pub fn pad_to(&mut self, width: usize) -> &mut Self {
        let missing = width.saturating_sub(self.visible_len());

        if missing > 0 {
            if self.spans.is_empty() {
                self.push(&[], "");
            }

            if let Some(last) = self.spans.last_mut() {
                last.text.push_str(&" ".repeat(missing));
            }
        }

        self
    }

    /// Render at most `width` visible characters.
    ///
    /// Every styled span is closed with a reset so styles never leak
    /// into the next span or line.
    pub fn render(&self, width: usize, color: bool) -> String {
        let mut out = String::new();
        let mut budget = width;

        for span in &self.spans {
            if budget == 0 {
                break;
            }

            let text: String = span.text.chars().take(budget).collect();
            budget -= text.chars().count();

            if color && !span.style.is_empty() {
                out.push_str(&span.style);
                out.push_str(&text);
                out.push_str(RESET);
            } else {
                out.push_str(&text);
            }
        }

        out
    }
}
