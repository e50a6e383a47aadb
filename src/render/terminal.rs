use std::env;

use tracing::debug;

pub const DEFAULT_WIDTH: usize = 80;

// Narrower terminals would cut the bars in half
const MIN_WIDTH: usize = 40;

/// Width of the terminal attached to stdout.
///
/// Falls back to `$COLUMNS`, then to [`DEFAULT_WIDTH`] when stdout is
/// not a terminal (pipes, redirections).
pub fn terminal_width() -> usize {
    let width = ioctl_width()
        .or_else(|| env::var("COLUMNS").ok().and_then(|c| c.trim().parse().ok()))
        .filter(|width| *width > 0)
        .unwrap_or(DEFAULT_WIDTH);

    debug!("Terminal width: {width}");

    width.max(MIN_WIDTH)
}

fn ioctl_width() -> Option<usize> {
    let mut size: libc::winsize = unsafe { std::mem::zeroed() };

    // SAFETY: TIOCGWINSZ only writes into the winsize struct we own
    let result = unsafe { libc::ioctl(libc::STDOUT_FILENO, libc::TIOCGWINSZ, &mut size) };

    if result == 0 && size.ws_col > 0 {
        Some(usize::from(size.ws_col))
    } else {
        None
    }
}
