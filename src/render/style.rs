// ANSI escape sequences used by the dashboard

pub const BOLD: &str = "\x1b[1;29m";
pub const DIM: &str = "\x1b[2;29m";
pub const UNDERLINED: &str = "\x1b[4;29m";
pub const INVERSE_WHITE_BOLD: &str = "\x1b[1;29m\x1b[7;39m";

pub const RED: &str = "\x1b[31m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const BLUE: &str = "\x1b[34m";
pub const PURPLE: &str = "\x1b[35m";

pub const RESET: &str = "\x1b[0;0m";

// Move to the top left corner and clear the screen
pub const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";
