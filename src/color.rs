//! ANSI escape sequences used when rendering diagnostics.

pub const RED: &str = "\x1b[31m";
pub const YELLOW: &str = "\x1b[33m";
pub const END: &str = "\x1b[0m";
