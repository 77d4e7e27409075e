//! Where progress lines go.
//!
//! Everything a run wants a human to see passes through an `Output`, so callers can
//! capture it instead of having it tied to the process' stdout.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Mutex;

use colored::{ColoredString, Colorize};
use colourado::{Color, ColorPalette, PaletteType};
use itertools::Itertools;

use crate::server::ServerConfig;

/// Sink for user-facing progress lines.
pub trait Output: Send + Sync {
    /// A line about one server, rendered as `[<server>] <message>`.
    fn line(&self, server: &ServerConfig, message: &str);

    /// A line that is not about any single server.
    fn notice(&self, message: &str);
}

/// Prints to stdout, prefixing each server with its own pastel color.
pub struct ConsoleOutput {
    prefixes: HashMap<String, ColoredString>,
}

impl ConsoleOutput {
    pub fn for_servers(servers: &[ServerConfig]) -> Self {
        if servers.is_empty() {
            return Self {
                prefixes: HashMap::new(),
            };
        }
        let colors = ColorPalette::new(servers.len() as u32, PaletteType::Pastel, false).colors;
        let prefixes = colors
            .into_iter()
            .zip_eq(servers)
            .map(|(color, server)| (server.to_string(), prettify(server, color)))
            .collect();
        Self { prefixes }
    }

    fn prefix(&self, server: &ServerConfig) -> ColoredString {
        let identity = server.to_string();
        match self.prefixes.get(&identity) {
            Some(prefix) => prefix.clone(),
            None => format!("[{}]", identity).normal(),
        }
    }
}

/// Surrounds the server identity with brackets and colors it.
fn prettify(server: &ServerConfig, color: Color) -> ColoredString {
    let r = (color.red * 255.0) as u8;
    let g = (color.green * 255.0) as u8;
    let b = (color.blue * 255.0) as u8;
    format!("[{}]", server).truecolor(r, g, b)
}

impl Output for ConsoleOutput {
    fn line(&self, server: &ServerConfig, message: &str) {
        // Without the lock, lines from different servers get mixed.
        let stdout = std::io::stdout();
        let mut guard = stdout.lock();
        let _ = writeln!(guard, "{} {}", self.prefix(server), message);
    }

    fn notice(&self, message: &str) {
        let stdout = std::io::stdout();
        let mut guard = stdout.lock();
        let _ = writeln!(guard, "{} {}", "[easydeploy]".bold(), message);
    }
}

/// Keeps every line in memory. Handy for tests and for embedding.
#[derive(Debug, Default)]
pub struct MemoryOutput {
    lines: Mutex<Vec<String>>,
}

impl MemoryOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything written so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    fn push(&self, line: String) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line);
        }
    }
}

impl Output for MemoryOutput {
    fn line(&self, server: &ServerConfig, message: &str) {
        self.push(format!("[{}] {}", server, message));
    }

    fn notice(&self, message: &str) {
        self.push(format!("[easydeploy] {}", message));
    }
}
