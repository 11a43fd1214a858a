//! Command dispatch: decoded text line in, optional reply text out.
//!
//! The command table is built once at startup and immutable afterwards;
//! resolution is a plain map lookup on the uppercased name token, never
//! reflection. The table is shared across connections behind an `Arc`.

use std::collections::HashMap;

/// A command handler: takes the argument remainder (trimmed, unparsed),
/// returns the reply text, or `None` for no reply.
pub type Handler = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Immutable name → handler table with case-insensitive matching.
pub struct Dispatcher {
    table: HashMap<String, Handler>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    /// Register a handler under `name`. Call before the server starts;
    /// the table is never mutated once dispatch begins.
    pub fn register<F>(&mut self, name: &str, handler: F)
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.table
            .insert(name.to_ascii_uppercase(), Box::new(handler));
    }

    /// Registered command names, for startup logging.
    pub fn command_names(&self) -> Vec<&str> {
        self.table.keys().map(String::as_str).collect()
    }

    /// Dispatch one decoded line.
    ///
    /// The line is trimmed and split into a name token and a remainder.
    /// An empty line produces no reply. An unknown name produces a
    /// synthesized error reply; it never closes the connection.
    pub fn dispatch(&self, line: &str) -> Option<String> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        let (name, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (trimmed, ""),
        };

        match self.table.get(&name.to_ascii_uppercase()) {
            Some(handler) => handler(rest),
            None => Some(format!("ERROR unknown command: {name}")),
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
