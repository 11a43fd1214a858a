//! Builtin command table.
//!
//! PING answers PONG regardless of arguments; ECHO returns its argument
//! remainder verbatim. Further handlers are registered here before the
//! server starts; the table is immutable once dispatch begins.

use crate::chain::Dispatcher;

/// Build the startup command table.
pub fn builtin() -> Dispatcher {
    let mut dispatcher = Dispatcher::new();
    dispatcher.register("PING", |_| Some("PONG".to_string()));
    dispatcher.register("ECHO", |args| Some(args.to_string()));
    dispatcher
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_ping() {
        let dispatcher = builtin();
        assert_eq!(dispatcher.dispatch("PING"), Some("PONG".to_string()));
        assert_eq!(dispatcher.dispatch("ping extra"), Some("PONG".to_string()));
    }

    #[test]
    fn test_builtin_echo() {
        let dispatcher = builtin();
        assert_eq!(
            dispatcher.dispatch("ECHO hello world"),
            Some("hello world".to_string())
        );
        assert_eq!(dispatcher.dispatch("ECHO"), Some(String::new()));
    }

    #[test]
    fn test_builtin_names() {
        let dispatcher = builtin();
        let mut names = dispatcher.command_names();
        names.sort_unstable();
        assert_eq!(names, vec!["ECHO", "PING"]);
    }
}
