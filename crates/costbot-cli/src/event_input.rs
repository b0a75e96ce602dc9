//! Reading Lambda-style JSON events for the `handle` subcommand.

use std::io::Read;
use std::path::Path;

use serde_json::Value;

#[derive(Debug, Clone)]
pub struct EventInputError(pub String);

impl std::fmt::Display for EventInputError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for EventInputError {}

/// `-` reads stdin; anything else is a file path.
pub fn read_event(source: &str) -> Result<Value, EventInputError> {
    if source.trim() == "-" {
        return parse_event(std::io::stdin().lock(), "stdin");
    }
    let path = Path::new(source);
    let file = std::fs::File::open(path)
        .map_err(|e| EventInputError(format!("cannot open {}: {}", path.display(), e)))?;
    parse_event(file, &path.display().to_string())
}

pub fn parse_event<R: Read>(reader: R, origin: &str) -> Result<Value, EventInputError> {
    serde_json::from_reader(reader)
        .map_err(|e| EventInputError(format!("invalid event JSON in {}: {}", origin, e)))
}
