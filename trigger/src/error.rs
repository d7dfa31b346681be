//! Error types for trigger URL parsing

use std::fmt;

/// Error that occurred while parsing a trigger URL or encoding its callback
#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    pub position: Option<usize>,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: None,
        }
    }

    pub fn with_position(mut self, pos: usize) -> Self {
        self.position = Some(pos);
        self
    }

    pub fn missing_parameter(name: &str) -> Self {
        Self::new(format!("missing required parameter '{}'", name))
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Trigger parse error: {}", self.message)?;
        if let Some(pos) = self.position {
            write!(f, " at position {}", pos)?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

impl From<nom::Err<nom::error::Error<&str>>> for ParseError {
    fn from(err: nom::Err<nom::error::Error<&str>>) -> Self {
        match err {
            nom::Err::Incomplete(_) => ParseError::new("Incomplete input"),
            nom::Err::Error(e) | nom::Err::Failure(e) => ParseError::new(format!(
                "malformed trigger URL near: {:?}",
                e.input.chars().take(20).collect::<String>()
            )),
        }
    }
}

impl From<url::ParseError> for ParseError {
    fn from(err: url::ParseError) -> Self {
        ParseError::new(format!("invalid callback URL: {}", err))
    }
}
