//! Trigger URLs for worksync
//!
//! External apps drive repository synchronization by opening a URL:
//!
//! ```text
//! worksync://trigger/pull?repo=notes&on-success=app://ok&on-error=app://err
//! worksync://trigger/push?repo=notes&on-success=app://ok&on-error=app://err&message=WIP
//! worksync://trigger/sync?repo=notes&on-success=app://ok&on-error=app://err
//! worksync://trigger/status?repo=notes&on-success=app://ok&on-error=app://err
//! ```
//!
//! When the action finishes, the outcome is appended to the matching callback:
//!
//! - `status` - `ok` or `error`
//! - `sha` - commit id, truncated to 7 hex characters
//! - `branch` - tracked branch
//! - `changes` - number of changed files
//! - `message` - human-readable detail (the error text on failure)

mod ast;
mod callback;
mod error;
mod parser;

pub use ast::*;
pub use callback::{Outcome, TriggerResponse, SHORT_SHA_LEN, short_sha};
pub use error::ParseError;

/// Parse a trigger URL into a request
pub fn parse(input: &str) -> Result<TriggerRequest, ParseError> {
    parser::parse_trigger(input)
}
