//! Trigger URL parser using nom
//!
//! The grammar covers the fixed part of the URL (scheme, host, action);
//! query parameters are percent-decoded with `url::form_urlencoded`.

use nom::{
    IResult,
    bytes::complete::{tag, tag_no_case, take_while},
    character::complete::{alpha1, char},
    combinator::{opt, recognize, rest},
    sequence::{pair, preceded},
};

use crate::ast::*;
use crate::error::ParseError;

/// Host component every trigger URL addresses
const TRIGGER_HOST: &str = "trigger";

/// Parse a complete trigger URL
pub fn parse_trigger(input: &str) -> Result<TriggerRequest, ParseError> {
    let input = input.trim();
    let (remaining, (scheme, action_name, query)) = trigger_url(input)?;

    if !remaining.is_empty() {
        let pos = input.len() - remaining.len();
        return Err(ParseError::new(format!("Unexpected trailing content: {}", remaining))
            .with_position(pos));
    }

    let action = Action::from_name(action_name)
        .ok_or_else(|| ParseError::new(format!("unknown action '{}'", action_name)))?;

    let mut repo = None;
    let mut on_success = None;
    let mut on_error = None;
    let mut message = None;

    for (key, value) in url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
        let value = value.into_owned();
        match key.as_ref() {
            "repo" => repo = Some(value),
            "on-success" => on_success = Some(value),
            "on-error" => on_error = Some(value),
            "message" => message = Some(value),
            // Unknown keys are ignored so callers can add their own bookkeeping
            _ => {}
        }
    }

    let repo = repo
        .filter(|r| !r.is_empty())
        .ok_or_else(|| ParseError::missing_parameter("repo"))?;

    Ok(TriggerRequest {
        scheme: scheme.to_string(),
        action,
        repo,
        on_success: on_success.ok_or_else(|| ParseError::missing_parameter("on-success"))?,
        on_error: on_error.ok_or_else(|| ParseError::missing_parameter("on-error"))?,
        message: message.filter(|m| !m.is_empty()),
    })
}

// ============================================================================
// Grammar
// ============================================================================

fn trigger_url(input: &str) -> IResult<&str, (&str, &str, Option<&str>)> {
    let (input, scheme) = scheme(input)?;
    let (input, _) = tag("://")(input)?;
    let (input, _) = tag_no_case(TRIGGER_HOST)(input)?;
    let (input, _) = char('/')(input)?;
    let (input, action) = alpha1(input)?;
    let (input, _) = opt(char('/'))(input)?;
    let (input, query) = opt(preceded(char('?'), rest))(input)?;
    Ok((input, (scheme, action, query)))
}

/// RFC 3986 scheme: ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )
fn scheme(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alpha1,
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.'),
    ))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pull() {
        let req = parse_trigger(
            "worksync://trigger/pull?repo=notes&on-success=app://ok&on-error=app://err",
        )
        .unwrap();
        assert_eq!(req.scheme, "worksync");
        assert_eq!(req.action, Action::Pull);
        assert_eq!(req.repo, "notes");
        assert_eq!(req.on_success, "app://ok");
        assert_eq!(req.on_error, "app://err");
        assert!(req.message.is_none());
    }

    #[test]
    fn test_parse_push_with_encoded_message() {
        let req = parse_trigger(concat!(
            "worksync://trigger/push?repo=notes&on-success=app%3A%2F%2Fok",
            "&on-error=app://err&message=daily+notes%21",
        ))
        .unwrap();
        assert_eq!(req.action, Action::Push);
        assert_eq!(req.on_success, "app://ok");
        assert_eq!(req.message.as_deref(), Some("daily notes!"));
    }

    #[test]
    fn test_action_is_case_insensitive() {
        let req = parse_trigger("worksync://TRIGGER/Sync?repo=a&on-success=x://y&on-error=x://z")
            .unwrap();
        assert_eq!(req.action, Action::Sync);
    }

    #[test]
    fn test_unknown_action_fails() {
        let err = parse_trigger("worksync://trigger/rebase?repo=a&on-success=x://y&on-error=x://z")
            .unwrap_err();
        assert!(err.message.contains("unknown action"));
    }

    #[test]
    fn test_missing_repo_fails() {
        let err = parse_trigger("worksync://trigger/status?on-success=x://y&on-error=x://z")
            .unwrap_err();
        assert!(err.message.contains("repo"));
    }

    #[test]
    fn test_missing_callbacks_fail() {
        let err = parse_trigger("worksync://trigger/status?repo=a&on-error=x://z").unwrap_err();
        assert!(err.message.contains("on-success"));
    }

    #[test]
    fn test_wrong_host_fails() {
        assert!(parse_trigger("worksync://open/status?repo=a&on-success=x://y&on-error=x://z")
            .is_err());
    }
}
