//! Current time tool.

use super::{parse_args, Tool, ToolDefinition};
use crate::context::RequestContext;
use crate::error::{Result, StreamLensError};
use async_trait::async_trait;
use chrono::{FixedOffset, Local, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use serde_json::Value;

/// Reports the current time.
///
/// Accepts IANA zone names (`US/Pacific`, `Europe/Oslo`), `UTC`, `local` or a
/// fixed offset such as `-08:00`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CurrentTime;

#[derive(Debug, Deserialize)]
struct CurrentTimeArgs {
    #[serde(default)]
    timezone: Option<String>,
}

#[async_trait]
impl Tool for CurrentTime {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "current_time".to_string(),
            description: "Get the current date and time. Optionally pass a timezone \
                (an IANA name such as Europe/Oslo, UTC, local, or an offset like -08:00); defaults to the user's timezone."
                .to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "timezone": {
                        "type": "string",
                        "description": "Timezone to report the time in"
                    }
                }
            }),
        }
    }

    async fn call(&self, ctx: &RequestContext, input: Value) -> Result<String> {
        let args: CurrentTimeArgs = parse_args("current_time", input)?;
        let zone = args.timezone.unwrap_or_else(|| ctx.timezone.clone());
        format_now(&zone)
    }
}

fn format_now(zone: &str) -> Result<String> {
    let trimmed = zone.trim();
    if trimmed.is_empty() {
        return Ok(Utc::now().to_rfc3339());
    }
    if trimmed.eq_ignore_ascii_case("local") {
        return Ok(Local::now().to_rfc3339());
    }
    if let Ok(tz) = trimmed.parse::<Tz>() {
        return Ok(Utc::now().with_timezone(&tz).to_rfc3339());
    }
    if let Some(offset) = parse_offset(trimmed) {
        return Ok(Utc::now().with_timezone(&offset).to_rfc3339());
    }
    Err(StreamLensError::tool(format!("current_time: unknown timezone {:?}", trimmed)))
}

fn parse_offset(s: &str) -> Option<FixedOffset> {
    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':').unwrap_or((rest, "0"));
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 14 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    #[test]
    fn test_parse_offset() {
        assert_eq!(parse_offset("+02:00"), FixedOffset::east_opt(7200));
        assert_eq!(parse_offset("-08:30"), FixedOffset::east_opt(-(8 * 3600 + 1800)));
        assert_eq!(parse_offset("+5"), FixedOffset::east_opt(5 * 3600));
        assert!(parse_offset("US/Pacific").is_none());
        assert!(parse_offset("+25:00").is_none());
    }

    #[tokio::test]
    async fn test_explicit_offset_is_rfc3339() {
        let out = CurrentTime
            .call(&RequestContext::default(), serde_json::json!({ "timezone": "+01:00" }))
            .await
            .unwrap();
        let parsed = DateTime::parse_from_rfc3339(&out).unwrap();
        assert_eq!(parsed.offset().local_minus_utc(), 3600);
    }

    #[tokio::test]
    async fn test_named_zone_from_context() {
        let ctx = RequestContext::default();
        let out = CurrentTime.call(&ctx, Value::Null).await.unwrap();
        let offset = DateTime::parse_from_rfc3339(&out).unwrap().offset().local_minus_utc();
        assert!(offset == -7 * 3600 || offset == -8 * 3600, "{}", out);
    }

    #[tokio::test]
    async fn test_explicit_named_zone_and_utc() {
        let ctx = RequestContext::default();
        let out = CurrentTime
            .call(&ctx, serde_json::json!({ "timezone": "Asia/Kolkata" }))
            .await
            .unwrap();
        let parsed = DateTime::parse_from_rfc3339(&out).unwrap();
        assert_eq!(parsed.offset().local_minus_utc(), 5 * 3600 + 1800);

        let out = CurrentTime
            .call(&ctx, serde_json::json!({ "timezone": "UTC" }))
            .await
            .unwrap();
        let parsed = DateTime::parse_from_rfc3339(&out).unwrap();
        assert_eq!(parsed.offset().local_minus_utc(), 0);
    }

    #[tokio::test]
    async fn test_unknown_zone_is_tool_error() {
        let err = CurrentTime
            .call(
                &RequestContext::default(),
                serde_json::json!({ "timezone": "Mars/Olympus" }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StreamLensError::Tool(ref m, _) if m.contains("Mars/Olympus")));
    }
}
