//! Central sanitiser (§7): strips values that look like secrets out of any
//! message before it reaches a log line or a caller-visible error.

use once_cell::sync::Lazy;
use regex::Regex;

const REDACTED: &str = "[REDACTED]";

static BEARER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(bearer)\s+[a-z0-9\-\._~\+/]+=*").unwrap());
static BASIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(basic)\s+[a-z0-9+/=]+").unwrap());
static JSON_SECRET_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)("?(?:access_token|refresh_token|client_secret|api_key|password)"?\s*[:=]\s*"?)[^"\s,}]+"#)
        .unwrap()
});

/// Replace bearer tokens, basic-auth blobs, and common secret-bearing JSON
/// fields with [`REDACTED`]. Applied to every message before it is logged
/// or returned to an MCP caller.
pub fn sanitize(input: &str) -> String {
    let out = BEARER.replace_all(input, format!("bearer {REDACTED}"));
    let out = BASIC.replace_all(&out, format!("basic {REDACTED}"));
    JSON_SECRET_FIELD
        .replace_all(&out, format!("$1{REDACTED}"))
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_bearer_token() {
        let msg = "request failed: Authorization: Bearer abc123.def456-ghi";
        let out = sanitize(msg);
        assert!(!out.contains("abc123"));
        assert!(out.contains("[REDACTED]"));
    }

    #[test]
    fn redacts_json_field() {
        let msg = r#"{"access_token":"ya29.super-secret","ok":true}"#;
        let out = sanitize(msg);
        assert!(!out.contains("ya29"));
    }

    #[test]
    fn leaves_plain_text_alone() {
        let msg = "endpoint not found";
        assert_eq!(sanitize(msg), msg);
    }
}
