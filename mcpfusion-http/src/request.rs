//! Builds an outgoing request from an endpoint's resolved parameters
//! (spec §4.3 step 6) and layers authentication on top of it (spec §4.5).

use http::{HeaderMap, HeaderName, HeaderValue};
use mcpfusion_auth::PreparedRequest;
use mcpfusion_config::{EndpointDescription, ParamLocation, ResolvedParam};
use serde_json::Value;
use url::Url;

use crate::error::{HttpEngineError, HttpResult};

/// Everything needed to send one attempt, independent of the `reqwest`
/// client used to send it. Cheap to clone so pagination and retries can
/// rebuild a request without re-resolving parameters.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: reqwest::Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub body: Option<Body>,
}

#[derive(Debug, Clone)]
pub enum Body {
    Json(Value),
    Form(Vec<(String, String)>),
}

pub fn build_request_spec(
    endpoint: &EndpointDescription,
    base_url: &str,
    params: &[ResolvedParam],
) -> HttpResult<RequestSpec> {
    let mut path = endpoint.path.clone();
    let mut query = Vec::new();
    let mut headers = HeaderMap::new();
    let mut body_fields = serde_json::Map::new();
    let mut form_fields = Vec::new();
    let mut content_type_is_form = false;

    for param in params {
        match param.location {
            ParamLocation::Path => {
                let placeholder = format!("{{{}}}", param.name);
                let encoded = encode_path_segment(&value_to_string(&param.value, param.quoted));
                path = path.replace(&placeholder, &encoded);
            }
            ParamLocation::Query => {
                query.push((param.name.clone(), value_to_string(&param.value, param.quoted)));
            }
            ParamLocation::Header => {
                let name = HeaderName::try_from(param.name.as_str())
                    .map_err(|e| HttpEngineError::InvalidHeader(format!("'{}': {e}", param.name)))?;
                if name.as_str().eq_ignore_ascii_case("content-type") {
                    content_type_is_form = value_to_string(&param.value, false)
                        .eq_ignore_ascii_case("application/x-www-form-urlencoded");
                }
                let value = HeaderValue::from_str(&value_to_string(&param.value, param.quoted))
                    .map_err(|e| HttpEngineError::InvalidHeader(format!("'{}': {e}", param.name)))?;
                headers.insert(name, value);
            }
            ParamLocation::Body => {
                body_fields.insert(param.name.clone(), param.value.clone());
                form_fields.push((param.name.clone(), value_to_string(&param.value, false)));
            }
        }
    }

    let full = format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'));
    let url = Url::parse(&full).map_err(|e| HttpEngineError::InvalidHeader(format!("invalid request url '{full}': {e}")))?;

    let body = if body_fields.is_empty() {
        None
    } else if content_type_is_form {
        Some(Body::Form(form_fields))
    } else {
        Some(Body::Json(Value::Object(body_fields)))
    };

    Ok(RequestSpec {
        method: endpoint.method.as_reqwest(),
        url,
        headers,
        query,
        body,
    })
}

/// Merges auth headers/query/cookies resolved by an [`mcpfusion_auth::AuthStrategy`]
/// onto an already-built request.
pub fn apply_auth(mut spec: RequestSpec, prepared: PreparedRequest) -> RequestSpec {
    for (name, value) in prepared.headers.iter() {
        spec.headers.insert(name.clone(), value.clone());
    }
    spec.query.extend(prepared.query);
    if !prepared.cookies.is_empty() {
        let cookie_header = prepared
            .cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ");
        if let Ok(value) = HeaderValue::from_str(&cookie_header) {
            spec.headers.insert(http::header::COOKIE, value);
        }
    }
    spec
}

pub fn to_reqwest(client: &reqwest::Client, spec: &RequestSpec) -> reqwest::RequestBuilder {
    let mut builder = client
        .request(spec.method.clone(), spec.url.clone())
        .headers(spec.headers.clone());
    if !spec.query.is_empty() {
        builder = builder.query(&spec.query);
    }
    builder = match &spec.body {
        Some(Body::Json(value)) => builder.json(value),
        Some(Body::Form(fields)) => builder.form(fields),
        None => builder,
    };
    builder
}

fn value_to_string(value: &Value, quoted: bool) -> String {
    let raw = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    if quoted {
        format!("\"{raw}\"")
    } else {
        raw
    }
}

/// Percent-encodes everything outside the URL path-segment unreserved set.
fn encode_path_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
