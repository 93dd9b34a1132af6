//! Origin derivation and agent URL query helpers.
//!
//! An origin is the `scheme://host[:port]` tuple of a URL (default ports are
//! omitted), which is the value a host stamps on every cross-context message
//! event. Bindings compute it once from a target URL and compare inbound
//! events against that fixed string.

use crate::error::{PaymentError, PaymentResult};
use crate::message::{Operation, Subject};
use url::{form_urlencoded, Url};

/// Query parameter naming the remote operation.
pub const PARAM_OP: &str = "op";
/// Query parameter naming the router subject (`params` or `result`).
pub const PARAM_ROUTE: &str = "route";
/// Query parameter carrying the caller's origin.
pub const PARAM_ORIGIN: &str = "origin";

fn parse_url(url: &str) -> PaymentResult<Url> {
    Url::parse(url).map_err(|e| PaymentError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

/// Compute the origin of an absolute URL.
///
/// URLs without a tuple origin (`data:`, `blob:` without an inner origin,
/// `file:`) cannot be addressed by a scoped post and are rejected.
pub fn origin_of(url: &str) -> PaymentResult<String> {
    let parsed = parse_url(url)?;
    let origin = parsed.origin();
    if !origin.is_tuple() {
        return Err(PaymentError::InvalidUrl {
            url: url.to_string(),
            reason: "URL has an opaque origin".to_string(),
        });
    }
    Ok(origin.ascii_serialization())
}

/// Add or replace a query parameter on a URL.
///
/// The first parameter whose key matches case-insensitively is replaced in
/// place; otherwise the parameter is appended. Every other parameter is kept
/// byte for byte, including its encoding.
pub fn update_query_parameter(url: &str, key: &str, value: &str) -> PaymentResult<String> {
    let mut parsed = parse_url(url)?;
    let pair = form_urlencoded::Serializer::new(String::new())
        .append_pair(key, value)
        .finish();

    let mut segments: Vec<String> = Vec::new();
    let mut replaced = false;
    if let Some(query) = parsed.query().filter(|q| !q.is_empty()) {
        for segment in query.split('&') {
            if !replaced && segment_key(segment).eq_ignore_ascii_case(key) {
                segments.push(pair.clone());
                replaced = true;
            } else {
                segments.push(segment.to_string());
            }
        }
    }
    if !replaced {
        segments.push(pair);
    }

    parsed.set_query(Some(&segments.join("&")));
    Ok(parsed.into())
}

/// Decoded key of one raw `key=value` query segment.
fn segment_key(segment: &str) -> String {
    let name = segment.split('=').next().unwrap_or_default();
    form_urlencoded::parse(name.as_bytes())
        .next()
        .map(|(k, _)| k.into_owned())
        .unwrap_or_default()
}

/// Routing parameters an agent page reads from its own URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteParams {
    /// The operation in progress, if named.
    pub op: Option<Operation>,
    /// Which router subject the page should bind.
    pub route: Option<Subject>,
    /// The counterpart origin to talk to.
    pub origin: Option<String>,
}

impl RouteParams {
    /// Parse `op`, `route` and `origin` from a URL's query string.
    pub fn from_url(url: &str) -> PaymentResult<Self> {
        let parsed = parse_url(url)?;
        let mut params = RouteParams::default();
        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                PARAM_OP => params.op = Some(value.parse()?),
                PARAM_ROUTE => params.route = Some(value.parse()?),
                PARAM_ORIGIN => params.origin = Some(value.into_owned()),
                _ => {}
            }
        }
        Ok(params)
    }
}
