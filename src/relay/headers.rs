//! Outbound header construction
//!
//! Order matters: content negotiation first, then the adaptor's own
//! headers, then channel overrides. Nothing may write headers after the
//! overrides have been merged.

use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::HeaderMap;

use crate::context::{RelayContext, RelayInfo, RelayMode};
use crate::error::{RelayError, RelayResult};
use crate::relay::header_override::HeaderOverrides;
use crate::streaming::EVENT_STREAM;

/// Copy `name` from the inbound request when it has a non-empty value
pub fn copy_inbound_header(inbound: &RelayContext, headers: &mut HeaderMap, name: HeaderName) {
    match inbound.headers.get(&name) {
        Some(value) if !value.is_empty() => {
            headers.insert(name, value.clone());
        }
        _ => {}
    }
}

/// Content negotiation headers for plain JSON relays
///
/// Multipart and realtime relays set their own content type elsewhere and
/// are left untouched.
pub fn setup_api_request_header(info: &RelayInfo, inbound: &RelayContext, headers: &mut HeaderMap) {
    if info.relay_mode.is_multipart_form() || info.relay_mode == RelayMode::Realtime {
        return;
    }

    copy_inbound_header(inbound, headers, header::CONTENT_TYPE);
    copy_inbound_header(inbound, headers, header::ACCEPT);
    if info.is_stream && inbound.header(header::ACCEPT.as_str()).is_empty() {
        headers.insert(header::ACCEPT, HeaderValue::from_static(EVENT_STREAM));
    }
}

/// Merge override values onto `headers`, replacing what is there
pub fn apply_overrides(headers: &mut HeaderMap, overrides: &HeaderOverrides) -> RelayResult<()> {
    for (name, value) in overrides {
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
            RelayError::HeaderOverrideInvalid(format!("invalid header name: {name}"))
        })?;
        let header_value = HeaderValue::from_str(value).map_err(|_| {
            RelayError::HeaderOverrideInvalid(format!("invalid value for header {name}"))
        })?;
        headers.insert(header_name, header_value);
    }
    Ok(())
}
