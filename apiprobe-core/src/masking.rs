//! Credential masking for printed HTTP logs.
//!
//! Scenarios send valid and deliberately broken tokens alike; what the
//! reporter prints keeps the scheme visible and hides the credential.

use http::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

use crate::driver::CUSTOM_HEADER;

/// The mask string used to replace sensitive values.
pub const MASK: &str = "*****";

/// Masks the credential of an `Authorization` value, keeping the scheme.
///
/// # Examples
///
/// ```
/// use apiprobe_core::masking::mask_authorization;
///
/// assert_eq!(mask_authorization("Bearer aaa.bbb.ccc"), "Bearer *****");
/// assert_eq!(mask_authorization("Bearer "), "Bearer ");
/// ```
pub fn mask_authorization(value: &str) -> String {
    match value.split_once(' ') {
        Some((scheme, credential)) if !credential.is_empty() => format!("{scheme} {MASK}"),
        Some(_) => value.to_string(),
        None => MASK.to_string(),
    }
}

/// Masks `Authorization` and `Custom-Header` values in a HeaderMap.
pub fn mask_headers(headers: &HeaderMap) -> HeaderMap {
    let mut masked = HeaderMap::new();

    for (name, value) in headers.iter() {
        let masked_value = if *name == AUTHORIZATION {
            let raw = value.to_str().unwrap_or_default();
            HeaderValue::from_str(&mask_authorization(raw))
                .unwrap_or_else(|_| HeaderValue::from_static(MASK))
        } else if *name == CUSTOM_HEADER {
            HeaderValue::from_static(MASK)
        } else {
            value.clone()
        };
        masked.append(name.clone(), masked_value);
    }

    masked
}

/// Masks issued tokens (`data.token`, `data.innerToken`) in a JSON body.
/// Bodies that are not JSON are returned as they are.
pub fn mask_body(body: &str) -> String {
    let Ok(mut value) = serde_json::from_str::<Value>(body) else {
        return body.to_string();
    };
    let Some(data) = value.get_mut("data").and_then(Value::as_object_mut) else {
        return body.to_string();
    };

    let mut touched = false;
    for key in ["token", "innerToken"] {
        if let Some(token) = data.get_mut(key).filter(|t| t.is_string()) {
            *token = Value::String(MASK.to_string());
            touched = true;
        }
    }

    if touched {
        value.to_string()
    } else {
        body.to_string()
    }
}
