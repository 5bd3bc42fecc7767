//! Normalization for the backend's response shapes.
//!
//! Most routes answer `{ success, data, message }`, some answer the bare
//! payload, and list routes nest their rows under a handful of keys.

use gymapp_session_core::{SessionUser, VerifiedSession};
use serde_json::Value;

const LIST_KEYS: [&str; 4] = ["items", "docs", "results", "rows"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    #[error("{0}")]
    Rejected(String),
    #[error("{0}")]
    Malformed(String),
}

/// Strip the envelope. `success: false` is a failure; a body without `data`
/// is taken as the payload itself.
pub fn unwrap_data(body: Value) -> Result<Value, EnvelopeError> {
    let Value::Object(mut object) = body else {
        return Ok(body);
    };
    if object.get("success").and_then(Value::as_bool) == Some(false) {
        return Err(EnvelopeError::Rejected(rejection_message(&object)));
    }
    match object.remove("data") {
        Some(data) => Ok(data),
        None => Ok(Value::Object(object)),
    }
}

/// Rows of a list response, whatever wrapper the route used. Unknown shapes
/// give an empty list.
#[must_use]
pub fn normalize_list(body: &Value) -> Vec<Value> {
    match body {
        Value::Array(rows) => rows.clone(),
        Value::Object(object) => {
            if let Some(data) = object.get("data") {
                let rows = normalize_list(data);
                if !rows.is_empty() || data.is_array() {
                    return rows;
                }
            }
            LIST_KEYS
                .iter()
                .find_map(|key| object.get(*key).and_then(Value::as_array))
                .cloned()
                .unwrap_or_default()
        }
        _ => Vec::new(),
    }
}

/// Decode `{ success: true, data: { token, user } }` into a session pair.
/// Unlike [`unwrap_data`], the envelope is mandatory here: a body without an
/// explicit `success: true` never yields a session.
pub fn decode_session_payload(body: Value) -> Result<VerifiedSession, EnvelopeError> {
    let Value::Object(mut object) = body else {
        return Err(EnvelopeError::Malformed("response is not an object".to_string()));
    };
    match object.get("success").and_then(Value::as_bool) {
        Some(true) => {}
        Some(false) => return Err(EnvelopeError::Rejected(rejection_message(&object))),
        None => return Err(EnvelopeError::Malformed("success flag missing".to_string())),
    }
    let data = object
        .remove("data")
        .ok_or_else(|| EnvelopeError::Malformed("data missing".to_string()))?;
    let Value::Object(mut data) = data else {
        return Err(EnvelopeError::Malformed("data is not an object".to_string()));
    };
    let token = data
        .remove("token")
        .and_then(|token| token.as_str().map(|token| token.trim().to_string()))
        .filter(|token| !token.is_empty())
        .ok_or_else(|| EnvelopeError::Malformed("data.token missing".to_string()))?;
    let user = data
        .remove("user")
        .ok_or_else(|| EnvelopeError::Malformed("data.user missing".to_string()))?;
    let user = serde_json::from_value::<SessionUser>(user)
        .map_err(|error| EnvelopeError::Malformed(format!("data.user invalid: {error}")))?;
    Ok(VerifiedSession { token, user })
}

fn rejection_message(object: &serde_json::Map<String, Value>) -> String {
    ["message", "error"]
        .iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .unwrap_or("success_false")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unwrap_data_handles_envelope_and_bare_bodies() {
        assert_eq!(
            unwrap_data(json!({ "success": true, "data": { "id": 1 } })),
            Ok(json!({ "id": 1 }))
        );
        assert_eq!(unwrap_data(json!({ "id": 1 })), Ok(json!({ "id": 1 })));
        assert_eq!(unwrap_data(json!([1, 2])), Ok(json!([1, 2])));
        assert_eq!(
            unwrap_data(json!({ "success": false, "message": " Plan expired " })),
            Err(EnvelopeError::Rejected("Plan expired".to_string()))
        );
        assert_eq!(
            unwrap_data(json!({ "success": false })),
            Err(EnvelopeError::Rejected("success_false".to_string()))
        );
    }

    #[test]
    fn normalize_list_finds_rows_in_known_wrappers() {
        let rows = json!([{ "id": 1 }, { "id": 2 }]);
        assert_eq!(normalize_list(&rows).len(), 2);
        assert_eq!(normalize_list(&json!({ "data": rows.clone() })).len(), 2);
        assert_eq!(
            normalize_list(&json!({ "data": { "docs": rows.clone(), "total": 2 } })).len(),
            2
        );
        assert_eq!(normalize_list(&json!({ "items": rows })).len(), 2);
        assert!(normalize_list(&json!({ "data": [] })).is_empty());
        assert!(normalize_list(&json!({ "data": { "count": 0 } })).is_empty());
        assert!(normalize_list(&json!("nope")).is_empty());
    }

    #[test]
    fn session_payload_requires_token_and_user() {
        let verified = decode_session_payload(json!({
            "success": true,
            "data": { "token": "T", "user": { "_id": "u1", "role": "trainer" } }
        }))
        .expect("session");
        assert_eq!(verified.token, "T");
        assert_eq!(verified.user.id, "u1");

        assert!(matches!(
            decode_session_payload(json!({ "success": true, "data": { "user": { "id": "u1" } } })),
            Err(EnvelopeError::Malformed(_))
        ));
        assert!(matches!(
            decode_session_payload(json!({ "success": true, "data": { "token": "T" } })),
            Err(EnvelopeError::Malformed(_))
        ));
        assert!(matches!(
            decode_session_payload(json!({ "success": true, "data": "T" })),
            Err(EnvelopeError::Malformed(_))
        ));
    }

    #[test]
    fn session_payload_requires_explicit_success() {
        let pair = json!({ "token": "T", "user": { "_id": "u1" } });
        assert_eq!(
            decode_session_payload(json!({ "data": pair.clone() })),
            Err(EnvelopeError::Malformed("success flag missing".to_string()))
        );
        assert_eq!(
            decode_session_payload(pair),
            Err(EnvelopeError::Malformed("success flag missing".to_string()))
        );
        assert_eq!(
            decode_session_payload(json!({ "success": "true", "data": { "token": "T" } })),
            Err(EnvelopeError::Malformed("success flag missing".to_string()))
        );
        assert_eq!(
            decode_session_payload(json!({ "success": true })),
            Err(EnvelopeError::Malformed("data missing".to_string()))
        );
        assert_eq!(
            decode_session_payload(json!({ "success": false, "error": "banned" })),
            Err(EnvelopeError::Rejected("banned".to_string()))
        );
    }
}
