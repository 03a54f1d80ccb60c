//! The marker wire format.
//!
//! A marker is a query string embedded in an `<esi:include src='…'/>` tag:
//! `?lsesi=<action>&_control=<directives>&esi=<base64 json>&_hash=<tag>`.
//! Params ride as base64-of-JSON so arbitrary payloads survive the URL, and
//! every value is percent-encoded on top to survive further string filters.
//! This module owns both directions of that contract; the tag itself is
//! computed over the decoded field values, before percent-encoding.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::{Map, Value};
use thiserror::Error;
use url::form_urlencoded;

/// Query key carrying the fragment action id.
pub const QS_ACTION: &str = "lsesi";
/// Query key carrying the optional cache-control directive list.
pub const QS_CONTROL: &str = "_control";
/// Query key carrying the optional base64-encoded JSON params.
pub const QS_PARAMS: &str = "esi";
/// Query key carrying the integrity tag.
pub const QS_HASH: &str = "_hash";

/// Hidden param marking a silent fragment; stripped before dispatch.
pub const PARAM_SILENCE: &str = "_silence";

#[derive(Debug, Error)]
pub enum MarkerError {
    #[error("marker query has no `{QS_ACTION}` action key")]
    MissingAction,
    #[error("marker query has no `{QS_HASH}` tag key")]
    MissingTag,
    #[error("marker params are not valid base64: {0}")]
    ParamsBase64(#[from] base64::DecodeError),
    #[error("marker params are not valid JSON: {0}")]
    ParamsJson(#[from] serde_json::Error),
    #[error("marker params decoded to a non-object JSON value")]
    ParamsNotAnObject,
}

/// The authenticated field set of one marker, in decoded form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerFields {
    pub action: String,
    pub control: Option<String>,
    pub args: Option<String>,
}

impl MarkerFields {
    /// Serialize the fields plus the tag into a percent-encoded query string.
    ///
    /// Key order is fixed so a marker for the same fragment is byte-stable
    /// and therefore cacheable by the edge.
    pub fn to_query(&self, tag: &str) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair(QS_ACTION, &self.action);
        if let Some(control) = &self.control {
            query.append_pair(QS_CONTROL, control);
        }
        if let Some(args) = &self.args {
            query.append_pair(QS_PARAMS, args);
        }
        query.append_pair(QS_HASH, tag);
        query.finish()
    }

    /// Parse a raw request query back into decoded fields plus the tag.
    ///
    /// Unrelated query keys are ignored; on duplicate keys the last value
    /// wins, matching ordinary query-string semantics.
    pub fn parse(query: &str) -> Result<(Self, String), MarkerError> {
        let mut action = None;
        let mut control = None;
        let mut args = None;
        let mut tag = None;

        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                QS_ACTION => action = Some(value.into_owned()),
                QS_CONTROL => control = Some(value.into_owned()),
                QS_PARAMS => args = Some(value.into_owned()),
                QS_HASH => tag = Some(value.into_owned()),
                _ => {}
            }
        }

        let action = action.ok_or(MarkerError::MissingAction)?;
        let tag = tag.ok_or(MarkerError::MissingTag)?;
        Ok((
            Self {
                action,
                control,
                args,
            },
            tag,
        ))
    }
}

/// True when a request query addresses the fragment endpoint.
pub fn is_fragment_request(query: &str) -> bool {
    form_urlencoded::parse(query.as_bytes()).any(|(key, value)| key == QS_ACTION && !value.is_empty())
}

/// Encode a params payload as base64 of its JSON serialization.
pub fn encode_params(params: &Map<String, Value>) -> Result<String, MarkerError> {
    let json = serde_json::to_string(params)?;
    Ok(STANDARD.encode(json))
}

/// Decode a base64-of-JSON params payload back into an object.
pub fn decode_params(args: &str) -> Result<Map<String, Value>, MarkerError> {
    let json = STANDARD.decode(args)?;
    match serde_json::from_slice(&json)? {
        Value::Object(map) => Ok(map),
        _ => Err(MarkerError::ParamsNotAnObject),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn fields() -> MarkerFields {
        MarkerFields {
            action: "widget".into(),
            control: Some("private,no-vary".into()),
            args: Some("eyJpZCI6IjQyIn0=".into()),
        }
    }

    #[test]
    fn query_round_trips_decoded_fields() {
        let query = fields().to_query("deadbeef");
        let (parsed, tag) = MarkerFields::parse(&query).unwrap();
        assert_eq!(parsed, fields());
        assert_eq!(tag, "deadbeef");
    }

    #[test]
    fn query_percent_encodes_values() {
        let query = fields().to_query("deadbeef");
        assert!(query.contains("_control=private%2Cno-vary"), "{query}");
        assert!(query.contains("esi=eyJpZCI6IjQyIn0%3D"), "{query}");
        assert!(!query.contains(','));
    }

    #[test]
    fn optional_fields_are_omitted_entirely() {
        let query = MarkerFields {
            action: "nonce".into(),
            control: None,
            args: None,
        }
        .to_query("deadbeef");
        assert_eq!(query, "lsesi=nonce&_hash=deadbeef");
    }

    #[test]
    fn parse_ignores_foreign_keys() {
        let (parsed, _) =
            MarkerFields::parse("utm_source=x&lsesi=widget&_hash=aa&page=2").unwrap();
        assert_eq!(parsed.action, "widget");
        assert_eq!(parsed.control, None);
    }

    #[test]
    fn parse_requires_action_and_tag() {
        assert!(matches!(
            MarkerFields::parse("_hash=aa"),
            Err(MarkerError::MissingAction)
        ));
        assert!(matches!(
            MarkerFields::parse("lsesi=widget"),
            Err(MarkerError::MissingTag)
        ));
    }

    #[test]
    fn fragment_request_detection() {
        assert!(is_fragment_request("lsesi=widget&_hash=aa"));
        assert!(!is_fragment_request("lsesi=&_hash=aa"));
        assert!(!is_fragment_request("page=2"));
        assert!(!is_fragment_request(""));
    }

    #[test]
    fn params_round_trip() {
        let mut params = Map::new();
        params.insert("id".into(), json!("42"));
        params.insert("nested".into(), json!({ "a": [1, 2] }));

        let encoded = encode_params(&params).unwrap();
        assert_eq!(decode_params(&encoded).unwrap(), params);
    }

    #[test]
    fn decode_rejects_garbled_payloads() {
        assert!(matches!(
            decode_params("!!not-base64!!"),
            Err(MarkerError::ParamsBase64(_))
        ));
        let not_json = STANDARD.encode("{nope");
        assert!(matches!(
            decode_params(&not_json),
            Err(MarkerError::ParamsJson(_))
        ));
        let not_object = STANDARD.encode("[1,2]");
        assert!(matches!(
            decode_params(&not_object),
            Err(MarkerError::ParamsNotAnObject)
        ));
    }
}
