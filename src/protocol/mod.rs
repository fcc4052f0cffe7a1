//! Wire protocol: envelope types and the minimal JSON codec (C1).

pub mod json;

use crate::protocol::json::{extract_field, object_span, FieldValue};

/// A parsed request envelope.
///
/// `params` retains the original substring of the `params` object (if any)
/// so downstream handlers can re-probe it for their own fields without this
/// type needing to understand every method's parameter shape.
#[derive(Debug, Clone)]
pub struct Request {
    pub id: Option<String>,
    pub method: Option<String>,
    pub params: Option<String>,
}

impl Request {
    /// Parse a single-line JSON request envelope.
    ///
    /// Never fails outright: a missing `method` is represented as
    /// `method: None`, left to the router to turn into
    /// `{"error":"Failed to parse request"}`.
    pub fn parse(line: &str) -> Request {
        Request {
            id: extract_field(line, "id").map(FieldValue::into_string),
            method: extract_field(line, "method").map(FieldValue::into_string),
            params: object_span(line, "params").map(str::to_string),
        }
    }

    /// Extract a string field from `params`, if present.
    pub fn param_str(&self, field: &str) -> Option<String> {
        let params = self.params.as_deref()?;
        extract_field(params, field).map(FieldValue::into_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_request() {
        let line = r#"{"id":"1","method":"call_tool","params":{"tool":"ls","text":"-la"}}"#;
        let req = Request::parse(line);
        assert_eq!(req.id.as_deref(), Some("1"));
        assert_eq!(req.method.as_deref(), Some("call_tool"));
        assert_eq!(req.param_str("tool").as_deref(), Some("ls"));
        assert_eq!(req.param_str("text").as_deref(), Some("-la"));
    }

    #[test]
    fn test_parse_missing_method() {
        let line = r#"{"id":"1","params":{}}"#;
        let req = Request::parse(line);
        assert!(req.method.is_none());
    }

    #[test]
    fn test_parse_missing_id_and_params() {
        let line = r#"{"method":"initialize"}"#;
        let req = Request::parse(line);
        assert!(req.id.is_none());
        assert!(req.params.is_none());
        assert_eq!(req.param_str("anything"), None);
    }
}
