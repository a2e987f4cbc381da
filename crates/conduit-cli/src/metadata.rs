use conduit_core::ResponseOrigin;
use serde::Serialize;
use serde_json::Value;

/// Command metadata attached to every output envelope.
///
/// Field order is fixed to keep JSON output deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metadata {
    pub command: &'static str,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<ResponseOrigin>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Metadata {
    pub fn new(command: &'static str, latency_ms: u64) -> Self {
        Self {
            command,
            latency_ms,
            origin: None,
            status: None,
            warnings: Vec::new(),
        }
    }

    pub fn push_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }
}

/// Output envelope: metadata plus the command payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub meta: Metadata,
    pub data: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn optional_fields_are_omitted() {
        let envelope = Envelope {
            meta: Metadata::new("route", 3),
            data: json!({}),
        };
        let rendered = serde_json::to_string(&envelope).expect("serializable");
        assert_eq!(
            rendered,
            r#"{"meta":{"command":"route","latency_ms":3},"data":{}}"#
        );
    }

    #[test]
    fn origin_serializes_in_snake_case() {
        let mut meta = Metadata::new("get", 12);
        meta.origin = Some(ResponseOrigin::StaleCache);
        meta.status = Some(200);
        meta.push_warning("served stale data");

        let value = serde_json::to_value(&meta).expect("serializable");
        assert_eq!(value["origin"], "stale_cache");
        assert_eq!(value["warnings"][0], "served stale data");
    }
}
