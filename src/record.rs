/// Decoding of structured log lines and event-kind classification.
use crate::config::Classifier;
use serde_json::{Map, Value};

pub const CACHE_MISS: &str = "cache miss";
pub const CACHE_HIT: &str = "cache hit";
pub const FETCH_RESPONSE: &str = "fetch response";
pub const FETCH_QUERY: &str = "fetch query";

/// A decoded log line: the JSON object's fields.
#[derive(Debug)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    /// Decode one raw line. Anything other than a JSON object is an error.
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Map<String, Value>>(line).map(|fields| Record { fields })
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// The zap timestamp, if present.
    pub fn ts(&self) -> Option<f64> {
        self.get("ts").and_then(|v| v.as_f64())
    }

    pub fn msg(&self) -> Option<&str> {
        self.get("msg").and_then(|v| v.as_str())
    }
}

/// Cache lookup outcome. A line yields at most one; miss wins over hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
    Miss,
    Hit,
}

/// Event kinds carried by one line. The cache outcome is exclusive; the
/// response and query flags are checked independently of it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventKinds {
    pub cache: Option<CacheEvent>,
    pub response: bool,
    pub query: bool,
}

/// Classify a line using the configured strategy.
pub fn classify(classifier: Classifier, line: &str, record: &Record) -> EventKinds {
    match classifier {
        Classifier::Line => classify_line(line),
        Classifier::Msg => classify_msg(record.msg()),
    }
}

/// Substring search over the raw text, as the log has no typed event field
/// for older deployments.
pub fn classify_line(line: &str) -> EventKinds {
    let cache = if line.contains(CACHE_MISS) {
        Some(CacheEvent::Miss)
    } else if line.contains(CACHE_HIT) {
        Some(CacheEvent::Hit)
    } else {
        None
    };
    EventKinds {
        cache,
        response: line.contains(FETCH_RESPONSE),
        query: line.contains(FETCH_QUERY),
    }
}

/// Exact match on the zap `msg` field.
pub fn classify_msg(msg: Option<&str>) -> EventKinds {
    match msg {
        Some(CACHE_MISS) => EventKinds {
            cache: Some(CacheEvent::Miss),
            ..Default::default()
        },
        Some(CACHE_HIT) => EventKinds {
            cache: Some(CacheEvent::Hit),
            ..Default::default()
        },
        Some(FETCH_RESPONSE) => EventKinds {
            response: true,
            ..Default::default()
        },
        Some(FETCH_QUERY) => EventKinds {
            query: true,
            ..Default::default()
        },
        _ => EventKinds::default(),
    }
}
