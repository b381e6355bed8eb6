use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{AppError, Result};

/// Collections filled by the public site and only read or pruned here
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InboxKind {
    Enquiries,
    AircraftEnquiries,
    Subscribers,
    Bookings,
}

impl InboxKind {
    pub const ALL: [InboxKind; 4] = [
        InboxKind::Enquiries,
        InboxKind::AircraftEnquiries,
        InboxKind::Subscribers,
        InboxKind::Bookings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InboxKind::Enquiries => "enquiries",
            InboxKind::AircraftEnquiries => "aircraft-enquiries",
            InboxKind::Subscribers => "subscribers",
            InboxKind::Bookings => "bookings",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| AppError::NotFound(format!("Unknown inbox: {}", s)))
    }

    pub fn collection(&self) -> &'static str {
        match self {
            InboxKind::Enquiries => "Enquiry",
            InboxKind::AircraftEnquiries => "aircraftEnquiries",
            InboxKind::Subscribers => "subscribers",
            InboxKind::Bookings => "bookings",
        }
    }
}

/// One inbound item
#[derive(Debug, Clone, Serialize)]
pub struct InboxItem {
    pub id: String,
    #[serde(flatten)]
    pub value: Map<String, Value>,
}

impl InboxItem {
    /// Submission time in milliseconds, from either an epoch number or an RFC 3339 string
    pub fn timestamp_millis(&self) -> Option<i64> {
        match self.value.get("timestamp")? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => chrono::DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.timestamp_millis())
                .or_else(|| s.parse().ok()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(timestamp: Value) -> InboxItem {
        let mut value = Map::new();
        value.insert("timestamp".to_string(), timestamp);
        InboxItem {
            id: "x".to_string(),
            value,
        }
    }

    #[test]
    fn timestamps_accept_numbers_and_dates() {
        assert_eq!(item(json!(1_700_000_000_000i64)).timestamp_millis(), Some(1_700_000_000_000));
        assert_eq!(
            item(json!("2024-01-01T00:00:00Z")).timestamp_millis(),
            Some(1_704_067_200_000)
        );
        assert_eq!(item(json!("1700000000000")).timestamp_millis(), Some(1_700_000_000_000));
        assert_eq!(item(json!(true)).timestamp_millis(), None);
    }

    #[test]
    fn inbox_routes_map_to_collections() {
        assert_eq!(InboxKind::parse("enquiries").unwrap().collection(), "Enquiry");
        assert_eq!(
            InboxKind::parse("aircraft-enquiries").unwrap().collection(),
            "aircraftEnquiries"
        );
        assert!(InboxKind::parse("newsletters").is_err());
    }
}
