//! Typed field sets for each entity kind.
//!
//! Records are stored as JSON documents; these structs define which keys a
//! submission may carry and which of them are required.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Scalar and nested fields of one entity kind
pub trait EntityFields: Serialize + DeserializeOwned {
    /// Reject submissions that are structurally valid but incomplete
    fn validate(&self) -> Result<()>;
}

fn require(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(format!("Missing required field: {}", field)));
    }
    Ok(())
}

// ==================== Aircraft ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WifiAvailability {
    Yes,
    #[default]
    No,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct AircraftDetails {
    pub guest_capacity: u32,
    pub number_of_pilots: u32,
    pub number_of_flight_attendants: u32,
    pub luggage_capacity: u32,
    pub number_of_lavatory: u32,
    pub wifi_available: WifiAvailability,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Exterior {
    pub length: String,
    pub wingspan: String,
    pub height: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Range {
    pub range_km: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Speed {
    pub high_speed: String,
    pub typical_cruise_speed: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Engines {
    pub engine_model: String,
    #[serde(rename = "thrustKN")]
    pub thrust_kn: String,
    pub flat_rated_to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct AirfieldPerformance {
    pub take_off_distance: String,
    pub landing_distance: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct TechnicalSpecifications {
    pub exterior: Exterior,
    pub range: Range,
    pub speed: Speed,
    pub engines: Engines,
    pub airfield_performance: AirfieldPerformance,
    pub avionics: String,
    pub operating_altitude: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AircraftFields {
    pub name: String,
    #[serde(default)]
    pub aircraft_type: String,
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub short_description: String,
    #[serde(default)]
    pub aircraft_details: AircraftDetails,
    #[serde(default)]
    pub technical_specifications: TechnicalSpecifications,
}

impl EntityFields for AircraftFields {
    fn validate(&self) -> Result<()> {
        require(&self.name, "name")
    }
}

// ==================== Yacht ====================

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct YachtSpecifications {
    pub length: String,
    pub beam: String,
    pub draft: String,
    pub gross_tonnage: String,
    pub cruising_speed: String,
    pub max_speed: String,
    pub built: String,
    pub builder: String,
    pub exterior: String,
    pub interior: String,
    pub guests: String,
    pub cabins: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YachtFields {
    pub name: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub route: String,
    #[serde(default)]
    pub specifications: YachtSpecifications,
}

impl EntityFields for YachtFields {
    fn validate(&self) -> Result<()> {
        require(&self.name, "name")
    }
}

// ==================== Helicopter ====================

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct HelicopterPerformance {
    pub max_speed: String,
    pub cruise_speed: String,
    pub range: String,
    pub service_ceiling: String,
    pub rate_of_climb: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelicopterFields {
    pub title: String,
    #[serde(default)]
    pub capacity: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub range: String,
    #[serde(default)]
    pub speed: String,
    #[serde(default)]
    pub performance: HelicopterPerformance,
}

impl EntityFields for HelicopterFields {
    fn validate(&self) -> Result<()> {
        require(&self.title, "title")
    }
}

// ==================== Car ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarFields {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub total_time: String,
    #[serde(default)]
    pub pax: String,
    #[serde(default)]
    pub price: String,
}

impl EntityFields for CarFields {
    fn validate(&self) -> Result<()> {
        require(&self.title, "title")
    }
}

// ==================== Blog post ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogPostFields {
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub category: String,
}

impl EntityFields for BlogPostFields {
    fn validate(&self) -> Result<()> {
        require(&self.title, "title")
    }
}

// ==================== Testimonial ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestimonialFields {
    pub name: String,
    pub message: String,
    #[serde(default)]
    pub designation: String,
}

impl EntityFields for TestimonialFields {
    fn validate(&self) -> Result<()> {
        require(&self.name, "name")?;
        require(&self.message, "message")
    }
}

// ==================== Review ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewFields {
    pub name: String,
    pub rating: u8,
    pub text: String,
    /// External avatar URL; reviews do not upload images
    #[serde(default)]
    pub image: String,
}

impl EntityFields for ReviewFields {
    fn validate(&self) -> Result<()> {
        require(&self.name, "name")?;
        require(&self.text, "text")?;
        if !(1..=5).contains(&self.rating) {
            return Err(AppError::BadRequest(format!(
                "Rating must be between 1 and 5, got {}",
                self.rating
            )));
        }
        Ok(())
    }
}

// ==================== Deal of the day ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealFields {
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub rating: String,
    #[serde(default)]
    pub rating_text: String,
    #[serde(default)]
    pub review_count: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub image_url: String,
}

impl EntityFields for DealFields {
    fn validate(&self) -> Result<()> {
        require(&self.name, "name")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn aircraft_nested_keys_keep_their_wire_names() {
        let fields: AircraftFields = serde_json::from_value(json!({
            "name": "Global 6000",
            "aircraftDetails": { "guestCapacity": 13, "wifiAvailable": "Yes" },
            "technicalSpecifications": { "engines": { "thrustKN": "65.6" } }
        }))
        .unwrap();

        assert_eq!(fields.aircraft_details.guest_capacity, 13);
        assert_eq!(fields.aircraft_details.wifi_available, WifiAvailability::Yes);

        let value = serde_json::to_value(&fields).unwrap();
        assert_eq!(value["technicalSpecifications"]["engines"]["thrustKN"], "65.6");
        assert_eq!(value["aircraftDetails"]["numberOfPilots"], 0);
    }

    #[test]
    fn unknown_wifi_choice_is_rejected() {
        let result: std::result::Result<AircraftFields, _> = serde_json::from_value(json!({
            "name": "Falcon",
            "aircraftDetails": { "wifiAvailable": "Maybe" }
        }));
        assert!(result.is_err());
    }

    #[test]
    fn blank_required_field_fails_validation() {
        let fields = CarFields {
            title: "  ".to_string(),
            description: String::new(),
            total_time: String::new(),
            pax: String::new(),
            price: String::new(),
        };
        assert!(fields.validate().is_err());
    }

    #[test]
    fn review_rating_must_be_one_to_five() {
        let review = ReviewFields {
            name: "Ana".to_string(),
            rating: 6,
            text: "Great flight".to_string(),
            image: String::new(),
        };
        assert!(review.validate().is_err());

        let review = ReviewFields { rating: 5, ..review };
        assert!(review.validate().is_ok());
    }
}
