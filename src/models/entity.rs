use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::str::FromStr;

use crate::config::GalleryConfig;
use crate::error::{AppError, Result};
use crate::models::fleet::{
    AircraftFields, BlogPostFields, CarFields, DealFields, EntityFields, HelicopterFields,
    ReviewFields, TestimonialFields, YachtFields,
};
use crate::models::{ImageEdit, StoredImage};

/// Entity kinds managed through forms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Aircraft,
    Car,
    Yacht,
    Helicopter,
    BlogPost,
    Testimonial,
    Review,
    Deal,
}

/// Size class of an image slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotCapacity {
    /// Single cover image
    Cover,
    /// Gallery bounded by the configured limit for the kind
    Gallery,
}

/// A named image list on an entity record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSlot {
    pub name: &'static str,
    pub capacity: SlotCapacity,
}

const fn cover(name: &'static str) -> ImageSlot {
    ImageSlot {
        name,
        capacity: SlotCapacity::Cover,
    }
}

const fn gallery(name: &'static str) -> ImageSlot {
    ImageSlot {
        name,
        capacity: SlotCapacity::Gallery,
    }
}

impl EntityKind {
    pub const ALL: [EntityKind; 8] = [
        EntityKind::Aircraft,
        EntityKind::Car,
        EntityKind::Yacht,
        EntityKind::Helicopter,
        EntityKind::BlogPost,
        EntityKind::Testimonial,
        EntityKind::Review,
        EntityKind::Deal,
    ];

    /// Route segment, e.g. `/entities/aircraft`
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Aircraft => "aircraft",
            EntityKind::Car => "cars",
            EntityKind::Yacht => "yachts",
            EntityKind::Helicopter => "helicopters",
            EntityKind::BlogPost => "blogs",
            EntityKind::Testimonial => "testimonials",
            EntityKind::Review => "reviews",
            EntityKind::Deal => "deals",
        }
    }

    /// Route segment to kind; unknown segments are `404`
    pub fn parse(s: &str) -> Result<Self> {
        s.parse()
    }

    /// Record store collection
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::Aircraft => "aircraft",
            EntityKind::Car => "cars",
            EntityKind::Yacht => "yachts",
            EntityKind::Helicopter => "helicopters",
            EntityKind::BlogPost => "luxuryJets",
            EntityKind::Testimonial => "testimonials",
            EntityKind::Review => "reviews",
            EntityKind::Deal => "admin/Dealoftehday",
        }
    }

    /// First segment of blob storage paths for this kind
    pub fn storage_prefix(&self) -> &'static str {
        match self {
            EntityKind::Aircraft => "aircraft_images",
            EntityKind::Car => "car_images",
            EntityKind::Yacht => "yacht_images",
            EntityKind::Helicopter => "helicopter_images",
            EntityKind::BlogPost => "blog_images",
            EntityKind::Testimonial => "testimonial_images",
            EntityKind::Review => "review_images",
            EntityKind::Deal => "deal_images",
        }
    }

    /// Human label used in user-facing messages
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Aircraft => "Aircraft",
            EntityKind::Car => "Car",
            EntityKind::Yacht => "Yacht",
            EntityKind::Helicopter => "Helicopter",
            EntityKind::BlogPost => "Blog post",
            EntityKind::Testimonial => "Testimonial",
            EntityKind::Review => "Review",
            EntityKind::Deal => "Deal",
        }
    }

    pub fn slots(&self) -> &'static [ImageSlot] {
        const AIRCRAFT: &[ImageSlot] = &[gallery("images")];
        const CAR: &[ImageSlot] = &[cover("img"), gallery("images")];
        const YACHT: &[ImageSlot] = &[cover("image"), gallery("images")];
        const HELICOPTER: &[ImageSlot] = &[cover("imageUrl"), gallery("images")];
        const BLOG_POST: &[ImageSlot] = &[cover("image")];
        const TESTIMONIAL: &[ImageSlot] = &[cover("imageUrl")];

        match self {
            EntityKind::Aircraft => AIRCRAFT,
            EntityKind::Car => CAR,
            EntityKind::Yacht => YACHT,
            EntityKind::Helicopter => HELICOPTER,
            EntityKind::BlogPost => BLOG_POST,
            EntityKind::Testimonial => TESTIMONIAL,
            EntityKind::Review | EntityKind::Deal => &[],
        }
    }

    pub fn slot(&self, name: &str) -> Option<ImageSlot> {
        self.slots().iter().copied().find(|slot| slot.name == name)
    }

    /// Maximum number of images a slot may hold
    pub fn max_images(&self, slot: &ImageSlot, limits: &GalleryConfig) -> usize {
        match slot.capacity {
            SlotCapacity::Cover => 1,
            SlotCapacity::Gallery => match self {
                EntityKind::Aircraft => limits.aircraft,
                EntityKind::Car => limits.car,
                EntityKind::Yacht => limits.yacht,
                EntityKind::Helicopter => limits.helicopter,
                _ => 0,
            },
        }
    }

    /// Validate submitted fields and return them in canonical form
    pub fn normalize_fields(&self, value: Value) -> Result<Map<String, Value>> {
        match self {
            EntityKind::Aircraft => normalize::<AircraftFields>(*self, value),
            EntityKind::Car => normalize::<CarFields>(*self, value),
            EntityKind::Yacht => normalize::<YachtFields>(*self, value),
            EntityKind::Helicopter => normalize::<HelicopterFields>(*self, value),
            EntityKind::BlogPost => normalize::<BlogPostFields>(*self, value),
            EntityKind::Testimonial => normalize::<TestimonialFields>(*self, value),
            EntityKind::Review => normalize::<ReviewFields>(*self, value),
            EntityKind::Deal => normalize::<DealFields>(*self, value),
        }
    }
}

fn normalize<F: EntityFields>(kind: EntityKind, value: Value) -> Result<Map<String, Value>> {
    let fields: F = serde_json::from_value(value).map_err(|e| {
        AppError::BadRequest(format!("Invalid {} fields: {}", kind.label().to_lowercase(), e))
    })?;
    fields.validate()?;

    match serde_json::to_value(&fields)? {
        Value::Object(map) => Ok(map),
        _ => Err(AppError::Internal("Entity fields must serialize to an object".to_string())),
    }
}

impl FromStr for EntityKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| AppError::NotFound(format!("Unknown entity kind: {}", s)))
    }
}

/// A persisted entity as read back from the record store
#[derive(Debug, Clone, Serialize)]
pub struct EntityRecord {
    pub id: String,
    #[serde(flatten)]
    pub value: Map<String, Value>,
}

impl EntityRecord {
    pub fn from_value(id: impl Into<String>, value: Value) -> Result<Self> {
        let id = id.into();
        match value {
            Value::Object(value) => Ok(Self { id, value }),
            _ => Err(AppError::Internal(format!("Record {} is not an object", id))),
        }
    }

    /// Images persisted in a slot; a missing key is an empty slot
    pub fn slot_images(&self, slot: &str) -> Result<Vec<StoredImage>> {
        match self.value.get(slot) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                AppError::Internal(format!(
                    "Record {} has a malformed image slot '{}': {}",
                    self.id, slot, e
                ))
            }),
        }
    }

    /// Every stored image across all slots of `kind`
    pub fn all_images(&self, kind: EntityKind) -> Result<Vec<StoredImage>> {
        let mut images = Vec::new();
        for slot in kind.slots() {
            images.extend(self.slot_images(slot.name)?);
        }
        Ok(images)
    }
}

/// A create or update submission
#[derive(Debug, Clone, Default)]
pub struct EntityForm {
    /// Scalar and nested fields, validated per kind
    pub fields: Value,
    /// Edit buffer per submitted slot. A slot missing here is left untouched on update.
    pub images: HashMap<String, Vec<ImageEdit>>,
}

impl EntityForm {
    pub fn new(fields: Value) -> Self {
        Self {
            fields,
            images: HashMap::new(),
        }
    }

    #[cfg(test)]
    pub fn with_images(mut self, slot: &str, edits: Vec<ImageEdit>) -> Self {
        self.images.insert(slot.to_string(), edits);
        self
    }
}

/// Result of deleting an entity
#[derive(Debug, Clone, Serialize)]
pub struct DeleteReport {
    pub id: String,
    pub released: usize,
    /// Storage paths whose delete failed and were left behind
    pub orphaned: Vec<String>,
}

/// Response of a create or update
#[derive(Debug, Clone, Serialize)]
pub struct SaveResponse {
    #[serde(flatten)]
    pub record: EntityRecord,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub orphaned: Vec<String>,
}
