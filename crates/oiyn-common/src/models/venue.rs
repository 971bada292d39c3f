//! Venue model: admin-curated places (anticafés) where games are hosted.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::validation::non_blank;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Venue {
    pub id: Uuid,
    pub title: String,
    pub rating: Option<String>,
    pub address: String,
    pub opening_time: NaiveTime,
    pub closing_time: NaiveTime,
    pub phone_number: String,
    pub description: Option<String>,
    pub photos: Vec<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateVenueRequest {
    #[validate(length(min = 1, max = 120))]
    pub title: String,
    #[validate(length(max = 16))]
    pub rating: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub address: String,
    pub opening_time: NaiveTime,
    pub closing_time: NaiveTime,
    #[validate(length(min = 3, max = 32))]
    pub phone_number: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[serde(default)]
    pub photos: Vec<String>,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: Option<f64>,
}

impl CreateVenueRequest {
    pub fn into_venue(self, id: Uuid, now: DateTime<Utc>) -> Venue {
        Venue {
            id,
            title: self.title,
            rating: non_blank(self.rating),
            address: self.address,
            opening_time: self.opening_time,
            closing_time: self.closing_time,
            phone_number: self.phone_number,
            description: non_blank(self.description),
            photos: self.photos,
            latitude: self.latitude,
            longitude: self.longitude,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateVenueRequest {
    #[validate(length(max = 120))]
    pub title: Option<String>,
    #[validate(length(max = 16))]
    pub rating: Option<String>,
    #[validate(length(max = 255))]
    pub address: Option<String>,
    pub opening_time: Option<NaiveTime>,
    pub closing_time: Option<NaiveTime>,
    #[validate(length(max = 32))]
    pub phone_number: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub photos: Option<Vec<String>>,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: Option<f64>,
}

/// Normalized sparse venue update.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct VenueChanges {
    pub title: Option<String>,
    pub rating: Option<String>,
    pub address: Option<String>,
    pub opening_time: Option<NaiveTime>,
    pub closing_time: Option<NaiveTime>,
    pub phone_number: Option<String>,
    pub description: Option<String>,
    pub photos: Option<Vec<String>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl From<UpdateVenueRequest> for VenueChanges {
    fn from(req: UpdateVenueRequest) -> Self {
        Self {
            title: non_blank(req.title),
            rating: non_blank(req.rating),
            address: non_blank(req.address),
            opening_time: req.opening_time,
            closing_time: req.closing_time,
            phone_number: non_blank(req.phone_number),
            description: non_blank(req.description),
            photos: req.photos.filter(|p| !p.is_empty()),
            latitude: req.latitude,
            longitude: req.longitude,
        }
    }
}

impl VenueChanges {
    pub fn apply(&self, venue: &mut Venue, now: DateTime<Utc>) {
        if let Some(v) = &self.title {
            venue.title = v.clone();
        }
        if let Some(v) = &self.rating {
            venue.rating = Some(v.clone());
        }
        if let Some(v) = &self.address {
            venue.address = v.clone();
        }
        if let Some(v) = self.opening_time {
            venue.opening_time = v;
        }
        if let Some(v) = self.closing_time {
            venue.closing_time = v;
        }
        if let Some(v) = &self.phone_number {
            venue.phone_number = v.clone();
        }
        if let Some(v) = &self.description {
            venue.description = Some(v.clone());
        }
        if let Some(v) = &self.photos {
            venue.photos = v.clone();
        }
        if let Some(v) = self.latitude {
            venue.latitude = Some(v);
        }
        if let Some(v) = self.longitude {
            venue.longitude = Some(v);
        }
        venue.updated_at = now;
    }
}
