//! Geography models: city ⊃ area ⊃ neighborhood

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{double_option, BlogPost, BusinessListing, Event, MediaItem};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    pub id: i64,
    pub slug: String,
    pub name: String,
    /// State or region, e.g. "CA"
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Area {
    pub id: i64,
    pub city_id: i64,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighborhood {
    pub id: i64,
    pub area_id: i64,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub hero_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// City page: the city and its areas
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CityWithAreas {
    #[serde(flatten)]
    pub city: City,
    pub areas: Vec<Area>,
}

/// Area page: the area, its city and its neighborhoods
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AreaWithNeighborhoods {
    #[serde(flatten)]
    pub area: Area,
    pub city: City,
    pub neighborhoods: Vec<Neighborhood>,
}

/// Neighborhood guide bundle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeighborhoodGuide {
    pub neighborhood: Neighborhood,
    pub area: Area,
    pub city: City,
    pub listings: Vec<BusinessListing>,
    pub events: Vec<Event>,
    pub posts: Vec<BlogPost>,
    pub media: Vec<MediaItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCityInput {
    #[serde(default)]
    pub slug: Option<String>,
    pub name: String,
    pub state: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCityInput {
    pub slug: Option<String>,
    pub name: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAreaInput {
    pub city_id: i64,
    #[serde(default)]
    pub slug: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateAreaInput {
    pub city_id: Option<i64>,
    pub slug: Option<String>,
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateNeighborhoodInput {
    pub area_id: i64,
    #[serde(default)]
    pub slug: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub hero_image_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateNeighborhoodInput {
    pub area_id: Option<i64>,
    pub slug: Option<String>,
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub hero_image_url: Option<Option<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_input_distinguishes_null_from_missing() {
        let input: UpdateNeighborhoodInput =
            serde_json::from_str(r#"{"name": "Mission", "description": null}"#).unwrap();
        assert_eq!(input.name.as_deref(), Some("Mission"));
        assert_eq!(input.description, Some(None));
        assert_eq!(input.hero_image_url, None);
    }

    #[test]
    fn test_city_with_areas_flattens_city() {
        let now = Utc::now();
        let value = serde_json::to_value(CityWithAreas {
            city: City {
                id: 1,
                slug: "oakland".to_string(),
                name: "Oakland".to_string(),
                state: "CA".to_string(),
                created_at: now,
                updated_at: now,
            },
            areas: vec![],
        })
        .unwrap();
        assert_eq!(value["slug"], "oakland");
        assert!(value["areas"].as_array().unwrap().is_empty());
    }
}
