use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{Error, Result};

/// A listing as returned by the search and detail endpoints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Advertisement {
    pub advertisement_id: String,
    pub category_id: i64,
    pub price: f64,
    pub title: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub thumbnail_urls: Vec<String>,
    #[serde(default, with = "crate::utils::time::option")]
    pub created_at: Option<OffsetDateTime>,
}

/// One entry of `GET /favorite/me`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteAdvertisement {
    pub advertisement_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

/// One page of a paginated listing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    #[serde(default)]
    pub total_elements: Option<u64>,
    #[serde(default)]
    pub total_pages: Option<u32>,
    /// Zero-based page index.
    #[serde(default)]
    pub number: Option<u32>,
    #[serde(default)]
    pub size: Option<u32>,
}

/// Filters for `GET /advertisements/search`.
///
/// Unset filters are left out of the query string entirely.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AdSearchParams {
    pub title: Option<String>,
    pub location: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub category_id: Option<i64>,
    pub page: Option<u32>,
    pub size: Option<u32>,
}

impl AdSearchParams {
    /// Match every listing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by title substring.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Filter by location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Restrict to prices in `[min, max]`; either bound may be open.
    pub fn with_price_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_price = min;
        self.max_price = max;
        self
    }

    /// Filter by category.
    pub fn with_category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }

    /// Request a specific page.
    pub fn with_page(mut self, page: u32, size: u32) -> Self {
        self.page = Some(page);
        self.size = Some(size);
        self
    }

    /// Reject filters the server could only answer with an empty page.
    pub fn validate(&self) -> Result<()> {
        for (name, price) in [("minPrice", self.min_price), ("maxPrice", self.max_price)] {
            if let Some(price) = price {
                if !price.is_finite() || price < 0.0 {
                    return Err(Error::validation(
                        "price bound must be a non-negative number",
                        Some(name.to_string()),
                    ));
                }
            }
        }
        if let (Some(min), Some(max)) = (self.min_price, self.max_price) {
            if min > max {
                return Err(Error::validation(
                    format!("minimum price {min} exceeds maximum price {max}"),
                    Some("minPrice".to_string()),
                ));
            }
        }
        Ok(())
    }

    /// The query pairs for the set filters, using the server's parameter names.
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        let mut push = |key: &str, value: Option<String>| {
            if let Some(value) = value {
                pairs.push((key.to_string(), value));
            }
        };
        push("title", self.title.clone().filter(|s| !s.trim().is_empty()));
        push(
            "location",
            self.location.clone().filter(|s| !s.trim().is_empty()),
        );
        push("minPrice", self.min_price.map(|p| p.to_string()));
        push("maxPrice", self.max_price.map(|p| p.to_string()));
        push("categoryId", self.category_id.map(|c| c.to_string()));
        push("page", self.page.map(|p| p.to_string()));
        push("size", self.size.map(|s| s.to_string()));
        pairs
    }
}

/// The advertisement fields sent to `POST /advertisements/new`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAdvertisementRequest {
    pub title: String,
    pub description: String,
    pub price: f64,
    pub category_id: i64,
    pub location: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl CreateAdvertisementRequest {
    pub const MIN_TITLE_LEN: usize = 5;
    pub const MIN_DESCRIPTION_LEN: usize = 20;
    pub const MIN_LOCATION_LEN: usize = 2;

    /// Check the listing before it is uploaded.
    pub fn validate(&self) -> Result<()> {
        fn too_short(field: &str, value: &str, min: usize) -> Result<()> {
            if value.trim().chars().count() < min {
                return Err(Error::validation(
                    format!("{field} must be at least {min} characters"),
                    Some(field.to_string()),
                ));
            }
            Ok(())
        }

        too_short("title", &self.title, Self::MIN_TITLE_LEN)?;
        too_short("description", &self.description, Self::MIN_DESCRIPTION_LEN)?;
        too_short("location", &self.location, Self::MIN_LOCATION_LEN)?;
        if !self.price.is_finite() || self.price <= 0.0 {
            return Err(Error::validation(
                "price must be greater than 0",
                Some("price".to_string()),
            ));
        }
        // At most two decimal places.
        let cents = self.price * 100.0;
        if (cents - cents.round()).abs() > 1e-6 {
            return Err(Error::validation(
                "price must have at most two decimal places",
                Some("price".to_string()),
            ));
        }
        Ok(())
    }
}
