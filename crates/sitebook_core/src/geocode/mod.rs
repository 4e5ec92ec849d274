//! Reverse geocoding contract.
//!
//! # Responsibility
//! - Define the narrow request/response seam to an external geocoder.
//! - Provide an offline client for deployments without a provider.
//!
//! # Invariants
//! - Candidates are ranked best-first; consumers only read the first one.
//! - Clients never panic; every failure is a [`GeocodeError`].

use crate::model::geo::Coordinates;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// One ranked reverse-geocode candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceCandidate {
    /// City, town or county-level place name.
    pub locality: Option<String>,
    /// State or province, often abbreviated (`TX`).
    pub region: Option<String>,
}

impl PlaceCandidate {
    pub fn new(locality: Option<&str>, region: Option<&str>) -> Self {
        Self {
            locality: locality.map(str::to_string),
            region: region.map(str::to_string),
        }
    }

    /// `"<locality> <region>"` from whichever parts are present and non-blank.
    pub fn label(&self) -> Option<String> {
        let parts = [self.locality.as_deref(), self.region.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// Reverse geocoding failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeocodeError {
    /// No provider is configured or reachable.
    Unavailable(String),
    /// Provider answered with an error or an unreadable response.
    Provider(String),
}

impl Display for GeocodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(reason) => write!(f, "geocoder unavailable: {reason}"),
            Self::Provider(message) => write!(f, "geocoder error: {message}"),
        }
    }
}

impl Error for GeocodeError {}

/// Coordinates-to-place lookup.
pub trait GeocodingClient {
    fn reverse_geocode(&self, coordinates: Coordinates)
        -> Result<Vec<PlaceCandidate>, GeocodeError>;
}

/// Client that always reports the provider as unavailable.
///
/// Names then fall back to coordinate-encoded slugs.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineGeocoder;

impl GeocodingClient for OfflineGeocoder {
    fn reverse_geocode(
        &self,
        _coordinates: Coordinates,
    ) -> Result<Vec<PlaceCandidate>, GeocodeError> {
        Err(GeocodeError::Unavailable(
            "no geocoding provider configured".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::PlaceCandidate;

    #[test]
    fn label_degrades_when_parts_missing() {
        assert_eq!(
            PlaceCandidate::new(Some("Amarillo"), Some("TX")).label().as_deref(),
            Some("Amarillo TX")
        );
        assert_eq!(
            PlaceCandidate::new(None, Some("TX")).label().as_deref(),
            Some("TX")
        );
        assert_eq!(PlaceCandidate::new(Some("  "), None).label(), None);
    }
}
