//! Canonical name generation.
//!
//! # Responsibility
//! - Derive a slug from a location phrase, a coordinate pair, or a timestamp.
//! - Guarantee the returned name is not taken in the project store.
//!
//! # Invariants
//! - Every base name ends with the configured domain suffix; uniqueness
//!   counters are appended after it.
//! - The geocoder is consulted at most once per 4-decimal coordinate pair
//!   while the pair stays cached.
//! - Store and geocoder failures never escape; a fallback name always exists.

use crate::config::SitebookConfig;
use crate::geocode::GeocodingClient;
use crate::model::geo::Coordinates;
use crate::model::project::now_epoch_ms;
use crate::repo::project_repo::ProjectStore;
use chrono::Utc;
use log::{debug, info, warn};
use mini_moka::sync::Cache;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;

/// Words cut from the edges of a captured location phrase.
const PHRASE_EDGE_WORDS: &[&str] = &[
    "a", "an", "the", "new", "my", "our", "this", "that", "project", "site", "create", "make",
    "start", "analyze", "analyse", "please", "called", "named", "in", "at", "near", "for", "on",
];

const PLACE: &str = r"(?P<place>[a-z][a-z0-9 '\-]*?)";
const PLACE_END: &str =
    r"\s*(?:$|[.,;:!?()]|\s+(?:with|using|and|near|at|in|on|from|by|for|to)\b)";

/// Ordered location-phrase rules; the first rule yielding a phrase wins.
static PHRASE_RULES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        format!(r"(?i)\bin\s+{PLACE}{PLACE_END}"),
        format!(r"(?i)\bat\s+{PLACE}{PLACE_END}"),
        format!(r"(?i)\bnear\s+{PLACE}{PLACE_END}"),
        r"(?i)\b(?P<place>[a-z][a-z0-9'\-]*(?:\s+[a-z][a-z0-9'\-]*){0,3}?)\s+wind\s+farm\b"
            .to_string(),
        format!(r"(?i)\bfor\s+{PLACE}{PLACE_END}"),
        format!(
            r"(?i)\bcreate\s+(?:a\s+)?(?:new\s+)?project\s+(?:called\s+|named\s+)?{PLACE}{PLACE_END}"
        ),
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid naming rule"))
    .collect()
});

static SEPARATOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s_]+").expect("valid ws regex"));
static HYPHEN_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"-{2,}").expect("valid hyphen regex"));

/// How a generated name was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameSource {
    /// A location phrase found in the query text.
    Phrase,
    /// Reverse-geocoded locality/region.
    Geocoded,
    /// Hemisphere-signed coordinate encoding after a geocoder failure.
    CoordinateFallback,
    /// Generic prefix plus timestamp.
    Generic,
}

/// Generator output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedName {
    /// Unique canonical name.
    pub name: String,
    /// Human label the name was derived from, when one exists.
    pub location: Option<String>,
    pub source: NameSource,
}

#[derive(Debug, Clone)]
struct CachedBase {
    base: String,
    label: Option<String>,
    source: NameSource,
}

/// Location-aware canonical name generator.
pub struct CanonicalNameGenerator<S, G> {
    store: Arc<S>,
    geocoder: G,
    cache: Cache<(i64, i64), CachedBase>,
    suffix: String,
    suffix_ceiling: u32,
}

impl<S: ProjectStore, G: GeocodingClient> CanonicalNameGenerator<S, G> {
    pub fn new(store: Arc<S>, geocoder: G, config: &SitebookConfig) -> Self {
        Self {
            store,
            geocoder,
            cache: Cache::new(config.geocode_cache_capacity),
            suffix: config.name_suffix.clone(),
            suffix_ceiling: config.unique_suffix_ceiling,
        }
    }

    /// Names a project from free text, falling back to coordinates and then
    /// to a timestamp.
    pub fn generate_from_query(
        &self,
        query: &str,
        coordinates: Option<Coordinates>,
    ) -> GeneratedName {
        if let Some(phrase) = extract_location_phrase(query) {
            let base = self.normalize(&phrase);
            if !base.is_empty() && base != self.suffix {
                return GeneratedName {
                    name: self.ensure_unique(&base),
                    location: Some(phrase),
                    source: NameSource::Phrase,
                };
            }
        }

        if let Some(coordinates) = coordinates {
            return self.generate_from_coordinates(coordinates.latitude, coordinates.longitude);
        }

        let base = self.normalize(&format!("site-{}", Utc::now().format("%Y%m%d%H%M%S%3f")));
        GeneratedName {
            name: self.ensure_unique(&base),
            location: None,
            source: NameSource::Generic,
        }
    }

    /// Names a project from a coordinate pair via the geocoder, caching the
    /// base name per rounded pair.
    pub fn generate_from_coordinates(&self, latitude: f64, longitude: f64) -> GeneratedName {
        let coordinates = Coordinates::new(latitude, longitude);
        let key = coordinates.rounded_key();

        let cached = match self.cache.get(&key) {
            Some(hit) => {
                debug!(
                    "event=name_geocode module=naming status=cache_hit key={},{}",
                    key.0, key.1
                );
                hit
            }
            None => {
                let resolved = self.resolve_base(coordinates, key);
                self.cache.insert(key, resolved.clone());
                resolved
            }
        };

        GeneratedName {
            name: self.ensure_unique(&cached.base),
            location: cached.label,
            source: cached.source,
        }
    }

    /// Slugifies `text` and appends the domain suffix unless present.
    pub fn normalize(&self, text: &str) -> String {
        normalize_name(text, &self.suffix)
    }

    /// Returns `base` when free, else the first free `base-N` for
    /// `N in 2..=ceiling`, else `base-<epoch ms>`.
    pub fn ensure_unique(&self, base: &str) -> String {
        let taken = match self.store.list_names() {
            Ok(names) => names.into_iter().collect::<HashSet<_>>(),
            Err(err) => {
                warn!(
                    "event=name_unique module=naming status=fallback reason=store_error base={} error={}",
                    base, err
                );
                return timestamp_variant(base);
            }
        };

        if !taken.contains(base) {
            return base.to_string();
        }
        for n in 2..=self.suffix_ceiling {
            let candidate = format!("{base}-{n}");
            if !taken.contains(&candidate) {
                return candidate;
            }
        }

        warn!(
            "event=name_unique module=naming status=fallback reason=ceiling base={} ceiling={}",
            base, self.suffix_ceiling
        );
        timestamp_variant(base)
    }

    fn resolve_base(&self, coordinates: Coordinates, key: (i64, i64)) -> CachedBase {
        match self.geocoder.reverse_geocode(coordinates) {
            Ok(candidates) => {
                if let Some(label) = candidates.first().and_then(|place| place.label()) {
                    let base = self.normalize(&label);
                    if !base.is_empty() && base != self.suffix {
                        info!(
                            "event=name_geocode module=naming status=ok key={},{} base={}",
                            key.0, key.1, base
                        );
                        return CachedBase {
                            base,
                            label: Some(label),
                            source: NameSource::Geocoded,
                        };
                    }
                }
                warn!(
                    "event=name_geocode module=naming status=fallback reason=no_usable_candidate key={},{}",
                    key.0, key.1
                );
            }
            Err(err) => {
                warn!(
                    "event=name_geocode module=naming status=fallback reason=geocoder_error key={},{} error={}",
                    key.0, key.1, err
                );
            }
        }

        CachedBase {
            base: self.normalize(&coordinate_slug(key)),
            label: None,
            source: NameSource::CoordinateFallback,
        }
    }
}

/// Slug rules: lower-case, whitespace/underscore to `-`, drop anything
/// outside `[a-z0-9-]`, collapse and trim hyphens, then append `suffix`.
///
/// Returns an empty string when nothing survives slugging.
pub fn normalize_name(text: &str, suffix: &str) -> String {
    let lowered = text.to_lowercase();
    let hyphenated = SEPARATOR_RE.replace_all(&lowered, "-");
    let filtered = hyphenated
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .collect::<String>();
    let collapsed = HYPHEN_RUN_RE.replace_all(&filtered, "-");
    let slug = collapsed.trim_matches('-');
    if slug.is_empty() {
        return String::new();
    }
    if suffix.is_empty() || slug == suffix || slug.ends_with(&format!("-{suffix}")) {
        return slug.to_string();
    }
    format!("{slug}-{suffix}")
}

/// Finds the first location phrase in `query` per the ordered rule table.
pub fn extract_location_phrase(query: &str) -> Option<String> {
    PHRASE_RULES.iter().find_map(|rule| {
        rule.captures(query)
            .and_then(|caps| caps.name("place"))
            .and_then(|place| trim_edge_words(place.as_str()))
    })
}

fn trim_edge_words(phrase: &str) -> Option<String> {
    let mut words = phrase.split_whitespace().collect::<Vec<_>>();
    while words
        .first()
        .is_some_and(|word| PHRASE_EDGE_WORDS.contains(&word.to_lowercase().as_str()))
    {
        words.remove(0);
    }
    while words
        .last()
        .is_some_and(|word| PHRASE_EDGE_WORDS.contains(&word.to_lowercase().as_str()))
    {
        words.pop();
    }
    let has_word = words
        .iter()
        .any(|word| word.chars().next().is_some_and(|c| c.is_alphabetic()));
    if has_word {
        Some(words.join(" "))
    } else {
        None
    }
}

/// `site-n35-0675-w101-3955` for a rounded key of `(350675, -1013955)`.
fn coordinate_slug(key: (i64, i64)) -> String {
    let (lat, lon) = key;
    format!(
        "site-{}-{}",
        encode_axis(lat, 'n', 's'),
        encode_axis(lon, 'e', 'w')
    )
}

fn encode_axis(value: i64, positive: char, negative: char) -> String {
    let hemisphere = if value < 0 { negative } else { positive };
    let magnitude = value.unsigned_abs();
    format!("{hemisphere}{}-{:04}", magnitude / 10_000, magnitude % 10_000)
}

fn timestamp_variant(base: &str) -> String {
    format!("{base}-{}", now_epoch_ms())
}
