//! Domain models for the Trackflow pipeline.
//!
//! - [`Track`] - one normalized track record
//! - [`TrackField`] - the addressable fields of a track, with their [`FieldKind`]
//! - [`FieldValue`] - a typed field value, used by filtering, sorting and grouping
//! - [`PlaylistDetails`] - partial playlist metadata update

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An ordered sequence of tracks; order is the working playlist order.
pub type TrackCollection = Vec<Track>;

// =============================================================================
// Track
// =============================================================================

/// A normalized music track. Every field is present once a provider has
/// produced the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    pub name: String,
    pub track_number: i64,
    pub album: String,
    pub album_id: String,
    pub album_uri: String,
    pub release_date: NaiveDate,
    pub release_year: i64,
    pub artist: String,
    pub artist_id: String,
    pub artist_uri: String,
    pub uri: String,
    pub genre: Vec<String>,
    pub popularity: i64,
    /// Milliseconds.
    pub duration: i64,
    pub explicit: bool,
}

impl Track {
    /// Read one field as a typed value.
    pub fn value(&self, field: TrackField) -> FieldValue {
        match field {
            TrackField::Id => FieldValue::Text(self.id.clone()),
            TrackField::Name => FieldValue::Text(self.name.clone()),
            TrackField::TrackNumber => FieldValue::Integer(self.track_number),
            TrackField::Album => FieldValue::Text(self.album.clone()),
            TrackField::AlbumId => FieldValue::Text(self.album_id.clone()),
            TrackField::AlbumUri => FieldValue::Text(self.album_uri.clone()),
            TrackField::ReleaseDate => FieldValue::Date(self.release_date),
            TrackField::ReleaseYear => FieldValue::Integer(self.release_year),
            TrackField::Artist => FieldValue::Text(self.artist.clone()),
            TrackField::ArtistId => FieldValue::Text(self.artist_id.clone()),
            TrackField::ArtistUri => FieldValue::Text(self.artist_uri.clone()),
            TrackField::Uri => FieldValue::Text(self.uri.clone()),
            TrackField::Genre => FieldValue::List(self.genre.clone()),
            TrackField::Popularity => FieldValue::Integer(self.popularity),
            TrackField::Duration => FieldValue::Integer(self.duration),
            TrackField::Explicit => FieldValue::Boolean(self.explicit),
        }
    }
}

// =============================================================================
// Track Field
// =============================================================================

/// Value type of a track field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Date,
    Boolean,
    List,
}

/// A track field name as written in pipeline definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackField {
    Id,
    Name,
    TrackNumber,
    Album,
    AlbumId,
    AlbumUri,
    ReleaseDate,
    ReleaseYear,
    Artist,
    ArtistId,
    ArtistUri,
    Uri,
    Genre,
    Popularity,
    Duration,
    Explicit,
}

impl TrackField {
    /// Every field, in record order.
    pub const ALL: [TrackField; 16] = [
        TrackField::Id,
        TrackField::Name,
        TrackField::TrackNumber,
        TrackField::Album,
        TrackField::AlbumId,
        TrackField::AlbumUri,
        TrackField::ReleaseDate,
        TrackField::ReleaseYear,
        TrackField::Artist,
        TrackField::ArtistId,
        TrackField::ArtistUri,
        TrackField::Uri,
        TrackField::Genre,
        TrackField::Popularity,
        TrackField::Duration,
        TrackField::Explicit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackField::Id => "id",
            TrackField::Name => "name",
            TrackField::TrackNumber => "trackNumber",
            TrackField::Album => "album",
            TrackField::AlbumId => "albumId",
            TrackField::AlbumUri => "albumUri",
            TrackField::ReleaseDate => "releaseDate",
            TrackField::ReleaseYear => "releaseYear",
            TrackField::Artist => "artist",
            TrackField::ArtistId => "artistId",
            TrackField::ArtistUri => "artistUri",
            TrackField::Uri => "uri",
            TrackField::Genre => "genre",
            TrackField::Popularity => "popularity",
            TrackField::Duration => "duration",
            TrackField::Explicit => "explicit",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            TrackField::TrackNumber
            | TrackField::ReleaseYear
            | TrackField::Popularity
            | TrackField::Duration => FieldKind::Integer,
            TrackField::ReleaseDate => FieldKind::Date,
            TrackField::Explicit => FieldKind::Boolean,
            TrackField::Genre => FieldKind::List,
            _ => FieldKind::Text,
        }
    }

    /// Fields compared without regard to case when sorting.
    pub fn sorts_case_insensitively(&self) -> bool {
        matches!(self, TrackField::Album | TrackField::Artist | TrackField::Name)
    }

    /// Fields lower-cased on both sides before filter comparison.
    pub fn filters_case_insensitively(&self) -> bool {
        self.sorts_case_insensitively() || *self == TrackField::Genre
    }

    /// All field names, for schema enums.
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(TrackField::as_str).collect()
    }
}

impl fmt::Display for TrackField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| format!("unknown track field: {}", s))
    }
}

// =============================================================================
// Field Value
// =============================================================================

/// A typed track field value.
///
/// Ordering is only meaningful between values of the same variant, which is
/// all sorting ever compares since a sort key reads one field.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Date(NaiveDate),
    Boolean(bool),
    List(Vec<String>),
}

impl FieldValue {
    /// Lower-case text and list values; other values are returned unchanged.
    pub fn to_lowercase(&self) -> FieldValue {
        match self {
            FieldValue::Text(s) => FieldValue::Text(s.to_lowercase()),
            FieldValue::List(items) => {
                FieldValue::List(items.iter().map(|s| s.to_lowercase()).collect())
            }
            other => other.clone(),
        }
    }

    /// Numeric reading used by ordering comparisons: dates become day counts,
    /// booleans 0/1, text is parsed. Lists have no numeric reading.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Text(s) => s.trim().parse::<f64>().ok(),
            FieldValue::Integer(n) => Some(*n as f64),
            FieldValue::Date(d) => Some(d.num_days_from_ce() as f64),
            FieldValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            FieldValue::List(_) => None,
        }
    }
}

// =============================================================================
// Playlist Details
// =============================================================================

/// Partial playlist metadata; only present fields are changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collaborative: Option<bool>,
}

impl PlaylistDetails {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.public.is_none()
            && self.collaborative.is_none()
    }
}
