//! Sort and group track collections.
//!
//! Grouping partitions a collection by one field, sorts inside each group,
//! then optionally orders the groups themselves by their first track.
//!
//! # Architecture
//!
//! ```text
//! Input (playlist order)   group_by: album       sort: trackNumber     sort_group: album desc
//! ┌──────────────┐         ┌───────────────┐     ┌───────────────┐     ┌───────────────┐
//! │ (bbb, 2)     │         │ bbb: 2, 1, 3  │     │ bbb: 1, 2, 3  │     │ bbb: 1, 2, 3  │
//! │ (aaa, 1)     │    →    │ aaa: 1, 3, 2  │  →  │ aaa: 1, 2, 3  │  →  │ aaa: 1, 2, 3  │
//! │ (aaa, 3) ... │         └───────────────┘     └───────────────┘     └───────────────┘
//! └──────────────┘          first-seen order       stable, per group    by representative
//! ```
//!
//! Album, artist and name compare case-insensitively; every other field uses
//! its native ordering. All sorts are stable, so equal keys keep their
//! relative order and the output is always a permutation of the input.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use crate::models::{FieldValue, Track, TrackCollection, TrackField};

/// Sort direction for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        }
    }
}

/// Ordered sort keys; earlier keys take precedence, later ones break ties.
///
/// Serialized as a map (`{ album: asc, trackNumber: desc }`) whose key order
/// is the precedence order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSpec {
    keys: Vec<(TrackField, Direction)>,
}

impl SortSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a key with lower precedence than those already present.
    pub fn by(mut self, field: TrackField, direction: Direction) -> Self {
        self.keys.push((field, direction));
        self
    }

    pub fn keys(&self) -> &[(TrackField, Direction)] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Compare two tracks key by key.
    pub fn compare(&self, a: &Track, b: &Track) -> Ordering {
        for (field, direction) in &self.keys {
            let ordering = direction.apply(sort_key(a, *field).cmp(&sort_key(b, *field)));
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

fn sort_key(track: &Track, field: TrackField) -> FieldValue {
    let value = track.value(field);
    if field.sorts_case_insensitively() {
        value.to_lowercase()
    } else {
        value
    }
}

impl Serialize for SortSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.keys.len()))?;
        for (field, direction) in &self.keys {
            map.serialize_entry(field, direction)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SortSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SortSpecVisitor;

        impl<'de> Visitor<'de> for SortSpecVisitor {
            type Value = SortSpec;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of track field to sort direction")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<SortSpec, A::Error> {
                let mut keys = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((field, direction)) = access.next_entry::<TrackField, Direction>()? {
                    keys.push((field, direction));
                }
                Ok(SortSpec { keys })
            }
        }

        deserializer.deserialize_map(SortSpecVisitor)
    }
}

/// Sort a collection, optionally grouped.
///
/// Without `group_by` the whole collection is one group. With it, groups
/// appear in first-seen order unless `group_sort` orders them by each
/// group's first track (after its own sort).
pub fn order_collection(
    tracks: &[Track],
    sort: &SortSpec,
    group_by: Option<TrackField>,
    group_sort: Option<&SortSpec>,
) -> TrackCollection {
    let mut groups = match group_by {
        Some(field) => partition(tracks, field),
        None => vec![tracks.to_vec()],
    };

    for group in &mut groups {
        group.sort_by(|a, b| sort.compare(a, b));
    }

    if let Some(group_sort) = group_sort {
        groups.sort_by(|a, b| match (a.first(), b.first()) {
            (Some(a), Some(b)) => group_sort.compare(a, b),
            _ => Ordering::Equal,
        });
    }

    groups.into_iter().flatten().collect()
}

/// Split by the exact value of `field`, keeping first-seen group order.
fn partition(tracks: &[Track], field: TrackField) -> Vec<Vec<Track>> {
    let mut slots: HashMap<FieldValue, usize> = HashMap::new();
    let mut groups: Vec<Vec<Track>> = Vec::new();

    for track in tracks {
        let slot = *slots.entry(track.value(field)).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(track.clone());
    }

    groups
}

/// JSON Schema for a sort specification.
pub fn sort_spec_schema() -> Value {
    let properties: serde_json::Map<String, Value> = TrackField::ALL
        .iter()
        .map(|field| (field.as_str().to_string(), json!({ "enum": ["asc", "desc"] })))
        .collect();

    json!({
        "type": "object",
        "minProperties": 1,
        "additionalProperties": false,
        "properties": properties
    })
}

/// JSON Schema for a single track field name.
pub fn field_name_schema() -> Value {
    json!({ "enum": TrackField::names() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::track;
    use serde_json::json;

    fn album_track(id: &str, album: &str, number: i64) -> Track {
        let mut t = track(id);
        t.album = album.to_string();
        t.track_number = number;
        t
    }

    fn albums(tracks: &[Track]) -> Vec<&str> {
        tracks.iter().map(|t| t.album.as_str()).collect()
    }

    #[test]
    fn test_case_insensitive_album_sort() {
        let tracks: Vec<Track> = ["aaa", "AAA", "ccc", "CCC", "bbb", "bbb"]
            .iter()
            .enumerate()
            .map(|(i, a)| album_track(&i.to_string(), a, 1))
            .collect();

        let sort = SortSpec::new().by(TrackField::Album, Direction::Asc);
        let sorted = order_collection(&tracks, &sort, None, None);
        assert_eq!(albums(&sorted), vec!["aaa", "AAA", "bbb", "bbb", "ccc", "CCC"]);
    }

    #[test]
    fn test_grouped_sort_with_group_order() {
        let pairs = [("bbb", 2), ("aaa", 1), ("aaa", 3), ("bbb", 1), ("bbb", 3), ("aaa", 2)];
        let tracks: Vec<Track> = pairs
            .iter()
            .enumerate()
            .map(|(i, (a, n))| album_track(&i.to_string(), a, *n))
            .collect();

        let sort = SortSpec::new().by(TrackField::TrackNumber, Direction::Asc);
        let groups = SortSpec::new().by(TrackField::Album, Direction::Desc);
        let sorted = order_collection(&tracks, &sort, Some(TrackField::Album), Some(&groups));

        let result: Vec<(&str, i64)> = sorted.iter().map(|t| (t.album.as_str(), t.track_number)).collect();
        assert_eq!(
            result,
            vec![("bbb", 1), ("bbb", 2), ("bbb", 3), ("aaa", 1), ("aaa", 2), ("aaa", 3)]
        );
    }

    #[test]
    fn test_groups_keep_first_seen_order_without_group_sort() {
        let tracks = vec![
            album_track("1", "zzz", 2),
            album_track("2", "aaa", 1),
            album_track("3", "zzz", 1),
        ];
        let sort = SortSpec::new().by(TrackField::TrackNumber, Direction::Asc);
        let sorted = order_collection(&tracks, &sort, Some(TrackField::Album), None);
        let ids: Vec<&str> = sorted.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "1", "2"]);
    }

    #[test]
    fn test_later_keys_break_ties() {
        let mut a = album_track("a", "X", 2);
        a.popularity = 10;
        let mut b = album_track("b", "X", 1);
        b.popularity = 10;
        let mut c = album_track("c", "X", 3);
        c.popularity = 90;

        let sort = SortSpec::new()
            .by(TrackField::Popularity, Direction::Desc)
            .by(TrackField::TrackNumber, Direction::Asc);
        let sorted = order_collection(&[a, b, c], &sort, None, None);
        let ids: Vec<&str> = sorted.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_sort_is_stable_permutation_and_idempotent() {
        let tracks: Vec<Track> = (0..20)
            .map(|i| album_track(&i.to_string(), if i % 3 == 0 { "B" } else { "a" }, i % 4))
            .collect();
        let sort = SortSpec::new().by(TrackField::TrackNumber, Direction::Asc);

        let once = order_collection(&tracks, &sort, None, None);
        let twice = order_collection(&once, &sort, None, None);
        assert_eq!(once, twice);
        assert_eq!(once.len(), tracks.len());

        let mut before: Vec<&str> = tracks.iter().map(|t| t.id.as_str()).collect();
        let mut after: Vec<&str> = once.iter().map(|t| t.id.as_str()).collect();
        before.sort();
        after.sort();
        assert_eq!(before, after);

        // Equal keys keep input order.
        let zeros: Vec<&str> = once
            .iter()
            .filter(|t| t.track_number == 0)
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(zeros, vec!["0", "4", "8", "12", "16"]);
    }

    #[test]
    fn test_sort_spec_preserves_key_order() {
        let spec: SortSpec =
            serde_json::from_value(json!({ "releaseYear": "desc", "album": "asc", "trackNumber": "asc" })).unwrap();
        assert_eq!(
            spec.keys(),
            &[
                (TrackField::ReleaseYear, Direction::Desc),
                (TrackField::Album, Direction::Asc),
                (TrackField::TrackNumber, Direction::Asc),
            ]
        );
        assert_eq!(
            serde_json::to_value(&spec).unwrap(),
            json!({ "releaseYear": "desc", "album": "asc", "trackNumber": "asc" })
        );
    }

    #[test]
    fn test_sort_spec_schema() {
        let schema = sort_spec_schema();
        assert!(jsonschema::draft7::is_valid(&schema, &json!({ "album": "asc" })));
        assert!(!jsonschema::draft7::is_valid(&schema, &json!({})));
        assert!(!jsonschema::draft7::is_valid(&schema, &json!({ "album": "up" })));
        assert!(!jsonschema::draft7::is_valid(&schema, &json!({ "mood": "asc" })));
    }
}
