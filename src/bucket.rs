// Time-bucket aggregation for activity heatmaps
use crate::error::{Error, Result};
use crate::model::{DumpInfo, DumpViewModel};
use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::BTreeMap;

/// Anything with a creation time can be bucketed
pub trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
}

impl Timestamped for DumpViewModel {
    fn timestamp(&self) -> DateTime<Utc> {
        self.created()
    }
}

impl Timestamped for DumpInfo {
    fn timestamp(&self) -> DateTime<Utc> {
        self.created
    }
}

impl<T: Timestamped> Timestamped for &T {
    fn timestamp(&self) -> DateTime<Utc> {
        (*self).timestamp()
    }
}

/// Bucket start (Unix seconds) to number of items, ascending by key.
/// Empty buckets are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Histogram(BTreeMap<i64, u64>);

impl Histogram {
    pub fn get(&self, key: i64) -> u64 {
        self.0.get(&key).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, u64)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }
}

/// Serialized as `{"1609459200": 3, ...}`
impl Serialize for Histogram {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, count) in &self.0 {
            map.serialize_entry(&key.to_string(), count)?;
        }
        map.end()
    }
}

/// Count items created within `[start, stop]` per left-aligned bucket of
/// `bucket_seconds`.
pub fn bucketize<I>(
    items: I,
    bucket_seconds: u32,
    start: DateTime<Utc>,
    stop: DateTime<Utc>,
) -> Result<Histogram>
where
    I: IntoIterator,
    I::Item: Timestamped,
{
    if bucket_seconds == 0 {
        return Err(Error::InvalidArgument(
            "bucket width must be at least one second".to_string(),
        ));
    }
    if start > stop {
        return Err(Error::InvalidArgument(format!(
            "range start {} is after stop {}",
            start.to_rfc3339(),
            stop.to_rfc3339()
        )));
    }

    let width = i64::from(bucket_seconds);
    let mut buckets = BTreeMap::new();
    for item in items {
        let created = item.timestamp();
        if created < start || created > stop {
            continue;
        }
        // Euclidean division floors toward negative infinity for pre-epoch times
        let key = created.timestamp().div_euclid(width) * width;
        *buckets.entry(key).or_insert(0u64) += 1;
    }
    Ok(Histogram(buckets))
}
