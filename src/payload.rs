//! Randomly generated YAML payloads
//!
//! Every write regenerates all fields except `id` and `created_at`, which are
//! carried over from the previous payload of the same file.

use crate::error::PayloadError;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Largest random base for a run's id sequence
const MAX_ID_BASE: i64 = 1_000_000;

/// One file's content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub id: i64,

    pub int: i64,
    pub float: f32,
    pub bool: bool,
    pub string: String,
    pub slice: Vec<String>,
    pub map: BTreeMap<String, String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payload {
    /// Generate a payload with random fields and both timestamps set to `now`
    pub fn generate<R: Rng + ?Sized>(rng: &mut R, id: i64, now: DateTime<Utc>) -> Self {
        let slice_len = rng.gen_range(1..=5);
        let slice = (0..slice_len)
            .map(|_| {
                let len = rng.gen_range(3..=10);
                random_string(&mut *rng, len)
            })
            .collect();

        let map_len = rng.gen_range(1..=5);
        let map = (0..map_len)
            .map(|i: usize| {
                let len = rng.gen_range(3..=10);
                (i.to_string(), random_string(&mut *rng, len))
            })
            .collect();

        Self {
            id,
            int: rng.gen_range(0..1000),
            float: rng.gen::<f32>() * 100.0,
            bool: rng.gen_bool(0.5),
            string: random_string(rng, 10),
            slice,
            map,
            created_at: now,
            updated_at: now,
        }
    }

    /// Generate the next revision of `previous`
    ///
    /// Keeps `id` and `created_at`. `updated_at` is `now`, bumped forward if
    /// needed so it is strictly later than the previous revision.
    pub fn next_revision<R: Rng + ?Sized>(
        rng: &mut R,
        previous: &Payload,
        now: DateTime<Utc>,
    ) -> Self {
        let mut next = Self::generate(rng, previous.id, now);
        next.created_at = previous.created_at;

        let floor = previous.updated_at + ChronoDuration::nanoseconds(1);
        if next.updated_at < floor {
            next.updated_at = floor;
        }

        next
    }

    pub fn to_yaml(&self) -> Result<String, PayloadError> {
        serde_yaml::to_string(self).map_err(PayloadError::Serialize)
    }

    pub fn from_yaml(data: &[u8]) -> Result<Self, PayloadError> {
        serde_yaml::from_slice(data).map_err(PayloadError::Deserialize)
    }
}

fn random_string<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Hands out ids that are unique within one run
///
/// The sequence starts at a random base so separate runs do not reuse the
/// same ids for new files.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicI64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::starting_at(rand::thread_rng().gen_range(0..MAX_ID_BASE))
    }

    pub fn starting_at(base: i64) -> Self {
        Self {
            next: AtomicI64::new(base),
        }
    }

    pub fn next_id(&self) -> i64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_shape() {
        let mut rng = rand::thread_rng();
        let now = Utc::now();

        for _ in 0..50 {
            let p = Payload::generate(&mut rng, 7, now);
            assert_eq!(p.id, 7);
            assert!((0..1000).contains(&p.int));
            assert!((0.0..=100.0).contains(&p.float));
            assert_eq!(p.string.len(), 10);
            assert!((1..=5).contains(&p.slice.len()));
            assert!(p.slice.iter().all(|s| (3..=10).contains(&s.len())));
            assert!((1..=5).contains(&p.map.len()));
            assert!(p.map.contains_key("0"));
            assert!(p.string.chars().all(|c| c.is_ascii_alphabetic()));
            assert_eq!(p.created_at, now);
            assert_eq!(p.updated_at, now);
        }
    }

    #[test]
    fn test_yaml_field_names() {
        let mut rng = rand::thread_rng();
        let yaml = Payload::generate(&mut rng, 42, Utc::now()).to_yaml().unwrap();

        for key in [
            "id:", "int:", "float:", "bool:", "string:", "slice:", "map:",
            "created_at:", "updated_at:",
        ] {
            assert!(yaml.contains(key), "missing {} in {}", key, yaml);
        }

        let parsed = Payload::from_yaml(yaml.as_bytes()).unwrap();
        assert_eq!(parsed.id, 42);
    }

    #[test]
    fn test_next_revision_preserves_identity() {
        let mut rng = rand::thread_rng();
        let t0 = Utc::now() - ChronoDuration::hours(1);
        let previous = Payload::generate(&mut rng, 42, t0);

        let next = Payload::next_revision(&mut rng, &previous, Utc::now());

        assert_eq!(next.id, 42);
        assert_eq!(next.created_at, t0);
        assert!(next.updated_at > t0);
    }

    #[test]
    fn test_next_revision_strictly_increases() {
        let mut rng = rand::thread_rng();
        let now = Utc::now();
        let previous = Payload::generate(&mut rng, 1, now);

        // Same clock reading as the previous write
        let next = Payload::next_revision(&mut rng, &previous, now);
        assert!(next.updated_at > previous.updated_at);
    }

    #[test]
    fn test_from_yaml_rejects_garbage() {
        assert!(matches!(
            Payload::from_yaml(b"id: [not, a, number]"),
            Err(PayloadError::Deserialize(_))
        ));
    }

    #[test]
    fn test_id_allocator_unique() {
        let ids = IdAllocator::starting_at(10);
        assert_eq!(ids.next_id(), 10);
        assert_eq!(ids.next_id(), 11);
        assert_eq!(ids.next_id(), 12);
    }
}
