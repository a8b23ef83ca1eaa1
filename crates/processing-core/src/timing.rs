//! Active-caption lookup.
//!
//! Overlapping chunks resolve by list order: the first chunk whose closed
//! interval contains the time wins.

use reelcap_project_model::{CaptionChunk, ChunkId};

/// The chunk active at `time_secs`, if any.
pub fn active_chunk(time_secs: f64, chunks: &[CaptionChunk]) -> Option<&CaptionChunk> {
    chunks.iter().find(|c| c.contains(time_secs))
}

/// Cached id of the active chunk, for list highlighting.
///
/// The cache is recomputed on every `update`, so an id never outlives the
/// interval that made it active.
#[derive(Debug, Clone, Default)]
pub struct ActiveCaptionTracker {
    active: Option<ChunkId>,
}

impl ActiveCaptionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute for a new time or chunk list. Returns `true` if the active id
    /// changed.
    pub fn update(&mut self, time_secs: f64, chunks: &[CaptionChunk]) -> bool {
        let next = active_chunk(time_secs, chunks).map(|c| c.id);
        let changed = next != self.active;
        self.active = next;
        changed
    }

    pub fn active(&self) -> Option<ChunkId> {
        self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn chunks() -> Vec<CaptionChunk> {
        vec![
            CaptionChunk::new(0.0, 1.0, "first"),
            CaptionChunk::new(2.0, 3.0, "second"),
            CaptionChunk::new(2.5, 4.0, "overlap"),
        ]
    }

    #[test]
    fn test_gap_returns_none() {
        let list = chunks();
        assert!(active_chunk(1.5, &list).is_none());
        assert!(active_chunk(-0.1, &list).is_none());
        assert!(active_chunk(4.1, &list).is_none());
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let list = chunks();
        assert_eq!(active_chunk(0.0, &list).map(|c| c.text.as_str()), Some("first"));
        assert_eq!(active_chunk(1.0, &list).map(|c| c.text.as_str()), Some("first"));
    }

    #[test]
    fn test_overlap_first_in_list_wins() {
        let list = chunks();
        assert_eq!(active_chunk(2.7, &list).map(|c| c.text.as_str()), Some("second"));
        assert_eq!(active_chunk(3.5, &list).map(|c| c.text.as_str()), Some("overlap"));
    }

    #[test]
    fn test_tracker_drops_stale_id() {
        let mut list = chunks();
        let mut tracker = ActiveCaptionTracker::new();

        assert!(tracker.update(0.5, &list));
        assert_eq!(tracker.active(), Some(list[0].id));

        // Same time, but the chunk was retimed away from it.
        list[0].start = 5.0;
        list[0].end = 6.0;
        assert!(tracker.update(0.5, &list));
        assert_eq!(tracker.active(), None);
        assert!(!tracker.update(0.5, &list));
    }

    /// Back-to-back chunks separated by non-negative gaps.
    fn disjoint_chunks() -> impl Strategy<Value = Vec<CaptionChunk>> {
        prop::collection::vec((0.0f64..2.0, 0.05f64..3.0), 1..12).prop_map(|spans| {
            let mut cursor = 0.0;
            spans
                .into_iter()
                .enumerate()
                .map(|(i, (gap, duration))| {
                    let start = cursor + gap;
                    cursor = start + duration;
                    CaptionChunk::new(start, cursor, format!("chunk {i}"))
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_time_strictly_inside_finds_that_chunk(
            list in disjoint_chunks(),
            pick in any::<prop::sample::Index>(),
            frac in 0.01f64..0.99,
        ) {
            let target = &list[pick.index(list.len())];
            let t = target.start + frac * (target.end - target.start);
            prop_assert_eq!(active_chunk(t, &list).map(|c| c.id), Some(target.id));
        }

        #[test]
        fn prop_lookup_is_idempotent_and_contains_time(t in -1.0f64..6.0) {
            let list = chunks();
            let a = active_chunk(t, &list).map(|c| c.id);
            let b = active_chunk(t, &list).map(|c| c.id);
            prop_assert_eq!(a, b);
            match active_chunk(t, &list) {
                Some(chunk) => prop_assert!(chunk.contains(t)),
                None => prop_assert!(list.iter().all(|c| !c.contains(t))),
            }
        }
    }
}
