//! Timeline interaction model.
//!
//! Two pointer gestures share one time axis:
//! - **Scrub:** press on the track background, then every move re-seeks.
//! - **Chunk drag:** press on a caption block (body or one of its edge
//!   handles), then every move retimes that chunk relative to a snapshot
//!   taken at press time. Each intermediate move commits to the track.
//!
//! A press and release on a block with no movement in between is a click
//! and seeks to the chunk start.

use reelcap_project_model::{CaptionChunk, CaptionTrack, ChunkId, MIN_CHUNK_DURATION_SECS};
use serde::{Deserialize, Serialize};

/// Zoom limits, in pixels per second.
pub const MIN_PIXELS_PER_SECOND: f64 = 10.0;
pub const MAX_PIXELS_PER_SECOND: f64 = 200.0;
pub const DEFAULT_PIXELS_PER_SECOND: f64 = 50.0;

/// The track is never narrower than this, even for very short clips.
pub const MIN_TRACK_WIDTH_PX: f64 = 600.0;

/// Width of the resize handle at each edge of a caption block.
pub const RESIZE_HANDLE_PX: f64 = 12.0;

/// A moved chunk never collapses below this span.
pub const MOVE_MIN_DURATION_SECS: f64 = 0.5;

/// What a drag does to its chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DragMode {
    Move,
    ResizeStart,
    ResizeEnd,
}

/// State captured when a chunk drag begins.
#[derive(Debug, Clone, PartialEq)]
pub struct DragSession {
    pub subject: ChunkId,
    pub mode: DragMode,
    /// Pointer x at press time, in viewport pixels.
    pub anchor_x: f64,
    /// The chunk as it was at press time.
    pub original: CaptionChunk,
}

impl DragSession {
    /// Span for a pointer at `pointer_x`, before track-level clamping.
    pub fn span_at(&self, pointer_x: f64, pixels_per_second: f64) -> (f64, f64) {
        let delta = (pointer_x - self.anchor_x) / pixels_per_second;
        let CaptionChunk { start, end, .. } = self.original;

        match self.mode {
            DragMode::Move => {
                let new_start = (start + delta).max(0.0);
                let new_end = (end + delta).max(new_start + MOVE_MIN_DURATION_SECS);
                (new_start, new_end)
            }
            DragMode::ResizeStart => {
                // A chunk shorter than the floor ending before 0.2 s pins start
                // at 0; committing then pushes end out to the floor.
                let new_start = (start + delta)
                    .min(end - MIN_CHUNK_DURATION_SECS)
                    .max(0.0);
                (new_start, end)
            }
            DragMode::ResizeEnd => {
                let new_end = (end + delta).max(start + MIN_CHUNK_DURATION_SECS);
                (start, new_end)
            }
        }
    }
}

/// Where the track sits in the viewport.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrackView {
    /// Left edge of the visible track area, in viewport pixels.
    pub track_left: f64,
    /// Horizontal scroll of the track content.
    pub scroll_offset: f64,
}

impl TrackView {
    /// Viewport x to track-content x.
    pub fn content_x(&self, pointer_x: f64) -> f64 {
        pointer_x - self.track_left + self.scroll_offset
    }
}

/// What a press landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerTarget {
    Background,
    Chunk { id: ChunkId, mode: DragMode },
}

/// Effect of a pointer event on the outside world.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TimelineAction {
    /// Seek playback to this time.
    Seek(f64),
    /// The chunk was retimed and committed to the track.
    ChunkUpdated(ChunkId),
}

#[derive(Debug, Clone, PartialEq)]
enum Gesture {
    Idle,
    Scrubbing,
    Dragging { session: DragSession, moved: bool },
}

/// Pointer gesture controller for the caption timeline.
#[derive(Debug, Clone)]
pub struct TimelineModel {
    pixels_per_second: f64,
    duration: f64,
    gesture: Gesture,
}

impl TimelineModel {
    pub fn new(duration: f64) -> Self {
        Self {
            pixels_per_second: DEFAULT_PIXELS_PER_SECOND,
            duration: duration.max(0.0),
            gesture: Gesture::Idle,
        }
    }

    pub fn pixels_per_second(&self) -> f64 {
        self.pixels_per_second
    }

    /// Set zoom, clamped to the supported range.
    pub fn set_zoom(&mut self, pixels_per_second: f64) {
        self.pixels_per_second =
            pixels_per_second.clamp(MIN_PIXELS_PER_SECOND, MAX_PIXELS_PER_SECOND);
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn set_duration(&mut self, duration: f64) {
        self.duration = duration.max(0.0);
    }

    /// Total width of the track content.
    pub fn track_width(&self) -> f64 {
        (self.duration * self.pixels_per_second).max(MIN_TRACK_WIDTH_PX)
    }

    /// Track-content x of a time (playhead, grid markers).
    pub fn time_to_x(&self, time_secs: f64) -> f64 {
        time_secs * self.pixels_per_second
    }

    /// Time under a viewport x, clamped to the clip.
    pub fn time_at(&self, pointer_x: f64, view: &TrackView) -> f64 {
        (view.content_x(pointer_x) / self.pixels_per_second).clamp(0.0, self.duration)
    }

    /// `(left, width)` of a chunk's block in track-content pixels.
    pub fn chunk_block(&self, chunk: &CaptionChunk) -> (f64, f64) {
        (
            self.time_to_x(chunk.start),
            chunk.duration() * self.pixels_per_second,
        )
    }

    /// Resolve a press position against the blocks on the track.
    ///
    /// Blocks later in the list are drawn on top, so they win the hit test.
    pub fn hit_test(&self, pointer_x: f64, view: &TrackView, track: &CaptionTrack) -> PointerTarget {
        let x = view.content_x(pointer_x);
        for chunk in track.chunks().iter().rev() {
            let (left, width) = self.chunk_block(chunk);
            if x < left || x > left + width {
                continue;
            }
            let mode = if x > left + width - RESIZE_HANDLE_PX {
                DragMode::ResizeEnd
            } else if x < left + RESIZE_HANDLE_PX {
                DragMode::ResizeStart
            } else {
                DragMode::Move
            };
            return PointerTarget::Chunk { id: chunk.id, mode };
        }
        PointerTarget::Background
    }

    pub fn is_scrubbing(&self) -> bool {
        matches!(self.gesture, Gesture::Scrubbing)
    }

    pub fn drag_session(&self) -> Option<&DragSession> {
        match &self.gesture {
            Gesture::Dragging { session, .. } => Some(session),
            _ => None,
        }
    }

    /// Pointer pressed. A background press seeks immediately; a block press
    /// only opens a drag session.
    pub fn pointer_down(
        &mut self,
        pointer_x: f64,
        target: PointerTarget,
        view: &TrackView,
        track: &CaptionTrack,
    ) -> Option<TimelineAction> {
        match target {
            PointerTarget::Background => {
                self.gesture = Gesture::Scrubbing;
                Some(TimelineAction::Seek(self.time_at(pointer_x, view)))
            }
            PointerTarget::Chunk { id, mode } => {
                let original = track.get(id)?.clone();
                self.gesture = Gesture::Dragging {
                    session: DragSession {
                        subject: id,
                        mode,
                        anchor_x: pointer_x,
                        original,
                    },
                    moved: false,
                };
                None
            }
        }
    }

    /// Pointer moved while pressed.
    pub fn pointer_move(
        &mut self,
        pointer_x: f64,
        view: &TrackView,
        track: &mut CaptionTrack,
    ) -> Option<TimelineAction> {
        let pixels_per_second = self.pixels_per_second;
        let scrub_time = self.time_at(pointer_x, view);
        match &mut self.gesture {
            Gesture::Idle => None,
            Gesture::Scrubbing => Some(TimelineAction::Seek(scrub_time)),
            Gesture::Dragging { session, moved } => {
                if pointer_x != session.anchor_x {
                    *moved = true;
                }
                let (start, end) = session.span_at(pointer_x, pixels_per_second);
                let subject = session.subject;
                if track.update_from_drag(subject, start, end) {
                    Some(TimelineAction::ChunkUpdated(subject))
                } else {
                    // Track was replaced under the drag.
                    tracing::debug!(chunk = %subject, "Drag subject vanished, ending drag");
                    self.gesture = Gesture::Idle;
                    None
                }
            }
        }
    }

    /// Pointer released. Ends any gesture; a block press without movement
    /// seeks to the chunk start.
    pub fn pointer_up(&mut self) -> Option<TimelineAction> {
        match std::mem::replace(&mut self.gesture, Gesture::Idle) {
            Gesture::Dragging {
                session,
                moved: false,
            } => Some(TimelineAction::Seek(session.original.start)),
            Gesture::Dragging { session, .. } => {
                tracing::debug!(chunk = %session.subject, mode = ?session.mode, "Drag committed");
                None
            }
            Gesture::Scrubbing | Gesture::Idle => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn track() -> CaptionTrack {
        CaptionTrack::from_chunks(vec![
            CaptionChunk::new(1.0, 3.0, "first chunk"),
            CaptionChunk::new(4.0, 5.0, "second"),
        ])
    }

    fn view() -> TrackView {
        TrackView {
            track_left: 100.0,
            scroll_offset: 0.0,
        }
    }

    #[test]
    fn test_zoom_clamped_and_track_width() {
        let mut model = TimelineModel::new(5.0);
        assert_eq!(model.pixels_per_second(), 50.0);
        assert_eq!(model.track_width(), 600.0);

        model.set_zoom(500.0);
        assert_eq!(model.pixels_per_second(), 200.0);
        assert_eq!(model.track_width(), 1000.0);

        model.set_zoom(1.0);
        assert_eq!(model.pixels_per_second(), 10.0);
    }

    #[test]
    fn test_scrub_seeks_and_clamps() {
        let mut model = TimelineModel::new(10.0);
        let mut track = track();
        let view = TrackView {
            track_left: 100.0,
            scroll_offset: 50.0,
        };

        let action = model.pointer_down(150.0, PointerTarget::Background, &view, &track);
        assert_eq!(action, Some(TimelineAction::Seek(2.0)));
        assert!(model.is_scrubbing());

        let action = model.pointer_move(10_000.0, &view, &mut track);
        assert_eq!(action, Some(TimelineAction::Seek(10.0)));
        let action = model.pointer_move(0.0, &view, &mut track);
        assert_eq!(action, Some(TimelineAction::Seek(0.0)));

        assert_eq!(model.pointer_up(), None);
        assert!(!model.is_scrubbing());
        assert_eq!(model.pointer_move(200.0, &view, &mut track), None);
    }

    #[test]
    fn test_hit_test_modes() {
        let model = TimelineModel::new(10.0);
        let track = track();
        let id = track.chunks()[0].id;
        // Block 0 spans content x 50..150, viewport 150..250.
        assert_eq!(
            model.hit_test(152.0, &view(), &track),
            PointerTarget::Chunk {
                id,
                mode: DragMode::ResizeStart
            }
        );
        assert_eq!(
            model.hit_test(200.0, &view(), &track),
            PointerTarget::Chunk {
                id,
                mode: DragMode::Move
            }
        );
        assert_eq!(
            model.hit_test(248.0, &view(), &track),
            PointerTarget::Chunk {
                id,
                mode: DragMode::ResizeEnd
            }
        );
        assert_eq!(model.hit_test(120.0, &view(), &track), PointerTarget::Background);
    }

    #[test]
    fn test_move_drag_commits_every_move() {
        let mut model = TimelineModel::new(10.0);
        let mut track = track();
        let id = track.chunks()[0].id;
        let target = PointerTarget::Chunk {
            id,
            mode: DragMode::Move,
        };

        assert_eq!(model.pointer_down(200.0, target, &view(), &track), None);
        assert_eq!(
            model.pointer_move(250.0, &view(), &mut track),
            Some(TimelineAction::ChunkUpdated(id))
        );
        assert_eq!((track.chunks()[0].start, track.chunks()[0].end), (2.0, 4.0));

        // Deltas are measured from the anchor, not the previous move.
        model.pointer_move(100.0, &view(), &mut track);
        let chunk = &track.chunks()[0];
        assert_eq!(chunk.start, 0.0);
        assert_eq!(chunk.end, 1.0);

        assert_eq!(model.pointer_up(), None);
        assert!(model.drag_session().is_none());
    }

    #[test]
    fn test_move_keeps_half_second_floor() {
        let session = DragSession {
            subject: ChunkId::mint(),
            mode: DragMode::Move,
            anchor_x: 0.0,
            original: CaptionChunk::new(0.5, 0.7, "tiny"),
        };
        let (start, end) = session.span_at(-100.0, 50.0);
        assert_eq!(start, 0.0);
        assert_eq!(end, MOVE_MIN_DURATION_SECS);
    }

    #[test]
    fn test_resize_start_clamped() {
        let mut model = TimelineModel::new(10.0);
        let mut track = track();
        let id = track.chunks()[0].id;
        let target = PointerTarget::Chunk {
            id,
            mode: DragMode::ResizeStart,
        };

        model.pointer_down(150.0, target, &view(), &track);
        model.pointer_move(1000.0, &view(), &mut track);
        let chunk = &track.chunks()[0];
        assert!((chunk.start - (3.0 - MIN_CHUNK_DURATION_SECS)).abs() < 1e-9);
        assert!((chunk.end - 3.0).abs() < 1e-9);

        model.pointer_move(-1000.0, &view(), &mut track);
        assert_eq!(track.chunks()[0].start, 0.0);
    }

    #[test]
    fn test_resize_start_on_short_early_chunk_extends_end_to_floor() {
        let mut model = TimelineModel::new(10.0);
        let mut track = CaptionTrack::from_chunks(vec![CaptionChunk::new(0.0, 0.1, "quick")]);
        let id = track.chunks()[0].id;
        let target = PointerTarget::Chunk {
            id,
            mode: DragMode::ResizeStart,
        };

        model.pointer_down(100.0, target, &view(), &track);
        let action = model.pointer_move(90.0, &view(), &mut track);
        assert_eq!(action, Some(TimelineAction::ChunkUpdated(id)));

        let chunk = track.get(id).unwrap();
        assert_eq!(chunk.start, 0.0);
        assert!((chunk.end - MIN_CHUNK_DURATION_SECS).abs() < 1e-12);
    }

    #[test]
    fn test_resize_end_clamped() {
        let mut model = TimelineModel::new(10.0);
        let mut track = track();
        let id = track.chunks()[1].id;
        let target = PointerTarget::Chunk {
            id,
            mode: DragMode::ResizeEnd,
        };

        model.pointer_down(350.0, target, &view(), &track);
        model.pointer_move(-1000.0, &view(), &mut track);
        let chunk = &track.chunks()[1];
        assert_eq!(chunk.start, 4.0);
        assert!((chunk.end - (4.0 + MIN_CHUNK_DURATION_SECS)).abs() < 1e-9);
    }

    #[test]
    fn test_click_without_move_seeks_to_chunk_start() {
        let mut model = TimelineModel::new(10.0);
        let mut track = track();
        let id = track.chunks()[1].id;
        let target = PointerTarget::Chunk {
            id,
            mode: DragMode::Move,
        };

        model.pointer_down(330.0, target, &view(), &track);
        // A move back onto the anchor is not a drag.
        model.pointer_move(330.0, &view(), &mut track);
        assert_eq!(model.pointer_up(), Some(TimelineAction::Seek(4.0)));
    }

    #[test]
    fn test_drag_does_not_seek_on_release() {
        let mut model = TimelineModel::new(10.0);
        let mut track = track();
        let id = track.chunks()[1].id;
        let target = PointerTarget::Chunk {
            id,
            mode: DragMode::Move,
        };

        model.pointer_down(330.0, target, &view(), &track);
        model.pointer_move(340.0, &view(), &mut track);
        model.pointer_move(330.0, &view(), &mut track);
        assert_eq!(model.pointer_up(), None);
    }

    #[test]
    fn test_drag_ends_when_track_replaced() {
        let mut model = TimelineModel::new(10.0);
        let mut track = track();
        let id = track.chunks()[0].id;
        model.pointer_down(
            200.0,
            PointerTarget::Chunk {
                id,
                mode: DragMode::Move,
            },
            &view(),
            &track,
        );

        track.replace_all(vec![CaptionChunk::new(0.0, 1.0, "fresh")]);
        assert_eq!(model.pointer_move(220.0, &view(), &mut track), None);
        assert!(model.drag_session().is_none());
    }

    #[test]
    fn test_press_on_unknown_chunk_is_ignored() {
        let mut model = TimelineModel::new(10.0);
        let track = track();
        let target = PointerTarget::Chunk {
            id: ChunkId::mint(),
            mode: DragMode::Move,
        };
        assert_eq!(model.pointer_down(200.0, target, &view(), &track), None);
        assert!(model.drag_session().is_none());
    }

    fn mode_strategy() -> impl Strategy<Value = DragMode> {
        prop_oneof![
            Just(DragMode::Move),
            Just(DragMode::ResizeStart),
            Just(DragMode::ResizeEnd),
        ]
    }

    proptest! {
        #[test]
        fn prop_every_intermediate_move_keeps_invariants(
            mode in mode_strategy(),
            zoom in 10.0f64..200.0,
            moves in prop::collection::vec(-5000.0f64..5000.0, 1..30),
        ) {
            let mut model = TimelineModel::new(10.0);
            model.set_zoom(zoom);
            let mut track = track();
            let id = track.chunks()[0].id;

            model.pointer_down(200.0, PointerTarget::Chunk { id, mode }, &view(), &track);
            for x in moves {
                model.pointer_move(x, &view(), &mut track);
                let chunk = track.get(id).unwrap();
                prop_assert!(chunk.start >= 0.0);
                prop_assert!(chunk.end - chunk.start >= MIN_CHUNK_DURATION_SECS - 1e-9);
            }
            model.pointer_up();
        }
    }
}
