use std::collections::HashMap;

use tracing::debug;

use prodline_vision::TrackedObject;

/// Which side of the counting line an object center falls on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// One directional crossing of the counting line by one track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossingEvent {
    pub track_id: u64,
    pub class_id: i32,
}

#[derive(Debug, Clone)]
pub struct CounterConfig {
    /// Boundary position as a fraction of frame width, full height.
    pub line_frac: f32,
    /// Tracks unseen for this many frames are forgotten, bounding
    /// per-session track memory.
    pub max_idle_frames: u64,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self { line_frac: 0.85, max_idle_frames: 90 }
    }
}

#[derive(Debug, Clone)]
struct TrackMemory {
    side: Side,
    last_seen: u64,
}

/// Per-session boundary crossing counter. Feeds on per-frame tracked-object
/// positions and emits one OUT increment per Left-to-Right transition of a
/// given track id. Repeated observations on the same side are no-ops, so the
/// count is exactly one per physical crossing no matter how many frames see
/// the object on either side.
#[derive(Debug, Clone)]
pub struct CrossingCounter {
    cfg: CounterConfig,
    tracks: HashMap<u64, TrackMemory>,
    counts: HashMap<i32, u64>,
    frame_no: u64,
}

impl CrossingCounter {
    pub fn new(cfg: CounterConfig) -> Self {
        Self { cfg, tracks: HashMap::new(), counts: HashMap::new(), frame_no: 0 }
    }

    pub fn side_of(&self, cx: f32) -> Side {
        if cx < self.cfg.line_frac { Side::Left } else { Side::Right }
    }

    /// Feed one frame's tracked objects. Returns the crossings counted in
    /// this frame.
    pub fn observe_frame(&mut self, objects: &[TrackedObject]) -> Vec<CrossingEvent> {
        self.frame_no += 1;
        let mut events = Vec::new();

        for obj in objects {
            let side = self.side_of(obj.cx);
            match self.tracks.get_mut(&obj.track_id) {
                None => {
                    // first observation: record side, never count
                    self.tracks.insert(obj.track_id, TrackMemory { side, last_seen: self.frame_no });
                }
                Some(mem) => {
                    if mem.side == Side::Left && side == Side::Right {
                        *self.counts.entry(obj.class_id).or_insert(0) += 1;
                        events.push(CrossingEvent { track_id: obj.track_id, class_id: obj.class_id });
                        debug!(
                            "crossing: track {} class {} -> OUT {}",
                            obj.track_id, obj.class_id, self.counts[&obj.class_id]
                        );
                    }
                    mem.side = side;
                    mem.last_seen = self.frame_no;
                }
            }
        }

        let cutoff = self.frame_no.saturating_sub(self.cfg.max_idle_frames);
        self.tracks.retain(|_, mem| mem.last_seen >= cutoff);

        events
    }

    pub fn counts(&self) -> &HashMap<i32, u64> {
        &self.counts
    }

    pub fn count_for(&self, class_id: i32) -> u64 {
        self.counts.get(&class_id).copied().unwrap_or(0)
    }

    #[cfg(test)]
    fn live_tracks(&self) -> usize {
        self.tracks.len()
    }
}
