use std::io::BufRead;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::trace;

use crate::iou::iou;
use crate::{Detection, Detector, Frame, TrackedObject, TrackingEngine};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_age_frames: u32,
    pub min_hits: u32,
    pub iou_match_threshold: f32,
    pub max_tracks: usize,
    /// When set, only this class is tracked and reported.
    pub target_class: Option<i32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_age_frames: 30,
            min_hits: 2,
            iou_match_threshold: 0.3,
            max_tracks: 64,
            target_class: None,
        }
    }
}

#[derive(Debug, Clone)]
struct Track {
    id: u64,
    class_id: i32,
    conf: f32,
    cx: f32,
    cy: f32,
    w: f32,
    h: f32,

    // per-frame displacement, used to coast through missed detections
    vx: f32,
    vy: f32,

    hits: u32,
    miss: u32,
}

/// Bundled tracking engine: greedy IOU association over any `Detector`.
/// Track ids are stable for as long as an object keeps matching; a track
/// that goes unmatched for `max_age_frames` is dropped and its id retired.
pub struct IouTracker {
    cfg: EngineConfig,
    detector: Box<dyn Detector>,
    next_id: u64,
    tracks: Vec<Track>,
}

impl IouTracker {
    pub fn new(cfg: EngineConfig, detector: Box<dyn Detector>) -> Self {
        Self { cfg, detector, next_id: 1, tracks: vec![] }
    }
}

impl TrackingEngine for IouTracker {
    fn track(&mut self, frame: &Frame, conf_threshold: f32) -> Result<Vec<TrackedObject>> {
        let mut dets = self.detector.detect_rgb(&frame.rgb, frame.w, frame.h, conf_threshold)?;
        if let Some(tc) = self.cfg.target_class {
            dets.retain(|d| d.class_id == tc);
        }

        // coast every track forward one frame; confidence fades until the
        // next match
        for t in &mut self.tracks {
            t.cx = (t.cx + t.vx).clamp(0.0, 1.0);
            t.cy = (t.cy + t.vy).clamp(0.0, 1.0);
            t.miss += 1;
            t.conf *= 0.995;
        }

        // pair each track with its best-overlapping same-class detection
        let mut used_det = vec![false; dets.len()];
        for t in &mut self.tracks {
            let mut best_i = None;
            let mut best_iou = 0.0;
            for (i, d) in dets.iter().enumerate() {
                if used_det[i] { continue; }
                if d.class_id != t.class_id { continue; }
                let v = iou(t.cx, t.cy, t.w, t.h, d.cx, d.cy, d.w, d.h);
                if v > best_iou {
                    best_iou = v;
                    best_i = Some(i);
                }
            }
            if let Some(i) = best_i {
                if best_iou >= self.cfg.iou_match_threshold {
                    let d = &dets[i];
                    used_det[i] = true;

                    // fold the observed displacement into the motion estimate
                    let nx = d.cx - t.cx;
                    let ny = d.cy - t.cy;
                    t.vx = 0.7 * t.vx + 0.3 * nx;
                    t.vy = 0.7 * t.vy + 0.3 * ny;

                    t.cx = d.cx; t.cy = d.cy;
                    t.w = d.w; t.h = d.h;
                    t.conf = d.conf.max(t.conf);
                    t.hits += 1;
                    t.miss = 0;
                }
            }
        }

        // leftover detections open fresh tracks
        for (i, d) in dets.iter().enumerate() {
            if used_det[i] { continue; }
            if self.tracks.len() >= self.cfg.max_tracks { break; }
            self.tracks.push(Track {
                id: self.next_id,
                class_id: d.class_id,
                conf: d.conf,
                cx: d.cx, cy: d.cy, w: d.w, h: d.h,
                vx: 0.0, vy: 0.0,
                hits: 1, miss: 0,
            });
            self.next_id += 1;
        }

        // forget tracks that stayed unmatched too long
        self.tracks.retain(|t| t.miss <= self.cfg.max_age_frames);

        let out: Vec<TrackedObject> = self
            .tracks
            .iter()
            .filter(|t| t.hits >= self.cfg.min_hits && t.miss == 0)
            .map(|t| TrackedObject {
                track_id: t.id,
                class_id: t.class_id,
                conf: t.conf,
                cx: t.cx, cy: t.cy, w: t.w, h: t.h,
            })
            .collect();
        trace!("engine: {} dets -> {} tracks reported", dets.len(), out.len());
        Ok(out)
    }
}

/// Detector that replays recorded per-frame detections from a JSON-lines
/// file (one `Vec<Detection>` per line, in frame order). Lets a line rig be
/// exercised end to end without a model backend; also what `doctor` checks
/// when the model reference names a `.jsonl` file.
pub struct ReplayDetector {
    frames: Vec<Vec<Detection>>,
    at: usize,
}

impl ReplayDetector {
    pub fn open(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("open detection replay {}", path.display()))?;
        let mut frames = Vec::new();
        for (i, line) in std::io::BufReader::new(file).lines().enumerate() {
            let line = line.context("read detection replay")?;
            if line.trim().is_empty() {
                continue;
            }
            let dets: Vec<Detection> = serde_json::from_str(&line)
                .with_context(|| format!("parse detection replay line {}", i + 1))?;
            frames.push(dets);
        }
        Ok(Self { frames, at: 0 })
    }
}

impl Detector for ReplayDetector {
    fn detect_rgb(&mut self, _rgb: &[u8], _w: u32, _h: u32, conf_threshold: f32) -> Result<Vec<Detection>> {
        let mut out = self.frames.get(self.at).cloned().unwrap_or_default();
        self.at += 1;
        out.retain(|d| d.conf >= conf_threshold);
        Ok(out)
    }
}
