mod iou;
pub mod annotate;
pub mod engine;
pub mod sink;
pub mod source;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Fixed processing resolution; sources normalize to this before delivery.
pub const PROC_W: u32 = 640;
pub const PROC_H: u32 = 480;

/// One RGB frame at the processing resolution (3 bytes per pixel, row-major).
#[derive(Debug, Clone)]
pub struct Frame {
    pub rgb: Vec<u8>,
    pub w: u32,
    pub h: u32,
}

impl Frame {
    pub fn new(rgb: Vec<u8>, w: u32, h: u32) -> Result<Self> {
        anyhow::ensure!(
            rgb.len() == (w as usize) * (h as usize) * 3,
            "frame buffer size {} does not match {}x{} rgb24",
            rgb.len(),
            w,
            h
        );
        Ok(Self { rgb, w, h })
    }

    pub fn blank(w: u32, h: u32) -> Self {
        Self { rgb: vec![0; (w as usize) * (h as usize) * 3], w, h }
    }
}

/// Raw detector output for a single frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: i32,
    pub conf: f32,
    // normalized 0..1
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
}

/// A detection with a stable cross-frame identity assigned by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedObject {
    pub track_id: u64,
    pub class_id: i32,
    pub conf: f32,
    // normalized 0..1
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
}

pub trait Detector: Send {
    fn detect_rgb(&mut self, rgb: &[u8], w: u32, h: u32, conf_threshold: f32) -> Result<Vec<Detection>>;
}

/// Detection/tracking engine contract. The engine owns cross-frame identity:
/// the same physical object keeps the same `track_id` as long as the engine
/// can follow it.
pub trait TrackingEngine: Send {
    fn track(&mut self, frame: &Frame, conf_threshold: f32) -> Result<Vec<TrackedObject>>;
}
