use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;

use prodline_vision::sink::FrameSink;
use prodline_vision::source::FrameSource;
use prodline_vision::{Frame, TrackedObject, TrackingEngine};

/// Synthetic frame source backed by a queue, with optional injected read
/// failures.
pub struct VecSource {
    frames: VecDeque<Frame>,
    errors_before: u32,
    always_fail: bool,
}

impl VecSource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames: frames.into(), errors_before: 0, always_fail: false }
    }

    /// A source where every read fails.
    pub fn failing() -> Self {
        Self { frames: VecDeque::new(), errors_before: 0, always_fail: true }
    }

    /// Fail the first `n` reads, then deliver normally.
    pub fn fail_first(&mut self, n: u32) {
        self.errors_before = n;
    }
}

impl FrameSource for VecSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.always_fail {
            anyhow::bail!("injected read failure");
        }
        if self.errors_before > 0 {
            self.errors_before -= 1;
            anyhow::bail!("injected transient read failure");
        }
        Ok(self.frames.pop_front())
    }
}

/// Frame source that never ends and takes a while per frame; used to
/// exercise the stop timeout path.
pub struct SlowSource {
    pub delay: Duration,
}

impl FrameSource for SlowSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        std::thread::sleep(self.delay);
        Ok(Some(Frame::blank(prodline_vision::PROC_W, prodline_vision::PROC_H)))
    }
}

/// Sink that counts appends and discards the frames.
#[derive(Default, Clone)]
pub struct NullSink {
    pub appended: Arc<Mutex<u64>>,
    pub finished: Arc<Mutex<bool>>,
}

impl FrameSink for NullSink {
    fn append(&mut self, _frame: &Frame) -> Result<()> {
        *self.appended.lock().unwrap() += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        *self.finished.lock().unwrap() = true;
        Ok(())
    }
}

/// Sink whose writes always fail; records whether `finish` was still called.
#[derive(Default, Clone)]
pub struct BrokenSink {
    pub finished: Arc<Mutex<bool>>,
}

impl FrameSink for BrokenSink {
    fn append(&mut self, _frame: &Frame) -> Result<()> {
        anyhow::bail!("injected write failure")
    }

    fn finish(&mut self) -> Result<()> {
        *self.finished.lock().unwrap() = true;
        Ok(())
    }
}

/// Source that dies mid-read, taking the whole loop task down with it.
pub struct PanicSource;

impl FrameSource for PanicSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        panic!("capture worker died");
    }
}

/// Engine that replays a scripted tracked-object sequence, one entry per
/// frame; empty once the script runs out.
pub struct ScriptEngine {
    script: VecDeque<Vec<TrackedObject>>,
}

impl ScriptEngine {
    pub fn new(script: Vec<Vec<TrackedObject>>) -> Self {
        Self { script: script.into() }
    }
}

impl TrackingEngine for ScriptEngine {
    fn track(&mut self, _frame: &Frame, _conf: f32) -> Result<Vec<TrackedObject>> {
        Ok(self.script.pop_front().unwrap_or_default())
    }
}
