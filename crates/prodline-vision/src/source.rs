use std::io::Read;
use std::process::{Child, Command, Stdio};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::{Frame, PROC_H, PROC_W};

/// Where frames come from: a capture device index, or a file/URL ffmpeg can open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    Device(u32),
    Path(String),
}

impl SourceSpec {
    /// A numeric identifier selects a capture device index; anything else is
    /// handed to ffmpeg as a path or URL.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<u32>() {
            Ok(idx) => SourceSpec::Device(idx),
            Err(_) => SourceSpec::Path(raw.trim().to_string()),
        }
    }
}

pub trait FrameSource: Send {
    /// Next frame at the processing resolution. `Ok(None)` is a clean end of
    /// stream; `Err` is a read failure (the caller decides retry policy).
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Pragmatic capture: shell out to ffmpeg and read rgb24 frames off its
/// stdout. Keeps the Rust dependency surface small and works for v4l2
/// devices, files and network streams alike.
pub struct FfmpegSource {
    child: Child,
    stdout: std::process::ChildStdout,
    frame_len: usize,
}

impl FfmpegSource {
    pub fn open(spec: &SourceSpec) -> Result<Self> {
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-hide_banner", "-loglevel", "error"]);
        match spec {
            SourceSpec::Device(idx) => {
                cmd.args(["-f", "video4linux2", "-i", &format!("/dev/video{}", idx)]);
            }
            SourceSpec::Path(p) => {
                cmd.args(["-i", p]);
            }
        }
        cmd.args([
            "-f", "rawvideo",
            "-pix_fmt", "rgb24",
            "-s", &format!("{}x{}", PROC_W, PROC_H),
            "-",
        ]);
        cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::null());

        info!("source: spawning ffmpeg for {:?}", spec);
        let mut child = cmd.spawn().context("spawn ffmpeg source")?;
        let stdout = child.stdout.take().context("ffmpeg source stdout missing")?;
        Ok(Self {
            child,
            stdout,
            frame_len: (PROC_W as usize) * (PROC_H as usize) * 3,
        })
    }
}

impl FrameSource for FfmpegSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut buf = vec![0u8; self.frame_len];
        let mut filled = 0;
        while filled < self.frame_len {
            let n = self.stdout.read(&mut buf[filled..]).context("read ffmpeg source")?;
            if n == 0 {
                if filled == 0 {
                    debug!("source: end of stream");
                    return Ok(None);
                }
                anyhow::bail!("source truncated mid-frame at {} of {} bytes", filled, self.frame_len);
            }
            filled += n;
        }
        Ok(Some(Frame { rgb: buf, w: PROC_W, h: PROC_H }))
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
