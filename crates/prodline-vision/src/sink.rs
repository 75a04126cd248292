use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use anyhow::{Context, Result};
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::info;

use crate::Frame;

pub trait FrameSink: Send {
    fn append(&mut self, frame: &Frame) -> Result<()>;
    /// Flush and close the underlying encoder. Must be called before the
    /// output file is considered complete.
    fn finish(&mut self) -> Result<()>;
}

/// `output/Date_23AUG2026` style day partition, shared by video and report
/// output.
pub fn dated_dir(root: &str, now: OffsetDateTime) -> PathBuf {
    let fmt = format_description!("[day][month repr:short][year]");
    let date = now.format(&fmt).unwrap_or_else(|_| "UNDATED".into()).to_uppercase();
    Path::new(root).join(format!("Date_{}", date))
}

/// Filename timestamp to the second, so sessions on the same day never
/// collide.
pub fn second_stamp(now: OffsetDateTime) -> String {
    let fmt = format_description!("[year][month][day]_[hour][minute][second]");
    now.format(&fmt).unwrap_or_else(|_| "00000000_000000".into())
}

pub fn video_output_path(root: &str, now: OffsetDateTime) -> PathBuf {
    dated_dir(root, now).join(format!("output_{}.avi", second_stamp(now)))
}

/// Encode annotated frames by piping rgb24 into an ffmpeg child process.
pub struct FfmpegSink {
    child: Option<Child>,
    stdin: Option<std::process::ChildStdin>,
    path: PathBuf,
}

impl FfmpegSink {
    pub fn create(path: &Path, w: u32, h: u32, fps: u32) -> Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).context("create output dir")?;
        }
        let mut cmd = Command::new("ffmpeg");
        cmd.args([
            "-hide_banner", "-loglevel", "error",
            "-y",
            "-f", "rawvideo",
            "-pix_fmt", "rgb24",
            "-s", &format!("{}x{}", w, h),
            "-r", &fps.to_string(),
            "-i", "-",
            "-c:v", "mpeg4",
        ]);
        cmd.arg(path);
        cmd.stdin(Stdio::piped()).stdout(Stdio::null()).stderr(Stdio::null());

        info!("sink: encoding to {}", path.display());
        let mut child = cmd.spawn().context("spawn ffmpeg sink")?;
        let stdin = child.stdin.take().context("ffmpeg sink stdin missing")?;
        Ok(Self { child: Some(child), stdin: Some(stdin), path: path.to_path_buf() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSink for FfmpegSink {
    fn append(&mut self, frame: &Frame) -> Result<()> {
        let stdin = self.stdin.as_mut().context("sink already finished")?;
        stdin.write_all(&frame.rgb).context("write frame to ffmpeg sink")?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let status = child.wait().context("wait ffmpeg sink")?;
            anyhow::ensure!(status.success(), "ffmpeg sink exited with {}", status);
        }
        Ok(())
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
