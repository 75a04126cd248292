use std::sync::{Arc, Mutex};

use anyhow::Result;
use tracing::{debug, info, warn};

use prodline_count::{CounterConfig, CrossingCounter, LiveCounts};
use prodline_vision::annotate::Annotator;
use prodline_vision::sink::FrameSink;
use prodline_vision::source::FrameSource;
use prodline_vision::{TrackedObject, TrackingEngine};

use crate::cancel::CancelToken;
use crate::config::Config;

/// Consecutive read failures tolerated before the loop gives up on the
/// source. End of stream is always terminal.
const MAX_READ_RETRIES: u32 = 3;

/// The pieces the loop exclusively owns for one session: acquired at loop
/// entry, released at loop exit.
pub struct PipelineParts {
    pub source: Box<dyn FrameSource>,
    pub sink: Box<dyn FrameSink>,
    pub engine: Box<dyn TrackingEngine>,
}

/// Builds fresh pipeline parts for each session start. The engine should be
/// restricted to the selected class where the backend supports it; the loop
/// still validates per frame.
pub trait PipelineFactory: Send {
    fn build(&mut self, cfg: &Config, selected_class: i32) -> Result<PipelineParts>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Cancelled,
    EndOfStream,
    SourceError,
    SinkError,
}

/// Shared view of the loop's progress, so a session that stalled or died
/// early is observable from outside instead of silently staying "Running".
#[derive(Debug, Clone, Default)]
pub struct LoopStatus {
    pub frames: u64,
    pub counted_frames: u64,
    pub skipped_frames: u64,
    pub exit: Option<LoopExit>,
}

#[derive(Debug, Clone)]
pub struct LoopParams {
    pub selected_class: i32,
    pub conf_threshold: f32,
    pub annotator: Annotator,
    pub counter: CounterConfig,
}

enum CountOutcome {
    Applied { crossings: usize },
    Skipped { reason: String },
}

/// One frame's counting step. Anomalous engine output for the selected
/// class skips the update instead of failing the session.
fn apply_counts(
    counter: &mut CrossingCounter,
    tracks: &[TrackedObject],
    selected_class: i32,
) -> CountOutcome {
    if let Some(odd) = tracks.iter().find(|t| t.class_id != selected_class) {
        return CountOutcome::Skipped {
            reason: format!("unexpected class {} (selected {})", odd.class_id, selected_class),
        };
    }
    let events = counter.observe_frame(tracks);
    CountOutcome::Applied { crossings: events.len() }
}

/// The background frame processing loop. Runs on a blocking task until
/// cancellation, end of stream, or an unrecoverable source/sink error.
pub fn run_loop(
    mut parts: PipelineParts,
    params: LoopParams,
    cancel: CancelToken,
    live: LiveCounts,
    status: Arc<Mutex<LoopStatus>>,
) -> LoopExit {
    let mut counter = CrossingCounter::new(params.counter.clone());
    let mut read_errors = 0u32;

    let exit = loop {
        if cancel.is_cancelled() {
            break LoopExit::Cancelled;
        }

        let mut frame = match parts.source.next_frame() {
            Ok(Some(f)) => {
                read_errors = 0;
                f
            }
            Ok(None) => {
                info!("loop: source reached end of stream");
                break LoopExit::EndOfStream;
            }
            Err(e) => {
                read_errors += 1;
                warn!("loop: frame read failed ({}/{}): {:#}", read_errors, MAX_READ_RETRIES, e);
                if read_errors >= MAX_READ_RETRIES {
                    break LoopExit::SourceError;
                }
                continue;
            }
        };
        status.lock().unwrap().frames += 1;

        let tracks = match parts.engine.track(&frame, params.conf_threshold) {
            Ok(t) => t,
            Err(e) => {
                warn!("loop: engine failed, skipping frame: {:#}", e);
                status.lock().unwrap().skipped_frames += 1;
                continue;
            }
        };

        match apply_counts(&mut counter, &tracks, params.selected_class) {
            CountOutcome::Skipped { reason } => {
                warn!("loop: counting skipped: {}", reason);
                status.lock().unwrap().skipped_frames += 1;
                continue;
            }
            CountOutcome::Applied { crossings } => {
                if crossings > 0 {
                    debug!("loop: {} crossing(s), OUT now {}", crossings, counter.count_for(params.selected_class));
                }
            }
        }

        let text = counter.count_for(params.selected_class).to_string();
        params.annotator.annotate(&mut frame, &tracks, &text);
        if let Err(e) = parts.sink.append(&frame) {
            warn!("loop: sink write failed: {:#}", e);
            break LoopExit::SinkError;
        }

        live.publish(counter.counts().clone());
        status.lock().unwrap().counted_frames += 1;
    };

    if let Err(e) = parts.sink.finish() {
        warn!("loop: sink finish failed: {:#}", e);
    }
    status.lock().unwrap().exit = Some(exit);
    info!("loop: exit {:?}", exit);
    exit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{BrokenSink, NullSink, ScriptEngine, VecSource};
    use prodline_count::CountSnapshot;
    use prodline_vision::{Frame, PROC_H, PROC_W};

    fn params(selected_class: i32) -> LoopParams {
        LoopParams {
            selected_class,
            conf_threshold: 0.5,
            annotator: Annotator::new(1, 0.85),
            counter: CounterConfig::default(),
        }
    }

    fn frames(n: usize) -> Vec<Frame> {
        (0..n).map(|_| Frame::blank(PROC_W, PROC_H)).collect()
    }

    fn tracked(track_id: u64, class_id: i32, cx: f32) -> TrackedObject {
        TrackedObject { track_id, class_id, conf: 0.9, cx, cy: 0.5, w: 0.1, h: 0.1 }
    }

    #[test]
    fn hundred_frames_one_crossing_counts_one() {
        // object drifts left to right, crossing the 0.85 line once
        let script: Vec<Vec<TrackedObject>> = (0..100)
            .map(|i| vec![tracked(7, 2, 0.10 + 0.0085 * i as f32)])
            .collect();
        let sink = NullSink::default();
        let parts = PipelineParts {
            source: Box::new(VecSource::new(frames(100))),
            sink: Box::new(sink.clone()),
            engine: Box::new(ScriptEngine::new(script)),
        };
        let live = LiveCounts::new();
        let status = Arc::new(Mutex::new(LoopStatus::default()));

        let exit = run_loop(parts, params(2), CancelToken::new(), live.clone(), status.clone());

        assert_eq!(exit, LoopExit::EndOfStream);
        assert_eq!(live.snapshot().produced(2), 1);
        let st = status.lock().unwrap().clone();
        assert_eq!(st.frames, 100);
        assert_eq!(st.counted_frames, 100);
        assert_eq!(st.exit, Some(LoopExit::EndOfStream));
        assert_eq!(*sink.appended.lock().unwrap(), 100);
        assert!(*sink.finished.lock().unwrap());
    }

    #[test]
    fn cancellation_stops_before_the_next_frame() {
        let sink = NullSink::default();
        let parts = PipelineParts {
            source: Box::new(VecSource::new(frames(10))),
            sink: Box::new(sink.clone()),
            engine: Box::new(ScriptEngine::new(vec![])),
        };
        let cancel = CancelToken::new();
        cancel.cancel();
        let status = Arc::new(Mutex::new(LoopStatus::default()));

        let exit = run_loop(parts, params(0), cancel, LiveCounts::new(), status.clone());

        assert_eq!(exit, LoopExit::Cancelled);
        assert_eq!(status.lock().unwrap().frames, 0);
        // the sink is still released on a cancelled run
        assert!(*sink.finished.lock().unwrap());
    }

    #[test]
    fn unexpected_class_skips_the_frame_but_not_the_session() {
        let script = vec![
            vec![tracked(1, 9, 0.5)], // wrong class: skipped
            vec![tracked(2, 2, 0.5)],
            vec![tracked(2, 2, 0.9)],
        ];
        let sink = NullSink::default();
        let parts = PipelineParts {
            source: Box::new(VecSource::new(frames(3))),
            sink: Box::new(sink.clone()),
            engine: Box::new(ScriptEngine::new(script)),
        };
        let live = LiveCounts::new();
        let status = Arc::new(Mutex::new(LoopStatus::default()));

        let exit = run_loop(parts, params(2), CancelToken::new(), live.clone(), status.clone());

        assert_eq!(exit, LoopExit::EndOfStream);
        assert_eq!(live.snapshot().produced(2), 1);
        let st = status.lock().unwrap().clone();
        assert_eq!(st.skipped_frames, 1);
        assert_eq!(st.counted_frames, 2);
        // skipped frames never reach the sink
        assert_eq!(*sink.appended.lock().unwrap(), 2);
    }

    #[test]
    fn live_count_stays_unknown_until_first_applied_update() {
        let script = vec![vec![tracked(1, 9, 0.5)]]; // only a skipped frame
        let parts = PipelineParts {
            source: Box::new(VecSource::new(frames(1))),
            sink: Box::new(NullSink::default()),
            engine: Box::new(ScriptEngine::new(script)),
        };
        let live = LiveCounts::new();
        let status = Arc::new(Mutex::new(LoopStatus::default()));

        run_loop(parts, params(2), CancelToken::new(), live.clone(), status);
        assert_eq!(live.snapshot(), CountSnapshot::Unknown);
    }

    #[test]
    fn repeated_read_failures_terminate_the_loop() {
        let sink = NullSink::default();
        let parts = PipelineParts {
            source: Box::new(VecSource::failing()),
            sink: Box::new(sink.clone()),
            engine: Box::new(ScriptEngine::new(vec![])),
        };
        let status = Arc::new(Mutex::new(LoopStatus::default()));

        let exit = run_loop(parts, params(0), CancelToken::new(), LiveCounts::new(), status.clone());

        assert_eq!(exit, LoopExit::SourceError);
        assert_eq!(status.lock().unwrap().exit, Some(LoopExit::SourceError));
        assert!(*sink.finished.lock().unwrap());
    }

    #[test]
    fn sink_write_failure_terminates_the_loop() {
        let sink = BrokenSink::default();
        let parts = PipelineParts {
            source: Box::new(VecSource::new(frames(5))),
            sink: Box::new(sink.clone()),
            engine: Box::new(ScriptEngine::new(vec![])),
        };
        let status = Arc::new(Mutex::new(LoopStatus::default()));

        let exit = run_loop(parts, params(0), CancelToken::new(), LiveCounts::new(), status.clone());

        assert_eq!(exit, LoopExit::SinkError);
        let st = status.lock().unwrap().clone();
        assert_eq!(st.exit, Some(LoopExit::SinkError));
        // the first failed write ends the run; later frames are never read
        assert_eq!(st.frames, 1);
        assert!(*sink.finished.lock().unwrap());
    }

    #[test]
    fn transient_read_failures_are_retried() {
        // two errors, then good frames: loop keeps going
        let mut src = VecSource::new(frames(2));
        src.fail_first(2);
        let parts = PipelineParts {
            source: Box::new(src),
            sink: Box::new(NullSink::default()),
            engine: Box::new(ScriptEngine::new(vec![])),
        };
        let status = Arc::new(Mutex::new(LoopStatus::default()));

        let exit = run_loop(parts, params(0), CancelToken::new(), LiveCounts::new(), status.clone());

        assert_eq!(exit, LoopExit::EndOfStream);
        assert_eq!(status.lock().unwrap().frames, 2);
    }
}
