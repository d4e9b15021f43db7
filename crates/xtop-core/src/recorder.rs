//! Recorder / Player (C11) — frame capture and deterministic
//! replay, with position/seek/advance naming. Uses a plain JSONL frame
//! format rather than chunked compressed storage — replay doesn't need
//! bounded-RAM lazy loading.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisResult;
use crate::errors::SinkError;
use crate::model::{Snapshot, SentinelData};
use crate::rates::RateSnapshot;

/// One recorded tick: `{snapshot, rates, result, probe}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Frame {
    pub snapshot: Snapshot,
    pub rates: Option<RateSnapshot>,
    pub result: Option<AnalysisResult>,
    pub probe: Option<SentinelData>,
}

/// Where a [`Recorder`] writes each frame. A failing sink logs and continues
///; it never aborts the tick that produced the frame.
pub trait FrameSink: Send + Sync {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), SinkError>;
}

/// Where a [`Player`] reads recorded frames from.
pub trait FrameSource: Send + Sync {
    fn len(&self) -> usize;
    fn get(&self, i: usize) -> Option<Frame>;
}

/// Default file-backed [`FrameSink`]: one JSON object per line, append-only.
pub struct JsonlFrameSink {
    file: File,
}

impl JsonlFrameSink {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }
}

impl FrameSink for JsonlFrameSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), SinkError> {
        let line = serde_json::to_string(frame)?;
        writeln!(self.file, "{line}")?;
        self.file.flush()?;
        Ok(())
    }
}

/// Default file-backed [`FrameSource`]: eagerly loads every recorded frame
/// into memory. Replay sets are bounded by how long a recording session ran,
/// unlike the live history ring, so eager loading keeps `Player` simple.
pub struct JsonlFrameSource {
    frames: Vec<Frame>,
}

impl JsonlFrameSource {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut frames = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Frame>(&line) {
                Ok(frame) => frames.push(frame),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed recorder frame");
                }
            }
        }
        Ok(Self { frames })
    }

    pub fn from_frames(frames: Vec<Frame>) -> Self {
        Self { frames }
    }
}

impl FrameSource for JsonlFrameSource {
    fn len(&self) -> usize {
        self.frames.len()
    }

    fn get(&self, i: usize) -> Option<Frame> {
        self.frames.get(i).cloned()
    }
}

/// Wraps a live orchestrator tick and writes the resulting frame to a sink.
/// The caller still owns driving `Orchestrator::tick` and assembling the
/// frame; `Recorder` only owns "does this frame make it to disk".
pub struct Recorder {
    sink: Box<dyn FrameSink>,
}

impl Recorder {
    pub fn new(sink: Box<dyn FrameSink>) -> Self {
        Self { sink }
    }

    /// Records one frame. A write failure is logged and swallowed — the
    /// scheduler loop that called this must never block or abort on a sink
    /// failure.
    pub fn record(&mut self, frame: &Frame) {
        if let Err(e) = self.sink.write_frame(frame) {
            tracing::warn!(error = %e, "failed to write recorder frame");
        }
    }
}

/// Replays a previously recorded frame stream. `tick()` advances and returns
/// the next frame; once past the end it keeps returning the last one.
/// `seek(i)` clamps to `[0, len)`.
pub struct Player {
    source: Box<dyn FrameSource>,
    cursor: usize,
}

impl Player {
    pub fn new(source: Box<dyn FrameSource>) -> Self {
        Self { source, cursor: 0 }
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Current frame without advancing.
    pub fn current(&self) -> Option<Frame> {
        self.source.get(self.cursor)
    }

    /// Advances one frame and returns it. Past the end, returns the last
    /// frame again without advancing further.
    pub fn tick(&mut self) -> Option<Frame> {
        if self.source.len() == 0 {
            return None;
        }
        if self.cursor + 1 < self.source.len() {
            self.cursor += 1;
        }
        self.source.get(self.cursor)
    }

    /// Clamps `i` into `[0, len)` before jumping.
    pub fn seek(&mut self, i: usize) -> Option<Frame> {
        if self.source.len() == 0 {
            return None;
        }
        self.cursor = i.min(self.source.len() - 1);
        self.source.get(self.cursor)
    }
}

/// Loads a complete recorder JSONL file and hands back a ready-to-drive
/// [`Player`] — the common case for `xtop --replay <path>`.
pub fn open_replay(path: impl AsRef<Path>) -> Result<Player, SinkError> {
    let source = JsonlFrameSource::load(path)?;
    Ok(Player::new(Box::new(source)))
}

pub fn jsonl_sink_at(path: impl Into<PathBuf>) -> Result<Recorder, SinkError> {
    let sink = JsonlFrameSink::new(path.into())?;
    Ok(Recorder::new(Box::new(sink)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(ts: i64) -> Frame {
        Frame {
            snapshot: Snapshot { timestamp: ts, ..Default::default() },
            rates: None,
            result: None,
            probe: None,
        }
    }

    #[test]
    fn player_tick_sticks_at_last_frame() {
        let source = JsonlFrameSource::from_frames(vec![frame(1), frame(2), frame(3)]);
        let mut player = Player::new(Box::new(source));
        assert_eq!(player.tick().unwrap().snapshot.timestamp, 2);
        assert_eq!(player.tick().unwrap().snapshot.timestamp, 3);
        assert_eq!(player.tick().unwrap().snapshot.timestamp, 3);
    }

    #[test]
    fn player_seek_clamps_into_range() {
        let source = JsonlFrameSource::from_frames(vec![frame(1), frame(2), frame(3)]);
        let mut player = Player::new(Box::new(source));
        assert_eq!(player.seek(100).unwrap().snapshot.timestamp, 3);
        assert_eq!(player.seek(0).unwrap().snapshot.timestamp, 1);
    }

    #[test]
    fn record_and_replay_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames.jsonl");
        {
            let mut recorder = jsonl_sink_at(path.clone()).unwrap();
            recorder.record(&frame(10));
            recorder.record(&frame(20));
        }
        let mut player = open_replay(&path).unwrap();
        assert_eq!(player.len(), 2);
        assert_eq!(player.current().unwrap().snapshot.timestamp, 10);
        assert_eq!(player.tick().unwrap().snapshot.timestamp, 20);
    }
}
