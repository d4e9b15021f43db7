//! Event Detector (C8) — durable incident records. Opens an event
//! after 3 consecutive non-OK ticks on the same bottleneck, tracks peaks
//! while active, and closes it after 3 consecutive OK ticks.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::alert::Health;
use crate::errors::SinkError;
use crate::evidence::Evidence;

const OPEN_DEBOUNCE_TICKS: u32 = 3;
const CLOSE_DEBOUNCE_TICKS: u32 = 3;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub time: i64,
    pub label: String,
}

/// A durable incident record: the span during which `Health` was not `OK`
/// for one primary bottleneck, with peak metrics and culprit attribution.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub duration_secs: Option<i64>,
    pub peak_health: Health,
    pub bottleneck: String,
    pub peak_score: f64,
    pub evidence: Vec<Evidence>,
    pub causal_chain: String,
    pub culprit: Option<String>,
    pub peak_cpu_pct: f64,
    pub peak_mem_pct: f64,
    pub peak_io_mb_s: f64,
    pub active: bool,
    pub timeline: Vec<TimelineEntry>,
}

/// One tick's worth of the inputs the event detector needs; everything else
/// (peak tracking logic, debounce) lives inside [`EventDetector`].
pub struct EventTickInput<'a> {
    pub now: i64,
    pub health: Health,
    pub bottleneck: Option<&'a str>,
    pub score: f64,
    pub evidence: &'a [Evidence],
    pub causal_chain: &'a str,
    pub culprit: Option<&'a str>,
    pub cpu_pct: f64,
    pub mem_pct: f64,
    pub io_mb_s: f64,
}

/// Maintains the active event (at most one at a time — detection tracks
/// only the single primary bottleneck) and a bounded completed list.
#[derive(Default)]
pub struct EventDetector {
    active: Option<Event>,
    completed: Vec<Event>,
    pending_bottleneck: Option<String>,
    non_ok_streak: u32,
    ok_streak: u32,
    next_id: u64,
}

impl EventDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&Event> {
        self.active.as_ref()
    }

    pub fn completed(&self) -> &[Event] {
        &self.completed
    }

    /// Applies one tick. Returns the event that closed this tick, if any —
    /// the caller (orchestrator) is responsible for persisting it via an
    /// [`EventLogWriter`].
    pub fn tick(&mut self, input: EventTickInput) -> Option<Event> {
        if input.health == Health::Ok {
            self.ok_streak += 1;
            self.non_ok_streak = 0;
            self.pending_bottleneck = None;

            if let Some(active) = &mut self.active {
                if self.ok_streak >= CLOSE_DEBOUNCE_TICKS {
                    active.end_time = Some(input.now);
                    active.duration_secs = Some(input.now - active.start_time);
                    active.active = false;
                    active.timeline.push(TimelineEntry { time: input.now, label: "closed".to_string() });
                    let closed = active.clone();
                    self.completed.push(closed.clone());
                    self.active = None;
                    return Some(closed);
                }
            }
            return None;
        }

        self.ok_streak = 0;

        if let Some(active) = &mut self.active {
            update_peaks(active, &input);
            return None;
        }

        let same_bottleneck = self.pending_bottleneck.as_deref() == input.bottleneck;
        if same_bottleneck {
            self.non_ok_streak += 1;
        } else {
            self.pending_bottleneck = input.bottleneck.map(str::to_string);
            self.non_ok_streak = 1;
        }

        if self.non_ok_streak >= OPEN_DEBOUNCE_TICKS {
            self.next_id += 1;
            let mut event = Event {
                id: format!("evt-{}-{}", input.now, self.next_id),
                start_time: input.now,
                end_time: None,
                duration_secs: None,
                peak_health: input.health,
                bottleneck: input.bottleneck.unwrap_or("unknown").to_string(),
                peak_score: input.score,
                evidence: input.evidence.to_vec(),
                causal_chain: input.causal_chain.to_string(),
                culprit: input.culprit.map(str::to_string),
                peak_cpu_pct: input.cpu_pct,
                peak_mem_pct: input.mem_pct,
                peak_io_mb_s: input.io_mb_s,
                active: true,
                timeline: vec![TimelineEntry { time: input.now, label: "opened".to_string() }],
            };
            update_peaks(&mut event, &input);
            self.active = Some(event);
            self.non_ok_streak = 0;
        }

        None
    }
}

fn update_peaks(event: &mut Event, input: &EventTickInput) {
    if input.health > event.peak_health {
        event.peak_health = input.health;
    }
    if input.score > event.peak_score {
        event.peak_score = input.score;
    }
    event.peak_cpu_pct = event.peak_cpu_pct.max(input.cpu_pct);
    event.peak_mem_pct = event.peak_mem_pct.max(input.mem_pct);
    event.peak_io_mb_s = event.peak_io_mb_s.max(input.io_mb_s);
    if !input.evidence.is_empty() {
        event.evidence = input.evidence.to_vec();
    }
    if !input.causal_chain.is_empty() {
        event.causal_chain = input.causal_chain.to_string();
    }
    if input.culprit.is_some() {
        event.culprit = input.culprit.map(str::to_string);
    }
}

/// Append-only event sink: one JSON object per line, rotated
/// to `<path>.1` once the file exceeds a configurable byte threshold.
pub trait EventLogWriter: Send + Sync {
    fn append(&mut self, event: &Event) -> Result<(), SinkError>;
}

/// Default file-backed implementation. Rotates manually rather than
/// pulling in a logging-rotation crate.
pub struct JsonlEventLog {
    path: std::path::PathBuf,
    rotate_bytes: u64,
}

impl JsonlEventLog {
    pub fn new(path: impl Into<std::path::PathBuf>, rotate_bytes: u64) -> Self {
        Self { path: path.into(), rotate_bytes }
    }

    fn rotate_if_needed(&self) -> Result<(), SinkError> {
        let len = fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        if len >= self.rotate_bytes {
            let backup = self.path.with_extension(match self.path.extension() {
                Some(ext) => format!("{}.1", ext.to_string_lossy()),
                None => "1".to_string(),
            });
            fs::rename(&self.path, backup)?;
        }
        Ok(())
    }
}

impl EventLogWriter for JsonlEventLog {
    fn append(&mut self, event: &Event) -> Result<(), SinkError> {
        self.rotate_if_needed()?;
        let line = serde_json::to_string(event)?;
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

/// Reads every valid `Event` from a JSON-lines file, silently skipping
/// malformed lines.
pub fn read_event_log(path: impl AsRef<Path>) -> std::io::Result<Vec<Event>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut events = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(event) = serde_json::from_str::<Event>(&line) {
            events.push(event);
        }
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(now: i64, health: Health, bottleneck: Option<&str>, score: f64) -> EventTickInput<'_> {
        EventTickInput {
            now,
            health,
            bottleneck,
            score,
            evidence: &[],
            causal_chain: "",
            culprit: None,
            cpu_pct: 0.0,
            mem_pct: 0.0,
            io_mb_s: 0.0,
        }
    }

    #[test]
    fn opens_only_after_three_consecutive_non_ok_ticks() {
        let mut d = EventDetector::new();
        d.tick(input(1, Health::Degraded, Some("IO"), 40.0));
        assert!(d.active().is_none());
        d.tick(input(2, Health::Degraded, Some("IO"), 40.0));
        assert!(d.active().is_none());
        d.tick(input(3, Health::Degraded, Some("IO"), 40.0));
        assert!(d.active().is_some());
    }

    #[test]
    fn resets_debounce_when_bottleneck_changes() {
        let mut d = EventDetector::new();
        d.tick(input(1, Health::Degraded, Some("IO"), 40.0));
        d.tick(input(2, Health::Degraded, Some("CPU"), 40.0));
        d.tick(input(3, Health::Degraded, Some("CPU"), 40.0));
        assert!(d.active().is_none());
    }

    #[test]
    fn tracks_peak_score_and_health_while_active() {
        let mut d = EventDetector::new();
        for t in 1..=3 {
            d.tick(input(t, Health::Degraded, Some("IO"), 40.0));
        }
        d.tick(input(4, Health::Critical, Some("IO"), 90.0));
        let active = d.active().unwrap();
        assert_eq!(active.peak_health, Health::Critical);
        assert_eq!(active.peak_score, 90.0);
    }

    #[test]
    fn closes_after_three_consecutive_ok_ticks_and_computes_duration() {
        let mut d = EventDetector::new();
        for t in 1..=3 {
            d.tick(input(t, Health::Degraded, Some("IO"), 40.0));
        }
        assert!(d.tick(input(4, Health::Ok, None, 0.0)).is_none());
        assert!(d.tick(input(5, Health::Ok, None, 0.0)).is_none());
        let closed = d.tick(input(6, Health::Ok, None, 0.0)).unwrap();
        assert_eq!(closed.start_time, 3);
        assert_eq!(closed.end_time, Some(6));
        assert_eq!(closed.duration_secs, Some(3));
        assert!(!closed.active);
        assert!(d.active().is_none());
        assert_eq!(d.completed().len(), 1);
    }

    #[test]
    fn brief_ok_blip_does_not_close_event() {
        let mut d = EventDetector::new();
        for t in 1..=3 {
            d.tick(input(t, Health::Degraded, Some("IO"), 40.0));
        }
        d.tick(input(4, Health::Ok, None, 0.0));
        d.tick(input(5, Health::Degraded, Some("IO"), 40.0));
        assert!(d.active().is_some());
    }

    #[test]
    fn read_event_log_skips_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        std::fs::write(&path, "not json\n{\"bad\":true}\n").unwrap();
        let events = read_event_log(&path).unwrap();
        assert_eq!(events.len(), 0);
    }

    #[test]
    fn jsonl_event_log_round_trips_one_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let mut log = JsonlEventLog::new(&path, 10 * 1024 * 1024);
        let mut d = EventDetector::new();
        let mut closed = None;
        for t in 1..=3 {
            d.tick(input(t, Health::Degraded, Some("IO"), 40.0));
        }
        for t in 4..=6 {
            closed = d.tick(input(t, Health::Ok, None, 0.0));
        }
        let event = closed.unwrap();
        log.append(&event).unwrap();
        let read_back = read_event_log(&path).unwrap();
        assert_eq!(read_back.len(), 1);
        assert_eq!(read_back[0].id, event.id);
    }

    #[test]
    fn rotates_to_dot_one_backup_once_over_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let mut log = JsonlEventLog::new(&path, 50);
        let mut d = EventDetector::new();
        for batch in 0..3i64 {
            let base = batch * 10;
            for t in base + 1..=base + 3 {
                d.tick(input(t, Health::Degraded, Some("IO"), 40.0));
            }
            let mut closed = None;
            for t in base + 4..=base + 6 {
                closed = d.tick(input(t, Health::Ok, None, 0.0));
            }
            if let Some(event) = closed {
                log.append(&event).unwrap();
            }
        }
        assert!(dir.path().join("events.jsonl.1").exists());
        assert!(!read_event_log(&path).unwrap().is_empty());
    }
}
