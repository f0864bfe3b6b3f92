//! Durable storage of the view transform and corner offsets.
//!
//! The record lives in a single named slot as JSON:
//! `{canvasScale, canvasX, canvasY, mirrored, cornerOffsets: {TL,TR,BL,BR: {x, y}}}`.
//! Loading never fails; anything unreadable degrades to defaults. Saving is
//! debounced so a burst of key presses collapses into one write.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::geometry::{Corner, CornerOffset, CornerOffsetSet, ViewTransform};

/// Snapshot of everything that survives a restart.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PersistedSettings {
    pub view: ViewTransform,
    pub corners: CornerOffsetSet,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SettingsRecord {
    canvas_scale: f32,
    canvas_x: f32,
    canvas_y: f32,
    mirrored: bool,
    corner_offsets: BTreeMap<&'static str, OffsetRecord>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct OffsetRecord {
    x: f32,
    y: f32,
}

/// Serialize `settings` to the persisted JSON shape.
pub fn encode(settings: &PersistedSettings) -> String {
    let record = SettingsRecord {
        canvas_scale: settings.view.scale,
        canvas_x: settings.view.x,
        canvas_y: settings.view.y,
        mirrored: settings.view.mirrored,
        corner_offsets: settings
            .corners
            .iter()
            .map(|(corner, off)| {
                (
                    corner.key(),
                    OffsetRecord {
                        x: off.dx,
                        y: off.dy,
                    },
                )
            })
            .collect(),
    };
    // A struct of floats, a bool and string keys always serializes.
    serde_json::to_string(&record).unwrap_or_default()
}

/// Parse a persisted payload. Returns `None` when the top-level view fields
/// are missing or mistyped; individual bad corner entries become `(0, 0)`.
pub fn decode(raw: &str) -> Option<PersistedSettings> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let obj = value.as_object()?;
    let number = |key: &str| {
        obj.get(key)
            .and_then(Value::as_f64)
            .map(|v| v as f32)
            .filter(|v| v.is_finite())
    };

    let view = ViewTransform {
        scale: number("canvasScale")?,
        x: number("canvasX")?,
        y: number("canvasY")?,
        mirrored: obj.get("mirrored").and_then(Value::as_bool)?,
    };

    let stored = obj.get("cornerOffsets").and_then(Value::as_object);
    let mut corners = CornerOffsetSet::default();
    for corner in Corner::ALL {
        let entry = stored
            .and_then(|map| map.get(corner.key()))
            .and_then(|v| OffsetRecord::deserialize(v).ok())
            .filter(|r| r.x.is_finite() && r.y.is_finite());
        match entry {
            Some(r) => corners.set(corner, CornerOffset::new(r.x, r.y)),
            None => debug!(corner = corner.key(), "corner offset missing; using (0, 0)"),
        }
    }

    Some(PersistedSettings { view, corners })
}

/// A single named durable entry.
pub trait SettingsSlot: Send + Sync {
    /// `Ok(None)` when nothing has been stored yet.
    fn read(&self) -> io::Result<Option<String>>;
    fn write(&self, payload: &str) -> io::Result<()>;
}

/// Slot backed by a JSON file. Writes go through a sibling temp file and a
/// rename so a crash never leaves a truncated record behind.
#[derive(Debug, Clone)]
pub struct FileSlot {
    path: PathBuf,
}

impl FileSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsSlot for FileSlot {
    fn read(&self) -> io::Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(s) => Ok(Some(s)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn write(&self, payload: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, payload)?;
        fs::rename(&tmp, &self.path)
    }
}

/// In-memory slot that counts writes.
#[derive(Debug, Default)]
pub struct MemorySlot {
    value: Mutex<Option<String>>,
    writes: AtomicUsize,
}

impl MemorySlot {
    pub fn with_contents(payload: impl Into<String>) -> Self {
        Self {
            value: Mutex::new(Some(payload.into())),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn contents(&self) -> Option<String> {
        self.value.lock().ok().and_then(|v| v.clone())
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl SettingsSlot for MemorySlot {
    fn read(&self) -> io::Result<Option<String>> {
        let guard = self
            .value
            .lock()
            .map_err(|_| io::Error::other("memory slot poisoned"))?;
        Ok(guard.clone())
    }

    fn write(&self, payload: &str) -> io::Result<()> {
        let mut guard = self
            .value
            .lock()
            .map_err(|_| io::Error::other("memory slot poisoned"))?;
        *guard = Some(payload.to_owned());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Trailing debounce: one pending job at most, replaced on every re-arm.
struct DebouncedWriter {
    quiet: Duration,
    runtime: Handle,
    pending: Option<JoinHandle<()>>,
}

impl DebouncedWriter {
    fn rearm<F>(&mut self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(prev) = self.pending.take() {
            prev.abort();
        }
        let quiet = self.quiet;
        self.pending = Some(self.runtime.spawn(async move {
            tokio::time::sleep(quiet).await;
            job();
        }));
    }
}

pub struct SettingsStore {
    slot: Arc<dyn SettingsSlot>,
    writer: DebouncedWriter,
}

impl SettingsStore {
    /// `runtime` hosts the debounce timer; callers may live outside it.
    pub fn new(slot: Arc<dyn SettingsSlot>, quiet: Duration, runtime: Handle) -> Self {
        Self {
            slot,
            writer: DebouncedWriter {
                quiet,
                runtime,
                pending: None,
            },
        }
    }

    /// Read the stored record, falling back to defaults on any failure.
    pub fn load(&self) -> PersistedSettings {
        let raw = match self.slot.read() {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("no stored settings; using defaults");
                return PersistedSettings::default();
            }
            Err(err) => {
                warn!(error = %err, "failed to read stored settings; using defaults");
                return PersistedSettings::default();
            }
        };
        match decode(&raw) {
            Some(settings) => {
                debug!(?settings, "restored settings");
                settings
            }
            None => {
                warn!("stored settings are malformed; using defaults");
                PersistedSettings::default()
            }
        }
    }

    /// Schedule a write of `settings` once the quiet period passes without
    /// another call.
    pub fn save(&mut self, settings: &PersistedSettings) {
        let slot = Arc::clone(&self.slot);
        let payload = encode(settings);
        self.writer.rearm(move || write_logged(slot.as_ref(), &payload));
    }

    /// Write immediately, bypassing the debounce. Used once at teardown; a
    /// pending debounced write is left alone.
    pub fn flush_now(&self, settings: &PersistedSettings) {
        write_logged(self.slot.as_ref(), &encode(settings));
    }
}

fn write_logged(slot: &dyn SettingsSlot, payload: &str) {
    match slot.write(payload) {
        Ok(()) => debug!(bytes = payload.len(), "settings written"),
        Err(err) => warn!(error = %err, "failed to write settings"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PersistedSettings {
        let mut corners = CornerOffsetSet::default();
        corners.set(Corner::TopLeft, CornerOffset::new(0.01, -0.02));
        corners.set(Corner::TopRight, CornerOffset::new(-0.5, 0.25));
        corners.set(Corner::BottomLeft, CornerOffset::new(0.125, 0.0));
        corners.set(Corner::BottomRight, CornerOffset::new(3.0, -1.75));
        PersistedSettings {
            view: ViewTransform {
                scale: 1.35,
                x: -42.0,
                y: 17.5,
                mirrored: true,
            },
            corners,
        }
    }

    #[test]
    fn decode_reverses_encode() {
        let s = sample();
        assert_eq!(decode(&encode(&s)), Some(s));
    }

    #[test]
    fn encode_uses_wire_names() {
        let v: Value = serde_json::from_str(&encode(&sample())).unwrap();
        assert_eq!(v["mirrored"], Value::Bool(true));
        assert!(v["canvasScale"].is_number());
        assert!(v["canvasX"].is_number());
        assert!(v["canvasY"].is_number());
        for key in ["TL", "TR", "BL", "BR"] {
            assert!(v["cornerOffsets"][key]["x"].is_number(), "{key}");
            assert!(v["cornerOffsets"][key]["y"].is_number(), "{key}");
        }
    }

    #[test]
    fn missing_corner_defaults_individually() {
        let raw = r#"{
            "canvasScale": 1.2, "canvasX": 3, "canvasY": 4, "mirrored": false,
            "cornerOffsets": {
                "TL": {"x": 0.1, "y": 0.2},
                "TR": {"x": -0.1, "y": 0.0},
                "BR": {"x": 0.5, "y": 0.5}
            }
        }"#;
        let s = decode(raw).unwrap();
        assert_eq!(s.corners.get(Corner::BottomLeft), CornerOffset::default());
        assert_eq!(s.corners.get(Corner::TopLeft), CornerOffset::new(0.1, 0.2));
        assert_eq!(s.corners.get(Corner::TopRight), CornerOffset::new(-0.1, 0.0));
        assert_eq!(
            s.corners.get(Corner::BottomRight),
            CornerOffset::new(0.5, 0.5)
        );
    }

    #[test]
    fn invalid_corner_entries_are_repaired() {
        let raw = r#"{
            "canvasScale": 1, "canvasX": 0, "canvasY": 0, "mirrored": true,
            "cornerOffsets": { "TL": "nope", "TR": {"x": 1}, "BL": {"x": 0.5, "y": 0.5} }
        }"#;
        let s = decode(raw).unwrap();
        assert_eq!(s.corners.get(Corner::TopLeft), CornerOffset::default());
        assert_eq!(s.corners.get(Corner::TopRight), CornerOffset::default());
        assert_eq!(s.corners.get(Corner::BottomLeft), CornerOffset::new(0.5, 0.5));
        assert!(s.view.mirrored);
    }

    #[test]
    fn missing_corner_map_keeps_view() {
        let raw = r#"{"canvasScale": 0.5, "canvasX": 1, "canvasY": 2, "mirrored": false}"#;
        let s = decode(raw).unwrap();
        assert_eq!(s.corners, CornerOffsetSet::default());
        assert_eq!(s.view.scale, 0.5);
    }

    #[test]
    fn bad_view_fields_reject_the_record() {
        assert_eq!(decode("not json"), None);
        assert_eq!(decode("[1, 2, 3]"), None);
        assert_eq!(
            decode(r#"{"canvasScale": "1", "canvasX": 0, "canvasY": 0, "mirrored": false}"#),
            None
        );
        assert_eq!(
            decode(r#"{"canvasScale": 1, "canvasX": 0, "canvasY": 0, "mirrored": 1}"#),
            None
        );
        assert_eq!(decode(r#"{"canvasScale": 1, "canvasX": 0, "mirrored": false}"#), None);
    }

    #[tokio::test(start_paused = true)]
    async fn load_degrades_to_defaults() {
        let slot = Arc::new(MemorySlot::with_contents("{ truncated"));
        let store = SettingsStore::new(slot, Duration::from_millis(10), Handle::current());
        assert_eq!(store.load(), PersistedSettings::default());

        let empty = Arc::new(MemorySlot::default());
        let store = SettingsStore::new(empty, Duration::from_millis(10), Handle::current());
        assert_eq!(store.load(), PersistedSettings::default());
    }
}
