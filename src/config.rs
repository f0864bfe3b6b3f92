use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

const DEFAULT_SETTINGS_PATH: &str = "corner-pin-settings.json";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Configuration {
    /// Directory holding the clip's frames, played in file-name order.
    pub clip_path: PathBuf,
    /// Playback rate of the frame sequence.
    pub frame_rate: f32,
    /// Where the corner-pin adjustments are persisted between sessions.
    pub settings_path: PathBuf,
    /// Quiet period before a burst of adjustments is written out.
    #[serde(with = "humantime_serde")]
    pub persist_debounce: Duration,
    pub start_fullscreen: bool,
    pub controls: ControlsConfig,
    pub indicator: IndicatorConfig,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            clip_path: PathBuf::new(),
            frame_rate: Self::default_frame_rate(),
            settings_path: PathBuf::from(DEFAULT_SETTINGS_PATH),
            persist_debounce: Self::default_persist_debounce(),
            start_fullscreen: false,
            controls: ControlsConfig::default(),
            indicator: IndicatorConfig::default(),
        }
    }
}

impl Configuration {
    const fn default_frame_rate() -> f32 {
        30.0
    }

    const fn default_persist_debounce() -> Duration {
        Duration::from_millis(300)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            !self.clip_path.as_os_str().is_empty(),
            "clip-path must be set"
        );
        ensure!(
            self.frame_rate.is_finite() && self.frame_rate > 0.0,
            "frame-rate must be positive"
        );
        ensure!(
            self.settings_path.file_name().is_some(),
            "settings-path must include a file name"
        );
        self.controls
            .validate()
            .context("invalid controls configuration")?;
        self.indicator
            .validate()
            .context("invalid indicator configuration")?;
        Ok(self)
    }
}

/// A fine/coarse pair; the precision modifier selects `coarse`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StepSize {
    pub fine: f32,
    pub coarse: f32,
}

impl StepSize {
    pub const fn new(fine: f32, coarse: f32) -> Self {
        Self { fine, coarse }
    }

    pub fn pick(&self, coarse: bool) -> f32 {
        if coarse { self.coarse } else { self.fine }
    }

    fn validate(&self, name: &str) -> Result<()> {
        ensure!(
            self.fine.is_finite() && self.fine > 0.0,
            "{name}.fine must be positive"
        );
        ensure!(
            self.coarse.is_finite() && self.coarse > 0.0,
            "{name}.coarse must be positive"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ControlsConfig {
    /// Canvas pan step, in display pixels.
    pub pan_step_px: StepSize,
    /// Corner nudge step, in clip pixels.
    pub corner_step_px: StepSize,
    pub scale_step: StepSize,
    pub min_scale: f32,
    pub max_scale: f32,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            pan_step_px: StepSize::new(1.0, 10.0),
            corner_step_px: StepSize::new(1.0, 10.0),
            scale_step: StepSize::new(0.01, 0.1),
            min_scale: 0.1,
            max_scale: 2.0,
        }
    }
}

impl ControlsConfig {
    fn validate(&self) -> Result<()> {
        self.pan_step_px.validate("controls.pan-step-px")?;
        self.corner_step_px.validate("controls.corner-step-px")?;
        self.scale_step.validate("controls.scale-step")?;
        ensure!(
            self.min_scale.is_finite() && self.min_scale > 0.0,
            "controls.min-scale must be positive"
        );
        ensure!(
            self.max_scale.is_finite() && self.max_scale >= self.min_scale,
            "controls.max-scale must be >= controls.min-scale"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct IndicatorConfig {
    pub radius_px: f32,
    pub stroke_px: f32,
    pub color: [u8; 3],
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            radius_px: 14.0,
            stroke_px: 3.0,
            color: [255, 64, 64],
        }
    }
}

impl IndicatorConfig {
    fn validate(&self) -> Result<()> {
        ensure!(
            self.radius_px.is_finite() && self.radius_px > 0.0,
            "indicator.radius-px must be positive"
        );
        ensure!(
            self.stroke_px.is_finite() && self.stroke_px > 0.0 && self.stroke_px <= self.radius_px,
            "indicator.stroke-px must be positive and no larger than radius-px"
        );
        Ok(())
    }

    pub fn color_rgba(&self) -> [f32; 4] {
        let [r, g, b] = self.color;
        [
            f32::from(r) / 255.0,
            f32::from(g) / 255.0,
            f32::from(b) / 255.0,
            1.0,
        ]
    }
}
