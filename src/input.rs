//! Keyboard-driven mode state machine.
//!
//! The four directional keys either pan the whole viewport or nudge the
//! selected corner, depending on [`Mode`]. Every `(Mode, Action)` pair is
//! routed through [`InputController::handle`].

use tracing::{debug, trace};
use winit::keyboard::KeyCode;

use crate::config::ControlsConfig;
use crate::events::PlaybackCommand;
use crate::geometry::{Corner, CornerOffsetSet, ViewTransform, normalized_step};
use crate::settings::PersistedSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

/// Logical meaning of a key, independent of the current mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SelectCorner(Corner),
    Deselect,
    Move(Direction),
    ScaleUp,
    ScaleDown,
    ToggleMirror,
    Playback(PlaybackCommand),
    Quit,
}

impl Action {
    /// Keypad layout: 7/9/1/3 pick the corner they sit at, 5 clears, 8/2/4/6
    /// point the way they move. Top-row digits behave the same.
    pub fn from_key_code(code: KeyCode) -> Option<Self> {
        let action = match code {
            KeyCode::Numpad7 | KeyCode::Digit7 => Self::SelectCorner(Corner::TopLeft),
            KeyCode::Numpad9 | KeyCode::Digit9 => Self::SelectCorner(Corner::TopRight),
            KeyCode::Numpad1 | KeyCode::Digit1 => Self::SelectCorner(Corner::BottomLeft),
            KeyCode::Numpad3 | KeyCode::Digit3 => Self::SelectCorner(Corner::BottomRight),
            KeyCode::Numpad5 | KeyCode::Digit5 => Self::Deselect,
            KeyCode::Numpad8 | KeyCode::Digit8 => Self::Move(Direction::Up),
            KeyCode::Numpad2 | KeyCode::Digit2 => Self::Move(Direction::Down),
            KeyCode::Numpad4 | KeyCode::Digit4 => Self::Move(Direction::Left),
            KeyCode::Numpad6 | KeyCode::Digit6 => Self::Move(Direction::Right),
            KeyCode::NumpadAdd | KeyCode::Equal => Self::ScaleUp,
            KeyCode::NumpadSubtract | KeyCode::Minus => Self::ScaleDown,
            KeyCode::KeyM => Self::ToggleMirror,
            KeyCode::Space | KeyCode::Numpad0 | KeyCode::Digit0 => {
                Self::Playback(PlaybackCommand::TogglePlay)
            }
            KeyCode::KeyF => Self::Playback(PlaybackCommand::ToggleFullscreen),
            KeyCode::Escape => Self::Playback(PlaybackCommand::ExitFullscreen),
            KeyCode::Home => Self::Playback(PlaybackCommand::SeekStart),
            KeyCode::KeyQ => Self::Quit,
            _ => return None,
        };
        Some(action)
    }
}

/// A key press after mapping. `coarse` is set while the precision modifier
/// is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInput {
    pub action: Action,
    pub coarse: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    NoSelection,
    CornerSelected(Corner),
}

/// What happened to a key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Not ours; let it through.
    Ignored,
    /// Handled without touching persisted state.
    Handled,
    /// Persisted state changed; a save should be scheduled.
    Mutated,
    /// Hand the command to the playback collaborator.
    Delegate(PlaybackCommand),
    /// Close the player.
    Quit,
}

impl Outcome {
    pub fn is_consumed(self) -> bool {
        !matches!(self, Self::Ignored)
    }
}

/// Everything the renderer reads each frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControllerState {
    pub mode: Mode,
    pub view: ViewTransform,
    pub offsets: CornerOffsetSet,
}

pub struct InputController {
    state: ControllerState,
    controls: ControlsConfig,
    text_entry_active: bool,
}

impl InputController {
    /// Starts in [`Mode::NoSelection`] with the persisted transform; a stored
    /// scale outside the configured range is clamped.
    pub fn new(settings: PersistedSettings, controls: ControlsConfig) -> Self {
        let mut view = settings.view;
        view.scale = view.scale.clamp(controls.min_scale, controls.max_scale);
        Self {
            state: ControllerState {
                mode: Mode::NoSelection,
                view,
                offsets: settings.corners,
            },
            controls,
            text_entry_active: false,
        }
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn mode(&self) -> Mode {
        self.state.mode
    }

    pub fn snapshot(&self) -> PersistedSettings {
        PersistedSettings {
            view: self.state.view,
            corners: self.state.offsets,
        }
    }

    /// While text entry owns the keyboard every key is ignored.
    pub fn set_text_entry_active(&mut self, active: bool) {
        self.text_entry_active = active;
    }

    /// Map a physical key and route it. Unmapped keys are ignored.
    pub fn handle_key(&mut self, code: KeyCode, shift: bool, clip_size: (u32, u32)) -> Outcome {
        match Action::from_key_code(code) {
            Some(action) => self.handle(
                KeyInput {
                    action,
                    coarse: shift,
                },
                clip_size,
            ),
            None => Outcome::Ignored,
        }
    }

    /// Apply one key event. `clip_size` converts corner nudges from clip
    /// pixels to normalized units.
    pub fn handle(&mut self, input: KeyInput, clip_size: (u32, u32)) -> Outcome {
        if self.text_entry_active {
            trace!(?input, "text entry active; key ignored");
            return Outcome::Ignored;
        }

        let outcome = match (self.state.mode, input.action) {
            (_, Action::SelectCorner(corner)) => {
                self.state.mode = Mode::CornerSelected(corner);
                Outcome::Handled
            }
            (_, Action::Deselect) => {
                self.state.mode = Mode::NoSelection;
                Outcome::Handled
            }
            (Mode::CornerSelected(corner), Action::Move(dir)) => {
                self.nudge_corner(corner, dir, input.coarse, clip_size)
            }
            (Mode::NoSelection, Action::Move(dir)) => {
                let step = self.controls.pan_step_px.pick(input.coarse);
                let (dx, dy) = unit(dir);
                self.state.view.x += dx * step;
                self.state.view.y += dy * step;
                Outcome::Mutated
            }
            (Mode::NoSelection, Action::ScaleUp) => self.rescale(1.0, input.coarse),
            (Mode::NoSelection, Action::ScaleDown) => self.rescale(-1.0, input.coarse),
            (Mode::CornerSelected(_), Action::ScaleUp | Action::ScaleDown) => Outcome::Ignored,
            (_, Action::ToggleMirror) => {
                self.state.view.mirrored = !self.state.view.mirrored;
                Outcome::Mutated
            }
            (_, Action::Playback(cmd)) => Outcome::Delegate(cmd),
            (_, Action::Quit) => Outcome::Quit,
        };

        debug!(?input, mode = ?self.state.mode, ?outcome, "key routed");
        outcome
    }

    fn nudge_corner(
        &mut self,
        corner: Corner,
        dir: Direction,
        coarse: bool,
        clip_size: (u32, u32),
    ) -> Outcome {
        let px = self.controls.corner_step_px.pick(coarse);
        let (ux, uy) = unit(dir);
        let step = if ux != 0.0 {
            normalized_step(px, clip_size.0)
        } else {
            normalized_step(px, clip_size.1)
        };
        let Some(step) = step else {
            debug!(?corner, "clip size unknown; corner nudge skipped");
            return Outcome::Handled;
        };
        let offset = self.state.offsets.get_mut(corner);
        offset.dx += ux * step;
        offset.dy += uy * step;
        Outcome::Mutated
    }

    fn rescale(&mut self, sign: f32, coarse: bool) -> Outcome {
        let step = self.controls.scale_step.pick(coarse);
        let scaled = self.state.view.scale + sign * step;
        self.state.view.scale = scaled.clamp(self.controls.min_scale, self.controls.max_scale);
        Outcome::Mutated
    }
}

const fn unit(dir: Direction) -> (f32, f32) {
    match dir {
        Direction::Up => (0.0, -1.0),
        Direction::Down => (0.0, 1.0),
        Direction::Left => (-1.0, 0.0),
        Direction::Right => (1.0, 0.0),
    }
}
