use std::sync::Arc;
use std::time::Duration;

use corner_pin_player::config::ControlsConfig;
use corner_pin_player::geometry::{Corner, corner_uv, quad_vertices, viewport_rect};
use corner_pin_player::input::{InputController, Mode, Outcome};
use corner_pin_player::settings::{MemorySlot, SettingsStore};
use tokio::runtime::Handle;
use winit::keyboard::KeyCode;

const CLIP: (u32, u32) = (1000, 500);

fn press(ctl: &mut InputController, store: &mut SettingsStore, code: KeyCode, shift: bool) -> Outcome {
    let outcome = ctl.handle_key(code, shift, CLIP);
    if outcome == Outcome::Mutated {
        store.save(&ctl.snapshot());
    }
    outcome
}

#[tokio::test]
async fn adjustments_survive_a_restart() {
    let slot = Arc::new(MemorySlot::default());
    let mut store = SettingsStore::new(slot.clone(), Duration::from_secs(30), Handle::current());
    let mut ctl = InputController::new(store.load(), ControlsConfig::default());

    // pan right 10px coarse, then pin the top-left corner 2px right, 10px down
    assert_eq!(press(&mut ctl, &mut store, KeyCode::Numpad6, true), Outcome::Mutated);
    assert_eq!(press(&mut ctl, &mut store, KeyCode::Numpad7, false), Outcome::Handled);
    assert_eq!(ctl.mode(), Mode::CornerSelected(Corner::TopLeft));
    press(&mut ctl, &mut store, KeyCode::Numpad6, false);
    press(&mut ctl, &mut store, KeyCode::Numpad6, false);
    press(&mut ctl, &mut store, KeyCode::Numpad2, true);
    press(&mut ctl, &mut store, KeyCode::Numpad5, false);
    press(&mut ctl, &mut store, KeyCode::KeyM, false);

    // teardown flush beats the long debounce
    store.flush_now(&ctl.snapshot());
    assert_eq!(slot.write_count(), 1);

    let store = SettingsStore::new(slot, Duration::from_secs(30), Handle::current());
    let restored = InputController::new(store.load(), ControlsConfig::default());
    let state = restored.state();
    assert_eq!(state.mode, Mode::NoSelection);
    assert!((state.view.x - 10.0).abs() < 1e-4);
    assert!(state.view.mirrored);

    let tl = state.offsets.get(Corner::TopLeft);
    assert!((tl.dx - 0.002).abs() < 1e-6);
    assert!((tl.dy - 0.02).abs() < 1e-6);
    let uv = corner_uv(&state.offsets, Corner::TopLeft);
    assert!((uv[0] + 0.002).abs() < 1e-6);
    assert!((uv[1] + 0.02).abs() < 1e-6);
}

#[test]
fn quad_follows_the_viewport() {
    let mut ctl = InputController::new(Default::default(), ControlsConfig::default());
    for _ in 0..3 {
        ctl.handle_key(KeyCode::NumpadSubtract, true, CLIP);
    }
    let state = ctl.state();
    assert!((state.view.scale - 0.7).abs() < 1e-4);

    let surface = (2000, 1000);
    let rect = viewport_rect(surface, CLIP, &state.view);
    let verts = quad_vertices(&state.offsets, &rect, surface);
    let (min_x, max_x) = verts
        .iter()
        .fold((f32::MAX, f32::MIN), |(lo, hi), v| (lo.min(v.pos[0]), hi.max(v.pos[0])));
    // centred, 70% of the full-width fit
    assert!((min_x + 0.7).abs() < 1e-4);
    assert!((max_x - 0.7).abs() < 1e-4);
}
