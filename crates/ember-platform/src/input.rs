// SPDX-License-Identifier: CEPL-1.0
use std::collections::HashSet;

use ember_math::CameraMotion;
use tracing::debug;
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// One-shot commands triggered by a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAction {
    Close,
    Screenshot,
    ResetModels,
    SelectStage(u32),
}

/// Held keys and mouse-look state for the main window.
#[derive(Debug, Default)]
pub struct InputState {
    keys_down: HashSet<KeyCode>,
    dragging: bool,
    cursor: Option<(f64, f64)>,
    drag_delta: (f64, f64),
}

impl InputState {
    pub fn handle_window_event(&mut self, event: &WindowEvent) -> Option<InputAction> {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(code) = event.physical_key else {
                    return None;
                };
                self.on_key(code, event.state == ElementState::Pressed, event.repeat)
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if *button == MouseButton::Right {
                    self.on_look_button(*state == ElementState::Pressed);
                }
                None
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.on_cursor(position.x, position.y);
                None
            }
            WindowEvent::CursorLeft { .. } => {
                self.cursor = None;
                None
            }
            WindowEvent::Focused(false) => {
                // Releases are not delivered to unfocused windows.
                self.keys_down.clear();
                self.dragging = false;
                None
            }
            _ => None,
        }
    }

    fn on_key(&mut self, code: KeyCode, pressed: bool, repeat: bool) -> Option<InputAction> {
        if !pressed {
            self.keys_down.remove(&code);
            return None;
        }
        self.keys_down.insert(code);
        if repeat {
            return None;
        }
        let action = match code {
            KeyCode::Escape => InputAction::Close,
            KeyCode::F12 => InputAction::Screenshot,
            KeyCode::KeyR => InputAction::ResetModels,
            KeyCode::Digit1 => InputAction::SelectStage(0),
            KeyCode::Digit2 => InputAction::SelectStage(1),
            KeyCode::Digit3 => InputAction::SelectStage(2),
            KeyCode::Digit4 => InputAction::SelectStage(3),
            _ => return None,
        };
        debug!("input action {action:?}");
        Some(action)
    }

    fn on_look_button(&mut self, pressed: bool) {
        self.dragging = pressed;
    }

    fn on_cursor(&mut self, x: f64, y: f64) {
        if let (true, Some((px, py))) = (self.dragging, self.cursor) {
            self.drag_delta.0 += x - px;
            self.drag_delta.1 += y - py;
        }
        self.cursor = Some((x, y));
    }

    fn held(&self, code: KeyCode) -> bool {
        self.keys_down.contains(&code)
    }

    /// WASD movement for this frame.
    pub fn motion(&self) -> CameraMotion {
        let mut m = CameraMotion::empty();
        m.set(CameraMotion::FORWARD, self.held(KeyCode::KeyW));
        m.set(CameraMotion::BACKWARD, self.held(KeyCode::KeyS));
        m.set(CameraMotion::LEFT, self.held(KeyCode::KeyA));
        m.set(CameraMotion::RIGHT, self.held(KeyCode::KeyD));
        m
    }

    /// Yaw and pitch in degrees accumulated since the last call.
    ///
    /// Arrow keys turn at `key_rate` degrees per second; a right-button drag
    /// turns `mouse_rate` degrees per pixel. Positive yaw turns left and
    /// positive pitch looks up.
    pub fn take_look(&mut self, dt: f32, key_rate: f32, mouse_rate: f32) -> (f32, f32) {
        let axis = |pos: KeyCode, neg: KeyCode| {
            (self.held(pos) as i32 - self.held(neg) as i32) as f32
        };
        let mut yaw = axis(KeyCode::ArrowLeft, KeyCode::ArrowRight) * key_rate * dt;
        let mut pitch = axis(KeyCode::ArrowUp, KeyCode::ArrowDown) * key_rate * dt;

        let (dx, dy) = std::mem::take(&mut self.drag_delta);
        yaw -= dx as f32 * mouse_rate;
        pitch -= dy as f32 * mouse_rate;
        (yaw, pitch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn held_keys_map_to_motion() {
        let mut input = InputState::default();
        input.on_key(KeyCode::KeyW, true, false);
        input.on_key(KeyCode::KeyD, true, false);
        assert_eq!(input.motion(), CameraMotion::FORWARD | CameraMotion::RIGHT);
        input.on_key(KeyCode::KeyW, false, false);
        assert_eq!(input.motion(), CameraMotion::RIGHT);
    }

    #[test]
    fn actions_fire_once_per_press() {
        let mut input = InputState::default();
        assert_eq!(input.on_key(KeyCode::F12, true, false), Some(InputAction::Screenshot));
        assert_eq!(input.on_key(KeyCode::F12, true, true), None);
        assert_eq!(input.on_key(KeyCode::Digit3, true, false), Some(InputAction::SelectStage(2)));
    }

    #[test]
    fn drag_accumulates_until_taken() {
        let mut input = InputState::default();
        input.on_cursor(10.0, 10.0);
        input.on_look_button(true);
        input.on_cursor(14.0, 8.0);
        input.on_cursor(16.0, 8.0);
        let (yaw, pitch) = input.take_look(0.016, 90.0, 0.5);
        assert_eq!(yaw, -3.0);
        assert_eq!(pitch, 1.0);
        assert_eq!(input.take_look(0.016, 90.0, 0.5), (0.0, 0.0));
    }

    #[test]
    fn cursor_moves_without_drag_are_ignored() {
        let mut input = InputState::default();
        input.on_cursor(0.0, 0.0);
        input.on_cursor(50.0, 50.0);
        assert_eq!(input.take_look(0.016, 90.0, 0.5), (0.0, 0.0));
    }
}
