// SPDX-License-Identifier: CEPL-1.0
//! Window system glue. Re-exports `winit` so the app does not depend on it directly.

mod input;

pub use input::{InputAction, InputState};
pub use winit;
