// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
mod config;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use ember_core::{init_tracing, FrameClock};
use ember_platform::{InputAction, InputState};
use ember_render::{FrameStatus, RenderSize, Renderer, ShadingStage};
use ember_render_vk::VkRenderer;
use tracing::{error, info};

use ember_platform::winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

use config::AppConfig;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file; ./ember.toml is used when present
    #[arg(long)]
    config: Option<PathBuf>,
    /// Exit after this many presented frames
    #[arg(long)]
    max_frames: Option<u64>,
    /// Request a screenshot when the frame counter reaches this value
    #[arg(long)]
    screenshot_at: Option<u64>,
}

struct App {
    cfg: AppConfig,
    args: Args,
    window: Option<Window>,
    renderer: Option<VkRenderer>,
    input: InputState,
    clock: FrameClock,

    exiting: bool,
    /// Framebuffer is 0x0: the loop sleeps until a usable resize arrives.
    paused: bool,
    failure: Option<anyhow::Error>,
    frames: u32,
    last_fps_instant: std::time::Instant,
}

impl App {
    fn new(cfg: AppConfig, args: Args) -> Self {
        Self {
            cfg,
            args,
            window: None,
            renderer: None,
            input: InputState::default(),
            clock: FrameClock::new(),
            exiting: false,
            paused: false,
            failure: None,
            frames: 0,
            last_fps_instant: std::time::Instant::now(),
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let w = &self.cfg.window;
        let window = event_loop.create_window(
            Window::default_attributes()
                .with_title(w.title.clone())
                .with_inner_size(LogicalSize::new(w.width, w.height)),
        )?;
        let size = window.inner_size();
        let settings = self.cfg.render.to_settings(&w.title);
        let renderer = VkRenderer::new(
            &window,
            &window,
            RenderSize::new(size.width, size.height),
            &settings,
            &self.cfg.scene.to_scene(),
            self.cfg.camera.to_camera(),
        )?;
        info!("window {}x{}", size.width, size.height);

        self.window = Some(window);
        self.renderer = Some(renderer);
        self.clock.reset_delta();
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{err:#}");
        self.failure = Some(err);
        self.shutdown(event_loop);
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.exiting = true;
        // Renderer before window: the surface references it.
        self.renderer = None;
        self.window = None;
        event_loop.exit();
    }

    fn on_action(&mut self, event_loop: &ActiveEventLoop, action: InputAction) {
        match action {
            InputAction::Close => self.shutdown(event_loop),
            InputAction::Screenshot => {
                if let Some(r) = &mut self.renderer {
                    r.request_screenshot();
                }
            }
            InputAction::ResetModels => {
                if let Some(r) = &mut self.renderer {
                    r.reset_models();
                }
            }
            InputAction::SelectStage(stage) => {
                if let Some(r) = &mut self.renderer {
                    r.set_stage(ShadingStage::wrapped(stage));
                }
            }
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(renderer) = &mut self.renderer else {
            return;
        };
        let t = self.clock.tick();
        let cam = &self.cfg.camera;

        let motion = self.input.motion();
        let (yaw, pitch) = self
            .input
            .take_look(t.dt, cam.look_speed, cam.mouse_sensitivity);
        let camera = renderer.camera_mut();
        camera.apply_motion(motion, cam.move_speed * t.dt);
        if yaw != 0.0 || pitch != 0.0 {
            camera.look_around(yaw, pitch);
        }
        renderer.update(t.dt, t.elapsed);

        if self.args.screenshot_at == Some(renderer.frame_counter()) {
            renderer.request_screenshot();
        }

        let status = match renderer.render() {
            Ok(status) => status,
            Err(e) => {
                self.fail(event_loop, anyhow::Error::new(e).context("render"));
                return;
            }
        };
        if status == FrameStatus::Presented {
            self.frames = self.frames.saturating_add(1);
        }
        let paused = paused_after_frame(status);
        if paused != self.paused {
            info!("paused={paused}");
        }
        self.paused = paused;

        if let Some(max) = self.args.max_frames {
            if renderer.frame_counter() >= max {
                info!("reached {max} frames");
                self.shutdown(event_loop);
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() && !self.exiting {
            if let Err(e) = self.init(event_loop) {
                self.fail(event_loop, e.context("startup"));
                return;
            }
        }
        event_loop.set_control_flow(ControlFlow::Poll);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        if let Some(action) = self.input.handle_window_event(&event) {
            self.on_action(event_loop, action);
            if self.exiting {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.shutdown(event_loop);
            }

            WindowEvent::Resized(new_size) => {
                info!("Resized → {}x{}", new_size.width, new_size.height);
                let size = RenderSize::new(new_size.width, new_size.height);
                if let Some(r) = &mut self.renderer {
                    r.resize(size);
                }
                let was_paused = self.paused;
                self.paused = paused_after_resize(self.paused, size);
                if was_paused && !self.paused {
                    info!("resized out of 0x0 → paused=false");
                    self.clock.reset_delta();
                    event_loop.set_control_flow(control_flow(false));
                    if let Some(w) = &self.window {
                        w.request_redraw();
                    }
                }
            }

            WindowEvent::RedrawRequested => {
                if !self.exiting {
                    self.redraw(event_loop);
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }
        event_loop.set_control_flow(control_flow(self.paused));
        if self.paused {
            // Sleep until the window system reports a usable size.
            self.frames = 0;
            return;
        }
        if let Some(w) = &self.window {
            w.request_redraw();
        }

        let now = std::time::Instant::now();
        if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
            info!("fps ~ {}", self.frames);
            self.frames = 0;
            self.last_fps_instant = now;
        }
    }
}

/// A suspended frame parks the loop; anything else keeps it drawing.
fn paused_after_frame(status: FrameStatus) -> bool {
    status == FrameStatus::Suspended
}

/// Only a non-zero size wakes a parked loop. A zero size while running is
/// left for the next frame to discover.
fn paused_after_resize(paused: bool, size: RenderSize) -> bool {
    paused && size.is_zero()
}

fn control_flow(paused: bool) -> ControlFlow {
    if paused {
        ControlFlow::Wait
    } else {
        ControlFlow::Poll
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let cfg = config::load(args.config.as_deref())?;
    let event_loop: EventLoop<()> = EventLoop::new()?;

    let mut app = App::new(cfg, args);
    event_loop.run_app(&mut app)?;
    match app.failure.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suspended_frame_parks_the_loop() {
        let paused = paused_after_frame(FrameStatus::Suspended);
        assert!(paused);
        assert_eq!(control_flow(paused), ControlFlow::Wait);
    }

    #[test]
    fn drawn_or_rebuilt_frames_keep_polling() {
        for status in [FrameStatus::Presented, FrameStatus::Recreated] {
            let paused = paused_after_frame(status);
            assert!(!paused);
            assert_eq!(control_flow(paused), ControlFlow::Poll);
        }
    }

    #[test]
    fn only_a_usable_resize_wakes_a_parked_loop() {
        assert!(paused_after_resize(true, RenderSize::new(0, 0)));
        assert!(paused_after_resize(true, RenderSize::new(800, 0)));
        assert!(!paused_after_resize(true, RenderSize::new(800, 600)));
    }

    #[test]
    fn minimize_then_restore_cycle() {
        // Resized(0,0) while running: the frame after it reports Suspended.
        let mut paused = paused_after_resize(false, RenderSize::new(0, 0));
        assert!(!paused);
        paused = paused_after_frame(FrameStatus::Suspended);
        assert_eq!(control_flow(paused), ControlFlow::Wait);

        // Further zero-size events keep it asleep; a restore wakes it.
        paused = paused_after_resize(paused, RenderSize::new(0, 0));
        assert_eq!(control_flow(paused), ControlFlow::Wait);
        paused = paused_after_resize(paused, RenderSize::new(1024, 768));
        assert_eq!(control_flow(paused), ControlFlow::Poll);
        paused = paused_after_frame(FrameStatus::Presented);
        assert!(!paused);
    }
}
