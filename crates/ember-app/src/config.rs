// SPDX-License-Identifier: CEPL-1.0
//! `ember.toml`: every field optional, defaults reproduce the stock scene.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ember_math::glam::Vec3;
use ember_math::{Camera, Transform};
use ember_render::{DeviceRequirements, MeshSource, ModelDesc, RenderSettings, SceneDesc, SurfaceFormatPref};
use serde::Deserialize;

pub const DEFAULT_CONFIG: &str = "ember.toml";

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub window: WindowCfg,
    pub render: RenderCfg,
    pub camera: CameraCfg,
    pub scene: SceneCfg,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WindowCfg {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowCfg {
    fn default() -> Self {
        Self {
            title: "ember".into(),
            width: 800,
            height: 600,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
pub enum SurfaceFormatCfg {
    #[default]
    #[serde(rename = "b8g8r8a8_srgb")]
    B8g8r8a8Srgb,
    #[serde(rename = "b8g8r8a8_unorm")]
    B8g8r8a8Unorm,
    #[serde(rename = "r8g8b8a8_srgb")]
    R8g8b8a8Srgb,
    #[serde(rename = "r8g8b8a8_unorm")]
    R8g8b8a8Unorm,
}

impl From<SurfaceFormatCfg> for SurfaceFormatPref {
    fn from(f: SurfaceFormatCfg) -> Self {
        match f {
            SurfaceFormatCfg::B8g8r8a8Srgb => Self::Bgra8Srgb,
            SurfaceFormatCfg::B8g8r8a8Unorm => Self::Bgra8Unorm,
            SurfaceFormatCfg::R8g8b8a8Srgb => Self::Rgba8Srgb,
            SurfaceFormatCfg::R8g8b8a8Unorm => Self::Rgba8Unorm,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RenderCfg {
    pub frames_in_flight: usize,
    pub clear_color: [f32; 4],
    pub preferred_surface_format: SurfaceFormatCfg,
    pub prefer_mailbox: bool,
    pub validation: bool,
    pub require_discrete_gpu: bool,
    pub require_geometry_shader: bool,
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub vertex_shader: Option<PathBuf>,
    pub fragment_shader: Option<PathBuf>,
    pub screenshot_dir: PathBuf,
    pub starting_stage: u32,
}

impl Default for RenderCfg {
    fn default() -> Self {
        let s = RenderSettings::default();
        Self {
            frames_in_flight: s.frames_in_flight,
            clear_color: s.clear_color,
            preferred_surface_format: SurfaceFormatCfg::default(),
            prefer_mailbox: s.prefer_mailbox,
            validation: s.validation,
            require_discrete_gpu: false,
            require_geometry_shader: false,
            fov_y_degrees: s.fov_y,
            near: s.near,
            far: s.far,
            vertex_shader: None,
            fragment_shader: None,
            screenshot_dir: s.screenshot_dir,
            starting_stage: s.starting_stage,
        }
    }
}

impl RenderCfg {
    pub fn to_settings(&self, app_name: &str) -> RenderSettings {
        RenderSettings {
            app_name: app_name.to_owned(),
            frames_in_flight: self.frames_in_flight.max(1),
            clear_color: self.clear_color,
            surface_format: self.preferred_surface_format.into(),
            prefer_mailbox: self.prefer_mailbox,
            validation: self.validation,
            device: DeviceRequirements {
                discrete_gpu: self.require_discrete_gpu,
                geometry_shader: self.require_geometry_shader,
            },
            fov_y: self.fov_y_degrees,
            near: self.near,
            far: self.far,
            vertex_shader: self.vertex_shader.clone(),
            fragment_shader: self.fragment_shader.clone(),
            screenshot_dir: self.screenshot_dir.clone(),
            starting_stage: self.starting_stage,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct CameraCfg {
    pub eye: [f32; 3],
    pub center: [f32; 3],
    pub up: [f32; 3],
    pub max_pitch_degrees: f32,
    /// World units per second.
    pub move_speed: f32,
    /// Degrees per second for the arrow keys.
    pub look_speed: f32,
    /// Degrees per pixel of right-button drag.
    pub mouse_sensitivity: f32,
}

impl Default for CameraCfg {
    fn default() -> Self {
        Self {
            eye: [1.5, 1.5, 8.0],
            center: [1.5, 0.0, 0.0],
            up: [0.0, 1.0, 0.0],
            max_pitch_degrees: 89.0,
            move_speed: 3.0,
            look_speed: 90.0,
            mouse_sensitivity: 0.2,
        }
    }
}

impl CameraCfg {
    pub fn to_camera(&self) -> Camera {
        Camera::new(self.eye.into(), self.center.into(), self.up.into())
            .with_max_pitch(self.max_pitch_degrees.to_radians())
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ModelCfg {
    pub mesh: String,
    pub position: [f32; 3],
    pub rotation: [f32; 3],
    pub scale: [f32; 3],
    pub spin: [f32; 3],
}

impl Default for ModelCfg {
    fn default() -> Self {
        Self {
            mesh: "torus".into(),
            position: [0.0; 3],
            rotation: [0.0; 3],
            scale: [1.0; 3],
            spin: [0.0; 3],
        }
    }
}

impl From<&ModelDesc> for ModelCfg {
    fn from(m: &ModelDesc) -> Self {
        Self {
            mesh: m.mesh.to_string(),
            position: m.transform.position.into(),
            rotation: m.transform.rotation.into(),
            scale: m.transform.scale.into(),
            spin: m.spin.into(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SceneCfg {
    pub texture: Option<PathBuf>,
    pub models: Vec<ModelCfg>,
}

impl Default for SceneCfg {
    fn default() -> Self {
        let stock = SceneDesc::default();
        Self {
            texture: stock.texture.clone(),
            models: stock.models.iter().map(ModelCfg::from).collect(),
        }
    }
}

impl SceneCfg {
    pub fn to_scene(&self) -> SceneDesc {
        SceneDesc {
            texture: self.texture.clone(),
            models: self
                .models
                .iter()
                .map(|m| ModelDesc {
                    mesh: MeshSource::parse(&m.mesh),
                    transform: Transform::new(
                        Vec3::from(m.position),
                        Vec3::from(m.rotation),
                        Vec3::from(m.scale),
                    ),
                    spin: Vec3::from(m.spin),
                })
                .collect(),
        }
    }
}

pub fn parse(text: &str) -> Result<AppConfig> {
    Ok(toml::from_str(text)?)
}

/// An explicit path must exist; the default path may be absent.
pub fn load(explicit: Option<&Path>) -> Result<AppConfig> {
    let (path, required) = match explicit {
        Some(p) => (p, true),
        None => (Path::new(DEFAULT_CONFIG), false),
    };
    match fs::read_to_string(path) {
        Ok(text) => parse(&text).with_context(|| format!("parsing {}", path.display())),
        Err(e) if e.kind() == io::ErrorKind::NotFound && !required => Ok(AppConfig::default()),
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let cfg = parse("").unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.window.width, 800);
        assert_eq!(cfg.scene.to_scene(), SceneDesc::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = parse(
            r#"
            [render]
            frames_in_flight = 3
            preferred_surface_format = "r8g8b8a8_unorm"
            clear_color = [0.1, 0.2, 0.3, 1.0]

            [[scene.models]]
            mesh = "assets/bunny.obj"
            position = [0.0, 1.0, 0.0]
            "#,
        )
        .unwrap();
        let settings = cfg.render.to_settings("t");
        assert_eq!(settings.frames_in_flight, 3);
        assert_eq!(settings.surface_format, SurfaceFormatPref::Rgba8Unorm);
        assert_eq!(settings.clear_color, [0.1, 0.2, 0.3, 1.0]);
        assert_eq!(settings.fov_y, 45.0);

        let scene = cfg.scene.to_scene();
        assert_eq!(scene.models.len(), 1);
        assert_eq!(scene.models[0].mesh, MeshSource::Obj(PathBuf::from("assets/bunny.obj")));
        assert_eq!(scene.models[0].transform.scale, Vec3::ONE);
        assert_eq!(cfg.camera, CameraCfg::default());
    }

    #[test]
    fn zero_frames_in_flight_is_raised_to_one() {
        let cfg = parse("[render]\nframes_in_flight = 0\n").unwrap();
        assert_eq!(cfg.render.to_settings("t").frames_in_flight, 1);
    }

    #[test]
    fn malformed_file_is_an_error() {
        assert!(parse("[render\nframes_in_flight = 2").is_err());
        assert!(parse("[render]\nframes_in_flight = \"two\"").is_err());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        assert!(load(Some(Path::new("/nonexistent/ember.toml"))).is_err());
    }

    #[test]
    fn camera_from_config() {
        let cam = CameraCfg::default().to_camera();
        assert_eq!(cam.eye(), Vec3::new(1.5, 1.5, 8.0));
        assert_eq!(cam.center(), Vec3::new(1.5, 0.0, 0.0));
        assert!((cam.max_pitch() - 89f32.to_radians()).abs() < 1e-6);
    }
}
