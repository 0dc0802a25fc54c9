// SPDX-License-Identifier: CEPL-1.0
use bytemuck::{Pod, Zeroable};
use ember_math::glam::{Mat4, Vec3};

/// Interleaved vertex: position, normal, texture coordinate.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub const fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
        }
    }
}

/// Selects the shading path in the fragment shader.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ShadingStage(pub u32);

impl ShadingStage {
    /// Number of stages the bundled shaders distinguish.
    pub const COUNT: u32 = 4;

    pub fn wrapped(index: u32) -> Self {
        Self(index % Self::COUNT)
    }
}

/// Push-constant block shared by the vertex and fragment stages.
///
/// Vectors are padded to 16 bytes so the layout matches a GLSL block of
/// `vec4 eye; vec4 center; vec4 up; uint stage; float time;`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PushConstants {
    pub eye: [f32; 4],
    pub center: [f32; 4],
    pub up: [f32; 4],
    pub stage: u32,
    pub time: f32,
    pub _pad: [f32; 2],
}

impl PushConstants {
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;

    pub fn new(eye: Vec3, center: Vec3, up: Vec3, stage: ShadingStage, time: f32) -> Self {
        Self {
            eye: eye.extend(1.0).to_array(),
            center: center.extend(1.0).to_array(),
            up: up.extend(0.0).to_array(),
            stage: stage.0,
            time,
            _pad: [0.0; 2],
        }
    }
}

/// Per-model uniform data, column-major like GLSL `mat4`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct UniformBlock {
    pub model: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
}

impl UniformBlock {
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    pub fn new(model: Mat4, view: Mat4, proj: Mat4) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            view: view.to_cols_array_2d(),
            proj: proj.to_cols_array_2d(),
        }
    }
}
