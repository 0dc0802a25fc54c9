// SPDX-License-Identifier: CEPL-1.0
//! The forward render pass and its single graphics pipeline.

use std::io::Cursor;
use std::mem::offset_of;
use std::path::Path;

use ash::util::read_spv;
use ash::vk;
use ember_render::{EngineError, PushConstants, RenderSettings, Result, Vertex};
use tracing::info;

const SPIRV_MAGIC: u32 = 0x0723_0203;
const ENTRY: &std::ffi::CStr = c"main";

#[cfg(feature = "builtin-shaders")]
const BUILTIN_VERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/scene.vert.spv"));
#[cfg(feature = "builtin-shaders")]
const BUILTIN_FRAG: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/scene.frag.spv"));

/// Validated SPIR-V words for both stages.
#[derive(Debug, Clone)]
pub struct ShaderSet {
    pub vertex: Vec<u32>,
    pub fragment: Vec<u32>,
}

impl ShaderSet {
    /// Files named in the settings, falling back to the shaders built into the crate.
    pub fn load(settings: &RenderSettings) -> Result<Self> {
        Ok(Self {
            vertex: load_stage("scene.vert", settings.vertex_shader.as_deref(), builtin_vertex())?,
            fragment: load_stage("scene.frag", settings.fragment_shader.as_deref(), builtin_fragment())?,
        })
    }
}

#[cfg(feature = "builtin-shaders")]
fn builtin_vertex() -> Option<&'static [u8]> {
    Some(BUILTIN_VERT)
}
#[cfg(feature = "builtin-shaders")]
fn builtin_fragment() -> Option<&'static [u8]> {
    Some(BUILTIN_FRAG)
}
#[cfg(not(feature = "builtin-shaders"))]
fn builtin_vertex() -> Option<&'static [u8]> {
    None
}
#[cfg(not(feature = "builtin-shaders"))]
fn builtin_fragment() -> Option<&'static [u8]> {
    None
}

fn load_stage(name: &str, path: Option<&Path>, builtin: Option<&[u8]>) -> Result<Vec<u32>> {
    match (path, builtin) {
        (Some(path), _) => {
            let bytes = std::fs::read(path).map_err(|e| EngineError::ShaderLoad {
                name: path.display().to_string(),
                reason: e.to_string(),
            })?;
            info!("shader {name}: {}", path.display());
            parse_spirv(&path.display().to_string(), &bytes)
        }
        (None, Some(bytes)) => parse_spirv(name, bytes),
        (None, None) => Err(EngineError::ShaderLoad {
            name: name.into(),
            reason: "no path configured and built without builtin-shaders".into(),
        }),
    }
}

/// Checks length, alignment and magic before handing the words out.
pub fn parse_spirv(name: &str, bytes: &[u8]) -> Result<Vec<u32>> {
    let fail = |reason: String| EngineError::ShaderLoad {
        name: name.into(),
        reason,
    };
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        return Err(fail(format!("{} bytes is not a whole number of words", bytes.len())));
    }
    let words = read_spv(&mut Cursor::new(bytes)).map_err(|e| fail(e.to_string()))?;
    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(other) => Err(fail(format!("bad magic {other:#010x}"))),
        None => Err(fail("empty module".into())),
    }
}

/// Color MSAA, depth, single-sample resolve.
pub fn render_pass_attachments(
    color_format: vk::Format,
    depth_format: vk::Format,
    samples: vk::SampleCountFlags,
) -> [vk::AttachmentDescription; 3] {
    [
        vk::AttachmentDescription {
            format: color_format,
            samples,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            ..Default::default()
        },
        vk::AttachmentDescription {
            format: depth_format,
            samples,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::DONT_CARE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            ..Default::default()
        },
        vk::AttachmentDescription {
            format: color_format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::DONT_CARE,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            ..Default::default()
        },
    ]
}

pub fn external_dependency() -> vk::SubpassDependency {
    let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
    vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: stages,
        dst_stage_mask: stages,
        src_access_mask: vk::AccessFlags::empty(),
        dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE
            | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ..Default::default()
    }
}

pub unsafe fn create_render_pass(
    device: &ash::Device,
    color_format: vk::Format,
    depth_format: vk::Format,
    samples: vk::SampleCountFlags,
) -> Result<vk::RenderPass> {
    let attachments = render_pass_attachments(color_format, depth_format, samples);
    let color_ref = vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    };
    let depth_ref = vk::AttachmentReference {
        attachment: 1,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    };
    let resolve_ref = vk::AttachmentReference {
        attachment: 2,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    };
    let subpass = vk::SubpassDescription {
        pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
        color_attachment_count: 1,
        p_color_attachments: &color_ref,
        p_resolve_attachments: &resolve_ref,
        p_depth_stencil_attachment: &depth_ref,
        ..Default::default()
    };
    let dependency = external_dependency();
    let info = vk::RenderPassCreateInfo {
        s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
        attachment_count: attachments.len() as u32,
        p_attachments: attachments.as_ptr(),
        subpass_count: 1,
        p_subpasses: &subpass,
        dependency_count: 1,
        p_dependencies: &dependency,
        ..Default::default()
    };
    device
        .create_render_pass(&info, None)
        .map_err(EngineError::RenderPassCreation)
}

pub fn vertex_binding() -> vk::VertexInputBindingDescription {
    vk::VertexInputBindingDescription {
        binding: 0,
        stride: std::mem::size_of::<Vertex>() as u32,
        input_rate: vk::VertexInputRate::VERTEX,
    }
}

/// position, normal, uv at locations 0, 1, 2.
pub fn vertex_attributes() -> [vk::VertexInputAttributeDescription; 3] {
    [
        vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: offset_of!(Vertex, position) as u32,
        },
        vk::VertexInputAttributeDescription {
            location: 1,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: offset_of!(Vertex, normal) as u32,
        },
        vk::VertexInputAttributeDescription {
            location: 2,
            binding: 0,
            format: vk::Format::R32G32_SFLOAT,
            offset: offset_of!(Vertex, uv) as u32,
        },
    ]
}

pub fn push_constant_range() -> vk::PushConstantRange {
    vk::PushConstantRange {
        stage_flags: vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
        offset: 0,
        size: PushConstants::SIZE,
    }
}

/// Generators and the OBJ loader emit clockwise-from-outside triangles; the
/// projection flips Y, so clockwise is front.
pub fn rasterization_state() -> vk::PipelineRasterizationStateCreateInfo<'static> {
    vk::PipelineRasterizationStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
        polygon_mode: vk::PolygonMode::FILL,
        cull_mode: vk::CullModeFlags::BACK,
        front_face: vk::FrontFace::CLOCKWISE,
        line_width: 1.0,
        ..Default::default()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GraphicsPipeline {
    pub layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
}

impl GraphicsPipeline {
    pub unsafe fn new(
        device: &ash::Device,
        render_pass: vk::RenderPass,
        set_layout: vk::DescriptorSetLayout,
        samples: vk::SampleCountFlags,
        shaders: &ShaderSet,
    ) -> Result<Self> {
        let push_range = push_constant_range();
        let layout_info = vk::PipelineLayoutCreateInfo {
            s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
            set_layout_count: 1,
            p_set_layouts: &set_layout,
            push_constant_range_count: 1,
            p_push_constant_ranges: &push_range,
            ..Default::default()
        };
        let layout = device
            .create_pipeline_layout(&layout_info, None)
            .map_err(EngineError::PipelineLayoutCreation)?;

        match create_pipeline(device, render_pass, layout, samples, shaders) {
            Ok(pipeline) => Ok(Self { layout, pipeline }),
            Err(e) => {
                device.destroy_pipeline_layout(layout, None);
                Err(e)
            }
        }
    }

    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        device.destroy_pipeline(self.pipeline, None);
        device.destroy_pipeline_layout(self.layout, None);
        *self = Self::default();
    }
}

unsafe fn shader_module(device: &ash::Device, code: &[u32]) -> Result<vk::ShaderModule> {
    let info = vk::ShaderModuleCreateInfo {
        s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
        p_code: code.as_ptr(),
        code_size: code.len() * 4,
        ..Default::default()
    };
    device
        .create_shader_module(&info, None)
        .map_err(EngineError::PipelineCreation)
}

unsafe fn create_pipeline(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    layout: vk::PipelineLayout,
    samples: vk::SampleCountFlags,
    shaders: &ShaderSet,
) -> Result<vk::Pipeline> {
    let vs = shader_module(device, &shaders.vertex)?;
    let fs = match shader_module(device, &shaders.fragment) {
        Ok(m) => m,
        Err(e) => {
            device.destroy_shader_module(vs, None);
            return Err(e);
        }
    };

    let stages = [
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::VERTEX,
            module: vs,
            p_name: ENTRY.as_ptr(),
            ..Default::default()
        },
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::FRAGMENT,
            module: fs,
            p_name: ENTRY.as_ptr(),
            ..Default::default()
        },
    ];

    let binding = vertex_binding();
    let attributes = vertex_attributes();
    let vertex_input = vk::PipelineVertexInputStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
        vertex_binding_description_count: 1,
        p_vertex_binding_descriptions: &binding,
        vertex_attribute_description_count: attributes.len() as u32,
        p_vertex_attribute_descriptions: attributes.as_ptr(),
        ..Default::default()
    };
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
        topology: vk::PrimitiveTopology::TRIANGLE_LIST,
        ..Default::default()
    };
    // Viewport and scissor are set per frame.
    let dyn_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_DYNAMIC_STATE_CREATE_INFO,
        dynamic_state_count: dyn_states.len() as u32,
        p_dynamic_states: dyn_states.as_ptr(),
        ..Default::default()
    };
    let viewport_state = vk::PipelineViewportStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
        viewport_count: 1,
        scissor_count: 1,
        ..Default::default()
    };
    let raster = rasterization_state();
    let multisample = vk::PipelineMultisampleStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
        rasterization_samples: samples,
        ..Default::default()
    };
    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_DEPTH_STENCIL_STATE_CREATE_INFO,
        depth_test_enable: vk::TRUE,
        depth_write_enable: vk::TRUE,
        depth_compare_op: vk::CompareOp::LESS,
        ..Default::default()
    };
    let color_blend_att = vk::PipelineColorBlendAttachmentState {
        color_write_mask: vk::ColorComponentFlags::R
            | vk::ColorComponentFlags::G
            | vk::ColorComponentFlags::B
            | vk::ColorComponentFlags::A,
        blend_enable: vk::FALSE,
        ..Default::default()
    };
    let color_blend = vk::PipelineColorBlendStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
        attachment_count: 1,
        p_attachments: &color_blend_att,
        ..Default::default()
    };

    let pipeline_info = vk::GraphicsPipelineCreateInfo {
        s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
        stage_count: stages.len() as u32,
        p_stages: stages.as_ptr(),
        p_vertex_input_state: &vertex_input,
        p_input_assembly_state: &input_assembly,
        p_viewport_state: &viewport_state,
        p_rasterization_state: &raster,
        p_multisample_state: &multisample,
        p_depth_stencil_state: &depth_stencil,
        p_color_blend_state: &color_blend,
        p_dynamic_state: &dynamic_state,
        layout,
        render_pass,
        subpass: 0,
        ..Default::default()
    };

    let result = device.create_graphics_pipelines(
        vk::PipelineCache::null(),
        std::slice::from_ref(&pipeline_info),
        None,
    );
    device.destroy_shader_module(vs, None);
    device.destroy_shader_module(fs, None);

    match result {
        Ok(pipelines) => Ok(pipelines[0]),
        Err((_, err)) => Err(EngineError::PipelineCreation(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words_to_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn spirv_header_is_checked() {
        let good = words_to_bytes(&[SPIRV_MAGIC, 0x0001_0000, 0, 1, 0]);
        assert_eq!(parse_spirv("ok", &good).unwrap().len(), 5);

        let bad_magic = words_to_bytes(&[0xdead_beef, 0]);
        assert!(matches!(
            parse_spirv("bad", &bad_magic),
            Err(EngineError::ShaderLoad { .. })
        ));

        let ragged = [0x03u8, 0x02, 0x23, 0x07, 0x00];
        assert!(matches!(parse_spirv("ragged", &ragged), Err(EngineError::ShaderLoad { .. })));
        assert!(parse_spirv("empty", &[]).is_err());
    }

    #[test]
    fn missing_override_is_a_shader_error() {
        let err = load_stage("scene.vert", Some(Path::new("/nonexistent/scene.vert.spv")), None)
            .unwrap_err();
        match err {
            EngineError::ShaderLoad { name, .. } => assert!(name.contains("nonexistent")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn vertex_layout_matches_struct() {
        let binding = vertex_binding();
        assert_eq!(binding.stride, 32);
        let attrs = vertex_attributes();
        let offsets: Vec<u32> = attrs.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 24]);
        assert_eq!(attrs[2].format, vk::Format::R32G32_SFLOAT);
    }

    #[test]
    fn render_pass_resolves_into_presentable_image() {
        let [color, depth, resolve] = render_pass_attachments(
            vk::Format::B8G8R8A8_SRGB,
            vk::Format::D32_SFLOAT,
            vk::SampleCountFlags::TYPE_4,
        );
        assert_eq!(color.samples, vk::SampleCountFlags::TYPE_4);
        assert_eq!(color.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(color.final_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(depth.store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(depth.final_layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
        assert_eq!(resolve.samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(resolve.load_op, vk::AttachmentLoadOp::DONT_CARE);
        assert_eq!(resolve.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);

        let dep = external_dependency();
        assert_eq!(dep.src_subpass, vk::SUBPASS_EXTERNAL);
        assert!(dep.dst_stage_mask.contains(vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS));
    }

    #[test]
    fn push_range_covers_both_stages() {
        let range = push_constant_range();
        assert_eq!(range.size, 64);
        assert!(range.stage_flags.contains(vk::ShaderStageFlags::FRAGMENT));
        assert_eq!(rasterization_state().front_face, vk::FrontFace::CLOCKWISE);
    }
}
