//! Indirect draw of the generated primitives inside the core 3D graph.
//!
//! Pipelines are specialized per view on topology, target format and MSAA
//! sample count. When shadow casting is on, the same indirect arguments are
//! also drawn depth-only into every shadow map of the view's lights.

use super::driver::NoiseMeshDriver;
use super::extraction::NoiseMeshFrame;
use crate::settings::DrawTopology;
use bevy::core_pipeline::core_3d::CORE_3D_DEPTH_FORMAT;
use bevy::ecs::query::QueryItem;
use bevy::pbr::{ShadowView, ViewLightEntities};
use bevy::prelude::*;
use bevy::render::render_graph::{NodeRunError, RenderGraphContext, RenderLabel, ViewNode};
use bevy::render::render_resource::{
    BindGroup, BindGroupEntries, BindGroupLayout, BindGroupLayoutEntry, BindingType, Buffer,
    BufferBindingType, BufferInitDescriptor, BufferUsages, CachedRenderPipelineId,
    ColorTargetState, ColorWrites, CompareFunction, DepthBiasState, DepthStencilState,
    FragmentState, LoadOp, MultisampleState, Operations, PipelineCache, PrimitiveState,
    PrimitiveTopology, RenderPassDepthStencilAttachment, RenderPassDescriptor,
    RenderPipelineDescriptor, ShaderStages, SpecializedRenderPipeline,
    SpecializedRenderPipelines, StencilState, StoreOp, TextureFormat, VertexState,
};
use bevy::render::renderer::{RenderContext, RenderDevice};
use bevy::render::view::{ExtractedView, ViewDepthTexture, ViewTarget};
use bytemuck::{Pod, Zeroable};
use constants::procedural_shader::PROCEDURAL_DRAW_SHADER_PATH;

#[derive(Debug, Hash, PartialEq, Eq, Clone, RenderLabel)]
pub struct NoiseMeshDrawLabel;

#[derive(Debug, Hash, PartialEq, Eq, Clone, RenderLabel)]
pub struct NoiseMeshShadowLabel;

/// Matches `DrawView` in `procedural_draw.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct DrawViewUniform {
    clip_from_world: [f32; 16],
    line_colour: [f32; 4],
}

fn primitive_topology(topology: DrawTopology) -> PrimitiveTopology {
    match topology {
        DrawTopology::Lines => PrimitiveTopology::LineList,
        DrawTopology::Points => PrimitiveTopology::PointList,
        DrawTopology::Triangles => PrimitiveTopology::TriangleList,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawTarget {
    /// Colour and depth of a camera view.
    View { hdr: bool, msaa_samples: u32 },
    /// Depth only, into a light's shadow map.
    ShadowMap,
}

impl DrawTarget {
    pub fn view(hdr: bool, msaa: Option<&Msaa>) -> Self {
        Self::View {
            hdr,
            msaa_samples: msaa.map_or(1, Msaa::samples),
        }
    }

    fn colour_format(self) -> Option<TextureFormat> {
        match self {
            Self::View { hdr: true, .. } => Some(ViewTarget::TEXTURE_FORMAT_HDR),
            Self::View { hdr: false, .. } => Some(TextureFormat::bevy_default()),
            Self::ShadowMap => None,
        }
    }

    fn multisample(self) -> MultisampleState {
        let count = match self {
            Self::View { msaa_samples, .. } => msaa_samples.max(1),
            Self::ShadowMap => 1,
        };
        MultisampleState {
            count,
            mask: !0,
            alpha_to_coverage_enabled: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoiseMeshPipelineKey {
    pub topology: DrawTopology,
    pub target: DrawTarget,
}

#[derive(Resource)]
pub struct NoiseMeshDrawPipeline {
    layout: BindGroupLayout,
    shader: Handle<Shader>,
}

impl FromWorld for NoiseMeshDrawPipeline {
    fn from_world(world: &mut World) -> Self {
        let render_device = world.resource::<RenderDevice>();

        let layout = render_device.create_bind_group_layout(
            "noise_mesh_draw_bind_group_layout",
            &[
                BindGroupLayoutEntry {
                    binding: 0,
                    visibility: ShaderStages::VERTEX,
                    ty: BindingType::Buffer {
                        ty: BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                BindGroupLayoutEntry {
                    binding: 1,
                    visibility: ShaderStages::VERTEX_FRAGMENT,
                    ty: BindingType::Buffer {
                        ty: BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        );

        let shader = world.load_asset(PROCEDURAL_DRAW_SHADER_PATH);
        Self { layout, shader }
    }
}

impl SpecializedRenderPipeline for NoiseMeshDrawPipeline {
    type Key = NoiseMeshPipelineKey;

    fn specialize(&self, key: Self::Key) -> RenderPipelineDescriptor {
        let fragment = key.target.colour_format().map(|format| FragmentState {
            shader: self.shader.clone(),
            shader_defs: vec![],
            entry_point: "fragment".into(),
            targets: vec![Some(ColorTargetState {
                format,
                blend: None,
                write_mask: ColorWrites::ALL,
            })],
        });

        RenderPipelineDescriptor {
            label: Some(
                format!("noise_mesh_draw_pipeline_{:?}_{:?}", key.topology, key.target).into(),
            ),
            layout: vec![self.layout.clone()],
            push_constant_ranges: vec![],
            vertex: VertexState {
                shader: self.shader.clone(),
                shader_defs: vec![],
                entry_point: "vertex".into(),
                buffers: vec![],
            },
            fragment,
            primitive: PrimitiveState {
                topology: primitive_topology(key.topology),
                cull_mode: None,
                ..default()
            },
            // Reverse-Z: nearer fragments have larger depth, shadow maps included.
            depth_stencil: Some(DepthStencilState {
                format: CORE_3D_DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: CompareFunction::GreaterEqual,
                stencil: StencilState::default(),
                bias: DepthBiasState::default(),
            }),
            multisample: key.target.multisample(),
            zero_initialize_workgroup_memory: false,
        }
    }
}

/// Pipelines specialized for one camera view.
#[derive(Component, Clone, Copy, Debug)]
pub struct NoiseMeshViewPipelines {
    pub view: CachedRenderPipelineId,
    pub shadow: CachedRenderPipelineId,
}

pub fn queue_noise_mesh_pipelines(
    mut commands: Commands,
    pipeline_cache: Res<PipelineCache>,
    draw_pipeline: Res<NoiseMeshDrawPipeline>,
    mut pipelines: ResMut<SpecializedRenderPipelines<NoiseMeshDrawPipeline>>,
    frame: Option<Res<NoiseMeshFrame>>,
    views: Query<(Entity, &ExtractedView, Option<&Msaa>), With<ViewTarget>>,
) {
    let Some(frame) = frame.filter(|frame| frame.active) else {
        return;
    };
    let topology = frame.settings.topology;
    for (entity, view, msaa) in &views {
        let view_key = NoiseMeshPipelineKey {
            topology,
            target: DrawTarget::view(view.hdr, msaa),
        };
        let shadow_key = NoiseMeshPipelineKey {
            topology,
            target: DrawTarget::ShadowMap,
        };
        commands.entity(entity).insert(NoiseMeshViewPipelines {
            view: pipelines.specialize(&pipeline_cache, &draw_pipeline, view_key),
            shadow: pipelines.specialize(&pipeline_cache, &draw_pipeline, shadow_key),
        });
    }
}

fn clip_from_world(view: &ExtractedView) -> Mat4 {
    view.clip_from_world
        .unwrap_or_else(|| view.clip_from_view * view.world_from_view.compute_matrix().inverse())
}

fn view_bind_group(
    render_device: &RenderDevice,
    layout: &BindGroupLayout,
    vertex_source: &Buffer,
    clip_from_world: Mat4,
    line_colour: [f32; 4],
) -> BindGroup {
    let uniform = DrawViewUniform {
        clip_from_world: clip_from_world.to_cols_array(),
        line_colour,
    };
    let view_buffer = render_device.create_buffer_with_data(&BufferInitDescriptor {
        label: Some("noise_mesh_draw_view"),
        contents: bytemuck::bytes_of(&uniform),
        usage: BufferUsages::UNIFORM,
    });
    render_device.create_bind_group(
        "noise_mesh_draw_bind_group",
        layout,
        &BindGroupEntries::sequential((
            vertex_source.as_entire_binding(),
            view_buffer.as_entire_binding(),
        )),
    )
}

#[derive(Default)]
pub struct NoiseMeshDrawNode;

impl ViewNode for NoiseMeshDrawNode {
    type ViewQuery = (
        &'static ExtractedView,
        &'static ViewTarget,
        &'static ViewDepthTexture,
        &'static NoiseMeshViewPipelines,
    );

    fn run(
        &self,
        _graph: &mut RenderGraphContext,
        render_context: &mut RenderContext,
        (view, target, depth, pipelines): QueryItem<Self::ViewQuery>,
        world: &World,
    ) -> Result<(), NodeRunError> {
        let Some(driver) = world.get_resource::<NoiseMeshDriver>() else {
            return Ok(());
        };
        let Some(draw) = driver.device().pending_draw() else {
            return Ok(());
        };

        let clip_from_world = clip_from_world(view);
        if !draw.request.bounds.is_visible(&clip_from_world) {
            return Ok(());
        }

        let pipeline_cache = world.resource::<PipelineCache>();
        let Some(pipeline) = pipeline_cache.get_render_pipeline(pipelines.view) else {
            return Ok(());
        };

        let draw_pipeline = world.resource::<NoiseMeshDrawPipeline>();
        let bind_group = view_bind_group(
            render_context.render_device(),
            &draw_pipeline.layout,
            &draw.vertex_source,
            clip_from_world,
            draw.request.line_colour,
        );

        let mut render_pass = render_context.begin_tracked_render_pass(RenderPassDescriptor {
            label: Some("noise_mesh_draw_pass"),
            color_attachments: &[Some(target.get_color_attachment())],
            depth_stencil_attachment: Some(RenderPassDepthStencilAttachment {
                view: depth.view(),
                depth_ops: Some(Operations {
                    load: LoadOp::Load,
                    store: StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        render_pass.set_render_pipeline(pipeline);
        render_pass.set_bind_group(0, &bind_group, &[]);
        render_pass.draw_indirect(&draw.args, 0);

        Ok(())
    }
}

/// Adds the generated primitives to the shadow maps of every light the view sees.
#[derive(Default)]
pub struct NoiseMeshShadowNode;

impl ViewNode for NoiseMeshShadowNode {
    type ViewQuery = (
        &'static ViewLightEntities,
        &'static NoiseMeshViewPipelines,
    );

    fn run(
        &self,
        _graph: &mut RenderGraphContext,
        render_context: &mut RenderContext,
        (lights, pipelines): QueryItem<Self::ViewQuery>,
        world: &World,
    ) -> Result<(), NodeRunError> {
        let Some(driver) = world.get_resource::<NoiseMeshDriver>() else {
            return Ok(());
        };
        let Some(draw) = driver.device().pending_draw() else {
            return Ok(());
        };
        if !draw.request.cast_shadows {
            return Ok(());
        }

        let pipeline_cache = world.resource::<PipelineCache>();
        let Some(pipeline) = pipeline_cache.get_render_pipeline(pipelines.shadow) else {
            return Ok(());
        };
        let draw_pipeline = world.resource::<NoiseMeshDrawPipeline>();

        for &light_view in &lights.lights {
            let (Some(shadow_view), Some(view)) = (
                world.get::<ShadowView>(light_view),
                world.get::<ExtractedView>(light_view),
            ) else {
                continue;
            };

            let clip_from_world = clip_from_world(view);
            if !draw.request.bounds.is_visible(&clip_from_world) {
                continue;
            }

            let bind_group = view_bind_group(
                render_context.render_device(),
                &draw_pipeline.layout,
                &draw.vertex_source,
                clip_from_world,
                draw.request.line_colour,
            );

            let mut render_pass = render_context.begin_tracked_render_pass(RenderPassDescriptor {
                label: Some("noise_mesh_shadow_pass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(
                    shadow_view.depth_attachment.get_attachment(StoreOp::Store),
                ),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_render_pipeline(pipeline);
            render_pass.set_bind_group(0, &bind_group, &[]);
            render_pass.draw_indirect(&draw.args, 0);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_uniform_matches_shader_layout() {
        assert_eq!(std::mem::size_of::<DrawViewUniform>(), 80);
    }

    #[test]
    fn topologies_map_to_list_primitives() {
        assert_eq!(primitive_topology(DrawTopology::Lines), PrimitiveTopology::LineList);
        assert_eq!(primitive_topology(DrawTopology::Points), PrimitiveTopology::PointList);
        assert_eq!(
            primitive_topology(DrawTopology::Triangles),
            PrimitiveTopology::TriangleList
        );
    }

    #[test]
    fn view_target_follows_camera_msaa() {
        assert_eq!(
            DrawTarget::view(true, Some(&Msaa::Sample4)),
            DrawTarget::View {
                hdr: true,
                msaa_samples: 4
            }
        );
        assert_eq!(
            DrawTarget::view(true, None),
            DrawTarget::View {
                hdr: true,
                msaa_samples: 1
            }
        );
    }

    #[test]
    fn multisampled_views_get_a_matching_sample_count() {
        let target = DrawTarget::View {
            hdr: false,
            msaa_samples: 4,
        };
        assert_eq!(target.multisample().count, 4);
        assert_eq!(target.colour_format(), Some(TextureFormat::bevy_default()));

        let hdr = DrawTarget::View {
            hdr: true,
            msaa_samples: 1,
        };
        assert_eq!(hdr.multisample().count, 1);
        assert_eq!(hdr.colour_format(), Some(ViewTarget::TEXTURE_FORMAT_HDR));
    }

    #[test]
    fn shadow_target_is_depth_only_and_single_sampled() {
        assert_eq!(DrawTarget::ShadowMap.colour_format(), None);
        assert_eq!(DrawTarget::ShadowMap.multisample().count, 1);
    }

    #[test]
    fn keys_differ_by_sample_count() {
        let key = |msaa_samples| NoiseMeshPipelineKey {
            topology: DrawTopology::Lines,
            target: DrawTarget::View {
                hdr: false,
                msaa_samples,
            },
        };
        assert_ne!(key(1), key(4));
        assert_eq!(key(4), key(4));
    }
}
