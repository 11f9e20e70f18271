use std::{borrow::Cow, sync::Arc};

use image::RgbaImage;
use log::{Level, debug, error};
use pollster::block_on;
use retouch_utils::{
    GpuContext, create_render_pipeline,
    gpu::{GPU_TARGET, padded_bytes_per_row},
    gpu_readback_bytes, gpu_uniforms, sampler_entry, telemetry::timing_guard, texture_entry,
    uniform_buffer_entry,
};

use super::{COMPOSITE_WGSL, CompositorBackend, KernelSettings, OutputSize, check_output};
use crate::{
    error::PipelineError,
    mask::SkinMask,
    params::DerivedFilterParameters,
    source::SourceImage,
    textures::{SessionTextures, linear_clamp_sampler},
};

const OUTPUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

gpu_uniforms!(CompositeUniforms, 2, {
    texel_size: [f32; 2],
    spatial_sigma: f32,
    range_sigma: f32,
    mask_threshold: f32,
    radius: u32,
});

struct CompositePipeline {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    uniforms: wgpu::Buffer,
}

/// Compositor running the WGSL program through a render pass.
///
/// The program is compiled lazily by [`CompositorBackend::prepare`] inside a
/// validation error scope, so a broken shader becomes
/// [`PipelineError::ShaderCompile`] rather than a device panic.
pub struct GpuCompositor {
    context: Arc<GpuContext>,
    shader_source: Cow<'static, str>,
    kernel: KernelSettings,
    pipeline: Option<CompositePipeline>,
    textures: Option<SessionTextures>,
}

impl std::fmt::Debug for GpuCompositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuCompositor")
            .field("adapter", &self.context.adapter_info().name)
            .field("prepared", &self.pipeline.is_some())
            .field("textures", &self.textures.as_ref().map(SessionTextures::size))
            .finish()
    }
}

impl GpuCompositor {
    pub fn new(context: Arc<GpuContext>) -> Self {
        Self::with_shader_source(context, COMPOSITE_WGSL)
    }

    /// Use a custom WGSL program exposing `vs_main`/`fs_main` and the same bindings.
    pub fn with_shader_source(
        context: Arc<GpuContext>,
        source: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            context,
            shader_source: source.into(),
            kernel: KernelSettings::default(),
            pipeline: None,
            textures: None,
        }
    }

    fn compile(&self) -> Result<CompositePipeline, PipelineError> {
        let device = self.context.device();
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let (pipeline, bind_group_layout) = create_render_pipeline!(
            device,
            "composite",
            &*self.shader_source,
            OUTPUT_FORMAT,
            [
                texture_entry!(0),
                texture_entry!(1),
                sampler_entry!(2),
                uniform_buffer_entry!(3),
            ]
        );
        if let Some(err) = block_on(device.pop_error_scope()) {
            error!(target: GPU_TARGET, "Composite shader failed to compile: {err}");
            return Err(PipelineError::ShaderCompile(err.to_string()));
        }

        let uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("retouch_composite_uniforms"),
            size: std::mem::size_of::<CompositeUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        debug!(
            target: GPU_TARGET,
            "Compiled composite pipeline on '{}'",
            self.context.adapter_info().name
        );
        Ok(CompositePipeline {
            pipeline,
            bind_group_layout,
            sampler: linear_clamp_sampler(device),
            uniforms,
        })
    }

    fn draw(
        &self,
        pipeline: &CompositePipeline,
        textures: &SessionTextures,
        params: DerivedFilterParameters,
        output: OutputSize,
    ) -> anyhow::Result<RgbaImage> {
        let device = self.context.device();
        let queue = self.context.queue();
        let (src_w, src_h) = textures.size();

        let uniforms = CompositeUniforms {
            texel_size: [1.0 / src_w as f32, 1.0 / src_h as f32],
            spatial_sigma: params.spatial_sigma,
            range_sigma: params.range_sigma,
            mask_threshold: self.kernel.mask_threshold,
            radius: self.kernel.radius,
            __padding: [0; 2],
        };
        queue.write_buffer(&pipeline.uniforms, 0, bytemuck::bytes_of(&uniforms));

        let extent = wgpu::Extent3d {
            width: output.width,
            height: output.height,
            depth_or_array_layers: 1,
        };
        let target = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("retouch_composite_target"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OUTPUT_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let target_view = target.create_view(&wgpu::TextureViewDescriptor::default());

        let unpadded_row = output.width * 4;
        let padded_row = padded_bytes_per_row(output.width, 4);
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("retouch_composite_readback"),
            size: u64::from(padded_row) * u64::from(output.height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("retouch_composite_bind_group"),
            layout: &pipeline.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(textures.source_view()),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(textures.mask_view()),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&pipeline.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: pipeline.uniforms.as_entire_binding(),
                },
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("retouch_composite_encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("retouch_composite_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&pipeline.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &target,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(output.height),
                },
            },
            extent,
        );
        queue.submit(Some(encoder.finish()));

        let bytes = gpu_readback_bytes!(
            readback,
            device,
            unpadded_row as usize,
            padded_row as usize,
            output.height as usize,
            "composite"
        )?;
        target.destroy();

        RgbaImage::from_raw(output.width, output.height, bytes)
            .ok_or_else(|| anyhow::anyhow!("composite readback has the wrong length"))
    }
}

impl CompositorBackend for GpuCompositor {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn prepare(&mut self, kernel: KernelSettings) -> Result<(), PipelineError> {
        self.kernel = kernel;
        if self.pipeline.is_none() {
            self.pipeline = Some(self.compile()?);
        }
        Ok(())
    }

    fn upload(&mut self, image: &SourceImage, mask: &SkinMask) -> Result<(), PipelineError> {
        self.release();
        let textures = SessionTextures::upload(
            self.context.device(),
            self.context.queue(),
            self.context.limits(),
            image,
            mask,
        )?;
        self.textures = Some(textures);
        Ok(())
    }

    fn render(
        &mut self,
        params: DerivedFilterParameters,
        output: OutputSize,
    ) -> Result<RgbaImage, PipelineError> {
        check_output(&*self, output)?;
        let pipeline = self
            .pipeline
            .as_ref()
            .ok_or_else(|| PipelineError::Resource("composite pipeline not prepared".into()))?;
        let textures = self
            .textures
            .as_ref()
            .ok_or_else(|| PipelineError::Resource("no textures uploaded".into()))?;

        let _guard = timing_guard(
            format!("retouch_core::gpu_composite {}x{}", output.width, output.height),
            Level::Debug,
        );
        self.draw(pipeline, textures, params, output)
            .map_err(|err| PipelineError::Resource(format!("{err:#}")))
    }

    fn max_output_dimension(&self) -> Option<u32> {
        Some(self.context.limits().max_texture_dimension_2d)
    }

    fn release(&mut self) {
        if let Some(textures) = self.textures.take() {
            textures.release();
        }
    }
}
