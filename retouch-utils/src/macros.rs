//! Macros for reducing wgpu render boilerplate across the retouch workspace.
//!
//! They cover bind group layout entries for fragment-stage resources, full
//! render pipeline creation, padded texture readback, and uniform structs.

/// Creates a filterable 2D float texture bind group layout entry visible to the fragment stage.
///
/// # Example
///
/// ```ignore
/// let entry = texture_entry!(0);
/// ```
#[macro_export]
macro_rules! texture_entry {
    ($binding:expr) => {
        wgpu::BindGroupLayoutEntry {
            binding: $binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        }
    };
}

/// Creates a filtering sampler bind group layout entry visible to the fragment stage.
#[macro_export]
macro_rules! sampler_entry {
    ($binding:expr) => {
        wgpu::BindGroupLayoutEntry {
            binding: $binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        }
    };
}

/// Creates a uniform buffer bind group layout entry visible to the fragment stage.
///
/// # Example
///
/// ```ignore
/// let entry = uniform_buffer_entry!(3);
/// ```
#[macro_export]
macro_rules! uniform_buffer_entry {
    ($binding:expr) => {
        wgpu::BindGroupLayoutEntry {
            binding: $binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }
    };
}

/// Creates a full-screen render pipeline with its bind group layout.
///
/// This macro encapsulates the repetitive pattern of:
/// 1. Creating a shader module from WGSL source
/// 2. Creating a bind group layout with specified entries
/// 3. Creating a pipeline layout
/// 4. Creating a render pipeline with `vs_main`/`fs_main` entry points and no vertex buffers
///
/// Returns a tuple: `(RenderPipeline, BindGroupLayout)`
///
/// Shader compilation errors surface through the device error scopes, so
/// callers that need to detect them should push a validation scope first.
///
/// # Example
///
/// ```ignore
/// use retouch_utils::{create_render_pipeline, sampler_entry, texture_entry};
///
/// let (pipeline, layout) = create_render_pipeline!(
///     device,
///     "composite",
///     source,
///     wgpu::TextureFormat::Rgba8Unorm,
///     [texture_entry!(0), sampler_entry!(1)]
/// );
/// ```
#[macro_export]
macro_rules! create_render_pipeline {
    ($device:expr, $label:literal, $shader_source:expr, $format:expr, [$($entry:expr),* $(,)?]) => {{
        let shader = $device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(concat!("retouch_", $label, "_shader")),
            source: wgpu::ShaderSource::Wgsl($shader_source.into()),
        });

        let bind_group_layout = $device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(concat!("retouch_", $label, "_bgl")),
            entries: &[$($entry),*],
        });

        let pipeline_layout = $device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(concat!("retouch_", $label, "_layout")),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = $device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(concat!("retouch_", $label, "_pipeline")),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: $format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        (pipeline, bind_group_layout)
    }};
}

/// Maps a readback buffer filled by `copy_texture_to_buffer` and strips row padding.
///
/// Returns `Result<Vec<u8>>` with `height` tightly packed rows of `unpadded_row` bytes.
///
/// # Example
///
/// ```ignore
/// use retouch_utils::gpu_readback_bytes;
///
/// let bytes = gpu_readback_bytes!(readback, device, unpadded_row, padded_row, height, "composite")?;
/// ```
#[macro_export]
macro_rules! gpu_readback_bytes {
    ($readback:expr, $device:expr, $unpadded_row:expr, $padded_row:expr, $height:expr, $operation:literal) => {{
        use std::sync::mpsc;

        let slice = $readback.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = sender.send(res);
        });

        $device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|err| anyhow::anyhow!("device poll failed during {}: {err}", $operation))?;

        receiver
            .recv()
            .map_err(|_| anyhow::anyhow!("GPU {} map callback dropped", $operation))?
            .map_err(|err| anyhow::anyhow!("GPU {} map error: {err}", $operation))?;

        let mapped = slice.get_mapped_range();
        let bytes = $crate::gpu::strip_row_padding(&mapped, $unpadded_row, $padded_row);
        drop(mapped);
        $readback.unmap();

        anyhow::ensure!(
            bytes.len() == $unpadded_row * $height,
            "unexpected GPU {} output size (expected {}, got {})",
            $operation,
            $unpadded_row * $height,
            bytes.len()
        );

        Ok::<Vec<u8>, anyhow::Error>(bytes)
    }};
}

/// Defines a GPU uniform struct with manual padding specification.
///
/// All GPU uniform structs must be aligned to 16 bytes. This macro generates:
/// - `#[repr(C)]` layout for WGSL compatibility
/// - `Pod` and `Zeroable` derives from bytemuck
/// - A `__padding` field with the specified number of u32 elements
///
/// **Note**: Calculate padding as: `(16 - (field_count * 4) % 16) / 4`
///
/// # Example
///
/// ```ignore
/// use retouch_utils::gpu_uniforms;
///
/// gpu_uniforms!(CompositeUniforms, 1, {
///     spatial_sigma: f32,
///     range_sigma: f32,
///     mask_threshold: f32,
/// });
/// ```
#[macro_export]
macro_rules! gpu_uniforms {
    ($name:ident, $padding:expr, { $($field:ident: $ty:ty),+ $(,)? }) => {
        #[repr(C)]
        #[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
        struct $name {
            $(pub $field: $ty,)+
            pub __padding: [u32; $padding],
        }
    };
}
