//! Device-resident copies of the source image and skin mask.

use log::{Level, debug};
use pollster::block_on;
use retouch_utils::{gpu::GPU_TARGET, telemetry::timing_guard};

use crate::{error::PipelineError, mask::SkinMask, source::SourceImage};

/// Source (`Rgba8Unorm`) and mask (`R8Unorm`) textures for one session.
///
/// Textures are recreated for every new image/mask pair, never updated in
/// place. [`SessionTextures::release`] destroys them eagerly; dropping the
/// value frees them as well.
#[derive(Debug)]
pub struct SessionTextures {
    source: wgpu::Texture,
    source_view: wgpu::TextureView,
    mask: wgpu::Texture,
    mask_view: wgpu::TextureView,
    size: (u32, u32),
}

impl SessionTextures {
    /// Upload `image` and `mask`, which must share dimensions.
    pub fn upload(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        limits: &wgpu::Limits,
        image: &SourceImage,
        mask: &SkinMask,
    ) -> Result<Self, PipelineError> {
        let (width, height) = image.dimensions();
        if mask.dimensions() != (width, height) {
            return Err(PipelineError::Resource(format!(
                "mask {:?} does not match image {:?}",
                mask.dimensions(),
                (width, height)
            )));
        }
        let max_dim = limits.max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max_dim || height > max_dim {
            return Err(PipelineError::Resource(format!(
                "image {width}x{height} exceeds the device texture limit of {max_dim}"
            )));
        }

        let _guard = timing_guard(
            format!("retouch_core::upload {}x{}", width, height),
            Level::Debug,
        );

        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let extent = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let source = create_texture(
            device,
            "retouch_source_texture",
            extent,
            wgpu::TextureFormat::Rgba8Unorm,
        );
        write_texture(queue, &source, image.pixels().as_raw(), 4 * width, extent);
        let mask_texture = create_texture(
            device,
            "retouch_mask_texture",
            extent,
            wgpu::TextureFormat::R8Unorm,
        );
        write_texture(queue, &mask_texture, mask.as_gray().as_raw(), width, extent);

        let validation = block_on(device.pop_error_scope());
        let oom = block_on(device.pop_error_scope());
        if let Some(err) = validation.or(oom) {
            source.destroy();
            mask_texture.destroy();
            return Err(PipelineError::Resource(format!(
                "texture upload failed: {err}"
            )));
        }

        debug!(target: GPU_TARGET, "Uploaded {}x{} source and mask textures", width, height);

        let source_view = source.create_view(&wgpu::TextureViewDescriptor::default());
        let mask_view = mask_texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(Self {
            source,
            source_view,
            mask: mask_texture,
            mask_view,
            size: (width, height),
        })
    }

    pub fn source_view(&self) -> &wgpu::TextureView {
        &self.source_view
    }

    pub fn mask_view(&self) -> &wgpu::TextureView {
        &self.mask_view
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Destroy both textures immediately.
    pub fn release(self) {
        self.source.destroy();
        self.mask.destroy();
        debug!(target: GPU_TARGET, "Released {:?} session textures", self.size);
    }
}

fn create_texture(
    device: &wgpu::Device,
    label: &str,
    extent: wgpu::Extent3d,
    format: wgpu::TextureFormat,
) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: extent,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    })
}

fn write_texture(
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    data: &[u8],
    bytes_per_row: u32,
    extent: wgpu::Extent3d,
) {
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        data,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(bytes_per_row),
            rows_per_image: Some(extent.height),
        },
        extent,
    );
}

/// Bilinear, clamp-to-edge sampler shared by both textures.
pub fn linear_clamp_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("retouch_linear_clamp_sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}
