//! GPU context management helpers built on top of `wgpu`.
//!
//! Device/queue plumbing lives here so the compositor and the CLI share one
//! initialization path, with a CPU fallback when no compatible adapter exists.

use std::sync::Arc;

use log::{debug, info, warn};
use pollster::block_on;
use thiserror::Error;
use wgpu::{
    Adapter, AdapterInfo, Backends, Device, DeviceDescriptor, ExperimentalFeatures, Features,
    Instance, InstanceDescriptor, InstanceFlags, Limits, MemoryHints, PowerPreference, Queue,
    RequestAdapterError, RequestAdapterOptions, RequestDeviceError, Trace,
};

/// Log target used by GPU plumbing.
pub const GPU_TARGET: &str = "retouch::gpu";

const DISABLED_REASON: &str = "GPU compositing disabled in settings";

/// How the compositor's device should be acquired.
#[derive(Clone, Debug)]
pub struct GpuContextOptions {
    /// `false` skips adapter discovery entirely.
    pub enabled: bool,
    /// Let `WGPU_BACKEND` and friends override `backends` and `flags`.
    pub respect_env: bool,
    pub backends: Backends,
    pub flags: InstanceFlags,
    pub power_preference: PowerPreference,
    /// Ask for wgpu's software adapter (useful on headless CI).
    pub force_fallback_adapter: bool,
    /// Device label shown in validation messages.
    pub label: Option<String>,
}

impl Default for GpuContextOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            respect_env: true,
            backends: Backends::PRIMARY,
            flags: InstanceFlags::from_build_config(),
            power_preference: PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            label: Some("retouch compositor".to_string()),
        }
    }
}

impl GpuContextOptions {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    fn instance_descriptor(&self) -> InstanceDescriptor {
        if !self.respect_env {
            return InstanceDescriptor {
                backends: self.backends,
                flags: self.flags,
                ..InstanceDescriptor::default()
            };
        }
        InstanceDescriptor {
            backends: self.backends.with_env(),
            flags: self.flags.with_env(),
            ..InstanceDescriptor::from_env_or_default()
        }
    }
}

/// Outcome of GPU discovery; anything but `Available` means composite on the CPU.
#[derive(Debug)]
pub enum GpuAvailability {
    Available(Arc<GpuContext>),
    Disabled { reason: String },
    Unavailable { error: GpuInitError },
}

/// Device and queue owned by one compositor session.
#[derive(Debug)]
pub struct GpuContext {
    _instance: Instance,
    _adapter: Adapter,
    device: Device,
    queue: Queue,
    info: AdapterInfo,
    limits: Limits,
}

impl GpuContext {
    pub fn initialize(options: &GpuContextOptions) -> Result<Self, GpuInitError> {
        if !options.enabled {
            return Err(GpuInitError::Disabled);
        }

        let instance_desc = options.instance_descriptor();
        let backends = instance_desc.backends;
        let instance = Instance::new(&instance_desc);
        let adapter = block_on(instance.request_adapter(&RequestAdapterOptions {
            power_preference: options.power_preference,
            force_fallback_adapter: options.force_fallback_adapter,
            compatible_surface: None,
        }))
        .map_err(|source| GpuInitError::Adapter { backends, source })?;

        let info = adapter.get_info();
        // Large portraits need the adapter's full texture size, not the downlevel default.
        let limits = adapter.limits();
        let (device, queue) = block_on(adapter.request_device(&DeviceDescriptor {
            label: options.label.as_deref(),
            required_features: Features::empty(),
            required_limits: limits.clone(),
            experimental_features: ExperimentalFeatures::default(),
            memory_hints: MemoryHints::default(),
            trace: Trace::default(),
        }))?;

        info!(
            target: GPU_TARGET,
            "Acquired '{}' ({:?}, {:?}); textures up to {}px",
            info.name, info.backend, info.device_type, limits.max_texture_dimension_2d
        );

        Ok(Self {
            _instance: instance,
            _adapter: adapter,
            device,
            queue,
            info,
            limits,
        })
    }

    /// Like [`initialize`](Self::initialize) but never fails; callers switch to the CPU path instead.
    pub fn init_with_fallback(options: &GpuContextOptions) -> GpuAvailability {
        match Self::initialize(options) {
            Ok(ctx) => GpuAvailability::Available(Arc::new(ctx)),
            Err(GpuInitError::Disabled) => {
                debug!(target: GPU_TARGET, "{DISABLED_REASON}");
                GpuAvailability::Disabled {
                    reason: DISABLED_REASON.to_string(),
                }
            }
            Err(error) => {
                warn!(target: GPU_TARGET, "No usable GPU: {error}");
                GpuAvailability::Unavailable { error }
            }
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn adapter_info(&self) -> &AdapterInfo {
        &self.info
    }

    /// Limits the device was created with.
    pub fn limits(&self) -> &Limits {
        &self.limits
    }
}

#[derive(Debug, Error)]
pub enum GpuInitError {
    #[error("no adapter for {backends:?}: {source}")]
    Adapter {
        backends: Backends,
        #[source]
        source: RequestAdapterError,
    },
    #[error("device request rejected: {0}")]
    Device(#[from] RequestDeviceError),
    #[error("GPU disabled")]
    Disabled,
}

/// Number of bytes in one row once padded to wgpu's copy alignment.
pub fn padded_bytes_per_row(width: u32, bytes_per_pixel: u32) -> u32 {
    let unpadded = width * bytes_per_pixel;
    unpadded.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT
}

/// Drop the per-row padding added for texture-to-buffer copies.
pub fn strip_row_padding(padded: &[u8], unpadded_row: usize, padded_row: usize) -> Vec<u8> {
    if unpadded_row == padded_row {
        return padded.to_vec();
    }
    padded
        .chunks_exact(padded_row)
        .flat_map(|row| &row[..unpadded_row])
        .copied()
        .collect()
}
