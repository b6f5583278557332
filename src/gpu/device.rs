// gpu/device.rs — wgpu device abstraction.
//
// Responsibilities:
//   - Enumerate adapters and select a hardware GPU, falling back to
//     whatever exists (software renderers included) as a last resort.
//   - Expose a `DeviceProfile` for simulating hardware limits on a
//     development machine (e.g., cap invocations to match Raspberry Pi).
//   - Provide `WorkgroupSize`, validated against the active profile and
//     baked into every flow-stage shader at pipeline creation.
//
// DEVICE LIMITS:
// Under a non-Native profile we request *lower* limits than the hardware
// supports. wgpu validates every dispatch against the requested limits, so
// violations that would fail on the target are caught on the laptop.
//
// WORKGROUP SIZES:
// naga does not accept `override` expressions inside @workgroup_size(), so
// the flow shaders carry {{WG_X}} / {{WG_Y}} placeholder tokens that are
// replaced before compilation (see gpu/kernel.rs).

use std::fmt;

/// Hardware profile controlling device limits and default workgroup sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceProfile {
    /// Use the adapter's default limits. No artificial caps.
    Native,
    /// Simulate Raspberry Pi 4/5 (VideoCore VI/VII, V3DV Vulkan):
    /// 256 invocations per workgroup, 4096² textures, 128 MiB storage bindings.
    RaspberryPi,
}

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceProfile::Native => write!(f, "Native"),
            DeviceProfile::RaspberryPi => write!(f, "RaspberryPi (simulated limits)"),
        }
    }
}

/// A workgroup size configuration for 2D per-pixel dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkgroupSize {
    pub x: u32,
    pub y: u32,
}

impl WorkgroupSize {
    /// Total invocations per workgroup (x * y).
    pub fn total(&self) -> u32 {
        self.x * self.y
    }

    /// Default workgroup size for a profile.
    ///
    /// - `Native`: 16×8 = 128 invocations, four 32-wide warps or two
    ///   64-wide wavefronts; 16 columns keep row-major loads contiguous.
    /// - `RaspberryPi`: 8×8 = 64, well inside the 256 invocation limit.
    fn for_profile(profile: DeviceProfile) -> Self {
        match profile {
            DeviceProfile::Native => WorkgroupSize { x: 16, y: 8 },
            DeviceProfile::RaspberryPi => WorkgroupSize { x: 8, y: 8 },
        }
    }
}

impl fmt::Display for WorkgroupSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}×{} ({} invocations)", self.x, self.y, self.total())
    }
}

/// Cached adapter information for logging.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub name: String,
    pub device_type: wgpu::DeviceType,
    pub backend: wgpu::Backend,
}

impl fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}, {:?})", self.name, self.backend, self.device_type)
    }
}

/// The GPU context: device, queue, and active profile.
///
/// Create one per application and pass it by reference to every GPU stage
/// call. Creation is expensive (instance + device initialization).
///
/// Fields drop in declaration order; `_instance` is last so the instance
/// outlives the device and queue.
pub struct GpuDevice {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub profile: DeviceProfile,
    pub adapter_info: AdapterInfo,
    /// Set through [`GpuDevice::set_workgroup_size`] only.
    pub(crate) workgroup_size: WorkgroupSize,
    _instance: wgpu::Instance,
}

impl GpuDevice {
    /// Create a `GpuDevice` on the best available adapter with
    /// `DeviceProfile::Native` limits.
    pub fn new() -> Result<Self, GpuError> {
        Self::new_with_profile(DeviceProfile::Native)
    }

    /// Create a `GpuDevice` with an explicit hardware profile.
    pub fn new_with_profile(profile: DeviceProfile) -> Result<Self, GpuError> {
        pollster::block_on(Self::init_async(profile))
    }

    async fn init_async(profile: DeviceProfile) -> Result<Self, GpuError> {
        let flags = if cfg!(debug_assertions) {
            wgpu::InstanceFlags::VALIDATION
                | wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
        } else {
            wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
        };

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            flags,
            ..Default::default()
        });

        let adapters = instance.enumerate_adapters(wgpu::Backends::PRIMARY);
        for a in &adapters {
            let info = a.get_info();
            log::info!(
                "adapter: {} ({:?}, {:?})",
                info.name, info.backend, info.device_type
            );
        }

        // Tier 1: anything that is not a CPU rasterizer.
        // Tier 2: whatever exists.
        let hardware = adapters
            .iter()
            .position(|a| a.get_info().device_type != wgpu::DeviceType::Cpu);
        let adapter = match hardware {
            Some(i) => adapters.into_iter().nth(i),
            None => adapters.into_iter().next(),
        }
        .ok_or(GpuError::NoSuitableAdapter)?;

        let raw_info = adapter.get_info();
        let adapter_info = AdapterInfo {
            name: raw_info.name.clone(),
            device_type: raw_info.device_type,
            backend: raw_info.backend,
        };
        if raw_info.device_type == wgpu::DeviceType::Cpu {
            log::warn!("no hardware adapter found; using software renderer {adapter_info}");
        }

        // A V3D adapter under Native gets the RaspberryPi profile automatically.
        let profile = match profile {
            DeviceProfile::Native if raw_info.name.to_ascii_lowercase().contains("v3d") => {
                log::info!("V3D adapter detected, using RaspberryPi profile");
                DeviceProfile::RaspberryPi
            }
            other => other,
        };

        let (device, queue): (wgpu::Device, wgpu::Queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("flowfilter"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits_for_profile(profile),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;

        let workgroup_size = WorkgroupSize::for_profile(profile);
        log::info!("GPU device ready: {adapter_info}, profile {profile}, workgroup {workgroup_size}");

        Ok(GpuDevice {
            device,
            queue,
            profile,
            adapter_info,
            workgroup_size,
            _instance: instance,
        })
    }

    /// Override the default workgroup size, validating against the active
    /// profile. Takes effect for stages created afterwards.
    pub fn set_workgroup_size(&mut self, x: u32, y: u32) -> Result<(), GpuError> {
        self.workgroup_size = check_workgroup_size(&limits_for_profile(self.profile), x, y)?;
        Ok(())
    }

    pub fn workgroup_size(&self) -> WorkgroupSize {
        self.workgroup_size
    }

    /// Number of workgroups needed to cover a `width` × `height` image.
    ///
    /// Uses ceiling division; the shaders guard out-of-bounds invocations
    /// with `if gid.x >= width || gid.y >= height { return; }`.
    pub fn dispatch_size(&self, width: u32, height: u32) -> (u32, u32) {
        dispatch_size(self.workgroup_size, width, height)
    }

    /// Block until all submitted work has finished.
    pub fn wait_idle(&self) {
        self.device.poll(wgpu::Maintain::Wait);
    }
}

impl fmt::Display for GpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GpuDevice {{ adapter: {}, profile: {}, workgroup: {} }}",
            self.adapter_info, self.profile, self.workgroup_size
        )
    }
}

fn dispatch_size(wg: WorkgroupSize, width: u32, height: u32) -> (u32, u32) {
    (width.div_ceil(wg.x), height.div_ceil(wg.y))
}

// ============================================================
// Limits helpers
// ============================================================

fn limits_for_profile(profile: DeviceProfile) -> wgpu::Limits {
    match profile {
        DeviceProfile::Native => wgpu::Limits::default(),
        DeviceProfile::RaspberryPi => wgpu::Limits {
            max_compute_invocations_per_workgroup: 256,
            max_compute_workgroup_size_x: 256,
            max_compute_workgroup_size_y: 256,
            max_compute_workgroup_size_z: 64,
            max_texture_dimension_2d: 4096,
            max_storage_buffer_binding_size: 128 << 20,
            ..wgpu::Limits::default()
        },
    }
}

/// Both axes non-zero and within the per-axis limits, and the invocation
/// count within the per-workgroup limit.
fn check_workgroup_size(limits: &wgpu::Limits, x: u32, y: u32) -> Result<WorkgroupSize, GpuError> {
    if x == 0 || y == 0 {
        return Err(GpuError::WorkgroupEmpty { x, y });
    }
    let (max_x, max_y) = (limits.max_compute_workgroup_size_x, limits.max_compute_workgroup_size_y);
    if x > max_x || y > max_y {
        return Err(GpuError::WorkgroupAxisTooLarge { x, y, max_x, max_y });
    }
    let max = limits.max_compute_invocations_per_workgroup;
    match x.checked_mul(y) {
        Some(total) if total <= max => Ok(WorkgroupSize { x, y }),
        total => Err(GpuError::WorkgroupTooLarge {
            total: total.map_or(u64::from(x) * u64::from(y), u64::from),
            max,
        }),
    }
}

// ============================================================
// Error type
// ============================================================

/// Errors from GPU device initialization, configuration and transfers.
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("no GPU adapter found")]
    NoSuitableAdapter,

    #[error("device request failed: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    #[error("workgroup size {x}×{y} has a zero axis")]
    WorkgroupEmpty { x: u32, y: u32 },

    #[error("workgroup size {x}×{y} exceeds per-axis limits {max_x}×{max_y}")]
    WorkgroupAxisTooLarge { x: u32, y: u32, max_x: u32, max_y: u32 },

    #[error("workgroup size {total} exceeds profile limit of {max} invocations")]
    WorkgroupTooLarge { total: u64, max: u32 },

    #[error("buffer map failed: {0}")]
    BufferMap(#[from] wgpu::BufferAsyncError),

    #[error("buffer map callback was dropped before completing")]
    MapCallbackDropped,
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::run_gpu_test_in_subprocess;

    #[test]
    fn test_workgroup_size_for_native() {
        let ws = WorkgroupSize::for_profile(DeviceProfile::Native);
        assert_eq!((ws.x, ws.y), (16, 8));
        assert_eq!(ws.total(), 128);
    }

    #[test]
    fn test_workgroup_size_for_rpi() {
        let ws = WorkgroupSize::for_profile(DeviceProfile::RaspberryPi);
        assert_eq!((ws.x, ws.y), (8, 8));
        let limits = limits_for_profile(DeviceProfile::RaspberryPi);
        assert!(ws.total() <= limits.max_compute_invocations_per_workgroup);
    }

    #[test]
    fn test_dispatch_size_exact() {
        let ws = WorkgroupSize::for_profile(DeviceProfile::Native);
        assert_eq!(dispatch_size(ws, 640, 480), (40, 60));
    }

    #[test]
    fn test_dispatch_size_ceiling() {
        let ws = WorkgroupSize::for_profile(DeviceProfile::RaspberryPi);
        assert_eq!(dispatch_size(ws, 752, 480), (94, 60));
        // 100 / 8 = 12.5 → 13 workgroups; the last covers 96–103.
        assert_eq!(dispatch_size(ws, 100, 100), (13, 13));
        assert_eq!(dispatch_size(ws, 4, 4), (1, 1));
    }

    #[test]
    fn test_check_workgroup_size_accepts_profile_defaults() {
        for profile in [DeviceProfile::Native, DeviceProfile::RaspberryPi] {
            let ws = WorkgroupSize::for_profile(profile);
            let checked = check_workgroup_size(&limits_for_profile(profile), ws.x, ws.y).unwrap();
            assert_eq!(checked, ws);
        }
    }

    #[test]
    fn test_check_workgroup_size_rejects_zero_axis() {
        let limits = limits_for_profile(DeviceProfile::Native);
        for (x, y) in [(0, 8), (8, 0), (0, 0)] {
            let err = check_workgroup_size(&limits, x, y).unwrap_err();
            assert!(matches!(err, GpuError::WorkgroupEmpty { .. }), "{x}×{y}: {err}");
        }
    }

    #[test]
    fn test_check_workgroup_size_rejects_large_axis() {
        let limits = limits_for_profile(DeviceProfile::RaspberryPi);
        let err = check_workgroup_size(&limits, 512, 1).unwrap_err();
        assert!(matches!(err, GpuError::WorkgroupAxisTooLarge { x: 512, max_x: 256, .. }));
        let err = check_workgroup_size(&limits, 1, u32::MAX).unwrap_err();
        assert!(matches!(err, GpuError::WorkgroupAxisTooLarge { .. }));
    }

    #[test]
    fn test_check_workgroup_size_total_does_not_overflow() {
        let limits = wgpu::Limits {
            max_compute_workgroup_size_x: u32::MAX,
            max_compute_workgroup_size_y: u32::MAX,
            ..limits_for_profile(DeviceProfile::RaspberryPi)
        };
        let err = check_workgroup_size(&limits, 1 << 16, 1 << 16).unwrap_err();
        assert!(matches!(err, GpuError::WorkgroupTooLarge { total, max: 256 } if total == 1 << 32));

        let err = check_workgroup_size(&limits, 16, 17).unwrap_err();
        assert!(matches!(err, GpuError::WorkgroupTooLarge { total: 272, max: 256 }));
    }

    #[test]
    fn test_rpi_limits_cap_invocations() {
        let limits = limits_for_profile(DeviceProfile::RaspberryPi);
        assert_eq!(limits.max_compute_invocations_per_workgroup, 256);
        assert_eq!(limits.max_storage_buffer_binding_size, 128 << 20);
    }

    #[test]
    fn test_native_limits_are_default() {
        assert_eq!(limits_for_profile(DeviceProfile::Native), wgpu::Limits::default());
    }

    // ---- GPU integration tests (subprocess-isolated) ----------------------

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_gpu_device_init_native() {
        let gpu = GpuDevice::new().expect("should initialise a GPU device");
        println!("{gpu}");
        println!("GPU_TEST_OK");
    }

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_set_workgroup_size_too_large() {
        let mut gpu = GpuDevice::new_with_profile(DeviceProfile::RaspberryPi).unwrap();
        gpu.set_workgroup_size(16, 16).expect("256 fits the RPi profile");
        let err = gpu.set_workgroup_size(16, 17).unwrap_err();
        assert!(matches!(err, GpuError::WorkgroupTooLarge { total: 272, max: 256 }));
        assert!(gpu.set_workgroup_size(0, 8).is_err());
        assert_eq!(gpu.workgroup_size(), WorkgroupSize { x: 16, y: 16 });
        assert_eq!(gpu.dispatch_size(33, 17), (3, 2));
        println!("GPU_TEST_OK");
    }

    #[test]
    #[ignore = "requires a real GPU"]
    fn test_gpu_device_init_native() {
        let out = run_gpu_test_in_subprocess("gpu::device::tests::inner_gpu_device_init_native");
        assert!(out.contains("GPU_TEST_OK"), "inner test failed:\n{out}");
    }

    #[test]
    #[ignore = "requires a real GPU"]
    fn test_set_workgroup_size_too_large() {
        let out = run_gpu_test_in_subprocess("gpu::device::tests::inner_set_workgroup_size_too_large");
        assert!(out.contains("GPU_TEST_OK"), "inner test failed:\n{out}");
    }
}
