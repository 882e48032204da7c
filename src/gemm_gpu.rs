//! Device GEMM backend over wgpu compute shaders.
//!
//! Implements [`GemmBackend`] using double-single (DS) arithmetic: each
//! f64 travels as a (hi, lo) pair of f32 values, ~48 bits of mantissa.
//! This is a wgpu-specific workaround for the lack of portable f64
//! shader support; CUDA/ROCm-class devices would use f64 directly.
//!
//! Every `gemm_acc` call uploads the operands, dispatches one thread per
//! destination element, and reads the result back before returning, so
//! host scratch reuse after a call is always safe; [`GemmBackend::synchronize`]
//! additionally drains the device queue.

use std::cell::Cell;

use num_complex::Complex64;
use wgpu::util::DeviceExt;

use crate::error::{BandwagonError, Result};
use crate::gemm::GemmBackend;
use crate::gemm_shaders;
use crate::scalar::Scalar;

const WORKGROUP_DIM: u32 = 8;

fn workgroup_count(n: u32) -> u32 {
    n.div_ceil(WORKGROUP_DIM)
}

/// Split an f64 into a double-single (hi, lo) pair of f32 values.
pub fn f64_to_ds(v: f64) -> (f32, f32) {
    let hi = v as f32;
    let lo = (v - hi as f64) as f32;
    (hi, lo)
}

/// Recombine a double-single (hi, lo) pair back to f64.
pub fn ds_to_f64(hi: f32, lo: f32) -> f64 {
    hi as f64 + lo as f64
}

/// Uniform parameters for the GEMM shaders.
/// Layout matches the WGSL GemmParams struct in `gemm_shaders`; the WGSL
/// struct size rounds up to 48 bytes in the uniform address space, so the
/// trailing pad keeps the buffer large enough for the binding.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct GemmParams {
    m: u32,
    n: u32,
    k: u32,
    lda: u32,
    ldb: u32,
    ldc: u32,
    alpha_re_hi: f32,
    alpha_re_lo: f32,
    alpha_im_hi: f32,
    alpha_im_lo: f32,
    _pad: [u32; 2],
}

/// wgpu-based DS-precision GEMM backend.
pub struct GpuGemm {
    device: wgpu::Device,
    queue: wgpu::Queue,
    real_pipeline: wgpu::ComputePipeline,
    complex_pipeline: wgpu::ComputePipeline,
    dispatch_count: Cell<u32>,
}

impl GpuGemm {
    pub fn new() -> Result<Self> {
        pollster::block_on(Self::new_async())
    }

    async fn new_async() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| BandwagonError::Config("no GPU adapter found".into()))?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("bandwagon_gemm"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                ..Default::default()
            })
            .await
            .map_err(|e| BandwagonError::Config(format!("failed to get GPU device: {e}")))?;

        let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("bandwagon_gemm_shaders"),
            source: wgpu::ShaderSource::Wgsl(gemm_shaders::GEMM_SHADER_SOURCE.into()),
        });

        let make_pipeline = |entry_point: &str| -> wgpu::ComputePipeline {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(entry_point),
                layout: None,
                module: &shader_module,
                entry_point: Some(entry_point),
                compilation_options: Default::default(),
                cache: None,
            })
        };

        let real_pipeline = make_pipeline("gemm_real");
        let complex_pipeline = make_pipeline("gemm_complex");

        Ok(Self {
            device,
            queue,
            real_pipeline,
            complex_pipeline,
            dispatch_count: Cell::new(0),
        })
    }

    /// Total GPU dispatches since creation.
    pub fn dispatch_count(&self) -> u32 {
        self.dispatch_count.get()
    }

    fn upload_ds(&self, comps: &[f64], usage: wgpu::BufferUsages) -> (wgpu::Buffer, wgpu::Buffer) {
        let mut hi = Vec::with_capacity(comps.len());
        let mut lo = Vec::with_capacity(comps.len());
        for &v in comps {
            let (h, l) = f64_to_ds(v);
            hi.push(h);
            lo.push(l);
        }
        let hi_buf = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("gemm_ds_hi"),
                contents: bytemuck::cast_slice(&hi),
                usage,
            });
        let lo_buf = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("gemm_ds_lo"),
                contents: bytemuck::cast_slice(&lo),
                usage,
            });
        (hi_buf, lo_buf)
    }

    /// Shared dispatch path; operands are raw f64 component slices.
    fn run(
        &self,
        pipeline: &wgpu::ComputePipeline,
        params: GemmParams,
        a: &[f64],
        b: &[f64],
        c: &mut [f64],
    ) {
        let read = wgpu::BufferUsages::STORAGE;
        let (a_hi, a_lo) = self.upload_ds(a, read);
        let (b_hi, b_lo) = self.upload_ds(b, read);
        let (c_hi, c_lo) = self.upload_ds(c, read | wgpu::BufferUsages::COPY_SRC);

        let params_buf = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("gemm_params"),
                contents: bytemuck::bytes_of(&params),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let bg = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: None,
            layout: &pipeline.get_bind_group_layout(0),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: a_hi.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: a_lo.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: b_hi.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: b_lo.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: c_hi.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: c_lo.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: params_buf.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self.device.create_command_encoder(&Default::default());
        {
            let mut pass = encoder.begin_compute_pass(&Default::default());
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, Some(&bg), &[]);
            pass.dispatch_workgroups(workgroup_count(params.m), workgroup_count(params.n), 1);
        }
        self.queue.submit(Some(encoder.finish()));
        self.dispatch_count.set(self.dispatch_count.get() + 1);

        // Read the accumulated result back; the device work for this call
        // is complete once the mapped copy below resolves.
        let hi = self.read_buffer_f32(&c_hi, c.len());
        let lo = self.read_buffer_f32(&c_lo, c.len());
        for (out, (h, l)) in c.iter_mut().zip(hi.iter().zip(lo.iter())) {
            *out = ds_to_f64(*h, *l);
        }
    }

    /// Read a GPU buffer back to the CPU as f32 values.
    fn read_buffer_f32(&self, src: &wgpu::Buffer, count: usize) -> Vec<f32> {
        let size = (count * std::mem::size_of::<f32>()) as u64;
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("gemm_read_staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self.device.create_command_encoder(&Default::default());
        encoder.copy_buffer_to_buffer(src, 0, &staging, 0, size);
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |r| {
            sender.send(r).unwrap();
        });
        let _ = self.device.poll(wgpu::PollType::Wait);
        receiver.recv().unwrap().unwrap();

        let data = slice.get_mapped_range();
        let result: Vec<f32> = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        staging.unmap();
        result
    }
}

impl GemmBackend<f64> for GpuGemm {
    fn gemm_acc(
        &self,
        m: usize,
        n: usize,
        k: usize,
        alpha: f64,
        a: &[f64],
        lda: usize,
        b: &[f64],
        ldb: usize,
        c: &mut [f64],
        ldc: usize,
    ) {
        if m == 0 || n == 0 || k == 0 {
            return;
        }
        let (alpha_hi, alpha_lo) = f64_to_ds(alpha);
        let params = GemmParams {
            m: m as u32,
            n: n as u32,
            k: k as u32,
            lda: lda as u32,
            ldb: ldb as u32,
            ldc: ldc as u32,
            alpha_re_hi: alpha_hi,
            alpha_re_lo: alpha_lo,
            alpha_im_hi: 0.0,
            alpha_im_lo: 0.0,
            _pad: [0; 2],
        };
        self.run(&self.real_pipeline, params, a, b, c);
    }

    fn synchronize(&self) {
        let _ = self.device.poll(wgpu::PollType::Wait);
    }
}

impl GemmBackend<Complex64> for GpuGemm {
    fn gemm_acc(
        &self,
        m: usize,
        n: usize,
        k: usize,
        alpha: Complex64,
        a: &[Complex64],
        lda: usize,
        b: &[Complex64],
        ldb: usize,
        c: &mut [Complex64],
        ldc: usize,
    ) {
        if m == 0 || n == 0 || k == 0 {
            return;
        }
        let (re_hi, re_lo) = f64_to_ds(alpha.re);
        let (im_hi, im_lo) = f64_to_ds(alpha.im);
        let params = GemmParams {
            m: m as u32,
            n: n as u32,
            k: k as u32,
            lda: lda as u32,
            ldb: ldb as u32,
            ldc: ldc as u32,
            alpha_re_hi: re_hi,
            alpha_re_lo: re_lo,
            alpha_im_hi: im_hi,
            alpha_im_lo: im_lo,
            _pad: [0; 2],
        };
        self.run(
            &self.complex_pipeline,
            params,
            Complex64::components(a),
            Complex64::components(b),
            Complex64::components_mut(c),
        );
    }

    fn synchronize(&self) {
        let _ = self.device.poll(wgpu::PollType::Wait);
    }
}
