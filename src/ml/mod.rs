// ============================================================
// Layer 6 — ML / Model Layer (Burn)
// ============================================================
// All Burn framework code lives here. The rest of the crate
// only sees the capability traits from domain::traits, so the
// orchestrator, search and replacement code stay testable
// without a GPU.
//
//   model.rs    — RNNsearch encoder-decoder with attention
//   params.rs   — named access to every tensor (export, import,
//                 freeze for fine-tuning)
//   decoder.rs  — incremental decoding (DecodingModel)
//   engine.rs   — model + optimiser (TrainableModel)
//
// Backends: training runs on Autodiff<Wgpu>; decoding uses the
// inner Wgpu backend.
//
// Reference: Burn Book §3 (Building Blocks), §5 (Training)
//            Bahdanau et al. (2015)

use burn::backend::{wgpu::WgpuDevice, Autodiff, Wgpu};

pub type TrainBackend  = Autodiff<Wgpu>;
pub type DecodeBackend = Wgpu;

pub fn device() -> WgpuDevice {
    let device = WgpuDevice::default();
    tracing::info!("Using WGPU device: {:?}", device);
    device
}

/// RNNsearch network definition
pub mod model;

/// Parameter registry bridge
pub mod params;

/// DecodingModel implementation
pub mod decoder;

/// TrainableModel implementation
pub mod engine;
