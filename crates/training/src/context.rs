use burn::tensor::backend::Backend;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Device and seed handed to every orchestrator. There is no process-wide device.
#[derive(Debug, Clone)]
pub struct ExecutionContext<B: Backend> {
    pub device: B::Device,
    pub seed: u64,
}

impl<B: Backend> ExecutionContext<B> {
    pub fn new(device: B::Device, seed: u64) -> Self {
        Self { device, seed }
    }

    pub fn with_default_device(seed: u64) -> Self {
        Self::new(B::Device::default(), seed)
    }

    pub fn rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.seed)
    }
}
