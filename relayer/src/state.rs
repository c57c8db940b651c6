use crate::config::Config;
use crate::proving::{ProofPipeline, Toolchain};
use crate::rate_limit::RateLimiter;
use crate::relay::{ChainRpc, RelayEngine};
use std::sync::{Arc, Mutex};

pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: Arc<ProofPipeline>,
    pub relay: RelayEngine,
    pub rpc: Arc<dyn ChainRpc>,
    pub rate_limiter: Mutex<RateLimiter>,
}

impl AppState {
    pub fn new(config: Config, toolchain: Arc<dyn Toolchain>, rpc: Arc<dyn ChainRpc>) -> Self {
        let config = Arc::new(config);
        let pipeline = Arc::new(ProofPipeline::new(config.clone(), toolchain));
        let relay = RelayEngine::new(config.clone(), rpc.clone(), pipeline.clone());
        let rate_limiter = Mutex::new(RateLimiter::new(
            config.rl_ok_per_min,
            config.rl_bad_per_min,
        ));
        Self {
            config,
            pipeline,
            relay,
            rpc,
            rate_limiter,
        }
    }

    pub fn has_relayer_key(&self) -> bool {
        self.config.relayer_keypair.is_some()
    }
}
