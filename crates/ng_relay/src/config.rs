use std::time::Duration;

/// Relay limits. `Default` matches the deployment defaults: 128 KiB
/// ciphertext ceiling, 10-minute replay window, pages of 50 capped at 200.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub max_ciphertext_len: usize,
    pub replay_ttl: Duration,
    pub default_page_limit: u32,
    pub max_page_limit: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_ciphertext_len: 131_072,
            replay_ttl: Duration::from_secs(600),
            default_page_limit: 50,
            max_page_limit: 200,
        }
    }
}
