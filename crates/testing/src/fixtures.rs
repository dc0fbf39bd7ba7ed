// Shared test fixtures

use fastagency_core::{LlmConfig, LlmConfigEntry, LlmEnv, Result};
use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Install a test-writer subscriber once per test binary.
///
/// Respects `RUST_LOG`, defaulting to `info` for the workspace crates.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("fastagency_core=info,fastagency_testing=info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Azure GPT-4o deployment from `AZURE_OPENAI_API_KEY` / `AZURE_API_ENDPOINT`
pub fn azure_gpt4o_llm_config() -> Result<LlmConfig> {
    LlmEnv::from_env().azure_gpt4o_llm_config()
}

/// `gpt-4o-mini` from `OPENAI_API_KEY`
pub fn openai_gpt4o_mini_llm_config() -> Result<LlmConfig> {
    LlmEnv::from_env().openai_llm_config("gpt-4o-mini")
}

/// Valid configuration with a placeholder key, for tests that never call out
pub fn offline_llm_config() -> LlmConfig {
    LlmConfig {
        config_list: vec![LlmConfigEntry::openai("gpt-4o-mini", "sk-offline")],
        temperature: None,
        timeout: None,
        cache_seed: None,
    }
}
