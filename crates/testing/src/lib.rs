// FastAgency Testing
//
// Shared harness for the workspace's tests:
// - markers: tag tests that need external services and select them at runtime
// - search_path / modules / loaders: resolve documentation example modules
//   under a scoped search path and initialize them
// - transcript: substring assertions over conversation transcripts, with
//   tolerated (expected-failure) reporting for live runs
// - fixtures: tracing setup and prepared LLM configurations

pub mod fixtures;
pub mod loaders;
pub mod markers;
pub mod modules;
pub mod search_path;
pub mod transcript;

pub use fixtures::{
    azure_gpt4o_llm_config, init_tracing, offline_llm_config, openai_gpt4o_mini_llm_config,
};
pub use loaders::{LoadedModule, ModuleManifest};
pub use markers::{Marker, Selection, MARKERS_ENV};
pub use modules::{
    docs_root, import_module, resolve_module, select_external_modules, ExternalModule, ImportError,
    ModuleRef, EXTERNAL_MODULES,
};
pub use search_path::{add_to_search_path, SearchPath, SearchPathGuard};
pub use transcript::{tolerate_flaky, TranscriptExpectation, TranscriptMismatch};
