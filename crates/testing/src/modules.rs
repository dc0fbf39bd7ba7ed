// Documentation modules that need external services
//
// Module references are dotted paths (`docs_src.user_guide.x.main`) resolved
// against the entries of a SearchPath to `<entry>/docs_src/user_guide/x/main.toml`.
// Importing a module parses its manifest and runs the loader registered for
// the reference.

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::loaders::{self, LoadedModule, Loader, ModuleManifest};
use crate::markers::{Marker, Selection};
use crate::search_path::SearchPath;

/// Extension of module manifests
const MANIFEST_EXTENSION: &str = "toml";

/// Dotted module reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleRef {
    pub path: &'static str,
}

impl ModuleRef {
    pub const fn new(path: &'static str) -> Self {
        Self { path }
    }

    /// Manifest location relative to a search path entry
    pub fn relative_path(&self) -> PathBuf {
        let mut path: PathBuf = self.path.split('.').collect();
        path.set_extension(MANIFEST_EXTENSION);
        path
    }
}

impl std::fmt::Display for ModuleRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path)
    }
}

/// A documentation module that reaches live services when imported
#[derive(Debug, Clone, Copy)]
pub struct ExternalModule {
    pub reference: ModuleRef,
    pub loader: Loader,
    pub markers: &'static [Marker],
}

/// Modules excluded from default test runs
pub static EXTERNAL_MODULES: [ExternalModule; 4] = [
    ExternalModule {
        reference: ModuleRef::new("docs_src.user_guide.external_rest_apis.main"),
        loader: loaders::openapi_client,
        markers: &[Marker::External],
    },
    ExternalModule {
        reference: ModuleRef::new("docs_src.user_guide.external_rest_apis.security"),
        loader: loaders::openapi_client,
        markers: &[Marker::External],
    },
    ExternalModule {
        reference: ModuleRef::new("docs_src.user_guide.runtimes.ag2.mesop.main"),
        loader: loaders::ag2_workflow,
        markers: &[Marker::External, Marker::Llm, Marker::OpenAi],
    },
    ExternalModule {
        reference: ModuleRef::new("docs_src.user_guide.runtimes.ag2.mesop.using_non_openai_models"),
        loader: loaders::ag2_workflow,
        markers: &[Marker::External, Marker::Llm],
    },
];

/// Why a module could not be imported
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("No module named '{module}' (searched: {})", display_paths(.searched))]
    ModuleNotFound {
        module: String,
        searched: Vec<PathBuf>,
    },

    #[error("Invalid manifest for '{module}' at {}: {message}", .path.display())]
    InvalidManifest {
        module: String,
        path: PathBuf,
        message: String,
    },

    #[error("Failed to initialize '{module}': {source:#}")]
    Initialization {
        module: String,
        #[source]
        source: anyhow::Error,
    },
}

fn display_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "<empty search path>".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// The repository's `docs/` directory
pub fn docs_root() -> PathBuf {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../docs");
    root.canonicalize().unwrap_or(root)
}

/// Locate a module's manifest; the most recently added entry wins
pub fn resolve_module(search_path: &SearchPath, reference: &ModuleRef) -> Result<PathBuf, ImportError> {
    let relative = reference.relative_path();
    let searched = search_path.entries();

    searched
        .iter()
        .map(|entry| entry.join(&relative))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| ImportError::ModuleNotFound {
            module: reference.to_string(),
            searched,
        })
}

/// Resolve, parse and initialize a module
pub async fn import_module(
    search_path: &SearchPath,
    module: &ExternalModule,
) -> Result<LoadedModule, ImportError> {
    let name = module.reference.to_string();
    let path = resolve_module(search_path, &module.reference)?;

    let source = std::fs::read_to_string(&path).map_err(|e| ImportError::InvalidManifest {
        module: name.clone(),
        path: path.clone(),
        message: e.to_string(),
    })?;
    let manifest = ModuleManifest::from_toml(&source).map_err(|e| ImportError::InvalidManifest {
        module: name.clone(),
        path: path.clone(),
        message: e.to_string(),
    })?;

    tracing::info!(module = %name, kind = manifest.kind(), path = %path.display(), "Importing module");

    (module.loader)(manifest)
        .await
        .map_err(|source| ImportError::Initialization {
            module: name,
            source,
        })
}

/// External modules a selection keeps
pub fn select_external_modules(selection: &Selection) -> Vec<&'static ExternalModule> {
    EXTERNAL_MODULES
        .iter()
        .filter(|module| selection.selects(module.markers))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search_path::add_to_search_path;
    use std::fs;

    fn write_manifest(root: &Path, reference: &ModuleRef, contents: &str) {
        let path = root.join(reference.relative_path());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn workflow_module(reference: ModuleRef) -> ExternalModule {
        ExternalModule {
            reference,
            loader: loaders::ag2_workflow,
            markers: &[Marker::External],
        }
    }

    #[test]
    fn test_relative_path() {
        let reference = ModuleRef::new("docs_src.user_guide.external_rest_apis.main");
        assert_eq!(
            reference.relative_path(),
            PathBuf::from("docs_src/user_guide/external_rest_apis/main.toml")
        );
    }

    #[test]
    fn test_registry_lists_the_four_modules() {
        let paths: Vec<&str> = EXTERNAL_MODULES.iter().map(|m| m.reference.path).collect();
        assert_eq!(
            paths,
            vec![
                "docs_src.user_guide.external_rest_apis.main",
                "docs_src.user_guide.external_rest_apis.security",
                "docs_src.user_guide.runtimes.ag2.mesop.main",
                "docs_src.user_guide.runtimes.ag2.mesop.using_non_openai_models",
            ]
        );
        assert!(EXTERNAL_MODULES
            .iter()
            .all(|m| m.markers.contains(&Marker::External)));
    }

    #[test]
    fn test_default_selection_excludes_every_external_module() {
        assert!(select_external_modules(&Selection::default_selection()).is_empty());
        assert_eq!(
            select_external_modules(&Selection::parse("external").unwrap()).len(),
            4
        );
        assert_eq!(
            select_external_modules(&Selection::parse("external and not llm").unwrap()).len(),
            2
        );
    }

    #[test]
    fn test_registered_manifests_exist_under_docs_root() {
        let search_path = SearchPath::new();
        let _guard = add_to_search_path(&search_path, docs_root());

        for module in &EXTERNAL_MODULES {
            let path = resolve_module(&search_path, &module.reference).unwrap();
            let source = fs::read_to_string(path).unwrap();
            ModuleManifest::from_toml(&source).unwrap();
        }
    }

    #[test]
    fn test_resolution_is_scoped_to_the_guard() {
        let dir = tempfile::tempdir().unwrap();
        let reference = ModuleRef::new("docs_src.example.main");
        write_manifest(dir.path(), &reference, "kind = \"ag2_workflow\"\n");

        let search_path = SearchPath::new();
        {
            let _guard = add_to_search_path(&search_path, dir.path());
            assert!(resolve_module(&search_path, &reference).is_ok());
        }

        let err = resolve_module(&search_path, &reference).unwrap_err();
        assert!(matches!(err, ImportError::ModuleNotFound { .. }));
        assert!(err.to_string().contains("<empty search path>"));
    }

    #[tokio::test]
    async fn test_import_runs_loader() {
        let dir = tempfile::tempdir().unwrap();
        let reference = ModuleRef::new("docs_src.example.agents");
        write_manifest(
            dir.path(),
            &reference,
            r#"
kind = "ag2_workflow"

[[agents]]
name = "user"
kind = "user_proxy"
human_input_mode = "NEVER"
"#,
        );

        let search_path = SearchPath::new();
        let _guard = add_to_search_path(&search_path, dir.path());
        let loaded = import_module(&search_path, &workflow_module(reference))
            .await
            .unwrap();

        match loaded {
            LoadedModule::Workflow { agents } => assert_eq!(agents[0].name(), "user"),
            other => panic!("unexpected module: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_import_missing_module_lists_searched_entries() {
        let dir = tempfile::tempdir().unwrap();
        let search_path = SearchPath::new();
        let _guard = add_to_search_path(&search_path, dir.path());

        let err = import_module(&search_path, &workflow_module(ModuleRef::new("docs_src.nope")))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("No module named 'docs_src.nope'"));
        assert!(err.to_string().contains(&dir.path().display().to_string()));
    }

    #[tokio::test]
    async fn test_import_invalid_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let reference = ModuleRef::new("docs_src.broken");
        write_manifest(dir.path(), &reference, "kind = [");

        let search_path = SearchPath::new();
        let _guard = add_to_search_path(&search_path, dir.path());
        let err = import_module(&search_path, &workflow_module(reference))
            .await
            .unwrap_err();

        assert!(matches!(err, ImportError::InvalidManifest { .. }));
    }

    #[tokio::test]
    async fn test_import_initialization_failure() {
        let dir = tempfile::tempdir().unwrap();
        let reference = ModuleRef::new("docs_src.misconfigured");
        write_manifest(
            dir.path(),
            &reference,
            r#"
kind = "ag2_workflow"

[[agents]]
name = "assistant"
kind = "conversable"
llm_config = "missing"
"#,
        );

        let search_path = SearchPath::new();
        let _guard = add_to_search_path(&search_path, dir.path());
        let err = import_module(&search_path, &workflow_module(reference))
            .await
            .unwrap_err();

        assert!(matches!(err, ImportError::Initialization { .. }));
        assert!(err.to_string().contains("unknown llm config 'missing'"));
    }
}
