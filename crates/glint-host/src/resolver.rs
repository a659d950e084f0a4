//! `require` support: the preload table first, removable storage last
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use glint_config::ModuleConfig;
use tracing::{debug, warn};

use crate::capabilities::{ChunkCompiler, Storage};
use crate::error::{ScriptError, ScriptResult};
use crate::runtime::Function;

/// Result of one search strategy
#[derive(Debug)]
pub enum SearchOutcome {
    Found { chunk: Function, origin: String },
    /// Carries one diagnostic line, starting with "\n\t"
    NotFound(String),
}

pub trait Searcher {
    fn search(&self, name: &str) -> SearchOutcome;
}

/// `a.b.c` -> `<mount>/a/b/c.<extension>`
pub fn module_path(mount: &Path, extension: &str, name: &str) -> PathBuf {
    let mount = mount.to_string_lossy();
    let mount = mount.trim_end_matches('/');
    let relative = name.replace('.', "/");
    let extension = extension.trim_start_matches('.');
    if extension.is_empty() {
        PathBuf::from(format!("{}/{}", mount, relative))
    } else {
        PathBuf::from(format!("{}/{}.{}", mount, relative, extension))
    }
}

#[derive(Default)]
pub struct PreloadSearcher {
    loaders: HashMap<String, Function>,
}

impl PreloadSearcher {
    pub fn insert(&mut self, name: &str, loader: Function) -> Option<Function> {
        self.loaders.insert(name.to_string(), loader)
    }
}

impl Searcher for PreloadSearcher {
    fn search(&self, name: &str) -> SearchOutcome {
        match self.loaders.get(name) {
            Some(loader) => SearchOutcome::Found {
                chunk: loader.clone(),
                origin: ":preload:".to_string(),
            },
            None => SearchOutcome::NotFound(format!("\n\tno field preload['{}']", name)),
        }
    }
}

/// Loads `<mount>/<dotted/path>.<ext>` from removable storage
pub struct StorageSearcher {
    mount: PathBuf,
    extension: String,
    storage: Arc<dyn Storage>,
    compiler: Rc<dyn ChunkCompiler>,
}

impl StorageSearcher {
    pub fn new(config: &ModuleConfig, storage: Arc<dyn Storage>, compiler: Rc<dyn ChunkCompiler>) -> Self {
        Self {
            mount: config.mount_path.clone(),
            extension: config.bare_extension().to_string(),
            storage,
            compiler,
        }
    }

    pub fn module_path(&self, name: &str) -> PathBuf {
        module_path(&self.mount, &self.extension, name)
    }
}

impl Searcher for StorageSearcher {
    fn search(&self, name: &str) -> SearchOutcome {
        let path = self.module_path(name);
        let source = match self.storage.read_file(&path) {
            Ok(source) => source,
            Err(e) => {
                debug!(target: "modules", "{}", e);
                return SearchOutcome::NotFound(format!("\n\tno file '{}' (storage)", path.display()));
            }
        };

        let chunk_name = format!("@{}", path.display());
        match self.compiler.compile(&source, &chunk_name) {
            Ok(chunk) => SearchOutcome::Found {
                chunk,
                origin: path.display().to_string(),
            },
            Err(e) => {
                warn!(target: "modules", "Failed to load {}: {}", path.display(), e.message);
                SearchOutcome::NotFound(format!(
                    "\n\terror loading '{}' (storage): {}",
                    path.display(),
                    e.message
                ))
            }
        }
    }
}

/// Ordered searchers consulted by `require`. No results are cached.
pub struct ModuleResolver {
    preload: PreloadSearcher,
    storage: StorageSearcher,
}

impl ModuleResolver {
    pub fn new(storage: StorageSearcher) -> Self {
        Self {
            preload: PreloadSearcher::default(),
            storage,
        }
    }

    pub fn preload_mut(&mut self) -> &mut PreloadSearcher {
        &mut self.preload
    }

    pub fn storage(&self) -> &StorageSearcher {
        &self.storage
    }

    /// Find a loader for `name`, returning it with its origin
    pub fn resolve(&self, name: &str) -> ScriptResult<(Function, String)> {
        let searchers: [&dyn Searcher; 2] = [&self.preload, &self.storage];
        let mut tried = String::new();
        for searcher in searchers {
            match searcher.search(name) {
                SearchOutcome::Found { chunk, origin } => {
                    debug!(target: "modules", "Resolved '{}' from {}", name, origin);
                    return Ok((chunk, origin));
                }
                SearchOutcome::NotFound(diagnostic) => tried.push_str(&diagnostic),
            }
        }
        Err(ScriptError::ModuleNotFound {
            name: name.to_string(),
            tried,
        })
    }
}
