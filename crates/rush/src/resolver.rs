//! Module resolution seam.
//!
//! `import { a } from "name"` asks an injected [`ModuleResolver`] for the
//! module's source text; the runtime evaluates it once, caches its exports,
//! and binds the requested names. On-disk resolution lives in the host (the
//! CLI), not here.

use ahash::AHashMap;

/// Maps a module name to its source text.
pub trait ModuleResolver {
    /// Returns the module's source, or `None` when the module is unknown.
    fn resolve(&self, name: &str) -> Option<String>;
}

/// Resolver over a fixed in-memory map; the default, and what tests use.
#[derive(Debug, Default)]
pub struct StaticResolver {
    modules: AHashMap<String, String>,
}

impl StaticResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module's source under `name`.
    #[must_use]
    pub fn with_module(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.modules.insert(name.into(), source.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.modules.insert(name.into(), source.into());
    }
}

impl ModuleResolver for StaticResolver {
    fn resolve(&self, name: &str) -> Option<String> {
        self.modules.get(name).cloned()
    }
}

/// Resolver that reads `<name>.rush` files relative to a base directory.
/// Used by the CLI; module names never escape the base directory because the
/// path-traversal check applies to module names too.
#[derive(Debug)]
pub struct FsResolver {
    base: std::path::PathBuf,
}

impl FsResolver {
    #[must_use]
    pub fn new(base: impl Into<std::path::PathBuf>) -> Self {
        Self { base: base.into() }
    }
}

impl ModuleResolver for FsResolver {
    fn resolve(&self, name: &str) -> Option<String> {
        if name.split(['/', '\\']).any(|segment| segment == "..") {
            return None;
        }
        let path = self.base.join(format!("{name}.rush"));
        std::fs::read_to_string(path).ok()
    }
}
