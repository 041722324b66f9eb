//! Module resolution for Solilang.
//!
//! This module provides:
//! - Requester location capture and normalization
//! - A filesystem loader over an ordered search path
//! - Scoped resolution of private dependencies (`.soli_modules`)
//! - Switching a host between its original loader and the scoped resolver
//! - Package file (soli.toml) parsing, installer invocation and registry lookups

pub mod cache;
pub mod caller;
pub mod hook;
pub mod installer;
pub mod loader;
mod package;
pub mod registry;
pub mod requirement;
mod resolver;
pub mod search_path;

pub use cache::ScopedCache;
pub use caller::{PathResolver, Requester, RequesterDir};
pub use hook::{disable_interception, enable_interception, LoaderSlot};
pub use loader::{
    FileSystemLoader, LoadContext, Module, ModuleHandle, ModuleLoader, ModuleRegistry, UnitKind,
    UnitLayout,
};
pub use package::{Dependency, Package, RequireSettings, PACKAGE_FILE};
pub use requirement::{Requirement, Version};
pub use resolver::{
    LocalScope, ResolverConfig, ScopedResolver, DEFAULT_SCOPE_FOLDER, SCOPE_FOLDER_VAR,
};
pub use search_path::{Environment, SearchPathScope};
