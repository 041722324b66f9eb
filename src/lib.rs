//! soli-require: scoped module resolution for Solilang.
//!
//! Every directory of a source tree may carry a private dependency folder
//! (`.soli_modules` by default). A name requested from a file resolves
//! against the nearest such folder above it before falling back to the
//! global search path, so two files can depend on different copies of the
//! same unit without either one leaking into ordinary loads.
//!
//! ```no_run
//! use soli_require::module::hook;
//!
//! hook::enable_interception();
//! let widget = soli_require::require!("widget")?;
//! println!("{}", widget);
//! hook::disable_interception();
//! # Ok::<(), soli_require::error::ResolveError>(())
//! ```

#![allow(clippy::new_without_default)]

pub mod error;
pub mod module;

pub use error::ResolveError;
pub use module::{
    LoaderSlot, ModuleHandle, ModuleLoader, Requester, ResolverConfig, ScopedResolver,
};

/// Load a module through the process-wide loader slot on behalf of the
/// source file containing the macro call.
///
/// While interception is enabled, the name resolves against the private
/// dependency folders above that file.
#[macro_export]
macro_rules! require {
    ($name:expr) => {
        $crate::module::hook::global().load_from(
            $name,
            $crate::module::Requester::Source {
                root: env!("CARGO_MANIFEST_DIR"),
                file: file!(),
            },
        )
    };
}
