#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

//! Core of modserve.
//!
//! Serves JavaScript modules to the browser with bare import specifiers
//! (`import x from 'pkg'`) rewritten into browser-legal relative paths
//! (`'./node_modules/pkg/dist/esm/index.js'`).
//!
//! ```text
//! request ─▶ handler ─(miss)─▶ cache ─▶ rewriter ─▶ resolver
//!                  ◀── 200 / 304 ──┘        ▲
//!                                 file watch ┘ (one-shot invalidation)
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod handler;
pub mod resolver;
pub mod rewrite;
pub mod version;

pub use cache::{CachedModule, ModuleCache, SlotState};
pub use config::ServeConfig;
pub use error::{Error, LoadError, ParseError};
pub use handler::{ModuleHandler, ModuleRequest, ModuleResponse};
pub use resolver::{NodeResolver, ResolveError, ResolveReasonCode, ResolverConfig};
pub use rewrite::{ImportRewriter, Patch, SpecifierKind, SpecifierRef};
pub use version::VERSION;
