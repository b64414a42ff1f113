//! Links the stream-based shader entry points of one module into a multi-stage pipeline with
//! explicit, location- and builtin-bound stage interfaces.

pub mod config;
pub mod error;
pub mod interface;
pub mod module;
pub mod samples;
pub mod spirv;
pub mod symbol;

pub use config::{EntryPointNames, LinkerConfig};
pub use error::{ErrorKind, LinkError, Result};
pub use interface::{EntryPointInfo, InterfaceProcessor, LinkResult, VertexInputAttribute};
