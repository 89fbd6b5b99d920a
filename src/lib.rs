//! Static analysis of BubbleFlow TypeScript scripts.
//!
//! Parses a flow script, builds its lexical scope tree, locates every bubble
//! instantiation, expands bubble dependencies, lowers `handle` into a
//! workflow tree, and infers the trigger and payload schema. A small
//! line-based mutation API backs editor round-trips.

pub mod config;
pub mod error;
pub mod ir;
pub mod lower;
pub mod parse;
pub mod registry;
pub mod session;
pub mod validate;
pub mod wasm;

pub use config::AnalyzerOptions;
pub use error::{FlowError, MutationError, Phase};
pub use lower::analyze;
pub use registry::{BubbleDescriptor, BubbleRegistry, CapabilityRegistry};
pub use session::FlowSession;
pub use validate::validate_flow;
