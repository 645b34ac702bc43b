//! # udump
//!
//! Reflection-layout reconstruction library - turns sparse observations
//! read out of a foreign process dump into a complete, self-consistent
//! symbol database.
//!
//! This library provides functionality to:
//! - Read foreign memory from dump files through a source abstraction
//! - Decode the target's interned-name pool into strings
//! - Walk the foreign object array and build struct/class/enum/function
//!   entities grouped into packages
//! - Reconstruct gap-free struct layouts, bitfields and filler included
//! - Link every cross-reference into one registry, resolving name
//!   collisions and correcting enum widths from field usage
//! - Save and load encrypted project files
//!
//! ## Example
//!
//! ```no_run
//! use udump::{DumpSource, Generator, Progress};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let source = DumpSource::open("game.dmp", 0x7FF6_0000_0000)?;
//! let config: udump::TargetConfig =
//!     serde_json::from_str(&std::fs::read_to_string("target.json")?)?;
//!
//! let progress = Progress::new();
//! let dump = Generator::new(&source, &config).run(&progress)?;
//!
//! for package in &dump.packages {
//!     println!("{}: {} classes", package.name, package.classes.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod edit;
pub mod generate;
pub mod layout;
pub mod model;
pub mod names;
pub mod progress;
pub mod project;
pub mod registry;
pub mod resolve;
pub mod source;

// Re-export commonly used items
#[doc(inline)]
pub use edit::{insert_field, InsertError, Overrides};
#[doc(inline)]
pub use generate::{GenerateError, GeneratedDump, Generator, TargetConfig, SEED_PACKAGE};
#[doc(inline)]
pub use layout::{cook_struct, LayoutContext};
#[doc(inline)]
pub use model::{
    EntityRef, EnumDef, EnumWidth, Field, FunctionDef, Package, PropertyKind, StructDef,
    TypeDescriptor,
};
#[doc(inline)]
pub use names::{NamePoolConfig, NameReader};
#[doc(inline)]
pub use progress::{Cancelled, Progress, RunStatus};
#[doc(inline)]
pub use project::{load_project, save_project, ProjectError, ProjectFile};
#[doc(inline)]
pub use registry::Registry;
#[doc(inline)]
pub use resolve::finish_packages;
#[doc(inline)]
pub use source::{DumpSource, MemoryError, MemorySource, MockMemorySource};
