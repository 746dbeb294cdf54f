#![doc = include_str!("../README.md")]

extern crate alloc;

pub mod engine;
pub mod keywords;
pub mod path;
pub mod resolve;
pub mod store;
pub mod traverse;
pub mod tuple;

pub use engine::{DEFAULT_SCHEMA_ID_MEMBERS, RunArgs, run, run_with};
pub use keywords::{ExtensionKind, MemberSpec};
pub use path::{Location, PathStep, PathTemplate};
pub use store::DocumentStore;
pub use traverse::{Discovery, ExtensionSite, discover};
pub use tuple::KeyTuple;
