//! Worldmap
//!
//! The derived module dependency graph used for level select.

pub mod generator;

pub use generator::{
    Worldmap, WorldmapConnection, WorldmapGenerator, WorldmapLayout, WorldmapNode,
    WorldmapPosition,
};
