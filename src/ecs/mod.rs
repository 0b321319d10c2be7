//! Entity Component System
//!
//! Components live in one typed storage per [`ComponentKind`], keyed by entity id.

pub mod component;
pub mod entity;
pub mod world;

pub use component::{Component, ComponentKind, ComponentStorage, TypedComponentStorage};
pub use entity::EntityId;
pub use world::World;
