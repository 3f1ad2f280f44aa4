pub mod entity;
pub mod geo;
pub mod graph;

pub use entity::{Credentials, Entity, EntityKind, NewCredentials, NewEntity};
pub use geo::{GeoPoint, MAX_INDEXED_LATITUDE, calculate_distance};
pub use graph::{FriendGraph, GraphEdit, GraphUpdate, Relation, SetOp};
