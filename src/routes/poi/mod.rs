mod handler;
mod model;

pub use handler::nearby_pois;
