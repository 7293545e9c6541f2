pub mod layer;
pub mod placemarks;

pub use layer::*;
pub use placemarks::*;
