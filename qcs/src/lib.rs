pub extern crate nalgebra as na;

pub mod camera;
pub mod centroid;
pub mod channel;
pub mod coordinator;
pub mod coverage;
pub mod geo;
pub mod gimbal;
pub mod interruptor;
pub mod monitor;
pub mod scenario;
pub mod standoff;
pub mod store;
pub mod transport;
pub mod units;
