pub mod node_api;

pub use node_api::*;
