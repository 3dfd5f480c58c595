pub mod aggregator;
pub mod config;
pub mod corpus;
pub mod encoder;
pub mod pipeline;
pub mod resolver;
pub mod writer;

pub use config::*;
pub use corpus::*;
pub use pipeline::*;
