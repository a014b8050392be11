//! # Pooling Layers

mod avg_pool_2d_same;

pub use avg_pool_2d_same::*;
