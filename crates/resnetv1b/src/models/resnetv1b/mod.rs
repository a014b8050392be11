//! # `ResNetV1b`
//!
//! The `ResNetV1b` family: `ResNet` with the downsampling stride on the
//! 3x3 conv of the bottleneck, plus the deep-stem (``c``/``s``) and
//! average-pool downsample (``d``/``e``) refinements.
//!
//! * [`resnet_model`] - [`ResNetV1b`], [`ResNetV1bConfig`].
//! * [`prefabs`] - well-known configurations and their constructors.
//! * [`stems`] - the input stems.
//! * [`layer_block`] - stage planning and the [`layer_block::Stage`] module.
//! * [`residual_block`] - the [`residual_block::ResidualBlock`] wrapper.
//!   * [`basic_block`] - [`basic_block::BasicBlockV1b`].
//!   * [`bottleneck_block`] - [`bottleneck_block::BottleneckV1b`].
//! * [`downsample`] - residual projection sub-graphs.
//! * [`util`] - 'SAME' padding helpers and [`DataFormat`].

pub mod basic_block;
pub mod bottleneck_block;
pub mod downsample;
pub mod layer_block;
pub mod prefabs;
pub mod residual_block;
pub mod resnet_model;
pub mod stems;
pub mod util;

pub use prefabs::*;
pub use resnet_model::{ResNetV1b, ResNetV1bConfig, ResNetV1bMeta, ResNetV1bStructureConfig};
pub use util::DataFormat;
