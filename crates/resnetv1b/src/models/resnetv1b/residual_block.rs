//! # Residual Block Wrapper
//!
//! [`ResidualBlockMeta`] is the common meta API of the `ResNetV1b` blocks;
//! it is implemented by [`BasicBlockV1b`], [`BottleneckV1b`], their configs,
//! and the [`ResidualBlock`] / [`ResidualBlockConfig`] wrappers.

use crate::models::resnetv1b::basic_block::{BasicBlockV1b, BasicBlockV1bConfig};
use crate::models::resnetv1b::bottleneck_block::{BottleneckV1b, BottleneckV1bConfig};
use crate::models::resnetv1b::util::same_output_resolution;
use burn::config::Config;
use burn::prelude::{Backend, Module, Tensor};
use serde::{Deserialize, Serialize};

/// The residual block kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockKind {
    /// Two 3x3 convolutions; expansion 1.
    Basic,

    /// 1x1 / 3x3 / 1x1 convolutions; expansion 4.
    Bottleneck,
}

impl BlockKind {
    /// The channel expansion factor.
    ///
    /// ``out_planes = planes * expansion``
    pub const fn expansion(&self) -> usize {
        match self {
            Self::Basic => 1,
            Self::Bottleneck => 4,
        }
    }
}

/// [`ResidualBlock`] Meta API.
pub trait ResidualBlockMeta {
    /// The block kind.
    fn kind(&self) -> BlockKind;

    /// The number of input feature planes.
    fn in_planes(&self) -> usize;

    /// Configures `out_planes` as a function of `expansion_factor`.
    fn planes(&self) -> usize;

    /// Control factor for `out_planes()`.
    fn expansion_factor(&self) -> usize {
        self.kind().expansion()
    }

    /// The number of output feature planes.
    ///
    /// ``out_planes = planes * expansion_factor``
    fn out_planes(&self) -> usize {
        self.planes() * self.expansion_factor()
    }

    /// The stride of the strided conv; also applied by the downsample path.
    fn stride(&self) -> usize;

    /// Dilation rate of the strided conv.
    fn dilation(&self) -> usize;

    /// Dilation rate of the second 3x3 conv (basic) / unused (bottleneck).
    fn previous_dilation(&self) -> usize;

    /// Does the residual path project through a downsample sub-graph?
    fn has_downsample(&self) -> bool;

    /// Get the output resolution for a given input resolution.
    ///
    /// # Arguments
    ///
    /// - `input_resolution`: ``[in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// ``[ceil(in_height / stride), ceil(in_width / stride)]``
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        same_output_resolution(input_resolution, self.stride())
    }
}

/// [`ResidualBlock`] Config.
#[derive(Config, Debug)]
pub enum ResidualBlockConfig {
    /// A [`BasicBlockV1b`].
    Basic(BasicBlockV1bConfig),

    /// A [`BottleneckV1b`].
    Bottleneck(BottleneckV1bConfig),
}

impl From<BasicBlockV1bConfig> for ResidualBlockConfig {
    fn from(config: BasicBlockV1bConfig) -> Self {
        Self::Basic(config)
    }
}

impl From<BottleneckV1bConfig> for ResidualBlockConfig {
    fn from(config: BottleneckV1bConfig) -> Self {
        Self::Bottleneck(config)
    }
}

macro_rules! dispatch {
    ($self:ident, $inner:ident => $expr:expr) => {
        match $self {
            Self::Basic($inner) => $expr,
            Self::Bottleneck($inner) => $expr,
        }
    };
}

impl ResidualBlockMeta for ResidualBlockConfig {
    fn kind(&self) -> BlockKind {
        dispatch!(self, config => config.kind())
    }

    fn in_planes(&self) -> usize {
        dispatch!(self, config => config.in_planes())
    }

    fn planes(&self) -> usize {
        dispatch!(self, config => config.planes())
    }

    fn stride(&self) -> usize {
        dispatch!(self, config => config.stride())
    }

    fn dilation(&self) -> usize {
        dispatch!(self, config => config.dilation())
    }

    fn previous_dilation(&self) -> usize {
        dispatch!(self, config => config.previous_dilation())
    }

    fn has_downsample(&self) -> bool {
        dispatch!(self, config => config.has_downsample())
    }
}

impl ResidualBlockConfig {
    /// Initialize a [`ResidualBlock`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ResidualBlock<B> {
        match self {
            Self::Basic(config) => config.init(device).into(),
            Self::Bottleneck(config) => config.init(device).into(),
        }
    }
}

/// A [`BasicBlockV1b`] or [`BottleneckV1b`] wrapper.
#[derive(Module, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum ResidualBlock<B: Backend> {
    /// A [`BasicBlockV1b`].
    Basic(BasicBlockV1b<B>),

    /// A [`BottleneckV1b`].
    Bottleneck(BottleneckV1b<B>),
}

impl<B: Backend> From<BasicBlockV1b<B>> for ResidualBlock<B> {
    fn from(block: BasicBlockV1b<B>) -> Self {
        Self::Basic(block)
    }
}

impl<B: Backend> From<BottleneckV1b<B>> for ResidualBlock<B> {
    fn from(block: BottleneckV1b<B>) -> Self {
        Self::Bottleneck(block)
    }
}

impl<B: Backend> ResidualBlockMeta for ResidualBlock<B> {
    fn kind(&self) -> BlockKind {
        dispatch!(self, block => block.kind())
    }

    fn in_planes(&self) -> usize {
        dispatch!(self, block => block.in_planes())
    }

    fn planes(&self) -> usize {
        dispatch!(self, block => block.planes())
    }

    fn stride(&self) -> usize {
        dispatch!(self, block => block.stride())
    }

    fn dilation(&self) -> usize {
        dispatch!(self, block => block.dilation())
    }

    fn previous_dilation(&self) -> usize {
        dispatch!(self, block => block.previous_dilation())
    }

    fn has_downsample(&self) -> bool {
        dispatch!(self, block => block.has_downsample())
    }
}

impl<B: Backend> ResidualBlock<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_planes, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_planes, out_height, out_width]`` tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        match self {
            Self::Basic(block) => block.forward(input),
            Self::Bottleneck(block) => block.forward(input),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::resnetv1b::downsample::DownsampleConfig;
    use burn::backend::NdArray;

    #[test]
    fn test_block_kind_expansion() {
        assert_eq!(BlockKind::Basic.expansion(), 1);
        assert_eq!(BlockKind::Bottleneck.expansion(), 4);
    }

    #[test]
    fn test_residual_block_config_meta() {
        let config: ResidualBlockConfig = BottleneckV1bConfig::new(64, 64).into();
        assert_eq!(config.kind(), BlockKind::Bottleneck);
        assert_eq!(config.in_planes(), 64);
        assert_eq!(config.planes(), 64);
        assert_eq!(config.expansion_factor(), 4);
        assert_eq!(config.out_planes(), 256);
        assert_eq!(config.stride(), 1);
        assert!(!config.has_downsample());

        let config: ResidualBlockConfig = BasicBlockV1bConfig::new(64, 128)
            .with_stride(2)
            .into();
        assert_eq!(config.kind(), BlockKind::Basic);
        assert_eq!(config.out_planes(), 128);
        assert_eq!(config.output_resolution([15, 16]), [8, 8]);
    }

    #[test]
    fn test_residual_block_meta_matches_config() {
        type B = NdArray<f32>;
        let device = Default::default();

        let configs: Vec<ResidualBlockConfig> = vec![
            BasicBlockV1bConfig::new(8, 8).into(),
            BottleneckV1bConfig::new(8, 4)
                .with_stride(2)
                .with_dilation(2)
                .with_previous_dilation(2)
                .with_downsample(Some(
                    DownsampleConfig::new(1, 8, 16).with_stride(2).to_node(),
                ))
                .into(),
        ];

        for config in configs {
            let block: ResidualBlock<B> = config.init(&device);
            assert_eq!(block.kind(), config.kind());
            assert_eq!(block.in_planes(), config.in_planes());
            assert_eq!(block.planes(), config.planes());
            assert_eq!(block.out_planes(), config.out_planes());
            assert_eq!(block.stride(), config.stride());
            assert_eq!(block.dilation(), config.dilation());
            assert_eq!(block.previous_dilation(), config.previous_dilation());
            assert_eq!(block.has_downsample(), config.has_downsample());

            let input = Tensor::ones([2, config.in_planes(), 6, 6], &device);
            let [h, w] = config.output_resolution([6, 6]);
            assert_eq!(block.forward(input).dims(), [2, config.out_planes(), h, w]);
        }
    }
}
