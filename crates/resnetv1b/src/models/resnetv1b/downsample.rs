//! # The `ResNetV1b` Downsample Sub-Graph.
//!
//! The projection applied to a block's skip connection when the
//! resolution or the channel count changes:
//!
//! * ``avg_down``: ``AvgPool2dSame -> 1x1 Conv2d -> Norm``
//! * otherwise: ``strided 1x1 Conv2d -> Norm``
//!
//! Both are emitted as a [`NodeConfig::Sequence`] named ``down{stage_index}``.

use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::layers::pool::AvgPool2dSameConfig;
use crate::layers::sequential::{Node, NodeConfig};
use crate::models::resnetv1b::util::{
    same_conv2d_config, same_output_resolution, scalar_to_array,
};
use burn::prelude::{Backend, Config};

/// [`DownsampleConfig`] Meta trait.
pub trait DownsampleMeta {
    /// The size of the in channels dimension.
    fn in_channels(&self) -> usize;

    /// The size of the out channels dimension.
    fn out_channels(&self) -> usize;

    /// The stride of the downsample path.
    fn stride(&self) -> usize;

    /// Get the output resolution for a given input resolution.
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        same_output_resolution(input_resolution, self.stride())
    }
}

/// Is a downsample projection needed for this block transition?
pub fn downsample_required(
    in_planes: usize,
    out_planes: usize,
    stride: usize,
) -> bool {
    stride != 1 || in_planes != out_planes
}

/// Downsample sub-graph configuration.
#[derive(Config, Debug)]
pub struct DownsampleConfig {
    /// The 1-based index of the owning stage; used for the sequence name.
    pub stage_index: usize,

    /// The size of the in channels dimension.
    pub in_channels: usize,

    /// The size of the out channels dimension.
    pub out_channels: usize,

    /// The stride of the downsample path.
    #[config(default = 1)]
    pub stride: usize,

    /// The dilation of the owning stage.
    ///
    /// With ``avg_down``, a dilated stage pools with a unit kernel.
    #[config(default = 1)]
    pub dilation: usize,

    /// Use average pooling, rather than a strided conv, to downsample.
    #[config(default = false)]
    pub avg_down: bool,

    /// The [`NormalizationConfig`]; the feature size will be auto-matched.
    #[config(default = "NormalizationConfig::new()")]
    pub norm: NormalizationConfig,
}

impl DownsampleMeta for DownsampleConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn out_channels(&self) -> usize {
        self.out_channels
    }

    fn stride(&self) -> usize {
        self.stride
    }
}

impl DownsampleConfig {
    /// The sequence name of the sub-graph.
    pub fn name(&self) -> String {
        format!("down{}", self.stage_index)
    }

    /// Build the sub-graph [`NodeConfig`].
    pub fn to_node(&self) -> NodeConfig {
        let norm = self.norm.with_features(self.out_channels).into();

        let nodes = if self.avg_down {
            let pool_size = if self.dilation == 1 { self.stride } else { 1 };
            vec![
                AvgPool2dSameConfig::new(
                    scalar_to_array(pool_size),
                    scalar_to_array(self.stride),
                )
                .into(),
                same_conv2d_config(self.in_channels, self.out_channels, 1, 1, 1).into(),
                norm,
            ]
        } else {
            vec![
                same_conv2d_config(self.in_channels, self.out_channels, 1, self.stride, 1).into(),
                norm,
            ]
        };

        NodeConfig::sequence(self.name(), nodes)
    }

    /// Initialize the sub-graph [`Node`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Node<B> {
        self.to_node().init(device)
    }
}

impl From<DownsampleConfig> for NodeConfig {
    fn from(config: DownsampleConfig) -> Self {
        config.to_node()
    }
}
