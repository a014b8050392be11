//! # `ResNetV1b` Basic Block
//!
//! [`BasicBlockV1b`] is the two-conv `ResNetV1b` residual unit:
//!
//! ```text
//! conv3x3(stride, dilation) -> norm -> relu
//!   -> conv3x3(1, previous_dilation) -> norm
//!   -> + residual -> relu
//! ```
//!
//! [`BasicBlockV1bConfig`] implements [`Config`], and provides
//! [`BasicBlockV1bConfig::init`] to initialize a [`BasicBlockV1b`].
//!
//! Both implement [`ResidualBlockMeta`].

use crate::compat::normalization_wrapper::{Normalization, NormalizationConfig};
use crate::layers::sequential::{Node, NodeConfig};
use crate::models::resnetv1b::residual_block::{BlockKind, ResidualBlockMeta};
use crate::models::resnetv1b::util::same_conv2d_config;
use burn::nn::Relu;
use burn::nn::conv::Conv2d;
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`BasicBlockV1b`] Config.
///
/// Implements [`ResidualBlockMeta`].
#[derive(Config, Debug)]
pub struct BasicBlockV1bConfig {
    /// The size of the in channels dimension.
    pub in_planes: usize,

    /// The size of the out channels dimension.
    pub planes: usize,

    /// The stride of the first conv.
    #[config(default = 1)]
    pub stride: usize,

    /// Dilation rate of the first conv.
    #[config(default = 1)]
    pub dilation: usize,

    /// Dilation rate of the second conv.
    #[config(default = 1)]
    pub previous_dilation: usize,

    /// Optional residual projection.
    #[config(default = "None")]
    pub downsample: Option<NodeConfig>,

    /// The [`NormalizationConfig`]; the feature size will be auto-matched.
    #[config(default = "NormalizationConfig::new()")]
    pub norm: NormalizationConfig,
}

impl ResidualBlockMeta for BasicBlockV1bConfig {
    fn kind(&self) -> BlockKind {
        BlockKind::Basic
    }

    fn in_planes(&self) -> usize {
        self.in_planes
    }

    fn planes(&self) -> usize {
        self.planes
    }

    fn stride(&self) -> usize {
        self.stride
    }

    fn dilation(&self) -> usize {
        self.dilation
    }

    fn previous_dilation(&self) -> usize {
        self.previous_dilation
    }

    fn has_downsample(&self) -> bool {
        self.downsample.is_some()
    }
}

impl BasicBlockV1bConfig {
    /// Initialize a [`BasicBlockV1b`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> BasicBlockV1b<B> {
        let planes = self.planes();

        BasicBlockV1b {
            conv1: same_conv2d_config(self.in_planes(), planes, 3, self.stride, self.dilation)
                .init(device),
            bn1: self.norm.with_features(planes).init(device),
            relu1: Relu::new(),

            conv2: same_conv2d_config(planes, self.out_planes(), 3, 1, self.previous_dilation)
                .init(device),
            bn2: self.norm.with_features(self.out_planes()).init(device),
            relu2: Relu::new(),

            downsample: self.downsample.as_ref().map(|config| config.init(device)),
        }
    }
}

/// `ResNetV1b` Basic Block.
///
/// Implements [`ResidualBlockMeta`].
#[derive(Module, Debug)]
pub struct BasicBlockV1b<B: Backend> {
    /// First 3x3 conv; carries the stride.
    pub conv1: Conv2d<B>,
    /// First norm.
    pub bn1: Normalization<B>,
    /// First activation.
    pub relu1: Relu,

    /// Second 3x3 conv.
    pub conv2: Conv2d<B>,
    /// Second norm.
    pub bn2: Normalization<B>,
    /// Post-residual activation.
    pub relu2: Relu,

    /// Optional residual projection.
    pub downsample: Option<Node<B>>,
}

impl<B: Backend> ResidualBlockMeta for BasicBlockV1b<B> {
    fn kind(&self) -> BlockKind {
        BlockKind::Basic
    }

    fn in_planes(&self) -> usize {
        self.conv1.weight.dims()[1]
    }

    fn planes(&self) -> usize {
        self.conv1.weight.dims()[0]
    }

    fn out_planes(&self) -> usize {
        self.conv2.weight.dims()[0]
    }

    fn stride(&self) -> usize {
        self.conv1.stride[0]
    }

    fn dilation(&self) -> usize {
        self.conv1.dilation[0]
    }

    fn previous_dilation(&self) -> usize {
        self.conv2.dilation[0]
    }

    fn has_downsample(&self) -> bool {
        self.downsample.is_some()
    }
}

impl<B: Backend> BasicBlockV1b<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_planes, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_planes, ceil(in_height/stride), ceil(in_width/stride)]`` tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        #[cfg(debug_assertions)]
        let [batch, in_height, in_width] = bimm_contracts::unpack_shape_contract!(
            ["batch", "in_planes", "in_height", "in_width"],
            &input,
            &["batch", "in_height", "in_width"],
            &[("in_planes", self.in_planes())],
        );

        let identity = match &self.downsample {
            Some(downsample) => downsample.forward(input.clone()),
            None => input.clone(),
        };

        let x = self.conv1.forward(input);
        let x = self.bn1.forward(x);
        let x = self.relu1.forward(x);

        let x = self.conv2.forward(x);
        let x = self.bn2.forward(x);

        let x = self.relu2.forward(x + identity);

        #[cfg(debug_assertions)]
        {
            let [out_height, out_width] = self.output_resolution([in_height, in_width]);
            bimm_contracts::assert_shape_contract_periodically!(
                ["batch", "out_planes", "out_height", "out_width"],
                &x,
                &[
                    ("batch", batch),
                    ("out_planes", self.out_planes()),
                    ("out_height", out_height),
                    ("out_width", out_width),
                ]
            );
        }

        x
    }
}
