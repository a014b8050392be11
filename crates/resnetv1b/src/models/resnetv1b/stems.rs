//! # Input Stems
//!
//! ```text
//! conv1 -> bn1 -> relu -> maxpool(3x3, stride 2)
//! ```
//!
//! ``conv1`` is either a single 7x7/2 conv with 64 filters, or (``deep_stem``)
//! a [`Sequence`](crate::layers::sequential::Sequence) named ``conv1``:
//!
//! ```text
//! conv3x3/2(stem_width) -> norm -> relu
//!   -> conv3x3(stem_width) -> norm -> relu
//!   -> conv3x3(stem_width * 2)
//! ```
//!
//! The stem reduces resolution by 4.

use crate::compat::normalization_wrapper::{Normalization, NormalizationConfig};
use crate::layers::sequential::{LayerConfig, Node, NodeConfig, NodeMeta};
use crate::models::resnetv1b::util::{
    same_conv2d_config, same_output_resolution, same_padding_config,
};
use burn::nn::Relu;
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::prelude::{Backend, Config, Module, Tensor};

/// The stem's total stride.
pub const STEM_STRIDE: usize = 4;

/// [`ResNetV1bStem`] Meta API.
pub trait StemMeta {
    /// The number of input image channels.
    fn in_channels(&self) -> usize;

    /// The number of output feature planes; the first stage's ``in_planes``.
    fn out_planes(&self) -> usize;

    /// Is ``conv1`` the three-conv deep stem?
    fn is_deep(&self) -> bool;

    /// Get the output resolution for a given input resolution.
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        same_output_resolution(input_resolution, STEM_STRIDE)
    }
}

/// [`ResNetV1bStem`] Config.
#[derive(Config, Debug)]
pub struct ResNetV1bStemConfig {
    /// The number of input image channels.
    #[config(default = 3)]
    pub in_channels: usize,

    /// Replace the 7x7 conv with three 3x3 convs.
    #[config(default = false)]
    pub deep_stem: bool,

    /// The deep stem width; the stem outputs ``stem_width * 2`` planes.
    #[config(default = 32)]
    pub stem_width: usize,

    /// The [`NormalizationConfig`].
    #[config(default = "NormalizationConfig::new()")]
    pub norm: NormalizationConfig,
}

impl StemMeta for ResNetV1bStemConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn out_planes(&self) -> usize {
        if self.deep_stem {
            self.stem_width * 2
        } else {
            64
        }
    }

    fn is_deep(&self) -> bool {
        self.deep_stem
    }
}

impl ResNetV1bStemConfig {
    /// The ``conv1`` node.
    pub fn conv1(&self) -> NodeConfig {
        if !self.deep_stem {
            return same_conv2d_config(self.in_channels, self.out_planes(), 7, 2, 1).into();
        }

        let width = self.stem_width;
        NodeConfig::sequence(
            "conv1",
            vec![
                same_conv2d_config(self.in_channels, width, 3, 2, 1).into(),
                self.norm.with_features(width).into(),
                LayerConfig::Relu.into(),
                same_conv2d_config(width, width, 3, 1, 1).into(),
                self.norm.with_features(width).into(),
                LayerConfig::Relu.into(),
                same_conv2d_config(width, self.out_planes(), 3, 1, 1).into(),
            ],
        )
    }

    /// The 3x3/2 max pool.
    pub fn maxpool(&self) -> MaxPool2dConfig {
        MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(same_padding_config(3, 1))
    }

    /// Initialize a [`ResNetV1bStem`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ResNetV1bStem<B> {
        ResNetV1bStem {
            conv1: self.conv1().init(device),
            bn1: self.norm.with_features(self.out_planes()).init(device),
            relu: Relu::new(),
            maxpool: self.maxpool().init(),
        }
    }
}

/// `ResNetV1b` input stem.
#[derive(Module, Debug)]
pub struct ResNetV1bStem<B: Backend> {
    /// The 7x7 conv, or the ``conv1`` deep stem sequence.
    pub conv1: Node<B>,

    /// Stem norm.
    pub bn1: Normalization<B>,

    /// Stem activation.
    pub relu: Relu,

    /// Stem pool.
    pub maxpool: MaxPool2d,
}

impl<B: Backend> StemMeta for ResNetV1bStem<B> {
    fn in_channels(&self) -> usize {
        self.conv1.in_channels().unwrap_or_default()
    }

    fn out_planes(&self) -> usize {
        self.bn1.num_features()
    }

    fn is_deep(&self) -> bool {
        matches!(self.conv1, Node::Sequence(_))
    }
}

impl<B: Backend> ResNetV1bStem<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_planes, ceil(height/4), ceil(width/4)]`` tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let x = self.conv1.forward(input);
        let x = self.bn1.forward(x);
        let x = self.relu.forward(x);
        self.maxpool.forward(x)
    }
}
