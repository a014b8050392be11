//! # Sequential Nodes
//!
//! A [`NodeConfig`] is either a single atomic [`LayerConfig`], or a named
//! [`SequenceConfig`] of nodes, recursively. Multi-step sub-graphs (deep
//! stems, downsample paths) are sequences.
//!
//! Modules are not recursive: [`SequenceConfig::init`] flattens nested
//! sequences, in order, into one [`Sequence`] of [`Layer`]s. The record
//! types `burn` derives for a module must be finite.
//!
//! [`Node::forward`] dispatches on the tag and applies each layer in order.
//! Both sides implement [`NodeMeta`].

use crate::compat::normalization_wrapper::{Normalization, NormalizationConfig};
use crate::layers::pool::{AvgPool2dSame, AvgPool2dSameConfig};
use burn::config::Config;
use burn::module::{Ignored, Module};
use burn::nn::Relu;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::prelude::{Backend, Tensor};

/// The kind of an atomic layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    /// A 2d convolution.
    Conv2d,
    /// A normalization layer.
    Norm,
    /// A ReLU activation.
    Relu,
    /// A 2d max pool.
    MaxPool2d,
    /// A 'SAME' padded 2d average pool.
    AvgPool2dSame,
}

/// Structural meta API shared by nodes and node configs.
pub trait NodeMeta {
    /// The sequence name, for [`Node::Sequence`] nodes.
    fn name(&self) -> Option<&str>;

    /// The kinds of all atomic layers, in application order.
    fn layer_kinds(&self) -> Vec<LayerKind>;

    /// The number of atomic layers.
    fn num_layers(&self) -> usize {
        self.layer_kinds().len()
    }

    /// The input channels of the first conv, if any.
    fn in_channels(&self) -> Option<usize>;

    /// The output channels of the last channel-defining layer, if any.
    fn out_channels(&self) -> Option<usize>;

    /// The product of all layer strides.
    fn stride(&self) -> usize;
}

/// [`Layer`] Config.
#[derive(Config, Debug)]
pub enum LayerConfig {
    /// [`Conv2d`] config.
    Conv2d(Conv2dConfig),

    /// [`Normalization`] config; the feature size must already be matched.
    Norm(NormalizationConfig),

    /// [`Relu`] activation.
    Relu,

    /// [`MaxPool2d`] config.
    MaxPool2d(MaxPool2dConfig),

    /// [`AvgPool2dSame`] config.
    AvgPool2dSame(AvgPool2dSameConfig),
}

impl From<Conv2dConfig> for LayerConfig {
    fn from(config: Conv2dConfig) -> Self {
        Self::Conv2d(config)
    }
}

impl From<NormalizationConfig> for LayerConfig {
    fn from(config: NormalizationConfig) -> Self {
        Self::Norm(config)
    }
}

impl From<MaxPool2dConfig> for LayerConfig {
    fn from(config: MaxPool2dConfig) -> Self {
        Self::MaxPool2d(config)
    }
}

impl From<AvgPool2dSameConfig> for LayerConfig {
    fn from(config: AvgPool2dSameConfig) -> Self {
        Self::AvgPool2dSame(config)
    }
}

impl LayerConfig {
    /// The layer kind.
    pub fn kind(&self) -> LayerKind {
        match self {
            Self::Conv2d(_) => LayerKind::Conv2d,
            Self::Norm(_) => LayerKind::Norm,
            Self::Relu => LayerKind::Relu,
            Self::MaxPool2d(_) => LayerKind::MaxPool2d,
            Self::AvgPool2dSame(_) => LayerKind::AvgPool2dSame,
        }
    }

    /// Input channels, for convs.
    pub fn in_channels(&self) -> Option<usize> {
        match self {
            Self::Conv2d(config) => Some(config.channels[0]),
            _ => None,
        }
    }

    /// Output channels, for channel-defining layers.
    pub fn out_channels(&self) -> Option<usize> {
        match self {
            Self::Conv2d(config) => Some(config.channels[1]),
            Self::Norm(config) => Some(config.num_features),
            _ => None,
        }
    }

    /// The (square) stride of the layer.
    pub fn stride(&self) -> usize {
        match self {
            Self::Conv2d(config) => config.stride[0],
            Self::MaxPool2d(config) => config.strides[0],
            Self::AvgPool2dSame(config) => config.strides[0],
            Self::Norm(_) | Self::Relu => 1,
        }
    }

    /// Initialize a [`Layer`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Layer<B> {
        match self {
            Self::Conv2d(config) => Layer::Conv2d(config.init(device)),
            Self::Norm(config) => Layer::Norm(config.init(device)),
            Self::Relu => Layer::Relu(Relu::new()),
            Self::MaxPool2d(config) => Layer::MaxPool2d(config.init()),
            Self::AvgPool2dSame(config) => Layer::AvgPool2dSame(config.init()),
        }
    }
}

/// An atomic layer.
#[derive(Module, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum Layer<B: Backend> {
    /// [`Conv2d`] layer.
    Conv2d(Conv2d<B>),

    /// [`Normalization`] layer.
    Norm(Normalization<B>),

    /// [`Relu`] layer.
    Relu(Relu),

    /// [`MaxPool2d`] layer.
    MaxPool2d(MaxPool2d),

    /// [`AvgPool2dSame`] layer.
    AvgPool2dSame(AvgPool2dSame),
}

impl<B: Backend> Layer<B> {
    /// The layer kind.
    pub fn kind(&self) -> LayerKind {
        match self {
            Self::Conv2d(_) => LayerKind::Conv2d,
            Self::Norm(_) => LayerKind::Norm,
            Self::Relu(_) => LayerKind::Relu,
            Self::MaxPool2d(_) => LayerKind::MaxPool2d,
            Self::AvgPool2dSame(_) => LayerKind::AvgPool2dSame,
        }
    }

    /// Input channels, for convs.
    pub fn in_channels(&self) -> Option<usize> {
        match self {
            Self::Conv2d(conv) => Some(conv.weight.dims()[1]),
            _ => None,
        }
    }

    /// Output channels, for channel-defining layers.
    pub fn out_channels(&self) -> Option<usize> {
        match self {
            Self::Conv2d(conv) => Some(conv.weight.dims()[0]),
            Self::Norm(norm) => Some(norm.num_features()),
            _ => None,
        }
    }

    /// The (square) stride of the layer.
    pub fn stride(&self) -> usize {
        match self {
            Self::Conv2d(conv) => conv.stride[0],
            Self::MaxPool2d(pool) => pool.stride[0],
            Self::AvgPool2dSame(pool) => pool.stride()[0],
            Self::Norm(_) | Self::Relu(_) => 1,
        }
    }

    /// Forward pass.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        match self {
            Self::Conv2d(conv) => conv.forward(input),
            Self::Norm(norm) => norm.forward(input),
            Self::Relu(relu) => relu.forward(input),
            Self::MaxPool2d(pool) => pool.forward(input),
            Self::AvgPool2dSame(pool) => pool.forward(input),
        }
    }
}

/// [`Sequence`] Config.
#[derive(Config, Debug)]
pub struct SequenceConfig {
    /// The sequence name.
    pub name: String,

    /// The member nodes, in application order.
    pub nodes: Vec<NodeConfig>,
}

impl SequenceConfig {
    /// Initialize a [`Sequence`].
    ///
    /// Nested sequences are flattened into this sequence's layers.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Sequence<B> {
        Sequence {
            name: Ignored(self.name.clone()),
            layers: self
                .nodes
                .iter()
                .flat_map(|node| node.layers())
                .map(|layer| layer.init(device))
                .collect(),
        }
    }
}

/// A named, ordered sequence of layers.
#[derive(Module, Debug)]
pub struct Sequence<B: Backend> {
    /// The sequence name.
    pub name: Ignored<String>,

    /// The flattened layers, in application order.
    pub layers: Vec<Layer<B>>,
}

impl<B: Backend> Sequence<B> {
    /// Apply each layer in order.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        self.layers.iter().fold(input, |x, layer| layer.forward(x))
    }
}

/// [`Node`] Config.
#[derive(Config, Debug)]
pub enum NodeConfig {
    /// A single layer.
    Layer(LayerConfig),

    /// A named sequence of nodes.
    Sequence(SequenceConfig),
}

impl From<LayerConfig> for NodeConfig {
    fn from(config: LayerConfig) -> Self {
        Self::Layer(config)
    }
}

impl From<Conv2dConfig> for NodeConfig {
    fn from(config: Conv2dConfig) -> Self {
        Self::Layer(config.into())
    }
}

impl From<NormalizationConfig> for NodeConfig {
    fn from(config: NormalizationConfig) -> Self {
        Self::Layer(config.into())
    }
}

impl From<MaxPool2dConfig> for NodeConfig {
    fn from(config: MaxPool2dConfig) -> Self {
        Self::Layer(config.into())
    }
}

impl From<AvgPool2dSameConfig> for NodeConfig {
    fn from(config: AvgPool2dSameConfig) -> Self {
        Self::Layer(config.into())
    }
}

impl NodeConfig {
    /// Build a named sequence node.
    pub fn sequence<S: Into<String>>(
        name: S,
        nodes: Vec<NodeConfig>,
    ) -> Self {
        Self::Sequence(SequenceConfig::new(name.into(), nodes))
    }

    /// Initialize a [`Node`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Node<B> {
        match self {
            Self::Layer(config) => Node::Layer(config.init(device)),
            Self::Sequence(config) => Node::Sequence(config.init(device)),
        }
    }

    fn layers(&self) -> Vec<&LayerConfig> {
        match self {
            Self::Layer(layer) => vec![layer],
            Self::Sequence(seq) => seq.nodes.iter().flat_map(|node| node.layers()).collect(),
        }
    }
}

impl NodeMeta for NodeConfig {
    fn name(&self) -> Option<&str> {
        match self {
            Self::Layer(_) => None,
            Self::Sequence(seq) => Some(&seq.name),
        }
    }

    fn layer_kinds(&self) -> Vec<LayerKind> {
        self.layers().into_iter().map(|layer| layer.kind()).collect()
    }

    fn in_channels(&self) -> Option<usize> {
        self.layers()
            .into_iter()
            .find_map(|layer| layer.in_channels())
    }

    fn out_channels(&self) -> Option<usize> {
        self.layers()
            .into_iter()
            .filter_map(|layer| layer.out_channels())
            .last()
    }

    fn stride(&self) -> usize {
        self.layers().into_iter().map(|layer| layer.stride()).product()
    }
}

/// A single [`Layer`] or a named [`Sequence`] of layers.
#[derive(Module, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum Node<B: Backend> {
    /// A single layer.
    Layer(Layer<B>),

    /// A named sequence of layers.
    Sequence(Sequence<B>),
}

impl<B: Backend> Node<B> {
    /// Apply the node; sequences apply their layers in order.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        match self {
            Self::Layer(layer) => layer.forward(input),
            Self::Sequence(seq) => seq.forward(input),
        }
    }

    fn layers(&self) -> Vec<&Layer<B>> {
        match self {
            Self::Layer(layer) => vec![layer],
            Self::Sequence(seq) => seq.layers.iter().collect(),
        }
    }
}

impl<B: Backend> NodeMeta for Node<B> {
    fn name(&self) -> Option<&str> {
        match self {
            Self::Layer(_) => None,
            Self::Sequence(seq) => Some(&seq.name.0),
        }
    }

    fn layer_kinds(&self) -> Vec<LayerKind> {
        self.layers().into_iter().map(|layer| layer.kind()).collect()
    }

    fn in_channels(&self) -> Option<usize> {
        self.layers()
            .into_iter()
            .find_map(|layer| layer.in_channels())
    }

    fn out_channels(&self) -> Option<usize> {
        self.layers()
            .into_iter()
            .filter_map(|layer| layer.out_channels())
            .last()
    }

    fn stride(&self) -> usize {
        self.layers().into_iter().map(|layer| layer.stride()).product()
    }
}
