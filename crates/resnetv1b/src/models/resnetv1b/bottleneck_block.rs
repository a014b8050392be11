//! # `ResNetV1b` Bottleneck Block
//!
//! [`BottleneckV1b`] is the three-conv `ResNetV1b` residual unit; the
//! stride lives on the 3x3 conv (the "V1b" placement):
//!
//! ```text
//! conv1x1 -> norm -> relu
//!   -> conv3x3(stride, dilation) -> norm -> relu
//!   -> conv1x1(planes * 4) -> norm(zero gamma iff last_gamma)
//!   -> + residual -> relu
//! ```
//!
//! [`BottleneckV1bConfig`] implements [`Config`], and provides
//! [`BottleneckV1bConfig::init`] to initialize a [`BottleneckV1b`].
//!
//! Both implement [`ResidualBlockMeta`].

use crate::compat::normalization_wrapper::{Normalization, NormalizationConfig};
use crate::layers::sequential::{Node, NodeConfig};
use crate::models::resnetv1b::residual_block::{BlockKind, ResidualBlockMeta};
use crate::models::resnetv1b::util::same_conv2d_config;
use burn::nn::Relu;
use burn::nn::conv::Conv2d;
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`BottleneckV1b`] Config.
///
/// Implements [`ResidualBlockMeta`].
#[derive(Config, Debug)]
pub struct BottleneckV1bConfig {
    /// The size of the in channels dimension.
    pub in_planes: usize,

    /// The width of the inner convs; the output is ``planes * 4``.
    pub planes: usize,

    /// The stride of the 3x3 conv.
    #[config(default = 1)]
    pub stride: usize,

    /// Dilation rate of the 3x3 conv.
    #[config(default = 1)]
    pub dilation: usize,

    /// The dilation of the preceding block.
    ///
    /// Recorded for structural parity with [`crate::models::resnetv1b::basic_block::BasicBlockV1b`];
    /// no conv of this block uses it.
    #[config(default = 1)]
    pub previous_dilation: usize,

    /// Optional residual projection.
    #[config(default = "None")]
    pub downsample: Option<NodeConfig>,

    /// The [`NormalizationConfig`]; the feature size will be auto-matched.
    #[config(default = "NormalizationConfig::new()")]
    pub norm: NormalizationConfig,

    /// Zero-initialize the gamma of the last norm.
    #[config(default = false)]
    pub last_gamma: bool,
}

impl ResidualBlockMeta for BottleneckV1bConfig {
    fn kind(&self) -> BlockKind {
        BlockKind::Bottleneck
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

impl BottleneckV1bConfig {
    /// Initialize a [`BottleneckV1b`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> BottleneckV1b<B> {
        let planes = self.planes();
        let out_planes = self.out_planes();

        let bn3 = self
            .norm
            .with_features(out_planes)
            .with_zero_init_gamma(self.last_gamma || self.norm.zero_init_gamma);

        BottleneckV1b {
            previous_dilation: self.previous_dilation,

            conv1: same_conv2d_config(self.in_planes(), planes, 1, 1, 1).init(device),
            bn1: self.norm.with_features(planes).init(device),
            relu1: Relu::new(),

            conv2: same_conv2d_config(planes, planes, 3, self.stride, self.dilation).init(device),
            bn2: self.norm.with_features(planes).init(device),
            relu2: Relu::new(),

            conv3: same_conv2d_config(planes, out_planes, 1, 1, 1).init(device),
            bn3: bn3.init(device),
            relu3: Relu::new(),

            downsample: self.downsample.as_ref().map(|config| config.init(device)),
        }
    }
}

/// `ResNetV1b` Bottleneck Block.
///
/// Implements [`ResidualBlockMeta`].
#[derive(Module, Debug)]
pub struct BottleneckV1b<B: Backend> {
    /// The dilation of the preceding block.
    pub previous_dilation: usize,

    /// 1x1 reduction conv.
    pub conv1: Conv2d<B>,
    /// First norm.
    pub bn1: Normalization<B>,
    /// First activation.
    pub relu1: Relu,

    /// 3x3 conv; carries the stride and dilation.
    pub conv2: Conv2d<B>,
    /// Second norm.
    pub bn2: Normalization<B>,
    /// Second activation.
    pub relu2: Relu,

    /// 1x1 expansion conv.
    pub conv3: Conv2d<B>,
    /// Third norm.
    pub bn3: Normalization<B>,
    /// Post-residual activation.
    pub relu3: Relu,

    /// Optional residual projection.
    pub downsample: Option<Node<B>>,
}

impl<B: Backend> ResidualBlockMeta for BottleneckV1b<B> {
    fn kind(&self) -> BlockKind {
        BlockKind::Bottleneck
    }

    fn in_planes(&self) -> usize {
        self.conv1.weight.dims()[1]
    }

    fn planes(&self) -> usize {
        self.conv1.weight.dims()[0]
    }

    fn out_planes(&self) -> usize {
        self.conv3.weight.dims()[0]
    }

    fn stride(&self) -> usize {
        self.conv2.stride[0]
    }

    fn dilation(&self) -> usize {
        self.conv2.dilation[0]
    }

    fn previous_dilation(&self) -> usize {
        self.previous_dilation
    }

    fn has_downsample(&self) -> bool {
        self.downsample.is_some()
    }
}

impl<B: Backend> BottleneckV1b<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_planes, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, planes * 4, ceil(in_height/stride), ceil(in_width/stride)]`` tensor.
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
        let x = self.relu2.forward(x);

        let x = self.conv3.forward(x);
        let x = self.bn3.forward(x);

        let x = self.relu3.forward(x + identity);

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compat::normalization_wrapper::NormKind;
    use crate::models::resnetv1b::downsample::DownsampleConfig;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type B = NdArray<f32>;

    #[test]
    fn test_bottleneck_config() {
        let config = BottleneckV1bConfig::new(64, 64);
        assert_eq!(config.kind(), BlockKind::Bottleneck);
        assert_eq!(config.expansion_factor(), 4);
        assert_eq!(config.out_planes(), 256);
        assert_eq!(config.stride(), 1);
        assert_eq!(config.dilation(), 1);
        assert_eq!(config.previous_dilation(), 1);
        assert!(!config.has_downsample());
        assert!(!config.last_gamma);
    }

    #[test]
    fn test_bottleneck_init() {
        let device = Default::default();

        let block: BottleneckV1b<B> = BottleneckV1bConfig::new(256, 128)
            .with_stride(2)
            .with_dilation(2)
            .with_previous_dilation(4)
            .with_downsample(Some(
                DownsampleConfig::new(2, 256, 512).with_stride(2).to_node(),
            ))
            .init(&device);

        assert_eq!(block.in_planes(), 256);
        assert_eq!(block.planes(), 128);
        assert_eq!(block.out_planes(), 512);
        assert_eq!(block.stride(), 2);
        assert_eq!(block.dilation(), 2);
        assert_eq!(block.previous_dilation(), 4);
        assert!(block.has_downsample());

        // The 1x1 convs never stride.
        assert_eq!(block.conv1.stride, [1, 1]);
        assert_eq!(block.conv1.kernel_size, [1, 1]);
        assert_eq!(block.conv2.kernel_size, [3, 3]);
        assert_eq!(block.conv3.stride, [1, 1]);
        assert_eq!(block.conv3.weight.dims(), [512, 128, 1, 1]);

        assert_eq!(block.bn1.num_features(), 128);
        assert_eq!(block.bn2.num_features(), 128);
        assert_eq!(block.bn3.num_features(), 512);
    }

    #[test]
    fn test_bottleneck_last_gamma() {
        let device = Default::default();
        let ones = Tensor::<B, 1>::ones([16], &device).to_data();
        let zeros = Tensor::<B, 1>::zeros([16], &device).to_data();

        let block: BottleneckV1b<B> = BottleneckV1bConfig::new(16, 4)
            .with_last_gamma(true)
            .init(&device);
        block.bn3.gamma().unwrap().to_data().assert_eq(&zeros, true);
        block.bn1.gamma().unwrap().to_data().assert_eq(
            &Tensor::<B, 1>::ones([4], &device).to_data(),
            true,
        );

        let block: BottleneckV1b<B> = BottleneckV1bConfig::new(16, 4).init(&device);
        block.bn3.gamma().unwrap().to_data().assert_eq(&ones, true);

        // With a zero last gamma the block reduces to relu(identity).
        let block: BottleneckV1b<B> = BottleneckV1bConfig::new(16, 4)
            .with_last_gamma(true)
            .init(&device);
        let input = Tensor::<B, 4>::random([2, 16, 3, 3], Distribution::Normal(0.0, 1.0), &device);
        block
            .forward(input.clone())
            .to_data()
            .assert_approx_eq::<f32>(
                &burn::tensor::activation::relu(input).to_data(),
                Default::default(),
            );
    }

    #[test]
    fn test_bottleneck_forward() {
        let device = Default::default();
        let batch_size = 2;

        let block: BottleneckV1b<B> = BottleneckV1bConfig::new(8, 4)
            .with_stride(2)
            .with_norm(NormalizationConfig::new().with_kind(NormKind::Group(2)))
            .with_downsample(Some(
                DownsampleConfig::new(1, 8, 16)
                    .with_stride(2)
                    .with_norm(NormalizationConfig::new().with_kind(NormKind::Group(2)))
                    .to_node(),
            ))
            .init(&device);

        let input = Tensor::random([batch_size, 8, 9, 10], Distribution::Default, &device);
        let output = block.forward(input);

        assert_shape_contract!(
            ["batch", "out_channels", "out_height", "out_width"],
            &output,
            &[
                ("batch", batch_size),
                ("out_channels", 16),
                ("out_height", 5),
                ("out_width", 5)
            ],
        );
    }
}
