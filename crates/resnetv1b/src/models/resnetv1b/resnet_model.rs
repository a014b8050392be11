//! # `ResNetV1b` Core Model
//!
//! ```text
//! stem -> layer1 -> layer2 -> layer3 -> layer4
//!   -> global avgpool -> flatten -> [dropout] -> fc
//! ```
//!
//! [`ResNetV1bConfig`] is the hyper-parameter view of a network;
//! [`ResNetV1bConfig::to_structure`] plans the full layer graph as a
//! [`ResNetV1bStructureConfig`] without touching a device, and
//! [`ResNetV1bStructureConfig::init`] builds the [`ResNetV1b`] module.
//!
//! The ``dilated`` variant keeps stages 3 and 4 at stride 1 (dilations 2 and 4),
//! so the final feature map has stride 8 instead of 32; this is the
//! usual dense-prediction backbone.

use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::error;
use crate::models::resnetv1b::layer_block::{Stage, StageConfig, StageMeta, StagePlanConfig};
use crate::models::resnetv1b::residual_block::BlockKind;
use crate::models::resnetv1b::stems::{
    ResNetV1bStem, ResNetV1bStemConfig, STEM_STRIDE, StemMeta,
};
use crate::models::resnetv1b::util::{DataFormat, same_output_resolution};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::module::Ignored;
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::{Backend, Config, Module, Tensor};

/// Per-stage ``planes``.
pub const STAGE_PLANES: [usize; 4] = [64, 128, 256, 512];

/// [`ResNetV1b`] Meta API.
pub trait ResNetV1bMeta {
    /// The model name prefix.
    fn name(&self) -> &str;

    /// The input tensor layout.
    fn data_format(&self) -> DataFormat;

    /// The number of input image channels.
    fn in_channels(&self) -> usize;

    /// The number of output classes.
    fn num_classes(&self) -> usize;

    /// The number of planes of the final feature map.
    fn feature_planes(&self) -> usize;

    /// The total stride of the final feature map; 32, or 8 when dilated.
    fn feature_stride(&self) -> usize;

    /// Get the final feature map resolution for a given input resolution.
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        same_output_resolution(input_resolution, self.feature_stride())
    }
}

/// [`ResNetV1b`] Config.
#[derive(Config, Debug)]
pub struct ResNetV1bConfig {
    /// The residual block kind.
    pub block: BlockKind,

    /// The number of blocks in each stage.
    pub layers: [usize; 4],

    /// The number of classification classes.
    #[config(default = 1000)]
    pub classes: usize,

    /// The input tensor layout.
    #[config(default = "DataFormat::ChannelsFirst")]
    pub data_format: DataFormat,

    /// Keep stages 3 and 4 at stride 1, using dilations 2 and 4.
    #[config(default = false)]
    pub dilated: bool,

    /// The [`NormalizationConfig`]; feature sizes are auto-matched.
    #[config(default = "NormalizationConfig::new()")]
    pub norm: NormalizationConfig,

    /// Zero-initialize the last norm gamma of each bottleneck block.
    #[config(default = false)]
    pub last_gamma: bool,

    /// Replace the 7x7 stem conv with three 3x3 convs.
    #[config(default = false)]
    pub deep_stem: bool,

    /// The deep stem width.
    #[config(default = 32)]
    pub stem_width: usize,

    /// Downsample residuals with average pooling instead of strided convs.
    #[config(default = false)]
    pub avg_down: bool,

    /// Dropout probability before the classifier; ``0.0`` disables the layer.
    #[config(default = 0.0)]
    pub final_drop: f64,

    /// The model name prefix.
    #[config(default = "String::new()")]
    pub name_prefix: String,

    /// The number of input image channels.
    #[config(default = 3)]
    pub in_channels: usize,
}

impl ResNetV1bMeta for ResNetV1bConfig {
    fn name(&self) -> &str {
        &self.name_prefix
    }

    fn data_format(&self) -> DataFormat {
        self.data_format
    }

    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn num_classes(&self) -> usize {
        self.classes
    }

    fn feature_planes(&self) -> usize {
        STAGE_PLANES[3] * self.block.expansion()
    }

    fn feature_stride(&self) -> usize {
        if self.dilated {
            STEM_STRIDE * 2
        } else {
            STEM_STRIDE * 8
        }
    }
}

impl ResNetV1bConfig {
    /// The [`ResNetV1bStemConfig`].
    pub fn stem(&self) -> ResNetV1bStemConfig {
        ResNetV1bStemConfig::new()
            .with_in_channels(self.in_channels)
            .with_deep_stem(self.deep_stem)
            .with_stem_width(self.stem_width)
            .with_norm(self.norm.clone())
    }

    /// The four stage descriptions.
    pub fn stage_plans(&self) -> [StagePlanConfig; 4] {
        let (strides, dilations) = if self.dilated {
            ([1, 2, 1, 1], [1, 1, 2, 4])
        } else {
            ([1, 2, 2, 2], [1, 1, 1, 1])
        };

        std::array::from_fn(|idx| {
            StagePlanConfig::new(idx + 1, self.block, STAGE_PLANES[idx], self.layers[idx])
                .with_stride(strides[idx])
                .with_dilation(dilations[idx])
                .with_avg_down(self.avg_down)
                .with_norm(self.norm.clone())
                .with_last_gamma(self.last_gamma)
        })
    }

    /// Plan the full structure.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::error::ResNetV1bError::EmptyStage`] and
    /// [`crate::error::ResNetV1bError::UnsupportedDilation`] from stage building.
    pub fn to_structure(&self) -> error::Result<ResNetV1bStructureConfig> {
        let stem = self.stem();

        let [plan1, plan2, plan3, plan4] = self.stage_plans();
        let (layer1, in_planes) = plan1.build(stem.out_planes())?;
        let (layer2, in_planes) = plan2.build(in_planes)?;
        let (layer3, in_planes) = plan3.build(in_planes)?;
        let (layer4, in_planes) = plan4.build(in_planes)?;

        Ok(ResNetV1bStructureConfig {
            data_format: self.data_format,
            name_prefix: self.name_prefix.clone(),
            stem,
            layer1,
            layer2,
            layer3,
            layer4,
            final_drop: self.final_drop,
            fc: LinearConfig::new(in_planes, self.classes),
        })
    }

    /// Initialize a [`ResNetV1b`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> error::Result<ResNetV1b<B>> {
        let model = self.to_structure()?.init(device);

        tracing::info!(
            name = self.name(),
            block = ?self.block,
            layers = ?self.layers,
            classes = self.classes,
            dilated = self.dilated,
            deep_stem = self.deep_stem,
            avg_down = self.avg_down,
            feature_stride = self.feature_stride(),
            "built ResNetV1b"
        );

        Ok(model)
    }
}

/// [`ResNetV1b`] structure config.
///
/// The fully planned layer graph.
#[derive(Config, Debug)]
pub struct ResNetV1bStructureConfig {
    /// The input tensor layout.
    pub data_format: DataFormat,

    /// The model name prefix.
    pub name_prefix: String,

    /// The input stem.
    pub stem: ResNetV1bStemConfig,

    /// Stage 1.
    pub layer1: StageConfig,
    /// Stage 2.
    pub layer2: StageConfig,
    /// Stage 3.
    pub layer3: StageConfig,
    /// Stage 4.
    pub layer4: StageConfig,

    /// Dropout probability before the classifier.
    pub final_drop: f64,

    /// The classifier.
    pub fc: LinearConfig,
}

impl ResNetV1bStructureConfig {
    /// The stages, in order.
    pub fn stages(&self) -> [&StageConfig; 4] {
        [&self.layer1, &self.layer2, &self.layer3, &self.layer4]
    }

    /// Initialize a [`ResNetV1b`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ResNetV1b<B> {
        ResNetV1b {
            data_format: Ignored(self.data_format),
            name_prefix: Ignored(self.name_prefix.clone()),

            stem: self.stem.init(device),

            layer1: self.layer1.init(device),
            layer2: self.layer2.init(device),
            layer3: self.layer3.init(device),
            layer4: self.layer4.init(device),

            avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            drop: (self.final_drop > 0.0).then(|| DropoutConfig::new(self.final_drop).init()),
            fc: self.fc.init(device),
        }
    }
}

/// `ResNetV1b` model.
#[derive(Module, Debug)]
pub struct ResNetV1b<B: Backend> {
    /// The input tensor layout.
    pub data_format: Ignored<DataFormat>,

    /// The model name prefix.
    pub name_prefix: Ignored<String>,

    /// The input stem.
    pub stem: ResNetV1bStem<B>,

    /// Stage 1.
    pub layer1: Stage<B>,
    /// Stage 2.
    pub layer2: Stage<B>,
    /// Stage 3.
    pub layer3: Stage<B>,
    /// Stage 4.
    pub layer4: Stage<B>,

    /// Global average pool.
    pub avgpool: AdaptiveAvgPool2d,

    /// Optional dropout before the classifier.
    pub drop: Option<Dropout>,

    /// The classifier.
    pub fc: Linear<B>,
}

impl<B: Backend> ResNetV1bMeta for ResNetV1b<B> {
    fn name(&self) -> &str {
        &self.name_prefix.0
    }

    fn data_format(&self) -> DataFormat {
        self.data_format.0
    }

    fn in_channels(&self) -> usize {
        self.stem.in_channels()
    }

    fn num_classes(&self) -> usize {
        self.fc.weight.dims()[1]
    }

    fn feature_planes(&self) -> usize {
        self.layer4.out_planes()
    }

    fn feature_stride(&self) -> usize {
        self.stages()
            .iter()
            .fold(STEM_STRIDE, |acc, stage| acc * stage.stride())
    }
}

impl<B: Backend> ResNetV1b<B> {
    /// The stages, in order.
    pub fn stages(&self) -> [&Stage<B>; 4] {
        [&self.layer1, &self.layer2, &self.layer3, &self.layer4]
    }

    /// Convert the input to ``[batch, channels, height, width]``.
    fn channels_first(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let x = match self.data_format() {
            DataFormat::ChannelsFirst => input,
            DataFormat::ChannelsLast => input.permute([0, 3, 1, 2]),
        };

        assert_shape_contract_periodically!(
            ["batch", "in_channels", "height", "width"],
            &x,
            &[("in_channels", self.in_channels())]
        );

        x
    }

    /// Apply the stem and all four stages.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, channels, height, width]``, or
    ///   ``[batch, height, width, channels]`` for [`DataFormat::ChannelsLast`].
    ///
    /// # Returns
    ///
    /// The four stage outputs; stage ``i`` has ``planes[i] * expansion`` channels.
    pub fn forward_stages(
        &self,
        input: Tensor<B, 4>,
    ) -> [Tensor<B, 4>; 4] {
        let x = self.channels_first(input);
        let x = self.stem.forward(x);

        let x1 = self.layer1.forward(x);
        let x2 = self.layer2.forward(x1.clone());
        let x3 = self.layer3.forward(x2.clone());
        let x4 = self.layer4.forward(x3.clone());

        [x1, x2, x3, x4]
    }

    /// Apply the stem and stages; returns the final (pre-pool) feature map.
    ///
    /// # Returns
    ///
    /// A ``[batch, feature_planes, ceil(height/feature_stride), ceil(width/feature_stride)]`` tensor.
    pub fn forward_features(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let x = self.channels_first(input);
        let x = self.stem.forward(x);

        self.stages()
            .iter()
            .fold(x, |x, stage| stage.forward(x))
    }

    /// Apply the classification head to a final feature map.
    pub fn forward_head(
        &self,
        features: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let [batch] = unpack_shape_contract!(
            ["batch", "feature_planes", "height", "width"],
            &features,
            &["batch"],
            &[("feature_planes", self.feature_planes())],
        );

        let x = self.avgpool.forward(features);
        // [B, C, 1, 1] -> [B, C]
        let x = x.flatten(1, 3);
        let x = match &self.drop {
            Some(drop) => drop.forward(x),
            None => x,
        };
        let x = self.fc.forward(x);

        assert_shape_contract_periodically!(
            ["batch", "classes"],
            &x,
            &[("batch", batch), ("classes", self.num_classes())]
        );

        x
    }

    /// `ResNetV1b` forward pass.
    ///
    /// # Returns
    ///
    /// Raw ``[batch, classes]`` logits.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        self.forward_head(self.forward_features(input))
    }
}
