//! # `ResNetV1b` Model Prefabs
//!
//! Twenty-one well-known configurations; depth (18 .. 152) crossed with
//! the stem/downsample family:
//!
//! | family | stem | avg down | stem width | depths |
//! |--------|------|----------|------------|--------|
//! | v1b    | 7x7  | no       | -          | 18, 34, 50, 101, 152 |
//! | v1c    | deep | no       | 32         | 18, 34, 50, 101, 152 |
//! | v1d    | deep | yes      | 32         | 18, 34, 50, 101, 152 |
//! | v1e    | deep | yes      | 64         | 50, 101, 152 |
//! | v1s    | deep | no       | 64         | 50, 101, 152 |
//!
//! Each prefab has a [`ResNetV1bVariant`] entry and a constructor function
//! (``resnet50_v1d(&overrides, &device)``); the caller-settable
//! hyper-parameters are collected in [`ResNetV1bOverrides`].

use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::error::{self, ResNetV1bError};
use crate::models::resnetv1b::residual_block::BlockKind;
use crate::models::resnetv1b::resnet_model::{ResNetV1b, ResNetV1bConfig};
use crate::models::resnetv1b::util::DataFormat;
use crate::utility::kwargs::{expect_object, overlay_kwargs};
use burn::prelude::{Backend, Config};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// [`BlockKind::Basic`] stage depths of `ResNet-18`.
pub const RESNET18_BLOCKS: [usize; 4] = [2, 2, 2, 2];
/// [`BlockKind::Basic`] stage depths of `ResNet-34`.
pub const RESNET34_BLOCKS: [usize; 4] = [3, 4, 6, 3];
/// [`BlockKind::Bottleneck`] stage depths of `ResNet-50`.
pub const RESNET50_BLOCKS: [usize; 4] = [3, 4, 6, 3];
/// [`BlockKind::Bottleneck`] stage depths of `ResNet-101`.
pub const RESNET101_BLOCKS: [usize; 4] = [3, 4, 23, 3];
/// [`BlockKind::Bottleneck`] stage depths of `ResNet-152`.
pub const RESNET152_BLOCKS: [usize; 4] = [3, 8, 36, 3];

/// Caller-settable hyper-parameters shared by all prefabs.
#[derive(Config, Debug)]
pub struct ResNetV1bOverrides {
    /// The number of classification classes.
    #[config(default = 1000)]
    pub classes: usize,

    /// The input tensor layout.
    #[config(default = "DataFormat::ChannelsFirst")]
    pub data_format: DataFormat,

    /// Build the stride-8 dilated variant.
    #[config(default = false)]
    pub dilated: bool,

    /// The [`NormalizationConfig`].
    #[config(default = "NormalizationConfig::new()")]
    pub norm: NormalizationConfig,

    /// Zero-initialize the last norm gamma of each bottleneck block.
    #[config(default = false)]
    pub last_gamma: bool,

    /// Dropout probability before the classifier.
    #[config(default = 0.0)]
    pub final_drop: f64,

    /// The number of input image channels.
    #[config(default = 3)]
    pub in_channels: usize,
}

impl Default for ResNetV1bOverrides {
    fn default() -> Self {
        Self::new()
    }
}

impl ResNetV1bOverrides {
    /// The keyword options accepted by [`Self::from_kwargs`].
    pub const KWARGS: [&'static str; 7] = [
        "classes",
        "data_format",
        "dilated",
        "norm",
        "last_gamma",
        "final_drop",
        "in_channels",
    ];

    /// Build overrides from keyword options.
    ///
    /// ``norm`` is itself a keyword object; see [`NormalizationConfig::from_kwargs`].
    ///
    /// # Errors
    ///
    /// * [`ResNetV1bError::UnknownOption`] for the first unrecognized key,
    ///   at the top level or inside ``norm``.
    /// * [`ResNetV1bError::InvalidOptions`] for values of the wrong type.
    pub fn from_kwargs(kwargs: serde_json::Value) -> error::Result<Self> {
        let mut kwargs = expect_object(kwargs)?;

        let norm = kwargs
            .remove("norm")
            .map(NormalizationConfig::from_kwargs)
            .transpose()?;

        let merged = overlay_kwargs(
            "model",
            &Self::KWARGS,
            serde_json::to_value(Self::new())?,
            kwargs,
        )?;
        let overrides: Self = serde_json::from_value(merged)?;

        Ok(match norm {
            Some(norm) => overrides.with_norm(norm),
            None => overrides,
        })
    }

    /// Apply the overrides to a config.
    pub fn apply(
        &self,
        config: ResNetV1bConfig,
    ) -> ResNetV1bConfig {
        config
            .with_classes(self.classes)
            .with_data_format(self.data_format)
            .with_dilated(self.dilated)
            .with_norm(self.norm.clone())
            .with_last_gamma(self.last_gamma)
            .with_final_drop(self.final_drop)
            .with_in_channels(self.in_channels)
    }
}

/// Network depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResNetDepth {
    /// 18 layers; basic blocks.
    D18,
    /// 34 layers; basic blocks.
    D34,
    /// 50 layers; bottleneck blocks.
    D50,
    /// 101 layers; bottleneck blocks.
    D101,
    /// 152 layers; bottleneck blocks.
    D152,
}

impl ResNetDepth {
    /// The residual block kind.
    pub fn block(&self) -> BlockKind {
        match self {
            Self::D18 | Self::D34 => BlockKind::Basic,
            _ => BlockKind::Bottleneck,
        }
    }

    /// The per-stage block counts.
    pub fn layers(&self) -> [usize; 4] {
        match self {
            Self::D18 => RESNET18_BLOCKS,
            Self::D34 => RESNET34_BLOCKS,
            Self::D50 => RESNET50_BLOCKS,
            Self::D101 => RESNET101_BLOCKS,
            Self::D152 => RESNET152_BLOCKS,
        }
    }
}

/// Stem / downsample family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResNetV1bFamily {
    /// 7x7 stem; strided conv downsample.
    V1b,
    /// Deep stem (width 32); strided conv downsample.
    V1c,
    /// Deep stem (width 32); average pool downsample.
    V1d,
    /// Deep stem (width 64); average pool downsample.
    V1e,
    /// Deep stem (width 64); strided conv downsample.
    V1s,
}

impl ResNetV1bFamily {
    /// The model name prefix.
    pub fn name_prefix(&self) -> &'static str {
        match self {
            Self::V1b => "resnetv1b",
            Self::V1c => "resnetv1c_",
            Self::V1d => "resnetv1d_",
            Self::V1e => "resnetv1e_",
            Self::V1s => "resnetv1s_",
        }
    }

    /// Apply the family's stem and downsample settings.
    pub fn apply(
        &self,
        config: ResNetV1bConfig,
    ) -> ResNetV1bConfig {
        let config = config.with_name_prefix(self.name_prefix().to_string());
        match self {
            Self::V1b => config,
            Self::V1c => config.with_deep_stem(true).with_stem_width(32),
            Self::V1d => config
                .with_deep_stem(true)
                .with_stem_width(32)
                .with_avg_down(true),
            Self::V1e => config
                .with_deep_stem(true)
                .with_stem_width(64)
                .with_avg_down(true),
            Self::V1s => config.with_deep_stem(true).with_stem_width(64),
        }
    }
}

macro_rules! resnetv1b_prefabs {
    ($($variant:ident, $ctor:ident, $name:literal, $depth:ident, $family:ident;)*) => {
        /// The well-known `ResNetV1b` configurations.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum ResNetV1bVariant {
            $(
                #[doc = concat!("``", $name, "``")]
                $variant,
            )*
        }

        impl ResNetV1bVariant {
            /// Every variant.
            pub const ALL: &'static [Self] = &[$(Self::$variant),*];

            /// The variant name.
            pub fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)*
                }
            }

            /// The network depth.
            pub fn depth(&self) -> ResNetDepth {
                match self {
                    $(Self::$variant => ResNetDepth::$depth,)*
                }
            }

            /// The stem / downsample family.
            pub fn family(&self) -> ResNetV1bFamily {
                match self {
                    $(Self::$variant => ResNetV1bFamily::$family,)*
                }
            }
        }

        $(
            #[doc = concat!("Build a ``", $name, "`` model.")]
            pub fn $ctor<B: Backend>(
                overrides: &ResNetV1bOverrides,
                device: &B::Device,
            ) -> error::Result<ResNetV1b<B>> {
                ResNetV1bVariant::$variant.init(overrides, device)
            }
        )*
    };
}

resnetv1b_prefabs! {
    ResNet18V1b, resnet18_v1b, "resnet18_v1b", D18, V1b;
    ResNet34V1b, resnet34_v1b, "resnet34_v1b", D34, V1b;
    ResNet50V1b, resnet50_v1b, "resnet50_v1b", D50, V1b;
    ResNet101V1b, resnet101_v1b, "resnet101_v1b", D101, V1b;
    ResNet152V1b, resnet152_v1b, "resnet152_v1b", D152, V1b;
    ResNet18V1c, resnet18_v1c, "resnet18_v1c", D18, V1c;
    ResNet34V1c, resnet34_v1c, "resnet34_v1c", D34, V1c;
    ResNet50V1c, resnet50_v1c, "resnet50_v1c", D50, V1c;
    ResNet101V1c, resnet101_v1c, "resnet101_v1c", D101, V1c;
    ResNet152V1c, resnet152_v1c, "resnet152_v1c", D152, V1c;
    ResNet18V1d, resnet18_v1d, "resnet18_v1d", D18, V1d;
    ResNet34V1d, resnet34_v1d, "resnet34_v1d", D34, V1d;
    ResNet50V1d, resnet50_v1d, "resnet50_v1d", D50, V1d;
    ResNet101V1d, resnet101_v1d, "resnet101_v1d", D101, V1d;
    ResNet152V1d, resnet152_v1d, "resnet152_v1d", D152, V1d;
    ResNet50V1e, resnet50_v1e, "resnet50_v1e", D50, V1e;
    ResNet101V1e, resnet101_v1e, "resnet101_v1e", D101, V1e;
    ResNet152V1e, resnet152_v1e, "resnet152_v1e", D152, V1e;
    ResNet50V1s, resnet50_v1s, "resnet50_v1s", D50, V1s;
    ResNet101V1s, resnet101_v1s, "resnet101_v1s", D101, V1s;
    ResNet152V1s, resnet152_v1s, "resnet152_v1s", D152, V1s;
}

impl ResNetV1bVariant {
    /// The default config of the variant.
    pub fn to_config(&self) -> ResNetV1bConfig {
        let depth = self.depth();
        self.family()
            .apply(ResNetV1bConfig::new(depth.block(), depth.layers()))
    }

    /// Build the variant config with overrides applied.
    pub fn to_config_with(
        &self,
        overrides: &ResNetV1bOverrides,
    ) -> ResNetV1bConfig {
        overrides.apply(self.to_config())
    }

    /// Initialize the variant.
    pub fn init<B: Backend>(
        &self,
        overrides: &ResNetV1bOverrides,
        device: &B::Device,
    ) -> error::Result<ResNetV1b<B>> {
        self.to_config_with(overrides).init(device)
    }
}

impl Display for ResNetV1bVariant {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ResNetV1bVariant {
    type Err = ResNetV1bError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|variant| variant.name().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| ResNetV1bError::UnknownVariant(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compat::normalization_wrapper::NormKind;
    use crate::layers::sequential::{LayerKind, NodeConfig};
    use crate::layers::sequential::NodeMeta;
    use crate::models::resnetv1b::layer_block::StageMeta;
    use crate::models::resnetv1b::resnet_model::ResNetV1bMeta;
    use crate::models::resnetv1b::residual_block::{ResidualBlockConfig, ResidualBlockMeta};
    use crate::models::resnetv1b::stems::StemMeta;
    use burn::backend::NdArray;
    use burn::prelude::Tensor;
    use serde_json::json;

    #[test]
    fn test_variant_table() {
        assert_eq!(ResNetV1bVariant::ALL.len(), 21);

        for variant in ResNetV1bVariant::ALL {
            let parsed: ResNetV1bVariant = variant.name().parse().unwrap();
            assert_eq!(parsed, *variant);
            assert_eq!(variant.to_string(), variant.name());

            let config = variant.to_config();
            assert_eq!(config.block, variant.depth().block());
            assert_eq!(config.layers, variant.depth().layers());
            assert_eq!(config.name_prefix, variant.family().name_prefix());
            assert_eq!(config.classes, 1000);
            assert!(!config.dilated);
        }

        assert!(matches!(
            "resnet18_v1e".parse::<ResNetV1bVariant>(),
            Err(ResNetV1bError::UnknownVariant(ref name)) if name == "resnet18_v1e"
        ));
        assert_eq!(
            "ResNet50_V1D".parse::<ResNetV1bVariant>().unwrap(),
            ResNetV1bVariant::ResNet50V1d
        );
    }

    #[test]
    fn test_family_configs() {
        let config = ResNetV1bVariant::ResNet50V1b.to_config();
        assert_eq!(config.name_prefix, "resnetv1b");
        assert!(!config.deep_stem);
        assert!(!config.avg_down);

        let config = ResNetV1bVariant::ResNet50V1c.to_config();
        assert_eq!(config.name_prefix, "resnetv1c_");
        assert!(config.deep_stem);
        assert_eq!(config.stem_width, 32);
        assert!(!config.avg_down);

        let config = ResNetV1bVariant::ResNet50V1d.to_config();
        assert!(config.deep_stem);
        assert_eq!(config.stem_width, 32);
        assert!(config.avg_down);

        let config = ResNetV1bVariant::ResNet50V1e.to_config();
        assert!(config.deep_stem);
        assert_eq!(config.stem_width, 64);
        assert!(config.avg_down);

        let config = ResNetV1bVariant::ResNet101V1s.to_config();
        assert_eq!(config.layers, RESNET101_BLOCKS);
        assert!(config.deep_stem);
        assert_eq!(config.stem_width, 64);
        assert!(!config.avg_down);
    }

    #[test]
    fn test_resnet50_v1d_structure() {
        let structure = ResNetV1bVariant::ResNet50V1d
            .to_config()
            .to_structure()
            .unwrap();

        assert_eq!(structure.stem.out_planes(), 64);
        assert_eq!(structure.stem.conv1().name(), Some("conv1"));
        for (idx, stage) in structure.stages().into_iter().enumerate() {
            let ResidualBlockConfig::Bottleneck(first) = &stage.blocks[0] else {
                panic!("expected a bottleneck");
            };
            let down = first.downsample.as_ref().unwrap();
            assert_eq!(down.name(), Some(format!("down{}", idx + 1).as_str()));
            assert_eq!(down.layer_kinds()[0], LayerKind::AvgPool2dSame);
        }
        assert_eq!(
            structure.stages().map(|s| s.out_planes()),
            [256, 512, 1024, 2048]
        );
    }

    fn downsample_of(block: &ResidualBlockConfig) -> Option<&NodeConfig> {
        match block {
            ResidualBlockConfig::Basic(config) => config.downsample.as_ref(),
            ResidualBlockConfig::Bottleneck(config) => config.downsample.as_ref(),
        }
    }

    #[test]
    fn test_resnet50_v1b_prefab() {
        type B = NdArray<f32>;
        let device = Default::default();

        let overrides = ResNetV1bOverrides::new().with_classes(1000);
        let structure = ResNetV1bVariant::ResNet50V1b
            .to_config_with(&overrides)
            .to_structure()
            .unwrap();

        let conv1 = structure.stem.conv1();
        assert!(!structure.stem.is_deep());
        assert_eq!(conv1.name(), None);
        assert_eq!(conv1.layer_kinds(), vec![LayerKind::Conv2d]);
        assert_eq!(conv1.out_channels(), Some(64));
        assert_eq!(structure.stages().map(|s| s.len()), RESNET50_BLOCKS);
        assert_eq!(structure.fc.d_output, 1000);

        let model: ResNetV1b<B> = resnet50_v1b(&overrides, &device).unwrap();
        assert_eq!(model.name(), "resnetv1b");
        assert!(!model.stem.is_deep());
        assert_eq!(model.stages().map(|s| s.len()), [3, 4, 6, 3]);
        assert_eq!(model.num_classes(), 1000);
        assert_eq!(model.fc.weight.dims(), [2048, 1000]);
    }

    #[test]
    fn test_resnet101_v1c_v1d_differ_only_in_downsample() {
        let v1c = ResNetV1bVariant::ResNet101V1c
            .to_config()
            .to_structure()
            .unwrap();
        let v1d = ResNetV1bVariant::ResNet101V1d
            .to_config()
            .to_structure()
            .unwrap();

        assert!(v1c.stem.is_deep() && v1d.stem.is_deep());
        assert_eq!(v1c.stem.conv1().to_string(), v1d.stem.conv1().to_string());
        assert_eq!(v1c.stages().map(|s| s.len()), [3, 4, 23, 3]);
        assert_eq!(v1d.stages().map(|s| s.len()), [3, 4, 23, 3]);
        assert_eq!(v1c.fc.to_string(), v1d.fc.to_string());

        for (c_stage, d_stage) in v1c.stages().into_iter().zip(v1d.stages()) {
            for (c, d) in c_stage.blocks.iter().zip(d_stage.blocks.iter()) {
                assert_eq!(c.kind(), d.kind());
                assert_eq!(c.in_planes(), d.in_planes());
                assert_eq!(c.planes(), d.planes());
                assert_eq!(c.out_planes(), d.out_planes());
                assert_eq!(c.stride(), d.stride());
                assert_eq!(c.dilation(), d.dilation());
                assert_eq!(c.previous_dilation(), d.previous_dilation());
                assert_eq!(c.has_downsample(), d.has_downsample());

                match (downsample_of(c), downsample_of(d)) {
                    (None, None) => {}
                    (Some(c_down), Some(d_down)) => {
                        assert_eq!(c_down.layer_kinds(), vec![LayerKind::Conv2d, LayerKind::Norm]);
                        assert_eq!(
                            d_down.layer_kinds(),
                            vec![LayerKind::AvgPool2dSame, LayerKind::Conv2d, LayerKind::Norm]
                        );
                        assert_eq!(c_down.stride(), d_down.stride());
                        assert_eq!(c_down.out_channels(), d_down.out_channels());
                    }
                    _ => panic!("downsample presence differs"),
                }
            }
        }
    }

    #[test]
    fn test_overrides_from_kwargs() {
        let overrides = ResNetV1bOverrides::from_kwargs(json!({
            "classes": 21,
            "dilated": true,
            "data_format": "ChannelsLast",
            "norm": {"momentum": 0.01, "kind": {"Group": 32}},
            "last_gamma": true,
        }))
        .unwrap();
        assert_eq!(overrides.classes, 21);
        assert!(overrides.dilated);
        assert_eq!(overrides.data_format, DataFormat::ChannelsLast);
        assert_eq!(overrides.norm.kind, NormKind::Group(32));
        assert_eq!(overrides.norm.momentum, 0.01);
        assert!(overrides.last_gamma);
        assert_eq!(overrides.final_drop, 0.0);
        assert_eq!(overrides.in_channels, 3);

        let config = ResNetV1bVariant::ResNet101V1b.to_config_with(&overrides);
        assert_eq!(config.classes, 21);
        assert!(config.dilated);
        assert_eq!(config.feature_stride(), 8);
        assert_eq!(config.name_prefix, "resnetv1b");

        let defaults = ResNetV1bOverrides::from_kwargs(serde_json::Value::Null).unwrap();
        assert_eq!(defaults.to_string(), ResNetV1bOverrides::new().to_string());
    }

    #[test]
    fn test_overrides_reject_unknown_keys() {
        let err = ResNetV1bOverrides::from_kwargs(json!({"num_classes": 10})).unwrap_err();
        assert!(matches!(
            err,
            ResNetV1bError::UnknownOption { scope: "model", ref key } if key == "num_classes"
        ));

        let err =
            ResNetV1bOverrides::from_kwargs(json!({"norm": {"gamma_initializer": "zeros"}}))
                .unwrap_err();
        assert!(matches!(
            err,
            ResNetV1bError::UnknownOption { scope: "norm", ref key } if key == "gamma_initializer"
        ));

        let err = ResNetV1bOverrides::from_kwargs(json!({"classes": "many"})).unwrap_err();
        assert!(matches!(err, ResNetV1bError::InvalidOptions(_)));

        let err = ResNetV1bOverrides::from_kwargs(json!([1, 2])).unwrap_err();
        assert!(matches!(err, ResNetV1bError::InvalidOptions(_)));
    }

    #[test]
    fn test_prefab_constructor() {
        type B = NdArray<f32>;
        let device = Default::default();

        let overrides = ResNetV1bOverrides::new()
            .with_classes(6)
            .with_data_format(DataFormat::ChannelsLast);
        let model: ResNetV1b<B> = resnet18_v1d(&overrides, &device).unwrap();

        assert_eq!(model.name(), "resnetv1d_");
        assert_eq!(model.num_classes(), 6);
        assert!(model.stem.is_deep());
        assert_eq!(model.stages().map(|s| s.len()), RESNET18_BLOCKS);

        let input = Tensor::<B, 4>::ones([1, 32, 32, 3], &device);
        assert_eq!(model.forward(input).dims(), [1, 6]);
    }
}
