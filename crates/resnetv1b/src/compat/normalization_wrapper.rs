//! # Normalization Wrapper
//!
//! The normalization "factory" for the `ResNetV1b` family.
//!
//! Supports two ``burn::nn`` norm layers:
//! * [`NormKind::Batch`] - [`BatchNorm`]
//! * [`NormKind::Group`] - [`GroupNorm`]; a batch-size independent
//!   replacement for synchronized batch norm.
//!
//! [`NormalizationConfig`] enumerates the options this family uses;
//! [`NormalizationConfig::from_kwargs`] rejects anything else.

use crate::error;
use crate::utility::kwargs::{expect_object, overlay_kwargs};
use burn::nn::{BatchNorm, BatchNormConfig, GroupNorm, GroupNormConfig};
use burn::prelude::{Backend, Config, Module, Tensor};
use serde::{Deserialize, Serialize};

/// Norm layer selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormKind {
    /// [`BatchNorm`] over the channel dimension.
    Batch,

    /// [`GroupNorm`] with the given number of groups.
    Group(usize),
}

/// [`Normalization`] Configuration.
#[derive(Config, Debug)]
pub struct NormalizationConfig {
    /// The norm layer kind.
    #[config(default = "NormKind::Batch")]
    pub kind: NormKind,

    /// The number of features.
    ///
    /// Model builders replace this with the width of the preceding conv.
    #[config(default = 0)]
    pub num_features: usize,

    /// Running statistics momentum; ignored by [`NormKind::Group`].
    ///
    /// Uses the ``burn`` convention: ``running = (1 - momentum) * running + momentum * batch``.
    #[config(default = 0.1)]
    pub momentum: f64,

    /// Numerical stability epsilon.
    #[config(default = 1e-5)]
    pub epsilon: f64,

    /// Initialize the scale (gamma) to zero instead of one.
    #[config(default = false)]
    pub zero_init_gamma: bool,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl NormalizationConfig {
    /// The keyword options accepted by [`Self::from_kwargs`].
    pub const KWARGS: [&'static str; 4] = ["kind", "momentum", "epsilon", "zero_init_gamma"];

    /// Build a config from keyword overrides.
    ///
    /// # Arguments
    ///
    /// - `kwargs`: a JSON object using keys from [`Self::KWARGS`].
    ///
    /// # Returns
    ///
    /// The config, or an error naming the first unrecognized key.
    pub fn from_kwargs(kwargs: serde_json::Value) -> error::Result<Self> {
        let merged = overlay_kwargs(
            "norm",
            &Self::KWARGS,
            serde_json::to_value(Self::new())?,
            expect_object(kwargs)?,
        )?;
        Ok(serde_json::from_value(merged)?)
    }

    /// Adjust a norm config to the feature size.
    pub fn with_features(
        &self,
        num_features: usize,
    ) -> Self {
        self.clone().with_num_features(num_features)
    }

    /// Initialize a [`Normalization`] layer.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Normalization<B> {
        let norm: Normalization<B> = match self.kind {
            NormKind::Batch => BatchNormConfig::new(self.num_features)
                .with_momentum(self.momentum)
                .with_epsilon(self.epsilon)
                .init(device)
                .into(),
            NormKind::Group(num_groups) => GroupNormConfig::new(num_groups, self.num_features)
                .with_epsilon(self.epsilon)
                .init(device)
                .into(),
        };

        if self.zero_init_gamma {
            norm.zero_init_gamma()
        } else {
            norm
        }
    }
}

/// Normalization Layer Wrapper.
#[derive(Module, Debug)]
pub enum Normalization<B: Backend> {
    /// [`BatchNorm`] layer; restricted to `BatchNorm`<2>.
    Batch(BatchNorm<B, 2>),

    /// [`GroupNorm`] layer.
    Group(GroupNorm<B>),
}

impl<B: Backend> From<BatchNorm<B, 2>> for Normalization<B> {
    fn from(norm: BatchNorm<B, 2>) -> Self {
        Self::Batch(norm)
    }
}

impl<B: Backend> From<GroupNorm<B>> for Normalization<B> {
    fn from(norm: GroupNorm<B>) -> Self {
        Self::Group(norm)
    }
}

impl<B: Backend> Normalization<B> {
    /// Forward pass.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        match self {
            Self::Batch(norm) => norm.forward(input),
            Self::Group(norm) => norm.forward(input),
        }
    }

    /// The number of normalized features.
    pub fn num_features(&self) -> usize {
        match self {
            Self::Batch(norm) => norm.gamma.val().dims()[0],
            Self::Group(norm) => norm.num_channels,
        }
    }

    /// The scale parameter, if the layer has one.
    pub fn gamma(&self) -> Option<Tensor<B, 1>> {
        match self {
            Self::Batch(norm) => Some(norm.gamma.val()),
            Self::Group(norm) => norm.gamma.as_ref().map(|gamma| gamma.val()),
        }
    }

    /// Zero the scale parameter.
    ///
    /// Used on the last norm of a residual branch, so the block starts as identity.
    pub fn zero_init_gamma(self) -> Self {
        match self {
            Self::Batch(mut norm) => {
                norm.gamma = norm.gamma.map(|gamma| gamma.zeros_like());
                Self::Batch(norm)
            }
            Self::Group(mut norm) => {
                norm.gamma = norm
                    .gamma
                    .map(|param| param.map(|gamma| gamma.zeros_like()));
                Self::Group(norm)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResNetV1bError;
    use burn::backend::NdArray;
    use serde_json::json;

    type B = NdArray<f32>;

    #[test]
    fn test_config_defaults() {
        let config = NormalizationConfig::new();
        assert_eq!(config.kind, NormKind::Batch);
        assert_eq!(config.num_features, 0);
        assert_eq!(config.momentum, 0.1);
        assert_eq!(config.epsilon, 1e-5);
        assert!(!config.zero_init_gamma);

        let config = config.with_features(32);
        assert_eq!(config.num_features, 32);
    }

    #[test]
    fn test_from_kwargs() {
        let config = NormalizationConfig::from_kwargs(json!({
            "momentum": 0.01,
            "epsilon": 1e-3,
            "kind": {"Group": 8},
        }))
        .unwrap();
        assert_eq!(config.kind, NormKind::Group(8));
        assert_eq!(config.momentum, 0.01);
        assert_eq!(config.epsilon, 1e-3);
        assert!(!config.zero_init_gamma);

        let config = NormalizationConfig::from_kwargs(serde_json::Value::Null).unwrap();
        assert_eq!(config.kind, NormKind::Batch);
    }

    #[test]
    fn test_from_kwargs_rejects_unknown_keys() {
        let err = NormalizationConfig::from_kwargs(json!({"center": false})).unwrap_err();
        assert!(matches!(
            err,
            ResNetV1bError::UnknownOption { scope: "norm", ref key } if key == "center"
        ));

        // Auto-matched; not a caller option.
        let err = NormalizationConfig::from_kwargs(json!({"num_features": 3})).unwrap_err();
        assert!(matches!(err, ResNetV1bError::UnknownOption { .. }));

        let err = NormalizationConfig::from_kwargs(json!({"momentum": "fast"})).unwrap_err();
        assert!(matches!(err, ResNetV1bError::InvalidOptions(_)));
    }

    #[test]
    fn test_batch_norm_init() {
        let device = Default::default();
        let norm: Normalization<B> = NormalizationConfig::new()
            .with_features(6)
            .with_momentum(0.01)
            .init(&device);
        assert_eq!(norm.num_features(), 6);
        match &norm {
            Normalization::Batch(bn) => {
                assert_eq!(bn.momentum, 0.01);
                bn.gamma
                    .val()
                    .to_data()
                    .assert_eq(&Tensor::<B, 1>::ones([6], &device).to_data(), true);
            }
            _ => panic!("expected batch norm"),
        }

        let input = Tensor::<B, 4>::ones([2, 6, 3, 3], &device);
        assert_eq!(norm.forward(input).dims(), [2, 6, 3, 3]);
    }

    #[test]
    fn test_zero_init_gamma() {
        let device = Default::default();
        let zeros = Tensor::<B, 1>::zeros([8], &device).to_data();

        let norm: Normalization<B> = NormalizationConfig::new()
            .with_features(8)
            .with_zero_init_gamma(true)
            .init(&device);
        norm.gamma().unwrap().to_data().assert_eq(&zeros, true);

        let norm: Normalization<B> = NormalizationConfig::new()
            .with_kind(NormKind::Group(4))
            .with_features(8)
            .with_zero_init_gamma(true)
            .init(&device);
        assert!(matches!(norm, Normalization::Group(_)));
        assert_eq!(norm.num_features(), 8);
        norm.gamma().unwrap().to_data().assert_eq(&zeros, true);
    }
}
