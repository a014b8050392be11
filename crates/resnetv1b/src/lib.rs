#![warn(missing_docs)]
//!# resnetv1b - `ResNetV1b` Models for Burn
//!
//! ## Notable Components
//!
//! * [`compat`] - compat code over ``burn::nn``.
//!   * [`compat::normalization_wrapper::Normalization`] - norm layer abstraction wrapper.
//! * [`error`] - [`error::ResNetV1bError`] and the crate `Result`.
//! * [`layers`] - reusable neural network modules.
//!   * [`layers::pool`] - TensorFlow-like 'SAME' average pooling.
//!   * [`layers::sequential`] - recursive layer / sequence nodes.
//! * [`models`] - complete model families.
//!   * [`models::resnetv1b`] - `ResNetV1b`, `v1c`, `v1d`, `v1e` and `v1s`.
//! * [`utility`] - keyword override helpers.
//!
//! ## Example
//!
//! ```rust,no_run
//! use burn::backend::NdArray;
//! use resnetv1b::models::resnetv1b::{ResNetV1bOverrides, resnet50_v1d};
//!
//! let device = Default::default();
//! let overrides = ResNetV1bOverrides::new().with_classes(10);
//! let model = resnet50_v1d::<NdArray>(&overrides, &device).unwrap();
//! ```

pub mod compat;
pub mod error;
pub mod layers;
pub mod models;
pub mod utility;
