//! # `ResNetV1b` Utilities
use burn::nn::PaddingConfig2d;
use burn::nn::conv::Conv2dConfig;
use serde::{Deserialize, Serialize};

/// Tensor layout of model inputs.
///
/// ``burn`` convolutions operate on ``[batch, channels, height, width]``;
/// [`DataFormat::ChannelsLast`] inputs are permuted to that layout before the stem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataFormat {
    /// ``[batch, channels, height, width]``.
    #[default]
    ChannelsFirst,

    /// ``[batch, height, width, channels]``.
    ChannelsLast,
}

/// Convert a scalar to a square array.
#[inline(always)]
pub fn scalar_to_array<const D: usize>(v: usize) -> [usize; D] {
    [v; D]
}

/// Symmetric padding which gives TensorFlow 'SAME' output sizes for odd kernels.
///
/// ``padding = dilation * (kernel_size - 1) / 2``
pub fn same_padding_config(
    kernel_size: usize,
    dilation: usize,
) -> PaddingConfig2d {
    let padding = dilation * (kernel_size - 1) / 2;
    PaddingConfig2d::Explicit(padding, padding)
}

/// A bias-free square [`Conv2dConfig`] with 'SAME' padding.
pub fn same_conv2d_config(
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    stride: usize,
    dilation: usize,
) -> Conv2dConfig {
    Conv2dConfig::new([in_channels, out_channels], scalar_to_array(kernel_size))
        .with_stride(scalar_to_array(stride))
        .with_dilation(scalar_to_array(dilation))
        .with_padding(same_padding_config(kernel_size, dilation))
        .with_bias(false)
}

/// Get the 'SAME' output resolution for a given input resolution.
///
/// # Arguments
///
/// - `input_resolution`: ``[height_in, width_in]``.
///
/// # Returns
///
/// ``[ceil(height_in / stride), ceil(width_in / stride)]``
#[inline(always)]
pub fn same_output_resolution(
    input_resolution: [usize; 2],
    stride: usize,
) -> [usize; 2] {
    input_resolution.map(|size| size.div_ceil(stride))
}
