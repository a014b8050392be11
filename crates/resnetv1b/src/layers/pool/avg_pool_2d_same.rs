use burn::config::Config;
use burn::module::Module;
use burn::nn::PaddingConfig2d;
use burn::nn::pool::{AvgPool2d, AvgPool2dConfig};
use burn::prelude::{Backend, Tensor};

/// [`AvgPool2dSame`] Config.
#[derive(Config, Debug)]
pub struct AvgPool2dSameConfig {
    /// The size of the pooling window.
    pub kernel_size: [usize; 2],

    /// The stride of the pooling window.
    pub strides: [usize; 2],
}

impl AvgPool2dSameConfig {
    /// Initialize a [`AvgPool2dSame`].
    pub fn init(&self) -> AvgPool2dSame {
        AvgPool2dSame {
            pool: AvgPool2dConfig::new(self.kernel_size)
                .with_strides(self.strides)
                .with_padding(PaddingConfig2d::Explicit(0, 0))
                .init(),
        }
    }
}

/// `AvgPool2dSame`
///
/// TensorFlow-like 'SAME' average pooling: the input is padded
/// asymmetrically (extra row/column at the bottom/right) so that
/// ``out = ceil(in / stride)``; padded cells are excluded from the average.
#[derive(Module, Clone, Debug)]
pub struct AvgPool2dSame {
    pool: AvgPool2d,
}

impl AvgPool2dSame {
    /// The size of the pooling window.
    pub fn kernel_size(&self) -> [usize; 2] {
        self.pool.kernel_size
    }

    /// The stride of the pooling window.
    pub fn stride(&self) -> [usize; 2] {
        self.pool.stride
    }

    /// Forward Pass.
    pub fn forward<B: Backend>(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [_, _, ih, iw] = input.dims();
        let pad_h = get_same_padding(ih, self.pool.kernel_size[0], self.pool.stride[0], 1);
        let pad_w = get_same_padding(iw, self.pool.kernel_size[1], self.pool.stride[1], 1);
        if pad_h == 0 && pad_w == 0 {
            return self.pool.forward(input);
        }

        let padding = (pad_w / 2, pad_w - pad_w / 2, pad_h / 2, pad_h - pad_h / 2);
        let counts = self.pool.forward(input.ones_like().pad(padding, 0.0));
        let sums = self.pool.forward(input.pad(padding, 0.0));

        sums / counts
    }
}

/// Calculate asymmetric TensorFlow-like 'SAME' padding for a convolution.
///
/// # Returns
///
/// The total padding for the dimension; callers split it as
/// ``(pad / 2, pad - pad / 2)``.
pub fn get_same_padding(
    size: usize,
    kernel_size: usize,
    stride: usize,
    dilation: usize,
) -> usize {
    (size.div_ceil(stride).saturating_sub(1) * stride + (kernel_size - 1) * dilation + 1)
        .saturating_sub(size)
}
