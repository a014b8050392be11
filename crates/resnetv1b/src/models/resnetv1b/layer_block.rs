//! # `ResNetV1b` Stages
//!
//! A [`Stage`] is a sequence of [`ResidualBlock`]s.
//!
//! [`StagePlanConfig`] describes a stage the way the network assembler
//! thinks about it (block kind, planes, count, stride, dilation, ...);
//! [`StagePlanConfig::build`] threads the running ``in_planes`` through
//! and produces the concrete per-block [`StageConfig`].
//!
//! [`StageMeta`] defines a common meta API for [`Stage`]
//! and [`StageConfig`].

use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::error::{self, ResNetV1bError};
use crate::layers::sequential::NodeConfig;
use crate::models::resnetv1b::basic_block::BasicBlockV1bConfig;
use crate::models::resnetv1b::bottleneck_block::BottleneckV1bConfig;
use crate::models::resnetv1b::downsample::{DownsampleConfig, downsample_required};
use crate::models::resnetv1b::residual_block::{
    BlockKind, ResidualBlock, ResidualBlockConfig, ResidualBlockMeta,
};
use crate::models::resnetv1b::util::same_output_resolution;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::prelude::{Backend, Module, Tensor};

/// Resolve a stage dilation to the first block's ``(dilation, previous_dilation)``.
///
/// * ``1 => (1, 1)``
/// * ``2 => (2, 2)``
/// * ``4 => (2, 4)``
///
/// Dilation 2 is passed to the first block unchanged; only 4 is reduced.
///
/// # Errors
///
/// [`ResNetV1bError::UnsupportedDilation`] for any other value.
pub fn first_block_dilation(
    stage_index: usize,
    dilation: usize,
) -> error::Result<(usize, usize)> {
    match dilation {
        1 | 2 => Ok((dilation, dilation)),
        4 => Ok((2, dilation)),
        _ => Err(ResNetV1bError::UnsupportedDilation {
            stage: stage_index,
            dilation,
        }),
    }
}

/// High-level stage description.
#[derive(Config, Debug)]
pub struct StagePlanConfig {
    /// The 1-based stage index.
    pub stage_index: usize,

    /// The residual block kind.
    pub kind: BlockKind,

    /// The block ``planes``; the stage outputs ``planes * expansion``.
    pub planes: usize,

    /// The number of blocks.
    pub blocks: usize,

    /// The stride of the first block.
    #[config(default = 1)]
    pub stride: usize,

    /// The stage dilation; one of ``{1, 2, 4}``.
    #[config(default = 1)]
    pub dilation: usize,

    /// Downsample with average pooling instead of a strided conv.
    #[config(default = false)]
    pub avg_down: bool,

    /// The [`NormalizationConfig`].
    #[config(default = "NormalizationConfig::new()")]
    pub norm: NormalizationConfig,

    /// Zero-initialize the last norm gamma of bottleneck blocks.
    #[config(default = false)]
    pub last_gamma: bool,
}

impl StagePlanConfig {
    /// The number of output planes.
    pub fn out_planes(&self) -> usize {
        self.planes * self.kind.expansion()
    }

    /// Build the concrete stage.
    ///
    /// # Arguments
    ///
    /// - `in_planes`: the running input plane count.
    ///
    /// # Returns
    ///
    /// ``(stage, next_in_planes)``; ``next_in_planes = planes * expansion``.
    ///
    /// # Errors
    ///
    /// * [`ResNetV1bError::EmptyStage`] when ``blocks`` is zero.
    /// * [`ResNetV1bError::UnsupportedDilation`] when the dilation is not in ``{1, 2, 4}``.
    pub fn build(
        &self,
        in_planes: usize,
    ) -> error::Result<(StageConfig, usize)> {
        if self.blocks == 0 {
            return Err(ResNetV1bError::EmptyStage {
                stage: self.stage_index,
            });
        }
        let out_planes = self.out_planes();

        let (first_dilation, first_previous) =
            first_block_dilation(self.stage_index, self.dilation)?;

        let mut downsample = downsample_required(in_planes, out_planes, self.stride).then(|| {
            DownsampleConfig::new(self.stage_index, in_planes, out_planes)
                .with_stride(self.stride)
                .with_dilation(self.dilation)
                .with_avg_down(self.avg_down)
                .with_norm(self.norm.clone())
                .to_node()
        });

        let blocks = (0..self.blocks)
            .map(|idx| {
                if idx == 0 {
                    self.block(
                        in_planes,
                        self.stride,
                        (first_dilation, first_previous),
                        downsample.take(),
                    )
                } else {
                    self.block(out_planes, 1, (self.dilation, self.dilation), None)
                }
            })
            .collect();

        let stage = StageConfig::new(self.stage_index, blocks);

        tracing::debug!(
            stage = self.stage_index,
            kind = ?self.kind,
            blocks = stage.len(),
            in_planes,
            out_planes,
            stride = self.stride,
            dilation = self.dilation,
            downsample = stage.blocks.first().is_some_and(|b| b.has_downsample()),
            "built stage"
        );

        Ok((stage, out_planes))
    }

    fn block(
        &self,
        in_planes: usize,
        stride: usize,
        (dilation, previous_dilation): (usize, usize),
        downsample: Option<NodeConfig>,
    ) -> ResidualBlockConfig {
        match self.kind {
            BlockKind::Basic => BasicBlockV1bConfig::new(in_planes, self.planes)
                .with_stride(stride)
                .with_dilation(dilation)
                .with_previous_dilation(previous_dilation)
                .with_downsample(downsample)
                .with_norm(self.norm.clone())
                .into(),
            BlockKind::Bottleneck => BottleneckV1bConfig::new(in_planes, self.planes)
                .with_stride(stride)
                .with_dilation(dilation)
                .with_previous_dilation(previous_dilation)
                .with_downsample(downsample)
                .with_norm(self.norm.clone())
                .with_last_gamma(self.last_gamma)
                .into(),
        }
    }
}

/// [`Stage`] Meta API.
pub trait StageMeta {
    /// The number of blocks.
    fn len(&self) -> usize;

    /// Check if the stage is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of input feature planes.
    fn in_planes(&self) -> usize;

    /// The number of output feature planes.
    fn out_planes(&self) -> usize;

    /// Get the effective stride of the stage.
    fn stride(&self) -> usize;

    /// The dilation applied by the trailing blocks.
    fn dilation(&self) -> usize;

    /// Get the output resolution for a given input resolution.
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        same_output_resolution(input_resolution, self.stride())
    }
}

/// [`Stage`] Configuration.
#[derive(Config, Debug)]
pub struct StageConfig {
    /// The 1-based stage index.
    pub stage_index: usize,

    /// The component blocks.
    pub blocks: Vec<ResidualBlockConfig>,
}

impl StageMeta for StageConfig {
    fn len(&self) -> usize {
        self.blocks.len()
    }

    fn in_planes(&self) -> usize {
        self.blocks[0].in_planes()
    }

    fn out_planes(&self) -> usize {
        self.blocks[self.blocks.len() - 1].out_planes()
    }

    fn stride(&self) -> usize {
        self.blocks
            .iter()
            .fold(1, |acc, block| acc * block.stride())
    }

    fn dilation(&self) -> usize {
        self.blocks[self.blocks.len() - 1].dilation()
    }
}

impl StageConfig {
    /// Check if the config is valid.
    ///
    /// # Returns
    ///
    /// A `Result<(), String>`
    pub fn try_validate(&self) -> std::result::Result<(), String> {
        if self.is_empty() {
            return Err(format!("stage {} has no blocks", self.stage_index));
        }

        for idx in 1..self.blocks.len() {
            let prev = &self.blocks[idx - 1];
            let curr = &self.blocks[idx];
            if prev.out_planes() != curr.in_planes() {
                return Err(format!(
                    "block[{}].out_planes({}) != block[{}].in_planes({})\n{:#?}",
                    idx - 1,
                    prev.out_planes(),
                    idx,
                    curr.in_planes(),
                    self,
                ));
            }
        }

        for (idx, block) in self.blocks.iter().enumerate() {
            let needs = downsample_required(block.in_planes(), block.out_planes(), block.stride());
            if needs != block.has_downsample() {
                return Err(format!(
                    "block[{idx}] downsample presence ({}) does not match its shape change ({needs})",
                    block.has_downsample(),
                ));
            }
        }

        Ok(())
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        if let Err(err) = self.try_validate() {
            panic!("{}", err)
        }
    }

    /// Initialize a new [`Stage`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Stage<B> {
        self.expect_valid();

        Stage {
            stage_index: self.stage_index,
            blocks: self.blocks.iter().map(|block| block.init(device)).collect(),
        }
    }
}

/// A `ResNetV1b` stage.
#[derive(Module, Debug)]
pub struct Stage<B: Backend> {
    /// The 1-based stage index.
    pub stage_index: usize,

    /// Internal blocks.
    pub blocks: Vec<ResidualBlock<B>>,
}

impl<B: Backend> StageMeta for Stage<B> {
    fn len(&self) -> usize {
        self.blocks.len()
    }

    fn in_planes(&self) -> usize {
        self.blocks[0].in_planes()
    }

    fn out_planes(&self) -> usize {
        self.blocks[self.blocks.len() - 1].out_planes()
    }

    fn stride(&self) -> usize {
        self.blocks
            .iter()
            .fold(1, |acc, block| acc * block.stride())
    }

    fn dilation(&self) -> usize {
        self.blocks[self.blocks.len() - 1].dilation()
    }
}

impl<B: Backend> Stage<B> {
    /// Apply the stage.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_planes, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_planes, out_height, out_width]`` tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, in_height, in_width] = unpack_shape_contract!(
            ["batch", "in_planes", "in_height", "in_width"],
            &input,
            &["batch", "in_height", "in_width"],
            &[("in_planes", self.in_planes())],
        );
        let [out_height, out_width] = self.output_resolution([in_height, in_width]);

        let x = self.blocks.iter().fold(input, |x, block| block.forward(x));

        assert_shape_contract_periodically!(
            ["batch", "out_planes", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("out_planes", self.out_planes()),
                ("out_height", out_height),
                ("out_width", out_width)
            ],
        );

        x
    }
}
