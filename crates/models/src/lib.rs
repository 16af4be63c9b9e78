//! Burn PraNet model for polyp segmentation.
//!
//! Shapes:
//! - Input images: `[B, 3, H, W]`, normalised to 0..1
//! - Every output map: `[B, 1, H, W]` logits, upsampled back to the input size
//!
//! The network follows the parallel reverse attention layout: a strided encoder,
//! a partial decoder over the three deepest stages that produces the global map,
//! and reverse attention stages that refine it from 1/32 down to 1/8 resolution.
//! No pretrained backbone weights are bundled; training starts from random init.

use burn::module::{Ignored, Module};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::PaddingConfig2d;
use burn::tensor::activation::{relu, sigmoid};
use burn::tensor::backend::Backend;
use burn::tensor::module::interpolate;
use burn::tensor::ops::{InterpolateMode, InterpolateOptions};
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Encoder family. Only the stage widths and the input-size limits differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackboneArch {
    Resnet50,
    Mobilenetv2,
}

impl BackboneArch {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackboneArch::Resnet50 => "resnet50",
            BackboneArch::Mobilenetv2 => "mobilenetv2",
        }
    }

    /// Stem width followed by the widths at strides 4, 8, 16 and 32.
    fn widths(&self) -> [usize; 5] {
        match self {
            BackboneArch::Resnet50 => [64, 256, 512, 1024, 2048],
            BackboneArch::Mobilenetv2 => [32, 24, 32, 96, 320],
        }
    }

    /// Exclusive lower and inclusive upper bound on the square input size, if any.
    pub fn input_size_bounds(&self) -> Option<(u32, u32)> {
        match self {
            BackboneArch::Resnet50 => None,
            BackboneArch::Mobilenetv2 => Some((32, 224)),
        }
    }
}

impl fmt::Display for BackboneArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackboneArch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "resnet50" => Ok(BackboneArch::Resnet50),
            "mobilenetv2" => Ok(BackboneArch::Mobilenetv2),
            other => Err(format!(
                "unknown backbone '{other}' (expected resnet50 or mobilenetv2)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PraNetConfig {
    /// Square input size used during training.
    pub img_size: u32,
    /// Channel count of the decoder and attention branches.
    pub filters: usize,
    pub backbone_arch: BackboneArch,
    /// When false, backbone parameters receive no gradients.
    pub backbone_trainable: bool,
    /// Divides every backbone width; 1 keeps the reference widths.
    pub channel_divisor: usize,
}

impl Default for PraNetConfig {
    fn default() -> Self {
        Self {
            img_size: 352,
            filters: 32,
            backbone_arch: BackboneArch::Resnet50,
            backbone_trainable: true,
            channel_divisor: 1,
        }
    }
}

impl PraNetConfig {
    fn stage_widths(&self) -> [usize; 5] {
        let divisor = self.channel_divisor.max(1);
        self.backbone_arch.widths().map(|w| (w / divisor).max(4))
    }
}

/// The four logit maps of one forward pass, coarse to fine.
#[derive(Debug, Clone)]
pub struct SideOutputs<B: Backend> {
    pub global: Tensor<B, 4>,
    pub side4: Tensor<B, 4>,
    pub side3: Tensor<B, 4>,
    pub side2: Tensor<B, 4>,
}

impl<B: Backend> SideOutputs<B> {
    /// The finest map; this is the prediction used for metrics and export.
    pub fn final_map(&self) -> &Tensor<B, 4> {
        &self.side2
    }

    pub fn into_array(self) -> [Tensor<B, 4>; 4] {
        [self.global, self.side4, self.side3, self.side2]
    }

    pub fn map<B2: Backend, F>(self, mut f: F) -> SideOutputs<B2>
    where
        F: FnMut(Tensor<B, 4>) -> Tensor<B2, 4>,
    {
        SideOutputs {
            global: f(self.global),
            side4: f(self.side4),
            side3: f(self.side3),
            side2: f(self.side2),
        }
    }
}

/// Nearest-neighbour upsampling; every backend, NdArray included, can differentiate it.
fn resize<B: Backend>(x: Tensor<B, 4>, size: [usize; 2]) -> Tensor<B, 4> {
    let [_, _, h, w] = x.dims();
    if [h, w] == size {
        return x;
    }
    interpolate(x, size, InterpolateOptions::new(InterpolateMode::Nearest))
}

fn spatial<B: Backend>(x: &Tensor<B, 4>) -> [usize; 2] {
    let [_, _, h, w] = x.dims();
    [h, w]
}

fn conv_layer<B: Backend>(
    channels: [usize; 2],
    kernel: usize,
    stride: usize,
    device: &B::Device,
) -> Conv2d<B> {
    let pad = kernel / 2;
    Conv2dConfig::new(channels, [kernel, kernel])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(pad, pad))
        .init(device)
}

#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(channels: [usize; 2], kernel: usize, stride: usize, device: &B::Device) -> Self {
        Self {
            conv: conv_layer(channels, kernel, stride, device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        relu(self.conv.forward(x))
    }
}

/// Stride-2 downsampling followed by a residual refinement.
#[derive(Module, Debug)]
pub struct EncoderStage<B: Backend> {
    down: ConvBlock<B>,
    refine: Conv2d<B>,
}

impl<B: Backend> EncoderStage<B> {
    pub fn new(channels: [usize; 2], device: &B::Device) -> Self {
        Self {
            down: ConvBlock::new(channels, 3, 2, device),
            refine: conv_layer([channels[1], channels[1]], 3, 1, device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.down.forward(x);
        relu(x.clone() + self.refine.forward(x))
    }
}

pub struct BackboneFeatures<B: Backend> {
    /// Stride 4.
    pub x1: Tensor<B, 4>,
    /// Stride 8.
    pub x2: Tensor<B, 4>,
    /// Stride 16.
    pub x3: Tensor<B, 4>,
    /// Stride 32.
    pub x4: Tensor<B, 4>,
}

#[derive(Module, Debug)]
pub struct Backbone<B: Backend> {
    stem: ConvBlock<B>,
    stage1: EncoderStage<B>,
    stage2: EncoderStage<B>,
    stage3: EncoderStage<B>,
    stage4: EncoderStage<B>,
}

impl<B: Backend> Backbone<B> {
    pub fn new(widths: [usize; 5], device: &B::Device) -> Self {
        Self {
            stem: ConvBlock::new([3, widths[0]], 3, 2, device),
            stage1: EncoderStage::new([widths[0], widths[1]], device),
            stage2: EncoderStage::new([widths[1], widths[2]], device),
            stage3: EncoderStage::new([widths[2], widths[3]], device),
            stage4: EncoderStage::new([widths[3], widths[4]], device),
        }
    }

    pub fn forward(&self, images: Tensor<B, 4>) -> BackboneFeatures<B> {
        let x = self.stem.forward(images);
        let x1 = self.stage1.forward(x);
        let x2 = self.stage2.forward(x1.clone());
        let x3 = self.stage3.forward(x2.clone());
        let x4 = self.stage4.forward(x3.clone());
        BackboneFeatures { x1, x2, x3, x4 }
    }
}

/// Channel reduction ahead of the decoder (a light receptive-field block).
#[derive(Module, Debug)]
pub struct Reduce<B: Backend> {
    squeeze: Conv2d<B>,
    mix: ConvBlock<B>,
}

impl<B: Backend> Reduce<B> {
    pub fn new(in_channels: usize, filters: usize, device: &B::Device) -> Self {
        Self {
            squeeze: conv_layer([in_channels, filters], 1, 1, device),
            mix: ConvBlock::new([filters, filters], 3, 1, device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.mix.forward(self.squeeze.forward(x))
    }
}

/// Aggregates the three deepest reduced features into the global map at stride 8.
#[derive(Module, Debug)]
pub struct PartialDecoder<B: Backend> {
    conv_up1: ConvBlock<B>,
    conv_up2: ConvBlock<B>,
    conv_up3: ConvBlock<B>,
    conv_up4: ConvBlock<B>,
    conv_up5: ConvBlock<B>,
    conv_concat2: ConvBlock<B>,
    conv_concat3: ConvBlock<B>,
    conv4: ConvBlock<B>,
    conv5: Conv2d<B>,
}

impl<B: Backend> PartialDecoder<B> {
    pub fn new(filters: usize, device: &B::Device) -> Self {
        let f = filters;
        Self {
            conv_up1: ConvBlock::new([f, f], 3, 1, device),
            conv_up2: ConvBlock::new([f, f], 3, 1, device),
            conv_up3: ConvBlock::new([f, f], 3, 1, device),
            conv_up4: ConvBlock::new([f, f], 3, 1, device),
            conv_up5: ConvBlock::new([2 * f, 2 * f], 3, 1, device),
            conv_concat2: ConvBlock::new([2 * f, 2 * f], 3, 1, device),
            conv_concat3: ConvBlock::new([3 * f, 3 * f], 3, 1, device),
            conv4: ConvBlock::new([3 * f, 3 * f], 3, 1, device),
            conv5: conv_layer([3 * f, 1], 1, 1, device),
        }
    }

    pub fn forward(&self, x2: Tensor<B, 4>, x3: Tensor<B, 4>, x4: Tensor<B, 4>) -> Tensor<B, 4> {
        let size2 = spatial(&x2);
        let size3 = spatial(&x3);

        let x4_up = resize(x4, size3);
        let x3_1 = self.conv_up1.forward(x4_up.clone()) * x3.clone();
        let x2_1 = self.conv_up2.forward(resize(x4_up.clone(), size2))
            * self.conv_up3.forward(resize(x3, size2))
            * x2;

        let x3_2 = self
            .conv_concat2
            .forward(Tensor::cat(vec![x3_1, self.conv_up4.forward(x4_up)], 1));
        let x2_2 = self.conv_concat3.forward(Tensor::cat(
            vec![x2_1, self.conv_up5.forward(resize(x3_2, size2))],
            1,
        ));

        self.conv5.forward(self.conv4.forward(x2_2))
    }
}

/// Refines a coarser prior by attending to the regions it does not yet cover.
#[derive(Module, Debug)]
pub struct ReverseAttention<B: Backend> {
    squeeze: Conv2d<B>,
    conv1: ConvBlock<B>,
    conv2: ConvBlock<B>,
    head: Conv2d<B>,
    filters: usize,
}

impl<B: Backend> ReverseAttention<B> {
    pub fn new(in_channels: usize, filters: usize, device: &B::Device) -> Self {
        Self {
            squeeze: conv_layer([in_channels, filters], 1, 1, device),
            conv1: ConvBlock::new([filters, filters], 3, 1, device),
            conv2: ConvBlock::new([filters, filters], 3, 1, device),
            head: conv_layer([filters, 1], 3, 1, device),
            filters,
        }
    }

    pub fn forward(&self, features: Tensor<B, 4>, prior: Tensor<B, 4>) -> Tensor<B, 4> {
        let prior = resize(prior, spatial(&features));
        let attention = sigmoid(prior.clone())
            .neg()
            .add_scalar(1.0)
            .repeat_dim(1, self.filters);
        let x = self.squeeze.forward(features) * attention;
        let x = self.conv2.forward(self.conv1.forward(x));
        self.head.forward(x) + prior
    }
}

#[derive(Module, Debug)]
pub struct PraNet<B: Backend> {
    backbone: Backbone<B>,
    reduce2: Reduce<B>,
    reduce3: Reduce<B>,
    reduce4: Reduce<B>,
    decoder: PartialDecoder<B>,
    ra4: ReverseAttention<B>,
    ra3: ReverseAttention<B>,
    ra2: ReverseAttention<B>,
    pub config: Ignored<PraNetConfig>,
}

impl<B: Backend> PraNet<B> {
    pub fn new(config: PraNetConfig, device: &B::Device) -> Self {
        let widths = config.stage_widths();
        let f = config.filters.max(1);
        let backbone = Backbone::new(widths, device);
        let backbone = if config.backbone_trainable {
            backbone
        } else {
            backbone.no_grad()
        };
        Self {
            backbone,
            reduce2: Reduce::new(widths[2], f, device),
            reduce3: Reduce::new(widths[3], f, device),
            reduce4: Reduce::new(widths[4], f, device),
            decoder: PartialDecoder::new(f, device),
            ra4: ReverseAttention::new(widths[4], f, device),
            ra3: ReverseAttention::new(widths[3], f, device),
            ra2: ReverseAttention::new(widths[2], f, device),
            config: Ignored(config),
        }
    }

    /// Backbone features at strides 4 to 32.
    pub fn encode(&self, images: Tensor<B, 4>) -> BackboneFeatures<B> {
        self.backbone.forward(images)
    }

    pub fn forward(&self, images: Tensor<B, 4>) -> SideOutputs<B> {
        let size = spatial(&images);
        let feats = self.encode(images);

        let global = self.decoder.forward(
            self.reduce2.forward(feats.x2.clone()),
            self.reduce3.forward(feats.x3.clone()),
            self.reduce4.forward(feats.x4.clone()),
        );
        let side4 = self.ra4.forward(feats.x4, global.clone());
        let side3 = self.ra3.forward(feats.x3, side4.clone());
        let side2 = self.ra2.forward(feats.x2, side3.clone());

        SideOutputs {
            global: resize(global, size),
            side4: resize(side4, size),
            side3: resize(side3, size),
            side2: resize(side2, size),
        }
    }
}
