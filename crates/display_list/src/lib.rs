//! Display list recording and replay.
//!
//! A [`DisplayListBuilder`] records drawing commands into a compact word tape.
//! `build()` freezes the tape into an immutable [`DisplayList`] that can be
//! shared across threads and replayed into any [`Dispatcher`]: a renderer, the
//! [`BoundsCalculator`], or another builder.

mod attributes;
mod blend_mode;
mod bounds;
mod builder;
mod dispatcher;
mod display_list;
mod effects;
mod error;
mod op;

pub use attributes::{
    BlurStyle, Color, DrawStyle, ImageSampling, Paint, PointMode, RsTransform, SrcRectConstraint,
    StrokeCap, StrokeJoin, TileMode, VertexMode,
};
pub use blend_mode::BlendMode;
pub use bounds::BoundsCalculator;
pub use builder::DisplayListBuilder;
pub use dispatcher::Dispatcher;
pub use display_list::{DisplayList, Ops};
pub use effects::{
    ColorFilter, ColorSource, Image, ImageFilter, MaskFilter, PathEffect, TextBlob, Vertices,
};
pub use error::{BuildError, DispatchError};
pub use op::{Op, OpCode, TapeObject};

#[cfg(test)]
mod tests;
