//! Starstack - registration and stacking of astronomical exposures.
//!
//! Frames of each color channel are normalized, aligned to a reference frame
//! and averaged into a channel stack. The three stacks are then aligned to
//! each other and combined into an RGB composite.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use starstack::{BatchInput, PipelineConfig, run_pipeline};
//!
//! let inputs = ["red", "green", "blue"].map(BatchInput::new);
//! let report = run_pipeline(&inputs, Path::new("m42.png"), &PipelineConfig::default())?;
//! for channel in &report.channels {
//!     println!("{channel}");
//! }
//! ```

pub mod config;
pub mod frame;
pub mod io;
pub mod math;
pub mod merge;
pub mod normalize;
pub mod pipeline;
pub mod reference;
pub mod registration;
pub mod stacking;

#[cfg(test)]
pub mod testing;

// ============================================================================
// Frames and configuration
// ============================================================================

pub use config::{ConfigError, PipelineConfig};
pub use frame::{Channel, ChannelBatch, ChannelFrame, FrameId};
pub use math::DMat3;

// ============================================================================
// Processing steps
// ============================================================================

pub use merge::{
    CompositeImage, MergeError, PlaneAlignment, ReferenceChoice, compose_channels, merge_channels,
    stack_batch,
};
pub use normalize::{normalize_min_max, normalize_to_unit_max};
pub use reference::{rank_by_mean, select_reference};
pub use registration::{
    AlignmentResult, RegistrationError, RegistrationStrategy, Skip, SkipReason, Strategy,
    Transform, TransformType, register_frame, warp,
};
pub use stacking::{ChannelStack, StackAccumulator, StackingError, stack_results};

// ============================================================================
// File I/O and runs
// ============================================================================

pub use io::{
    LoadError, WriteError, list_files, load_batch, load_frame, write_composite, write_fits,
};
pub use pipeline::{
    BatchInput, ChannelReport, ComposeReport, PipelineError, RunReport, StackReport, run_compose,
    run_pipeline, run_stack,
};
