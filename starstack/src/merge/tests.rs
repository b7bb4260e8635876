use glam::DVec2;

use super::*;
use crate::registration::{SkipReason, Strategy, Transform};
use crate::testing::init_tracing;
use crate::testing::synthetic::{
    FrameStyle, Star, StarFieldConfig, generate_stars, noise_frame, render_frame, uniform_noise,
};

const SIZE: usize = 64;

const SHIFTS: [DVec2; 4] = [
    DVec2::new(0.0, 0.0),
    DVec2::new(1.0, 0.5),
    DVec2::new(-1.0, 1.0),
    DVec2::new(0.5, -1.5),
];

fn stars() -> Vec<Star> {
    generate_stars(&StarFieldConfig::default())
}

fn star_frame(offset: DVec2, gain: f32, noise_seed: u64) -> ChannelFrame {
    let style = FrameStyle {
        psf_sigma: 1.5,
        gain,
        noise_seed,
        ..Default::default()
    };
    render_frame(SIZE, SIZE, &stars(), &style, &Transform::translation(offset))
}

/// Four shifted exposures of the field and one structureless frame.
fn channel_batch(channel: Channel, offset: DVec2, gain: f32) -> ChannelBatch {
    let mut frames: Vec<ChannelFrame> = SHIFTS
        .iter()
        .enumerate()
        .map(|(i, shift)| star_frame(offset + *shift, gain, 7 + i as u64))
        .collect();
    frames.push(noise_frame(SIZE, SIZE, 0.1, 99));
    ChannelBatch::from_frames(channel, frames)
}

fn constant_stack(channel: Channel, value: f32) -> ChannelStack {
    ChannelStack {
        channel,
        frame: ChannelFrame::new_filled(2, 2, value),
        frame_count: 1,
        skipped: Vec::new(),
    }
}

#[test]
fn three_channels_stack_and_merge() {
    init_tracing();
    let config = PipelineConfig::default();
    let offsets = [
        (Channel::Red, DVec2::ZERO, 1.0),
        (Channel::Green, DVec2::new(1.0, -0.5), 0.8),
        (Channel::Blue, DVec2::new(-1.5, 1.0), 0.6),
    ];

    let stacks = offsets.map(|(channel, offset, gain)| {
        let batch = channel_batch(channel, offset, gain);
        stack_batch(batch, ReferenceChoice::Brightest, &config).unwrap()
    });

    for stack in &stacks {
        assert_eq!(stack.frame_count, 4, "{} stack", stack.channel);
        assert_eq!(stack.skipped.len(), 1, "{} stack", stack.channel);
        assert_eq!(
            stack.skipped[0].id,
            FrameId::label(format!("{} frame 4", stack.channel))
        );
    }

    let composite = merge_channels(stacks, &config).unwrap();
    assert_eq!((composite.width(), composite.height()), (SIZE, SIZE));
    assert!(matches!(
        composite.alignment(Channel::Red),
        PlaneAlignment::Reference
    ));
    for channel in [Channel::Green, Channel::Blue] {
        assert!(
            matches!(composite.alignment(channel), PlaneAlignment::Aligned { .. }),
            "{channel}: {:?}",
            composite.alignment(channel)
        );
    }
}

#[test]
fn unusable_brightest_frame_gives_way_to_the_next() {
    let batch = channel_batch(Channel::Red, DVec2::ZERO, 1.0);
    let normalized: Vec<_> = batch
        .frames
        .iter()
        .map(|(_, frame)| normalize_min_max(frame))
        .collect();
    assert_eq!(select_reference(&normalized), Some(4));

    let stack = stack_batch(batch, ReferenceChoice::Brightest, &PipelineConfig::default()).unwrap();
    assert_eq!(stack.frame_count, 4);
    assert_eq!(stack.skipped.len(), 1);
    assert_eq!(stack.skipped[0].id, FrameId::label("red frame 4"));
    assert!(matches!(
        stack.skipped[0].reason,
        SkipReason::Registration(RegistrationError::InsufficientStars { .. })
    ));
}

#[test]
fn no_usable_reference_skips_the_whole_batch() {
    let frames = (0..3).map(|seed| noise_frame(SIZE, SIZE, 0.1, seed)).collect();
    let batch = ChannelBatch::from_frames(Channel::Green, frames);

    match stack_batch(batch, ReferenceChoice::Brightest, &PipelineConfig::default()) {
        Err(StackingError::EmptyStack { channel, skipped }) => {
            assert_eq!(channel, Channel::Green);
            let ids: Vec<_> = skipped.iter().map(|skip| skip.id.to_string()).collect();
            assert_eq!(ids, ["green frame 0", "green frame 1", "green frame 2"]);
        }
        other => panic!("unexpected result {other:?}"),
    }
}

#[test]
fn load_failures_count_as_skips() {
    let mut batch = ChannelBatch::from_frames(
        Channel::Red,
        vec![star_frame(DVec2::ZERO, 1.0, 1), star_frame(SHIFTS[1], 1.0, 2)],
    );
    let missing = FrameId::label("missing.fits");
    batch.skipped.push(Skip::new(
        missing.clone(),
        RegistrationError::InsufficientStars {
            found: 0,
            required: 6,
        },
    ));

    let stack = stack_batch(batch, ReferenceChoice::Brightest, &PipelineConfig::default()).unwrap();
    assert_eq!(stack.frame_count, 2);
    assert_eq!(stack.skipped.len(), 1);
    assert_eq!(stack.skipped[0].id, missing);
}

#[test]
fn external_reference_does_not_contribute() {
    let batch = ChannelBatch::from_frames(
        Channel::Blue,
        vec![star_frame(DVec2::ZERO, 1.0, 1), star_frame(DVec2::ZERO, 1.0, 2)],
    );
    let reference = ReferenceChoice::Frame {
        id: FrameId::label("master"),
        frame: star_frame(DVec2::ZERO, 3.0, 3),
    };

    let stack = stack_batch(batch, reference, &PipelineConfig::default()).unwrap();
    assert_eq!(stack.frame_count, 2);
    assert!(stack.skipped.is_empty());
    let max = stack.frame.pixels().iter().fold(0.0f32, |m, &v| m.max(v));
    assert!(max < 1.5, "external frame leaked into the mean, max {max}");
}

#[test]
fn member_reference_is_used_as_is() {
    let frames = vec![
        star_frame(DVec2::ZERO, 1.0, 1),
        star_frame(SHIFTS[2], 1.0, 2),
        star_frame(SHIFTS[3], 1.0, 3),
    ];
    let chosen = frames[1].clone();
    let batch = ChannelBatch::from_frames(Channel::Red, frames);
    let reference = ReferenceChoice::Frame {
        id: FrameId::label("red frame 1"),
        frame: chosen,
    };

    let stack = stack_batch(batch, reference, &PipelineConfig::default()).unwrap();
    assert_eq!(stack.frame_count, 3);
    assert!(stack.skipped.is_empty());
}

#[test]
fn empty_batch_is_an_empty_stack() {
    let batch = ChannelBatch::new(Channel::Red);
    let result = stack_batch(batch, ReferenceChoice::Brightest, &PipelineConfig::default());
    assert!(matches!(result, Err(StackingError::EmptyStack { .. })));
}

#[test]
fn failed_plane_falls_back_to_unaligned_data() {
    let config = PipelineConfig::default();
    let noise = uniform_noise(SIZE, SIZE, 4);
    let stacks = [
        ChannelStack {
            channel: Channel::Red,
            frame: star_frame(DVec2::ZERO, 1.0, 1),
            frame_count: 1,
            skipped: Vec::new(),
        },
        ChannelStack {
            channel: Channel::Green,
            frame: star_frame(DVec2::new(1.0, 1.0), 1.0, 2),
            frame_count: 1,
            skipped: Vec::new(),
        },
        ChannelStack {
            channel: Channel::Blue,
            frame: noise.clone(),
            frame_count: 1,
            skipped: Vec::new(),
        },
    ];

    let composite = merge_channels(stacks, &config).unwrap();
    assert!(!composite.alignment(Channel::Green).is_fallback());
    match composite.alignment(Channel::Blue) {
        PlaneAlignment::Unaligned {
            failure: MergeError::CrossChannelAlignmentFailure { channel, .. },
        } => assert_eq!(*channel, Channel::Blue),
        other => panic!("unexpected alignment {other:?}"),
    }
    assert_eq!(composite.plane(Channel::Blue), &noise);
}

#[test]
fn stacks_of_different_size_cannot_merge() {
    let mut blue = constant_stack(Channel::Blue, 1.0);
    blue.frame = ChannelFrame::new_filled(3, 2, 1.0);
    let stacks = [
        constant_stack(Channel::Red, 1.0),
        constant_stack(Channel::Green, 1.0),
        blue,
    ];

    match merge_channels(stacks, &PipelineConfig::default()) {
        Err(MergeError::DimensionMismatch {
            channel,
            width,
            expected_width,
            ..
        }) => {
            assert_eq!(channel, Channel::Blue);
            assert_eq!((width, expected_width), (3, 2));
        }
        other => panic!("unexpected result {other:?}"),
    }
}

#[test]
fn rgb_uses_one_scale_for_all_planes() {
    let composite = CompositeImage::new(
        [
            ChannelFrame::new_filled(2, 1, 4.0),
            ChannelFrame::new_filled(2, 1, 2.0),
            ChannelFrame::new_filled(2, 1, 0.0),
        ],
        [
            PlaneAlignment::Reference,
            PlaneAlignment::Reference,
            PlaneAlignment::Reference,
        ],
    )
    .unwrap();

    assert_eq!(composite.global_max(), 4.0);
    assert_eq!(composite.to_rgb8(), vec![255, 128, 0, 255, 128, 0]);
}

#[test]
fn black_composite_stays_black() {
    let composite = CompositeImage::new(
        [
            ChannelFrame::new_filled(2, 2, 0.0),
            ChannelFrame::new_filled(2, 2, 0.0),
            ChannelFrame::new_filled(2, 2, 0.0),
        ],
        [
            PlaneAlignment::Reference,
            PlaneAlignment::Reference,
            PlaneAlignment::Reference,
        ],
    )
    .unwrap();
    assert!(composite.to_rgb8().iter().all(|&v| v == 0));
}

#[test]
fn compose_aligns_shifted_exposures() {
    let config = PipelineConfig {
        compose_strategy: Strategy::PointPatternMatching,
        ..Default::default()
    };
    let frames = [
        star_frame(DVec2::ZERO, 1.0, 1),
        star_frame(DVec2::new(1.5, -1.0), 0.8, 2),
        star_frame(DVec2::new(-1.0, 2.0), 0.6, 3),
    ];

    let composite = compose_channels(frames, &config).unwrap();
    let references = Channel::ALL
        .iter()
        .filter(|&&c| matches!(composite.alignment(c), PlaneAlignment::Reference))
        .count();
    assert_eq!(references, 1);
    for channel in Channel::ALL {
        assert!(!composite.alignment(channel).is_fallback(), "{channel}");
    }
}

#[test]
fn compose_with_correlation_keeps_matching_planes() {
    let style = |gain| FrameStyle {
        psf_sigma: 2.5,
        gain,
        noise_sigma: 0.0,
        ..Default::default()
    };
    let frames = [1.0, 0.7, 0.4]
        .map(|gain| render_frame(SIZE, SIZE, &stars(), &style(gain), &Transform::identity()));

    let composite = compose_channels(frames, &PipelineConfig::default()).unwrap();
    for channel in Channel::ALL {
        match composite.alignment(channel) {
            PlaneAlignment::Reference => {}
            PlaneAlignment::Aligned { transform } => assert!(
                transform.deviation_from_identity() < 1e-3,
                "{channel}: {transform}"
            ),
            PlaneAlignment::Unaligned { failure } => panic!("{failure}"),
        }
    }
    assert!((composite.global_max() - 1.0).abs() < 1e-3);
}

#[test]
fn compose_rejects_mismatched_exposures() {
    let frames = [
        ChannelFrame::new_filled(4, 4, 1.0),
        ChannelFrame::new_filled(4, 5, 1.0),
        ChannelFrame::new_filled(4, 4, 1.0),
    ];
    let result = compose_channels(frames, &PipelineConfig::default());
    assert!(matches!(
        result,
        Err(MergeError::DimensionMismatch {
            channel: Channel::Green,
            height: 5,
            ..
        })
    ));
}
