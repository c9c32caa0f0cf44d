//! Episode canonicalization transforms.
//!
//! | Name | Type | Effect |
//! |------|------|--------|
//! | `identity` | [`Identity`] | none |
//! | `select_camera` | [`SelectCamera`] | copy one camera to `observation.images.canonical` |
//! | `resize_images` | [`ResizeImages`] | nearest-neighbour resize |
//! | `normalize_actions` | [`NormalizeActions`] | actions into `[-1, 1]` |
//! | `pad_action` | [`PadAction`] | pad/truncate actions |
//! | `map_action_space` | [`MapActionSpace`] | remap into a named layout |
//! | `task_text` | [`TaskText`] | resolve text, assign task id |
//! | `timestamp_canonicalize` | [`TimestampCanonicalize`] | fill + monotonic timestamps |
//! | `resample` | [`Resample`] | nearest-neighbour rate change |
//!
//! Every transform's parameters deserialize from JSON with defaults for
//! omitted fields, which is how the engine's registry builds them.

pub mod action;
pub mod camera;
pub mod chain;
pub mod task;
pub mod timestamp;

pub use action::{ActionLayout, MapActionSpace, NormalizeActions, PadAction};
pub use camera::{resize_nearest, ResizeImages, SelectCamera, DEFAULT_FALLBACK_ORDER};
pub use chain::{Identity, Transform, TransformChain, TransformContext};
pub use task::{normalize_task_text, TaskText};
pub use timestamp::{Resample, TimestampCanonicalize};
