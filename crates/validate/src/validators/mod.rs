//! Canonical validators.
//!
//! | Name | Type |
//! |------|------|
//! | `rlds_invariants` | [`RldsInvariantValidator`] |
//! | `episode_length` | [`EpisodeLengthValidator`] |
//! | `timestamps` | [`TimestampValidator`] |
//! | `action_sanity` | [`ActionSanityValidator`] |
//! | `image_integrity` | [`ImageIntegrityValidator`] |
//! | `image_alignment` | [`ImageAlignmentValidator`] |
//! | `schema` | [`SchemaValidator`] |

mod image;
mod schema;
mod structural;

pub use image::{ImageAlignmentValidator, ImageIntegrityValidator};
pub use schema::SchemaValidator;
pub use structural::{
    ActionSanityValidator, EpisodeLengthValidator, RldsInvariantValidator, TimestampValidator,
};
