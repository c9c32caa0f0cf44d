//! Artifact storage for compiled datasets.
//!
//! - [`layout`]: directory layout and path helpers
//! - [`step_codec`]: step rows to Arrow record batches
//! - [`index_table`]: episode index table codec
//! - [`video`]: per-camera video shards and encoders
//! - [`writer`]: [`EpisodeWriter`] and the LeRobot v3 implementation
//!
//! All Parquet I/O goes through [`parquet_io`]; files are written to a
//! temporary name and renamed into place.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod index_table;
pub mod info;
pub mod layout;
pub mod parquet_io;
pub mod step_codec;
pub mod video;
pub mod writer;

pub use error::{Result, StorageError};
pub use index_table::{read_index, write_index};
pub use info::{DatasetInfo, FeatureInfo};
pub use layout::{relative_path, ArtifactLayout};
pub use parquet_io::parquet_num_rows;
pub use step_codec::{read_episode_indices, StepCodec, StepRow};
pub use video::{
    EncoderFactory, FfmpegEncoderFactory, RawFrameEncoderFactory, RgbFrame, VideoEncoder,
    VideoShardWriter,
};
pub use writer::{EpisodeWriter, LeRobotV3Writer, WriterOptions, WriterSummary};
