#![forbid(unsafe_code)]

pub mod compositor;
pub mod config;
pub mod core;
pub mod draw;
pub mod error;
pub mod ffmpeg;
pub mod frames;
pub mod mask;
pub mod normalize;
pub mod output;
pub mod session;
pub mod topology;
pub mod trajectory;

pub use compositor::{Applied, Compositor, CompositorOpts, SourceDraw};
pub use config::RenderConfig;
pub use core::{FrameId, Keypoint, PersonId, SceneId, Skeleton, Source, TrajectoryRecord};
pub use draw::LineStyle;
pub use error::{TrajvizError, TrajvizResult};
pub use frames::{DirFrameSource, FrameSource, MemoryFrameSource};
pub use mask::AnomalyMask;
pub use output::{OutputLayout, OutputWriter};
pub use session::{BatchRoots, RenderReport, render_batch, render_scene};
pub use trajectory::{Track, TrackFilter, TrajectoryFormat, TrajectorySource};
