// Metrics module
// Channel-path dispatch, the two metric families and the mean reduction

pub mod computer;
pub mod frame;
pub mod level;
pub mod spectral;
pub mod stats;

pub use computer::{
    metric_names, BuiltinBackend, ChannelPath, MetricComputer, MetricError, MetricsBackend,
};
pub use frame::{reduce_to_mean, MetricFrame};
pub use level::{silence_level_db, LevelConfig, LEVEL_COLUMNS};
pub use spectral::{SpectralConfig, SPECTRAL_COLUMNS};
