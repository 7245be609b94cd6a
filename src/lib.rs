//! Random Point Cloud Bags
//!
//! Generates frames of random `sensor_msgs/PointCloud2` points and records
//! them to ROS bags, for testing consumers of point cloud streams.

pub mod bag;
pub mod cloud;
#[allow(missing_docs)]
pub mod error;
pub mod generator;
pub mod msg;
pub mod node;
pub mod time;

mod wire;

pub use error::{Error, Result};
pub use generator::write_random_frames;

pub mod prelude {
    pub use crate::bag::{BagMessage, BagReader, BagWriter, TopicInfo};
    pub use crate::cloud::{Datatype, PointCloud2, PointField, PointRecord, xyzi_fields};
    pub use crate::generator::{FrameGenerator, GeneratorParams, write_random_frames};
    pub use crate::msg::{Header, RosMessage};
    pub use crate::time::{Clock, ManualClock, SystemClock, Time};
}
