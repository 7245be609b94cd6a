//! Synthesizes random point cloud frames and records them to a bag.

use crate::{
    bag::BagWriter,
    cloud::{PointCloud2, PointRecord},
    error::{Error, Result},
    msg::Header,
    node,
    time::{Clock, SystemClock},
};
use rand::{Rng, rngs::ThreadRng};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::{path::Path, thread, time::Duration};
use tracing::{debug, info};

/// Parameters of a generation run.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct GeneratorParams {
    /// Points per frame.
    pub num_points: usize,

    /// Coordinate frame the points are expressed in.
    pub frame_id: String,

    /// Pause between consecutive frames, in milliseconds.
    pub delay_ms: u64,

    pub node_name: String,
    pub anonymous: bool,
}

impl GeneratorParams {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for GeneratorParams {
    fn default() -> Self {
        Self {
            num_points: 10,
            frame_id: "velodyne".to_string(),
            delay_ms: 100,
            node_name: "generate_pointclouds".to_string(),
            anonymous: true,
        }
    }
}

/// Produces frames of uniformly random points.
///
/// The random source and the clock are type parameters so that runs can be
/// made reproducible.
pub struct FrameGenerator<R = ThreadRng, C = SystemClock> {
    params: GeneratorParams,
    rng: R,
    clock: C,
}

impl FrameGenerator {
    pub fn new(params: GeneratorParams) -> Self {
        Self::with_rng_and_clock(params, rand::rng(), SystemClock::new())
    }
}

impl<R: Rng, C: Clock> FrameGenerator<R, C> {
    pub fn with_rng_and_clock(params: GeneratorParams, rng: R, clock: C) -> Self {
        Self { params, rng, clock }
    }

    pub fn params(&self) -> &GeneratorParams {
        &self.params
    }

    /// Builds frame `seq`, stamped with the current time.
    pub fn frame(&mut self, seq: u32) -> Result<PointCloud2> {
        let points: Vec<PointRecord> = (0..self.params.num_points)
            .map(|_| PointRecord::random(&mut self.rng))
            .collect();
        let header = Header::new(seq, self.clock.now(), self.params.frame_id.as_str());
        PointCloud2::from_points(header, &points)
    }

    /// Writes `frame_count` frames to a new bag at `path` under `topic`.
    ///
    /// Any existing file at `path` is replaced. Each message is recorded at
    /// the time it is appended, which is read separately from the capture
    /// time in the frame header.
    pub fn write_frames(
        &mut self,
        path: impl AsRef<Path>,
        topic: &str,
        frame_count: u32,
    ) -> Result<()> {
        let path = path.as_ref();
        if frame_count == 0 {
            return Err(Error::InvalidInput("frame count must be positive".into()));
        }
        if topic.is_empty() {
            return Err(Error::InvalidInput("topic name is empty".into()));
        }
        if self.params.num_points == 0 {
            return Err(Error::InvalidInput("frames must contain points".into()));
        }

        match node::init(&self.params.node_name, self.params.anonymous) {
            Ok(name) => info!("node initialized as {name}"),
            Err(Error::AlreadyInitialized { name }) => {
                info!("node has already been initialized as {name}")
            }
            Err(err) => return Err(err),
        }

        info!("creating bag file {}", path.display());
        let mut bag = BagWriter::create(path)?;

        for seq in 0..frame_count {
            let frame = seq + 1;
            info!("generating frame {frame}/{frame_count}");
            let cloud = self.frame(seq)?;
            debug!(
                points = cloud.len(),
                stamp = %cloud.header.stamp,
                "generated point cloud"
            );

            info!("writing frame {frame}/{frame_count} to topic {topic}");
            let time = self.clock.now();
            bag.write(topic, &cloud, time)?;

            if frame < frame_count && !self.params.delay().is_zero() {
                thread::sleep(self.params.delay());
            }
        }

        bag.close()?;
        info!("finished writing {frame_count} frames to {}", path.display());
        Ok(())
    }
}

/// Writes `frame_count` frames of ten random points to `output_path` under
/// `channel_name`, 100 ms apart.
pub fn write_random_frames(
    output_path: impl AsRef<Path>,
    channel_name: &str,
    frame_count: u32,
) -> Result<()> {
    FrameGenerator::new(GeneratorParams::default()).write_frames(
        output_path,
        channel_name,
        frame_count,
    )
}
