//! ROS 1 message serialization.

use crate::{
    error::Result,
    time::Time,
    wire::{WireReader, put_string, put_u32},
};

/// A message that can be recorded to a bag.
///
/// The associated constants are written to the connection record so that
/// readers can decode the message without compiled-in type information.
pub trait RosMessage: Sized {
    /// Fully qualified type name, e.g. `sensor_msgs/PointCloud2`.
    const DATATYPE: &'static str;
    /// MD5 sum of the message definition text.
    const MD5SUM: &'static str;
    /// The full message definition, including nested message types.
    const MESSAGE_DEFINITION: &'static str;

    fn encode(&self) -> Result<Vec<u8>>;
    fn decode(bytes: &[u8]) -> Result<Self>;
}

/// `std_msgs/Header`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Header {
    pub seq: u32,
    pub stamp: Time,
    pub frame_id: String,
}

impl Header {
    pub fn new(seq: u32, stamp: Time, frame_id: impl Into<String>) -> Self {
        Self {
            seq,
            stamp,
            frame_id: frame_id.into(),
        }
    }

    pub(crate) fn write(&self, buf: &mut Vec<u8>) -> Result<()> {
        put_u32(buf, self.seq);
        buf.extend_from_slice(&self.stamp.to_le_bytes());
        put_string(buf, &self.frame_id)
    }

    pub(crate) fn read(reader: &mut WireReader<'_>) -> Result<Self> {
        let seq = reader.u32()?;
        let secs = reader.u32()?;
        let nsecs = reader.u32()?;
        let frame_id = reader.string()?;
        Ok(Self {
            seq,
            stamp: Time { secs, nsecs },
            frame_id,
        })
    }
}
