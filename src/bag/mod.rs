//! Reading and writing ROS bags in the 2.0 format.
//!
//! A bag starts with a magic line followed by a fixed-size bag header record.
//! Messages are grouped into chunks, each followed by index records. The file
//! ends with the connection and chunk info records that the bag header points
//! to, so a reader can locate every message without scanning the chunks.
//!
//! ```text
//! #ROSBAG V2.0\n
//! +------------+-------+-------+-----+-------+-------------+------------+
//! | bag header | chunk | index | ... | chunk | connections | chunk info |
//! +------------+-------+-------+-----+-------+-------------+------------+
//!                                            ^ index_pos
//! ```
//!
//! [`BagWriter`] encodes the records itself. [`BagReader`] parses them with
//! the `rosbag` crate.

mod reader;
mod record;
mod writer;

pub use reader::{BagMessage, BagReader, TopicInfo};
pub use writer::BagWriter;

use crate::{error::Result, time::Time};
use record::Fields;
use std::collections::BTreeMap;

pub const MAGIC: &[u8] = b"#ROSBAG V2.0\n";

/// Size of the bag header record, including its padding.
const BAG_HEADER_LEN: usize = 4096;

/// Chunks are flushed once their uncompressed size exceeds this many bytes.
pub const DEFAULT_CHUNK_THRESHOLD: usize = 768 * 1024;

/// A topic and the message type recorded on it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Connection {
    pub id: u32,
    pub topic: String,
    pub datatype: String,
    pub md5sum: String,
    pub message_definition: String,
}

impl Connection {
    fn header(&self) -> Fields {
        Fields::op(record::op::CONNECTION)
            .with_u32("conn", self.id)
            .with("topic", &self.topic)
    }

    fn data(&self) -> Fields {
        Fields::default()
            .with("topic", &self.topic)
            .with("type", &self.datatype)
            .with("md5sum", &self.md5sum)
            .with("message_definition", &self.message_definition)
    }

    fn put(&self, buf: &mut Vec<u8>) -> Result<()> {
        record::put_record(buf, &self.header(), &self.data().encode()?)
    }
}

/// Summary of a chunk: where it starts, the time range, and how many
/// messages each connection has in it.
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkInfo {
    pub chunk_pos: u64,
    pub start_time: Time,
    pub end_time: Time,
    pub message_counts: BTreeMap<u32, u32>,
}

impl ChunkInfo {
    pub fn message_count(&self) -> u64 {
        self.message_counts.values().map(|c| *c as u64).sum()
    }

    fn put(&self, buf: &mut Vec<u8>) -> Result<()> {
        let header = Fields::op(record::op::CHUNK_INFO)
            .with_u32("ver", 1)
            .with_u64("chunk_pos", self.chunk_pos)
            .with_time("start_time", self.start_time)
            .with_time("end_time", self.end_time)
            .with_u32("count", self.message_counts.len() as u32);

        let mut data = Vec::with_capacity(self.message_counts.len() * 8);
        for (conn, count) in &self.message_counts {
            data.extend_from_slice(&conn.to_le_bytes());
            data.extend_from_slice(&count.to_le_bytes());
        }
        record::put_record(buf, &header, &data)
    }
}
