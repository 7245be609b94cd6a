use super::{
    BAG_HEADER_LEN, ChunkInfo, Connection, DEFAULT_CHUNK_THRESHOLD, MAGIC,
    record::{self, Fields, op},
};
use crate::{
    error::{Error, Result},
    msg::RosMessage,
    time::Time,
};
use std::{
    collections::{BTreeMap, HashMap},
    fs::File,
    io::{BufWriter, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

/// Appends messages to a new bag file.
///
/// The file is truncated on creation. Dropping the writer closes it; call
/// [`BagWriter::close`] to observe errors from the final flush.
pub struct BagWriter {
    path: PathBuf,
    /// `None` once the bag has been closed.
    file: Option<BufWriter<File>>,
    /// Offset of the next byte written to `file`.
    pos: u64,
    connections: Vec<Connection>,
    topics: HashMap<String, u32>,
    chunk: OpenChunk,
    chunk_infos: Vec<ChunkInfo>,
    chunk_threshold: usize,
}

/// Messages buffered until the next chunk flush.
#[derive(Default)]
struct OpenChunk {
    data: Vec<u8>,
    start_time: Option<Time>,
    end_time: Time,
    /// Per connection, the time and chunk offset of every message record.
    index: BTreeMap<u32, Vec<(Time, u32)>>,
}

impl OpenChunk {
    fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl BagWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        debug!("created bag at {}", path.display());

        let mut writer = Self {
            path,
            file: Some(BufWriter::new(file)),
            pos: 0,
            connections: Vec::new(),
            topics: HashMap::new(),
            chunk: OpenChunk::default(),
            chunk_infos: Vec::new(),
            chunk_threshold: DEFAULT_CHUNK_THRESHOLD,
        };

        writer.write_all(MAGIC)?;
        // Placeholder until close() knows where the index starts.
        let header = bag_header(0, 0, 0)?;
        writer.write_all(&header)?;
        Ok(writer)
    }

    /// Sets the uncompressed chunk size above which a chunk is flushed.
    pub fn with_chunk_threshold(mut self, chunk_threshold: usize) -> Self {
        self.chunk_threshold = chunk_threshold;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Serializes `msg` and appends it to `topic` at `time`.
    pub fn write<M: RosMessage>(&mut self, topic: &str, msg: &M, time: Time) -> Result<()> {
        let data = msg.encode()?;
        self.write_raw::<M>(topic, &data, time)
    }

    /// Appends an already serialized message of type `M`.
    pub fn write_raw<M: RosMessage>(&mut self, topic: &str, data: &[u8], time: Time) -> Result<()> {
        if self.file.is_none() {
            return Err(Error::InvalidInput("bag has already been closed".into()));
        }

        let conn = self.connection::<M>(topic)?;
        let offset = u32::try_from(self.chunk.data.len())
            .map_err(|_| Error::InvalidInput("chunk exceeds 4 GiB".into()))?;
        let header = Fields::op(op::MSG_DATA)
            .with_u32("conn", conn)
            .with_time("time", time);
        record::put_record(&mut self.chunk.data, &header, data)?;

        self.chunk.index.entry(conn).or_default().push((time, offset));
        self.chunk.start_time = Some(self.chunk.start_time.map_or(time, |t| t.min(time)));
        self.chunk.end_time = self.chunk.end_time.max(time);

        if self.chunk.data.len() > self.chunk_threshold {
            self.flush_chunk()?;
        }
        Ok(())
    }

    /// Flushes buffered messages and writes the index.
    pub fn close(mut self) -> Result<()> {
        let result = self.finish();
        // A bag that failed to close is not retried on drop.
        self.file = None;
        result
    }

    /// Returns the connection id for `topic`, registering it on first use.
    fn connection<M: RosMessage>(&mut self, topic: &str) -> Result<u32> {
        if let Some(id) = self.topics.get(topic) {
            let existing = &self.connections[*id as usize];
            if existing.datatype != M::DATATYPE {
                return Err(Error::InvalidInput(format!(
                    "topic {topic} already carries {} but got {}",
                    existing.datatype,
                    M::DATATYPE
                )));
            }
            return Ok(*id);
        }

        let id = self.connections.len() as u32;
        let connection = Connection {
            id,
            topic: topic.to_string(),
            datatype: M::DATATYPE.to_string(),
            md5sum: M::MD5SUM.to_string(),
            message_definition: M::MESSAGE_DEFINITION.to_string(),
        };
        connection.put(&mut self.chunk.data)?;
        debug!("registered connection {id} on {topic} ({})", M::DATATYPE);

        self.topics.insert(connection.topic.clone(), id);
        self.connections.push(connection);
        Ok(id)
    }

    fn flush_chunk(&mut self) -> Result<()> {
        if self.chunk.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::take(&mut self.chunk);
        let chunk_pos = self.pos;

        let size = u32::try_from(chunk.data.len())
            .map_err(|_| Error::InvalidInput("chunk exceeds 4 GiB".into()))?;
        let header = Fields::op(op::CHUNK)
            .with("compression", "none")
            .with_u32("size", size);
        let mut buf = Vec::with_capacity(chunk.data.len() + 64);
        record::put_record(&mut buf, &header, &chunk.data)?;

        for (conn, entries) in &chunk.index {
            let header = Fields::op(op::INDEX_DATA)
                .with_u32("ver", 1)
                .with_u32("conn", *conn)
                .with_u32("count", entries.len() as u32);
            let mut data = Vec::with_capacity(entries.len() * 12);
            for (time, offset) in entries {
                data.extend_from_slice(&time.to_le_bytes());
                data.extend_from_slice(&offset.to_le_bytes());
            }
            record::put_record(&mut buf, &header, &data)?;
        }
        self.write_all(&buf)?;

        let info = ChunkInfo {
            chunk_pos,
            start_time: chunk.start_time.unwrap_or_default(),
            end_time: chunk.end_time,
            message_counts: chunk
                .index
                .iter()
                .map(|(conn, entries)| (*conn, entries.len() as u32))
                .collect(),
        };
        debug!(
            "flushed chunk at {chunk_pos} with {} messages ({size} bytes)",
            info.message_count()
        );
        self.chunk_infos.push(info);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.file.is_none() {
            return Ok(());
        }
        self.flush_chunk()?;

        let index_pos = self.pos;
        let mut buf = Vec::new();
        for connection in &self.connections {
            connection.put(&mut buf)?;
        }
        for info in &self.chunk_infos {
            info.put(&mut buf)?;
        }
        self.write_all(&buf)?;

        let header = bag_header(
            index_pos,
            self.connections.len() as u32,
            self.chunk_infos.len() as u32,
        )?;

        let Some(mut file) = self.file.take() else {
            return Ok(());
        };
        file.seek(SeekFrom::Start(MAGIC.len() as u64))?;
        file.write_all(&header)?;
        file.flush()?;
        file.get_ref().sync_all()?;

        debug!(
            "closed bag at {} with {} connections and {} chunks",
            self.path.display(),
            self.connections.len(),
            self.chunk_infos.len()
        );
        Ok(())
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| Error::InvalidInput("bag has already been closed".into()))?;
        file.write_all(bytes)?;
        self.pos += bytes.len() as u64;
        Ok(())
    }
}

impl Drop for BagWriter {
    fn drop(&mut self) {
        if let Err(err) = self.finish() {
            warn!("failed to close bag at {}: {err}", self.path.display());
        }
    }
}

/// Encodes the bag header record padded to [`BAG_HEADER_LEN`] bytes.
pub(super) fn bag_header(index_pos: u64, conn_count: u32, chunk_count: u32) -> Result<Vec<u8>> {
    let header = Fields::op(op::BAG_HEADER)
        .with_u64("index_pos", index_pos)
        .with_u32("conn_count", conn_count)
        .with_u32("chunk_count", chunk_count)
        .encode()?;
    let padding = BAG_HEADER_LEN - 4 - header.len() - 4;

    let mut buf = Vec::with_capacity(BAG_HEADER_LEN);
    crate::wire::put_bytes(&mut buf, &header)?;
    crate::wire::put_bytes(&mut buf, &vec![b' '; padding])?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bag_header_is_padded() {
        let header = bag_header(u64::MAX, 1, 1).unwrap();
        assert_eq!(header.len(), BAG_HEADER_LEN);
        assert!(header.ends_with(b"    "));
    }
}
