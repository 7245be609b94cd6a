use super::{BAG_HEADER_LEN, ChunkInfo, Connection, MAGIC, record::Fields};
use crate::{
    error::{Error, Result},
    msg::RosMessage,
    time::Time,
    wire::WireReader,
};
use rosbag::{ChunkRecord, IndexRecord, MessageRecord, RosBag, record_types::Compression};
use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
    time::Duration,
};

/// A message record read back from a bag.
#[derive(Clone, Debug, PartialEq)]
pub struct BagMessage {
    pub conn: u32,
    pub topic: String,
    /// The time the message was written to the bag.
    pub time: Time,
    /// The serialized message.
    pub data: Vec<u8>,
}

impl BagMessage {
    pub fn decode<M: RosMessage>(&self) -> Result<M> {
        M::decode(&self.data)
    }
}

/// Per-topic summary of a bag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopicInfo {
    pub name: String,
    pub message_type: String,
    pub message_count: u64,
}

/// Reads an indexed bag through [`rosbag::RosBag`].
pub struct BagReader {
    path: PathBuf,
    bag: RosBag,
    connections: Vec<Connection>,
    chunk_infos: Vec<ChunkInfo>,
    compression: Option<String>,
}

impl BagReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        check_index_pos(&path)?;
        let bag = RosBag::new(&path)?;

        let mut connections = Vec::new();
        let mut chunk_infos = Vec::new();
        for record in bag.index_records() {
            match record? {
                IndexRecord::Connection(conn) => connections.push(Connection {
                    id: conn.id,
                    topic: conn.topic.to_string(),
                    datatype: conn.tp.to_string(),
                    md5sum: conn.md5sum.iter().map(|b| format!("{b:02x}")).collect(),
                    message_definition: conn.message_definition.to_string(),
                }),
                IndexRecord::ChunkInfo(info) => chunk_infos.push(ChunkInfo {
                    chunk_pos: info.chunk_pos,
                    start_time: Time::from_nanos(info.start_time),
                    end_time: Time::from_nanos(info.end_time),
                    message_counts: info.entries().map(|e| (e.conn_id, e.count)).collect(),
                }),
                IndexRecord::IndexData(_) => {}
            }
        }

        if connections.len() != bag.get_conn_count() as usize
            || chunk_infos.len() != bag.get_chunk_count() as usize
        {
            return Err(Error::Format(format!(
                "bag header lists {} connections and {} chunks but the index has {} and {}",
                bag.get_conn_count(),
                bag.get_chunk_count(),
                connections.len(),
                chunk_infos.len()
            )));
        }
        chunk_infos.sort_by_key(|info| info.chunk_pos);

        let mut compression = None;
        for record in bag.chunk_records() {
            if let ChunkRecord::Chunk(chunk) = record? {
                match chunk.compression {
                    Compression::None => {}
                    Compression::Bzip2 => compression = Some("bz2".to_string()),
                    Compression::Lz4 => compression = Some("lz4".to_string()),
                    _ => compression = Some("unknown".to_string()),
                }
            }
        }

        Ok(Self {
            path,
            bag,
            connections,
            chunk_infos,
            compression,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn chunk_infos(&self) -> &[ChunkInfo] {
        &self.chunk_infos
    }

    pub fn is_compressed(&self) -> bool {
        self.compression.is_some()
    }

    pub fn compression_mode(&self) -> Option<&str> {
        self.compression.as_deref()
    }

    pub fn message_count(&self) -> u64 {
        self.chunk_infos.iter().map(ChunkInfo::message_count).sum()
    }

    pub fn start_time(&self) -> Option<Time> {
        self.chunk_infos.iter().map(|info| info.start_time).min()
    }

    pub fn end_time(&self) -> Option<Time> {
        self.chunk_infos.iter().map(|info| info.end_time).max()
    }

    pub fn duration(&self) -> Duration {
        match (self.start_time(), self.end_time()) {
            (Some(start), Some(end)) => end.saturating_sub(start),
            _ => Duration::ZERO,
        }
    }

    /// Lists topics in connection order, merging connections that share a topic.
    pub fn topics(&self) -> Vec<TopicInfo> {
        let mut topics: Vec<TopicInfo> = Vec::new();
        for connection in &self.connections {
            let count: u64 = self
                .chunk_infos
                .iter()
                .filter_map(|info| info.message_counts.get(&connection.id))
                .map(|c| *c as u64)
                .sum();
            match topics.iter_mut().find(|t| t.name == connection.topic) {
                Some(topic) => topic.message_count += count,
                None => topics.push(TopicInfo {
                    name: connection.topic.clone(),
                    message_type: connection.datatype.clone(),
                    message_count: count,
                }),
            }
        }
        topics
    }

    /// Returns every message in the order it was written.
    pub fn messages(&self) -> Result<Vec<BagMessage>> {
        let mut messages = Vec::new();
        for record in self.bag.chunk_records() {
            let ChunkRecord::Chunk(chunk) = record? else {
                continue;
            };
            for msg in chunk.messages() {
                if let MessageRecord::MessageData(msg) = msg? {
                    messages.push(BagMessage {
                        conn: msg.conn_id,
                        topic: self.connection(msg.conn_id)?.topic.clone(),
                        time: Time::from_nanos(msg.time),
                        data: msg.data.to_vec(),
                    });
                }
            }
        }
        Ok(messages)
    }

    /// Returns the messages recorded on `topic`, in order.
    pub fn messages_on(&self, topic: &str) -> Result<Vec<BagMessage>> {
        Ok(self
            .messages()?
            .into_iter()
            .filter(|msg| msg.topic == topic)
            .collect())
    }

    fn connection(&self, conn: u32) -> Result<&Connection> {
        self.connections
            .iter()
            .find(|c| c.id == conn)
            .ok_or_else(|| Error::Format(format!("message refers to unknown connection {conn}")))
    }
}

/// Checks that the bag header points inside the file.
///
/// `RosBag` slices its mapping at `index_pos` without bounds checks.
fn check_index_pos(path: &Path) -> Result<()> {
    let file = File::open(path)?;
    let len = file.metadata()?.len();

    // Writers pad the header record to BAG_HEADER_LEN; allow some slack.
    let mut head = Vec::new();
    file.take((MAGIC.len() + 16 * BAG_HEADER_LEN) as u64)
        .read_to_end(&mut head)?;
    if !head.starts_with(MAGIC) {
        return Err(Error::Format(format!(
            "{} is not a version 2.0 bag",
            path.display()
        )));
    }

    let mut reader = WireReader::new(&head[MAGIC.len()..]);
    let header = Fields::decode(reader.bytes()?)?;
    // Padding.
    reader.bytes()?;
    let start_pos = (head.len() - reader.remaining()) as u64;

    let index_pos = header.u64("index_pos")?;
    if index_pos == 0 {
        return Err(Error::Format("bag was not closed and has no index".into()));
    }
    if index_pos < start_pos || index_pos > len {
        return Err(Error::Format(format!(
            "index position {index_pos} is outside the record section {start_pos}..{len}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bag::BagWriter;
    use std::io::Write;

    /// `std_msgs/String`.
    #[derive(Debug, PartialEq)]
    struct Text(String);

    impl RosMessage for Text {
        const DATATYPE: &'static str = "std_msgs/String";
        const MD5SUM: &'static str = "992ce8a1687cec8c8bd883ec73ca41d1";
        const MESSAGE_DEFINITION: &'static str = "string data\n";

        fn encode(&self) -> Result<Vec<u8>> {
            let mut buf = Vec::new();
            crate::wire::put_string(&mut buf, &self.0)?;
            Ok(buf)
        }

        fn decode(bytes: &[u8]) -> Result<Self> {
            Ok(Self(WireReader::new(bytes).string()?))
        }
    }

    #[test]
    fn reads_back_written_messages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("text.bag");

        let mut writer = BagWriter::create(&path).unwrap();
        writer.write("/a", &Text("one".into()), Time::new(1, 0)).unwrap();
        writer.write("/b", &Text("two".into()), Time::new(2, 0)).unwrap();
        writer.write("/a", &Text("three".into()), Time::new(3, 0)).unwrap();
        writer.close().unwrap();

        let reader = BagReader::open(&path).unwrap();
        assert_eq!(reader.message_count(), 3);
        assert_eq!(reader.chunk_infos().len(), 1);
        assert_eq!(reader.duration(), Duration::from_secs(2));
        assert!(!reader.is_compressed());
        assert_eq!(reader.compression_mode(), None);
        assert_eq!(
            reader.connections()[0],
            Connection {
                id: 0,
                topic: "/a".into(),
                datatype: "std_msgs/String".into(),
                md5sum: "992ce8a1687cec8c8bd883ec73ca41d1".into(),
                message_definition: "string data\n".into(),
            }
        );
        assert_eq!(
            reader.topics(),
            vec![
                TopicInfo {
                    name: "/a".into(),
                    message_type: "std_msgs/String".into(),
                    message_count: 2,
                },
                TopicInfo {
                    name: "/b".into(),
                    message_type: "std_msgs/String".into(),
                    message_count: 1,
                },
            ]
        );

        let texts: Vec<String> = reader
            .messages_on("/a")
            .unwrap()
            .iter()
            .map(|msg| msg.decode::<Text>().unwrap().0)
            .collect();
        assert_eq!(texts, vec!["one", "three"]);
    }

    #[test]
    fn small_threshold_splits_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunks.bag");

        let mut writer = BagWriter::create(&path).unwrap().with_chunk_threshold(1);
        for i in 0..5 {
            writer
                .write("/count", &Text(i.to_string()), Time::new(i, 0))
                .unwrap();
        }
        writer.close().unwrap();

        let reader = BagReader::open(&path).unwrap();
        assert_eq!(reader.chunk_infos().len(), 5);
        let messages = reader.messages().unwrap();
        assert_eq!(messages.len(), 5);
        for (i, msg) in messages.iter().enumerate() {
            assert_eq!(msg.time, Time::new(i as u32, 0));
            assert_eq!(msg.decode::<Text>().unwrap(), Text(i.to_string()));
        }
    }

    #[test]
    fn drop_closes_the_bag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dropped.bag");
        {
            let mut writer = BagWriter::create(&path).unwrap();
            writer.write("/a", &Text("x".into()), Time::new(1, 0)).unwrap();
        }
        assert_eq!(BagReader::open(&path).unwrap().message_count(), 1);
    }

    #[test]
    fn empty_bag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.bag");
        BagWriter::create(&path).unwrap().close().unwrap();

        let reader = BagReader::open(&path).unwrap();
        assert_eq!(reader.message_count(), 0);
        assert_eq!(reader.duration(), Duration::ZERO);
        assert!(reader.messages().unwrap().is_empty());
    }

    #[test]
    fn conflicting_types_on_one_topic() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = BagWriter::create(dir.path().join("conflict.bag")).unwrap();
        writer.write("/a", &Text("x".into()), Time::ZERO).unwrap();

        let cloud = crate::cloud::PointCloud2::from_points(Default::default(), &[]).unwrap();
        assert!(matches!(
            writer.write("/a", &cloud, Time::ZERO),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn rejects_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foreign.bag");
        std::fs::write(&path, b"#ROSBAG V1.2\n").unwrap();
        assert!(matches!(BagReader::open(&path), Err(Error::Format(_))));
    }

    fn bag_with_header(index_pos: u64) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MAGIC).unwrap();
        file.write_all(&crate::bag::writer::bag_header(index_pos, 1, 1).unwrap())
            .unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn rejects_unindexed_bags() {
        let file = bag_with_header(0);
        assert!(matches!(BagReader::open(file.path()), Err(Error::Format(_))));
    }

    #[test]
    fn rejects_index_past_the_end() {
        let file = bag_with_header(1 << 40);
        assert!(matches!(BagReader::open(file.path()), Err(Error::Format(_))));
    }

    #[test]
    fn huge_stored_counts_are_not_preallocated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.bag");
        let mut writer = BagWriter::create(&path).unwrap();
        writer.write("/a", &Text("x".into()), Time::new(1, 0)).unwrap();
        writer.close().unwrap();

        // The chunk info data holds (conn, count) pairs; the count is the
        // last four bytes of the file.
        let mut bytes = std::fs::read(&path).unwrap();
        let len = bytes.len();
        bytes[len - 4..].copy_from_slice(&u32::MAX.to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();

        let reader = BagReader::open(&path).unwrap();
        assert_eq!(reader.message_count(), u32::MAX as u64);
        assert_eq!(reader.messages().unwrap().len(), 1);
    }
}
