//! Point cloud frames and their `sensor_msgs/PointCloud2` encoding.

mod point;

pub use point::{Datatype, PointField, PointRecord, xyzi_fields};

use crate::{
    error::{Error, Result},
    msg::{Header, RosMessage},
    wire::{WireReader, put_bytes, put_len, put_string, put_u8, put_u32},
};

/// A frame of points, `sensor_msgs/PointCloud2`.
#[derive(Clone, Debug, PartialEq)]
pub struct PointCloud2 {
    pub header: Header,
    /// Number of rows; 1 for an unstructured cloud.
    pub height: u32,
    /// Number of points per row.
    pub width: u32,
    pub fields: Vec<PointField>,
    pub is_bigendian: bool,
    /// Length of a point in bytes.
    pub point_step: u32,
    /// Length of a row in bytes.
    pub row_step: u32,
    pub data: Vec<u8>,
    /// True when the cloud contains no invalid points.
    pub is_dense: bool,
}

impl PointCloud2 {
    /// Builds an unstructured, dense cloud in the xyzi layout.
    pub fn from_points(header: Header, points: &[PointRecord]) -> Result<Self> {
        let width = u32::try_from(points.len())
            .map_err(|_| Error::InvalidInput(format!("too many points: {}", points.len())))?;
        let point_step = PointRecord::STEP as u32;
        let row_step = point_step
            .checked_mul(width)
            .ok_or_else(|| Error::InvalidInput(format!("too many points: {width}")))?;
        let data: Vec<u8> = points.iter().flat_map(|p| p.to_le_bytes()).collect();

        Ok(Self {
            header,
            height: 1,
            width,
            fields: xyzi_fields(),
            is_bigendian: false,
            point_step,
            row_step,
            data,
            is_dense: true,
        })
    }

    pub fn len(&self) -> usize {
        self.height as usize * self.width as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decodes `data` back into points.
    ///
    /// Only the little-endian xyzi layout produced by [`PointCloud2::from_points`] is accepted.
    pub fn points(&self) -> Result<Vec<PointRecord>> {
        if self.is_bigendian {
            return Err(Error::InvalidCloud("data is big-endian".into()));
        }
        if self.fields != xyzi_fields() {
            return Err(Error::InvalidCloud(format!(
                "unexpected fields {:?}",
                self.fields.iter().map(|f| &f.name).collect::<Vec<_>>()
            )));
        }
        if self.point_step as usize != PointRecord::STEP {
            return Err(Error::InvalidCloud(format!(
                "point_step is {} but expected {}",
                self.point_step,
                PointRecord::STEP
            )));
        }
        let row_step = self.point_step.checked_mul(self.width).ok_or_else(|| {
            Error::InvalidCloud(format!("width {} overflows row_step", self.width))
        })?;
        if self.row_step != row_step {
            return Err(Error::InvalidCloud(format!(
                "row_step is {} but width {} requires {row_step}",
                self.row_step, self.width
            )));
        }
        let expected = self.row_step as usize * self.height as usize;
        if self.data.len() != expected {
            return Err(Error::InvalidCloud(format!(
                "data holds {} bytes but the layout requires {expected}",
                self.data.len()
            )));
        }

        Ok(self
            .data
            .chunks_exact(PointRecord::STEP)
            .map(|chunk| {
                let mut bytes = [0u8; PointRecord::STEP];
                bytes.copy_from_slice(chunk);
                PointRecord::from_le_bytes(&bytes)
            })
            .collect())
    }
}

impl RosMessage for PointCloud2 {
    const DATATYPE: &'static str = "sensor_msgs/PointCloud2";
    const MD5SUM: &'static str = "1158d486dd51d683ce2f1be655c3c181";
    const MESSAGE_DEFINITION: &'static str = POINT_CLOUD2_DEFINITION;

    fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(128 + self.data.len());
        self.header.write(&mut buf)?;
        put_u32(&mut buf, self.height);
        put_u32(&mut buf, self.width);
        put_len(&mut buf, self.fields.len())?;
        for field in &self.fields {
            put_string(&mut buf, &field.name)?;
            put_u32(&mut buf, field.offset);
            put_u8(&mut buf, field.datatype as u8);
            put_u32(&mut buf, field.count);
        }
        put_u8(&mut buf, self.is_bigendian as u8);
        put_u32(&mut buf, self.point_step);
        put_u32(&mut buf, self.row_step);
        put_bytes(&mut buf, &self.data)?;
        put_u8(&mut buf, self.is_dense as u8);
        Ok(buf)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = WireReader::new(bytes);
        let header = Header::read(&mut reader)?;
        let height = reader.u32()?;
        let width = reader.u32()?;

        let field_count = reader.u32()? as usize;
        let mut fields = Vec::with_capacity(field_count.min(64));
        for _ in 0..field_count {
            let name = reader.string()?;
            let offset = reader.u32()?;
            let datatype = Datatype::try_from(reader.u8()?)?;
            let count = reader.u32()?;
            fields.push(PointField {
                name,
                offset,
                datatype,
                count,
            });
        }

        let is_bigendian = reader.bool()?;
        let point_step = reader.u32()?;
        let row_step = reader.u32()?;
        let data = reader.bytes()?.to_vec();
        let is_dense = reader.bool()?;

        if reader.remaining() != 0 {
            return Err(Error::Format(format!(
                "{} trailing bytes after PointCloud2",
                reader.remaining()
            )));
        }

        Ok(Self {
            header,
            height,
            width,
            fields,
            is_bigendian,
            point_step,
            row_step,
            data,
            is_dense,
        })
    }
}

const POINT_CLOUD2_DEFINITION: &str = "\
# This message holds a collection of N-dimensional points, which may
# contain additional information such as normals, intensity, etc. The
# point data is stored as a binary blob, its layout described by the
# contents of the \"fields\" array.

# The point cloud data may be organized 2d (image-like) or 1d
# (unordered). Point clouds organized as 2d images may be produced by
# camera depth sensors such as stereo or time-of-flight.

# Time of sensor data acquisition, and the coordinate frame ID (for 3d
# points).
Header header

# 2D structure of the point cloud. If the cloud is unordered, height is
# 1 and width is the length of the point cloud.
uint32 height
uint32 width

# Describes the channels and their layout in the binary data blob.
PointField[] fields

bool    is_bigendian # Is this data bigendian?
uint32  point_step   # Length of a point in bytes
uint32  row_step     # Length of a row in bytes
uint8[] data         # Actual point data, size is (row_step*height)

bool is_dense        # True if there are no invalid points

================================================================================
MSG: std_msgs/Header
# Standard metadata for higher-level stamped data types.
# This is generally used to communicate timestamped data
# in a particular coordinate frame.
#
# sequence ID: consecutively increasing ID
uint32 seq
#Two-integer timestamp that is expressed as:
# * stamp.sec: seconds (stamp_secs) since epoch (in Python the variable is called 'secs')
# * stamp.nsec: nanoseconds since stamp_secs (in Python the variable is called 'nsecs')
# time-handling sugar is provided by the client library
time stamp
#Frame this data is associated with
string frame_id

================================================================================
MSG: sensor_msgs/PointField
# This message holds the description of one point entry in the
# PointCloud2 message format.
uint8 INT8    = 1
uint8 UINT8   = 2
uint8 INT16   = 3
uint8 UINT16  = 4
uint8 INT32   = 5
uint8 UINT32  = 6
uint8 FLOAT32 = 7
uint8 FLOAT64 = 8

string name      # Name of field
uint32 offset    # Offset from start of point struct
uint8  datatype  # Datatype enumeration, see above
uint32 count     # How many elements in the field
";
