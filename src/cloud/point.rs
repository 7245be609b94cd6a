use crate::error::{Error, Result};
use rand::Rng;

/// A single point with position and intensity.
///
/// On the wire a point is four little-endian `f32` values in x, y, z,
/// intensity order with no padding.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PointRecord {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub intensity: f32,
}

impl PointRecord {
    /// Size of an encoded point in bytes.
    pub const STEP: usize = 16;

    pub fn new(x: f32, y: f32, z: f32, intensity: f32) -> Self {
        Self { x, y, z, intensity }
    }

    /// Draws every field uniformly from [0, 1).
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            x: rng.random(),
            y: rng.random(),
            z: rng.random(),
            intensity: rng.random(),
        }
    }

    pub fn to_le_bytes(&self) -> [u8; Self::STEP] {
        let mut bytes = [0u8; Self::STEP];
        for (chunk, value) in bytes
            .chunks_exact_mut(4)
            .zip([self.x, self.y, self.z, self.intensity])
        {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    pub fn from_le_bytes(bytes: &[u8; Self::STEP]) -> Self {
        let field = |i: usize| {
            f32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]])
        };
        Self {
            x: field(0),
            y: field(4),
            z: field(8),
            intensity: field(12),
        }
    }

    pub fn as_array(&self) -> [f32; 4] {
        [self.x, self.y, self.z, self.intensity]
    }

    /// True when every field is finite and within [0, 1).
    pub fn is_unit(&self) -> bool {
        self.as_array()
            .iter()
            .all(|v| v.is_finite() && (0.0..1.0).contains(v))
    }
}

/// Scalar types a [`PointField`] can describe, with their `sensor_msgs/PointField` codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Datatype {
    Int8 = 1,
    Uint8 = 2,
    Int16 = 3,
    Uint16 = 4,
    Int32 = 5,
    Uint32 = 6,
    Float32 = 7,
    Float64 = 8,
}

impl Datatype {
    pub fn size(&self) -> usize {
        match self {
            Datatype::Int8 | Datatype::Uint8 => 1,
            Datatype::Int16 | Datatype::Uint16 => 2,
            Datatype::Int32 | Datatype::Uint32 | Datatype::Float32 => 4,
            Datatype::Float64 => 8,
        }
    }
}

impl TryFrom<u8> for Datatype {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        Ok(match code {
            1 => Datatype::Int8,
            2 => Datatype::Uint8,
            3 => Datatype::Int16,
            4 => Datatype::Uint16,
            5 => Datatype::Int32,
            6 => Datatype::Uint32,
            7 => Datatype::Float32,
            8 => Datatype::Float64,
            _ => return Err(Error::Format(format!("unknown point field datatype {code}"))),
        })
    }
}

/// Describes one channel of a point: its name, where it sits, and its type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PointField {
    pub name: String,
    pub offset: u32,
    pub datatype: Datatype,
    pub count: u32,
}

impl PointField {
    pub fn new(name: impl Into<String>, offset: u32, datatype: Datatype, count: u32) -> Self {
        Self {
            name: name.into(),
            offset,
            datatype,
            count,
        }
    }
}

/// The field layout of a [`PointRecord`].
pub fn xyzi_fields() -> Vec<PointField> {
    ["x", "y", "z", "intensity"]
        .into_iter()
        .zip((0u32..).step_by(4))
        .map(|(name, offset)| PointField::new(name, offset, Datatype::Float32, 1))
        .collect()
}
