use crate::{
    error::{Error, Result},
    time::Time,
    wire::{WireReader, put_bytes, put_len},
};

/// Record opcodes of the bag 2.0 format.
pub(crate) mod op {
    pub const MSG_DATA: u8 = 0x02;
    pub const BAG_HEADER: u8 = 0x03;
    pub const INDEX_DATA: u8 = 0x04;
    pub const CHUNK: u8 = 0x05;
    pub const CHUNK_INFO: u8 = 0x06;
    pub const CONNECTION: u8 = 0x07;
}

/// `name=value` fields of a record header.
///
/// Connection records reuse the same encoding for their data section.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct Fields(Vec<(String, Vec<u8>)>);

impl Fields {
    pub(crate) fn op(op: u8) -> Self {
        Self::default().with("op", [op])
    }

    pub(crate) fn with(mut self, name: &str, value: impl AsRef<[u8]>) -> Self {
        self.0.push((name.to_string(), value.as_ref().to_vec()));
        self
    }

    pub(crate) fn with_u32(self, name: &str, value: u32) -> Self {
        self.with(name, value.to_le_bytes())
    }

    pub(crate) fn with_u64(self, name: &str, value: u64) -> Self {
        self.with(name, value.to_le_bytes())
    }

    pub(crate) fn with_time(self, name: &str, value: Time) -> Self {
        self.with(name, value.to_le_bytes())
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        for (name, value) in &self.0 {
            put_len(&mut buf, name.len() + 1 + value.len())?;
            buf.extend_from_slice(name.as_bytes());
            buf.push(b'=');
            buf.extend_from_slice(value);
        }
        Ok(buf)
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = WireReader::new(bytes);
        let mut fields = Vec::new();
        while reader.remaining() > 0 {
            let field = reader.bytes()?;
            let split = field
                .iter()
                .position(|b| *b == b'=')
                .ok_or_else(|| Error::Format("header field has no '='".into()))?;
            let name = std::str::from_utf8(&field[..split])
                .map_err(|e| Error::Format(format!("header field name is not utf-8: {e}")))?;
            fields.push((name.to_string(), field[split + 1..].to_vec()));
        }
        Ok(Self(fields))
    }

    fn get(&self, name: &str) -> Result<&[u8]> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value.as_slice())
            .ok_or_else(|| Error::Format(format!("missing header field {name:?}")))
    }

    fn fixed<const N: usize>(&self, name: &str) -> Result<[u8; N]> {
        let value = self.get(name)?;
        value.try_into().map_err(|_| {
            Error::Format(format!(
                "header field {name:?} has {} bytes but expected {N}",
                value.len()
            ))
        })
    }

    pub(crate) fn u64(&self, name: &str) -> Result<u64> {
        Ok(u64::from_le_bytes(self.fixed(name)?))
    }
}

/// Appends a record with the given header fields and data.
pub(crate) fn put_record(buf: &mut Vec<u8>, header: &Fields, data: &[u8]) -> Result<()> {
    put_bytes(buf, &header.encode()?)?;
    put_bytes(buf, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_layout() {
        let fields = Fields::op(op::CHUNK).with("compression", "none");
        let bytes = fields.encode().unwrap();
        // "op=" + 1 byte, "compression=none"
        assert_eq!(&bytes[0..4], &4u32.to_le_bytes());
        assert_eq!(&bytes[4..8], b"op=\x05");
        assert_eq!(&bytes[8..12], &16u32.to_le_bytes());
        assert_eq!(&bytes[12..], b"compression=none");
    }

    #[test]
    fn values_may_contain_separator() {
        let fields = Fields::default().with("message_definition", "uint8 INT8 = 1");
        let decoded = Fields::decode(&fields.encode().unwrap()).unwrap();
        assert_eq!(decoded.get("message_definition").unwrap(), b"uint8 INT8 = 1");
    }

    #[test]
    fn fixed_width_values() {
        let fields = Fields::op(op::BAG_HEADER)
            .with_u64("index_pos", 1 << 40)
            .with_u32("conn_count", 3);
        let decoded = Fields::decode(&fields.encode().unwrap()).unwrap();
        assert_eq!(decoded, fields);
        assert_eq!(decoded.u64("index_pos").unwrap(), 1 << 40);
        assert!(matches!(decoded.u64("conn_count"), Err(Error::Format(_))));
        assert!(matches!(decoded.u64("chunk_count"), Err(Error::Format(_))));
    }

    #[test]
    fn field_without_separator() {
        let mut bytes = Vec::new();
        put_bytes(&mut bytes, b"op").unwrap();
        assert!(matches!(Fields::decode(&bytes), Err(Error::Format(_))));
    }
}
