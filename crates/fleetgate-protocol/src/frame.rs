use bytes::Bytes;
use std::fmt;

/// One complete protocol message cut out of a byte stream.
///
/// For text protocols the terminator has been stripped; for the binary
/// protocol the frame holds the whole packet, length header and CRC trailer
/// included.
///
/// # Examples
///
/// ```
/// use fleetgate_protocol::Frame;
///
/// let frame = Frame::from_bytes(b"<oris,1,356307042441013");
/// assert_eq!(frame.size(), 23);
/// assert_eq!(frame.as_text().unwrap(), "<oris,1,356307042441013");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    data: Bytes,
}

impl Frame {
    pub fn new(data: Bytes) -> Self {
        Self { data }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// View a text frame as UTF-8.
    ///
    /// Returns `None` for binary frames or corrupted text.
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

impl From<Bytes> for Frame {
    fn from(data: Bytes) -> Self {
        Self::new(data)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.as_text() {
            Some(text) => f.write_str(text),
            None => {
                for byte in self.data.iter() {
                    write!(f, "{byte:02X}")?;
                }
                Ok(())
            }
        }
    }
}
