//! Output destinations.
//!
//! A [`Destination`] is an ordered fan-out of [`Sink`]s. Every chunk read from
//! a child's pipe is written to each sink in order before the next chunk is
//! read. An empty destination drains and discards.

use std::fmt;
use std::fs::File;
use std::io::{self, Write};

/// A single place bytes can be written to.
pub enum Sink {
    /// Accumulate bytes in memory.
    Memory(Vec<u8>),

    /// Append to an open file.
    File(File),

    /// Any other writer.
    Writer(Box<dyn Write + Send + Sync>),
}

impl Sink {
    /// An empty in-memory buffer.
    pub fn memory() -> Self {
        Sink::Memory(Vec::new())
    }

    /// Wrap an arbitrary writer.
    pub fn writer(writer: impl Write + Send + Sync + 'static) -> Self {
        Sink::Writer(Box::new(writer))
    }

    /// Bytes held by a memory sink, `None` for other kinds.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Sink::Memory(buf) => Some(buf),
            _ => None,
        }
    }

    pub(crate) fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        match self {
            Sink::Memory(buf) => {
                buf.extend_from_slice(chunk);
                Ok(())
            }
            Sink::File(file) => file.write_all(chunk),
            Sink::Writer(writer) => writer.write_all(chunk),
        }
    }

    pub(crate) fn flush(&mut self) -> io::Result<()> {
        match self {
            Sink::Memory(_) => Ok(()),
            Sink::File(file) => file.flush(),
            Sink::Writer(writer) => writer.flush(),
        }
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sink::Memory(buf) => f.debug_tuple("Memory").field(&buf.len()).finish(),
            Sink::File(file) => f.debug_tuple("File").field(file).finish(),
            Sink::Writer(_) => f.write_str("Writer(..)"),
        }
    }
}

impl From<File> for Sink {
    fn from(file: File) -> Self {
        Sink::File(file)
    }
}

impl From<Vec<u8>> for Sink {
    fn from(buf: Vec<u8>) -> Self {
        Sink::Memory(buf)
    }
}

/// Ordered set of sinks receiving one output stream.
#[derive(Debug, Default)]
pub struct Destination {
    sinks: Vec<Sink>,
}

impl Destination {
    /// A destination with no sinks: output is drained and dropped.
    pub fn discard() -> Self {
        Self::default()
    }

    /// A destination capturing into memory.
    pub fn memory() -> Self {
        Self::from(Sink::memory())
    }

    /// A destination writing to `writer`.
    pub fn writer(writer: impl Write + Send + Sync + 'static) -> Self {
        Self::from(Sink::writer(writer))
    }

    /// Add another sink to the fan-out.
    pub fn tee(mut self, sink: impl Into<Sink>) -> Self {
        self.sinks.push(sink.into());
        self
    }

    /// Merge another destination's sinks after this one's.
    pub fn tee_all(mut self, other: Destination) -> Self {
        self.sinks.extend(other.sinks);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub(crate) fn into_sinks(self) -> Vec<Sink> {
        self.sinks
    }
}

impl From<Sink> for Destination {
    fn from(sink: Sink) -> Self {
        Self { sinks: vec![sink] }
    }
}

impl From<Vec<Sink>> for Destination {
    fn from(sinks: Vec<Sink>) -> Self {
        Self { sinks }
    }
}

impl From<File> for Destination {
    fn from(file: File) -> Self {
        Self::from(Sink::File(file))
    }
}
