//! A writer that duplicates its input to several sinks.

use std::io::{self, Write};

/// Forwards every write to all sinks in order. A failure in any sink fails
/// the whole write, so a successful return means every sink has the bytes.
pub struct FanOutWriter<W> {
    sinks: Vec<W>,
}

impl<W: Write> FanOutWriter<W> {
    pub fn new(sinks: Vec<W>) -> Self {
        Self { sinks }
    }

    /// Give back the sinks, e.g. to flush and close them individually.
    pub fn into_inner(self) -> Vec<W> {
        self.sinks
    }
}

impl<W: Write> Write for FanOutWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for sink in &mut self.sinks {
            sink.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        for sink in &mut self.sinks {
            sink.flush()?;
        }
        Ok(())
    }
}
