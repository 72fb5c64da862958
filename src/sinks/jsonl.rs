use super::{DecisionSink, OutputRecord};
use anyhow::Result;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub struct JsonlSink {
    writer: BufWriter<Box<dyn Write + Send>>,
}

impl JsonlSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::from_writer(Box::new(file)))
    }

    pub fn stdout() -> Result<Self> {
        Ok(Self::from_writer(Box::new(std::io::stdout())))
    }

    pub fn from_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: BufWriter::new(writer),
        }
    }
}

impl DecisionSink for JsonlSink {
    fn write(&mut self, record: &OutputRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        writeln!(self.writer)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
