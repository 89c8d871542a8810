use std::error::Error;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Defines the interface for reading and writing persisted fold-state
/// formats.
///
/// Implementors handle the format-specific encoding; the trait supplies the
/// buffered path-based entry points on top of the stream primitives.
pub trait SaveFile {
    /// The in-memory representation of one saved state.
    type Data;

    /// The error type for I/O operations.
    type Error: Error + From<io::Error>;

    /// Reads one saved state from a reader.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is not a valid save file or an I/O
    /// operation fails.
    fn read_from(reader: &mut impl Read) -> Result<Self::Data, Self::Error>;

    /// Writes one saved state to a writer.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_to(data: &Self::Data, writer: &mut impl Write) -> Result<(), Self::Error>;

    /// Reads a saved state from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or parsed.
    fn read_from_path<P: AsRef<Path>>(path: P) -> Result<Self::Data, Self::Error> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Self::read_from(&mut reader)
    }

    /// Writes a saved state to a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or writing fails.
    fn write_to_path<P: AsRef<Path>>(data: &Self::Data, path: P) -> Result<(), Self::Error> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        Self::write_to(data, &mut writer)?;
        writer.flush()?;
        Ok(())
    }
}
