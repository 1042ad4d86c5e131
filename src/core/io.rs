//! Input/output helpers
//!
//! Opens alignment and annotation inputs with transparent decompression
//! (gzip, bzip2) and memory mapping for large plain files, and provides a
//! line iterator that reuses one buffer for the whole stream.

use bzip2::read::BzDecoder;
use flate2::read::MultiGzDecoder;
use memmap2::Mmap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::str::Utf8Error;

/// Default buffer size for BufReader/BufWriter (128KB)
pub const DEFAULT_BUFFER_SIZE: usize = 128 * 1024;

/// Large buffer size for high-throughput I/O (1MB)
pub const LARGE_BUFFER_SIZE: usize = 1024 * 1024;

/// Threshold for using memory mapping (100MB)
pub const MMAP_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Compression format of an input file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    /// Plain text (uncompressed)
    Plain,
    /// Gzip or BGZF compressed (.gz)
    Gzip,
    /// Bzip2 compressed (.bz2)
    Bzip2,
}

/// Detect compression format from file extension, then magic bytes
pub fn detect_compression(path: &Path) -> io::Result<CompressionFormat> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    if extension == "gz" {
        return Ok(CompressionFormat::Gzip);
    }
    if extension == "bz2" {
        return Ok(CompressionFormat::Bzip2);
    }

    let mut file = File::open(path)?;
    let mut magic = [0u8; 3];
    let bytes_read = file.read(&mut magic)?;

    if bytes_read >= 2 && magic[0] == 0x1f && magic[1] == 0x8b {
        return Ok(CompressionFormat::Gzip);
    }
    // BZ2 magic: "BZh"
    if bytes_read >= 3 && magic[0] == 0x42 && magic[1] == 0x5a && magic[2] == 0x68 {
        return Ok(CompressionFormat::Bzip2);
    }

    Ok(CompressionFormat::Plain)
}

/// A reader over a possibly compressed or memory-mapped input file
pub enum SmartReader {
    /// Buffered reader for plain files
    Buffered(BufReader<File>),
    /// Memory-mapped reader for large plain files
    Mapped(MappedReader),
    /// Gzip/BGZF decoder
    Gzip(BufReader<MultiGzDecoder<File>>),
    /// Bzip2 decoder
    Bzip2(BufReader<BzDecoder<File>>),
}

/// Memory-mapped file reader
pub struct MappedReader {
    mmap: Mmap,
    position: usize,
}

impl MappedReader {
    pub fn new(file: &File) -> io::Result<Self> {
        // SAFETY: inputs are treated as read-only for the lifetime of the run
        let mmap = unsafe { Mmap::map(file)? };
        Ok(Self { mmap, position: 0 })
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}

impl Read for MappedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = &self.mmap[self.position..];
        let to_read = std::cmp::min(buf.len(), remaining.len());
        buf[..to_read].copy_from_slice(&remaining[..to_read]);
        self.position += to_read;
        Ok(to_read)
    }
}

impl BufRead for MappedReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        Ok(&self.mmap[self.position..])
    }

    fn consume(&mut self, amt: usize) {
        self.position = std::cmp::min(self.position + amt, self.mmap.len());
    }
}

impl SmartReader {
    /// Open an input file, picking decompression and buffering automatically
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let format = detect_compression(path)?;
        let file = File::open(path)?;

        match format {
            CompressionFormat::Gzip => Ok(SmartReader::Gzip(BufReader::with_capacity(
                DEFAULT_BUFFER_SIZE,
                MultiGzDecoder::new(file),
            ))),
            CompressionFormat::Bzip2 => Ok(SmartReader::Bzip2(BufReader::with_capacity(
                DEFAULT_BUFFER_SIZE,
                BzDecoder::new(file),
            ))),
            CompressionFormat::Plain => {
                let file_size = file.metadata()?.len();
                if file_size >= MMAP_THRESHOLD {
                    Ok(SmartReader::Mapped(MappedReader::new(&file)?))
                } else {
                    let buf_size = if file_size > 10 * 1024 * 1024 {
                        LARGE_BUFFER_SIZE
                    } else {
                        DEFAULT_BUFFER_SIZE
                    };
                    Ok(SmartReader::Buffered(BufReader::with_capacity(buf_size, file)))
                }
            }
        }
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self, SmartReader::Mapped(_))
    }

    pub fn compression(&self) -> CompressionFormat {
        match self {
            SmartReader::Buffered(_) | SmartReader::Mapped(_) => CompressionFormat::Plain,
            SmartReader::Gzip(_) => CompressionFormat::Gzip,
            SmartReader::Bzip2(_) => CompressionFormat::Bzip2,
        }
    }
}

impl Read for SmartReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            SmartReader::Buffered(reader) => reader.read(buf),
            SmartReader::Mapped(reader) => reader.read(buf),
            SmartReader::Gzip(reader) => reader.read(buf),
            SmartReader::Bzip2(reader) => reader.read(buf),
        }
    }
}

impl BufRead for SmartReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match self {
            SmartReader::Buffered(reader) => reader.fill_buf(),
            SmartReader::Mapped(reader) => reader.fill_buf(),
            SmartReader::Gzip(reader) => reader.fill_buf(),
            SmartReader::Bzip2(reader) => reader.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            SmartReader::Buffered(reader) => reader.consume(amt),
            SmartReader::Mapped(reader) => reader.consume(amt),
            SmartReader::Gzip(reader) => reader.consume(amt),
            SmartReader::Bzip2(reader) => reader.consume(amt),
        }
    }
}

/// Create a buffered writer for an output file
pub fn create_writer<P: AsRef<Path>>(path: P) -> io::Result<BufWriter<File>> {
    let file = File::create(path)?;
    Ok(BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, file))
}

/// Buffered writer to a file, or to stdout when no path is given
pub fn create_writer_or_stdout(path: Option<&Path>) -> io::Result<Box<dyn Write>> {
    match path {
        Some(path) => Ok(Box::new(create_writer(path)?)),
        None => Ok(Box::new(BufWriter::with_capacity(
            DEFAULT_BUFFER_SIZE,
            io::stdout().lock(),
        ))),
    }
}

/// Line iterator that reuses a buffer to avoid allocations
///
/// Tracks the 1-based number of the last line returned. Lines are read as
/// bytes, so a line that is not valid UTF-8 is still consumed and counted.
pub struct LineIterator<R: BufRead> {
    reader: R,
    buffer: Vec<u8>,
    line_number: usize,
}

impl<R: BufRead> LineIterator<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(1024),
            line_number: 0,
        }
    }

    /// Read the next line with its 1-based number
    ///
    /// The outer `Err` is an I/O failure of the underlying reader. The inner
    /// `Err` is a line that was read but does not decode as UTF-8.
    pub fn next_text(&mut self) -> Option<io::Result<(usize, Result<&str, Utf8Error>)>> {
        self.buffer.clear();
        match self.reader.read_until(b'\n', &mut self.buffer) {
            Ok(0) => None,
            Ok(_) => {
                self.line_number += 1;
                if self.buffer.last() == Some(&b'\n') {
                    self.buffer.pop();
                    if self.buffer.last() == Some(&b'\r') {
                        self.buffer.pop();
                    }
                }
                Some(Ok((self.line_number, std::str::from_utf8(&self.buffer))))
            }
            Err(e) => Some(Err(e)),
        }
    }

    /// Like [`next_text`](Self::next_text), paired with the 1-based line
    /// number; undecodable lines become `InvalidData` errors
    pub fn next_numbered(&mut self) -> Option<io::Result<(usize, &str)>> {
        self.next_text().map(|result| {
            result.and_then(|(line_number, text)| {
                text.map(|line| (line_number, line))
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
            })
        })
    }

    /// Read the next line into the internal buffer
    /// Returns None at EOF, Some(Ok(&str)) on success, Some(Err) on error
    pub fn next_line(&mut self) -> Option<io::Result<&str>> {
        self.next_numbered()
            .map(|result| result.map(|(_, line)| line))
    }

    /// 1-based number of the last line returned (0 before the first read)
    pub fn line_number(&self) -> usize {
        self.line_number
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::NamedTempFile;

    #[test]
    fn test_detect_plain() -> io::Result<()> {
        let mut temp = NamedTempFile::new()?;
        writeln!(temp, "@HD\tVN:1.6")?;
        temp.flush()?;

        assert_eq!(detect_compression(temp.path())?, CompressionFormat::Plain);
        let reader = SmartReader::open(temp.path())?;
        assert!(!reader.is_mapped());
        assert_eq!(reader.compression(), CompressionFormat::Plain);
        Ok(())
    }

    #[test]
    fn test_gzip_by_magic_bytes() -> io::Result<()> {
        let mut temp = NamedTempFile::new()?;
        {
            let mut encoder = GzEncoder::new(temp.as_file_mut(), Compression::default());
            encoder.write_all(b"line1\nline2\n")?;
            encoder.finish()?;
        }

        assert_eq!(detect_compression(temp.path())?, CompressionFormat::Gzip);

        let mut iter = LineIterator::new(SmartReader::open(temp.path())?);
        assert_eq!(iter.next_line().unwrap()?, "line1");
        assert_eq!(iter.next_line().unwrap()?, "line2");
        assert!(iter.next_line().is_none());
        Ok(())
    }

    #[test]
    fn test_line_iterator_strips_crlf_and_counts() -> io::Result<()> {
        let data: &[u8] = b"a\r\nb\nc";
        let mut iter = LineIterator::new(data);

        assert_eq!(iter.line_number(), 0);
        assert_eq!(iter.next_line().unwrap()?, "a");
        assert_eq!(iter.next_line().unwrap()?, "b");
        assert_eq!(iter.next_line().unwrap()?, "c");
        assert_eq!(iter.line_number(), 3);
        assert!(iter.next_line().is_none());
        Ok(())
    }

    #[test]
    fn test_line_iterator_keeps_going_after_invalid_utf8() -> io::Result<()> {
        let data: &[u8] = b"a\nb\xff\nc\n";
        let mut iter = LineIterator::new(data);

        let (number, text) = iter.next_text().unwrap()?;
        assert_eq!((number, text), (1, Ok("a")));
        let (number, text) = iter.next_text().unwrap()?;
        assert_eq!(number, 2);
        assert!(text.is_err());
        let (number, text) = iter.next_text().unwrap()?;
        assert_eq!((number, text), (3, Ok("c")));
        assert!(iter.next_text().is_none());

        let mut strict = LineIterator::new(&b"b\xff\n"[..]);
        let err = strict.next_line().unwrap().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert_eq!(strict.line_number(), 1);
        Ok(())
    }

    #[test]
    fn test_mapped_reader_len() -> io::Result<()> {
        let mut temp = NamedTempFile::new()?;
        temp.write_all(b"test content")?;
        temp.flush()?;

        let file = File::open(temp.path())?;
        let reader = MappedReader::new(&file)?;

        assert_eq!(reader.len(), 12);
        assert!(!reader.is_empty());
        Ok(())
    }
}
