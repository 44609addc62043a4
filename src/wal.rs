use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Encode one commit (all events of one store operation) as a single record.
fn encode_commit(writer: &mut impl Write, events: &[Event]) -> io::Result<()> {
    let payload =
        bincode::serialize(events).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "commit too large"))?;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(())
}

/// Read exactly `buf.len()` bytes. `Ok(false)` on a clean or torn end of file.
fn read_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Append-only commit log for the calendar.
///
/// Format per record: `[u32: len][bincode: Vec<Event>][u32: crc32]`
/// - One record holds every event of one store operation, so a series insert
///   or a scrub is replayed completely or not at all.
/// - A torn or corrupt trailing record is discarded on replay and cut off by
///   [`Wal::recover`].
/// - Bytes past the last successful `flush_sync` can be dropped with
///   [`Wal::rollback`], so a failed batch never resurfaces on replay.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    /// File length after the last successful `flush_sync`.
    synced_len: u64,
    /// Set while the file may hold bytes nobody was told about.
    poisoned: bool,
    appends_since_compact: u64,
    #[cfg(test)]
    fail_after: Option<usize>,
}

impl Wal {
    fn from_file(file: File, path: &Path, synced_len: u64) -> Self {
        Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            synced_len,
            poisoned: false,
            appends_since_compact: 0,
            #[cfg(test)]
            fail_after: None,
        }
    }

    /// Open (or create) the log at `path` without inspecting its contents.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len = file.metadata()?.len();
        Ok(Self::from_file(file, path, len))
    }

    /// Replay the log and open it for appending. A torn or corrupt tail is
    /// truncated so new commits land directly behind the last intact one.
    pub fn recover(path: &Path) -> io::Result<(Self, Vec<Event>)> {
        let (events, valid_len) = scan(path)?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let on_disk = file.metadata()?.len();
        if on_disk > valid_len {
            tracing::warn!(
                "wal: truncating {} bytes of damaged tail from {}",
                on_disk - valid_len,
                path.display()
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }
        Ok((Self::from_file(file, path, valid_len), events))
    }

    /// Buffer one commit without flushing. Follow with `flush_sync()`.
    pub fn append_buffered(&mut self, events: &[Event]) -> io::Result<()> {
        if self.poisoned {
            return Err(io::Error::other("wal is unusable after a failed rollback"));
        }
        #[cfg(test)]
        if let Some(remaining) = self.fail_after.as_mut() {
            if *remaining == 0 {
                return Err(io::Error::other("injected append failure"));
            }
            *remaining -= 1;
        }
        encode_commit(&mut self.writer, events)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    /// Append one commit and fsync. Tests only; the writer task batches.
    #[cfg(test)]
    pub fn append(&mut self, events: &[Event]) -> io::Result<()> {
        self.append_buffered(events)?;
        self.flush_sync()
    }

    /// Let `n` more appends succeed, then fail every one after.
    #[cfg(test)]
    pub fn fail_appends_after(&mut self, n: usize) {
        self.fail_after = Some(n);
    }

    /// Flush the BufWriter and fsync the underlying file.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        let file = self.writer.get_ref();
        file.sync_all()?;
        self.synced_len = file.metadata()?.len();
        Ok(())
    }

    /// Discard everything appended since the last successful `flush_sync`,
    /// both still-buffered bytes and bytes that already reached the file.
    ///
    /// If this fails the log refuses further appends.
    pub fn rollback(&mut self) -> io::Result<()> {
        self.poisoned = true;
        let file = OpenOptions::new().append(true).open(&self.path)?;
        // into_parts hands back the buffer instead of flushing it on drop.
        let (_, _unwritten) = std::mem::replace(&mut self.writer, BufWriter::new(file)).into_parts();
        let file = self.writer.get_ref();
        file.set_len(self.synced_len)?;
        file.sync_all()?;
        self.poisoned = false;
        Ok(())
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Replace the log with a single snapshot commit.
    /// The snapshot goes to a temp file first and is renamed over the log.
    pub fn rewrite(&mut self, snapshot: &[Event]) -> io::Result<()> {
        let tmp_path = self.path.with_extension("wal.tmp");
        {
            let mut tmp = BufWriter::new(File::create(&tmp_path)?);
            encode_commit(&mut tmp, snapshot)?;
            tmp.flush()?;
            tmp.get_ref().sync_all()?;
        }
        self.writer.flush()?;
        fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.synced_len = file.metadata()?.len();
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }

    /// Replay the log from disk, returning all events of all intact commits in order.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        scan(path).map(|(events, _)| events)
    }
}

/// Read every intact commit. Also returns the byte length of that intact prefix.
fn scan(path: &Path) -> io::Result<(Vec<Event>, u64)> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(e) => return Err(e),
    };
    let mut reader = BufReader::new(file);
    let mut events = Vec::new();
    let mut valid_len = 0u64;

    loop {
        let mut len_buf = [0u8; 4];
        if !read_or_eof(&mut reader, &mut len_buf)? {
            break;
        }
        let len = u32::from_le_bytes(len_buf) as usize;

        let mut payload = vec![0u8; len];
        if !read_or_eof(&mut reader, &mut payload)? {
            break;
        }

        let mut crc_buf = [0u8; 4];
        if !read_or_eof(&mut reader, &mut crc_buf)? {
            break;
        }
        if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
            tracing::warn!("wal: checksum mismatch, ignoring tail of {}", path.display());
            break;
        }

        match bincode::deserialize::<Vec<Event>>(&payload) {
            Ok(commit) => events.extend(commit),
            Err(_) => break,
        }
        valid_len += 8 + len as u64;
    }

    Ok((events, valid_len))
}
