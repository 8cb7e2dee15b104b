use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// File header: magic + format version.
const HEADER: &[u8; 8] = b"ROTAPL\x00\x01";

/// Frame a single record as `[u32 len][bincode][u32 crc32]`. A payload too
/// large for replay to accept is refused before anything is written.
fn write_record(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if payload.len() > MAX_RECORD_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("record of {} bytes exceeds the frame limit", payload.len()),
        ));
    }
    writer.write_all(&(payload.len() as u32).to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// Upper bound on one frame's payload. A larger length word is corruption.
const MAX_RECORD_LEN: usize = 1 << 20;

/// Read one framed record and its size on disk. `Ok(None)` on a clean end,
/// a torn frame, a CRC mismatch or an undecodable payload: everything after
/// it is dropped.
fn read_record(reader: &mut impl Read) -> io::Result<Option<(Event, u64)>> {
    let mut word = [0u8; 4];
    if !read_full(reader, &mut word)? {
        return Ok(None);
    }
    let len = u32::from_le_bytes(word) as usize;
    if len > MAX_RECORD_LEN {
        return Ok(None);
    }
    let mut payload = vec![0u8; len];
    if !read_full(reader, &mut payload)? || !read_full(reader, &mut word)? {
        return Ok(None);
    }
    if u32::from_le_bytes(word) != crc32fast::hash(&payload) {
        return Ok(None);
    }
    Ok(bincode::deserialize(&payload)
        .ok()
        .map(|event| (event, (len + 8) as u64)))
}

fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

fn open_for_append(path: &Path) -> io::Result<BufWriter<File>> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if file.metadata()?.len() == 0 {
        file.write_all(HEADER)?;
        file.sync_all()?;
    }
    Ok(BufWriter::new(file))
}

/// Append-only journal of reconciliation events.
///
/// Layout: an 8-byte header, then one frame per event. A crash mid-append
/// leaves at most one torn frame at the tail, which replay discards. A write
/// that fails while running is undone with `rollback`; a journal whose
/// rollback also failed refuses every later append.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
    /// File length and append count at the last successful `flush_sync`.
    committed_len: u64,
    committed_appends: u64,
    failed: bool,
}

impl Wal {
    pub fn open(path: &Path) -> io::Result<Self> {
        let writer = open_for_append(path)?;
        let committed_len = writer.get_ref().metadata()?.len();
        Ok(Self {
            writer,
            path: path.to_path_buf(),
            appends_since_compact: 0,
            committed_len,
            committed_appends: 0,
            failed: false,
        })
    }

    /// Append and fsync one event. Production code batches through
    /// `append_buffered` + `flush_sync`.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        if self.failed {
            return Err(io::Error::other(format!(
                "{} is in an unknown state after a failed write, restart to replay it",
                self.path.display()
            )));
        }
        write_record(&mut self.writer, event)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.committed_len = self.writer.get_ref().metadata()?.len();
        self.committed_appends = self.appends_since_compact;
        Ok(())
    }

    /// Throw away everything written since the last successful `flush_sync`,
    /// buffered or already in the file. On failure the journal is marked
    /// failed.
    pub fn rollback(&mut self) -> io::Result<()> {
        let result = self.truncate_to_committed();
        if result.is_err() {
            self.failed = true;
        }
        result
    }

    fn truncate_to_committed(&mut self) -> io::Result<()> {
        let fresh = open_for_append(&self.path)?;
        let stale = std::mem::replace(&mut self.writer, fresh);
        // into_parts hands back the unflushed bytes instead of writing them.
        let _ = stale.into_parts();
        let file = self.writer.get_ref();
        file.set_len(self.committed_len)?;
        file.sync_all()?;
        self.appends_since_compact = self.committed_appends;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    fn compact_tmp_path(path: &Path) -> PathBuf {
        path.with_extension("wal.tmp")
    }

    /// Write a compacted journal next to the live one. Slow; runs before the swap.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(Self::compact_tmp_path(path))?);
        writer.write_all(HEADER)?;
        for event in events {
            write_record(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the compacted journal over the live one and reopen it.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        fs::rename(Self::compact_tmp_path(&self.path), &self.path)?;
        let fresh = open_for_append(&self.path)?;
        let _ = std::mem::replace(&mut self.writer, fresh).into_parts();
        self.committed_len = self.writer.get_ref().metadata()?.len();
        self.appends_since_compact = 0;
        self.committed_appends = 0;
        self.failed = false;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    /// Read every intact event and cut off a torn tail, so later appends
    /// land right after the last good frame. A missing file is an empty
    /// journal; a file with a foreign header is an error.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);

        let mut header = [0u8; HEADER.len()];
        if !read_full(&mut reader, &mut header)? {
            // Torn header: start over with an empty journal.
            OpenOptions::new().write(true).open(path)?.set_len(0)?;
            return Ok(Vec::new());
        }
        if &header != HEADER {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} is not a rotaplan journal", path.display()),
            ));
        }

        let mut events = Vec::new();
        let mut valid_len = HEADER.len() as u64;
        while let Some((event, size)) = read_record(&mut reader)? {
            events.push(event);
            valid_len += size;
        }

        let file_len = reader.get_ref().metadata()?.len();
        if file_len > valid_len {
            tracing::warn!(
                dropped_bytes = file_len - valid_len,
                "discarding torn tail of {}",
                path.display()
            );
            OpenOptions::new().write(true).open(path)?.set_len(valid_len)?;
        }
        Ok(events)
    }
}
