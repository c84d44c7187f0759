//! Temporary tape storage.

use std::fs;
use std::io;
use std::io::prelude::*;
use std::path::Path;

/// A sequential, rewindable stream of records backed by an anonymous temporary file,
/// together with the number of records currently stored on it.
///
/// The count is the tape's sole framing: it must be exhausted by exactly that many
/// codec reads before the tape is empty. The backing file is unlinked on creation,
/// so dropping a tape reclaims its storage on every exit path.
pub(crate) struct Tape {
    pub file: fs::File,
    pub count: u64,
}

impl Tape {
    /// Creates an empty tape inside the given directory.
    pub fn create(dir: &Path) -> io::Result<Tape> {
        let file = tempfile::tempfile_in(dir)?;

        return Ok(Tape { file, count: 0 });
    }

    /// Repositions the tape to its start for reading.
    pub fn rewind(&mut self) -> io::Result<()> {
        self.file.seek(io::SeekFrom::Start(0))?;

        return Ok(());
    }
}

#[cfg(test)]
mod test {
    use std::io::prelude::*;

    use super::Tape;

    #[test]
    fn test_tape_rewind() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let mut tape = Tape::create(tmp_dir.path()).unwrap();

        tape.file.write_all(b"payload").unwrap();
        tape.count = 1;
        tape.rewind().unwrap();

        let mut restored = String::new();
        tape.file.read_to_string(&mut restored).unwrap();
        assert_eq!(restored, "payload");
    }
}
