//! Shebang parsing (spec §4.1).
//!
//! Reads the first line of a file and extracts the interpreter path from
//! a `#!` header, without ever executing the file.

use std::io::Read as _;
use std::path::{Path, PathBuf};

use crate::error::ShebangError;

/// Upper bound on how many bytes of the file we'll read looking for the
/// first newline. Guards against being handed a huge binary with no
/// newline near the start.
const MAX_FIRST_LINE_BYTES: usize = 4096;

/// Parse the interpreter path out of a file's shebang line.
///
/// Opens `path`, reads at most [`MAX_FIRST_LINE_BYTES`], trims
/// surrounding whitespace, and requires the line to start with `#!`. The
/// remainder is split on ASCII whitespace; the first field is the
/// interpreter. The handle is closed on every exit path (it's a local
/// `File` that drops at the end of this function's scope either way).
pub fn parse_interpreter(path: &Path) -> Result<String, ShebangError> {
    let line = read_first_line(path)?;
    let trimmed = line.trim();

    let Some(rest) = trimmed.strip_prefix("#!") else {
        return Err(ShebangError::InvalidPrefix {
            path: path.to_path_buf(),
            line: trimmed.to_string(),
        });
    };

    let mut fields = rest.trim().split_ascii_whitespace();
    match fields.next() {
        Some(interpreter) => Ok(interpreter.to_string()),
        None => Err(ShebangError::IncorrectFieldCount {
            path: path.to_path_buf(),
            line: trimmed.to_string(),
            count: 0,
        }),
    }
}

fn read_first_line(path: &Path) -> Result<String, ShebangError> {
    let mut file = std::fs::File::open(path).map_err(|source| ShebangError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;

    let mut buf = vec![0u8; MAX_FIRST_LINE_BYTES];
    let n = file.read(&mut buf).map_err(|source| ShebangError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    buf.truncate(n);

    let text = String::from_utf8_lossy(&buf);
    let first_line = text.lines().next().unwrap_or("");
    Ok(first_line.to_string())
}

/// Convenience used by discovery: attempt a shebang parse, folding
/// `InvalidPrefix`/`IncorrectFieldCount` into "no interpreter" (native
/// binary) per spec §4.3, while still surfacing `FileRead` to the caller
/// so it can be logged at error level.
pub fn interpreter_or_native(path: &Path) -> Result<Option<String>, ShebangError> {
    match parse_interpreter(path) {
        Ok(interpreter) => Ok(Some(interpreter)),
        Err(ShebangError::InvalidPrefix { .. } | ShebangError::IncorrectFieldCount { .. }) => Ok(None),
        Err(err @ ShebangError::FileRead { .. }) => Err(err),
    }
}

/// Strip a filename's extension (everything from the last `.` onward),
/// used by directory-scan discovery to derive a tool name from a path.
#[must_use]
pub fn tool_name_from_filename(path: &Path) -> String {
    let stem = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    match stem.rfind('.') {
        Some(0) | None => stem.to_string(),
        Some(idx) => stem[..idx].to_string(),
    }
}
