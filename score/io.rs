// ========================================================================================
//
//                              Submission file readers
//
// ========================================================================================
//
// Every input may be plain text or gzip-compressed (`.gz`). Matrix files are streamed a
// line at a time straight into a caller-owned buffer, so loading an `n x n` matrix never
// holds more than one row of text alongside the buffer itself.

use crate::validate::ValidationError;
use flate2::read::MultiGzDecoder;
use ndarray::{Array2, s};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

pub fn is_compressed(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ValidationError + '_ {
    move |source| ValidationError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Opens `path`, transparently decompressing `.gz` files.
pub fn open_text(path: &Path) -> Result<Box<dyn BufRead>, ValidationError> {
    let file = File::open(path).map_err(io_error(path))?;
    let reader: Box<dyn Read> = if is_compressed(path) {
        Box::new(MultiGzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(Box::new(BufReader::new(reader)))
}

/// Reads the whole (possibly compressed) file into a string.
pub fn read_text(path: &Path) -> Result<String, ValidationError> {
    let mut text = String::new();
    open_text(path)?
        .read_to_string(&mut text)
        .map_err(io_error(path))?;
    Ok(text)
}

fn parse_entry(token: &str) -> Option<f64> {
    // std also accepts the nan/inf spellings so they reach the range checks
    lexical_core::parse::<f64>(token.as_bytes())
        .ok()
        .or_else(|| token.parse().ok())
}

/// Streams an `n x n` whitespace-separated matrix into the top-left block of `buffer`.
///
/// The rest of the buffer is left as the caller prepared it. Blank lines are skipped.
/// A file with the wrong number of rows or columns is a shape error.
pub fn read_matrix_into(
    path: &Path,
    what: &'static str,
    buffer: &mut Array2<f64>,
    n: usize,
) -> Result<(), ValidationError> {
    if buffer.nrows() < n || buffer.ncols() < n {
        return Err(ValidationError::Shape {
            what: "matrix buffer",
            found: buffer.dim(),
            expected: (n, n),
        });
    }
    let mut reader = open_text(path)?;
    let mut line = String::new();
    let mut rows = 0usize;
    let mut line_number = 0usize;

    loop {
        line.clear();
        if reader.read_line(&mut line).map_err(io_error(path))? == 0 {
            break;
        }
        line_number += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if rows >= n {
            rows += 1;
            continue;
        }

        let mut row = buffer.slice_mut(s![rows, ..n]);
        let mut columns = 0usize;
        for token in trimmed.split_ascii_whitespace() {
            let value = parse_entry(token).ok_or_else(|| ValidationError::MatrixEntry {
                what,
                line: line_number,
                content: token.to_string(),
            })?;
            if columns < n {
                row[columns] = value;
            }
            columns += 1;
        }
        if columns != n {
            return Err(ValidationError::Shape {
                what,
                found: (rows + 1, columns),
                expected: (n, n),
            });
        }
        rows += 1;
    }

    if rows != n {
        return Err(ValidationError::Shape {
            what,
            found: (rows, n),
            expected: (n, n),
        });
    }
    Ok(())
}

/// Loads an `n x n` matrix into the top-left block of a `size x size` identity buffer.
///
/// Oversizing the buffer leaves room for pseudo counts to be added in place.
pub fn read_matrix_in_identity(
    path: &Path,
    what: &'static str,
    n: usize,
    size: usize,
) -> Result<Array2<f64>, ValidationError> {
    let mut buffer = Array2::eye(size.max(n));
    read_matrix_into(path, what, &mut buffer, n)?;
    Ok(buffer)
}

/// Loads an `n x n` matrix into a zeroed buffer of its own size.
pub fn read_matrix(path: &Path, what: &'static str, n: usize) -> Result<Array2<f64>, ValidationError> {
    let mut buffer = Array2::zeros((n, n));
    read_matrix_into(path, what, &mut buffer, n)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use ndarray::array;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn reads_plain_and_gzip_text() {
        let dir = tempdir().unwrap();
        let plain = dir.path().join("in.txt");
        std::fs::write(&plain, "1\n2\n").unwrap();
        assert_eq!(read_text(&plain).unwrap(), "1\n2\n");

        let packed = dir.path().join("in.txt.gz");
        let mut encoder = GzEncoder::new(File::create(&packed).unwrap(), Compression::default());
        encoder.write_all(b"1\n2\n").unwrap();
        encoder.finish().unwrap();
        assert!(is_compressed(&packed));
        assert_eq!(read_text(&packed).unwrap(), "1\n2\n");
    }

    #[test]
    fn missing_file_reports_path() {
        let err = read_text(Path::new("/definitely/not/here.txt")).unwrap_err();
        assert!(matches!(err, ValidationError::Io { .. }));
        assert!(err.to_string().contains("/definitely/not/here.txt"));
    }

    #[test]
    fn matrix_lands_in_identity_buffer() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ccm.txt");
        std::fs::write(&path, "1\t0.5\n\n0.5 1\n").unwrap();
        let buffer = read_matrix_in_identity(&path, "Co-clustering", 2, 4).unwrap();
        assert_eq!(buffer.dim(), (4, 4));
        assert_eq!(buffer.slice(s![..2, ..2]), array![[1.0, 0.5], [0.5, 1.0]]);
        assert_eq!(buffer.slice(s![2.., 2..]), Array2::<f64>::eye(2));
    }

    #[test]
    fn special_values_parse_for_later_checks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ccm.txt");
        std::fs::write(&path, "1 nan\ninf 1\n").unwrap();
        let matrix = read_matrix(&path, "Co-clustering", 2).unwrap();
        assert!(matrix[[0, 1]].is_nan());
        assert!(matrix[[1, 0]].is_infinite());
    }

    #[test]
    fn malformed_matrices_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ccm.txt");

        std::fs::write(&path, "1 x\n0 1\n").unwrap();
        assert!(matches!(
            read_matrix(&path, "AD", 2),
            Err(ValidationError::MatrixEntry { line: 1, .. })
        ));

        std::fs::write(&path, "1 0 0\n0 1 0\n").unwrap();
        assert!(matches!(
            read_matrix(&path, "AD", 2),
            Err(ValidationError::Shape { found: (1, 3), .. })
        ));

        std::fs::write(&path, "1 0\n0 1\n0 0\n").unwrap();
        assert!(matches!(
            read_matrix(&path, "AD", 2),
            Err(ValidationError::Shape { found: (3, 2), .. })
        ));
    }
}
