use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use metafile::metainfo::Metainfo;

/// Writes the completed pieces to `path` in index order, syncs the file to
/// disk and verifies the final size equals the metadata length.
///
/// The caller keeps ownership of `pieces`; on error the buffered pieces are
/// untouched so they can be retained for recovery.
pub fn assemble_file(
    path: &Path,
    pieces: &HashMap<u32, Vec<u8>>,
    meta: &Metainfo,
) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut file = File::create(path)?;
    for index in 0..meta.total_pieces() {
        let piece = pieces.get(&index).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("missing piece {} at reassembly", index),
            )
        })?;
        file.write_all(piece)?;
    }
    file.sync_all()?;

    let written = file.metadata()?.len();
    if written != meta.length() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "reassembled size {} does not match metadata length {}",
                written,
                meta.length()
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_writes_pieces_in_order() {
        let contents: Vec<u8> = (0..700u32).map(|i| (i % 255) as u8).collect();
        let meta = create_test_meta("test_assemble_in_order.bin", &contents);
        let output = "./test_assemble_in_order.out";

        let mut pieces = HashMap::new();
        pieces.insert(0, contents[..256].to_vec());
        pieces.insert(1, contents[256..512].to_vec());
        pieces.insert(2, contents[512..].to_vec());

        assemble_file(Path::new(output), &pieces, &meta).unwrap();
        let written = fs::read(output).unwrap();
        fs::remove_file(output).unwrap();

        assert_eq!(written, contents);
    }

    #[test]
    fn test_assemble_fails_on_missing_piece() {
        let contents: Vec<u8> = vec![7; 700];
        let meta = create_test_meta("test_assemble_missing_piece.bin", &contents);
        let output = "./test_assemble_missing_piece.out";

        let mut pieces = HashMap::new();
        pieces.insert(0, contents[..256].to_vec());
        pieces.insert(2, contents[512..].to_vec());

        let result = assemble_file(Path::new(output), &pieces, &meta);
        let _ = fs::remove_file(output);

        assert!(result.is_err());
    }

    #[test]
    fn test_assemble_fails_on_wrong_piece_size() {
        let contents: Vec<u8> = vec![9; 600];
        let meta = create_test_meta("test_assemble_wrong_size.bin", &contents);
        let output = "./test_assemble_wrong_size.out";

        let mut pieces = HashMap::new();
        pieces.insert(0, contents[..256].to_vec());
        pieces.insert(1, contents[256..512].to_vec());
        pieces.insert(2, vec![9; 10]); // truncated final piece

        let result = assemble_file(Path::new(output), &pieces, &meta);
        let _ = fs::remove_file(output);

        assert!(result.is_err());
    }

    // Auxiliary functions

    fn create_test_meta(file_name: &str, contents: &[u8]) -> Metainfo {
        let path = format!("./{}", file_name);
        fs::write(&path, contents).unwrap();
        let meta = Metainfo::build(Path::new(&path), "http://localhost:8000/announce", 256).unwrap();
        fs::remove_file(&path).unwrap();
        meta
    }
}
