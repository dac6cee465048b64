use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// Default piece length used when building a descriptor: 256 KiB.
pub const DEFAULT_PIECE_LENGTH: u64 = 1 << 18;

/// Hex characters per SHA-1 digest.
const HASH_HEX_LEN: usize = 40;

/// Info section of a torrent descriptor.
///
/// The field declaration order is the canonical sorted-key order: serializing
/// this struct with `serde_json` yields the exact byte string the info hash
/// is computed over.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Info {
    pub length: u64,
    pub name: String,
    pub piece_length: u64,
    pub pieces: String,
}

/// A torrent descriptor.
///
/// Use `Metainfo::build` to create one from a file on disk, or
/// `Metainfo::load` / `Metainfo::from_json` to read one produced elsewhere.
/// Descriptors cross a trust boundary, so every decoded descriptor is
/// validated before it is handed out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Metainfo {
    pub announce: String,
    pub info: Info,
    pub info_hash: String,
}

/// Posible `Metainfo` errors.
#[derive(Debug)]
pub enum MetainfoError {
    FileError(std::io::Error),
    JsonError(serde_json::Error),
    InvalidPieceLength(u64),
    PiecesLengthMismatch { expected: usize, found: usize },
    InvalidPiecesHex,
    InfoHashMismatch,
    InvalidPieceIndex(u32),
}

impl Metainfo {
    /// Builds a new `Metainfo` for the file at `file_path`, splitting it into
    /// `piece_length`-sized pieces and hashing each one.
    ///
    /// # Errors
    /// - `InvalidPieceLength` if `piece_length` is zero or not a power of two.
    /// - `FileError` if the file could not be opened or read.
    pub fn build(
        file_path: &Path,
        announce: &str,
        piece_length: u64,
    ) -> Result<Metainfo, MetainfoError> {
        if piece_length == 0 || !piece_length.is_power_of_two() {
            return Err(MetainfoError::InvalidPieceLength(piece_length));
        }

        let file = File::open(file_path).map_err(MetainfoError::FileError)?;
        let length = file.metadata().map_err(MetainfoError::FileError)?.len();
        let mut reader = BufReader::new(file);

        let mut pieces = String::new();
        let mut buffer = vec![0u8; piece_length as usize];
        loop {
            let read = read_up_to(&mut reader, &mut buffer).map_err(MetainfoError::FileError)?;
            if read == 0 {
                break;
            }
            let digest = Sha1::digest(&buffer[..read]);
            pieces.push_str(&hex::encode(digest));
        }

        let name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "unnamed".to_string());

        let info = Info {
            length,
            name,
            piece_length,
            pieces,
        };
        let info_hash = Self::compute_info_hash(&info)?;

        Ok(Metainfo {
            announce: announce.to_string(),
            info,
            info_hash,
        })
    }

    /// Computes the info hash: SHA-1 over the canonical JSON serialization of
    /// the info section, as a lowercase hex string.
    pub fn compute_info_hash(info: &Info) -> Result<String, MetainfoError> {
        let canonical = serde_json::to_string(info).map_err(MetainfoError::JsonError)?;
        Ok(hex::encode(Sha1::digest(canonical.as_bytes())))
    }

    /// Parses and validates a descriptor from its JSON form.
    ///
    /// # Errors
    /// - `JsonError` if the bytes are not a descriptor.
    /// - `InvalidPieceLength` if the piece length is zero or not a power of two.
    /// - `PiecesLengthMismatch` if `pieces` does not hold exactly one hash per piece.
    /// - `InvalidPiecesHex` if `pieces` is not lowercase hex.
    /// - `InfoHashMismatch` if the declared info hash does not match the info section.
    pub fn from_json(bytes: &[u8]) -> Result<Metainfo, MetainfoError> {
        let meta: Metainfo = serde_json::from_slice(bytes).map_err(MetainfoError::JsonError)?;
        meta.validate()?;
        Ok(meta)
    }

    /// Serializes the descriptor for storage or transfer.
    pub fn to_json(&self) -> Result<String, MetainfoError> {
        serde_json::to_string_pretty(self).map_err(MetainfoError::JsonError)
    }

    /// Loads and validates a descriptor file.
    pub fn load(path: &Path) -> Result<Metainfo, MetainfoError> {
        let mut bytes = Vec::new();
        File::open(path)
            .and_then(|mut f| f.read_to_end(&mut bytes))
            .map_err(MetainfoError::FileError)?;
        Self::from_json(&bytes)
    }

    /// Writes the descriptor to `path` as JSON.
    pub fn save(&self, path: &Path) -> Result<(), MetainfoError> {
        let json = self.to_json()?;
        File::create(path)
            .and_then(|mut f| f.write_all(json.as_bytes()))
            .map_err(MetainfoError::FileError)
    }

    fn validate(&self) -> Result<(), MetainfoError> {
        if self.info.piece_length == 0 || !self.info.piece_length.is_power_of_two() {
            return Err(MetainfoError::InvalidPieceLength(self.info.piece_length));
        }

        let expected = self.total_pieces() as usize * HASH_HEX_LEN;
        if self.info.pieces.len() != expected {
            return Err(MetainfoError::PiecesLengthMismatch {
                expected,
                found: self.info.pieces.len(),
            });
        }

        let is_lower_hex = self
            .info
            .pieces
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !is_lower_hex {
            return Err(MetainfoError::InvalidPiecesHex);
        }

        if Self::compute_info_hash(&self.info)? != self.info_hash {
            return Err(MetainfoError::InfoHashMismatch);
        }
        Ok(())
    }

    /// Returns the name of the shared file.
    pub fn name(&self) -> String {
        self.info.name.clone()
    }

    /// Returns the length in bytes of the shared file.
    pub fn length(&self) -> u64 {
        self.info.length
    }

    /// Returns the piece length in bytes.
    pub fn piece_length(&self) -> u64 {
        self.info.piece_length
    }

    /// Returns the number of pieces of the shared file.
    pub fn total_pieces(&self) -> u32 {
        self.info.length.div_ceil(self.info.piece_length) as u32
    }

    /// Returns the size in bytes of piece `index`.
    ///
    /// Every piece has the nominal piece length except the final one, whose
    /// size is `length - (total_pieces - 1) * piece_length` and therefore
    /// always in `(0, piece_length]`.
    pub fn piece_size(&self, index: u32) -> u64 {
        let total = self.total_pieces();
        if total > 0 && index == total - 1 {
            self.info.length - (total as u64 - 1) * self.info.piece_length
        } else {
            self.info.piece_length
        }
    }

    /// Returns the expected SHA-1 digest of piece `index`.
    ///
    /// # Errors
    /// - `InvalidPieceIndex` if `index` is out of range.
    pub fn piece_hash(&self, index: u32) -> Result<[u8; 20], MetainfoError> {
        if index >= self.total_pieces() {
            return Err(MetainfoError::InvalidPieceIndex(index));
        }
        let start = index as usize * HASH_HEX_LEN;
        let bytes = hex::decode(&self.info.pieces[start..start + HASH_HEX_LEN])
            .map_err(|_| MetainfoError::InvalidPiecesHex)?;
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&bytes);
        Ok(hash)
    }

    /// Returns the info hash as the 20-byte identity used on the wire.
    pub fn info_hash_bytes(&self) -> Result<[u8; 20], MetainfoError> {
        let bytes = hex::decode(&self.info_hash).map_err(|_| MetainfoError::InvalidPiecesHex)?;
        if bytes.len() != 20 {
            return Err(MetainfoError::InfoHashMismatch);
        }
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&bytes);
        Ok(hash)
    }
}

/// Reads from `reader` until `buffer` is full or the stream ends, returning
/// the number of bytes read. A short count only happens at end of file.
fn read_up_to<R: Read>(reader: &mut R, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        let read = reader.read(&mut buffer[filled..])?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_build_computes_piece_math() {
        let path = create_test_file("test_build_computes_piece_math.bin", 2500);

        let meta = Metainfo::build(Path::new(&path), "http://localhost:8000/announce", 1024)
            .unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(meta.length(), 2500);
        assert_eq!(meta.total_pieces(), 3);
        assert_eq!(meta.piece_size(0), 1024);
        assert_eq!(meta.piece_size(1), 1024);
        assert_eq!(meta.piece_size(2), 452);
        assert_eq!(meta.info.pieces.len(), 3 * 40);
    }

    #[test]
    fn test_final_piece_size_when_length_divides_evenly() {
        let path = create_test_file("test_final_piece_even.bin", 2048);

        let meta = Metainfo::build(Path::new(&path), "http://localhost:8000/announce", 1024)
            .unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(meta.total_pieces(), 2);
        assert_eq!(meta.piece_size(1), 1024);
    }

    #[test]
    fn test_piece_hashes_match_file_contents() {
        let path = create_test_file("test_piece_hashes.bin", 1536);
        let contents = fs::read(&path).unwrap();

        let meta = Metainfo::build(Path::new(&path), "http://localhost:8000/announce", 1024)
            .unwrap();
        fs::remove_file(&path).unwrap();

        let first: [u8; 20] = Sha1::digest(&contents[..1024]).into();
        let second: [u8; 20] = Sha1::digest(&contents[1024..]).into();
        assert_eq!(meta.piece_hash(0).unwrap(), first);
        assert_eq!(meta.piece_hash(1).unwrap(), second);
        assert!(meta.piece_hash(2).is_err());
    }

    #[test]
    fn test_info_hash_is_stable_for_equal_info() {
        let info = create_test_info(100, 64);
        let first = Metainfo::compute_info_hash(&info).unwrap();
        let second = Metainfo::compute_info_hash(&info).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 40);
    }

    #[test]
    fn test_build_rejects_bad_piece_length() {
        let path = create_test_file("test_bad_piece_length.bin", 100);

        let not_power_of_two = Metainfo::build(Path::new(&path), "http://t/announce", 1000);
        let zero = Metainfo::build(Path::new(&path), "http://t/announce", 0);
        fs::remove_file(&path).unwrap();

        assert!(matches!(
            not_power_of_two,
            Err(MetainfoError::InvalidPieceLength(1000))
        ));
        assert!(matches!(zero, Err(MetainfoError::InvalidPieceLength(0))));
    }

    #[test]
    fn test_json_round_trip() {
        let path = create_test_file("test_json_round_trip.bin", 700);
        let meta = Metainfo::build(Path::new(&path), "http://localhost:8000/announce", 256)
            .unwrap();
        fs::remove_file(&path).unwrap();

        let json = meta.to_json().unwrap();
        let decoded = Metainfo::from_json(json.as_bytes()).unwrap();

        assert_eq!(decoded, meta);
    }

    #[test]
    fn test_from_json_rejects_tampered_pieces() {
        let meta = create_valid_meta("test_tampered_pieces.bin");
        let mut tampered = meta.clone();
        tampered.info.pieces = flip_first_hex_char(&tampered.info.pieces);

        let json = serde_json::to_string(&tampered).unwrap();

        assert!(matches!(
            Metainfo::from_json(json.as_bytes()),
            Err(MetainfoError::InfoHashMismatch)
        ));
    }

    #[test]
    fn test_from_json_rejects_truncated_pieces() {
        let meta = create_valid_meta("test_truncated_pieces.bin");
        let mut tampered = meta.clone();
        tampered.info.pieces.truncate(40);

        let json = serde_json::to_string(&tampered).unwrap();

        assert!(matches!(
            Metainfo::from_json(json.as_bytes()),
            Err(MetainfoError::PiecesLengthMismatch { .. })
        ));
    }

    #[test]
    fn test_from_json_rejects_wrong_info_hash() {
        let meta = create_valid_meta("test_wrong_info_hash.bin");
        let mut tampered = meta.clone();
        tampered.info_hash = flip_first_hex_char(&tampered.info_hash);

        let json = serde_json::to_string(&tampered).unwrap();

        assert!(matches!(
            Metainfo::from_json(json.as_bytes()),
            Err(MetainfoError::InfoHashMismatch)
        ));
    }

    #[test]
    fn test_save_and_load() {
        let meta = create_valid_meta("test_save_and_load.bin");
        let torrent_path = "./test_save_and_load.torrent";

        meta.save(Path::new(torrent_path)).unwrap();
        let loaded = Metainfo::load(Path::new(torrent_path)).unwrap();
        fs::remove_file(torrent_path).unwrap();

        assert_eq!(loaded, meta);
    }

    // Auxiliary functions

    fn create_test_file(name: &str, size: usize) -> String {
        let path = format!("./{}", name);
        let contents: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        fs::write(&path, contents).unwrap();
        path
    }

    fn create_valid_meta(file_name: &str) -> Metainfo {
        let path = create_test_file(file_name, 600);
        let meta =
            Metainfo::build(Path::new(&path), "http://localhost:8000/announce", 256).unwrap();
        fs::remove_file(&path).unwrap();
        meta
    }

    fn create_test_info(length: u64, piece_length: u64) -> Info {
        let pieces = "a".repeat(((length.div_ceil(piece_length)) * 40) as usize);
        Info {
            length,
            name: "example".to_string(),
            piece_length,
            pieces,
        }
    }

    fn flip_first_hex_char(hex: &str) -> String {
        let mut chars: Vec<char> = hex.chars().collect();
        chars[0] = if chars[0] == '0' { '1' } else { '0' };
        chars.into_iter().collect()
    }
}
