use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use metafile::metainfo::{Metainfo, MetainfoError};
use sha1::{Digest, Sha1};

use crate::peer::peer_message::Bitfield;

/// Posible `PieceStore` errors.
#[derive(Debug)]
pub enum PieceStoreError {
    FileError(std::io::Error),
    LengthMismatch { expected: u64, found: u64 },
    PieceHashMismatch(u32),
    MetainfoError(MetainfoError),
}

/// The pieces of the backing file, pre-split at startup and held read-only
/// for the lifetime of the seeder.
#[derive(Debug)]
pub struct PieceStore {
    pieces: Vec<Vec<u8>>,
}

impl PieceStore {
    /// Loads the backing file, splits it into pieces and verifies every
    /// piece hash against the descriptor.
    ///
    /// # Errors
    /// - `FileError` if the file could not be read.
    /// - `LengthMismatch` if the file size differs from the descriptor.
    /// - `PieceHashMismatch` if a piece does not hash to its expected digest.
    pub fn load(meta: &Metainfo, file_path: &Path) -> Result<PieceStore, PieceStoreError> {
        let file = File::open(file_path).map_err(PieceStoreError::FileError)?;
        let found = file.metadata().map_err(PieceStoreError::FileError)?.len();
        if found != meta.length() {
            return Err(PieceStoreError::LengthMismatch {
                expected: meta.length(),
                found,
            });
        }

        let mut reader = BufReader::new(file);
        let mut pieces = Vec::with_capacity(meta.total_pieces() as usize);
        for index in 0..meta.total_pieces() {
            let mut piece = vec![0u8; meta.piece_size(index) as usize];
            reader
                .read_exact(&mut piece)
                .map_err(PieceStoreError::FileError)?;

            let digest: [u8; 20] = Sha1::digest(&piece).into();
            let expected = meta
                .piece_hash(index)
                .map_err(PieceStoreError::MetainfoError)?;
            if digest != expected {
                return Err(PieceStoreError::PieceHashMismatch(index));
            }
            pieces.push(piece);
        }

        Ok(PieceStore { pieces })
    }

    /// Returns the bytes of piece `index`, if it exists.
    pub fn piece(&self, index: u32) -> Option<&[u8]> {
        self.pieces.get(index as usize).map(|piece| piece.as_slice())
    }

    pub fn total_pieces(&self) -> u32 {
        self.pieces.len() as u32
    }

    /// Returns the bitfield advertising every piece.
    pub fn bitfield(&self) -> Bitfield {
        Bitfield::all_set(self.total_pieces())
    }
}
