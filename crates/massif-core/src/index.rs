//! Plot index file format and I/O operations
//!
//! One file per (directory, public key, bit length) instance, named
//! `<pubkey_hex>_<bit_length>.massif`. Layout (V1):
//!
//! ```text
//! OFFSET              SIZE            FIELD
//! ─────────────────────────────────────────────────────────────
//! 0x0000              8               magic: "MASSIFDB"
//! 0x0008              4               ordinal: 1
//! 0x000C              4               bit_length (B)
//! 0x0010              33              public key (compressed SEC1)
//! 0x0031              32              pubkey hash (double SHA-256)
//! 0x0051              8               created_at (unix timestamp)
//! 0x0059              1               plotted flag
//! 0x005A              ...             reserved (zero) to 0x1000
//!
//! 0x1000              2^B × 8         table A: A[y] = x | OCCUPIED
//! 0x1000 + 2^B × 8    2^B × 16        table B: B[z] = (x | OCCUPIED,
//!                                                      x' | OCCUPIED)
//! ```
//!
//! Both tables are direct-addressed: slot `k` lives at `k × slot_size`. The
//! file is created sparse, so a never-written slot reads as zero; bit 63 of
//! each stored word is the occupancy flag, which keeps "not built"
//! distinguishable from every valid record without a side bitmap.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::info;

use crate::crypto::PublicKey;
use crate::error::{Error, Result};
use crate::plot::PlotState;
use crate::scalar::value_to_bytes;
use crate::types::{Hash, PoCValue, Record};
use crate::{valid_bit_length, MAX_BIT_LENGTH, MIN_BIT_LENGTH, RECORD_FIELD_SIZE};

/// Magic bytes identifying a Massif plot index file
pub const INDEX_MAGIC: &[u8; 8] = b"MASSIFDB";

/// Total header size (one page)
pub const HEADER_SIZE: usize = 4096;

/// Size of one table A slot
pub const A_SLOT_SIZE: usize = RECORD_FIELD_SIZE;

/// Size of one table B slot (a full record)
pub const B_SLOT_SIZE: usize = 2 * RECORD_FIELD_SIZE;

/// Occupancy flag on every stored table word. Record values are bounded by
/// 2^40, so bit 63 is never part of a value.
pub const OCCUPIED: u64 = 1 << 63;

/// Header byte offset of the plotted flag
pub(crate) const PLOTTED_FLAG_OFFSET: u64 = 0x0059;

/// On-disk format version tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ordinal {
    /// Auto-detect from an existing index; never valid for creation
    Unknown,
    /// The first (and current) format
    V1,
}

impl Ordinal {
    fn from_u32(raw: u32) -> Result<Self> {
        match raw {
            1 => Ok(Ordinal::V1),
            other => Err(Error::IndexFormat(format!("unknown ordinal {}", other))),
        }
    }

    fn as_u32(self) -> u32 {
        match self {
            // Unknown is a sentinel, never serialized
            Ordinal::Unknown => 0,
            Ordinal::V1 => 1,
        }
    }
}

/// Plot index header (stored in the first page)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHeader {
    /// Format version
    pub ordinal: Ordinal,
    /// Key-space bit length (B)
    pub bit_length: usize,
    /// Committed public key (compressed)
    pub public_key: [u8; 33],
    /// Double SHA-256 of the public key
    pub pubkey_hash: Hash,
    /// Creation timestamp
    pub created_at: u64,
    /// Set once a plot pass has run to completion
    pub plotted: bool,
}

impl IndexHeader {
    /// Create a fresh header for a new index
    pub fn new(ordinal: Ordinal, bit_length: usize, public_key: &PublicKey) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            ordinal,
            bit_length,
            public_key: public_key.serialize_compressed(),
            pubkey_hash: public_key.hash(),
            created_at,
            plotted: false,
        }
    }

    /// Serialize to bytes (one full header page)
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];

        // Magic (0x0000, 8 bytes)
        bytes[0x0000..0x0008].copy_from_slice(INDEX_MAGIC);

        // Ordinal (0x0008, 4 bytes)
        bytes[0x0008..0x000C].copy_from_slice(&self.ordinal.as_u32().to_le_bytes());

        // Bit length (0x000C, 4 bytes)
        bytes[0x000C..0x0010].copy_from_slice(&(self.bit_length as u32).to_le_bytes());

        // Public key (0x0010, 33 bytes)
        bytes[0x0010..0x0031].copy_from_slice(&self.public_key);

        // Pubkey hash (0x0031, 32 bytes)
        bytes[0x0031..0x0051].copy_from_slice(self.pubkey_hash.as_bytes());

        // Created at (0x0051, 8 bytes)
        bytes[0x0051..0x0059].copy_from_slice(&self.created_at.to_le_bytes());

        // Plotted flag (0x0059, 1 byte)
        bytes[0x0059] = self.plotted as u8;

        bytes
    }

    /// Parse and validate a header page
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::IndexFormat(format!(
                "header truncated: {} bytes",
                bytes.len()
            )));
        }
        if &bytes[0x0000..0x0008] != INDEX_MAGIC {
            return Err(Error::IndexFormat("bad magic".into()));
        }

        let ordinal = Ordinal::from_u32(u32::from_le_bytes(
            bytes[0x0008..0x000C].try_into().unwrap(),
        ))?;
        let bit_length = u32::from_le_bytes(bytes[0x000C..0x0010].try_into().unwrap()) as usize;
        if !valid_bit_length(bit_length) {
            return Err(Error::IndexFormat(format!(
                "bit length {} outside supported range {}..={}",
                bit_length, MIN_BIT_LENGTH, MAX_BIT_LENGTH
            )));
        }

        let mut public_key = [0u8; 33];
        public_key.copy_from_slice(&bytes[0x0010..0x0031]);

        let mut pkh = [0u8; 32];
        pkh.copy_from_slice(&bytes[0x0031..0x0051]);

        let created_at = u64::from_le_bytes(bytes[0x0051..0x0059].try_into().unwrap());
        let plotted = bytes[0x0059] != 0;

        Ok(Self {
            ordinal,
            bit_length,
            public_key,
            pubkey_hash: Hash::new(pkh),
            created_at,
            plotted,
        })
    }
}

#[derive(Debug)]
pub(crate) struct IndexInner {
    pub(crate) file: File,
    pub(crate) path: PathBuf,
    pub(crate) bit_length: usize,
    pub(crate) pubkey_hash: Hash,
    pub(crate) plot: Mutex<PlotState>,
    pub(crate) cancel: AtomicBool,
}

/// A direct-addressed on-disk array of plotted records.
///
/// Cheap to clone; clones share the same file handle and plot job state.
#[derive(Clone, Debug)]
pub struct PlotIndex {
    pub(crate) inner: Arc<IndexInner>,
}

impl PlotIndex {
    /// File name for a (public key, bit length) index inside its directory
    pub fn file_name(public_key: &PublicKey, bit_length: usize) -> String {
        format!("{}_{}.massif", public_key.to_hex(), bit_length)
    }

    /// Open an existing index, or create a fresh one.
    ///
    /// `Ordinal::Unknown` means "detect the format from what is already on
    /// disk" and is only legal when the index exists; creating a new index
    /// always requires an explicit ordinal. An existing file that does not
    /// match the requested (public key, bit length, ordinal) fails with an
    /// `IndexFormat` error rather than being reinterpreted.
    pub fn open(
        directory: impl AsRef<Path>,
        public_key: &PublicKey,
        ordinal: Ordinal,
        bit_length: usize,
    ) -> Result<PlotIndex> {
        if !valid_bit_length(bit_length) {
            return Err(Error::IndexFormat(format!(
                "bit length {} outside supported range {}..={}",
                bit_length, MIN_BIT_LENGTH, MAX_BIT_LENGTH
            )));
        }

        let directory = directory.as_ref();
        let path = directory.join(Self::file_name(public_key, bit_length));
        let exists = path.exists();

        if !exists && ordinal == Ordinal::Unknown {
            return Err(Error::IndexFormat(format!(
                "no existing index at {}; an explicit ordinal is required to create one",
                path.display()
            )));
        }

        std::fs::create_dir_all(directory)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let header = if exists {
            let mut page = [0u8; HEADER_SIZE];
            file.read_exact_at(&mut page, 0).map_err(|e| {
                Error::IndexFormat(format!("unreadable header in {}: {}", path.display(), e))
            })?;
            let header = IndexHeader::from_bytes(&page)?;

            if ordinal != Ordinal::Unknown && header.ordinal != ordinal {
                return Err(Error::IndexFormat(format!(
                    "index at {} has ordinal {}, requested {}",
                    path.display(),
                    header.ordinal.as_u32(),
                    ordinal.as_u32()
                )));
            }
            if header.bit_length != bit_length {
                return Err(Error::IndexFormat(format!(
                    "index at {} has bit length {}, requested {}",
                    path.display(),
                    header.bit_length,
                    bit_length
                )));
            }
            if header.public_key != public_key.serialize_compressed() {
                return Err(Error::IndexFormat(format!(
                    "index at {} is committed to a different public key",
                    path.display()
                )));
            }
            if header.pubkey_hash != public_key.hash() {
                return Err(Error::IndexFormat(format!(
                    "corrupted header in {}: pubkey hash mismatch",
                    path.display()
                )));
            }

            let expected = total_size(bit_length);
            let actual = file.metadata()?.len();
            if actual != expected {
                return Err(Error::IndexFormat(format!(
                    "index at {} is {} bytes, expected {}",
                    path.display(),
                    actual,
                    expected
                )));
            }

            header
        } else {
            let header = IndexHeader::new(ordinal, bit_length, public_key);
            file.write_all_at(&header.to_bytes(), 0)?;
            // Sparse tables: unwritten slots read as zero (unoccupied)
            file.set_len(total_size(bit_length))?;
            header
        };

        info!(
            path = %path.display(),
            bit_length,
            plotted = header.plotted,
            existing = exists,
            "opened plot index"
        );

        Ok(PlotIndex {
            inner: Arc::new(IndexInner {
                file,
                path,
                bit_length,
                pubkey_hash: header.pubkey_hash,
                plot: Mutex::new(PlotState::default()),
                cancel: AtomicBool::new(false),
            }),
        })
    }

    /// Key-space bit length (B)
    pub fn bit_length(&self) -> usize {
        self.inner.bit_length
    }

    /// Number of record slots (2^B)
    pub fn capacity(&self) -> u64 {
        1u64 << self.inner.bit_length
    }

    /// The double-SHA256 public key commitment this index was built for
    pub fn pubkey_hash(&self) -> Hash {
        self.inner.pubkey_hash
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Read the record at `key`.
    ///
    /// Fails with `KeyOutOfRange` beyond 2^B and with `NotBuilt` when
    /// nothing durable has been written at that slot. Positional read only;
    /// never blocks on an in-progress plot.
    pub fn get(&self, key: PoCValue) -> Result<Record> {
        if key >= self.capacity() {
            return Err(Error::KeyOutOfRange {
                key,
                bit_length: self.inner.bit_length,
            });
        }

        let mut slot = [0u8; B_SLOT_SIZE];
        self.inner
            .file
            .read_exact_at(&mut slot, b_table_offset(self.inner.bit_length) + key * B_SLOT_SIZE as u64)?;

        let x_word = read_word(&slot[..RECORD_FIELD_SIZE]);
        let xp_word = read_word(&slot[RECORD_FIELD_SIZE..]);
        if x_word & OCCUPIED == 0 || xp_word & OCCUPIED == 0 {
            return Err(Error::NotBuilt { key });
        }

        Ok(Record::new(
            value_to_bytes(x_word & !OCCUPIED),
            value_to_bytes(xp_word & !OCCUPIED),
        ))
    }

    /// Re-read the header page from disk
    pub fn read_header(&self) -> Result<IndexHeader> {
        let mut page = [0u8; HEADER_SIZE];
        self.inner.file.read_exact_at(&mut page, 0)?;
        IndexHeader::from_bytes(&page)
    }
}

/// Byte offset of table A
pub(crate) fn a_table_offset() -> u64 {
    HEADER_SIZE as u64
}

/// Byte offset of table B
pub(crate) fn b_table_offset(bit_length: usize) -> u64 {
    HEADER_SIZE as u64 + (1u64 << bit_length) * A_SLOT_SIZE as u64
}

/// Total file size for a given bit length
pub(crate) fn total_size(bit_length: usize) -> u64 {
    b_table_offset(bit_length) + (1u64 << bit_length) * B_SLOT_SIZE as u64
}

pub(crate) fn read_word(bytes: &[u8]) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(bytes);
    u64::from_le_bytes(word)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> PublicKey {
        PublicKey::from_hex("0372a265421441050884d204292775565b9e7d16dd574a47e64cefff0ec1829ad3")
            .unwrap()
    }

    #[test]
    fn test_header_round_trip() {
        let header = IndexHeader::new(Ordinal::V1, 24, &test_key());
        let parsed = IndexHeader::from_bytes(&header.to_bytes()).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_header_rejects_bad_magic() {
        let mut bytes = IndexHeader::new(Ordinal::V1, 24, &test_key()).to_bytes();
        bytes[0] = b'X';
        assert!(matches!(
            IndexHeader::from_bytes(&bytes),
            Err(Error::IndexFormat(_))
        ));
    }

    #[test]
    fn test_header_rejects_unknown_ordinal() {
        let mut bytes = IndexHeader::new(Ordinal::V1, 24, &test_key()).to_bytes();
        bytes[0x0008..0x000C].copy_from_slice(&7u32.to_le_bytes());
        assert!(IndexHeader::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_open_unknown_ordinal_requires_existing_index() {
        let dir = tempfile::tempdir().unwrap();
        let err = PlotIndex::open(dir.path(), &test_key(), Ordinal::Unknown, 10).unwrap_err();
        assert!(matches!(err, Error::IndexFormat(_)));
    }

    #[test]
    fn test_open_creates_sparse_file_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let index = PlotIndex::open(dir.path(), &test_key(), Ordinal::V1, 10).unwrap();
        assert_eq!(index.capacity(), 1024);

        // Auto-detect now succeeds against the file just created
        let reopened = PlotIndex::open(dir.path(), &test_key(), Ordinal::Unknown, 10).unwrap();
        assert_eq!(reopened.bit_length(), 10);
        assert!(!reopened.read_header().unwrap().plotted);
    }

    #[test]
    fn test_open_rejects_unsupported_bit_length() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PlotIndex::open(dir.path(), &test_key(), Ordinal::V1, 7).is_err());
        assert!(PlotIndex::open(dir.path(), &test_key(), Ordinal::V1, 41).is_err());
    }

    #[test]
    fn test_open_rejects_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let index = PlotIndex::open(dir.path(), &test_key(), Ordinal::V1, 10).unwrap();
        let path = index.path().to_path_buf();
        drop(index);

        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(HEADER_SIZE as u64 + 100).unwrap();
        drop(file);

        let err = PlotIndex::open(dir.path(), &test_key(), Ordinal::V1, 10).unwrap_err();
        assert!(matches!(err, Error::IndexFormat(_)));
    }

    #[test]
    fn test_get_before_plot_is_not_built() {
        let dir = tempfile::tempdir().unwrap();
        let index = PlotIndex::open(dir.path(), &test_key(), Ordinal::V1, 10).unwrap();
        assert!(matches!(index.get(0), Err(Error::NotBuilt { key: 0 })));
    }

    #[test]
    fn test_get_out_of_range_at_exact_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let index = PlotIndex::open(dir.path(), &test_key(), Ordinal::V1, 10).unwrap();
        let err = index.get(1 << 10).unwrap_err();
        assert!(matches!(err, Error::KeyOutOfRange { key, bit_length: 10 } if key == 1 << 10));
    }
}
