//! SIEVE - Local Filter Backend
//! An in-process bit vector with explicit file persistence.
//!
//! Nothing is written to disk unless `persist` is called; a crash
//! loses every add since the last persist.

use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::config::FilterParams;
use crate::error::{Result, SieveError};
use crate::types::FilterIdentity;

use super::bloom::{BitVector, Geometry};
use super::MembershipFilter;

const IMAGE_MAGIC: &[u8; 4] = b"SIEV";
const IMAGE_VERSION: u16 = 2;

/// Bloom filter held in memory, persisted to `{store_dir}/{identity}`.
///
/// ## Image Format
/// ```text
/// [magic: "SIEV"][version: 2 bytes (LE)][bincode(FilterParams, BitVector): N bytes][crc: 4 bytes (LE)]
/// ```
/// The CRC32 covers every byte before it. The params travel with the bits
/// so a restored filter reports the capacity it was sized for.
pub struct LocalFilter {
    identity: FilterIdentity,
    params: FilterParams,
    store_dir: PathBuf,
    path: PathBuf,
    bits: BitVector,
    /// Set once the overwrite warning has been logged.
    overwrite_warned: bool,
}

impl LocalFilter {
    /// Create an empty filter. The store directory is created if absent
    /// and must be writable.
    /// An existing image is left untouched until `persist` or `restore`.
    pub fn open(
        identity: FilterIdentity,
        params: FilterParams,
        store_dir: impl AsRef<Path>,
    ) -> Result<Self> {
        params.validate()?;

        let store_dir = store_dir.as_ref();
        fs::create_dir_all(store_dir)?;
        // Unnamed scratch file, gone as soon as it is dropped.
        tempfile::tempfile_in(store_dir).map_err(|e| {
            SieveError::Config(format!(
                "store directory {:?} is not writable: {}",
                store_dir, e
            ))
        })?;
        let path = store_dir.join(identity.as_str());

        let overwrite_warned = path.exists();
        if overwrite_warned {
            log::warn!(
                "filter image {:?} already exists and will be overwritten on persist",
                path
            );
        }

        let bits = BitVector::try_new(&params)?;
        log::debug!(
            "local filter '{}' opened: {} bits, {} hashes, image {:?}",
            identity,
            bits.num_bits(),
            bits.num_hashes(),
            path
        );

        Ok(Self {
            identity,
            params,
            store_dir: store_dir.to_path_buf(),
            path,
            bits,
            overwrite_warned,
        })
    }

    pub fn identity(&self) -> &FilterIdentity {
        &self.identity
    }

    pub fn params(&self) -> &FilterParams {
        &self.params
    }

    /// Path of the persisted image.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Approximate number of distinct items added.
    pub fn len(&self) -> u64 {
        self.bits.count()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.count() == 0
    }

    pub fn estimated_fpr(&self) -> f64 {
        self.bits.estimated_fpr()
    }

    pub fn memory_usage(&self) -> usize {
        self.bits.memory_usage()
    }

    fn encode_image(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.bits.memory_usage() + 64);
        buf.extend_from_slice(IMAGE_MAGIC);
        buf.extend_from_slice(&IMAGE_VERSION.to_le_bytes());
        bincode::serialize_into(&mut buf, &(&self.params, &self.bits))?;
        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        Ok(buf)
    }

    fn decode_image(data: &[u8]) -> Result<(FilterParams, BitVector)> {
        let header = IMAGE_MAGIC.len() + 2;
        if data.len() < header + 4 {
            return Err(SieveError::Corruption(format!(
                "image too short ({} bytes)",
                data.len()
            )));
        }
        if &data[..4] != IMAGE_MAGIC {
            return Err(SieveError::Corruption("bad image magic".into()));
        }
        let version = u16::from_le_bytes([data[4], data[5]]);
        if version != IMAGE_VERSION {
            return Err(SieveError::Corruption(format!(
                "unsupported image version {}",
                version
            )));
        }

        let (body, trailer) = data.split_at(data.len() - 4);
        let stored = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let actual = crc32fast::hash(body);
        if stored != actual {
            return Err(SieveError::Corruption(format!(
                "checksum mismatch: expected {:#x}, got {:#x}",
                stored, actual
            )));
        }

        let (params, bits): (FilterParams, BitVector) = bincode::deserialize(&body[header..])?;
        if !bits.is_well_formed() {
            return Err(SieveError::Corruption(
                "bit array length does not match geometry".into(),
            ));
        }
        params
            .validate()
            .map_err(|e| SieveError::Corruption(format!("image params: {}", e)))?;
        if Geometry::for_params(&params) != bits.geometry() {
            return Err(SieveError::Corruption(format!(
                "geometry {:?} does not match image params {:?}",
                bits.geometry(),
                params
            )));
        }
        Ok((params, bits))
    }
}

impl MembershipFilter for LocalFilter {
    fn add(&mut self, item: &[u8]) -> Result<bool> {
        // The bit vector reports "newly inserted"; the contract is "already present".
        Ok(!self.bits.insert(item))
    }

    fn add_all<I>(&mut self, items: I) -> Result<Vec<bool>>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        Ok(items
            .into_iter()
            .map(|item| !self.bits.insert(item.as_ref()))
            .collect())
    }

    fn contains(&self, item: &[u8]) -> Result<bool> {
        Ok(self.bits.may_contain(item))
    }

    fn contains_all<I>(&self, items: I) -> Result<Vec<bool>>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        Ok(items
            .into_iter()
            .map(|item| self.bits.may_contain(item.as_ref()))
            .collect())
    }

    /// Write the image to a fresh temporary file in the store directory,
    /// then rename it over the target. A failed write leaves no file behind.
    fn persist(&mut self) -> Result<()> {
        if !self.overwrite_warned && self.path.exists() {
            log::warn!("overwriting filter image {:?}", self.path);
            self.overwrite_warned = true;
        }

        let image = self.encode_image()?;
        let mut tmp = NamedTempFile::new_in(&self.store_dir)?;
        tmp.write_all(&image)?;
        tmp.as_file().sync_all()?; // fsync before the rename makes it visible
        tmp.persist(&self.path).map_err(|e| e.error)?;
        // Later persists overwrite our own image; no need to warn again.
        self.overwrite_warned = true;

        log::info!(
            "filter '{}' persisted to {:?} ({} bytes)",
            self.identity,
            self.path,
            image.len()
        );
        Ok(())
    }

    fn restore(&mut self) -> Result<()> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SieveError::NotFound(self.path.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        let (params, bits) = Self::decode_image(&data)?;
        if params != self.params {
            log::warn!(
                "filter '{}' image was sized for {:?}, configured {:?}; using the image",
                self.identity,
                params,
                self.params
            );
        }
        self.params = params;
        self.bits = bits;
        self.overwrite_warned = true;

        log::info!(
            "filter '{}' restored from {:?} (~{} items)",
            self.identity,
            self.path,
            self.bits.count()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_in(dir: &Path, name: &str) -> LocalFilter {
        LocalFilter::open(
            FilterIdentity::new(name).unwrap(),
            FilterParams::new(1000, 0.01),
            dir,
        )
        .unwrap()
    }

    #[test]
    fn test_add_reports_already_present() {
        let dir = tempfile::tempdir().unwrap();
        let mut filter = open_in(dir.path(), "urls");

        assert!(!filter.add(b"https://a.example/").unwrap());
        assert!(filter.add(b"https://a.example/").unwrap());
        assert!(filter.contains(b"https://a.example/").unwrap());
        assert_eq!(filter.len(), 1);
    }

    #[test]
    fn test_add_all_sees_earlier_batch_entries() {
        let dir = tempfile::tempdir().unwrap();
        let mut filter = open_in(dir.path(), "urls");

        let flags = filter.add_all(["x", "y", "x"]).unwrap();
        assert_eq!(flags, vec![false, false, true]);
    }

    #[test]
    fn test_contains_all_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut filter = open_in(dir.path(), "urls");
        filter.add(b"b").unwrap();

        let found = filter.contains_all(["a", "b", "c"]).unwrap();
        assert_eq!(found.len(), 3);
        assert!(found[1]);
    }

    #[test]
    fn test_creates_store_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let filter = open_in(&nested, "urls");
        assert!(nested.is_dir());
        assert_eq!(filter.path(), nested.join("urls"));
    }

    #[test]
    fn test_restore_without_image() {
        let dir = tempfile::tempdir().unwrap();
        let mut filter = open_in(dir.path(), "urls");
        assert!(matches!(filter.restore(), Err(SieveError::NotFound(_))));
        // Still usable in memory.
        assert!(!filter.add(b"a").unwrap());
    }

    #[test]
    fn test_persist_restore_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut filter = open_in(dir.path(), "urls");
            filter.add_all(["a", "b", "c"]).unwrap();
            filter.persist().unwrap();
        }

        let mut filter = open_in(dir.path(), "urls");
        assert!(!filter.contains(b"a").unwrap());
        filter.restore().unwrap();
        assert_eq!(filter.contains_all(["a", "b", "c"]).unwrap(), vec![true; 3]);
        assert_eq!(filter.len(), 3);

        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("urls")]);
    }

    #[test]
    fn test_persist_leaves_similarly_named_images_alone() {
        let dir = tempfile::tempdir().unwrap();
        let mut scratch = open_in(dir.path(), "urls.tmp");
        scratch.add(b"keep-me").unwrap();
        scratch.persist().unwrap();

        let mut urls = open_in(dir.path(), "urls");
        urls.add(b"other").unwrap();
        urls.persist().unwrap();

        let mut reopened = open_in(dir.path(), "urls.tmp");
        reopened.restore().unwrap();
        assert!(reopened.contains(b"keep-me").unwrap());
        assert!(!reopened.contains(b"other").unwrap());
    }

    #[test]
    fn test_restore_adopts_image_params() {
        let dir = tempfile::tempdir().unwrap();
        let small = FilterParams::new(100, 0.1);
        let mut filter =
            LocalFilter::open(FilterIdentity::new("urls").unwrap(), small, dir.path()).unwrap();
        filter.add(b"a").unwrap();
        filter.persist().unwrap();

        let mut filter = LocalFilter::open(
            FilterIdentity::new("urls").unwrap(),
            FilterParams::new(100_000, 0.0001),
            dir.path(),
        )
        .unwrap();
        filter.restore().unwrap();
        assert_eq!(*filter.params(), small);
        assert_eq!(filter.bits.geometry(), Geometry::for_params(&small));
        assert!(filter.contains(b"a").unwrap());
    }

    #[test]
    fn test_image_with_inconsistent_params_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut filter = open_in(dir.path(), "urls");
        filter.params = FilterParams::new(5, 0.5);
        filter.persist().unwrap();

        let mut reopened = open_in(dir.path(), "urls");
        assert!(matches!(reopened.restore(), Err(SieveError::Corruption(_))));
        assert_eq!(reopened.params().capacity, 1000);
    }

    #[test]
    fn test_store_dir_that_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let not_a_dir = dir.path().join("plain");
        fs::write(&not_a_dir, b"").unwrap();

        let result = LocalFilter::open(
            FilterIdentity::new("urls").unwrap(),
            FilterParams::new(1000, 0.01),
            &not_a_dir,
        );
        assert!(matches!(result, Err(SieveError::Io(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_read_only_store_dir_rejected() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let locked = dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();

        // Permission bits do not bind root.
        if tempfile::tempfile_in(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let result = LocalFilter::open(
            FilterIdentity::new("urls").unwrap(),
            FilterParams::new(1000, 0.01),
            &locked,
        );
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        assert!(matches!(result, Err(SieveError::Config(_))));
    }

    #[test]
    fn test_corrupted_image_detected() {
        let dir = tempfile::tempdir().unwrap();
        let mut filter = open_in(dir.path(), "urls");
        filter.add(b"a").unwrap();
        filter.persist().unwrap();

        let mut data = fs::read(filter.path()).unwrap();
        let mid = data.len() / 2;
        data[mid] ^= 0xFF;
        fs::write(filter.path(), &data).unwrap();

        assert!(matches!(filter.restore(), Err(SieveError::Corruption(_))));
        // In-memory state untouched by the failed restore.
        assert!(filter.contains(b"a").unwrap());
    }

    #[test]
    fn test_foreign_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("urls"), b"not a filter image").unwrap();
        let mut filter = open_in(dir.path(), "urls");
        assert!(matches!(filter.restore(), Err(SieveError::Corruption(_))));
    }

    #[test]
    fn test_invalid_params_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = LocalFilter::open(
            FilterIdentity::new("urls").unwrap(),
            FilterParams::new(0, 0.01),
            dir.path(),
        );
        assert!(matches!(result, Err(SieveError::Config(_))));
    }
}
