//! ZIP packing and expansion for bundled snapshots.

use std::io::{Cursor, Read, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::Result;

/// Upper bound on the buffer reserved from an entry's declared size
const MAX_PREALLOC: u64 = 1 << 20;

/// Pack `(name, bytes)` entries into an in-memory ZIP archive
pub fn pack<'a, I>(entries: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = (String, &'a [u8])>,
{
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, bytes) in entries {
        writer.start_file(name, options)?;
        writer.write_all(bytes)?;
    }

    Ok(writer.finish()?.into_inner())
}

/// Expand an in-memory ZIP archive into `(name, bytes)` entries
///
/// Directory entries and entries with unsafe paths are skipped.
pub fn unpack(bytes: &[u8]) -> Result<Vec<(String, Vec<u8>)>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut entries = Vec::with_capacity(archive.len());

    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        if file.is_dir() {
            continue;
        }
        if file.enclosed_name().is_none() {
            tracing::warn!(name = file.name(), "skipping archive entry with unsafe path");
            continue;
        }

        let name = file.name().to_string();
        // Declared sizes come from the archive and may be corrupt
        let mut contents = Vec::with_capacity(file.size().min(MAX_PREALLOC) as usize);
        file.read_to_end(&mut contents)?;
        entries.push((name, contents));
    }

    Ok(entries)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_then_unpack_preserves_entries() {
        let packed = pack(vec![
            ("SD_1/participant.json".to_string(), &b"[1,2]"[..]),
            ("SD_2/study.json".to_string(), &b"[]"[..]),
        ])
        .unwrap();

        let entries = unpack(&packed).unwrap();
        assert_eq!(
            entries,
            vec![
                ("SD_1/participant.json".to_string(), b"[1,2]".to_vec()),
                ("SD_2/study.json".to_string(), b"[]".to_vec()),
            ]
        );
    }

    #[test]
    fn unpack_rejects_garbage() {
        assert!(matches!(
            unpack(b"definitely not a zip"),
            Err(crate::Error::Archive(_))
        ));
    }

    #[test]
    fn unpack_survives_inflated_declared_size() {
        let mut packed = pack(vec![("SD_1/study.json".to_string(), &b"[]"[..])]).unwrap();

        // Uncompressed size of the central directory record
        let central = packed
            .windows(4)
            .position(|w| w == b"PK\x01\x02")
            .unwrap();
        packed[central + 24..central + 28].copy_from_slice(&0xFFFF_FFF0u32.to_le_bytes());

        // Ok or Err, but no capacity overflow
        let _ = unpack(&packed);
    }

}
