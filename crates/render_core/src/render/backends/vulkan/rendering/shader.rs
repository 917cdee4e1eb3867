//! Compiled shader loading
//!
//! The core treats compiled shaders as opaque SPIR-V words. A load succeeds
//! only for a non-empty, 4-byte aligned word stream that starts with the
//! SPIR-V magic number; byte-swapped streams are normalized by `read_spv`.

use std::io::{self, Cursor};
use std::path::Path;

use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// First word of every SPIR-V module
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Decode SPIR-V bytes into words
pub fn decode_shader_words(bytes: &[u8]) -> io::Result<Vec<u32>> {
    if bytes.is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "shader binary is empty"));
    }
    let words = ash::util::read_spv(&mut Cursor::new(bytes))?;
    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(&word) => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("shader binary starts with {word:#010x}, not the SPIR-V magic number"),
        )),
        None => Err(io::Error::new(io::ErrorKind::InvalidData, "shader binary is empty")),
    }
}

/// Read a compiled shader from disk as SPIR-V words
pub fn load_compiled_shader(path: impl AsRef<Path>) -> VulkanResult<Vec<u32>> {
    let path = path.as_ref();
    std::fs::read(path)
        .and_then(|bytes| decode_shader_words(&bytes))
        .map_err(|source| VulkanError::Io {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_shader(name: &str, bytes: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("render_core_{}_{name}", std::process::id()));
        std::fs::write(&path, bytes).expect("Should write temp shader");
        path
    }

    fn module_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|word| word.to_le_bytes()).collect()
    }

    /// Well-formed SPIR-V decodes word for word
    #[test]
    fn test_decode_valid_module() {
        let words = [SPIRV_MAGIC, 0x0001_0000, 0, 1, 0];
        let decoded = decode_shader_words(&module_bytes(&words)).expect("Should decode SPIR-V");
        assert_eq!(decoded, words);
    }

    /// Empty, misaligned and non-SPIR-V input is rejected
    #[test]
    fn test_decode_rejects_malformed() {
        let empty = decode_shader_words(&[]).expect_err("Should reject empty input");
        assert_eq!(empty.kind(), io::ErrorKind::InvalidData);

        let mut misaligned = module_bytes(&[SPIRV_MAGIC, 0x0001_0000]);
        misaligned.push(0);
        assert!(decode_shader_words(&misaligned).is_err());

        let wrong_magic = decode_shader_words(&module_bytes(&[0xdead_beef, 0]))
            .expect_err("Should reject missing magic");
        assert_eq!(wrong_magic.kind(), io::ErrorKind::InvalidData);
    }

    /// File loads report the offending path
    #[test]
    fn test_load_compiled_shader() {
        let good = temp_shader("good.spv", &module_bytes(&[SPIRV_MAGIC, 0x0001_0000]));
        let words = load_compiled_shader(&good).expect("Should load shader");
        assert_eq!(words.len(), 2);

        let bad = temp_shader("bad.spv", &[1, 2, 3]);
        let err = load_compiled_shader(&bad).expect_err("Should reject misaligned file");
        assert!(matches!(&err, VulkanError::Io { path, .. } if path == &bad));

        let missing = std::env::temp_dir().join("render_core_missing_shader.spv");
        let err = load_compiled_shader(&missing).expect_err("Should report missing file");
        assert!(matches!(err, VulkanError::Io { .. }));

        let _ = std::fs::remove_file(good);
        let _ = std::fs::remove_file(bad);
    }
}
