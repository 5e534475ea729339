//! SPIR-V loading
//!
//! Shaders are compiled offline by the build script; at runtime the engine
//! only reads the resulting `.spv` files.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// First word of every SPIR-V module
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Shader loading errors
#[derive(Error, Debug)]
pub enum ShaderError {
    /// The file could not be read
    #[error("failed to read shader {path:?}: {source}")]
    Io {
        /// File that was read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The bytes are not a whole number of 32-bit words
    #[error("shader {path:?} is not valid SPIR-V: {source}")]
    Malformed {
        /// File that was read
        path: PathBuf,
        /// Decoder error
        #[source]
        source: std::io::Error,
    },

    /// The file holds no code
    #[error("shader {path:?} is empty")]
    Empty {
        /// File that was read
        path: PathBuf,
    },

    /// The first word is not the SPIR-V magic number
    #[error("shader {path:?} has bad magic number {found:#010x}")]
    BadMagic {
        /// File that was read
        path: PathBuf,
        /// Word found instead
        found: u32,
    },
}

/// Decoded SPIR-V words
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderBytecode {
    words: Vec<u32>,
}

impl ShaderBytecode {
    /// Decode SPIR-V bytes; `origin` names the source in errors
    pub fn from_bytes(bytes: &[u8], origin: impl Into<PathBuf>) -> Result<Self, ShaderError> {
        let path = origin.into();
        log::debug!("[SHADER] Decoding {} bytes from {:?}", bytes.len(), path);

        if bytes.is_empty() {
            return Err(ShaderError::Empty { path });
        }

        if let Some(head) = bytes.get(..4) {
            let found = u32::from_le_bytes([head[0], head[1], head[2], head[3]]);
            if found != SPIRV_MAGIC && found != SPIRV_MAGIC.swap_bytes() {
                return Err(ShaderError::BadMagic { path, found });
            }
        }

        // Handles byte order and rejects partial words
        let words = ash::util::read_spv(&mut Cursor::new(bytes))
            .map_err(|source| ShaderError::Malformed { path, source })?;

        Ok(Self { words })
    }

    /// Read and decode a `.spv` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ShaderError> {
        let path = path.as_ref();
        log::debug!("[SHADER] Loading shader from: {:?}", path);

        let bytes = std::fs::read(path).map_err(|source| {
            log::error!("[SHADER] Failed to read shader file {:?}: {}", path, source);
            ShaderError::Io {
                path: path.to_path_buf(),
                source,
            }
        })?;

        Self::from_bytes(&bytes, path)
    }

    /// SPIR-V words
    pub fn words(&self) -> &[u32] {
        &self.words
    }
}
