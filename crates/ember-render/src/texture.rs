// SPDX-License-Identifier: CEPL-1.0
use std::path::Path;

use tracing::info;

use crate::{EngineError, Result};

/// Decoded RGBA8 image, rows top to bottom, tightly packed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureBlob {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TextureBlob {
    pub fn from_rgba8(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || pixels.len() != expected {
            return Err(EngineError::TextureDecode(format!(
                "{width}x{height} RGBA8 needs {expected} bytes, got {}",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(EngineError::TextureFileMissing(path.to_path_buf()));
        }
        let rgba = image::open(path)
            .map_err(|e| EngineError::TextureDecode(format!("{}: {e}", path.display())))?
            .into_rgba8();
        let (width, height) = rgba.dimensions();
        info!("texture {} ({width}x{height})", path.display());
        Self::from_rgba8(width, height, rgba.into_raw())
    }

    /// Two-tone checkerboard used when no texture file is configured.
    pub fn checkerboard(size: u32, cells: u32) -> Self {
        let size = size.max(1);
        let cell = (size / cells.max(1)).max(1);
        let mut pixels = Vec::with_capacity(size as usize * size as usize * 4);
        for y in 0..size {
            for x in 0..size {
                let light = ((x / cell) + (y / cell)) % 2 == 0;
                let px: [u8; 4] = if light {
                    [0xd8, 0xd8, 0xd8, 0xff]
                } else {
                    [0x40, 0x40, 0x48, 0xff]
                };
                pixels.extend_from_slice(&px);
            }
        }
        Self {
            width: size,
            height: size,
            pixels,
        }
    }

    pub fn byte_len(&self) -> u64 {
        self.pixels.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_reported_as_missing() {
        let err = TextureBlob::load(Path::new("definitely/not/here.png")).unwrap_err();
        assert!(matches!(err, EngineError::TextureFileMissing(_)));
    }

    #[test]
    fn size_mismatch_is_a_decode_error() {
        let err = TextureBlob::from_rgba8(2, 2, vec![0; 15]).unwrap_err();
        assert!(matches!(err, EngineError::TextureDecode(_)));
    }

    #[test]
    fn checkerboard_alternates() {
        let tex = TextureBlob::checkerboard(4, 2);
        assert_eq!(tex.byte_len(), 4 * 4 * 4);
        let at = |x: usize, y: usize| &tex.pixels[(y * 4 + x) * 4..(y * 4 + x) * 4 + 4];
        assert_eq!(at(0, 0), at(1, 1));
        assert_ne!(at(0, 0), at(2, 0));
        assert_eq!(at(2, 0), at(0, 2));
    }
}
