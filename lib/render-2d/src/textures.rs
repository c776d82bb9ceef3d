use gpu_types::formats::TextureFormat;
use gpu_types::resources::TextureId;

/// A renderer-owned 2D texture. Streaming textures keep a host-side shadow
/// that `lock`/`unlock` edit and re-upload.
#[derive(Debug)]
pub struct Texture2d {
    pub(crate) id: TextureId,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub(crate) shadow: Option<Vec<u8>>,
}

impl Texture2d {
    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn is_streaming(&self) -> bool {
        self.shadow.is_some()
    }
}

/// Copies `height` rows of `row_bytes` from `pixels` (stepping by the
/// caller's pitch) into a tightly packed destination.
pub(crate) fn copy_rows_tight(
    pixels: &[u8],
    pitch: usize,
    row_bytes: usize,
    height: usize,
    destination: &mut [u8],
) {
    for row in 0..height {
        let src = &pixels[row * pitch..row * pitch + row_bytes];
        destination[row * row_bytes..(row + 1) * row_bytes].copy_from_slice(src);
    }
}

#[cfg(test)]
mod tests {
    use super::copy_rows_tight;

    #[test]
    fn pitch_is_respected() {
        // 2x2 image of 2-byte pixels inside rows padded to 6 bytes
        let pixels = [1u8, 2, 3, 4, 0, 0, 5, 6, 7, 8, 0, 0];
        let mut packed = [0u8; 8];
        copy_rows_tight(&pixels, 6, 4, 2, &mut packed);
        assert_eq!(packed, [1, 2, 3, 4, 5, 6, 7, 8]);
    }
}
