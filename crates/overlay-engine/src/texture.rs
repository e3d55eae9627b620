//! Texture sources attached to overlays.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use crate::context::{ContextId, PerContext};
use crate::gpu::{GpuContext, TextureId, rgba_len};
use crate::pass::DrawContext;

/// Shared handle to a texture source; several overlays may show the same one.
pub type SharedTextureSource = Rc<RefCell<dyn TextureSource>>;

/// Supplies the texture an overlay binds on a given context.
pub trait TextureSource {
    /// Texture for `dc.context`, creating or refreshing it as needed.
    ///
    /// `None` means nothing can be bound this frame; the overlay keeps its
    /// previous binding.
    fn texture(&mut self, gpu: &mut dyn GpuContext, dc: &DrawContext) -> Option<TextureId>;

    /// Current width in pixels.
    fn width(&self) -> u32;

    /// Current height in pixels.
    fn height(&self) -> u32;

    /// Drops whatever is held for `context`.
    fn release(&mut self, context: ContextId) {
        let _ = context;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TextureError {
    #[error("pixel data is {actual} bytes, expected {expected} for {width}x{height} RGBA")]
    DataLength {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("failed to load image `{path}`")]
    Load {
        path: String,
        #[source]
        source: image::ImageError,
    },
}

#[derive(Debug, Copy, Clone)]
struct Uploaded {
    texture: TextureId,
    width: u32,
    height: u32,
    revision: u64,
}

/// CPU-side RGBA8 image uploaded lazily to each context.
///
/// Edits bump a revision; the next [`texture`](TextureSource::texture) call on
/// a context re-uploads in place when the size is unchanged, or creates a new
/// texture when it changed.
#[derive(Debug)]
pub struct PixelTexture {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
    revision: u64,
    uploaded: PerContext<Uploaded>,
}

impl PixelTexture {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, TextureError> {
        check_len(width, height, &rgba)?;
        Ok(Self {
            width,
            height,
            rgba,
            revision: 1,
            uploaded: PerContext::new(),
        })
    }

    /// Image filled with a single straight-alpha RGBA color.
    pub fn solid(width: u32, height: u32, color: [u8; 4]) -> Self {
        let rgba = color.repeat(width as usize * height as usize);
        Self {
            width,
            height,
            rgba,
            revision: 1,
            uploaded: PerContext::new(),
        }
    }

    /// Decodes an image file (PNG, JPEG, BMP) into RGBA8.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TextureError> {
        let path = path.as_ref();
        let img = image::open(path).map_err(|source| TextureError::Load {
            path: path.display().to_string(),
            source,
        })?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        log::debug!("loaded texture {} ({width}x{height})", path.display());
        Self::new(width, height, rgba.into_raw())
    }

    /// Replaces the whole image, possibly with a new size.
    pub fn set_pixels(&mut self, width: u32, height: u32, rgba: Vec<u8>) -> Result<(), TextureError> {
        check_len(width, height, &rgba)?;
        self.width = width;
        self.height = height;
        self.rgba = rgba;
        self.revision += 1;
        Ok(())
    }

    /// Edits pixels in place; the size cannot change.
    pub fn update(&mut self, edit: impl FnOnce(&mut [u8], u32, u32)) {
        edit(&mut self.rgba, self.width, self.height);
        self.revision += 1;
    }

    pub fn pixels(&self) -> &[u8] {
        &self.rgba
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }
}

impl TextureSource for PixelTexture {
    fn texture(&mut self, gpu: &mut dyn GpuContext, dc: &DrawContext) -> Option<TextureId> {
        let slot = self.uploaded.slot_mut(dc.context);

        if let Some(up) = slot.get_mut() {
            if up.revision == self.revision {
                return Some(up.texture);
            }
            if up.width == self.width && up.height == self.height {
                match gpu.write_texture(up.texture, &self.rgba) {
                    Ok(()) => {
                        let texture = up.texture;
                        up.revision = self.revision;
                        slot.set_stamp(dc.time);
                        return Some(texture);
                    }
                    Err(e) => log::debug!("texture re-upload failed, recreating: {e}"),
                }
            }
        }

        match gpu.create_texture(self.width, self.height, &self.rgba) {
            Ok(texture) => {
                slot.insert(Uploaded {
                    texture,
                    width: self.width,
                    height: self.height,
                    revision: self.revision,
                });
                slot.set_stamp(dc.time);
                Some(texture)
            }
            Err(e) => {
                log::debug!("texture upload failed on context {}: {e}", dc.context);
                slot.get().map(|up| up.texture)
            }
        }
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn release(&mut self, context: ContextId) {
        self.uploaded.release(context);
    }
}

fn check_len(width: u32, height: u32, rgba: &[u8]) -> Result<(), TextureError> {
    let expected = rgba_len(width, height);
    if rgba.len() == expected {
        Ok(())
    } else {
        Err(TextureError::DataLength {
            width,
            height,
            expected,
            actual: rgba.len(),
        })
    }
}
