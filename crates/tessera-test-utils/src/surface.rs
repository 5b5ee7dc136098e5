//! In-memory display surface.

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
};

use tessera_core::{Surface, TextureDesc, TextureHandle};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredTexture {
    pub desc: TextureDesc,
    pub pixels: Vec<u8>,
}

/// Surface keeping every texture's pixels in memory.
///
/// `invalidate` drops a texture behind the cache's back, the way a host
/// platform may at any time.
#[derive(Debug, Default)]
pub struct MemorySurface {
    next: Cell<u64>,
    textures: RefCell<HashMap<TextureHandle, StoredTexture>>,
    created: Cell<usize>,
    destroyed: Cell<usize>,
}

impl MemorySurface {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the texture without going through `destroy_texture`.
    pub fn invalidate(&self, texture: TextureHandle) {
        self.textures.borrow_mut().remove(&texture);
    }

    #[must_use]
    pub fn pixels(&self, texture: TextureHandle) -> Option<Vec<u8>> {
        self.textures
            .borrow()
            .get(&texture)
            .map(|t| t.pixels.clone())
    }

    #[must_use]
    pub fn desc(&self, texture: TextureHandle) -> Option<TextureDesc> {
        self.textures.borrow().get(&texture).map(|t| t.desc)
    }

    #[must_use]
    pub fn live(&self) -> usize {
        self.textures.borrow().len()
    }

    #[must_use]
    pub fn created(&self) -> usize {
        self.created.get()
    }

    #[must_use]
    pub fn destroyed(&self) -> usize {
        self.destroyed.get()
    }
}

impl Surface for MemorySurface {
    fn create_texture(&self, desc: &TextureDesc, pixels: &[u8]) -> TextureHandle {
        let handle = TextureHandle(self.next.get());
        self.next.set(self.next.get() + 1);
        self.created.set(self.created.get() + 1);
        self.textures.borrow_mut().insert(
            handle,
            StoredTexture {
                desc: *desc,
                pixels: pixels.to_vec(),
            },
        );
        handle
    }

    fn is_alive(&self, texture: TextureHandle) -> bool {
        self.textures.borrow().contains_key(&texture)
    }

    fn destroy_texture(&self, texture: TextureHandle) {
        if self.textures.borrow_mut().remove(&texture).is_some() {
            self.destroyed.set(self.destroyed.get() + 1);
        }
    }
}
