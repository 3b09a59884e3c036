//! The durable byte stream used by dump and load.
//!
//! The engine serializes itself into any sequential writer and rebuilds from
//! any sequential reader; this module provides the standard target, a
//! fixed-size host file that is memory mapped and handed out as a cursor.
//! A dump image is created with its exact size up front (the engine can
//! compute it beforehand), so the mapping never has to grow.
//!
//! No provisions have been made to lock the backing file; two processes
//! writing the same image is undefined behavior.

use crate::error::{ApiError, Result};
use memmap::MmapMut;
use std::io::Cursor;
use std::{
    fs::{remove_file, OpenOptions},
    path::{Path, PathBuf},
};

/// A fixed-size, memory-mapped dump image on the host file system.
#[derive(Debug)]
pub struct Image {
    /// Size of the image in bytes.
    size: u64,
    /// Path to the backing file.
    path: PathBuf,
    /// Memory-mapped contents of the backing file.
    contents: MmapMut,
}

/// Small enum, used to specify whether we expect to open a fresh image.
#[derive(PartialEq, Eq, Copy, Clone)]
pub enum ImageState {
    /// Creating a new image file
    New,
    /// Loading an existing image file
    Load,
}

// Import the components of this enum, so we can reuse them here
use self::ImageState::*;

impl Drop for Image {
    /// Persist all writes before releasing the mapping.
    /// Only needed if the backing file still exists.
    fn drop(&mut self) {
        if self.path.exists() {
            self.contents.flush().unwrap();
        }
    }
}

impl Image {
    /// Create a *new* image of exactly `size` bytes at `path`.
    /// Fails if the file already exists.
    pub fn create<P: AsRef<Path>>(path: P, size: u64) -> Result<Image> {
        let path_buf = path.as_ref().to_path_buf();
        let contents = map_path(path, size, New)?;
        Ok(Image {
            size,
            path: path_buf,
            contents,
        })
    }

    /// Open an *existing* image, taking its size from the file itself.
    /// Fails if the file does not exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Image> {
        let path_buf = path.as_ref().to_path_buf();
        let size = path_buf.metadata()?.len();
        let contents = map_path(path, size, Load)?;
        Ok(Image {
            size,
            path: path_buf,
            contents,
        })
    }

    /// Size of this image in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Path of the file backing this image.
    pub fn image_path(&self) -> &Path {
        &self.path
    }

    /// A sequential writer over the whole image.
    pub fn writer(&mut self) -> Cursor<&mut [u8]> {
        Cursor::new(&mut self.contents[..])
    }

    /// A sequential reader over the whole image.
    pub fn reader(&self) -> Cursor<&[u8]> {
        Cursor::new(&self.contents[..])
    }

    /// End the lifetime of this image and remove its backing file.
    /// Assumes no other links to the backing file exist.
    /// Panics if removing the file fails.
    pub fn destruct(self) {
        remove_file(&self.path).unwrap();
    }
}

/// Either create or open the backing file, sized and mapped.
/// If `ex` says `Load`, the file must exist; if `New`, it must not.
fn map_path<P: AsRef<Path>>(path: P, size: u64, ex: ImageState) -> Result<MmapMut> {
    let exists = if path.as_ref().exists() { Load } else { New };
    if exists != ex {
        if ex == Load {
            return Err(ApiError::ImageInput(
                "tried to open a non-existing image path",
            ));
        } else {
            return Err(ApiError::ImageInput(
                "tried to create a pre-existing image path",
            ));
        }
    }

    let f = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)?;

    if ex == New {
        // The file is extended to `size` with all bytes zero.
        f.set_len(size)?;
    }

    let data = unsafe { memmap::MmapOptions::new().map_mut(&f)? };
    Ok(data)
}
