//! Firmware images read from a directory on the host.

use std::fs::File;
use std::format;
use std::io::{self, ErrorKind, Read};
use std::path::{Path, PathBuf};

use crate::common::{Error, FirmwareStore, Result};

/// A firmware directory such as the one shipped with the vendor's driver package.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    /// Uses `root` as the firmware directory. Fails if it is not a readable directory.
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        if !root.metadata()?.is_dir() {
            return Err(io::Error::new(
                ErrorKind::Other,
                format!("{} is not a directory", root.display()),
            ));
        }
        Ok(Self { root })
    }

    /// The firmware directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// An open image file.
#[derive(Debug)]
pub struct DirImage {
    name: &'static str,
    file: File,
}

impl DirImage {
    /// File name the image was opened under.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Read for DirImage {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl FirmwareStore for DirStore {
    type Image = DirImage;

    fn open(&self, name: &'static str) -> Result<DirImage> {
        match File::open(self.root.join(name)) {
            Ok(file) => Ok(DirImage { name, file }),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(Error::ImageNotFound { name }),
            Err(error) => Err(Error::ImageOpen { name, error }),
        }
    }

    fn size(&self, image: &DirImage) -> Result<u64> {
        image
            .file
            .metadata()
            .map(|meta| meta.len())
            .map_err(|error| Error::ImageOpen {
                name: image.name,
                error,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{open_images, ImageKind};
    use crate::protocol::command::HardwareGeneration;
    use std::fs;
    use std::vec::Vec;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("qdl-loader-{}-{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn opens_and_sizes_images() {
        let dir = scratch_dir("sizes");
        fs::write(dir.join("amss.mbn"), [0u8; 40]).unwrap();
        fs::write(dir.join("apps.mbn"), [0u8; 12]).unwrap();

        let store = DirStore::new(&dir).unwrap();
        let images = open_images(&store, HardwareGeneration::V1).unwrap();
        let sizes: Vec<_> = images.iter().map(|i| (i.kind(), i.size(), i.declared_size())).collect();
        assert_eq!(sizes, [(ImageKind::Amss, 40, 32), (ImageKind::Apps, 12, 12)]);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_image_is_not_found() {
        let dir = scratch_dir("missing");
        let store = DirStore::new(&dir).unwrap();
        assert!(matches!(
            store.open("amss.mbn"),
            Err(Error::ImageNotFound { name: "amss.mbn" })
        ));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn rejects_non_directory() {
        let dir = scratch_dir("file");
        let file = dir.join("amss.mbn");
        fs::write(&file, [0u8; 1]).unwrap();
        assert!(DirStore::new(&file).is_err());
        assert!(DirStore::new(dir.join("absent")).is_err());
        fs::remove_dir_all(&dir).unwrap();
    }
}
