//! Firmware images and how their data is cut into writes.

use alloc::vec::Vec;
use core::fmt::{self, Formatter};

use core2::io::{ErrorKind, Read};

use crate::common::{Error, FirmwareStore, Result};
use crate::consts::{IMAGE_AMSS, IMAGE_APPS, IMAGE_UQCN, TRAILER_LEN};
use crate::protocol::command::HardwareGeneration;

/// The image slots a session can carry, in protocol order.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ImageKind {
    /// Modem baseband firmware. Always first.
    Amss,
    /// Application processor firmware. Always second.
    Apps,
    /// Carrier configuration. Second-generation hardware only.
    Uqcn,
}

impl ImageKind {
    /// The images a session for `generation` sends, in order.
    #[must_use]
    pub fn sequence(generation: HardwareGeneration) -> &'static [ImageKind] {
        match generation {
            HardwareGeneration::V1 => &[Self::Amss, Self::Apps],
            HardwareGeneration::V2 => &[Self::Amss, Self::Apps, Self::Uqcn],
        }
    }

    /// Image type byte carried by this slot's open command.
    #[must_use]
    pub fn type_byte(self) -> u8 {
        match self {
            Self::Amss => IMAGE_AMSS,
            Self::Apps => IMAGE_APPS,
            Self::Uqcn => IMAGE_UQCN,
        }
    }

    /// File names to try, first match wins.
    #[must_use]
    pub fn file_names(self) -> &'static [&'static str] {
        match self {
            Self::Amss => &["amss.mbn"],
            Self::Apps => &["apps.mbn"],
            Self::Uqcn => &["UQCN.mbn", "uqcn.mbn"],
        }
    }

    /// Whether this slot withholds its last [`TRAILER_LEN`] bytes.
    ///
    /// Only the first image does; its declared size and its final write both shrink by
    /// eight bytes.
    #[must_use]
    pub fn trims_trailer(self) -> bool {
        matches!(self, Self::Amss)
    }

    /// Applies the trailer rule to the length of a final chunk.
    #[must_use]
    pub fn final_chunk_len(self, read: usize) -> usize {
        if self.trims_trailer() {
            read.saturating_sub(TRAILER_LEN)
        } else {
            read
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Amss => "AMSS",
            Self::Apps => "APPS",
            Self::Uqcn => "UQCN",
        })
    }
}

/// One image queued for transfer.
#[derive(Debug)]
pub struct ImageSpec<R> {
    kind: ImageKind,
    source: R,
    size: u64,
}

impl<R: Read> ImageSpec<R> {
    /// Wraps `source`, rejecting sizes the open command cannot describe.
    pub fn new(kind: ImageKind, source: R, size: u64) -> Result<Self> {
        let trailer = if kind.trims_trailer() { TRAILER_LEN as u64 } else { 0 };
        match size.checked_sub(trailer).map(u32::try_from) {
            Some(Ok(_)) => Ok(Self { kind, source, size }),
            _ => Err(Error::ImageSize { kind, size }),
        }
    }

    /// Which slot the image fills.
    #[must_use]
    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    /// Size of the image file in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Size written into the open and trailer commands.
    #[must_use]
    pub fn declared_size(&self) -> u32 {
        let trailer = if self.kind.trims_trailer() { TRAILER_LEN as u64 } else { 0 };
        // Range checked in `new`.
        (self.size - trailer) as u32
    }

    /// Starts a fresh pass over the image data using `buf` as the chunk buffer.
    pub fn chunks<'a>(&'a mut self, buf: &'a mut [u8]) -> Chunks<'a, R> {
        Chunks {
            kind: self.kind,
            source: &mut self.source,
            buf,
            done: false,
        }
    }
}

/// Opens every image `generation` needs from `store`.
///
/// All images are opened before anything is sent, so a missing file aborts the run
/// while the device is still untouched.
pub fn open_images<S: FirmwareStore>(
    store: &S,
    generation: HardwareGeneration,
) -> Result<Vec<ImageSpec<S::Image>>> {
    ImageKind::sequence(generation)
        .iter()
        .map(|&kind| {
            let (name, image) = open_first(store, kind)?;
            let size = store.size(&image)?;
            info!("{} image: {} ({} bytes)", kind, name, size);
            ImageSpec::new(kind, image, size)
        })
        .collect()
}

fn open_first<S: FirmwareStore>(store: &S, kind: ImageKind) -> Result<(&'static str, S::Image)> {
    let names = kind.file_names();
    for &name in names {
        match store.open(name) {
            Ok(image) => return Ok((name, image)),
            Err(Error::ImageNotFound { .. }) => debug!("{} not present", name),
            Err(err) => return Err(err),
        }
    }
    Err(Error::ImageNotFound { name: names[0] })
}

/// A piece of image data ready to be written.
#[derive(Debug)]
pub struct Chunk<'a> {
    /// Everything read into the chunk buffer.
    pub bytes: &'a [u8],
    /// Set on the last chunk of the image.
    pub is_final: bool,
    /// How many of `bytes` go on the wire.
    pub adjusted_len: usize,
}

impl<'a> Chunk<'a> {
    /// The bytes to write.
    #[must_use]
    pub fn payload(&self) -> &'a [u8] {
        &self.bytes[..self.adjusted_len]
    }
}

/// Lazy sequence of chunks over one image.
///
/// A chunk that fills the buffer is written whole. The first chunk that does not is the
/// final one and is shortened by the trailer rule. An image whose size is an exact
/// multiple of the buffer therefore ends with an empty final chunk.
#[derive(Debug)]
pub struct Chunks<'a, R> {
    kind: ImageKind,
    source: &'a mut R,
    buf: &'a mut [u8],
    done: bool,
}

impl<R: Read> Chunks<'_, R> {
    /// Reads the next chunk, or `None` once the final chunk has been produced.
    pub fn next_chunk(&mut self) -> Result<Option<Chunk<'_>>> {
        if self.done {
            return Ok(None);
        }

        let kind = self.kind;
        let len = fill(self.source, self.buf).map_err(|error| Error::ImageRead { kind, error })?;
        let is_final = len < self.buf.len();
        let adjusted_len = if is_final { kind.final_chunk_len(len) } else { len };
        self.done = is_final;

        Ok(Some(Chunk {
            bytes: &self.buf[..len],
            is_final,
            adjusted_len,
        }))
    }
}

/// Reads until `buf` is full or the source reports end of file.
fn fill<R: Read>(source: &mut R, buf: &mut [u8]) -> core2::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    /// Hands out at most `step` bytes per read.
    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> core2::io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    fn collect<R: Read>(spec: &mut ImageSpec<R>, chunk: usize) -> Vec<(usize, bool, usize)> {
        let mut buf = vec![0; chunk];
        let mut chunks = spec.chunks(&mut buf);
        let mut out = Vec::new();
        while let Some(c) = chunks.next_chunk().unwrap() {
            out.push((c.bytes.len(), c.is_final, c.adjusted_len));
        }
        out
    }

    #[test]
    fn declared_size_applies_trailer_rule() {
        let data = [0u8; 0];
        assert_eq!(ImageSpec::new(ImageKind::Amss, &data[..], 300_000).unwrap().declared_size(), 299_992);
        assert_eq!(ImageSpec::new(ImageKind::Apps, &data[..], 100).unwrap().declared_size(), 100);
        assert_eq!(ImageSpec::new(ImageKind::Uqcn, &data[..], 0).unwrap().declared_size(), 0);
    }

    #[test]
    fn rejects_sizes_out_of_range() {
        let data = [0u8; 0];
        assert!(matches!(
            ImageSpec::new(ImageKind::Amss, &data[..], 7),
            Err(Error::ImageSize { kind: ImageKind::Amss, size: 7 })
        ));
        assert!(ImageSpec::new(ImageKind::Apps, &data[..], u64::from(u32::MAX) + 1).is_err());
        assert!(ImageSpec::new(ImageKind::Amss, &data[..], u64::from(u32::MAX) + 8).is_ok());
    }

    #[test]
    fn first_image_final_chunk_drops_trailer() {
        let data = vec![0xa5; 300_000];
        let mut spec = ImageSpec::new(ImageKind::Amss, &data[..], 300_000).unwrap();
        assert_eq!(
            collect(&mut spec, 262_144),
            vec![(262_144, false, 262_144), (37_856, true, 37_848)]
        );
    }

    #[test]
    fn later_images_keep_final_chunk() {
        let data = vec![0x5a; 100];
        let mut spec = ImageSpec::new(ImageKind::Apps, &data[..], 100).unwrap();
        assert_eq!(collect(&mut spec, 262_144), vec![(100, true, 100)]);
    }

    #[test]
    fn exact_multiple_ends_with_empty_chunk() {
        let data = vec![1u8; 64];
        let mut apps = ImageSpec::new(ImageKind::Apps, &data[..], 64).unwrap();
        assert_eq!(collect(&mut apps, 32), vec![(32, false, 32), (32, false, 32), (0, true, 0)]);

        let mut amss = ImageSpec::new(ImageKind::Amss, &data[..], 64).unwrap();
        assert_eq!(collect(&mut amss, 32), vec![(32, false, 32), (32, false, 32), (0, true, 0)]);
    }

    #[test]
    fn short_reads_do_not_end_the_image_early() {
        let data: Vec<u8> = (0..100u8).collect();
        let source = Trickle { data: &data, step: 7 };
        let mut spec = ImageSpec::new(ImageKind::Apps, source, 100).unwrap();
        let mut buf = vec![0; 64];
        let mut chunks = spec.chunks(&mut buf);

        let first = chunks.next_chunk().unwrap().unwrap();
        assert!(!first.is_final);
        assert_eq!(first.payload(), &data[..64]);

        let last = chunks.next_chunk().unwrap().unwrap();
        assert!(last.is_final);
        assert_eq!(last.payload(), &data[64..]);

        assert!(chunks.next_chunk().unwrap().is_none());
    }

    #[test]
    fn sequence_follows_generation() {
        assert_eq!(ImageKind::sequence(HardwareGeneration::V1), &[ImageKind::Amss, ImageKind::Apps]);
        assert_eq!(
            ImageKind::sequence(HardwareGeneration::V2),
            &[ImageKind::Amss, ImageKind::Apps, ImageKind::Uqcn]
        );
    }
}
