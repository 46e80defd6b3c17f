//! The download session: hello, each image in turn, close.

use alloc::{vec, vec::Vec};

use core2::io::{Read, Write};

use crate::common::{Error, FirmwareStore, Result};
use crate::consts::CHUNK_SIZE;
use crate::image::{open_images, ImageKind, ImageSpec};
use crate::protocol::ack::{read_ack, AckCode};
use crate::protocol::command::{Command, HardwareGeneration};

/// What to do when the device answers with an unexpected acknowledgment.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AckPolicy {
    /// Log the rejection and carry on, as the reference loader does.
    #[default]
    Lenient,
    /// Abort the session with [`Error::Ack`].
    Strict,
}

/// Configuration for a download session.
#[derive(Copy, Clone, Debug)]
pub struct LoaderConfig {
    /// Hardware revision; selects the hello variant and the image list.
    pub generation: HardwareGeneration,

    /// How acknowledgment mismatches are handled.
    pub ack_policy: AckPolicy,

    /// Bytes of image data read and written at a time. The device expects
    /// [`CHUNK_SIZE`]; only tests should need anything else.
    pub chunk_size: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        LoaderConfig::new()
    }
}

impl LoaderConfig {
    /// Creates the configuration with default parameters.
    #[must_use]
    pub fn new() -> Self {
        LoaderConfig {
            generation: HardwareGeneration::V1,
            ack_policy: AckPolicy::Lenient,
            chunk_size: CHUNK_SIZE,
        }
    }
}

/// Where the session stands. Image states carry the index of the image in the session.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Nothing sent yet.
    Start,
    /// Hello sent and acknowledged.
    HelloSent,
    /// Image opened and acknowledged.
    ImageOpen(usize),
    /// Size trailer and all image data written.
    ImageStreaming(usize),
    /// Device confirmed it received the image.
    ImageAcked(usize),
    /// Close sent.
    Closing,
    /// Terminal.
    Done,
}

/// Snapshot handed to the progress callback after every data write.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Progress {
    /// Image being streamed.
    pub kind: ImageKind,
    /// Bytes of this image written so far.
    pub sent: u64,
    /// Declared size of this image.
    pub total: u64,
}

/// One run of the loader over a serial transport.
#[derive(Debug)]
pub struct TransferSession<D, R> {
    dev: D,
    images: Vec<ImageSpec<R>>,
    config: LoaderConfig,
    state: State,
    buf: Vec<u8>,
}

impl<D: Read + Write, R: Read> TransferSession<D, R> {
    /// Creates a session that will send `images` in order over `dev`.
    pub fn new(dev: D, images: Vec<ImageSpec<R>>, config: LoaderConfig) -> Self {
        Self {
            dev,
            images,
            config,
            state: State::Start,
            buf: Vec::new(),
        }
    }

    /// Opens the images `config.generation` needs from `store` and creates the session.
    ///
    /// Nothing is written to `dev` if any image is missing or unusable.
    pub fn prepare<S>(dev: D, store: &S, config: LoaderConfig) -> Result<Self>
    where
        S: FirmwareStore<Image = R>,
    {
        let images = open_images(store, config.generation)?;
        Ok(Self::new(dev, images, config))
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    /// Images queued in this session, in sending order.
    #[must_use]
    pub fn images(&self) -> &[ImageSpec<R>] {
        &self.images
    }

    /// Gives the transport back.
    pub fn into_transport(self) -> D {
        self.dev
    }

    /// Runs the session to completion.
    ///
    /// # Blocking
    /// Acknowledgments are awaited with a plain blocking read. A device that never
    /// answers stalls the session; any timeout has to be configured on `dev`.
    pub fn run(&mut self) -> Result<()> {
        self.run_with(|_| {})
    }

    /// Runs the session to completion, reporting data progress to `progress`.
    pub fn run_with<F: FnMut(Progress)>(&mut self, mut progress: F) -> Result<()> {
        info!(
            "Starting QDL download: {:?}, {} images",
            self.config.generation,
            self.images.len()
        );
        while self.state != State::Done {
            if let Err(err) = self.step_with(&mut progress) {
                error!("Download aborted after {:?}: {}", self.state, err);
                return Err(err);
            }
        }
        info!("QDL download finished");
        Ok(())
    }

    /// Performs one transition and returns the new state.
    pub fn step(&mut self) -> Result<State> {
        self.step_with(&mut |_| {})
    }

    /// Performs one transition, reporting data progress to `progress`.
    pub fn step_with<F: FnMut(Progress)>(&mut self, progress: &mut F) -> Result<State> {
        let next = match self.state {
            State::Start => {
                Command::Hello {
                    generation: self.config.generation,
                }
                .send(&mut self.dev)?;
                self.await_ack(AckCode::Hello)?;
                State::HelloSent
            }
            State::HelloSent => self.open_or_close(0)?,
            State::ImageOpen(i) => {
                self.stream_image(i, progress)?;
                State::ImageStreaming(i)
            }
            State::ImageStreaming(i) => {
                self.await_ack(AckCode::ImageReceived)?;
                State::ImageAcked(i)
            }
            State::ImageAcked(i) => self.open_or_close(i + 1)?,
            State::Closing | State::Done => State::Done,
        };
        self.state = next;
        Ok(next)
    }

    fn open_or_close(&mut self, index: usize) -> Result<State> {
        let Some(image) = self.images.get(index) else {
            Command::Close.send(&mut self.dev)?;
            self.dev.flush()?;
            return Ok(State::Closing);
        };

        info!("Opening {} image ({} bytes)", image.kind(), image.size());
        Command::OpenImage {
            kind: image.kind(),
            size: image.declared_size(),
        }
        .send(&mut self.dev)?;
        self.await_ack(AckCode::ImageOpened)?;
        Ok(State::ImageOpen(index))
    }

    fn stream_image<F: FnMut(Progress)>(&mut self, index: usize, progress: &mut F) -> Result<()> {
        let chunk_size = self.config.chunk_size.max(1);
        if self.buf.len() != chunk_size {
            self.buf = vec![0; chunk_size];
        }

        let image = &mut self.images[index];
        let kind = image.kind();
        let total = u64::from(image.declared_size());

        Command::SizeTrailer {
            size: image.declared_size(),
        }
        .send(&mut self.dev)?;

        let mut sent = 0u64;
        let mut chunks = image.chunks(&mut self.buf);
        while let Some(chunk) = chunks.next_chunk()? {
            if chunk.is_final && chunk.adjusted_len == 0 {
                warn!("{} image ends on a chunk boundary; final write is empty", kind);
            }
            trace!("{}: writing {} of {} bytes read", kind, chunk.adjusted_len, chunk.bytes.len());
            self.dev.write_all(chunk.payload())?;
            sent += chunk.adjusted_len as u64;
            progress(Progress { kind, sent, total });
        }

        if sent != total {
            warn!("{} image: streamed {} bytes but declared {}", kind, sent, total);
        }
        debug!("{} image streamed", kind);
        Ok(())
    }

    fn await_ack(&mut self, expected: AckCode) -> Result<()> {
        match read_ack(&mut self.dev, expected)? {
            Ok(()) => {
                debug!("Received {:?} acknowledgment", expected);
                Ok(())
            }
            Err(err) => match self.config.ack_policy {
                AckPolicy::Lenient => {
                    warn!("Ignoring bad {:?} acknowledgment: {}", expected, err);
                    Ok(())
                }
                AckPolicy::Strict => Err(Error::Ack(err)),
            },
        }
    }
}
