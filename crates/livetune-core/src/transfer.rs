//! Bulk transfer engine
//!
//! Moves whole memory regions between the host filesystem and the ECU in
//! bounded chunks, with observable progress, cooperative cancellation and a
//! byte-exact verify pass. All operations stop at the first error; partially
//! written destination files are never left behind.

use std::fs;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use crate::protocol::{EcuClient, ProtocolError};

/// Chunk size used by the reference tool; the protocol limit is 255
pub const DEFAULT_CHUNK_SIZE: usize = 128;

/// Errors raised by bulk transfers
#[derive(Error, Debug)]
pub enum TransferError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("verify mismatch at {address:#010x}")]
    VerifyMismatch { address: u32 },

    #[error("transfer aborted")]
    Aborted,
}

/// Sink for progress and log events of one bulk operation
///
/// `aborted` is polled between chunks, never during a protocol exchange;
/// returning `true` stops the loop after the current chunk.
pub trait TransferObserver {
    /// A line-oriented log message
    fn log(&mut self, _msg: &str) {}
    /// A bulk operation over `total` bytes is starting
    fn progress_start(&mut self, _total: u64) {}
    /// `current` of the announced total bytes are done
    fn progress(&mut self, _current: u64) {}
    /// The operation completed
    fn progress_end(&mut self) {}
    /// Cooperative cancellation flag
    fn aborted(&self) -> bool {
        false
    }
}

/// Observer that discards progress and only forwards logs to `tracing`
pub struct NullObserver;

impl TransferObserver for NullObserver {
    fn log(&mut self, msg: &str) {
        info!("{msg}");
    }
}

/// Options for one bulk operation
#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Bytes per protocol exchange (clamped to the 255-byte protocol limit)
    pub chunk_size: usize,
    /// Report per-chunk progress; small single-shot uploads switch this off
    pub with_progress: bool,
    /// Optional pause between chunks for buses that need breathing room
    pub chunk_pause: Option<Duration>,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            with_progress: true,
            chunk_pause: None,
        }
    }
}

impl TransferOptions {
    fn effective_chunk(&self) -> usize {
        self.chunk_size.clamp(1, crate::protocol::MAX_BUFFERED)
    }
}

/// Size of the next protocol exchange
///
/// The wire protocol has no 3-byte class, so a 3-byte tail is split into a
/// half plus a byte access.
fn next_chunk_len(remaining: usize, chunk_size: usize) -> usize {
    let n = remaining.min(chunk_size);
    if n == 3 {
        2
    } else {
        n
    }
}

fn check_abort(observer: &dyn TransferObserver) -> Result<(), TransferError> {
    if observer.aborted() {
        Err(TransferError::Aborted)
    } else {
        Ok(())
    }
}

/// Read a whole region into memory, chunk by chunk
pub fn read_region(
    client: &mut EcuClient,
    address: u32,
    size: usize,
    opts: &TransferOptions,
    observer: &mut dyn TransferObserver,
) -> Result<Vec<u8>, TransferError> {
    let chunk_size = opts.effective_chunk();
    let mut data = Vec::with_capacity(size);

    observer.progress_start(size as u64);
    while data.len() < size {
        check_abort(observer)?;
        let len = next_chunk_len(size - data.len(), chunk_size);
        let chunk = client.read_memory(address + data.len() as u32, len)?;
        data.extend_from_slice(&chunk);
        observer.progress(data.len() as u64);
        pause(opts);
    }
    observer.progress_end();
    Ok(data)
}

/// Download a region to `destination`
///
/// The file is written atomically after the transfer completes: a failed
/// read never creates or overwrites the destination.
pub fn download(
    client: &mut EcuClient,
    address: u32,
    size: usize,
    destination: impl AsRef<Path>,
    opts: &TransferOptions,
    observer: &mut dyn TransferObserver,
) -> Result<(), TransferError> {
    let destination = destination.as_ref();
    observer.log(&format!(
        "Downloading {size} bytes from {address:#010x} to {}",
        destination.display()
    ));

    let data = read_region(client, address, size, opts, observer)?;
    write_atomic(destination, &data)?;

    info!(address, size, dest = %destination.display(), "download complete");
    observer.log("Download complete.");
    Ok(())
}

/// Upload file contents to `address`
///
/// `range` selects a `(start_offset, length)` window of the source file;
/// `None` uploads the whole file. The last chunk may be shorter.
pub fn upload(
    client: &mut EcuClient,
    address: u32,
    source: impl AsRef<Path>,
    range: Option<(u64, usize)>,
    opts: &TransferOptions,
    observer: &mut dyn TransferObserver,
) -> Result<(), TransferError> {
    let source = source.as_ref();
    let file_data = fs::read(source)?;
    let data: &[u8] = match range {
        Some((start, len)) => {
            let start = (start as usize).min(file_data.len());
            let end = (start + len).min(file_data.len());
            &file_data[start..end]
        }
        None => &file_data,
    };

    observer.log(&format!(
        "Uploading {} bytes from {} to {address:#010x}",
        data.len(),
        source.display()
    ));
    if opts.with_progress {
        observer.progress_start(data.len() as u64);
    }

    let chunk_size = opts.effective_chunk();
    let mut written = 0usize;
    while written < data.len() {
        check_abort(observer)?;
        let len = next_chunk_len(data.len() - written, chunk_size);
        let chunk = &data[written..written + len];
        client.write_memory(address + written as u32, chunk, false)?;
        written += chunk.len();
        if opts.with_progress {
            observer.progress(written as u64);
        }
        pause(opts);
    }

    if opts.with_progress {
        observer.progress_end();
    }
    info!(address, size = data.len(), src = %source.display(), "upload complete");
    observer.log("Upload complete.");
    Ok(())
}

/// Re-read a region and compare it byte-exactly against `reference`
///
/// Stops at the first mismatched chunk and reports the first divergent
/// address; prior chunks are not re-checked and later ones not read.
pub fn verify(
    client: &mut EcuClient,
    address: u32,
    reference: impl AsRef<Path>,
    opts: &TransferOptions,
    observer: &mut dyn TransferObserver,
) -> Result<(), TransferError> {
    let reference = reference.as_ref();
    let file_data = fs::read(reference)?;

    observer.log(&format!(
        "Verifying {} against {address:#010x}",
        reference.display()
    ));
    observer.progress_start(file_data.len() as u64);

    let chunk_size = opts.effective_chunk();
    let mut checked = 0usize;
    while checked < file_data.len() {
        check_abort(observer)?;
        let len = next_chunk_len(file_data.len() - checked, chunk_size);
        let ecu_chunk = client.read_memory(address + checked as u32, len)?;
        let file_chunk = &file_data[checked..checked + len];

        if ecu_chunk != file_chunk {
            let diverged = ecu_chunk
                .iter()
                .zip(file_chunk)
                .position(|(a, b)| a != b)
                .unwrap_or(0);
            let at = address + (checked + diverged) as u32;
            observer.log(&format!("Verification FAILED at {at:#010x}"));
            return Err(TransferError::VerifyMismatch { address: at });
        }

        checked += len;
        observer.progress(checked as u64);
        pause(opts);
    }

    observer.progress_end();
    observer.log("Verification SUCCESSFUL!");
    Ok(())
}

/// Download a region, then verify the ECU against the written file
pub fn download_verify(
    client: &mut EcuClient,
    address: u32,
    size: usize,
    destination: impl AsRef<Path>,
    opts: &TransferOptions,
    observer: &mut dyn TransferObserver,
) -> Result<(), TransferError> {
    let destination = destination.as_ref();
    download(client, address, size, destination, opts, observer)?;
    verify(client, address, destination, opts, observer)
}

/// Upload a file, then verify the ECU against it
pub fn upload_verify(
    client: &mut EcuClient,
    address: u32,
    source: impl AsRef<Path>,
    opts: &TransferOptions,
    observer: &mut dyn TransferObserver,
) -> Result<(), TransferError> {
    let source = source.as_ref();
    upload(client, address, source, None, opts, observer)?;
    verify(client, address, source, opts, observer)
}

fn pause(opts: &TransferOptions) {
    if let Some(pause) = opts.chunk_pause {
        std::thread::sleep(pause);
    }
}

/// Write `data` to `path` via a temp file in the same directory plus rename
fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());
    let tmp = path.with_file_name(format!(".{file_name}.part"));
    let result = fs::write(&tmp, data).and_then(|()| fs::rename(&tmp, path));
    if result.is_err() {
        // A short write or failed rename must not leave the temp behind.
        let _ = fs::remove_file(&tmp);
    }
    result
}
