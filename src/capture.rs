//! The background capture loop and its host-facing surface.
//!
//! [`ScreenMirror`] spawns a dedicated thread that owns every duplication
//! session and serializes capture requests: the host signals a capture, the
//! loop pulls one frame from every selected output into a persistent pixel
//! buffer, wraps it as a presentable image, and parks it on the latest-wins
//! hand-off queue. The host drains the queue from its own thread with
//! [`ScreenMirror::present_latest`], which renders the newest image and raises
//! the captured-frame event with the shared buffer.
//!
//! # Example
//! ```no_run
//! use dxgi_mirror::capture::{MirrorHandler, ScreenMirror};
//! use dxgi_mirror::region::Rect;
//! use dxgi_mirror::settings::MirrorSettings;
//! use dxgi_mirror::source::CaptureSource;
//! use windows::Win32::Foundation::HWND;
//!
//! struct Handler;
//!
//! impl MirrorHandler for Handler {
//!     fn on_frame_ready(&mut self) {
//!         // Signal the UI thread to call `present_latest`.
//!     }
//!
//!     fn on_frame_captured(&mut self, buffer: &[u8], width: u32, height: u32) {
//!         println!("captured {width}x{height} frame, {} bytes", buffer.len());
//!     }
//! }
//!
//! # fn window_handle() -> HWND { unimplemented!() }
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = MirrorSettings::new(CaptureSource::PrimaryMonitor, Rect::from_size(0, 0, 500, 500));
//!     let mirror = ScreenMirror::new(window_handle(), settings, Handler)?;
//!
//!     mirror.signal_capture();
//!     // ... later, on the UI thread, after on_frame_ready fired:
//!     mirror.present_latest()?;
//!
//!     mirror.stop()?;
//!     Ok(())
//! }
//! ```

use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use log::{debug, info, trace, warn};
use parking_lot::Mutex;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Direct2D::{D2D1_BITMAP_INTERPOLATION_MODE_LINEAR, ID2D1Bitmap};

use crate::d3d11::SendDirectX;
use crate::handoff::{CaptureSignals, HandoffQueue, Signal};
use crate::manager::{self, DuplicationManager};
use crate::output_session::MappedFrame;
use crate::region::Rect;
use crate::settings::MirrorSettings;
use crate::surface::{self, RenderSurface};

/// Errors that can occur while running a mirror pipeline.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The configured capture rectangle has zero width or height.
    #[error("The capture rectangle is empty")]
    EmptyClipRect,
    /// The capture thread could not be spawned.
    #[error("Failed to spawn the capture thread: {0}")]
    FailedToSpawnThread(#[from] std::io::Error),
    /// The capture thread panicked while being joined.
    #[error("Failed to join the capture thread")]
    FailedToJoinThread,
    /// Presenting the latest image failed.
    ///
    /// Wraps [`crate::surface::Error`]. Recoverable: skip this present and
    /// drain again on the next notification.
    #[error("Failed to present the latest image: {0}")]
    SurfaceError(#[from] surface::Error),
}

/// Host callbacks of a mirror pipeline.
///
/// Both methods run with the pipeline's internal locks arranged so that the
/// handler may call back into [`ScreenMirror`]; keep them short regardless,
/// `on_frame_ready` runs on the capture thread.
pub trait MirrorHandler: Send + 'static {
    /// A finished image landed on the hand-off queue.
    ///
    /// Called on the capture thread. Typically signals the host UI thread to
    /// call [`ScreenMirror::present_latest`].
    fn on_frame_ready(&mut self);

    /// The newest image was presented.
    ///
    /// `buffer` holds the mirrored region as tightly packed rows of 32-bit
    /// pixels, byte order blue/green/red/alpha. The slice is only valid for
    /// the duration of the call: the next capture cycle reuses it in place.
    fn on_frame_captured(&mut self, buffer: &[u8], width: u32, height: u32);
}

/// The persistent destination buffer, written by the capture thread and read
/// by the host inside the captured-frame event.
struct FrameStore {
    bytes: Vec<u8>,
    width: u32,
    height: u32,
}

enum LoopExit {
    Stopped,
    AccessLost,
}

/// A running screen-mirror pipeline.
///
/// Construction binds nothing: the capture thread enumerates outputs on its
/// own and keeps retrying until the configured source appears, so a mirror
/// for an unplugged secondary monitor simply stays idle until it is plugged
/// in. Dropping the mirror stops the thread and releases every GPU resource.
pub struct ScreenMirror<H: MirrorHandler> {
    signals: Arc<CaptureSignals>,
    queue: Arc<HandoffQueue<SendDirectX<ID2D1Bitmap>>>,
    surface: Arc<Mutex<RenderSurface>>,
    frame: Arc<Mutex<FrameStore>>,
    handler: Arc<Mutex<H>>,
    rebuilds: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

impl<H: MirrorHandler> ScreenMirror<H> {
    /// Starts the capture thread for the given host window and settings.
    ///
    /// # Errors
    /// - [`Error::EmptyClipRect`] when the capture rectangle is empty
    /// - [`Error::FailedToSpawnThread`] when the OS refused the thread
    pub fn new(window: HWND, settings: MirrorSettings, handler: H) -> Result<Self, Error> {
        if settings.clip.is_empty() {
            return Err(Error::EmptyClipRect);
        }

        let width = settings.clip.width() as u32;
        let height = settings.clip.height() as u32;

        let signals = Arc::new(CaptureSignals::new());
        let queue = Arc::new(HandoffQueue::new());
        let surface = Arc::new(Mutex::new(RenderSurface::new()));
        let frame = Arc::new(Mutex::new(FrameStore {
            bytes: vec![0u8; (width * height * 4) as usize],
            width,
            height,
        }));
        let handler = Arc::new(Mutex::new(handler));
        let rebuilds = Arc::new(AtomicU64::new(0));

        let thread = {
            let window = SendDirectX::new(window);
            let signals = Arc::clone(&signals);
            let queue = Arc::clone(&queue);
            let surface = Arc::clone(&surface);
            let frame = Arc::clone(&frame);
            let handler = Arc::clone(&handler);
            let rebuilds = Arc::clone(&rebuilds);

            thread::Builder::new().name("dxgi-mirror capture".into()).spawn(move || {
                Self::run(window, settings, &signals, &queue, &surface, &frame, &handler, &rebuilds);
            })?
        };

        Ok(Self { signals, queue, surface, frame, handler, rebuilds, thread: Some(thread) })
    }

    /// Requests one capture cycle.
    ///
    /// Safe to call from any thread and at any rate; requests raised while a
    /// capture is in flight coalesce, and the consumer only ever renders the
    /// newest finished frame.
    pub fn signal_capture(&self) {
        self.signals.request_capture();
    }

    /// Drains the hand-off queue and presents the newest image, if any.
    ///
    /// Superseded images were already dropped at hand-off; this renders the
    /// most recent one through the render surface and then raises
    /// [`MirrorHandler::on_frame_captured`] with the shared pixel buffer.
    /// Returns `false` when the queue was empty.
    ///
    /// # Errors
    /// [`Error::SurfaceError`] when the present failed; skip and retry on the
    /// next notification.
    pub fn present_latest(&self) -> Result<bool, Error> {
        let Some(image) = self.queue.take_latest() else {
            return Ok(false);
        };
        let bitmap = image.0;

        // Lock order everywhere: frame store first, then surface. Holding the
        // store across the present keeps the capture thread from overwriting
        // the buffer until the captured-frame event has run.
        let frame = self.frame.lock();

        {
            let surface = self.surface.lock();
            surface.render(|target| unsafe {
                target.DrawBitmap(&bitmap, None, 1.0, D2D1_BITMAP_INTERPOLATION_MODE_LINEAR, None);
            })?;
        }

        self.handler.lock().on_frame_captured(&frame.bytes, frame.width, frame.height);

        Ok(true)
    }

    /// Gets the handler to call its methods directly.
    #[must_use]
    pub fn handler(&self) -> Arc<Mutex<H>> {
        Arc::clone(&self.handler)
    }

    /// Gets how many times a session set has been bound since construction.
    ///
    /// Increments on the first successful enumeration and again after every
    /// access-lost recovery.
    #[must_use]
    pub fn session_rebuilds(&self) -> u64 {
        self.rebuilds.load(Ordering::Relaxed)
    }

    /// Stops the capture thread and releases every owned resource.
    ///
    /// A frame acquisition already in flight is allowed to finish or time out
    /// first; this blocks until the thread has exited.
    ///
    /// # Errors
    /// [`Error::FailedToJoinThread`] when the capture thread panicked.
    pub fn stop(mut self) -> Result<(), Error> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), Error> {
        self.signals.request_stop();

        if let Some(thread) = self.thread.take() {
            thread.join().map_err(|_| Error::FailedToJoinThread)?;
        }

        Ok(())
    }

    /// The outer rebuild loop: enumerate, wait for readiness, capture until
    /// stop or access lost.
    #[allow(clippy::too_many_arguments)]
    fn run(
        window: SendDirectX<HWND>,
        settings: MirrorSettings,
        signals: &CaptureSignals,
        queue: &HandoffQueue<SendDirectX<ID2D1Bitmap>>,
        surface: &Mutex<RenderSurface>,
        frame: &Mutex<FrameStore>,
        handler: &Mutex<H>,
        rebuilds: &AtomicU64,
    ) {
        let window = window.0;

        loop {
            if signals.stop_requested() {
                break;
            }

            let mut manager = match DuplicationManager::new(settings.source) {
                Ok(manager) => manager,
                Err(e) => {
                    // Access denied here means the pass raced a desktop
                    // switch; either way the batch is gone, retry on a delay.
                    debug!("session enumeration failed: {e}");
                    if signals.stop_within(settings.rebuild_backoff) {
                        break;
                    }
                    continue;
                }
            };

            if !manager.is_ready() {
                debug!("no output matched {:?}; retrying", settings.source);
                if signals.stop_within(settings.rebuild_backoff) {
                    break;
                }
                continue;
            }

            rebuilds.fetch_add(1, Ordering::Relaxed);
            let region = manager.region();
            info!(
                "bound {} session(s), region ({}, {}, {}, {})",
                manager.len(),
                region.left,
                region.top,
                region.right,
                region.bottom
            );

            if let Err(e) = surface.lock().initialize(
                window,
                settings.clip.width() as u32,
                settings.clip.height() as u32,
            ) {
                warn!("render surface initialization failed: {e}");
                if signals.stop_within(settings.rebuild_backoff) {
                    break;
                }
                continue;
            }

            match Self::capture_loop(&mut manager, settings, signals, queue, surface, frame, handler) {
                LoopExit::Stopped => break,
                LoopExit::AccessLost => {
                    info!("duplication access lost; rebuilding the session set");
                    drop(manager);
                }
            }
        }

        trace!("capture thread exiting");
    }

    /// The inner loop: block on the signals, capture on request, hand off.
    fn capture_loop(
        manager: &mut DuplicationManager,
        settings: MirrorSettings,
        signals: &CaptureSignals,
        queue: &HandoffQueue<SendDirectX<ID2D1Bitmap>>,
        surface: &Mutex<RenderSurface>,
        frame: &Mutex<FrameStore>,
        handler: &Mutex<H>,
    ) -> LoopExit {
        let timeout_ms = u32::try_from(settings.acquire_timeout.as_millis()).unwrap_or(u32::MAX);

        loop {
            match signals.wait() {
                Signal::Stop => return LoopExit::Stopped,
                Signal::Capture => (),
            }

            // Lock order: frame store first, then surface (matches the host's
            // present path).
            let image = {
                let mut store = frame.lock();
                let clip = settings.clip;

                let captured = {
                    let bytes = store.bytes.as_mut_slice();
                    let mut sink = |src: &MappedFrame<'_>, bounds: Rect| {
                        blit(bytes, clip, src.data(), src.row_pitch(), bounds);
                    };
                    manager.capture(&mut sink, timeout_ms)
                };

                match captured {
                    Ok(true) => {
                        let surface = surface.lock();
                        match surface.build_image(&store.bytes, store.width, store.height) {
                            Ok(Some(bitmap)) => Some(SendDirectX::new(bitmap)),
                            Ok(None) => {
                                warn!("render surface not initialized; dropping frame");
                                None
                            }
                            Err(e) => {
                                warn!("failed to build the presentable image: {e}");
                                None
                            }
                        }
                    }
                    // A missed frame is not an error; wait for the next request.
                    Ok(false) => None,
                    Err(manager::Error::AccessLost) => return LoopExit::AccessLost,
                    Err(e) => {
                        warn!("capture failed: {e}");
                        None
                    }
                }
            };

            if let Some(image) = image {
                queue.push(image);
                handler.lock().on_frame_ready();
            }
        }
    }
}

impl<H: MirrorHandler> Drop for ScreenMirror<H> {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

/// Copies the part of a mapped source frame that falls inside `clip` into the
/// packed destination buffer.
///
/// `dst` holds `clip.width() * clip.height()` 32-bit pixels in tightly packed
/// rows. `bounds` positions the source within the same coordinate space as
/// `clip` (the capture region's origin); `src` rows are `src_pitch` bytes
/// apart. Pixels of `clip` outside `bounds` are left untouched.
fn blit(dst: &mut [u8], clip: Rect, src: &[u8], src_pitch: usize, bounds: Rect) {
    let overlap = clip.intersect(&bounds);
    if overlap.is_empty() {
        return;
    }

    let dst_pitch = (clip.width() * 4) as usize;
    let row_len = (overlap.width() * 4) as usize;
    let src_x = ((overlap.left - bounds.left) * 4) as usize;
    let dst_x = ((overlap.left - clip.left) * 4) as usize;

    debug_assert!(dst.len() >= (clip.height() as usize) * dst_pitch);
    debug_assert!(src.len() >= ((overlap.bottom - bounds.top) as usize - 1) * src_pitch + src_x + row_len);

    let src_address = src.as_ptr() as usize;
    let dst_address = dst.as_mut_ptr() as usize;
    (overlap.top..overlap.bottom).into_par_iter().for_each(|y| {
        let src_offset = ((y - bounds.top) as usize) * src_pitch + src_x;
        let dst_offset = ((y - clip.top) as usize) * dst_pitch + dst_x;

        // SAFETY: the offsets stay inside `src` and `dst` (asserted above),
        // and distinct rows never overlap in the destination.
        unsafe {
            ptr::copy_nonoverlapping(
                (src_address as *const u8).add(src_offset),
                (dst_address as *mut u8).add(dst_offset),
                row_len,
            );
        }
    });
}

#[cfg(test)]
mod tests {
    use super::blit;
    use crate::region::Rect;

    /// Builds a source frame where every pixel encodes its own coordinates.
    fn source_frame(width: i32, height: i32, pitch: usize, tag: u8) -> Vec<u8> {
        let mut frame = vec![0xAAu8; pitch * height as usize];
        for y in 0..height {
            for x in 0..width {
                let offset = y as usize * pitch + x as usize * 4;
                frame[offset..offset + 4].copy_from_slice(&[x as u8, y as u8, tag, 0xFF]);
            }
        }
        frame
    }

    fn pixel(dst: &[u8], clip: Rect, x: i32, y: i32) -> [u8; 4] {
        let offset = ((y - clip.top) * clip.width() + (x - clip.left)) as usize * 4;
        dst[offset..offset + 4].try_into().unwrap()
    }

    #[test]
    fn copies_the_clipped_window_of_a_single_output() {
        let clip = Rect::from_size(1, 1, 2, 2);
        let bounds = Rect::from_size(0, 0, 4, 4);
        // Padded rows: 4 pixels of payload, 20 bytes of pitch.
        let src = source_frame(4, 4, 20, 7);

        let mut dst = vec![0u8; (clip.width() * clip.height() * 4) as usize];
        blit(&mut dst, clip, &src, 20, bounds);

        assert_eq!(pixel(&dst, clip, 1, 1), [1, 1, 7, 0xFF]);
        assert_eq!(pixel(&dst, clip, 2, 1), [2, 1, 7, 0xFF]);
        assert_eq!(pixel(&dst, clip, 1, 2), [1, 2, 7, 0xFF]);
        assert_eq!(pixel(&dst, clip, 2, 2), [2, 2, 7, 0xFF]);
    }

    #[test]
    fn assembles_side_by_side_outputs_into_one_buffer() {
        let clip = Rect::from_size(0, 0, 4, 2);
        let left = Rect::from_size(0, 0, 2, 2);
        let right = Rect::from_size(2, 0, 2, 2);

        let mut dst = vec![0u8; (clip.width() * clip.height() * 4) as usize];
        blit(&mut dst, clip, &source_frame(2, 2, 8, 1), 8, left);
        blit(&mut dst, clip, &source_frame(2, 2, 8, 2), 8, right);

        // Left output fills columns 0-1, right output columns 2-3.
        assert_eq!(pixel(&dst, clip, 0, 0), [0, 0, 1, 0xFF]);
        assert_eq!(pixel(&dst, clip, 1, 1), [1, 1, 1, 0xFF]);
        assert_eq!(pixel(&dst, clip, 2, 0), [0, 0, 2, 0xFF]);
        assert_eq!(pixel(&dst, clip, 3, 1), [1, 1, 2, 0xFF]);
    }

    #[test]
    fn disjoint_bounds_leave_the_destination_untouched() {
        let clip = Rect::from_size(0, 0, 2, 2);
        let bounds = Rect::from_size(100, 0, 2, 2);
        let src = source_frame(2, 2, 8, 9);

        let mut dst = vec![0x55u8; (clip.width() * clip.height() * 4) as usize];
        blit(&mut dst, clip, &src, 8, bounds);

        assert!(dst.iter().all(|byte| *byte == 0x55));
    }

    #[test]
    fn partial_overlap_writes_only_the_covered_pixels() {
        let clip = Rect::from_size(0, 0, 4, 4);
        // Output covering only the right half of the clip.
        let bounds = Rect::from_size(2, 0, 4, 4);
        let src = source_frame(4, 4, 16, 3);

        let mut dst = vec![0u8; (clip.width() * clip.height() * 4) as usize];
        blit(&mut dst, clip, &src, 16, bounds);

        // Left half untouched, right half mapped from the source's left edge.
        assert_eq!(pixel(&dst, clip, 0, 0), [0, 0, 0, 0]);
        assert_eq!(pixel(&dst, clip, 2, 0), [0, 0, 3, 0xFF]);
        assert_eq!(pixel(&dst, clip, 3, 3), [1, 3, 3, 0xFF]);
    }
}
