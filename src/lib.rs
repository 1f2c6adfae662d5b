//! # DXGI Mirror
//!
//! **dxgi-mirror** continuously captures one or more display outputs with the
//! DXGI Desktop Duplication API and mirrors them into a host window with
//! GPU-accelerated presentation. It is built for low-latency continuous
//! mirroring (remote desktop viewers, streaming, automated UI capture), not
//! one-shot screenshots: a dedicated capture thread owns the duplication
//! sessions, the host requests frames at its own pace, and a latest-wins
//! hand-off queue keeps a slow consumer from ever falling behind.
//!
//! ## Features
//!
//! - Capture the primary monitor, a secondary monitor, or the full virtual
//!   desktop spanning multiple adapters.
//! - Reused frame buffer, no per-frame allocation on the pixel path.
//! - Transparent recovery from lost duplication access (lock screen, desktop
//!   switches, resolution changes).
//! - Direct2D presentation into any `HWND`.
//!
//! ## Usage
//!
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
//!     // Called on the capture thread when a new image is ready to present.
//!     fn on_frame_ready(&mut self) {}
//!
//!     // Called with the raw BGRA bytes after the image was presented.
//!     fn on_frame_captured(&mut self, buffer: &[u8], width: u32, height: u32) {
//!         println!("{width}x{height}: {} bytes", buffer.len());
//!     }
//! }
//!
//! # fn window_handle() -> HWND { unimplemented!() }
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = MirrorSettings::new(
//!         CaptureSource::PrimaryMonitor,
//!         Rect::from_size(200, 200, 500, 500),
//!     );
//!     let mirror = ScreenMirror::new(window_handle(), settings, Handler)?;
//!
//!     mirror.signal_capture();
//!     // ... on the UI thread, once on_frame_ready fired:
//!     mirror.present_latest()?;
//!
//!     mirror.stop()?;
//!     Ok(())
//! }
//! ```
#![warn(clippy::semicolon_if_nothing_returned)]
#![warn(clippy::inconsistent_struct_constructor)]
#![warn(clippy::must_use_candidate)]
#![warn(clippy::ptr_as_ptr)]
#![warn(clippy::borrow_as_ptr)]
#![warn(clippy::nursery)]
#![warn(clippy::cargo)]

pub mod capture;
pub mod d3d11;
pub mod handoff;
pub mod manager;
pub mod output_session;
pub mod region;
pub mod settings;
pub mod source;
pub mod surface;
