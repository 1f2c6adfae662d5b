//! Enumeration and ownership of the duplication session set.
//!
//! [`DuplicationManager`] walks every DXGI adapter and its desktop-attached
//! outputs, binds one [`OutputSession`] per output, filters the set down to
//! the configured [`CaptureSource`], and drives all selected sessions through
//! one all-or-nothing capture call per cycle.

use log::{debug, info, trace, warn};
use windows::Win32::Graphics::Dxgi::{
    CreateDXGIFactory1, DXGI_ERROR_NOT_FOUND, IDXGIAdapter1, IDXGIFactory1, IDXGIOutput1,
};
use windows::core::Interface;

use crate::d3d11;
use crate::output_session::{self, FrameSink, OutputSession};
use crate::region::Rect;
use crate::source::{self, CaptureSource};

/// Errors that can occur while building or driving the session set.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A duplication binding was refused with access denied mid-enumeration.
    ///
    /// This signals a desktop-switch race: every session built during the
    /// pass has been discarded and enumeration must be retried on a delay.
    #[error("Access denied while binding duplication sessions; enumeration pass abandoned")]
    AccessDenied,
    /// A session reported that its duplication access was lost.
    ///
    /// The whole manager must be dropped and rebuilt from enumeration.
    #[error("Duplication access lost; the session set must be rebuilt")]
    AccessLost,
    /// Windows API error.
    #[error("Windows API error: {0}")]
    WindowsError(#[from] windows::core::Error),
}

/// Owns every duplication session selected by the active capture source.
///
/// The manager and its sessions live and die together: any fatal condition
/// drops the whole set, and the caller rebuilds from a fresh enumeration.
pub struct DuplicationManager {
    sessions: Vec<OutputSession>,
    region: Rect,
}

impl DuplicationManager {
    /// Enumerates adapters and outputs and binds the sessions matching `source`.
    ///
    /// Outputs not attached to the desktop are skipped. A bind refused with
    /// access denied aborts the whole pass ([`Error::AccessDenied`]); any
    /// other bind failure skips the remaining outputs of that adapter only.
    ///
    /// # Errors
    /// - [`Error::AccessDenied`] when the pass raced a desktop switch
    /// - [`Error::WindowsError`] when the DXGI factory or enumeration failed
    pub fn new(source: CaptureSource) -> Result<Self, Error> {
        let factory: IDXGIFactory1 = unsafe { CreateDXGIFactory1()? };

        let mut sessions = Vec::new();
        let mut adapter_index = 0u32;
        loop {
            let adapter = match unsafe { factory.EnumAdapters1(adapter_index) } {
                Ok(adapter) => adapter,
                Err(e) if e.code() == DXGI_ERROR_NOT_FOUND => break,
                Err(e) => return Err(Error::WindowsError(e)),
            };
            adapter_index += 1;

            let outputs = desktop_outputs(&adapter)?;
            if outputs.is_empty() {
                continue;
            }

            // Duplication requires a device on the adapter that owns the output.
            let (device, context) = match d3d11::create_d3d_device_for_adapter(&adapter) {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("skipping adapter {}: device creation failed: {e}", adapter_index - 1);
                    continue;
                }
            };

            for output in &outputs {
                match OutputSession::bind(adapter.clone(), device.clone(), context.clone(), output) {
                    Ok(session) => sessions.push(session),
                    Err(output_session::Error::AccessDenied) => {
                        // Binding gets refused right after a desktop switch is
                        // restored; the sessions built so far are unreliable.
                        debug!("access denied while binding duplication; discarding {} session(s)", sessions.len());
                        return Err(Error::AccessDenied);
                    }
                    Err(e) => {
                        warn!("failed to bind output duplication: {e}");
                        break;
                    }
                }
            }
        }

        debug!("enumerated {} desktop output(s)", sessions.len());

        let is_primary = sessions.iter().map(OutputSession::is_primary).collect::<Vec<bool>>();
        let selected = source::select(source, &is_primary);

        let mut selected_sessions = Vec::with_capacity(selected.len());
        for (index, session) in sessions.into_iter().enumerate() {
            if selected.contains(&index) {
                selected_sessions.push(session);
            }
        }

        let region =
            selected_sessions.iter().fold(Rect::EMPTY, |region, session| region.union(&session.desktop_bounds()));

        for session in &selected_sessions {
            info!(
                "selected output {} bounds ({}, {}, {}, {}) primary: {}",
                session.device_name(),
                session.desktop_bounds().left,
                session.desktop_bounds().top,
                session.desktop_bounds().right,
                session.desktop_bounds().bottom,
                session.is_primary()
            );
        }

        Ok(Self { sessions: selected_sessions, region })
    }

    /// Whether at least one session matched the capture source.
    ///
    /// Not being ready is a persistent benign state, e.g. a secondary monitor
    /// that is currently unplugged; callers retry enumeration on a delay.
    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        !self.sessions.is_empty() && !self.region.is_empty()
    }

    /// Gets the union bounding rectangle of all selected outputs.
    ///
    /// Empty when no output matched the capture source.
    #[inline]
    #[must_use]
    pub const fn region(&self) -> Rect {
        self.region
    }

    /// Gets the number of selected sessions.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the selection is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Gets the selected sessions in enumeration order.
    #[inline]
    #[must_use]
    pub fn sessions(&self) -> &[OutputSession] {
        &self.sessions
    }

    /// Pulls one frame from every selected session into `sink`.
    ///
    /// The attempt is all-or-nothing: if any session times out or fails
    /// benignly, the whole capture reports `false` and no partial frame is
    /// delivered. This matters when a full-desktop selection spans multiple
    /// adapters and one of them lags.
    ///
    /// The sink receives each output's bounds translated so the capture
    /// region's top-left corner is the origin.
    ///
    /// # Errors
    /// [`Error::AccessLost`] when any session lost duplication access; the
    /// manager must be dropped and rebuilt.
    pub fn capture(&mut self, sink: &mut dyn FrameSink, timeout_ms: u32) -> Result<bool, Error> {
        if self.sessions.is_empty() {
            return Ok(false);
        }

        let (dx, dy) = (-self.region.left, -self.region.top);
        for session in &mut self.sessions {
            let bounds = session.desktop_bounds().offset(dx, dy);
            match session.acquire_next_frame(timeout_ms, bounds, sink) {
                Ok(()) => (),
                Err(output_session::Error::Timeout) => {
                    trace!("no new frame on {} within the timeout", session.device_name());
                    return Ok(false);
                }
                Err(output_session::Error::AccessLost) => return Err(Error::AccessLost),
                Err(e) => {
                    warn!("frame acquisition failed on {}: {e}", session.device_name());
                    return Ok(false);
                }
            }
        }

        Ok(true)
    }
}

/// Collects the adapter's outputs that are attached to the desktop.
fn desktop_outputs(adapter: &IDXGIAdapter1) -> Result<Vec<IDXGIOutput1>, Error> {
    let mut outputs = Vec::new();
    let mut index = 0u32;
    loop {
        let output = match unsafe { adapter.EnumOutputs(index) } {
            Ok(output) => output,
            Err(e) if e.code() == DXGI_ERROR_NOT_FOUND => break,
            Err(e) => return Err(Error::WindowsError(e)),
        };
        index += 1;

        let desc = unsafe { output.GetDesc()? };
        if !desc.AttachedToDesktop.as_bool() {
            continue;
        }

        outputs.push(output.cast::<IDXGIOutput1>()?);
    }

    Ok(outputs)
}
