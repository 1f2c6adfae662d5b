//! One duplication session bound to one display output.
//!
//! [`OutputSession`] owns the `IDXGIOutputDuplication` for a single output
//! together with the adapter and Direct3D 11 device it was created on. Frames
//! are pulled with [`OutputSession::acquire_next_frame`], which runs the
//! acquire -> staging copy -> map -> sink -> release protocol and never lets a
//! hardware frame escape the call.

use std::{mem, ptr, slice};

use log::trace;
use windows::Win32::Foundation::E_ACCESSDENIED;
use windows::Win32::Graphics::Direct3D11::{
    D3D11_CPU_ACCESS_READ, D3D11_MAP_READ, D3D11_MAPPED_SUBRESOURCE, D3D11_TEXTURE2D_DESC, D3D11_USAGE_STAGING,
    ID3D11Device, ID3D11DeviceContext, ID3D11Texture2D,
};
use windows::Win32::Graphics::Dxgi::Common::DXGI_SAMPLE_DESC;
use windows::Win32::Graphics::Dxgi::{
    DXGI_ERROR_ACCESS_LOST, DXGI_ERROR_WAIT_TIMEOUT, DXGI_OUTDUPL_FRAME_INFO, IDXGIAdapter1, IDXGIOutput1,
    IDXGIOutputDuplication, IDXGIResource,
};
use windows::Win32::Graphics::Gdi::{GetMonitorInfoW, HMONITOR, MONITORINFO};
use windows::Win32::UI::WindowsAndMessaging::MONITORINFOF_PRIMARY;
use windows::core::Interface;

use crate::region::Rect;

/// Errors that can occur while binding or pulling frames from an output session.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Binding the duplication was refused with access denied.
    ///
    /// Raised during a desktop-switch race; the whole enumeration batch must
    /// be discarded, not just this output.
    #[error("Duplication binding refused with access denied")]
    AccessDenied,
    /// `AcquireNextFrame` timed out without a new frame becoming available.
    #[error("AcquireNextFrame timed out")]
    Timeout,
    /// The duplication access was lost and the session set must be recreated.
    #[error("Duplication access lost; the session must be recreated")]
    AccessLost,
    /// Windows API error.
    #[error("Windows API error: {0}")]
    WindowsError(#[from] windows::core::Error),
}

/// A CPU view of one acquired frame, valid only inside the copy sink.
pub struct MappedFrame<'a> {
    data: &'a [u8],
    row_pitch: usize,
}

impl MappedFrame<'_> {
    /// Gets the mapped pixel rows, `row_pitch` bytes apart.
    #[inline]
    #[must_use]
    pub const fn data(&self) -> &[u8] {
        self.data
    }

    /// Gets the byte distance between the starts of consecutive rows.
    #[inline]
    #[must_use]
    pub const fn row_pitch(&self) -> usize {
        self.row_pitch
    }
}

/// Receives the mapped pixels of an acquired frame.
///
/// `bounds` is expressed relative to the destination's origin; the session
/// itself never assumes a destination layout.
pub trait FrameSink {
    fn copy_frame(&mut self, src: &MappedFrame<'_>, bounds: Rect);
}

impl<F: FnMut(&MappedFrame<'_>, Rect)> FrameSink for F {
    fn copy_frame(&mut self, src: &MappedFrame<'_>, bounds: Rect) {
        self(src, bounds);
    }
}

/// One duplication session bound to one physical output.
///
/// The session exclusively owns its adapter, device, and duplication handle.
/// The duplication is either valid or the whole session is unusable; there is
/// no partially valid state to recover from in place.
pub struct OutputSession {
    // Field order is teardown order: the duplication must be released before
    // the device that created it, and the device before its adapter.
    duplication: IDXGIOutputDuplication,
    context: ID3D11DeviceContext,
    device: ID3D11Device,
    #[allow(dead_code)]
    adapter: IDXGIAdapter1,
    desktop_bounds: Rect,
    is_primary: bool,
    device_name: String,
}

impl OutputSession {
    /// Binds a duplication session for `output` on the given adapter's device.
    ///
    /// # Errors
    /// - [`Error::AccessDenied`] when the platform refuses the binding during
    ///   a desktop switch; the caller must discard every session built so far
    /// - [`Error::WindowsError`] for other binding failures
    pub(crate) fn bind(
        adapter: IDXGIAdapter1,
        device: ID3D11Device,
        context: ID3D11DeviceContext,
        output: &IDXGIOutput1,
    ) -> Result<Self, Error> {
        let desc = unsafe { output.GetDesc()? };

        let duplication = match unsafe { output.DuplicateOutput(&device) } {
            Ok(duplication) => duplication,
            Err(e) if e.code() == E_ACCESSDENIED => return Err(Error::AccessDenied),
            Err(e) => return Err(Error::WindowsError(e)),
        };

        let device_name = String::from_utf16_lossy(
            &desc.DeviceName.iter().take_while(|ch| **ch != 0x0000).copied().collect::<Vec<u16>>(),
        );

        Ok(Self {
            duplication,
            context,
            device,
            adapter,
            desktop_bounds: desc.DesktopCoordinates.into(),
            is_primary: monitor_is_primary(desc.Monitor),
            device_name,
        })
    }

    /// Gets the output's bounds in virtual-screen coordinates.
    #[inline]
    #[must_use]
    pub const fn desktop_bounds(&self) -> Rect {
        self.desktop_bounds
    }

    /// Whether this output is the primary monitor.
    #[inline]
    #[must_use]
    pub const fn is_primary(&self) -> bool {
        self.is_primary
    }

    /// Gets the GDI device name of the output, e.g. `\\.\DISPLAY1`.
    #[inline]
    #[must_use]
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Acquires the next frame and feeds it to `sink`, blocking up to `timeout_ms`.
    ///
    /// The sink runs strictly between acquire and release: the frame is copied
    /// to a CPU-readable staging texture, mapped, handed to the sink together
    /// with the caller-supplied destination-relative `bounds`, and the
    /// hardware frame is released before this method returns on every path.
    ///
    /// # Errors
    /// - [`Error::Timeout`] when no frame arrives within `timeout_ms`; retry
    ///   on the next cycle, the session stays valid
    /// - [`Error::AccessLost`] when the duplication became invalid (desktop
    ///   switch, lock screen); dispose the whole session set and rebuild
    /// - [`Error::WindowsError`] for failures on the copy path; treat as "no
    ///   frame this cycle"
    pub fn acquire_next_frame(
        &mut self,
        timeout_ms: u32,
        bounds: Rect,
        sink: &mut dyn FrameSink,
    ) -> Result<(), Error> {
        let mut frame_info = DXGI_OUTDUPL_FRAME_INFO::default();
        let mut resource = None;

        match unsafe { self.duplication.AcquireNextFrame(timeout_ms, &mut frame_info, &mut resource) } {
            Ok(()) => (),
            Err(e) if e.code() == DXGI_ERROR_WAIT_TIMEOUT => return Err(Error::Timeout),
            Err(e) if e.code() == DXGI_ERROR_ACCESS_LOST => return Err(Error::AccessLost),
            Err(e) => return Err(Error::WindowsError(e)),
        }

        let resource: IDXGIResource = resource.unwrap();

        // Release the hardware frame no matter how the copy went.
        let copied = self.copy_out(&resource, bounds, sink);
        drop(resource);
        match unsafe { self.duplication.ReleaseFrame() } {
            Ok(()) => (),
            Err(e) if e.code() == DXGI_ERROR_ACCESS_LOST => return Err(Error::AccessLost),
            Err(e) => return Err(Error::WindowsError(e)),
        }

        copied
    }

    /// Copies the acquired frame through a staging texture and runs the sink
    /// over the mapped bytes.
    fn copy_out(&self, resource: &IDXGIResource, bounds: Rect, sink: &mut dyn FrameSink) -> Result<(), Error> {
        let frame_texture = resource.cast::<ID3D11Texture2D>()?;

        let mut frame_desc = D3D11_TEXTURE2D_DESC::default();
        unsafe { frame_texture.GetDesc(&mut frame_desc) };

        let staging_desc = D3D11_TEXTURE2D_DESC {
            Width: frame_desc.Width,
            Height: frame_desc.Height,
            MipLevels: 1,
            ArraySize: 1,
            Format: frame_desc.Format,
            SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
            Usage: D3D11_USAGE_STAGING,
            BindFlags: 0,
            CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
            MiscFlags: 0,
        };

        let mut staging = None;
        unsafe {
            self.device.CreateTexture2D(&staging_desc, None, Some(&mut staging))?;
        };
        let staging = staging.unwrap();

        unsafe {
            self.context.CopyResource(&staging, &frame_texture);
        };

        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        unsafe {
            self.context.Map(&staging, 0, D3D11_MAP_READ, 0, Some(&mut mapped))?;
        };

        // SAFETY: the staging texture stays alive and mapped until the Unmap below.
        let data = unsafe {
            slice::from_raw_parts(mapped.pData.cast::<u8>(), (frame_desc.Height * mapped.RowPitch) as usize)
        };

        trace!("copying frame from {} ({}x{})", self.device_name, frame_desc.Width, frame_desc.Height);
        sink.copy_frame(&MappedFrame { data, row_pitch: mapped.RowPitch as usize }, bounds);

        unsafe { self.context.Unmap(&staging, 0) };

        Ok(())
    }
}

fn monitor_is_primary(monitor: HMONITOR) -> bool {
    let mut monitor_info = MONITORINFO {
        cbSize: u32::try_from(mem::size_of::<MONITORINFO>()).unwrap(),
        ..Default::default()
    };

    if !unsafe { GetMonitorInfoW(monitor, ptr::addr_of_mut!(monitor_info)) }.as_bool() {
        return false;
    }

    monitor_info.dwFlags & MONITORINFOF_PRIMARY == MONITORINFOF_PRIMARY
}
