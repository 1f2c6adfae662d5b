//! GPU-backed presentation of captured frames.
//!
//! [`RenderSurface`] owns a Direct3D 11 device, an HWND swap chain, and a
//! Direct2D render target sized exactly to the mirrored region. It turns the
//! packed BGRA bytes of a finished capture into an [`ID2D1Bitmap`] and submits
//! draw work inside a begin/end bracket that always presents.

use log::debug;
use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Direct2D::Common::{D2D1_ALPHA_MODE_PREMULTIPLIED, D2D1_PIXEL_FORMAT, D2D_SIZE_U};
use windows::Win32::Graphics::Direct2D::{
    D2D1_ANTIALIAS_MODE_PER_PRIMITIVE, D2D1_BITMAP_PROPERTIES, D2D1_FACTORY_TYPE_MULTI_THREADED,
    D2D1_FEATURE_LEVEL_DEFAULT, D2D1_RENDER_TARGET_PROPERTIES, D2D1_RENDER_TARGET_TYPE_DEFAULT,
    D2D1_RENDER_TARGET_USAGE_NONE, D2D1CreateFactory, ID2D1Bitmap, ID2D1Factory, ID2D1RenderTarget,
};
use windows::Win32::Graphics::Direct3D11::{ID3D11Device, ID3D11DeviceContext};
use windows::Win32::Graphics::Dxgi::Common::{
    DXGI_ALPHA_MODE_IGNORE, DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_FORMAT_UNKNOWN, DXGI_SAMPLE_DESC,
};
use windows::Win32::Graphics::Dxgi::{
    DXGI_PRESENT, DXGI_SCALING_STRETCH, DXGI_SWAP_CHAIN_DESC1, DXGI_SWAP_EFFECT_FLIP_DISCARD,
    DXGI_USAGE_RENDER_TARGET_OUTPUT, IDXGIDevice, IDXGIFactory2, IDXGISurface, IDXGISwapChain1,
};
use windows::core::Interface;

use crate::d3d11;

/// Errors that can occur while presenting captured frames.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// [`RenderSurface::render`] was called before [`RenderSurface::initialize`].
    #[error("The render surface is not initialized")]
    NotInitialized,
    /// The byte buffer does not match the surface dimensions.
    #[error("Buffer length does not match width * height * 4")]
    InvalidBufferSize,
    /// DirectX device creation or related error.
    #[error("DirectX error: {0}")]
    DirectXError(#[from] d3d11::Error),
    /// Windows API error.
    #[error("Windows API error: {0}")]
    WindowsError(#[from] windows::core::Error),
}

struct SurfaceInner {
    // Field order is teardown order: the Direct2D target wraps the swap
    // chain's back buffer and must be released before the chain and device.
    render_target: ID2D1RenderTarget,
    swap_chain: IDXGISwapChain1,
    #[allow(dead_code)]
    context: ID3D11DeviceContext,
    #[allow(dead_code)]
    device: ID3D11Device,
    width: u32,
    height: u32,
}

// The surface is initialized on the capture thread and presented from the
// host thread, always behind one mutex; the D2D factory is created
// multi-threaded.
unsafe impl Send for SurfaceInner {}

/// A presentable surface bound to a host window.
///
/// Created empty; [`RenderSurface::initialize`] builds the GPU resources once
/// the capture rectangle is known and rebuilds them when the size changes.
pub struct RenderSurface {
    inner: Option<SurfaceInner>,
}

impl RenderSurface {
    #[must_use]
    pub const fn new() -> Self {
        Self { inner: None }
    }

    /// Whether the GPU resources have been built.
    #[inline]
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.inner.is_some()
    }

    /// Builds the device, swap chain, and render target for `window`.
    ///
    /// Calling again with the same size is a no-op; a different size tears the
    /// old resources down and rebuilds at the new dimensions.
    pub fn initialize(&mut self, window: HWND, width: u32, height: u32) -> Result<(), Error> {
        if let Some(inner) = &self.inner {
            if inner.width == width && inner.height == height {
                return Ok(());
            }
        }

        // Old resources must be gone before a new swap chain binds the HWND.
        self.inner = None;

        let (device, context) = d3d11::create_d3d_device()?;

        let dxgi_device = device.cast::<IDXGIDevice>()?;
        let adapter = unsafe { dxgi_device.GetAdapter()? };
        let factory: IDXGIFactory2 = unsafe { adapter.GetParent()? };

        let swap_chain_desc = DXGI_SWAP_CHAIN_DESC1 {
            Width: width,
            Height: height,
            Format: DXGI_FORMAT_B8G8R8A8_UNORM,
            SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
            BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
            BufferCount: 2,
            Scaling: DXGI_SCALING_STRETCH,
            SwapEffect: DXGI_SWAP_EFFECT_FLIP_DISCARD,
            AlphaMode: DXGI_ALPHA_MODE_IGNORE,
            ..Default::default()
        };

        let swap_chain =
            unsafe { factory.CreateSwapChainForHwnd(&device, window, &swap_chain_desc, None, None)? };

        let back_buffer: IDXGISurface = unsafe { swap_chain.GetBuffer(0)? };

        let d2d_factory: ID2D1Factory = unsafe { D2D1CreateFactory(D2D1_FACTORY_TYPE_MULTI_THREADED, None)? };

        let target_properties = D2D1_RENDER_TARGET_PROPERTIES {
            r#type: D2D1_RENDER_TARGET_TYPE_DEFAULT,
            pixelFormat: D2D1_PIXEL_FORMAT { format: DXGI_FORMAT_UNKNOWN, alphaMode: D2D1_ALPHA_MODE_PREMULTIPLIED },
            dpiX: 96.0,
            dpiY: 96.0,
            usage: D2D1_RENDER_TARGET_USAGE_NONE,
            minLevel: D2D1_FEATURE_LEVEL_DEFAULT,
        };

        let render_target = unsafe { d2d_factory.CreateDxgiSurfaceRenderTarget(&back_buffer, &target_properties)? };
        unsafe { render_target.SetAntialiasMode(D2D1_ANTIALIAS_MODE_PER_PRIMITIVE) };

        debug!("render surface initialized at {width}x{height}");

        self.inner = Some(SurfaceInner { render_target, swap_chain, context, device, width, height });

        Ok(())
    }

    /// Runs one scoped render session: begin, caller's drawing, end, present.
    ///
    /// The end/present half runs regardless of what the drawing closure did;
    /// a failed present is reported but leaves the surface usable, so callers
    /// may skip the frame and try again on the next cycle.
    ///
    /// # Errors
    /// - [`Error::NotInitialized`] before [`RenderSurface::initialize`]
    /// - [`Error::WindowsError`] when ending the draw or presenting failed
    pub fn render<F: FnOnce(&ID2D1RenderTarget)>(&self, draw: F) -> Result<(), Error> {
        let inner = self.inner.as_ref().ok_or(Error::NotInitialized)?;

        unsafe { inner.render_target.BeginDraw() };
        draw(&inner.render_target);
        let ended = unsafe { inner.render_target.EndDraw(None, None) };

        let presented = unsafe { inner.swap_chain.Present(0, DXGI_PRESENT(0)) };

        ended?;
        presented.ok()?;

        Ok(())
    }

    /// Wraps packed BGRA bytes as a bitmap renderable on this surface.
    ///
    /// Returns `None` while the surface is uninitialized; callers must check
    /// before queuing the image for presentation. The bytes are copied into
    /// the bitmap, so the source buffer may be reused immediately.
    ///
    /// # Errors
    /// [`Error::InvalidBufferSize`] when `bytes` is not `width * height * 4` long.
    pub fn build_image(&self, bytes: &[u8], width: u32, height: u32) -> Result<Option<ID2D1Bitmap>, Error> {
        let Some(inner) = &self.inner else {
            return Ok(None);
        };

        if bytes.len() != (width * height * 4) as usize {
            return Err(Error::InvalidBufferSize);
        }

        let bitmap_properties = D2D1_BITMAP_PROPERTIES {
            pixelFormat: D2D1_PIXEL_FORMAT {
                format: DXGI_FORMAT_B8G8R8A8_UNORM,
                alphaMode: D2D1_ALPHA_MODE_PREMULTIPLIED,
            },
            dpiX: 96.0,
            dpiY: 96.0,
        };

        let bitmap = unsafe {
            inner.render_target.CreateBitmap(
                D2D_SIZE_U { width, height },
                Some(bytes.as_ptr().cast()),
                width * 4,
                &bitmap_properties,
            )?
        };

        Ok(Some(bitmap))
    }

    /// Gets the surface width in pixels, zero before initialization.
    #[inline]
    #[must_use]
    pub fn width(&self) -> u32 {
        self.inner.as_ref().map_or(0, |inner| inner.width)
    }

    /// Gets the surface height in pixels, zero before initialization.
    #[inline]
    #[must_use]
    pub fn height(&self) -> u32 {
        self.inner.as_ref().map_or(0, |inner| inner.height)
    }
}

impl Default for RenderSurface {
    fn default() -> Self {
        Self::new()
    }
}
