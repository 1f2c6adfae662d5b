use windows::Win32::Graphics::Direct3D::{
    D3D_DRIVER_TYPE_HARDWARE, D3D_DRIVER_TYPE_UNKNOWN, D3D_FEATURE_LEVEL, D3D_FEATURE_LEVEL_10_0,
    D3D_FEATURE_LEVEL_10_1, D3D_FEATURE_LEVEL_11_0, D3D_FEATURE_LEVEL_11_1,
};
use windows::Win32::Graphics::Direct3D11::{
    D3D11_CREATE_DEVICE_BGRA_SUPPORT, D3D11_SDK_VERSION, D3D11CreateDevice, ID3D11Device, ID3D11DeviceContext,
};
use windows::Win32::Foundation::HMODULE;
use windows::Win32::Graphics::Dxgi::IDXGIAdapter1;

/// To share DirectX structs between threads.
pub struct SendDirectX<T>(pub T);

impl<T> SendDirectX<T> {
    pub const fn new(device: T) -> Self {
        Self(device)
    }
}

#[allow(clippy::non_send_fields_in_send_ty)]
unsafe impl<T> Send for SendDirectX<T> {}

/// Errors that can occur while creating Direct3D devices.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Windows API error.
    #[error("Windows API error: {0}")]
    WindowsError(#[from] windows::core::Error),
}

const FEATURE_LEVELS: [D3D_FEATURE_LEVEL; 4] =
    [D3D_FEATURE_LEVEL_11_1, D3D_FEATURE_LEVEL_11_0, D3D_FEATURE_LEVEL_10_1, D3D_FEATURE_LEVEL_10_0];

/// Creates an `ID3D11Device` and `ID3D11DeviceContext` on the default hardware adapter.
pub fn create_d3d_device() -> Result<(ID3D11Device, ID3D11DeviceContext), Error> {
    let mut d3d_device = None;
    let mut d3d_device_context = None;
    unsafe {
        D3D11CreateDevice(
            None,
            D3D_DRIVER_TYPE_HARDWARE,
            HMODULE::default(),
            D3D11_CREATE_DEVICE_BGRA_SUPPORT,
            Some(&FEATURE_LEVELS),
            D3D11_SDK_VERSION,
            Some(&mut d3d_device),
            None,
            Some(&mut d3d_device_context),
        )?;
    };

    Ok((d3d_device.unwrap(), d3d_device_context.unwrap()))
}

/// Creates an `ID3D11Device` and `ID3D11DeviceContext` on the given adapter.
///
/// Duplication requires the device to live on the adapter that owns the
/// output, so the driver type must be `D3D_DRIVER_TYPE_UNKNOWN` here.
pub fn create_d3d_device_for_adapter(
    adapter: &IDXGIAdapter1,
) -> Result<(ID3D11Device, ID3D11DeviceContext), Error> {
    let mut d3d_device = None;
    let mut d3d_device_context = None;
    unsafe {
        D3D11CreateDevice(
            adapter,
            D3D_DRIVER_TYPE_UNKNOWN,
            HMODULE::default(),
            D3D11_CREATE_DEVICE_BGRA_SUPPORT,
            Some(&FEATURE_LEVELS),
            D3D11_SDK_VERSION,
            Some(&mut d3d_device),
            None,
            Some(&mut d3d_device_context),
        )?;
    };

    Ok((d3d_device.unwrap(), d3d_device_context.unwrap()))
}
