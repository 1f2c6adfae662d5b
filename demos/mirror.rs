use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::Parser;

use dxgi_mirror::capture::{MirrorHandler, ScreenMirror};
use dxgi_mirror::region::Rect;
use dxgi_mirror::settings::MirrorSettings;
use dxgi_mirror::source::CaptureSource;

use windows::Win32::Foundation::{HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::WindowsAndMessaging::{
    CS_HREDRAW, CS_VREDRAW, CreateWindowExW, DefWindowProcW, DispatchMessageW, MSG, PM_REMOVE, PeekMessageW,
    PostQuitMessage, RegisterClassW, TranslateMessage, WINDOW_EX_STYLE, WM_DESTROY, WM_QUIT, WNDCLASSW,
    WS_OVERLAPPEDWINDOW, WS_VISIBLE,
};
use windows::core::w;

// This struct will be used to handle the mirror events.
struct Mirror {
    // Set on the capture thread, drained by the message loop below.
    frame_ready: Arc<AtomicBool>,
    // To count the number of frames presented since last reset
    frame_count_since_reset: u64,
    // To store the time when frame count was last reset
    last_reset: Instant,
}

impl MirrorHandler for Mirror {
    // Called on the capture thread when a finished image is queued.
    fn on_frame_ready(&mut self) {
        self.frame_ready.store(true, Ordering::SeqCst);
    }

    // Called with the raw BGRA bytes after the image was presented.
    fn on_frame_captured(&mut self, buffer: &[u8], width: u32, height: u32) {
        self.frame_count_since_reset += 1;

        let elapsed_since_reset = self.last_reset.elapsed();
        if elapsed_since_reset >= Duration::from_secs(1) {
            let fps = self.frame_count_since_reset as f64 / elapsed_since_reset.as_secs_f64();
            println!("{width}x{height} | {} bytes | {fps:.2} FPS", buffer.len());

            self.frame_count_since_reset = 0;
            self.last_reset = Instant::now();
        }
    }
}

#[derive(Parser)]
#[command(name = "Screen Mirror")]
#[command(about = "Mirrors a display output into a window")]
struct Cli {
    /// Capture source: primary, secondary, desktop, or a non-primary monitor number
    #[arg(long, default_value = "primary")]
    source: String,

    /// Left edge of the mirrored rectangle
    #[arg(long, default_value_t = 0)]
    x: i32,

    /// Top edge of the mirrored rectangle
    #[arg(long, default_value_t = 0)]
    y: i32,

    /// Width of the mirrored rectangle
    #[arg(long, default_value_t = 800)]
    width: i32,

    /// Height of the mirrored rectangle
    #[arg(long, default_value_t = 600)]
    height: i32,

    /// Capture requests per second
    #[arg(long, default_value_t = 30)]
    frame_rate: u32,
}

fn parse_source(s: &str) -> CaptureSource {
    match s.to_lowercase().as_str() {
        "primary" => CaptureSource::PrimaryMonitor,
        "secondary" => CaptureSource::SecondaryMonitor,
        "desktop" => CaptureSource::FullDesktop,
        other => match other.parse::<usize>() {
            Ok(n) => CaptureSource::NthMonitor(n),
            Err(_) => {
                eprintln!("Invalid source value: {}", s);
                std::process::exit(1);
            }
        },
    }
}

fn create_mirror_window(width: i32, height: i32) -> HWND {
    unsafe {
        let instance = GetModuleHandleW(None).expect("Failed to get module handle");
        let class_name = w!("DxgiMirrorWindow");

        let window_class = WNDCLASSW {
            lpfnWndProc: Some(window_proc),
            hInstance: instance.into(),
            lpszClassName: class_name,
            style: CS_HREDRAW | CS_VREDRAW,
            ..Default::default()
        };
        RegisterClassW(&window_class);

        CreateWindowExW(
            WINDOW_EX_STYLE(0),
            class_name,
            w!("Screen Mirror"),
            WS_OVERLAPPEDWINDOW | WS_VISIBLE,
            0,
            0,
            width,
            height,
            None,
            None,
            Some(instance.into()),
            None,
        )
        .expect("Failed to create the mirror window")
    }
}

unsafe extern "system" fn window_proc(window: HWND, message: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    match message {
        WM_DESTROY => {
            unsafe { PostQuitMessage(0) };
            LRESULT(0)
        }
        _ => unsafe { DefWindowProcW(window, message, wparam, lparam) },
    }
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let source = parse_source(&cli.source);
    let clip = Rect::from_size(cli.x, cli.y, cli.width, cli.height);

    let stop_flag = Arc::new(AtomicBool::new(false));
    {
        let stop_flag = stop_flag.clone();
        ctrlc::set_handler(move || {
            stop_flag.store(true, Ordering::SeqCst);
        })
        .expect("Error setting Ctrl-C handler");
    }

    let window = create_mirror_window(cli.width, cli.height);

    let frame_ready = Arc::new(AtomicBool::new(false));
    let handler = Mirror {
        frame_ready: frame_ready.clone(),
        frame_count_since_reset: 0,
        last_reset: Instant::now(),
    };

    let settings = MirrorSettings::new(source, clip);
    let mirror = ScreenMirror::new(window, settings, handler).expect("Screen Mirror failed to start");
    println!("Mirroring {source:?}, press Ctrl+C to stop.");

    let request_interval = Duration::from_secs(1) / cli.frame_rate.max(1);
    let mut message = MSG::default();

    'outer: while !stop_flag.load(Ordering::SeqCst) {
        unsafe {
            while PeekMessageW(&mut message, None, 0, 0, PM_REMOVE).as_bool() {
                if message.message == WM_QUIT {
                    break 'outer;
                }
                let _ = TranslateMessage(&message);
                DispatchMessageW(&message);
            }
        }

        mirror.signal_capture();

        if frame_ready.swap(false, Ordering::SeqCst) {
            if let Err(e) = mirror.present_latest() {
                eprintln!("Present failed, skipping frame: {e}");
            }
        }

        std::thread::sleep(request_interval);
    }

    mirror.stop().expect("Screen Mirror failed to stop");
    println!("\nMirror stopped.");
}
