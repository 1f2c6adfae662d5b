use std::time::Duration;

use crate::region::Rect;
use crate::source::CaptureSource;

/// Configuration of a mirror pipeline, fixed at construction.
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub struct MirrorSettings {
    /// Which output(s) to capture.
    pub source: CaptureSource,
    /// The rectangle to mirror, relative to the capture region's origin.
    pub clip: Rect,
    /// How long one frame acquisition may block before reporting a timeout.
    pub acquire_timeout: Duration,
    /// How long to wait before retrying enumeration when no output matches.
    pub rebuild_backoff: Duration,
}

impl MirrorSettings {
    /// Creates settings for mirroring `clip` from the given capture source,
    /// with the default timing parameters.
    #[must_use]
    pub const fn new(source: CaptureSource, clip: Rect) -> Self {
        Self {
            source,
            clip,
            acquire_timeout: Duration::from_millis(1000),
            rebuild_backoff: Duration::from_millis(500),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MirrorSettings;
    use crate::region::Rect;
    use crate::source::CaptureSource;

    #[test]
    fn default_timings_match_the_capture_contract() {
        let settings = MirrorSettings::new(CaptureSource::PrimaryMonitor, Rect::from_size(0, 0, 500, 500));
        assert_eq!(settings.acquire_timeout.as_millis(), 1000);
        assert_eq!(settings.rebuild_backoff.as_millis(), 500);
    }
}
