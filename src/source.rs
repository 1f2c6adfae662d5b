//! Capture-source selection.
//!
//! [`CaptureSource`] names which output(s) a mirror should duplicate, and
//! [`select`] resolves it against an enumerated session set without touching
//! any hardware handle, so the selection rules stay unit-testable.

/// Which display output(s) to capture.
///
/// The selector is fixed at construction; changing it requires rebuilding the
/// pipeline.
#[derive(Eq, PartialEq, Clone, Copy, Debug, Default)]
pub enum CaptureSource {
    /// The primary monitor.
    #[default]
    PrimaryMonitor,
    /// The first non-primary monitor in enumeration order.
    SecondaryMonitor,
    /// The n-th non-primary monitor (1-based) in enumeration order.
    ///
    /// `NthMonitor(1)` is equivalent to [`CaptureSource::SecondaryMonitor`].
    /// When fewer than `n` non-primary outputs exist the selection is empty.
    NthMonitor(usize),
    /// Every output attached to the desktop, spanning the full virtual desktop.
    FullDesktop,
}

/// Resolves a selector against the enumerated outputs.
///
/// `is_primary` holds one flag per session, in enumeration order (adapters,
/// then outputs). The returned indices preserve that order. Single-monitor
/// selectors stop scanning at the first match and therefore never select more
/// than one output, even if later outputs would also match.
#[must_use]
pub fn select(source: CaptureSource, is_primary: &[bool]) -> Vec<usize> {
    match source {
        CaptureSource::PrimaryMonitor => {
            is_primary.iter().position(|primary| *primary).into_iter().collect()
        }
        CaptureSource::SecondaryMonitor => {
            is_primary.iter().position(|primary| !*primary).into_iter().collect()
        }
        CaptureSource::NthMonitor(n) => {
            let Some(skip) = n.checked_sub(1) else {
                return Vec::new();
            };

            is_primary
                .iter()
                .enumerate()
                .filter(|(_, primary)| !**primary)
                .map(|(index, _)| index)
                .nth(skip)
                .into_iter()
                .collect()
        }
        CaptureSource::FullDesktop => (0..is_primary.len()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::{CaptureSource, select};

    // Enumeration order: primary at (0,0,1920,1080), secondary at (1920,0,1280,1024).
    const TWO_OUTPUTS: [bool; 2] = [true, false];

    #[test]
    fn primary_selects_only_the_primary() {
        assert_eq!(select(CaptureSource::PrimaryMonitor, &TWO_OUTPUTS), vec![0]);
        assert_eq!(select(CaptureSource::PrimaryMonitor, &[false, true, true]), vec![1]);
    }

    #[test]
    fn secondary_selects_the_first_non_primary() {
        assert_eq!(select(CaptureSource::SecondaryMonitor, &TWO_OUTPUTS), vec![1]);
        assert_eq!(select(CaptureSource::SecondaryMonitor, &[false, true, false]), vec![0]);
    }

    #[test]
    fn single_monitor_selectors_return_at_most_one() {
        let many = [true, false, false, false];
        for source in [
            CaptureSource::PrimaryMonitor,
            CaptureSource::SecondaryMonitor,
            CaptureSource::NthMonitor(2),
        ] {
            assert!(select(source, &many).len() <= 1, "{source:?} selected more than one");
        }
    }

    #[test]
    fn nth_monitor_skips_primaries() {
        let outputs = [false, true, false, false];
        assert_eq!(select(CaptureSource::NthMonitor(1), &outputs), vec![0]);
        assert_eq!(select(CaptureSource::NthMonitor(2), &outputs), vec![2]);
        assert_eq!(select(CaptureSource::NthMonitor(3), &outputs), vec![3]);
    }

    #[test]
    fn nth_monitor_beyond_available_outputs_is_empty() {
        assert!(select(CaptureSource::NthMonitor(2), &TWO_OUTPUTS).is_empty());
        assert!(select(CaptureSource::NthMonitor(5), &[true]).is_empty());
    }

    #[test]
    fn nth_monitor_zero_is_empty() {
        assert!(select(CaptureSource::NthMonitor(0), &TWO_OUTPUTS).is_empty());
    }

    #[test]
    fn full_desktop_selects_everything_in_order() {
        assert_eq!(select(CaptureSource::FullDesktop, &TWO_OUTPUTS), vec![0, 1]);
        assert_eq!(select(CaptureSource::FullDesktop, &[false, true, false]), vec![0, 1, 2]);
        assert!(select(CaptureSource::FullDesktop, &[]).is_empty());
    }

    #[test]
    fn selection_drives_the_capture_region() {
        use crate::region::Rect;

        let bounds = [Rect::from_size(0, 0, 1920, 1080), Rect::from_size(1920, 0, 1280, 1024)];
        let region = |source: CaptureSource| {
            select(source, &TWO_OUTPUTS)
                .into_iter()
                .fold(Rect::EMPTY, |region, index| region.union(&bounds[index]))
        };

        assert_eq!(region(CaptureSource::PrimaryMonitor), Rect { left: 0, top: 0, right: 1920, bottom: 1080 });
        assert_eq!(region(CaptureSource::FullDesktop), Rect { left: 0, top: 0, right: 3200, bottom: 1080 });
        // A selector with no match yields the empty region.
        assert!(region(CaptureSource::NthMonitor(2)).is_empty());
    }

    #[test]
    fn no_matching_output_yields_empty_selection() {
        assert!(select(CaptureSource::SecondaryMonitor, &[true]).is_empty());
        assert!(select(CaptureSource::PrimaryMonitor, &[false, false]).is_empty());
        assert!(select(CaptureSource::PrimaryMonitor, &[]).is_empty());
    }
}
