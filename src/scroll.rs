//! Reading-progress bar under the header.
//!
//! Scroll notifications arrive far more often than frames; [`ScrollTracker`]
//! folds them into at most one recompute per frame.

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

impl ScrollMetrics {
    /// Distance the container can scroll.
    pub fn scrollable(&self) -> f64 {
        (self.scroll_height - self.client_height).max(0.0)
    }
}

/// Percentage of the page scrolled, clamped to `[0, 100]`.
pub fn progress_percent(metrics: ScrollMetrics) -> f64 {
    let total = metrics.scrollable();
    if total <= 0.0 {
        return 0.0;
    }
    (metrics.scroll_top / total * 100.0).clamp(0.0, 100.0)
}

/// Scroll offset for a click `click_x` pixels into a bar `bar_width` wide.
pub fn seek_target(click_x: f64, bar_width: f64, metrics: ScrollMetrics) -> f64 {
    if bar_width <= 0.0 {
        return 0.0;
    }
    let fraction = (click_x / bar_width).clamp(0.0, 1.0);
    fraction * metrics.scrollable()
}

#[derive(Debug, Clone, Default)]
pub struct ScrollTracker {
    progress: f64,
    frame_pending: bool,
}

impl ScrollTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// Returns true when the caller must request a frame.
    pub fn on_scroll(&mut self) -> bool {
        if self.frame_pending {
            return false;
        }
        self.frame_pending = true;
        true
    }

    /// Frame callback: recompute from the container's current metrics.
    pub fn on_frame(&mut self, metrics: ScrollMetrics) -> f64 {
        self.progress = progress_percent(metrics);
        self.frame_pending = false;
        self.progress
    }
}
