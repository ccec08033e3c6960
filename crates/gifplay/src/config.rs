use std::time::Duration;

/// Default cap on rasterized frames held in memory per store.
pub const DEFAULT_MAX_CACHE_BYTES: usize = 64 * 1024 * 1024;

/// Default number of frames the prefetch worker rasterizes ahead of playback.
pub const DEFAULT_PREFETCH_FRAMES: usize = 8;

/// Playback tuning knobs. The defaults are fine for UI work; lower
/// `max_cache_bytes` on memory constrained targets.
#[derive(Debug, Clone)]
pub struct Config {
    /// Byte budget for rasterized frames in a [`crate::FrameStore`].
    /// Least recently used frames are evicted once the budget is exceeded.
    pub max_cache_bytes: usize,

    /// How many frames to rasterize ahead on a background thread when a
    /// store is prepared for animation. Zero disables prefetch.
    pub prefetch_frames: usize,

    /// Floor applied to non-zero frame delays. Many GIFs carry 1/100s
    /// delays that no viewer honors as written.
    pub min_frame_duration: Duration,

    /// Substitute for a zero (or missing) frame delay.
    pub zero_frame_duration: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_cache_bytes: DEFAULT_MAX_CACHE_BYTES,
            prefetch_frames: DEFAULT_PREFETCH_FRAMES,
            min_frame_duration: Duration::from_millis(20),
            zero_frame_duration: Duration::from_millis(100),
        }
    }
}

impl Config {
    /// GIF delays are hundredths of a second. Zero and sub-threshold
    /// delays are floored so a repeated-subtraction scheduler always
    /// makes progress.
    pub fn normalize_delay(&self, delay_cs: u16) -> Duration {
        if delay_cs == 0 {
            self.zero_frame_duration
        } else {
            Duration::from_millis(delay_cs as u64 * 10).max(self.min_frame_duration)
        }
    }
}
