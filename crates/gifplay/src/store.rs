use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use image::RgbaImage;
use tracing::{debug, trace};

use crate::config::Config;
use crate::decode::rasterize::Rasterizer;
use crate::decode::{GifImage, LoopCount};
use crate::error::Error;
use crate::scale::fit_frame;
use crate::source::{AssetBundle, GifSource};
use crate::surface::{ContentMode, PixelDimensions};

const PREFETCH_CHANNEL_BOUND: usize = 4;

struct CachedFrame {
    image: Arc<RgbaImage>,
    bytes: usize,
    last_used: u64,
}

struct PrefetchedFrame {
    index: usize,
    image: Arc<RgbaImage>,
}

/// Holds a decoded GIF and serves rasterized frames for it, sized and
/// fitted for one surface.
///
/// Frames come out of three places, in order: results streamed in from
/// the prefetch worker, the in-memory cache, and a synchronous rasterize
/// on a miss. The cache is bounded by [`Config::max_cache_bytes`] and
/// evicts least recently used frames first, so long GIFs re-rasterize
/// cold frames instead of growing without limit.
///
/// The store also owns the playback clock: [`FrameStore::should_change_frame`]
/// consumes elapsed time and advances the current index through the
/// frame delays and the loop count.
pub struct FrameStore {
    image: GifImage,
    target: PixelDimensions,
    content_mode: ContentMode,
    config: Config,

    cache: HashMap<usize, CachedFrame>,
    cache_bytes: usize,
    use_counter: u64,
    rasterizer: Rasterizer,
    receiver: Option<Receiver<PrefetchedFrame>>,
    prefetch_started: bool,

    current_index: usize,
    elapsed: Duration,
    remaining_loops: Option<u16>,
    finished: bool,
    animating: bool,
}

impl FrameStore {
    /// Resolve and decode `source`, building a store that rasterizes at
    /// `target` (zero means the GIF's native size).
    pub fn new(
        source: GifSource,
        bundle: Option<&AssetBundle>,
        target: PixelDimensions,
        content_mode: ContentMode,
        config: Config,
    ) -> Result<FrameStore, Error> {
        let data = source.resolve(bundle)?;
        let image = GifImage::decode_with(data, &config)?;
        Ok(Self::from_image(image, target, content_mode, config))
    }

    pub fn from_image(
        image: GifImage,
        target: PixelDimensions,
        content_mode: ContentMode,
        config: Config,
    ) -> FrameStore {
        let target = if target.is_zero() { image.size } else { target };
        let remaining_loops = initial_loops(image.loop_count);
        let rasterizer = Rasterizer::new(image.clone());

        FrameStore {
            image,
            target,
            content_mode,
            config,
            cache: HashMap::new(),
            cache_bytes: 0,
            use_counter: 0,
            rasterizer,
            receiver: None,
            prefetch_started: false,
            current_index: 0,
            elapsed: Duration::ZERO,
            remaining_loops,
            finished: false,
            animating: false,
        }
    }

    pub fn image(&self) -> &GifImage {
        &self.image
    }

    pub fn frame_count(&self) -> usize {
        self.image.frame_count()
    }

    /// The size frames are rasterized at.
    pub fn frame_size(&self) -> PixelDimensions {
        self.target
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_animating(&self) -> bool {
        self.animating
    }

    pub fn set_animating(&mut self, animating: bool) {
        self.animating = animating;
    }

    /// Kick off the background rasterization of the first
    /// [`Config::prefetch_frames`] frames. Redundant calls are no-ops.
    #[profiling::function]
    pub fn prepare_for_animation(&mut self) {
        if self.prefetch_started {
            return;
        }
        self.prefetch_started = true;

        let count = self.config.prefetch_frames.min(self.frame_count());
        if count == 0 {
            return;
        }

        let (sender, receiver) = mpsc::sync_channel(PREFETCH_CHANNEL_BOUND);
        let mut rasterizer = Rasterizer::new(self.image.clone());
        let target = self.target;
        let content_mode = self.content_mode;

        thread::spawn(move || {
            for index in 0..count {
                let canvas = rasterizer.next_frame();
                let image = Arc::new(fit_frame(&canvas, target, content_mode));
                if sender.send(PrefetchedFrame { index, image }).is_err() {
                    trace!("prefetch receiver dropped at frame {index}");
                    return;
                }
            }
            trace!("prefetched {count} frames");
        });

        self.receiver = Some(receiver);
    }

    /// The rasterized frame at `index`, fitted to the target size.
    ///
    /// Prefetched results and the cache are consulted first; a miss
    /// rasterizes synchronously. Only an out-of-range index yields
    /// `None`.
    #[profiling::function]
    pub fn frame(&mut self, index: usize) -> Option<Arc<RgbaImage>> {
        self.drain_prefetched();
        if index >= self.frame_count() {
            return None;
        }
        if let Some(image) = self.cache_hit(index) {
            return Some(image);
        }

        let canvas = self.rasterizer.frame_at(index);
        let image = Arc::new(fit_frame(&canvas, self.target, self.content_mode));
        trace!(index, "rasterized frame on cache miss");
        self.insert(index, image.clone());
        Some(image)
    }

    /// Like [`FrameStore::frame`] but never rasterizes.
    pub fn cached_frame(&mut self, index: usize) -> Option<Arc<RgbaImage>> {
        self.drain_prefetched();
        self.cache_hit(index)
    }

    /// The frame playback currently sits on.
    pub fn current_frame(&mut self) -> Option<Arc<RgbaImage>> {
        self.frame(self.current_index)
    }

    /// Feed elapsed time into the playback clock. Returns whether the
    /// current index changed.
    ///
    /// Time left over after a frame's delay carries into the next frame
    /// exactly, so a large `dt` can step over several frames (or whole
    /// loops) in one call. Wrapping all the way back to the same index
    /// reports no change. Once the loop count is exhausted the index
    /// pins to the last frame and this always returns false.
    pub fn should_change_frame(&mut self, dt: Duration) -> bool {
        if self.finished || self.image.frames.is_empty() {
            return false;
        }

        self.elapsed = self.elapsed.saturating_add(dt);
        let start = self.current_index;

        // frame delays are floored at decode time, so this terminates
        loop {
            let delay = self.image.frames[self.current_index].delay;
            if self.elapsed < delay {
                break;
            }

            if self.current_index + 1 < self.frame_count() {
                self.elapsed -= delay;
                self.current_index += 1;
                continue;
            }

            match &mut self.remaining_loops {
                None => {
                    self.elapsed -= delay;
                    self.current_index = 0;
                }
                Some(loops) => {
                    if *loops <= 1 {
                        *loops = 0;
                        self.finished = true;
                        debug!("animation finished after final loop");
                        break;
                    }
                    *loops -= 1;
                    self.elapsed -= delay;
                    self.current_index = 0;
                }
            }
        }

        self.current_index != start
    }

    /// Drop all playback and cache state, back to just-constructed.
    ///
    /// The receiver is dropped here, which is what stops an in-flight
    /// prefetch worker: its next send fails and it exits.
    pub fn reset(&mut self) {
        self.cache.clear();
        self.cache_bytes = 0;
        self.receiver = None;
        self.prefetch_started = false;
        self.rasterizer.rewind();
        self.current_index = 0;
        self.elapsed = Duration::ZERO;
        self.remaining_loops = initial_loops(self.image.loop_count);
        self.finished = false;
        self.animating = false;
    }

    fn drain_prefetched(&mut self) {
        let Some(receiver) = self.receiver.take() else {
            return;
        };

        let mut ready = Vec::new();
        let mut disconnected = false;
        loop {
            match receiver.try_recv() {
                Ok(frame) => ready.push(frame),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    disconnected = true;
                    break;
                }
            }
        }
        if !disconnected {
            self.receiver = Some(receiver);
        }

        for frame in ready {
            trace!(index = frame.index, "prefetched frame arrived");
            self.insert(frame.index, frame.image);
        }
    }

    fn cache_hit(&mut self, index: usize) -> Option<Arc<RgbaImage>> {
        self.use_counter += 1;
        let counter = self.use_counter;
        let hit = self.cache.get_mut(&index)?;
        hit.last_used = counter;
        Some(hit.image.clone())
    }

    fn insert(&mut self, index: usize, image: Arc<RgbaImage>) {
        let bytes = frame_bytes(&image);
        if bytes > self.config.max_cache_bytes {
            trace!(index, bytes, "frame exceeds the whole cache budget");
            return;
        }

        self.use_counter += 1;
        let cached = CachedFrame {
            image,
            bytes,
            last_used: self.use_counter,
        };
        if let Some(old) = self.cache.insert(index, cached) {
            self.cache_bytes -= old.bytes;
        }
        self.cache_bytes += bytes;
        self.evict_to_budget();
    }

    fn evict_to_budget(&mut self) {
        while self.cache_bytes > self.config.max_cache_bytes {
            let Some((&oldest, _)) = self
                .cache
                .iter()
                .min_by_key(|(_, frame)| frame.last_used)
            else {
                break;
            };
            if let Some(evicted) = self.cache.remove(&oldest) {
                self.cache_bytes -= evicted.bytes;
                trace!(index = oldest, bytes = evicted.bytes, "evicted frame");
            }
        }
    }
}

fn initial_loops(loop_count: LoopCount) -> Option<u16> {
    match loop_count {
        LoopCount::Infinite => None,
        LoopCount::Finite(count) => Some(count),
    }
}

fn frame_bytes(image: &RgbaImage) -> usize {
    image.width() as usize * image.height() as usize * 4
}
