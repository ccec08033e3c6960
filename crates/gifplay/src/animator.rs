use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;
use tracing::trace;

use crate::config::Config;
use crate::error::Error;
use crate::source::{AssetBundle, GifSource};
use crate::store::FrameStore;
use crate::surface::Animatable;

/// How a bound surface receives new frames.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UpdateStrategy {
    /// The surface exposed an [`crate::ImageSlot`]; every new frame is
    /// written into it before the redraw request.
    Push,
    /// The surface pulls [`Animator::active_frame`] when it repaints.
    Pull,
}

/// Lifecycle of an [`Animator`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AnimatorState {
    /// Nothing bound.
    Idle,
    /// An animation is bound and its first frame is up, but time is not
    /// advancing.
    Ready,
    Playing,
    /// A finite loop count ran out. The last frame stays up until a new
    /// animation is bound.
    Finished,
}

/// Drives one animation on one surface.
///
/// The animator owns the [`FrameStore`] for whatever is currently bound
/// and turns host ticks into frame changes. It never calls back into the
/// host except through the bound surface: a slot write (push surfaces)
/// followed by a redraw request, at most once per actual frame change.
///
/// Binding a new source while one is playing releases the old store,
/// its cache, and its prefetch worker before the new one loads.
pub struct Animator {
    config: Config,
    bundle: Option<AssetBundle>,
    store: Option<FrameStore>,
    active: Option<Arc<RgbaImage>>,
    state: AnimatorState,
    strategy: UpdateStrategy,
}

impl Default for Animator {
    fn default() -> Self {
        Animator::new(Config::default())
    }
}

impl Animator {
    pub fn new(config: Config) -> Self {
        Animator {
            config,
            bundle: None,
            store: None,
            active: None,
            state: AnimatorState::Idle,
            strategy: UpdateStrategy::Pull,
        }
    }

    /// Resolve named sources against `root` instead of treating them as
    /// bare filesystem paths.
    pub fn with_assets(mut self, root: impl Into<PathBuf>) -> Self {
        self.bundle = Some(AssetBundle::new(root));
        self
    }

    pub fn state(&self) -> AnimatorState {
        self.state
    }

    pub fn is_animating(&self) -> bool {
        self.state == AnimatorState::Playing
    }

    /// How the surface bound last is updated. Resolved once per bind.
    pub fn update_strategy(&self) -> UpdateStrategy {
        self.strategy
    }

    /// The frame playback currently shows. `None` while idle.
    pub fn active_frame(&self) -> Option<Arc<RgbaImage>> {
        self.active.clone()
    }

    pub fn frame_count(&self) -> usize {
        self.store.as_ref().map_or(0, |store| store.frame_count())
    }

    pub fn current_frame_index(&self) -> usize {
        self.store.as_ref().map_or(0, |store| store.current_index())
    }

    /// Bind and start playing in one go.
    pub fn animate(
        &mut self,
        source: GifSource,
        surface: &mut dyn Animatable,
    ) -> Result<(), Error> {
        self.prepare_for_animation(source, surface)?;
        self.start_animating();
        Ok(())
    }

    /// Bind `source` to `surface`, leaving the first frame up without
    /// playing. Whether the surface gets push or pull updates is decided
    /// here, from whether it exposes an image slot.
    #[profiling::function]
    pub fn prepare_for_animation(
        &mut self,
        source: GifSource,
        surface: &mut dyn Animatable,
    ) -> Result<(), Error> {
        // release the previous animation before loading the next
        self.store = None;
        self.active = None;
        self.set_state(AnimatorState::Idle);

        self.strategy = if surface.image_slot().is_some() {
            UpdateStrategy::Push
        } else {
            UpdateStrategy::Pull
        };

        let target = surface.frame_rect().pixel_size();
        let mut store = FrameStore::new(
            source,
            self.bundle.as_ref(),
            target,
            surface.content_mode(),
            self.config.clone(),
        )?;
        store.prepare_for_animation();

        self.active = store.current_frame();
        self.store = Some(store);
        self.push_active(surface);
        surface.request_redraw();
        self.set_state(AnimatorState::Ready);
        Ok(())
    }

    /// Ready to playing. A no-op in any other state; in particular a
    /// finished animation only restarts through a fresh bind.
    pub fn start_animating(&mut self) {
        if self.state != AnimatorState::Ready {
            return;
        }
        if let Some(store) = &mut self.store {
            store.set_animating(true);
        }
        self.set_state(AnimatorState::Playing);
    }

    /// Playing to ready, keeping position, cache, and the shown frame.
    pub fn stop_animating(&mut self) {
        if self.state != AnimatorState::Playing {
            return;
        }
        if let Some(store) = &mut self.store {
            store.set_animating(false);
        }
        self.set_state(AnimatorState::Ready);
    }

    /// Drop the bound animation, for surface recycling. The store's
    /// cache and prefetch worker go with it.
    pub fn prepare_for_reuse(&mut self) {
        self.store = None;
        self.active = None;
        self.set_state(AnimatorState::Idle);
    }

    /// Advance playback by `dt` of wall-clock time.
    ///
    /// When the elapsed time crosses one or more frame delays the new
    /// frame is fetched, pushed into the surface's slot if it has one,
    /// and a single redraw is requested.
    #[profiling::function]
    pub fn update(&mut self, dt: Duration, surface: &mut dyn Animatable) {
        if self.state != AnimatorState::Playing {
            return;
        }

        let (changed, finished) = match &mut self.store {
            Some(store) => (store.should_change_frame(dt), store.is_finished()),
            None => return,
        };

        if changed {
            self.active = self
                .store
                .as_mut()
                .and_then(|store| store.current_frame());
            self.push_active(surface);
            surface.request_redraw();
        }

        if finished {
            if let Some(store) = &mut self.store {
                store.set_animating(false);
            }
            self.set_state(AnimatorState::Finished);
        }
    }

    fn push_active(&self, surface: &mut dyn Animatable) {
        if self.strategy != UpdateStrategy::Push {
            return;
        }
        if let Some(slot) = surface.image_slot() {
            slot.image = self.active.clone();
        }
    }

    fn set_state(&mut self, new_state: AnimatorState) {
        if self.state != new_state {
            trace!(from = ?self.state, to = ?new_state, "animator state change");
            self.state = new_state;
        }
    }
}
