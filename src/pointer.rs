//! Pointer animation controller: the custom cursor.
//!
//! Two followers track the pointer. The *dot* is written straight from every
//! pointer-move notification. The *glow* trails behind it, eased toward the
//! raw position once per display frame. Hovering an interactive element puts
//! both followers in the "hot" treatment.
//!
//! All DOM access goes through three narrow seams ([`FollowerSurface`],
//! [`FrameScheduler`], [`PointerListeners`]) so the controller runs and is
//! tested without a browser.

/// Damping constant for the glow follower.
pub const SMOOTHING: f64 = 0.15;

/// Follower scale while hovering an interactive element.
pub const HOT_SCALE: f64 = 1.5;

pub const REST_SCALE: f64 = 1.0;

/// Viewports narrower than this keep the native cursor.
pub const MOBILE_BREAKPOINT: f64 = 640.0;

/// Classes that mark an element as interactive.
pub const INTERACTIVE_CLASSES: [&str; 2] = ["hover-cursor-target", "text-anim"];

/// Tags that are always interactive.
pub const INTERACTIVE_TAGS: [&str; 3] = ["a", "button", "img"];

// ---------------------------------------------------------------------------
// Device profile
// ---------------------------------------------------------------------------

/// Capabilities of the current device, computed once by the root view and
/// passed down for the whole session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceProfile {
    pub touch_capable: bool,
    pub viewport_width: f64,
}

impl DeviceProfile {
    /// Build from what the host reports at mount time.
    pub fn detect(max_touch_points: u32, coarse_pointer: bool, viewport_width: f64) -> Self {
        Self {
            touch_capable: max_touch_points > 0 || coarse_pointer,
            viewport_width,
        }
    }

    pub fn supports_custom_cursor(&self) -> bool {
        !self.touch_capable && self.viewport_width >= MOBILE_BREAKPOINT
    }
}

// ---------------------------------------------------------------------------
// Hit testing
// ---------------------------------------------------------------------------

pub type NodeId = u64;

/// The parts of an element the hot-state predicate looks at.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementInfo {
    pub id: NodeId,
    pub tag: String,
    pub classes: Vec<String>,
    /// Carries a `data-interactive` attribute.
    pub data_interactive: bool,
}

impl ElementInfo {
    pub fn new(id: NodeId, tag: &str) -> Self {
        Self {
            id,
            tag: tag.to_ascii_lowercase(),
            classes: Vec::new(),
            data_interactive: false,
        }
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.classes.push(class.to_string());
        self
    }

    pub fn with_data_interactive(mut self) -> Self {
        self.data_interactive = true;
        self
    }

    pub fn is_interactive(&self) -> bool {
        self.data_interactive
            || INTERACTIVE_TAGS.contains(&self.tag.as_str())
            || self
                .classes
                .iter()
                .any(|c| INTERACTIVE_CLASSES.contains(&c.as_str()))
    }
}

/// Closest interactive node on `path` (event target first, then ancestors).
pub fn find_hot_target(path: &[ElementInfo]) -> Option<&ElementInfo> {
    path.iter().find(|el| el.is_interactive())
}

// ---------------------------------------------------------------------------
// Pointer state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PointerState {
    pub raw_x: f64,
    pub raw_y: f64,
    pub glow_x: f64,
    pub glow_y: f64,
    pub is_hot: bool,
}

impl PointerState {
    /// One easing step of the glow toward the raw position.
    pub fn step(&mut self, k: f64) {
        self.glow_x += (self.raw_x - self.glow_x) * k;
        self.glow_y += (self.raw_y - self.glow_y) * k;
    }

    /// Euclidean distance from the glow to the raw position.
    pub fn lag(&self) -> f64 {
        (self.raw_x - self.glow_x).hypot(self.raw_y - self.glow_y)
    }

    pub fn scale(&self) -> f64 {
        if self.is_hot {
            HOT_SCALE
        } else {
            REST_SCALE
        }
    }
}

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Follower {
    Glow,
    Dot,
}

/// Imperative style writes for the two followers and the root element.
pub trait FollowerSurface {
    /// False when either follower element is not mounted.
    fn has_followers(&self) -> bool;
    fn set_follower_transform(&mut self, follower: Follower, x: f64, y: f64, scale: f64);
    fn set_hot(&mut self, hot: bool);
    /// Highlight `target` as hot text, un-highlighting any previous one.
    fn mark_hot_target(&mut self, target: Option<NodeId>);
    fn set_followers_visible(&mut self, visible: bool);
    fn set_native_cursor_hidden(&mut self, hidden: bool);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle(pub u64);

/// Display-synchronised frame callbacks (`requestAnimationFrame`).
pub trait FrameScheduler {
    fn request_frame(&mut self) -> FrameHandle;
    fn cancel_frame(&mut self, handle: FrameHandle);
}

/// Window-level `mousemove` / `mouseover` registration.
pub trait PointerListeners {
    fn attach(&mut self);
    fn detach(&mut self);
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Inactive,
    Running { pending: Option<FrameHandle> },
    TornDown,
}

pub struct PointerController<S, F, L>
where
    S: FollowerSurface,
    F: FrameScheduler,
    L: PointerListeners,
{
    state: PointerState,
    hot_target: Option<NodeId>,
    phase: Phase,
    surface: S,
    scheduler: F,
    listeners: L,
}

impl<S, F, L> PointerController<S, F, L>
where
    S: FollowerSurface,
    F: FrameScheduler,
    L: PointerListeners,
{
    /// Mount the controller. On devices without a custom cursor, or when the
    /// follower elements are missing, it stays inactive and touches nothing.
    pub fn mount(profile: DeviceProfile, mut surface: S, mut scheduler: F, mut listeners: L) -> Self {
        let phase = if profile.supports_custom_cursor() && surface.has_followers() {
            listeners.attach();
            surface.set_native_cursor_hidden(true);
            surface.set_followers_visible(true);
            Phase::Running { pending: Some(scheduler.request_frame()) }
        } else {
            Phase::Inactive
        };

        Self {
            state: PointerState::default(),
            hot_target: None,
            phase,
            surface,
            scheduler,
            listeners,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.phase, Phase::Running { .. })
    }

    pub fn state(&self) -> &PointerState {
        &self.state
    }

    pub fn hot_target(&self) -> Option<NodeId> {
        self.hot_target
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn scheduler(&self) -> &F {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut F {
        &mut self.scheduler
    }

    pub fn listeners(&self) -> &L {
        &self.listeners
    }

    pub fn on_pointer_move(&mut self, x: f64, y: f64) {
        if !self.is_active() {
            return;
        }
        self.state.raw_x = x;
        self.state.raw_y = y;
        self.surface
            .set_follower_transform(Follower::Dot, x, y, self.state.scale());
    }

    /// `mouseover` handler: `path` is the target followed by its ancestors.
    pub fn on_pointer_over(&mut self, path: &[ElementInfo]) {
        match find_hot_target(path) {
            Some(el) => self.on_pointer_enter_target(el.id),
            None => self.on_pointer_leave_target(),
        }
    }

    pub fn on_pointer_enter_target(&mut self, target: NodeId) {
        if !self.is_active() || self.hot_target == Some(target) {
            return;
        }
        let was_hot = self.state.is_hot;
        self.hot_target = Some(target);
        self.state.is_hot = true;
        self.surface.mark_hot_target(Some(target));
        if !was_hot {
            self.surface.set_hot(true);
            self.repaint();
        }
    }

    pub fn on_pointer_leave_target(&mut self) {
        if !self.is_active() || !self.state.is_hot {
            return;
        }
        self.hot_target = None;
        self.state.is_hot = false;
        self.surface.mark_hot_target(None);
        self.surface.set_hot(false);
        self.repaint();
    }

    /// Frame callback: ease the glow and schedule the next frame.
    pub fn tick(&mut self) {
        if !self.is_active() {
            return;
        }
        self.state.step(SMOOTHING);
        self.surface.set_follower_transform(
            Follower::Glow,
            self.state.glow_x,
            self.state.glow_y,
            self.state.scale(),
        );
        self.phase = Phase::Running { pending: Some(self.scheduler.request_frame()) };
    }

    /// Cancel the frame loop, detach listeners and restore the native cursor.
    /// Safe to call any number of times.
    pub fn teardown(&mut self) {
        match self.phase {
            Phase::Running { pending } => {
                if let Some(handle) = pending {
                    self.scheduler.cancel_frame(handle);
                }
                self.listeners.detach();
                if self.hot_target.take().is_some() {
                    self.surface.mark_hot_target(None);
                }
                if self.state.is_hot {
                    self.state.is_hot = false;
                    self.surface.set_hot(false);
                }
                self.surface.set_followers_visible(false);
                self.surface.set_native_cursor_hidden(false);
                self.phase = Phase::TornDown;
            }
            Phase::Inactive => self.phase = Phase::TornDown,
            Phase::TornDown => {}
        }
    }

    // Re-apply the current scale after a hot-state change.
    fn repaint(&mut self) {
        let scale = self.state.scale();
        self.surface
            .set_follower_transform(Follower::Dot, self.state.raw_x, self.state.raw_y, scale);
        self.surface
            .set_follower_transform(Follower::Glow, self.state.glow_x, self.state.glow_y, scale);
    }
}

impl<S, F, L> Drop for PointerController<S, F, L>
where
    S: FollowerSurface,
    F: FrameScheduler,
    L: PointerListeners,
{
    fn drop(&mut self) {
        self.teardown();
    }
}
