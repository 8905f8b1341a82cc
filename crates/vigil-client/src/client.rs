// client.rs -- client-side state aggregate, wiped completely on reconnect

use vigil_common::math::Vec3;
use vigil_common::proto::{EffectFlags, ItemFlags, ModelInfo};

pub use vigil_common::refresh::{
    MAX_DLIGHTS, MAX_LIGHTSTYLES, MAX_PARTICLES, MAX_STYLE_STRING, MAX_VISEDICTS,
};

pub const MAX_EDICTS: usize = 1024;

// ============================================================
// Configuration
// ============================================================

/// How a light style pattern is evaluated each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LightStyleMode {
    /// Step through the pattern on the coarse clock.
    #[default]
    Animated,
    /// Hold every style at its pattern's peak intensity.
    Flat,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Force the blend fraction to 1 (snap to the newest snapshot).
    pub nolerp: bool,
    /// Deterministic timedemo playback; snapshots are consumed as-is.
    pub timedemo: bool,
    /// Listen-server session; no interpolation delay to hide.
    pub local_server: bool,
    /// Recorded-demo playback; view angles come from the stream and are
    /// blended like any other snapshot data.
    pub demo_playback: bool,
    /// Render from outside the view entity (adds it to the scene).
    pub third_person: bool,
    pub allow_colored_light: bool,
    pub lightstyle_mode: LightStyleMode,
    /// Multiplier on the particle gravity constant.
    pub gravity_scale: f32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            nolerp: false,
            timedemo: false,
            local_server: false,
            demo_playback: false,
            third_person: false,
            allow_colored_light: true,
            lightstyle_mode: LightStyleMode::Animated,
            gravity_scale: 1.0,
        }
    }
}

// ============================================================
// Client entity
// ============================================================

bitflags::bitflags! {
    /// Per-entity interpolation discontinuity markers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LerpFlags: u32 {
        /// Snap the transform on the next relink instead of blending.
        const RESET_MOVE = 1 << 0;
        /// Restart pose blending from the next keyframe.
        const RESET_ANIM = 1 << 1;
    }
}

#[derive(Debug, Clone)]
pub struct CEntity {
    /// Snapshot time this entity was last updated at; compared against
    /// `ClientState::mtime[0]` to detect vacated slots.
    pub msg_time: f64,
    /// [0] = newest snapshot, [1] = previous.
    pub msg_origins: [Vec3; 2],
    pub msg_angles: [Vec3; 2],

    // current interpolated transform
    pub origin: Vec3,
    pub angles: Vec3,

    // discrete keyframe pose pair for animation blending
    pub frame: i32,
    pub old_frame: i32,

    pub skin: i32,
    /// Index into the externally owned model registry.
    pub model: Option<usize>,
    pub effects: EffectFlags,

    /// Snap directly to the newest snapshot this relink.
    pub forcelink: bool,
    pub lerpflags: LerpFlags,

    /// Trailing-effect cursor: earliest time the next trail segment may
    /// spawn (0 = cursor cleared), and where the last one ended.
    pub trail_time: f64,
    pub trail_origin: Vec3,
}

impl Default for CEntity {
    fn default() -> Self {
        Self {
            msg_time: 0.0,
            msg_origins: [[0.0; 3]; 2],
            msg_angles: [[0.0; 3]; 2],
            origin: [0.0; 3],
            angles: [0.0; 3],
            frame: 0,
            old_frame: 0,
            skin: 0,
            model: None,
            effects: EffectFlags::empty(),
            forcelink: false,
            lerpflags: LerpFlags::empty(),
            trail_time: 0.0,
            trail_origin: [0.0; 3],
        }
    }
}

// ============================================================
// Client state
// ============================================================

#[derive(Debug)]
pub struct ClientState {
    /// Presentation clock; runs between the two snapshot times.
    pub time: f64,
    /// Snapshot times: [0] = newest, [1] = previous.
    pub mtime: [f64; 2],

    pub entities: Vec<CEntity>,
    /// Highest populated slot + 1; slot 0 is the world.
    pub num_entities: usize,

    /// Read-only model registry from the asset layer.
    pub models: Vec<ModelInfo>,

    pub viewentity: usize,
    pub items: ItemFlags,

    // player velocity from the snapshot pair, and its blend
    pub mvelocity: [Vec3; 2],
    pub velocity: Vec3,

    // view angles from the snapshot pair (demo playback blends these)
    pub mviewangles: [Vec3; 2],
    pub viewangles: Vec3,
}

impl Default for ClientState {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientState {
    pub fn new() -> Self {
        Self {
            time: 0.0,
            mtime: [0.0; 2],
            entities: vec![CEntity::default(); MAX_EDICTS],
            num_entities: 1,
            models: Vec::new(),
            viewentity: 0,
            items: ItemFlags::empty(),
            mvelocity: [[0.0; 3]; 2],
            velocity: [0.0; 3],
            mviewangles: [[0.0; 3]; 2],
            viewangles: [0.0; 3],
        }
    }

    /// Full reset, used on disconnect and before a new connection.
    pub fn clear(&mut self) {
        *self = Self::new();
    }
}
