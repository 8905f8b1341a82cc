// proto.rs -- decoded server-stream records and the flag sets they carry
//
// The network layer parses wire bytes elsewhere; this core only ever sees
// the structs below, delivered in arrival order through the event queue.

use crate::math::Vec3;

bitflags::bitflags! {
    /// Per-update entity effect bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EffectFlags: u32 {
        const MUZZLEFLASH = 1 << 0;
        const BRIGHTLIGHT = 1 << 1;
        const DIMLIGHT    = 1 << 2;
    }
}

bitflags::bitflags! {
    /// Capability bits carried on a model; these drive the automatic
    /// trail and glow table during relink.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ModelFlags: u32 {
        const ROCKET  = 1 << 0; // fire trail and glow
        const GRENADE = 1 << 1; // smoke trail
        const GIB     = 1 << 2; // blood trail
        const ROTATE  = 1 << 3; // bonus items spin in place
        const TRACER  = 1 << 4;
        const ZOMGIB  = 1 << 5; // smaller blood trail
        const TRACER2 = 1 << 6;
        const TRACER3 = 1 << 7;
    }
}

bitflags::bitflags! {
    /// Inventory bits from the player state; only the glow-affecting
    /// subset is interesting to this core.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ItemFlags: u32 {
        const QUAD            = 1 << 0;
        const INVULNERABILITY = 1 << 1;
    }
}

/// One entry in the externally owned model registry. The asset layer
/// fills these in at level load; this core only reads them.
#[derive(Debug, Clone, Default)]
pub struct ModelInfo {
    pub name: String,
    pub flags: ModelFlags,
    pub num_frames: u32,
    pub num_skins: u32,
}

/// Header that opens a new authoritative snapshot. Entity updates that
/// follow belong to this snapshot until the next header arrives.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotHeader {
    pub time: f64,
    pub view_entity: usize,
    pub velocity: Vec3,
    pub view_angles: Vec3,
    pub items: ItemFlags,
}

/// One entity slot's state inside the current snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntityUpdate {
    pub number: usize,
    pub origin: Vec3,
    pub angles: Vec3,
    /// Index into the model registry; 0 means no model.
    pub model_index: usize,
    pub frame: i32,
    pub skin: i32,
    pub effects: EffectFlags,
}

/// Spawn-command tags for the canned particle effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticleKind {
    Explosion,
    BlobExplosion,
    Impact,
    LavaSplash,
    TeleportSplash,
}

/// A decoded server message, in arrival order.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    Snapshot(SnapshotHeader),
    Entity(EntityUpdate),
    SetLightStyle {
        index: usize,
        pattern: String,
    },
    /// Explicit transient light (explosions and similar one-shots that
    /// are not tied to an entity's effect bits).
    TempLight {
        key: i32,
        origin: Vec3,
        radius: f32,
        duration: f64,
        decay: f32,
        minlight: f32,
        color: Vec3,
    },
    Particles {
        kind: ParticleKind,
        origin: Vec3,
        dir: Vec3,
        color: i32,
        count: i32,
    },
    Disconnect {
        reason: String,
    },
}

/// Connection-level failures this core reacts to with a full state reset.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("server disconnected: {0}")]
    Disconnected(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}
