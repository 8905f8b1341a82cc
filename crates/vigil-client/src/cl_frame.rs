// cl_frame.rs -- per-frame orchestration: receive, interpolate, relink,
// relight, simulate, hand off

use vigil_common::event_queue::EventReceiver;
use vigil_common::proto::{
    EntityUpdate, HostError, ModelInfo, ParticleKind, ServerEvent, SnapshotHeader,
};
use vigil_common::refresh::{RefDef, SceneSink};

use crate::cl_fx::FxState;
use crate::cl_lerp;
use crate::cl_part::ParticleState;
use crate::client::{ClientConfig, ClientState, LerpFlags, MAX_EDICTS};

/// Owns every piece of reconstructed frame state. Reset-on-reconnect is
/// one explicit call rather than a scatter of clears.
pub struct FrameDriver {
    pub cl: ClientState,
    pub fx: FxState,
    pub particles: ParticleState,
    pub config: ClientConfig,
    events: EventReceiver,
    scene: RefDef,
}

impl FrameDriver {
    pub fn new(config: ClientConfig, events: EventReceiver) -> Self {
        Self {
            cl: ClientState::new(),
            fx: FxState::new(),
            particles: ParticleState::new(),
            config,
            events,
            scene: RefDef::default(),
        }
    }

    /// Install the level's model registry (owned by the asset layer).
    pub fn set_models(&mut self, models: Vec<ModelInfo>) {
        self.cl.models = models;
    }

    /// The scene assembled by the most recent frame.
    pub fn scene(&self) -> &RefDef {
        &self.scene
    }

    /// Drop all reconstructed state; used on disconnect and before a new
    /// connection.
    pub fn reset(&mut self) {
        self.cl.clear();
        self.fx.clear();
        self.particles.clear();
        self.scene.clear();
    }

    /// Advance one frame: drain decoded events, rebuild the interpolated
    /// scene, and hand it to the draw layer. A fatal stream error resets
    /// all owned state before surfacing.
    pub fn run_frame(
        &mut self,
        host_frametime: f64,
        sink: &mut dyn SceneSink,
    ) -> Result<(), HostError> {
        self.cl.time += host_frametime;

        self.drain_events()?;

        self.fx
            .run_light_styles(self.cl.time, self.config.lightstyle_mode);

        let frac = cl_lerp::lerp_point(&mut self.cl, &self.config);

        self.scene.clear();
        cl_lerp::relink_entities(
            frac,
            &mut self.cl,
            &self.config,
            &mut self.fx,
            &mut self.particles,
            &mut self.scene,
        );

        self.fx.run_dlights(self.cl.time);
        self.fx.add_dlights(&mut self.scene);

        self.particles
            .run_particles(self.cl.time, self.config.gravity_scale, &mut self.scene);

        self.fx.fill_styles(&mut self.scene);

        self.scene.time = self.cl.time;
        self.scene.viewangles = self.cl.viewangles;
        if self.cl.viewentity < self.cl.num_entities {
            self.scene.vieworg = self.cl.entities[self.cl.viewentity].origin;
        }

        sink.render_frame(&self.scene);
        Ok(())
    }

    // ============================================================
    // Event application
    // ============================================================

    fn drain_events(&mut self) -> Result<(), HostError> {
        let events: Vec<ServerEvent> = self.events.drain().collect();
        for event in events {
            match event {
                ServerEvent::Snapshot(header) => self.apply_snapshot(header),
                ServerEvent::Entity(update) => {
                    if let Err(err) = self.apply_entity(update) {
                        log::error!("{}", err);
                        self.reset();
                        return Err(err);
                    }
                }
                ServerEvent::SetLightStyle { index, pattern } => {
                    self.fx.set_light_style(index, &pattern);
                }
                ServerEvent::TempLight {
                    key,
                    origin,
                    radius,
                    duration,
                    decay,
                    minlight,
                    color,
                } => {
                    self.fx.new_dlight(
                        key,
                        origin,
                        radius,
                        duration,
                        decay,
                        minlight,
                        color,
                        self.cl.time,
                        self.config.allow_colored_light,
                    );
                }
                ServerEvent::Particles {
                    kind,
                    origin,
                    dir,
                    color,
                    count,
                } => {
                    let now = self.cl.time;
                    match kind {
                        ParticleKind::Explosion => {
                            self.particles.particle_explosion(&origin, now)
                        }
                        ParticleKind::BlobExplosion => {
                            self.particles.blob_explosion(&origin, now)
                        }
                        ParticleKind::Impact => self
                            .particles
                            .run_particle_effect(&origin, &dir, color, count, now),
                        ParticleKind::LavaSplash => self.particles.lava_splash(&origin, now),
                        ParticleKind::TeleportSplash => {
                            self.particles.teleport_splash(&origin, now)
                        }
                    }
                }
                ServerEvent::Disconnect { reason } => {
                    log::error!("disconnected by server: {}", reason);
                    self.reset();
                    return Err(HostError::Disconnected(reason));
                }
            }
        }
        Ok(())
    }

    fn apply_snapshot(&mut self, header: SnapshotHeader) {
        let cl = &mut self.cl;
        cl.mtime[1] = cl.mtime[0];
        cl.mtime[0] = header.time;
        cl.mvelocity[1] = cl.mvelocity[0];
        cl.mvelocity[0] = header.velocity;
        cl.mviewangles[1] = cl.mviewangles[0];
        cl.mviewangles[0] = header.view_angles;
        cl.items = header.items;
        cl.viewentity = header.view_entity;
    }

    fn apply_entity(&mut self, update: EntityUpdate) -> Result<(), HostError> {
        if update.number == 0 || update.number >= MAX_EDICTS {
            return Err(HostError::Protocol(format!(
                "entity slot {} out of range",
                update.number
            )));
        }
        let cl = &mut self.cl;
        if update.number >= cl.num_entities {
            cl.num_entities = update.number + 1;
        }

        // registry-validated model handle
        let model = match update.model_index {
            0 => None,
            m if m < cl.models.len() => Some(m),
            m => {
                log::debug!("entity {}: bad model index {}", update.number, m);
                None
            }
        };

        // clamp pose and skin against what the model actually has
        let mut frame = update.frame;
        let mut skin = update.skin;
        if let Some(info) = model.and_then(|m| cl.models.get(m)) {
            if frame < 0 || frame as u32 >= info.num_frames.max(1) {
                log::debug!("entity {}: no such frame {} in {}", update.number, frame, info.name);
                frame = 0;
            }
            if skin < 0 || skin as u32 >= info.num_skins.max(1) {
                log::debug!("entity {}: no such skin {} in {}", update.number, skin, info.name);
                skin = 0;
            }
        }

        let ent = &mut cl.entities[update.number];

        if ent.msg_time != cl.mtime[1] {
            // wasn't updated by the previous snapshot
            ent.forcelink = true;
        }
        if model != ent.model {
            ent.forcelink = true;
            ent.lerpflags
                .insert(LerpFlags::RESET_MOVE | LerpFlags::RESET_ANIM);
        }
        ent.msg_time = cl.mtime[0];

        // keyframe pair for pose blending
        if ent.lerpflags.contains(LerpFlags::RESET_ANIM) {
            ent.old_frame = frame;
            ent.lerpflags.remove(LerpFlags::RESET_ANIM);
        } else if frame != ent.frame {
            ent.old_frame = ent.frame;
        }
        ent.frame = frame;

        // shift the snapshot pair down
        ent.msg_origins[1] = ent.msg_origins[0];
        ent.msg_origins[0] = update.origin;
        ent.msg_angles[1] = ent.msg_angles[0];
        ent.msg_angles[0] = update.angles;
        if ent.forcelink {
            ent.msg_origins[1] = update.origin;
            ent.msg_angles[1] = update.angles;
            ent.origin = update.origin;
            ent.angles = update.angles;
        }

        ent.model = model;
        ent.skin = skin;
        ent.effects = update.effects;
        Ok(())
    }
}
