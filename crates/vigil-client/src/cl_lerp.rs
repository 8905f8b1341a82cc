// cl_lerp.rs -- snapshot interpolation and the per-frame entity relink

use vigil_common::math::{anglemod, angle_vectors, lerp_angle, vector_ma, Vec3, YAW};
use vigil_common::proto::{EffectFlags, ItemFlags, ModelFlags};
use vigil_common::refresh::{RefDef, RefEntity, MAX_VISEDICTS};
use vigil_common::warn::warn_once;

use crate::cl_fx::FxState;
use crate::cl_part::{ParticleState, TrailKind};
use crate::client::{ClientConfig, ClientState, LerpFlags};

/// Any per-axis snapshot delta beyond this is a teleport, not motion.
pub const TELEPORT_DELTA: f32 = 100.0;

/// Largest snapshot gap interpolated across; anything wider (packet
/// loss, demo start) is clamped before computing the fraction.
pub const SNAPSHOT_MAX_GAP: f64 = 0.1;

/// Shortest spacing between trail spawns for one entity.
const MIN_TRAIL_INTERVAL: f64 = 0.01;

const COLOR_WHITE: Vec3 = [1.0, 1.0, 1.0];
const COLOR_MUZZLE: Vec3 = [1.0, 0.9, 0.5];
const COLOR_ROCKET: Vec3 = [1.0, 0.6, 0.2];

// ============================================================
// Blend fraction
// ============================================================

/// Fraction of the way the presentation clock sits between the two
/// snapshot times. May pull `cl.time` back in line when it has drifted
/// past a boundary.
pub fn lerp_point(cl: &mut ClientState, cfg: &ClientConfig) -> f32 {
    let mut gap = cl.mtime[0] - cl.mtime[1];

    if gap == 0.0 || cfg.nolerp || cfg.timedemo || cfg.local_server {
        cl.time = cl.mtime[0];
        return 1.0;
    }

    if gap > SNAPSHOT_MAX_GAP {
        // dropped packets or a demo start
        cl.mtime[1] = cl.mtime[0] - SNAPSHOT_MAX_GAP;
        gap = SNAPSHOT_MAX_GAP;
    }

    let frac = (cl.time - cl.mtime[1]) / gap;
    if frac < 0.0 {
        if frac < -0.01 {
            cl.time = cl.mtime[1];
        }
        0.0
    } else if frac > 1.0 {
        if frac > 1.01 {
            cl.time = cl.mtime[0];
        }
        1.0
    } else {
        frac as f32
    }
}

// ============================================================
// Effect decision tables
// ============================================================

/// Glow tint for the locally controlled entity, by inventory.
pub fn powerup_glow_color(items: ItemFlags) -> Vec3 {
    let quad = items.contains(ItemFlags::QUAD);
    let pent = items.contains(ItemFlags::INVULNERABILITY);
    match (quad, pent) {
        (true, true) => [1.0, 0.3, 1.0],
        (true, false) => [0.3, 0.3, 1.0],
        (false, true) => [1.0, 0.3, 0.3],
        (false, false) => COLOR_WHITE,
    }
}

/// Which trail a model's capability bits ask for.
pub fn trail_for_model(flags: ModelFlags) -> Option<TrailKind> {
    if flags.contains(ModelFlags::GIB) {
        Some(TrailKind::Blood)
    } else if flags.contains(ModelFlags::ZOMGIB) {
        Some(TrailKind::SlightBlood)
    } else if flags.contains(ModelFlags::TRACER) {
        Some(TrailKind::Tracer)
    } else if flags.contains(ModelFlags::TRACER2) {
        Some(TrailKind::Tracer2)
    } else if flags.contains(ModelFlags::ROCKET) {
        Some(TrailKind::Rocket)
    } else if flags.contains(ModelFlags::GRENADE) {
        Some(TrailKind::Smoke)
    } else if flags.contains(ModelFlags::TRACER3) {
        Some(TrailKind::Voor)
    } else {
        None
    }
}

// ============================================================
// Relink
// ============================================================

/// Rebuild the interpolated transform of every populated entity slot,
/// spawn their automatic effects, and append the visible ones to the
/// scene.
pub fn relink_entities(
    frac: f32,
    cl: &mut ClientState,
    cfg: &ClientConfig,
    fx: &mut FxState,
    parts: &mut ParticleState,
    rd: &mut RefDef,
) {
    let now = cl.time;

    // blend the player velocity between the two snapshots
    for j in 0..3 {
        cl.velocity[j] =
            cl.mvelocity[1][j] + frac * (cl.mvelocity[0][j] - cl.mvelocity[1][j]);
    }

    // view angles: blended when replaying a demo, raw otherwise
    if cfg.demo_playback {
        for j in 0..3 {
            cl.viewangles[j] = lerp_angle(cl.mviewangles[1][j], cl.mviewangles[0][j], frac);
        }
    } else {
        cl.viewangles = cl.mviewangles[0];
    }

    // bonus items rotate at a fixed rate
    let bobjrotate = anglemod(100.0 * now as f32);

    for i in 1..cl.num_entities {
        // empty or vacated slots don't get relinked
        if cl.entities[i].model.is_none() {
            continue;
        }
        if cl.entities[i].msg_time != cl.mtime[0] {
            // not in the newest snapshot
            let ent = &mut cl.entities[i];
            ent.model = None;
            ent.trail_time = 0.0;
            continue;
        }

        let model_idx = cl.entities[i].model.unwrap();
        let mflags = cl
            .models
            .get(model_idx)
            .map(|m| m.flags)
            .unwrap_or_default();

        {
            let ent = &mut cl.entities[i];
            if ent.forcelink {
                // new this frame: snap, don't blend
                ent.origin = ent.msg_origins[0];
                ent.angles = ent.msg_angles[0];
            } else {
                let mut f = frac;
                if ent.lerpflags.contains(LerpFlags::RESET_MOVE) {
                    f = 1.0;
                    ent.lerpflags.remove(LerpFlags::RESET_MOVE);
                }

                let mut delta = [0.0f32; 3];
                for j in 0..3 {
                    delta[j] = ent.msg_origins[0][j] - ent.msg_origins[1][j];
                    if delta[j] > TELEPORT_DELTA || delta[j] < -TELEPORT_DELTA {
                        // too far apart to be continuous motion
                        f = 1.0;
                        ent.lerpflags.insert(LerpFlags::RESET_MOVE);
                    }
                }

                for j in 0..3 {
                    ent.origin[j] = ent.msg_origins[1][j] + f * delta[j];
                    ent.angles[j] = lerp_angle(ent.msg_angles[1][j], ent.msg_angles[0][j], f);
                }
            }

            if mflags.contains(ModelFlags::ROTATE) {
                ent.angles[YAW] = bobjrotate;
            }
        }

        let effects = cl.entities[i].effects;
        let origin = cl.entities[i].origin;
        let angles = cl.entities[i].angles;

        if effects.contains(EffectFlags::MUZZLEFLASH) {
            let mut forward = [0.0f32; 3];
            angle_vectors(&angles, Some(&mut forward), None, None);
            let mut org = vector_ma(&origin, 18.0, &forward);
            org[2] += 16.0;
            fx.new_dlight(
                i as i32,
                org,
                200.0 + (rand::random::<u32>() & 31) as f32,
                0.1,
                0.0,
                32.0,
                COLOR_MUZZLE,
                now,
                cfg.allow_colored_light,
            );
        }
        if effects.contains(EffectFlags::BRIGHTLIGHT) {
            let mut org = origin;
            org[2] += 16.0;
            fx.new_dlight(
                i as i32,
                org,
                400.0 + (rand::random::<u32>() & 31) as f32,
                0.001,
                0.0,
                0.0,
                COLOR_WHITE,
                now,
                cfg.allow_colored_light,
            );
        }
        if effects.contains(EffectFlags::DIMLIGHT) {
            let color = if i == cl.viewentity {
                powerup_glow_color(cl.items)
            } else {
                COLOR_WHITE
            };
            fx.new_dlight(
                i as i32,
                origin,
                200.0 + (rand::random::<u32>() & 31) as f32,
                0.001,
                0.0,
                0.0,
                color,
                now,
                cfg.allow_colored_light,
            );
        }

        if mflags.contains(ModelFlags::ROCKET) {
            fx.new_dlight(
                i as i32,
                origin,
                200.0,
                0.01,
                0.0,
                0.0,
                COLOR_ROCKET,
                now,
                cfg.allow_colored_light,
            );
        }

        if let Some(kind) = trail_for_model(mflags) {
            let ent = &mut cl.entities[i];
            if now >= ent.trail_time {
                let from = if ent.trail_time == 0.0 {
                    origin
                } else {
                    ent.trail_origin
                };
                ent.trail_time = now + MIN_TRAIL_INTERVAL;
                ent.trail_origin = origin;
                parts.rocket_trail(&from, &origin, kind, now);
            }
        }

        cl.entities[i].forcelink = false;

        // the view entity isn't drawn from its own eyes
        if i == cl.viewentity && !cfg.third_person {
            continue;
        }

        if rd.entities.len() >= MAX_VISEDICTS {
            warn_once("visedicts-overflow", "too many visible entities in frame");
            continue;
        }
        let ent = &cl.entities[i];
        rd.entities.push(RefEntity {
            model: model_idx,
            frame: ent.frame,
            old_frame: ent.old_frame,
            backlerp: 1.0 - frac,
            origin: ent.origin,
            angles: ent.angles,
            skin: ent.skin,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_common::proto::ModelInfo;

    fn test_state(gap_start: f64, gap_end: f64) -> ClientState {
        let mut cl = ClientState::new();
        cl.mtime = [gap_end, gap_start];
        cl
    }

    fn populated_entity(cl: &mut ClientState, slot: usize, from: Vec3, to: Vec3) {
        cl.num_entities = cl.num_entities.max(slot + 1);
        let ent = &mut cl.entities[slot];
        ent.model = Some(1);
        ent.msg_time = cl.mtime[0];
        ent.msg_origins = [to, from];
        ent.msg_angles = [[0.0; 3]; 2];
    }

    fn plain_models() -> Vec<ModelInfo> {
        vec![
            ModelInfo::default(),
            ModelInfo {
                name: "progs/test.mdl".into(),
                ..Default::default()
            },
        ]
    }

    // ============================================================
    // lerp_point
    // ============================================================

    #[test]
    fn test_lerp_point_midpoint() {
        let mut cl = test_state(1.0, 1.1);
        cl.time = 1.05;
        let f = lerp_point(&mut cl, &ClientConfig::default());
        assert!((f - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_lerp_point_idempotent() {
        let mut cl = test_state(1.0, 1.1);
        cl.time = 1.07;
        let cfg = ClientConfig::default();
        let a = lerp_point(&mut cl, &cfg);
        let b = lerp_point(&mut cl, &cfg);
        assert_eq!(a, b);
    }

    #[test]
    fn test_lerp_point_equal_times_snaps() {
        let mut cl = test_state(2.0, 2.0);
        cl.time = 1.9;
        let f = lerp_point(&mut cl, &ClientConfig::default());
        assert_eq!(f, 1.0);
        assert_eq!(cl.time, 2.0);
    }

    #[test]
    fn test_lerp_point_timedemo_snaps() {
        let mut cl = test_state(1.0, 1.1);
        cl.time = 1.05;
        let cfg = ClientConfig {
            timedemo: true,
            ..Default::default()
        };
        assert_eq!(lerp_point(&mut cl, &cfg), 1.0);
        assert_eq!(cl.time, 1.1);
    }

    #[test]
    fn test_lerp_point_nolerp_forces_one() {
        let mut cl = test_state(1.0, 1.1);
        cl.time = 1.02;
        let cfg = ClientConfig {
            nolerp: true,
            ..Default::default()
        };
        assert_eq!(lerp_point(&mut cl, &cfg), 1.0);
    }

    #[test]
    fn test_lerp_point_wide_gap_clamped() {
        // 0.5s between snapshots: the older timestamp is pulled to 0.1s
        // behind the newest before the fraction is computed.
        let mut cl = test_state(1.0, 1.5);
        cl.time = 1.45;
        let f = lerp_point(&mut cl, &ClientConfig::default());
        assert_eq!(cl.mtime[1], 1.4);
        assert!((f - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_lerp_point_overshoot_snaps_clock() {
        let mut cl = test_state(1.0, 1.1);
        cl.time = 1.2; // 100% past the newest snapshot
        let f = lerp_point(&mut cl, &ClientConfig::default());
        assert_eq!(f, 1.0);
        assert_eq!(cl.time, 1.1);
    }

    #[test]
    fn test_lerp_point_slight_overshoot_keeps_clock() {
        let mut cl = test_state(1.0, 1.1);
        cl.time = 1.1005; // within the 1% tolerance
        let f = lerp_point(&mut cl, &ClientConfig::default());
        assert_eq!(f, 1.0);
        assert_eq!(cl.time, 1.1005);
    }

    #[test]
    fn test_lerp_point_underrun_clamps_to_zero() {
        let mut cl = test_state(1.0, 1.1);
        cl.time = 0.5;
        let f = lerp_point(&mut cl, &ClientConfig::default());
        assert_eq!(f, 0.0);
        assert_eq!(cl.time, 1.0);
    }

    // ============================================================
    // relink_entities
    // ============================================================

    fn run_relink(cl: &mut ClientState, frac: f32) -> RefDef {
        let cfg = ClientConfig::default();
        let mut fx = FxState::new();
        let mut parts = ParticleState::new();
        let mut rd = RefDef::default();
        relink_entities(frac, cl, &cfg, &mut fx, &mut parts, &mut rd);
        rd
    }

    #[test]
    fn test_relink_interpolates_halfway() {
        let mut cl = test_state(1.0, 1.1);
        cl.models = plain_models();
        cl.time = 1.05;
        populated_entity(&mut cl, 1, [0.0, 0.0, 0.0], [10.0, 20.0, 0.0]);

        let rd = run_relink(&mut cl, 0.5);
        assert_eq!(rd.entities.len(), 1);
        assert_eq!(cl.entities[1].origin, [5.0, 10.0, 0.0]);
    }

    #[test]
    fn test_relink_teleport_snaps_axis_set() {
        let mut cl = test_state(1.0, 1.1);
        cl.models = plain_models();
        cl.time = 1.05;
        // 150 units on x: farther than any legal move between snapshots.
        populated_entity(&mut cl, 1, [0.0, 0.0, 0.0], [150.0, 8.0, 0.0]);

        run_relink(&mut cl, 0.5);
        // The whole transform snaps, not just the offending axis.
        assert_eq!(cl.entities[1].origin, [150.0, 8.0, 0.0]);
        assert!(cl.entities[1].lerpflags.contains(LerpFlags::RESET_MOVE));
    }

    #[test]
    fn test_relink_vacated_entity_skipped_and_cursor_reset() {
        let mut cl = test_state(1.0, 1.1);
        cl.models = plain_models();
        cl.time = 1.05;
        populated_entity(&mut cl, 1, [0.0; 3], [1.0, 0.0, 0.0]);
        cl.entities[1].trail_time = 55.0;
        // Entity 1 was last updated by the previous snapshot.
        cl.entities[1].msg_time = cl.mtime[1];

        let rd = run_relink(&mut cl, 0.5);
        assert!(rd.entities.is_empty());
        assert!(cl.entities[1].model.is_none());
        assert_eq!(cl.entities[1].trail_time, 0.0);
    }

    #[test]
    fn test_relink_forcelink_snaps_without_blending() {
        let mut cl = test_state(1.0, 1.1);
        cl.models = plain_models();
        cl.time = 1.05;
        populated_entity(&mut cl, 1, [0.0; 3], [40.0, 0.0, 0.0]);
        cl.entities[1].forcelink = true;

        run_relink(&mut cl, 0.5);
        assert_eq!(cl.entities[1].origin, [40.0, 0.0, 0.0]);
        assert!(!cl.entities[1].forcelink, "consumed after one relink");
    }

    #[test]
    fn test_relink_angle_shortest_arc() {
        let mut cl = test_state(1.0, 1.1);
        cl.models = plain_models();
        cl.time = 1.05;
        populated_entity(&mut cl, 1, [0.0; 3], [0.0; 3]);
        cl.entities[1].msg_angles = [[0.0, 10.0, 0.0], [0.0, 350.0, 0.0]];

        run_relink(&mut cl, 0.5);
        let yaw = cl.entities[1].angles[YAW];
        // Halfway from 350 to 10 through the wrap is 360, not 180.
        assert!((yaw - 360.0).abs() < 0.001, "got {}", yaw);
    }

    #[test]
    fn test_relink_view_entity_excluded_first_person() {
        let mut cl = test_state(1.0, 1.1);
        cl.models = plain_models();
        cl.time = 1.05;
        populated_entity(&mut cl, 1, [0.0; 3], [1.0, 0.0, 0.0]);
        populated_entity(&mut cl, 2, [0.0; 3], [1.0, 0.0, 0.0]);
        cl.viewentity = 1;

        let rd = run_relink(&mut cl, 0.5);
        assert_eq!(rd.entities.len(), 1);
        assert_eq!(rd.entities[0].model, 1);
    }

    #[test]
    fn test_relink_visible_list_capped() {
        let mut cl = test_state(1.0, 1.1);
        cl.models = plain_models();
        cl.time = 1.05;
        for slot in 1..=300 {
            populated_entity(&mut cl, slot, [0.0; 3], [1.0, 0.0, 0.0]);
        }

        let rd = run_relink(&mut cl, 0.5);
        assert_eq!(rd.entities.len(), MAX_VISEDICTS);
    }

    #[test]
    fn test_relink_rotate_flag_spins_entity() {
        let mut cl = test_state(1.0, 1.1);
        cl.models = plain_models();
        cl.models[1].flags = ModelFlags::ROTATE;
        cl.time = 1.05;
        populated_entity(&mut cl, 1, [0.0; 3], [0.0; 3]);

        run_relink(&mut cl, 0.5);
        let expect = anglemod(100.0 * 1.05);
        assert_eq!(cl.entities[1].angles[YAW], expect);
    }

    #[test]
    fn test_relink_rocket_model_spawns_glow_and_trail() {
        let mut cl = test_state(1.0, 1.1);
        cl.models = plain_models();
        cl.models[1].flags = ModelFlags::ROCKET;
        cl.time = 1.05;
        populated_entity(&mut cl, 1, [0.0; 3], [30.0, 0.0, 0.0]);
        // Move the cursor behind the clock so the trail may fire, with a
        // previous endpoint to trail from.
        cl.entities[1].trail_time = 0.5;
        cl.entities[1].trail_origin = [0.0; 3];

        let cfg = ClientConfig::default();
        let mut fx = FxState::new();
        let mut parts = ParticleState::new();
        let mut rd = RefDef::default();
        relink_entities(0.5, &mut cl, &cfg, &mut fx, &mut parts, &mut rd);

        assert!(parts.live_count() > 0, "rocket trail spawned");
        fx.add_dlights(&mut rd);
        assert_eq!(rd.dlights.len(), 1);
        assert_eq!(rd.dlights[0].color, COLOR_ROCKET);
        // Cursor advanced: an immediate second relink spawns nothing new.
        let before = parts.live_count();
        relink_entities(0.5, &mut cl, &cfg, &mut fx, &mut parts, &mut rd);
        assert_eq!(parts.live_count(), before);
    }

    #[test]
    fn test_relink_dimlight_uses_inventory_for_view_entity() {
        let mut cl = test_state(1.0, 1.1);
        cl.models = plain_models();
        cl.time = 1.05;
        populated_entity(&mut cl, 1, [0.0; 3], [0.0; 3]);
        cl.entities[1].effects = EffectFlags::DIMLIGHT;
        cl.viewentity = 1;
        cl.items = ItemFlags::QUAD;

        let cfg = ClientConfig::default();
        let mut fx = FxState::new();
        let mut parts = ParticleState::new();
        let mut rd = RefDef::default();
        relink_entities(0.5, &mut cl, &cfg, &mut fx, &mut parts, &mut rd);

        fx.add_dlights(&mut rd);
        assert_eq!(rd.dlights.len(), 1);
        assert_eq!(rd.dlights[0].color, [0.3, 0.3, 1.0]);
    }

    #[test]
    fn test_powerup_glow_table() {
        assert_eq!(powerup_glow_color(ItemFlags::empty()), COLOR_WHITE);
        assert_eq!(powerup_glow_color(ItemFlags::QUAD), [0.3, 0.3, 1.0]);
        assert_eq!(
            powerup_glow_color(ItemFlags::INVULNERABILITY),
            [1.0, 0.3, 0.3]
        );
        assert_eq!(
            powerup_glow_color(ItemFlags::QUAD | ItemFlags::INVULNERABILITY),
            [1.0, 0.3, 1.0]
        );
    }

    #[test]
    fn test_trail_table_priority() {
        assert_eq!(trail_for_model(ModelFlags::ROCKET), Some(TrailKind::Rocket));
        assert_eq!(trail_for_model(ModelFlags::GRENADE), Some(TrailKind::Smoke));
        // Gib wins over rocket when both bits are set.
        assert_eq!(
            trail_for_model(ModelFlags::GIB | ModelFlags::ROCKET),
            Some(TrailKind::Blood)
        );
        assert_eq!(trail_for_model(ModelFlags::ROTATE), None);
    }
}
