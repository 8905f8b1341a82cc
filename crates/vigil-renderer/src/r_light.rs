// r_light.rs -- dynamic light propagation and lightmap sampling

use vigil_common::math::{dot_product, vector_length, vector_ma, vector_subtract, Vec3};
use vigil_common::refresh::{LightStyleValue, RefDLight, MAX_DLIGHTS, MAX_SURFACE_STYLES};

use crate::r_model::{Child, Surface, WorldModel, SAMPLE_SHIFT, STYLE_UNUSED};
use crate::refresh::RenderConfig;

/// How far below a query point the light probe reaches.
const LIGHT_PROBE_DEPTH: f32 = 2048.0;

/// Dynamic contributions to a sampled point are scaled by this.
const DLIGHT_POINT_SCALE: f32 = 1.0 / 256.0;

// ============================================================
// DYNAMIC LIGHTS — BSP marking
// ============================================================

/// Recursively mark every surface the light can reach. Bits accumulate
/// across lights within one frame; a stale frame stamp counts as an
/// empty set, so nothing is ever cleared explicitly.
pub fn mark_lights(
    world: &mut WorldModel,
    light: &RefDLight,
    bit: u32,
    child: Child,
    dlight_frame: u32,
) {
    let node_idx = match child {
        Child::Leaf(_) => return,
        Child::Node(i) => i as usize,
    };
    let node = world.nodes[node_idx];
    let plane = world.planes[node.plane as usize];
    let dist = dot_product(&light.origin, &plane.normal) - plane.dist;

    if dist > light.radius {
        mark_lights(world, light, bit, node.children[0], dlight_frame);
        return;
    }
    if dist < -light.radius {
        mark_lights(world, light, bit, node.children[1], dlight_frame);
        return;
    }

    // the light straddles the split; check the surfaces on this node
    let first = node.first_surface as usize;
    for i in first..first + node.num_surfaces as usize {
        let tex = world.texinfos[world.surfaces[i].texinfo as usize];
        let surf = &mut world.surfaces[i];

        // nearest point on the lit rectangle, via clamped projection
        // onto the two texture axes
        let s = dot_product(
            &light.origin,
            &[tex.vecs[0][0], tex.vecs[0][1], tex.vecs[0][2]],
        ) + tex.vecs[0][3];
        let t = dot_product(
            &light.origin,
            &[tex.vecs[1][0], tex.vecs[1][1], tex.vecs[1][2]],
        ) + tex.vecs[1][3];

        let mins_s = surf.texture_mins[0] as f32;
        let mins_t = surf.texture_mins[1] as f32;
        let ds = s - s.clamp(mins_s, mins_s + surf.extents[0] as f32);
        let dt = t - t.clamp(mins_t, mins_t + surf.extents[1] as f32);

        let dist_sq = dist * dist + ds * ds + dt * dt;
        if dist_sq >= light.radius * light.radius {
            continue;
        }

        if surf.dlight_frame != dlight_frame {
            // first touch this frame
            surf.dlight_bits = bit;
            surf.dlight_frame = dlight_frame;
        } else {
            surf.dlight_bits |= bit;
        }
    }

    mark_lights(world, light, bit, node.children[0], dlight_frame);
    mark_lights(world, light, bit, node.children[1], dlight_frame);
}

/// Mark surfaces for every light in the frame.
pub fn push_dlights(world: &mut WorldModel, dlights: &[RefDLight], dlight_frame: u32) {
    let root = world.root;
    for (i, dl) in dlights.iter().take(MAX_DLIGHTS).enumerate() {
        mark_lights(world, dl, 1 << i, root, dlight_frame);
    }
}

// ============================================================
// LIGHT SAMPLING
// ============================================================

/// Result of sampling the world at a point: the stylized base color
/// plus where the probe landed, for decal-like effects.
#[derive(Debug, Clone, Copy)]
pub struct LightSample {
    pub color: Vec3,
    pub spot: Vec3,
    pub plane: Option<u32>,
}

struct SurfHit {
    color: Vec3,
    spot: Vec3,
    plane: u32,
}

fn recursive_light_point(
    world: &WorldModel,
    styles: &[LightStyleValue],
    child: Child,
    start: &Vec3,
    end: &Vec3,
    modulate: f32,
) -> Option<SurfHit> {
    let node_idx = match child {
        Child::Leaf(_) => return None,
        Child::Node(i) => i as usize,
    };
    let node = &world.nodes[node_idx];
    let plane = &world.planes[node.plane as usize];

    let front = dot_product(start, &plane.normal) - plane.dist;
    let back = dot_product(end, &plane.normal) - plane.dist;
    let side = (front < 0.0) as usize;

    if (back < 0.0) == (front < 0.0) {
        return recursive_light_point(world, styles, node.children[side], start, end, modulate);
    }

    let frac = front / (front - back);
    let mid = [
        start[0] + (end[0] - start[0]) * frac,
        start[1] + (end[1] - start[1]) * frac,
        start[2] + (end[2] - start[2]) * frac,
    ];

    // front side first
    if let Some(hit) = recursive_light_point(world, styles, node.children[side], start, &mid, modulate)
    {
        return Some(hit);
    }

    // check for impact on this node
    let first = node.first_surface as usize;
    for i in first..first + node.num_surfaces as usize {
        let surf = &world.surfaces[i];
        if !surf.is_lit() {
            continue; // no lightmaps
        }
        let tex = &world.texinfos[surf.texinfo as usize];

        let s = (dot_product(&mid, &[tex.vecs[0][0], tex.vecs[0][1], tex.vecs[0][2]])
            + tex.vecs[0][3]) as i32;
        let t = (dot_product(&mid, &[tex.vecs[1][0], tex.vecs[1][1], tex.vecs[1][2]])
            + tex.vecs[1][3]) as i32;

        if s < surf.texture_mins[0] as i32 || t < surf.texture_mins[1] as i32 {
            continue;
        }
        let ds = s - surf.texture_mins[0] as i32;
        let dt = t - surf.texture_mins[1] as i32;
        if ds > surf.extents[0] as i32 || dt > surf.extents[1] as i32 {
            continue;
        }

        let mut color = [0.0f32; 3];
        if let Some(samples) = surf.samples {
            let ds = (ds >> SAMPLE_SHIFT) as usize;
            let dt = (dt >> SAMPLE_SHIFT) as usize;
            let smax = surf.smax();
            let run = smax * surf.tmax() * 3;
            let mut offset = samples as usize + 3 * (dt * smax + ds);

            for maps in 0..MAX_SURFACE_STYLES {
                let style = surf.styles[maps];
                if style == STYLE_UNUSED {
                    break;
                }
                let rgb = styles
                    .get(style as usize)
                    .map(|v| v.rgb)
                    .unwrap_or([1.0; 3]);
                for c in 0..3 {
                    color[c] +=
                        world.lightdata[offset + c] as f32 * modulate * rgb[c] * (1.0 / 255.0);
                }
                offset += run;
            }
        }

        return Some(SurfHit {
            color,
            spot: mid,
            plane: node.plane,
        });
    }

    // nothing on this node; carry on down the back side
    recursive_light_point(world, styles, node.children[side ^ 1], &mid, end, modulate)
}

/// Sample the stylized lightmap directly below `p`, then add every
/// dynamic light in range.
pub fn light_point(
    world: &WorldModel,
    styles: &[LightStyleValue],
    dlights: &[RefDLight],
    p: &Vec3,
    cfg: &RenderConfig,
) -> LightSample {
    if world.lightdata.is_empty() {
        return LightSample {
            color: [1.0; 3],
            spot: *p,
            plane: None,
        };
    }

    let end = [p[0], p[1], p[2] - LIGHT_PROBE_DEPTH];
    let hit = recursive_light_point(world, styles, world.root, p, &end, cfg.modulate);

    let (mut color, spot, plane) = match hit {
        Some(h) => (h.color, h.spot, Some(h.plane)),
        None => ([0.0; 3], *p, None),
    };

    for dl in dlights.iter().take(MAX_DLIGHTS) {
        let dist = vector_length(&vector_subtract(p, &dl.origin));
        let add = (dl.radius - dist) * DLIGHT_POINT_SCALE;
        if add > 0.0 {
            color = vector_ma(&color, add, &dl.color);
        }
    }

    let scale = 1.0 / (1u32 << cfg.overbright_shift) as f32;
    for c in color.iter_mut() {
        *c = (*c * scale).min(1.0);
    }

    LightSample { color, spot, plane }
}

// ============================================================
// Blocklights accumulation
// ============================================================

/// Add every marked dynamic light's falloff into the blocklights
/// buffer for one surface.
pub(crate) fn add_dynamic_lights(
    world: &WorldModel,
    surf_idx: usize,
    dlights: &[RefDLight],
    blocklights: &mut [f32],
) {
    let surf = &world.surfaces[surf_idx];
    let smax = surf.smax();
    let tmax = surf.tmax();
    let tex = &world.texinfos[surf.texinfo as usize];
    let plane = &world.planes[surf.plane as usize];

    for (lnum, dl) in dlights.iter().take(MAX_DLIGHTS).enumerate() {
        if surf.dlight_bits & (1 << lnum) == 0 {
            continue; // not lit by this light
        }

        let fdist = dot_product(&dl.origin, &plane.normal) - plane.dist;
        let frad = dl.radius - fdist.abs();
        if frad < dl.minlight {
            continue;
        }
        let fminlight = frad - dl.minlight;

        let mut impact = [0.0f32; 3];
        for i in 0..3 {
            impact[i] = dl.origin[i] - plane.normal[i] * fdist;
        }

        let local_0 = dot_product(
            &impact,
            &[tex.vecs[0][0], tex.vecs[0][1], tex.vecs[0][2]],
        ) + tex.vecs[0][3]
            - surf.texture_mins[0] as f32;
        let local_1 = dot_product(
            &impact,
            &[tex.vecs[1][0], tex.vecs[1][1], tex.vecs[1][2]],
        ) + tex.vecs[1][3]
            - surf.texture_mins[1] as f32;

        let mut bl_idx = 0usize;
        let mut ftacc = 0.0f32;
        for _t in 0..tmax {
            let td = ((local_1 - ftacc) as i32).abs();
            let mut fsacc = 0.0f32;
            for _s in 0..smax {
                let sd = ((local_0 - fsacc) as i32).abs();
                let fdist_local = if sd > td {
                    sd as f32 + (td >> 1) as f32
                } else {
                    td as f32 + (sd >> 1) as f32
                };

                if fdist_local < fminlight {
                    blocklights[bl_idx] += (frad - fdist_local) * dl.color[0];
                    blocklights[bl_idx + 1] += (frad - fdist_local) * dl.color[1];
                    blocklights[bl_idx + 2] += (frad - fdist_local) * dl.color[2];
                }

                fsacc += 16.0;
                bl_idx += 3;
            }
            ftacc += 16.0;
        }
    }
}

/// Combine a surface's static samples, style intensities, and dynamic
/// contributions into RGBA texels at `dest[dest_offset..]` (row stride
/// `stride` texels). Alpha is always opaque.
pub(crate) fn build_light_map(
    world: &WorldModel,
    surf_idx: usize,
    styles: &[LightStyleValue],
    dlights: &[RefDLight],
    framecount: u32,
    cfg: &RenderConfig,
    blocklights: &mut [f32],
    dest: &mut [[u8; 4]],
    dest_offset: usize,
    stride: usize,
) {
    let surf = &world.surfaces[surf_idx];
    if !surf.is_lit() {
        log::error!("build_light_map called for non-lit surface {}", surf_idx);
        return;
    }

    let smax = surf.smax();
    let tmax = surf.tmax();
    let size = smax * tmax;
    if size * 3 > blocklights.len() {
        log::error!("surface {} lightmap too large ({} texels)", surf_idx, size);
        return;
    }

    match surf.samples {
        None => {
            // no light data: full bright
            for v in blocklights[..size * 3].iter_mut() {
                *v = 255.0;
            }
        }
        Some(samples) => {
            for v in blocklights[..size * 3].iter_mut() {
                *v = 0.0;
            }

            let run = size * 3;
            let mut offset = samples as usize;
            for maps in 0..MAX_SURFACE_STYLES {
                let style = surf.styles[maps];
                if style == STYLE_UNUSED {
                    break;
                }
                let rgb = styles
                    .get(style as usize)
                    .map(|v| v.rgb)
                    .unwrap_or([1.0; 3]);
                let scale = [
                    cfg.modulate * rgb[0],
                    cfg.modulate * rgb[1],
                    cfg.modulate * rgb[2],
                ];

                for i in 0..size {
                    blocklights[i * 3] += world.lightdata[offset + i * 3] as f32 * scale[0];
                    blocklights[i * 3 + 1] +=
                        world.lightdata[offset + i * 3 + 1] as f32 * scale[1];
                    blocklights[i * 3 + 2] +=
                        world.lightdata[offset + i * 3 + 2] as f32 * scale[2];
                }
                offset += run;
            }

            // add all the dynamic lights
            if surf.dlight_frame == framecount {
                add_dynamic_lights(world, surf_idx, dlights, blocklights);
            }
        }
    }

    // put into texture format
    let mut bl_idx = 0usize;
    for t in 0..tmax {
        let row = dest_offset + t * stride;
        for s in 0..smax {
            let r = (blocklights[bl_idx] as i32 >> cfg.overbright_shift).clamp(0, 255);
            let g = (blocklights[bl_idx + 1] as i32 >> cfg.overbright_shift).clamp(0, 255);
            let b = (blocklights[bl_idx + 2] as i32 >> cfg.overbright_shift).clamp(0, 255);
            dest[row + s] = [r as u8, g as u8, b as u8, 255];
            bl_idx += 3;
        }
    }
}

/// Remember which style intensities (and dynamic touch) this surface
/// was last built with.
pub(crate) fn set_cache_state(surf: &mut Surface, styles: &[LightStyleValue], framecount: u32) {
    for maps in 0..MAX_SURFACE_STYLES {
        let style = surf.styles[maps];
        if style == STYLE_UNUSED {
            break;
        }
        surf.cached_light[maps] = styles
            .get(style as usize)
            .map(|v| v.white)
            .unwrap_or(3.0);
    }
    surf.cached_dlight = surf.dlight_frame == framecount;
}
