// r_surf.rs -- lightmap block allocation and the per-frame rebuild pass

use vigil_common::refresh::{
    LightStyleValue, LightmapUpload, LmRect, RefDLight, MAX_SURFACE_STYLES,
};
use vigil_common::warn::warn_once;

use crate::r_light;
use crate::r_model::{WorldModel, STYLE_UNUSED};
use crate::refresh::RenderConfig;

pub const BLOCK_WIDTH: usize = 128;
pub const BLOCK_HEIGHT: usize = 128;
pub const MAX_LIGHTMAP_BLOCKS: usize = 64;

/// Largest surface lightmap the scratch buffer accommodates.
const MAX_SURFACE_TEXELS: usize = 34 * 34;

// ============================================================
// LIGHTMAP ALLOCATION
// ============================================================

struct LightmapBlock {
    /// Shelf heights per column.
    allocated: [u32; BLOCK_WIDTH],
    /// RGBA texels, row-major.
    texels: Vec<[u8; 4]>,
    dirty: LmRect,
}

impl LightmapBlock {
    fn new() -> Self {
        Self {
            allocated: [0; BLOCK_WIDTH],
            texels: vec![[0; 4]; BLOCK_WIDTH * BLOCK_HEIGHT],
            dirty: LmRect::default(),
        }
    }
}

pub struct LightmapState {
    blocks: Vec<LightmapBlock>,
    /// Accumulation scratch, RGB floats per texel.
    blocklights: Vec<f32>,
    /// Lightmap rebuilds since creation; cheap visibility into how much
    /// re-upload traffic a scene generates.
    pub rebuild_count: u64,
}

impl Default for LightmapState {
    fn default() -> Self {
        Self::new()
    }
}

impl LightmapState {
    pub fn new() -> Self {
        Self {
            blocks: vec![LightmapBlock::new()],
            blocklights: vec![0.0; MAX_SURFACE_TEXELS * 3],
            rebuild_count: 0,
        }
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Greedy shelf fit inside one block.
    fn alloc_in_block(allocated: &mut [u32; BLOCK_WIDTH], w: usize, h: usize) -> Option<(u32, u32)> {
        let mut best = BLOCK_HEIGHT as u32;
        let mut x = 0usize;

        for i in 0..(BLOCK_WIDTH - w) {
            let mut best2 = 0u32;
            let mut j = 0;
            while j < w {
                if allocated[i + j] >= best {
                    break;
                }
                if allocated[i + j] > best2 {
                    best2 = allocated[i + j];
                }
                j += 1;
            }
            if j == w {
                // this is a valid spot
                x = i;
                best = best2;
            }
        }

        if best + h as u32 > BLOCK_HEIGHT as u32 {
            return None;
        }

        for k in 0..w {
            allocated[x + k] = best + h as u32;
        }
        Some((x as u32, best))
    }

    /// Reserve a `w`x`h` texel region, opening a new block when the
    /// current one is full. Append-only: earlier blocks are never
    /// repacked. None once every block is exhausted.
    pub fn alloc_block(&mut self, w: usize, h: usize) -> Option<(usize, u32, u32)> {
        if w == 0 || h == 0 || w >= BLOCK_WIDTH || h > BLOCK_HEIGHT {
            return None;
        }

        let last = self.blocks.len() - 1;
        if let Some((x, y)) = Self::alloc_in_block(&mut self.blocks[last].allocated, w, h) {
            return Some((last, x, y));
        }

        if self.blocks.len() == MAX_LIGHTMAP_BLOCKS {
            warn_once(
                "lightmap-blocks-exhausted",
                "out of lightmap blocks; further surfaces stay unlit",
            );
            return None;
        }

        self.blocks.push(LightmapBlock::new());
        let last = self.blocks.len() - 1;
        Self::alloc_in_block(&mut self.blocks[last].allocated, w, h).map(|(x, y)| (last, x, y))
    }

    // ============================================================
    // Surface lightmaps
    // ============================================================

    /// Place a surface's lightmap at level load and build its initial
    /// texels. A surface that doesn't fit is skipped, not fatal.
    pub fn create_surface_lightmap(
        &mut self,
        world: &mut WorldModel,
        surf_idx: usize,
        styles: &[LightStyleValue],
        cfg: &RenderConfig,
    ) {
        if !world.surfaces[surf_idx].is_lit() {
            return;
        }

        let smax = world.surfaces[surf_idx].smax();
        let tmax = world.surfaces[surf_idx].tmax();

        let Some((block, x, y)) = self.alloc_block(smax, tmax) else {
            return;
        };
        {
            let surf = &mut world.surfaces[surf_idx];
            surf.lightmap_block = block as i32;
            surf.light_s = x;
            surf.light_t = y;
        }

        self.build_surface(world, surf_idx, styles, &[], 1, cfg);
    }

    /// Rebuild one surface's texels into its block and grow that
    /// block's dirty rectangle.
    pub fn build_surface(
        &mut self,
        world: &mut WorldModel,
        surf_idx: usize,
        styles: &[LightStyleValue],
        dlights: &[RefDLight],
        framecount: u32,
        cfg: &RenderConfig,
    ) {
        let (block_idx, s, t, smax, tmax) = {
            let surf = &world.surfaces[surf_idx];
            debug_assert!(surf.lightmap_block >= 0);
            (
                surf.lightmap_block as usize,
                surf.light_s,
                surf.light_t,
                surf.smax(),
                surf.tmax(),
            )
        };

        let Self {
            blocks,
            blocklights,
            rebuild_count,
        } = self;
        let block = &mut blocks[block_idx];

        r_light::build_light_map(
            world,
            surf_idx,
            styles,
            dlights,
            framecount,
            cfg,
            blocklights,
            &mut block.texels,
            t as usize * BLOCK_WIDTH + s as usize,
            BLOCK_WIDTH,
        );
        block.dirty.union(s, t, smax as u32, tmax as u32);
        *rebuild_count += 1;

        r_light::set_cache_state(&mut world.surfaces[surf_idx], styles, framecount);
    }

    /// Per-frame pass: rebuild exactly the surfaces whose appearance can
    /// have changed — a style value differing from the cached one, a
    /// dynamic light touching it this frame, or a dynamic light baked
    /// into the previous build.
    pub fn update_lightmaps(
        &mut self,
        world: &mut WorldModel,
        styles: &[LightStyleValue],
        dlights: &[RefDLight],
        framecount: u32,
        cfg: &RenderConfig,
    ) {
        for surf_idx in 0..world.surfaces.len() {
            let surf = &world.surfaces[surf_idx];
            if surf.lightmap_block < 0 {
                continue;
            }

            let mut stale = false;
            for maps in 0..MAX_SURFACE_STYLES {
                let style = surf.styles[maps];
                if style == STYLE_UNUSED {
                    break;
                }
                let white = styles.get(style as usize).map(|v| v.white).unwrap_or(3.0);
                if white != surf.cached_light[maps] {
                    stale = true;
                    break;
                }
            }

            if stale || surf.dlight_frame == framecount || surf.cached_dlight {
                self.build_surface(world, surf_idx, styles, dlights, framecount, cfg);
            }
        }
    }

    /// Hand every non-empty dirty rectangle to the upload sink, then
    /// reset them. One call per block per frame at most.
    pub fn commit_dirty(&mut self, upload: &mut dyn LightmapUpload) {
        for (i, block) in self.blocks.iter_mut().enumerate() {
            if block.dirty.is_empty() {
                continue;
            }
            upload.upload(i, block.dirty, bytemuck::cast_slice(&block.texels));
            block.dirty = LmRect::default();
        }
    }

    /// Texels of one block, for tests and debug dumps.
    pub fn block_texels(&self, block: usize) -> &[[u8; 4]] {
        &self.blocks[block].texels
    }
}
