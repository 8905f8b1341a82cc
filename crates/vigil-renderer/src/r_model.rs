// r_model.rs -- in-memory world structures handed over by the asset
// layer; read-only at runtime except for the per-surface lighting state

use vigil_common::math::Vec3;
use vigil_common::refresh::MAX_SURFACE_STYLES;

// leaf contents
pub const CONTENTS_EMPTY: i32 = -1;
pub const CONTENTS_SOLID: i32 = -2;
pub const CONTENTS_WATER: i32 = -3;
pub const CONTENTS_SLIME: i32 = -4;
pub const CONTENTS_LAVA: i32 = -5;
pub const CONTENTS_SKY: i32 = -6;

/// Style slot marker for "no more styles".
pub const STYLE_UNUSED: u8 = 255;

/// Lightmap sample granularity in world units (one texel per 16 units).
pub const SAMPLE_SHIFT: i32 = 4;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SurfaceFlags: u32 {
        /// Surface faces the negative side of its plane.
        const PLANEBACK = 1 << 1;
        const DRAWSKY   = 1 << 2;
        /// Warped liquid surface; tiled, never lightmapped.
        const DRAWTURB  = 1 << 4;
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Plane {
    pub normal: Vec3,
    pub dist: f32,
}

/// A BSP link: internal node or leaf, by index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Child {
    Node(u32),
    Leaf(u32),
}

#[derive(Debug, Clone, Copy)]
pub struct Node {
    pub plane: u32,
    /// [0] = front of the plane, [1] = back.
    pub children: [Child; 2],
    pub first_surface: u32,
    pub num_surfaces: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct Leaf {
    pub contents: i32,
}

/// Texture-space projection for a surface: two rows of
/// `[x, y, z, offset]`, one per texture axis.
#[derive(Debug, Clone, Copy, Default)]
pub struct TexInfo {
    pub vecs: [[f32; 4]; 2],
}

#[derive(Debug, Clone)]
pub struct Surface {
    pub plane: u32,
    pub flags: SurfaceFlags,
    pub texinfo: u32,

    /// Texture-space bounds of the lit region.
    pub texture_mins: [i16; 2],
    pub extents: [i16; 2],

    /// Active style list, terminated by STYLE_UNUSED.
    pub styles: [u8; MAX_SURFACE_STYLES],
    /// Byte offset of this surface's static samples in
    /// `WorldModel::lightdata` (RGB per texel, one run per style).
    pub samples: Option<u32>,

    // runtime lighting state
    /// Texel position inside the owning lightmap block.
    pub light_s: u32,
    pub light_t: u32,
    /// Owning lightmap block, -1 until allocated.
    pub lightmap_block: i32,
    /// Style intensities the current lightmap was built with.
    pub cached_light: [f32; MAX_SURFACE_STYLES],
    /// Last build included dynamic light; forces one more rebuild after
    /// the light moves off.
    pub cached_dlight: bool,
    /// Frame stamp for `dlight_bits`; a stale stamp means no bits.
    pub dlight_frame: u32,
    pub dlight_bits: u32,
}

impl Default for Surface {
    fn default() -> Self {
        Self {
            plane: 0,
            flags: SurfaceFlags::empty(),
            texinfo: 0,
            texture_mins: [0; 2],
            extents: [0; 2],
            styles: [STYLE_UNUSED; MAX_SURFACE_STYLES],
            samples: None,
            light_s: 0,
            light_t: 0,
            lightmap_block: -1,
            cached_light: [0.0; MAX_SURFACE_STYLES],
            cached_dlight: false,
            dlight_frame: 0,
            dlight_bits: 0,
        }
    }
}

impl Surface {
    /// Lightmap texels across.
    pub fn smax(&self) -> usize {
        ((self.extents[0] as i32 >> SAMPLE_SHIFT) + 1) as usize
    }

    /// Lightmap texels down.
    pub fn tmax(&self) -> usize {
        ((self.extents[1] as i32 >> SAMPLE_SHIFT) + 1) as usize
    }

    /// Tiled surfaces (sky, liquids) carry no lightmap.
    pub fn is_lit(&self) -> bool {
        !self
            .flags
            .intersects(SurfaceFlags::DRAWSKY | SurfaceFlags::DRAWTURB)
    }
}

/// The static world as produced by the map loader.
pub struct WorldModel {
    pub planes: Vec<Plane>,
    pub nodes: Vec<Node>,
    pub leafs: Vec<Leaf>,
    pub surfaces: Vec<Surface>,
    pub texinfos: Vec<TexInfo>,
    /// Static lightmap samples, RGB triplets.
    pub lightdata: Vec<u8>,
    pub root: Child,
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surface_texel_dimensions() {
        let surf = Surface {
            extents: [64, 32],
            ..Default::default()
        };
        assert_eq!(surf.smax(), 5);
        assert_eq!(surf.tmax(), 3);
    }

    #[test]
    fn test_default_surface_has_no_lightmap() {
        let surf = Surface::default();
        assert_eq!(surf.lightmap_block, -1);
        assert_eq!(surf.styles, [STYLE_UNUSED; MAX_SURFACE_STYLES]);
        assert!(surf.is_lit());
    }

    #[test]
    fn test_tiled_surfaces_not_lit() {
        let mut surf = Surface::default();
        surf.flags = SurfaceFlags::DRAWTURB;
        assert!(!surf.is_lit());
        surf.flags = SurfaceFlags::DRAWSKY;
        assert!(!surf.is_lit());
    }

    #[test]
    fn test_flat_floor_shape() {
        let world = test_world::flat_floor();
        assert_eq!(world.surfaces[0].smax(), 5);
        assert_eq!(world.lightdata.len(), 75);
        assert!(matches!(world.root, Child::Node(0)));
    }
}
