// refresh.rs -- frame entry point for the lighting side: dlights are
// pushed into the BSP, stale lightmaps rebuilt, dirty regions handed to
// the upload sink

use vigil_common::math::Vec3;
use vigil_common::refresh::{LightStyleValue, LightmapUpload, RefDLight, RefDef, SceneSink};

use crate::r_light::{self, LightSample};
use crate::r_model::WorldModel;
use crate::r_surf::LightmapState;

#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Overall lightmap brightness multiplier.
    pub modulate: f32,
    /// Right shift applied when storing texels; trades headroom for
    /// brightness.
    pub overbright_shift: u32,
    /// Master switch for dynamic light marking.
    pub dynamic_lights: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            modulate: 1.0,
            overbright_shift: 0,
            dynamic_lights: true,
        }
    }
}

pub struct Refresh {
    pub world: WorldModel,
    pub lm: LightmapState,
    pub config: RenderConfig,
    framecount: u32,
    uploader: Box<dyn LightmapUpload>,
}

impl Refresh {
    /// Take ownership of a loaded world and pack every lit surface into
    /// the lightmap blocks.
    pub fn new(world: WorldModel, config: RenderConfig, uploader: Box<dyn LightmapUpload>) -> Self {
        let mut refresh = Self {
            world,
            lm: LightmapState::new(),
            config,
            framecount: 1,
            uploader,
        };

        let styles = vec![LightStyleValue::default(); vigil_common::refresh::MAX_LIGHTSTYLES];
        let Refresh {
            world, lm, config, ..
        } = &mut refresh;
        for surf_idx in 0..world.surfaces.len() {
            lm.create_surface_lightmap(world, surf_idx, &styles, config);
        }

        refresh
    }

    pub fn framecount(&self) -> u32 {
        self.framecount
    }

    /// Sample the world light at a point, styles and dynamic lights
    /// included; used for model shading and decal placement.
    pub fn light_point(
        &self,
        styles: &[LightStyleValue],
        dlights: &[RefDLight],
        p: &Vec3,
    ) -> LightSample {
        r_light::light_point(&self.world, styles, dlights, p, &self.config)
    }
}

impl SceneSink for Refresh {
    /// Light propagation runs first so the rebuild pass sees this
    /// frame's surface masks; then only the dirty rectangles go out.
    fn render_frame(&mut self, rd: &RefDef) {
        self.framecount += 1;

        if self.config.dynamic_lights {
            r_light::push_dlights(&mut self.world, &rd.dlights, self.framecount);
        }

        let Refresh {
            world,
            lm,
            config,
            framecount,
            uploader,
        } = self;
        lm.update_lightmaps(world, &rd.lightstyles, &rd.dlights, *framecount, config);
        lm.commit_dirty(&mut **uploader);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::r_model::test_world::flat_floor;
    use std::cell::RefCell;
    use std::rc::Rc;
    use vigil_common::refresh::LmRect;

    #[derive(Default)]
    struct SharedUpload {
        calls: Rc<RefCell<Vec<(usize, LmRect)>>>,
    }

    impl LightmapUpload for SharedUpload {
        fn upload(&mut self, block: usize, rect: LmRect, _texels: &[u8]) {
            self.calls.borrow_mut().push((block, rect));
        }
    }

    fn scene_with(dlights: Vec<RefDLight>) -> RefDef {
        RefDef {
            dlights,
            lightstyles: vec![LightStyleValue::default(); 64],
            ..Default::default()
        }
    }

    fn floor_refresh() -> (Refresh, Rc<RefCell<Vec<(usize, LmRect)>>>) {
        let _ = env_logger::builder().is_test(true).try_init();
        let calls = Rc::new(RefCell::new(Vec::new()));
        let uploader = SharedUpload {
            calls: Rc::clone(&calls),
        };
        let refresh = Refresh::new(flat_floor(), RenderConfig::default(), Box::new(uploader));
        (refresh, calls)
    }

    #[test]
    fn test_new_builds_initial_lightmaps() {
        let (refresh, _) = floor_refresh();
        assert_eq!(refresh.world.surfaces[0].lightmap_block, 0);
        assert_eq!(refresh.lm.rebuild_count, 1);
    }

    #[test]
    fn test_static_frame_uploads_once_then_goes_quiet() {
        let (mut refresh, calls) = floor_refresh();
        let rd = scene_with(Vec::new());

        // First frame flushes the load-time build.
        refresh.render_frame(&rd);
        assert_eq!(calls.borrow().len(), 1);

        // Nothing changes: no rebuilds, no uploads.
        refresh.render_frame(&rd);
        refresh.render_frame(&rd);
        assert_eq!(calls.borrow().len(), 1);
        assert_eq!(refresh.lm.rebuild_count, 1);
    }

    #[test]
    fn test_dlight_frame_uploads_dirty_rect() {
        let (mut refresh, calls) = floor_refresh();
        refresh.render_frame(&scene_with(Vec::new()));
        let before = calls.borrow().len();

        let rd = scene_with(vec![RefDLight {
            key: 1,
            origin: [32.0, 32.0, 4.0],
            radius: 200.0,
            minlight: 0.0,
            color: [1.0; 3],
        }]);
        refresh.render_frame(&rd);

        let calls_now = calls.borrow();
        assert_eq!(calls_now.len(), before + 1);
        let (block, rect) = calls_now[calls_now.len() - 1];
        assert_eq!(block, 0);
        assert_eq!(rect, LmRect { x: 0, y: 0, w: 5, h: 5 });
        drop(calls_now);

        // Light gone: one restoring upload, then quiet.
        refresh.render_frame(&scene_with(Vec::new()));
        assert_eq!(calls.borrow().len(), before + 2);
        refresh.render_frame(&scene_with(Vec::new()));
        assert_eq!(calls.borrow().len(), before + 2);
    }

    #[test]
    fn test_light_point_through_refresh() {
        let (refresh, _) = floor_refresh();
        let styles = vec![LightStyleValue::default(); 64];
        let sample = refresh.light_point(&styles, &[], &[32.0, 32.0, 64.0]);
        assert!((sample.color[0] - 128.0 / 255.0).abs() < 1e-5);
    }
}
