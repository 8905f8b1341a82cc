// cl_fx.rs -- dynamic lights and light styles

use vigil_common::math::Vec3;
use vigil_common::refresh::{LightStyleValue, RefDLight, RefDef};

use crate::client::{LightStyleMode, MAX_DLIGHTS, MAX_LIGHTSTYLES, MAX_STYLE_STRING};

// ============================================================
// Structures
// ============================================================

#[derive(Debug, Clone)]
pub struct CDlight {
    /// External correlation id; 0 = anonymous.
    pub key: i32,
    pub origin: Vec3,
    pub radius: f32,
    pub start_radius: f32,
    pub start_time: f64,
    /// Absolute expiry time; -1 marks a slot killed by the decay floor.
    pub die: f64,
    /// Radius shrink rate, units per second.
    pub decay: f32,
    /// Hard floor: the light dies outright once radius falls to this.
    pub minlight: f32,
    pub color: Vec3,
}

impl Default for CDlight {
    fn default() -> Self {
        Self {
            key: 0,
            origin: [0.0; 3],
            radius: 0.0,
            start_radius: 0.0,
            start_time: 0.0,
            die: 0.0,
            decay: 0.0,
            minlight: 0.0,
            color: [0.0; 3],
        }
    }
}

#[derive(Clone)]
pub struct CLightStyle {
    length: usize,
    map: [f32; MAX_STYLE_STRING],
    peak: f32,
    value: f32,
}

impl Default for CLightStyle {
    fn default() -> Self {
        Self {
            length: 0,
            map: [0.0; MAX_STYLE_STRING],
            peak: 1.0,
            value: 1.0,
        }
    }
}

// ============================================================
// Effects state
// ============================================================

pub struct FxState {
    pub dlights: Vec<CDlight>,
    lightstyles: Vec<CLightStyle>,
    /// Last coarse-clock offset the styles were advanced at.
    lastofs: i64,
}

impl Default for FxState {
    fn default() -> Self {
        Self::new()
    }
}

impl FxState {
    pub fn new() -> Self {
        Self {
            dlights: vec![CDlight::default(); MAX_DLIGHTS],
            lightstyles: vec![CLightStyle::default(); MAX_LIGHTSTYLES],
            lastofs: -1,
        }
    }

    pub fn clear(&mut self) {
        self.clear_dlights();
        self.clear_light_styles();
    }

    // ============================================================
    // DLIGHT MANAGEMENT
    // ============================================================

    pub fn clear_dlights(&mut self) {
        for dl in self.dlights.iter_mut() {
            *dl = CDlight::default();
        }
    }

    /// Pick a slot for a new light. Never fails: an exact key match is
    /// reused, then any dead slot, then the slot dying soonest.
    pub fn alloc_dlight(&mut self, key: i32, now: f64) -> usize {
        // first look for an exact key match
        if key != 0 {
            for i in 0..MAX_DLIGHTS {
                if self.dlights[i].key == key {
                    self.dlights[i] = CDlight {
                        key,
                        ..CDlight::default()
                    };
                    return i;
                }
            }
        }

        // then anything already dead
        for i in 0..MAX_DLIGHTS {
            let dl = &self.dlights[i];
            if dl.die < now || dl.radius <= dl.minlight {
                self.dlights[i] = CDlight {
                    key,
                    ..CDlight::default()
                };
                return i;
            }
        }

        // everything is alive; evict whichever dies soonest
        let mut best = 0;
        for i in 1..MAX_DLIGHTS {
            if self.dlights[i].die < self.dlights[best].die {
                best = i;
            }
        }
        self.dlights[best] = CDlight {
            key,
            ..CDlight::default()
        };
        best
    }

    /// Allocate and fully initialize a light. `color` accepts either a
    /// 0..1 triplet or 0..255 channel values.
    pub fn new_dlight(
        &mut self,
        key: i32,
        origin: Vec3,
        radius: f32,
        duration: f64,
        decay: f32,
        minlight: f32,
        color: Vec3,
        now: f64,
        allow_colored: bool,
    ) -> usize {
        let idx = self.alloc_dlight(key, now);
        let dl = &mut self.dlights[idx];
        dl.origin = origin;
        dl.radius = radius;
        dl.start_radius = radius;
        dl.start_time = now;
        dl.die = now + duration;
        dl.decay = decay;
        dl.minlight = minlight;
        dl.color = if allow_colored {
            normalize_light_color(color)
        } else {
            [1.0, 1.0, 1.0]
        };
        idx
    }

    /// Expire and decay the pool. Decay is computed from the spawn
    /// radius and time rather than integrated per frame, and the
    /// minlight floor kills the light outright.
    pub fn run_dlights(&mut self, now: f64) {
        for dl in self.dlights.iter_mut() {
            if dl.radius <= 0.0 {
                continue;
            }
            if dl.die < now {
                dl.radius = 0.0;
                dl.die = -1.0;
                continue;
            }
            if dl.decay != 0.0 {
                dl.radius = dl.start_radius - ((now - dl.start_time) as f32) * dl.decay;
                if dl.radius <= dl.minlight {
                    dl.radius = 0.0;
                    dl.die = -1.0;
                }
            }
        }
    }

    /// Append every live light to the frame's scene.
    pub fn add_dlights(&self, rd: &mut RefDef) {
        for dl in self.dlights.iter() {
            if dl.radius <= 0.0 {
                continue;
            }
            rd.dlights.push(RefDLight {
                key: dl.key,
                origin: dl.origin,
                radius: dl.radius,
                minlight: dl.minlight,
                color: dl.color,
            });
        }
    }

    // ============================================================
    // LIGHT STYLE MANAGEMENT
    // ============================================================

    pub fn clear_light_styles(&mut self) {
        for ls in self.lightstyles.iter_mut() {
            *ls = CLightStyle::default();
        }
        self.lastofs = -1;
    }

    /// Install a pattern string; 'a' is dark, 'm' is normal, 'z' is
    /// double bright.
    pub fn set_light_style(&mut self, i: usize, s: &str) {
        if i >= MAX_LIGHTSTYLES {
            log::debug!("light style index {} out of range", i);
            return;
        }
        if s.len() >= MAX_STYLE_STRING {
            log::debug!("light style {} pattern length {}", i, s.len());
            return;
        }

        let ls = &mut self.lightstyles[i];
        ls.length = s.len();
        ls.peak = 0.0;
        for (k, ch) in s.bytes().enumerate() {
            let v = (ch as f32 - b'a' as f32) / (b'm' as f32 - b'a' as f32);
            ls.map[k] = v;
            if v > ls.peak {
                ls.peak = v;
            }
        }
        if ls.length == 0 {
            ls.peak = 1.0;
        }
    }

    /// Advance every style on the coarse 10 Hz clock. Repeat calls
    /// inside the same tick are free.
    pub fn run_light_styles(&mut self, time: f64, mode: LightStyleMode) {
        let ofs = (time * 10.0) as i64;
        if ofs == self.lastofs {
            return;
        }
        self.lastofs = ofs;

        for ls in self.lightstyles.iter_mut() {
            ls.value = if ls.length == 0 {
                1.0
            } else if mode == LightStyleMode::Flat {
                ls.peak
            } else if ls.length == 1 {
                ls.map[0]
            } else {
                ls.map[(ofs % ls.length as i64) as usize]
            };
        }
    }

    pub fn style_value(&self, i: usize) -> f32 {
        self.lightstyles[i].value
    }

    /// Fan the current style intensities out to the scene.
    pub fn fill_styles(&self, rd: &mut RefDef) {
        rd.lightstyles.clear();
        for ls in self.lightstyles.iter() {
            rd.lightstyles.push(LightStyleValue {
                rgb: [ls.value; 3],
                white: ls.value * 3.0,
            });
        }
    }
}

fn normalize_light_color(color: Vec3) -> Vec3 {
    if color[0] > 1.0 || color[1] > 1.0 || color[2] > 1.0 {
        [color[0] / 255.0, color[1] / 255.0, color[2] / 255.0]
    } else {
        color
    }
}
