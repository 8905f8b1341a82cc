// cl_part.rs -- pool-allocated particles with table-driven motion

use rayon::prelude::*;

use vigil_common::math::{vector_normalize, Vec3};
use vigil_common::refresh::{RefDef, RefParticle};
use vigil_common::warn::warn_once;

use crate::client::MAX_PARTICLES;

pub const PARTICLE_GRAVITY: f32 = 40.0;

/// Live-count threshold for the one-time pressure warning.
const PARTICLE_SOFT_LIMIT: usize = MAX_PARTICLES - MAX_PARTICLES / 8;

/// Below this many live particles the sequential walk wins.
const PARALLEL_PARTICLE_THRESHOLD: usize = 256;

// ============================================================
// Type table
// ============================================================

/// Ramp entry that kills the particle outright.
pub const RAMP_TERMINAL: i32 = -1;

const RAMP1: [i32; 8] = [0x6f, 0x6d, 0x6b, 0x69, 0x67, 0x65, 0x63, 0x61];
const RAMP2: [i32; 9] = [
    0x6f,
    0x6e,
    0x6d,
    0x6c,
    0x6b,
    0x6a,
    0x68,
    0x66,
    RAMP_TERMINAL,
];
const RAMP3: [i32; 6] = [0x6d, 0x6b, 6, 5, 4, 3];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParticleType {
    #[default]
    Static,
    Grav,
    SlowGrav,
    Fire,
    Explode,
    Explode2,
    Blob,
    Blob2,
}

pub const NUM_PARTICLE_TYPES: usize = 8;

impl ParticleType {
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Analytic motion model for one particle type.
pub struct ParticleTypeDef {
    /// Constant acceleration independent of gravity.
    pub dvel: Vec3,
    /// Multiplier on the downward gravity acceleration.
    pub grav_scale: f32,
    pub ramp: Option<&'static [i32]>,
    /// Ramp entries advanced per second.
    pub ramp_rate: f32,
}

pub const PARTICLE_TYPES: [ParticleTypeDef; NUM_PARTICLE_TYPES] = [
    // Static
    ParticleTypeDef {
        dvel: [0.0; 3],
        grav_scale: 0.0,
        ramp: None,
        ramp_rate: 0.0,
    },
    // Grav
    ParticleTypeDef {
        dvel: [0.0; 3],
        grav_scale: 1.0,
        ramp: None,
        ramp_rate: 0.0,
    },
    // SlowGrav
    ParticleTypeDef {
        dvel: [0.0; 3],
        grav_scale: 0.05,
        ramp: None,
        ramp_rate: 0.0,
    },
    // Fire drifts upward and burns down the fire ramp.
    ParticleTypeDef {
        dvel: [0.0, 0.0, PARTICLE_GRAVITY],
        grav_scale: 0.0,
        ramp: Some(&RAMP3),
        ramp_rate: 5.0,
    },
    // Explode
    ParticleTypeDef {
        dvel: [0.0; 3],
        grav_scale: 1.0,
        ramp: Some(&RAMP1),
        ramp_rate: 10.0,
    },
    // Explode2
    ParticleTypeDef {
        dvel: [0.0; 3],
        grav_scale: 1.0,
        ramp: Some(&RAMP2),
        ramp_rate: 15.0,
    },
    // Blob
    ParticleTypeDef {
        dvel: [0.0; 3],
        grav_scale: 1.0,
        ramp: None,
        ramp_rate: 0.0,
    },
    // Blob2
    ParticleTypeDef {
        dvel: [0.0; 3],
        grav_scale: 1.0,
        ramp: None,
        ramp_rate: 0.0,
    },
];

/// Trail flavors for `rocket_trail`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrailKind {
    Rocket,
    Smoke,
    Blood,
    Tracer,
    SlightBlood,
    Tracer2,
    Voor,
}

// ============================================================
// Particle arena
// ============================================================

#[derive(Debug, Clone, Default)]
pub struct Particle {
    next: Option<u32>,
    pub org: Vec3,
    pub vel: Vec3,
    /// Palette index; ramped types override this per frame.
    pub color: i32,
    /// Starting offset into the type's ramp table.
    pub ramp: f32,
    pub ptype: ParticleType,
    pub spawn_time: f64,
    pub die: f64,
}

pub struct ParticleState {
    particles: Vec<Particle>,
    active: Option<u32>,
    free: Option<u32>,
    live: usize,
    tracercount: u32,
    seed: u32,
}

impl Default for ParticleState {
    fn default() -> Self {
        Self::new()
    }
}

impl ParticleState {
    pub fn new() -> Self {
        let mut state = Self {
            particles: vec![Particle::default(); MAX_PARTICLES],
            active: None,
            free: None,
            live: 0,
            tracercount: 0,
            seed: 0,
        };
        state.clear();
        state
    }

    /// Rebuild the free list over the whole arena.
    pub fn clear(&mut self) {
        self.active = None;
        self.free = Some(0);
        self.live = 0;
        for i in 0..MAX_PARTICLES - 1 {
            self.particles[i].next = Some(i as u32 + 1);
        }
        self.particles[MAX_PARTICLES - 1].next = None;
    }

    pub fn live_count(&self) -> usize {
        self.live
    }

    // Classic LCG, enough jitter for effects.
    fn qrand(&mut self) -> i32 {
        self.seed = self.seed.wrapping_mul(1103515245).wrapping_add(12345);
        ((self.seed >> 16) & 0x7fff) as i32
    }

    /// Take a slot off the free list; None when the pool is exhausted.
    pub fn alloc_particle(&mut self) -> Option<u32> {
        let idx = self.free?;
        self.free = self.particles[idx as usize].next;
        let next = self.active;
        self.particles[idx as usize] = Particle {
            next,
            ..Particle::default()
        };
        self.active = Some(idx);
        self.live += 1;
        if self.live == PARTICLE_SOFT_LIMIT {
            warn_once(
                "particle-pool-pressure",
                &format!("particle pool nearly full ({} live)", self.live),
            );
        }
        Some(idx)
    }

    fn free_particle(&mut self, idx: u32) {
        self.particles[idx as usize].next = self.free;
        self.free = Some(idx);
        self.live -= 1;
    }

    // ============================================================
    // Per-frame update
    // ============================================================

    /// Effective acceleration per type for this frame. Gravity scale can
    /// change between frames, so this is rebuilt every call.
    fn type_accels(gravity_scale: f32) -> [Vec3; NUM_PARTICLE_TYPES] {
        let mut accels = [[0.0f32; 3]; NUM_PARTICLE_TYPES];
        for (i, def) in PARTICLE_TYPES.iter().enumerate() {
            accels[i] = [
                def.dvel[0],
                def.dvel[1],
                def.dvel[2] - PARTICLE_GRAVITY * def.grav_scale * gravity_scale,
            ];
        }
        accels
    }

    fn dead(p: &Particle, now: f64) -> bool {
        if now >= p.die {
            return true;
        }
        let def = &PARTICLE_TYPES[p.ptype.index()];
        if let Some(ramp) = def.ramp {
            let idx = (p.ramp + ((now - p.spawn_time) as f32) * def.ramp_rate) as usize;
            if idx >= ramp.len() || ramp[idx] == RAMP_TERMINAL {
                return true;
            }
        }
        false
    }

    fn render_color(p: &Particle, now: f64) -> i32 {
        let def = &PARTICLE_TYPES[p.ptype.index()];
        if let Some(ramp) = def.ramp {
            let idx = (p.ramp + ((now - p.spawn_time) as f32) * def.ramp_rate) as usize;
            ramp[idx]
        } else {
            p.color
        }
    }

    /// Closed-form position at elapsed time `t`.
    fn render_origin(p: &Particle, accel: &Vec3, t: f32) -> Vec3 {
        [
            p.org[0] + (p.vel[0] + accel[0] * t) * t,
            p.org[1] + (p.vel[1] + accel[1] * t) * t,
            p.org[2] + (p.vel[2] + accel[2] * t) * t,
        ]
    }

    /// Advance the simulation one frame and emit live particles into the
    /// scene. Picks the batch path when the pool is busy.
    pub fn run_particles(&mut self, now: f64, gravity_scale: f32, rd: &mut RefDef) {
        if self.live >= PARALLEL_PARTICLE_THRESHOLD {
            self.run_particles_batch(now, gravity_scale, rd);
        } else {
            self.run_particles_walk(now, gravity_scale, rd);
        }
    }

    /// Sequential list walk. Dead particles are unlinked only at the
    /// list head and immediately after the node being visited, so
    /// removal stays O(1) amortized with no compaction pass.
    pub fn run_particles_walk(&mut self, now: f64, gravity_scale: f32, rd: &mut RefDef) {
        let accels = Self::type_accels(gravity_scale);

        loop {
            match self.active {
                Some(head) if Self::dead(&self.particles[head as usize], now) => {
                    self.active = self.particles[head as usize].next;
                    self.free_particle(head);
                }
                _ => break,
            }
        }

        let mut cur = self.active;
        while let Some(idx) = cur {
            loop {
                match self.particles[idx as usize].next {
                    Some(n) if Self::dead(&self.particles[n as usize], now) => {
                        self.particles[idx as usize].next = self.particles[n as usize].next;
                        self.free_particle(n);
                    }
                    _ => break,
                }
            }

            let p = &self.particles[idx as usize];
            let t = (now - p.spawn_time) as f32;
            let origin = Self::render_origin(p, &accels[p.ptype.index()], t);
            rd.particles.push(RefParticle {
                origin,
                color: Self::render_color(p, now),
            });

            cur = self.particles[idx as usize].next;
        }
    }

    /// Batch path: physics in a parallel map over the live set, then a
    /// sequential emit that relinks the survivors.
    fn run_particles_batch(&mut self, now: f64, gravity_scale: f32, rd: &mut RefDef) {
        let accels = Self::type_accels(gravity_scale);

        let mut indices = Vec::with_capacity(self.live);
        let mut cur = self.active;
        while let Some(idx) = cur {
            indices.push(idx);
            cur = self.particles[idx as usize].next;
        }

        let particles = &self.particles;
        let results: Vec<(u32, Option<RefParticle>)> = indices
            .par_iter()
            .map(|&idx| {
                let p = &particles[idx as usize];
                if Self::dead(p, now) {
                    return (idx, None);
                }
                let t = (now - p.spawn_time) as f32;
                (
                    idx,
                    Some(RefParticle {
                        origin: Self::render_origin(p, &accels[p.ptype.index()], t),
                        color: Self::render_color(p, now),
                    }),
                )
            })
            .collect();

        let mut head: Option<u32> = None;
        let mut tail: Option<u32> = None;
        for (idx, result) in results {
            match result {
                Some(rp) => {
                    rd.particles.push(rp);
                    match tail {
                        Some(t) => self.particles[t as usize].next = Some(idx),
                        None => head = Some(idx),
                    }
                    tail = Some(idx);
                }
                None => self.free_particle(idx),
            }
        }
        if let Some(t) = tail {
            self.particles[t as usize].next = None;
        }
        self.active = head;
    }

    // ============================================================
    // Spawners
    // ============================================================

    /// Large explosion: a full burst of ramped fireball particles.
    pub fn particle_explosion(&mut self, org: &Vec3, now: f64) {
        for i in 0..1024 {
            let Some(idx) = self.alloc_particle() else {
                return;
            };

            let ramp = (self.qrand() & 3) as f32;
            let mut porg = [0.0f32; 3];
            let mut vel = [0.0f32; 3];
            for j in 0..3 {
                porg[j] = org[j] + ((self.qrand() % 32) - 16) as f32;
                vel[j] = ((self.qrand() % 512) - 256) as f32;
            }

            let p = &mut self.particles[idx as usize];
            p.spawn_time = now;
            p.die = now + 5.0;
            p.ramp = ramp;
            p.ptype = if i & 1 != 0 {
                ParticleType::Explode2
            } else {
                ParticleType::Explode
            };
            p.color = RAMP1[0];
            p.org = porg;
            p.vel = vel;
        }
    }

    pub fn blob_explosion(&mut self, org: &Vec3, now: f64) {
        for i in 0..1024 {
            let Some(idx) = self.alloc_particle() else {
                return;
            };

            let die = now + 1.0 + (self.qrand() & 8) as f64 * 0.05;
            let (ptype, color) = if i & 1 != 0 {
                (ParticleType::Blob, 66 + self.qrand() % 6)
            } else {
                (ParticleType::Blob2, 150 + self.qrand() % 6)
            };
            let mut porg = [0.0f32; 3];
            let mut vel = [0.0f32; 3];
            for j in 0..3 {
                porg[j] = org[j] + ((self.qrand() % 32) - 16) as f32;
                vel[j] = ((self.qrand() % 512) - 256) as f32;
            }

            let p = &mut self.particles[idx as usize];
            p.spawn_time = now;
            p.die = die;
            p.ptype = ptype;
            p.color = color;
            p.org = porg;
            p.vel = vel;
        }
    }

    /// Generic impact puff.
    pub fn run_particle_effect(
        &mut self,
        org: &Vec3,
        dir: &Vec3,
        color: i32,
        count: i32,
        now: f64,
    ) {
        for _ in 0..count {
            let Some(idx) = self.alloc_particle() else {
                return;
            };

            let die = now + 0.1 * (self.qrand() % 5) as f64;
            let pcolor = (color & !7) + (self.qrand() & 7);
            let mut porg = [0.0f32; 3];
            let mut vel = [0.0f32; 3];
            for j in 0..3 {
                porg[j] = org[j] + ((self.qrand() & 15) - 8) as f32;
                vel[j] = dir[j] * 15.0;
            }

            let p = &mut self.particles[idx as usize];
            p.spawn_time = now;
            p.die = die;
            p.color = pcolor;
            p.ptype = ParticleType::SlowGrav;
            p.org = porg;
            p.vel = vel;
        }
    }

    pub fn lava_splash(&mut self, org: &Vec3, now: f64) {
        for i in -16i32..16 {
            for j in -16i32..16 {
                let Some(idx) = self.alloc_particle() else {
                    return;
                };

                let die = now + 2.0 + (self.qrand() & 31) as f64 * 0.02;
                let color = 224 + (self.qrand() & 7);

                let mut dir = [
                    (j * 8 + (self.qrand() & 7)) as f32,
                    (i * 8 + (self.qrand() & 7)) as f32,
                    256.0,
                ];
                let porg = [
                    org[0] + dir[0],
                    org[1] + dir[1],
                    org[2] + (self.qrand() & 63) as f32,
                ];
                vector_normalize(&mut dir);
                let vel = (50 + (self.qrand() & 63)) as f32;

                let p = &mut self.particles[idx as usize];
                p.spawn_time = now;
                p.die = die;
                p.color = color;
                p.ptype = ParticleType::Grav;
                p.org = porg;
                p.vel = [dir[0] * vel, dir[1] * vel, dir[2] * vel];
            }
        }
    }

    pub fn teleport_splash(&mut self, org: &Vec3, now: f64) {
        let mut i = -16i32;
        while i < 16 {
            let mut j = -16i32;
            while j < 16 {
                let mut k = -24i32;
                while k < 32 {
                    let Some(idx) = self.alloc_particle() else {
                        return;
                    };

                    let die = now + 0.2 + (self.qrand() & 7) as f64 * 0.02;
                    let color = 7 + (self.qrand() & 7);

                    let mut dir = [(j * 8) as f32, (i * 8) as f32, (k * 8) as f32];
                    let porg = [
                        org[0] + i as f32 + (self.qrand() & 3) as f32,
                        org[1] + j as f32 + (self.qrand() & 3) as f32,
                        org[2] + k as f32 + (self.qrand() & 3) as f32,
                    ];
                    vector_normalize(&mut dir);
                    let vel = (50 + (self.qrand() & 63)) as f32;

                    let p = &mut self.particles[idx as usize];
                    p.spawn_time = now;
                    p.die = die;
                    p.color = color;
                    p.ptype = ParticleType::Grav;
                    p.org = porg;
                    p.vel = [dir[0] * vel, dir[1] * vel, dir[2] * vel];

                    k += 4;
                }
                j += 4;
            }
            i += 4;
        }
    }

    /// Lay a particle trail from `start` to `end`, one spawn every three
    /// units.
    pub fn rocket_trail(&mut self, start: &Vec3, end: &Vec3, kind: TrailKind, now: f64) {
        let mut vec = [end[0] - start[0], end[1] - start[1], end[2] - start[2]];
        let mut len = vector_normalize(&mut vec);
        let mut at = *start;
        let step = if kind == TrailKind::SlightBlood { 6.0 } else { 3.0 };

        while len > 0.0 {
            len -= step;

            let Some(idx) = self.alloc_particle() else {
                return;
            };

            let mut die = now + 2.0;
            let mut vel = [0.0f32; 3];
            let mut porg = at;
            let mut ramp = 0.0f32;
            let color;
            let ptype;

            match kind {
                TrailKind::Rocket => {
                    ramp = (self.qrand() & 3) as f32;
                    color = RAMP3[ramp as usize];
                    ptype = ParticleType::Fire;
                    for j in 0..3 {
                        porg[j] = at[j] + ((self.qrand() % 6) - 3) as f32;
                    }
                }
                TrailKind::Smoke => {
                    ramp = ((self.qrand() & 3) + 2) as f32;
                    color = RAMP3[ramp as usize];
                    ptype = ParticleType::Fire;
                    for j in 0..3 {
                        porg[j] = at[j] + ((self.qrand() % 6) - 3) as f32;
                    }
                }
                TrailKind::Blood | TrailKind::SlightBlood => {
                    color = 67 + (self.qrand() & 3);
                    ptype = ParticleType::Grav;
                    for j in 0..3 {
                        porg[j] = at[j] + ((self.qrand() % 6) - 3) as f32;
                    }
                }
                TrailKind::Tracer | TrailKind::Tracer2 => {
                    die = now + 0.5;
                    ptype = ParticleType::Static;
                    color = if kind == TrailKind::Tracer {
                        52 + ((self.tracercount & 4) << 1) as i32
                    } else {
                        230 + ((self.tracercount & 4) << 1) as i32
                    };
                    self.tracercount += 1;
                    if self.tracercount & 1 != 0 {
                        vel[0] = 30.0 * vec[1];
                        vel[1] = 30.0 * -vec[0];
                    } else {
                        vel[0] = 30.0 * -vec[1];
                        vel[1] = 30.0 * vec[0];
                    }
                }
                TrailKind::Voor => {
                    die = now + 0.3;
                    ptype = ParticleType::Static;
                    color = 9 * 16 + 8 + (self.qrand() & 3);
                    for j in 0..3 {
                        porg[j] = at[j] + ((self.qrand() & 15) - 8) as f32;
                    }
                }
            }

            let p = &mut self.particles[idx as usize];
            p.spawn_time = now;
            p.die = die;
            p.ramp = ramp;
            p.color = color;
            p.ptype = ptype;
            p.org = porg;
            p.vel = vel;

            for j in 0..3 {
                at[j] += vec[j] * step;
            }
        }
    }
}
