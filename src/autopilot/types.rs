//! Core shared types for `autopilot` (engine-agnostic).
// autopilot/types.rs
use nalgebra::{Point3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type Real = f32;
pub type Vec3 = Vector3<Real>;
pub type Pos3 = Point3<Real>;
pub type Rot3 = UnitQuaternion<Real>;

// ============================================
// Vehicle identification
// ============================================

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VehicleId(pub u32);

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "car#{}", self.0)
    }
}

/// Timing for one simulation tick.
#[derive(Debug, Clone, Copy)]
pub struct TickContext {
    pub dt: Real,         // s
    pub elapsed: Real,    // s since session start
    pub race_start: Real, // s, start signal
}

impl TickContext {
    pub fn started(&self) -> bool {
        self.elapsed >= self.race_start
    }
}

// ----- frame helpers (+Y up, +Z forward) -----
#[inline] pub fn world_up() -> Vec3 { Vec3::y() }
#[inline] pub fn local_up(rot: &Rot3) -> Vec3 { rot * Vec3::y() }
#[inline] pub fn forward(rot: &Rot3) -> Vec3 { rot * Vec3::z() }

#[inline]
pub fn lerp(a: Real, b: Real, t: Real) -> Real {
    a + (b - a) * t.clamp(0.0, 1.0)
}

/// Unsigned angle between two vectors in degrees. Zero when either is degenerate.
pub fn angle_deg(a: &Vec3, b: &Vec3) -> Real {
    let denom = (a.norm_squared() * b.norm_squared()).sqrt();
    if denom < 1e-12 {
        return 0.0;
    }
    (a.dot(b) / denom).clamp(-1.0, 1.0).acos().to_degrees()
}

/// Slerp with `t` clamped to [0, 1].
///
/// `try_slerp` gives up when both rotations are (numerically) the same; nlerp
/// is exact enough there.
pub fn slerp_clamped(from: &Rot3, to: &Rot3, t: Real) -> Rot3 {
    let t = t.clamp(0.0, 1.0);
    from.try_slerp(to, t, 1.0e-6)
        .unwrap_or_else(|| from.nlerp(to, t))
}

/// Rotation whose +Z axis faces `dir`, keeping `up` as close to vertical as possible.
/// `None` when `dir` is zero or parallel to `up`.
pub fn look_rotation(dir: &Vec3, up: &Vec3) -> Option<Rot3> {
    if dir.norm_squared() < 1e-12 || dir.cross(up).norm_squared() < 1e-12 {
        return None;
    }
    Some(Rot3::face_towards(dir, up))
}
