//! Listener properties and the orthonormal basis derived from them.

use crate::math::orthonormal_basis;
use crate::panner::DistanceModel;

/// Listener properties, published via [`crate::handover::Handover`] and
/// snapshotted once per slice by the mixer.
#[derive(Debug, Clone)]
pub struct ListenerProps {
    pub position: [f32; 3],
    pub velocity: [f32; 3],
    pub forward: [f32; 3],
    pub up: [f32; 3],
    pub gain: f32,
    pub meters_per_unit: f32,
    pub doppler_factor: f32,
    pub speed_of_sound: f32,
    pub distance_model: DistanceModel,
}

impl Default for ListenerProps {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 0.0],
            velocity: [0.0, 0.0, 0.0],
            forward: [0.0, 0.0, -1.0],
            up: [0.0, 1.0, 0.0],
            gain: 1.0,
            meters_per_unit: 1.0,
            doppler_factor: 1.0,
            speed_of_sound: 343.3,
            distance_model: DistanceModel::InverseClamped,
        }
    }
}

/// Derived, mixer-visible listener state.
#[derive(Debug, Clone, Copy)]
pub struct ListenerBasis {
    pub forward: [f32; 3],
    pub up: [f32; 3],
    pub right: [f32; 3],
}

impl ListenerProps {
    /// Orthonormalize forward/up via Gram-Schmidt; degenerate input resets
    /// to identity.
    pub fn basis(&self) -> ListenerBasis {
        let (forward, up) = orthonormal_basis(self.forward, self.up);
        let right = crate::math::cross3(forward, up);
        ListenerBasis { forward, up, right }
    }

    /// Speed of sound expressed in units-per-second given `meters_per_unit`.
    pub fn speed_of_sound_units_per_second(&self) -> f32 {
        self.speed_of_sound / self.meters_per_unit.max(1.0e-6)
    }

    /// World-to-listener transform applied to a world-space point, i.e. the
    /// point's coordinates expressed in the listener's local (right, up,
    /// -forward) basis.
    pub fn world_to_listener(&self, world_point: [f32; 3]) -> [f32; 3] {
        let basis = self.basis();
        let rel = crate::math::sub3(world_point, self.position);
        [
            crate::math::dot3(rel, basis.right),
            crate::math::dot3(rel, basis.up),
            -crate::math::dot3(rel, basis.forward),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_basis_is_orthonormal() {
        let props = ListenerProps::default();
        let basis = props.basis();
        assert!(crate::math::dot3(basis.forward, basis.up).abs() < 1.0e-5);
    }

    #[test]
    fn world_to_listener_places_forward_source_on_negative_z() {
        let props = ListenerProps::default();
        let local = props.world_to_listener([0.0, 0.0, -5.0]);
        assert!(local[2] < 0.0, "forward source should map to -listener-z: {local:?}");
    }
}
