//! Semi-implicit Euler integration.
//!
//! Velocities are updated first (by gravity and the constraint solver),
//! then positions advance with the *new* velocities. The symplectic
//! update is what keeps resting stacks from gaining energy over time.

use islet_types::{Pose, Twist};
use nalgebra::UnitQuaternion;

/// Advance a pose by one timestep of the given twist.
///
/// Orientation integrates through the quaternion exponential
/// `q <- exp(w dt / 2) * q` with world-frame angular velocity, and is
/// renormalized afterward: unnormalized quaternions drift and corrupt
/// every downstream rotation.
pub fn integrate_pose(pose: &mut Pose, twist: &Twist, dt: f64) {
    pose.position += twist.linear * dt;

    let omega = twist.angular;
    if omega.norm_squared() > 0.0 {
        let delta = UnitQuaternion::from_scaled_axis(omega * dt);
        pose.rotation = delta * pose.rotation;
        pose.rotation.renormalize();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Point3, Vector3};

    #[test]
    fn test_linear_integration() {
        let mut pose = Pose::identity();
        let twist = Twist::linear(Vector3::new(2.0, 0.0, 0.0));

        integrate_pose(&mut pose, &twist, 0.5);
        assert_relative_eq!(pose.position.x, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rotation_integration() {
        let mut pose = Pose::identity();
        let twist = Twist::angular(Vector3::new(0.0, 0.0, std::f64::consts::PI));

        // Half a turn about Z over one second
        integrate_pose(&mut pose, &twist, 1.0);
        let rotated = pose.rotation * Vector3::x();
        assert_relative_eq!(rotated.x, -1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_quaternion_stays_normalized() {
        let mut pose = Pose::identity();
        let twist = Twist::angular(Vector3::new(0.3, -0.7, 0.2));

        for _ in 0..10_000 {
            integrate_pose(&mut pose, &twist, 1.0 / 60.0);
        }
        assert_relative_eq!(pose.rotation.norm(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_world_frame_omega() {
        // A body already rotated 90 degrees about X, spinning about world Z:
        // its position-relative X axis keeps precessing about world Z.
        let mut pose = Pose::from_position_rotation(
            Point3::origin(),
            UnitQuaternion::from_euler_angles(std::f64::consts::FRAC_PI_2, 0.0, 0.0),
        );
        let twist = Twist::angular(Vector3::new(0.0, 0.0, std::f64::consts::FRAC_PI_2));

        integrate_pose(&mut pose, &twist, 1.0);
        // World X axis of the body should now point along +Y
        let x_world = pose.rotation * Vector3::x();
        assert_relative_eq!(x_world.y, 1.0, epsilon = 1e-9);
    }
}
