//! Point lights

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

/// Linear attenuation term
pub const LIGHT_LINEAR: f32 = 0.7;
/// Quadratic attenuation term
pub const LIGHT_QUADRATIC: f32 = 1.8;

/// Point light
///
/// Everything except the position is fixed at construction; the radius is
/// derived from the color.
#[derive(Debug, Clone, PartialEq)]
pub struct PointLight {
    name: String,
    ambient: Vec3,
    color: Vec3,
    position: Vec3,
    radius: f32,
}

impl PointLight {
    pub fn new(name: impl Into<String>, ambient: Vec3, color: Vec3, position: Vec3) -> Self {
        Self {
            name: name.into(),
            ambient,
            color,
            position,
            radius: Self::light_radius(color),
        }
    }

    /// Distance past which the light contributes less than 5/256 of its
    /// brightest channel
    pub fn light_radius(color: Vec3) -> f32 {
        let intensity = (color.x * 0.2126).max(color.y * 0.7152).max(color.z * 0.0722);
        (4.0 * intensity * (256.0 / 5.0)).sqrt() / 2.0
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ambient(&self) -> Vec3 {
        self.ambient
    }

    pub fn color(&self) -> Vec3 {
        self.color
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub(crate) fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    pub fn to_gpu(&self) -> GpuPointLight {
        GpuPointLight {
            position_radius: self.position.extend(self.radius),
            color_linear: self.color.extend(LIGHT_LINEAR),
            ambient_quadratic: self.ambient.extend(LIGHT_QUADRATIC),
        }
    }
}

/// Point light record in the lighting pass's storage buffer
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GpuPointLight {
    /// xyz = position, w = radius
    pub position_radius: Vec4,
    /// xyz = color, w = linear attenuation
    pub color_linear: Vec4,
    /// xyz = ambient, w = quadratic attenuation
    pub ambient_quadratic: Vec4,
}

/// Deterministic integer generator for scattering lights
#[derive(Debug, Clone)]
struct Lcg(u32);

impl Lcg {
    fn next(&mut self) -> u32 {
        self.0 = self.0.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        (self.0 >> 16) & 0x7fff
    }

    /// One of 0.00, 0.01, ... 0.99
    fn percent(&mut self) -> f32 {
        (self.next() % 100) as f32 / 100.0
    }
}

/// Scatter `count` lights around the demo scene
///
/// Positions fall in x, z in [-3, 3) and y in [-4, 2); color channels are whole
/// numbers below 100 and the ambient term is a tiny fraction of the color.
/// The same seed always gives the same lights.
pub fn scatter_point_lights(count: usize, seed: u32) -> Vec<PointLight> {
    let mut rng = Lcg(seed);
    (0..count)
        .map(|i| {
            let x = rng.percent() * 6.0 - 3.0;
            let y = rng.percent() * 6.0 - 4.0;
            let z = rng.percent() * 6.0 - 3.0;
            let color = Vec3::new(
                (rng.next() % 100) as f32,
                (rng.next() % 100) as f32,
                (rng.next() % 100) as f32,
            );
            PointLight::new(
                format!("pointLight[{}]", i),
                color * 0.0001,
                color,
                Vec3::new(x, y, z),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radius_heuristic() {
        // Green dominates: I = 10 * 0.7152
        let radius = PointLight::light_radius(Vec3::new(10.0, 10.0, 10.0));
        let expected = (4.0 * 7.152 * 51.2_f32).sqrt() / 2.0;
        assert!((radius - expected).abs() < 1e-4);
        assert_eq!(PointLight::light_radius(Vec3::ZERO), 0.0);
    }

    #[test]
    fn test_gpu_record_packs_attenuation() {
        let light = PointLight::new("l", Vec3::splat(0.1), Vec3::X, Vec3::new(1.0, 2.0, 3.0));
        let gpu = light.to_gpu();
        assert_eq!(gpu.position_radius.truncate(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(gpu.position_radius.w, light.radius());
        assert_eq!(gpu.color_linear.w, LIGHT_LINEAR);
        assert_eq!(gpu.ambient_quadratic.w, LIGHT_QUADRATIC);
        assert_eq!(std::mem::size_of::<GpuPointLight>(), 48);
    }

    #[test]
    fn test_scatter_is_deterministic_and_bounded() {
        let a = scatter_point_lights(16, 13);
        let b = scatter_point_lights(16, 13);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert_eq!(a[3].name(), "pointLight[3]");

        for light in &a {
            let p = light.position();
            assert!((-3.0..3.0).contains(&p.x));
            assert!((-4.0..2.0).contains(&p.y));
            assert!((-3.0..3.0).contains(&p.z));
            let c = light.color();
            assert!(c.max_element() < 100.0 && c.min_element() >= 0.0);
            assert_eq!(c.x.fract(), 0.0);
            assert!((light.ambient() - c * 0.0001).length() < 1e-6);
        }

        assert_ne!(scatter_point_lights(16, 14), a);
    }
}
