use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

/// Default vertical resolution of the Rayleigh-Taylor scenario.
const RT_RES_Y: usize = 400;

/// Gravity direction. Only its direction matters; the magnitude comes from
/// `buoyancy_scale` / `gravity_scale`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GravityVec {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl GravityVec {
    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Unit vector in the gravity direction. Zero vectors stay zero.
    pub fn normalized(&self) -> Self {
        let n = self.norm();
        if n == 0.0 {
            return *self;
        }
        Self { x: self.x / n, y: self.y / n, z: self.z / n }
    }

    pub fn scaled(&self, s: f64) -> Self {
        Self { x: self.x * s, y: self.y * s, z: self.z * s }
    }
}

/// Simulation parameters (`mconf`). Built once before the loop and passed by
/// shared reference to every component.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimParams {
    pub buoyancy_scale: f64,
    pub gravity_scale: f64,
    pub gravity_vec: GravityVec,
    pub viscosity: f64,
    pub dt: f64,
    pub jacobi_iter: usize,
    pub maccormack_strength: f64,
}

impl Default for SimParams {
    fn default() -> Self {
        Self::rayleigh_taylor(RT_RES_Y)
    }
}

impl SimParams {
    /// Parameters of the two-layer Rayleigh-Taylor run. Buoyancy is scaled by
    /// the vertical resolution so the growth rate does not depend on it.
    pub fn rayleigh_taylor(res_y: usize) -> Self {
        Self {
            buoyancy_scale: 0.2 / res_y as f64,
            gravity_scale: 0.0,
            gravity_vec: GravityVec { x: 0.0, y: 1.0, z: 0.0 },
            viscosity: 0.0,
            dt: 0.1,
            jacobi_iter: 34,
            maccormack_strength: 0.6,
        }
    }

    pub fn validate(&self) -> SimResult<()> {
        let scalars = [
            ("buoyancyScale", self.buoyancy_scale),
            ("gravityScale", self.gravity_scale),
            ("gravityVec.x", self.gravity_vec.x),
            ("gravityVec.y", self.gravity_vec.y),
            ("gravityVec.z", self.gravity_vec.z),
            ("viscosity", self.viscosity),
            ("dt", self.dt),
            ("maccormackStrength", self.maccormack_strength),
        ];
        for (name, value) in scalars {
            if !value.is_finite() {
                return Err(SimError::Configuration(format!("mconf.{} is not finite", name)));
            }
        }
        if self.dt < 0.0 {
            return Err(SimError::Configuration(format!("mconf.dt must be >= 0, got {}", self.dt)));
        }
        if self.viscosity < 0.0 {
            return Err(SimError::Configuration(format!(
                "mconf.viscosity must be >= 0, got {}",
                self.viscosity
            )));
        }
        if !(0.0..=1.0).contains(&self.maccormack_strength) {
            return Err(SimError::Configuration(format!(
                "mconf.maccormackStrength must lie in [0, 1], got {}",
                self.maccormack_strength
            )));
        }
        if self.jacobi_iter == 0 {
            return Err(SimError::Configuration("mconf.jacobiIter must be >= 1".into()));
        }
        if self.gravity_vec.norm() == 0.0 {
            return Err(SimError::Configuration("mconf.gravityVec must be non-zero".into()));
        }
        Ok(())
    }

    /// Parse an `mconf` YAML document; keys it omits keep `base`'s values.
    pub fn from_yaml_over(text: &str, base: &SimParams) -> SimResult<Self> {
        let malformed = |e: serde_yaml::Error| SimError::Configuration(format!("malformed mconf: {}", e));
        let overlay: serde_yaml::Value = serde_yaml::from_str(text).map_err(malformed)?;
        let mut merged = serde_yaml::to_value(base).map_err(malformed)?;
        match (&mut merged, overlay) {
            (_, serde_yaml::Value::Null) => {}
            (serde_yaml::Value::Mapping(m), serde_yaml::Value::Mapping(o)) => {
                for (k, v) in o {
                    m.insert(k, v);
                }
            }
            _ => return Err(SimError::Configuration("mconf must be a mapping".into())),
        }
        let params: SimParams = serde_yaml::from_value(merged).map_err(malformed)?;
        params.validate()?;
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> SimResult<SimParams> {
        SimParams::from_yaml_over(text, &SimParams::default())
    }

    #[test]
    fn test_rayleigh_taylor_defaults() {
        let p = SimParams::rayleigh_taylor(400);
        assert_eq!(p.maccormack_strength, 0.6);
        assert!((p.buoyancy_scale - 0.0005).abs() < 1e-15);
        assert_eq!(p.gravity_scale, 0.0);
        assert_eq!(p.viscosity, 0.0);
        assert_eq!(p.dt, 0.1);
        assert_eq!(p.jacobi_iter, 34);
        assert_eq!(p.gravity_vec, GravityVec { x: 0.0, y: 1.0, z: 0.0 });
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_default_matches_scenario() {
        assert_eq!(SimParams::default(), SimParams::rayleigh_taylor(400));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let p = parse("dt: 0.05\njacobiIter: 10\n").unwrap();
        assert_eq!(p.dt, 0.05);
        assert_eq!(p.jacobi_iter, 10);
        assert_eq!(p.maccormack_strength, 0.6);
    }

    #[test]
    fn test_full_yaml() {
        let yaml = r#"
buoyancyScale: 0.001
gravityScale: 0.0
gravityVec: { x: 0.0, y: -2.0, z: 0.0 }
viscosity: 0.01
dt: 0.2
jacobiIter: 50
maccormackStrength: 0.8
"#;
        let p = parse(yaml).unwrap();
        assert_eq!(p.buoyancy_scale, 0.001);
        assert_eq!(p.gravity_vec.y, -2.0);
        assert_eq!(p.gravity_vec.normalized().y, -1.0);
        assert_eq!(p.viscosity, 0.01);
        assert_eq!(p.jacobi_iter, 50);
    }

    #[test]
    fn test_overlay_keeps_base_resolution() {
        let base = SimParams::rayleigh_taylor(100);
        let p = SimParams::from_yaml_over("viscosity: 0.5\n", &base).unwrap();
        assert_eq!(p.viscosity, 0.5);
        assert_eq!(p.buoyancy_scale, 0.2 / 100.0);
        let empty = SimParams::from_yaml_over("", &base).unwrap();
        assert_eq!(empty, base);
    }

    #[test]
    fn test_non_mapping_is_configuration_error() {
        let err = parse("- 1\n- 2\n").unwrap_err();
        assert!(matches!(err, SimError::Configuration(_)));
    }

    #[test]
    fn test_malformed_yaml_is_configuration_error() {
        let err = parse("dt: [1, 2]").unwrap_err();
        assert!(matches!(err, SimError::Configuration(_)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut p = SimParams::default();
        p.dt = -1.0;
        assert!(p.validate().is_err());

        let mut p = SimParams::default();
        p.maccormack_strength = 1.5;
        assert!(p.validate().is_err());

        let mut p = SimParams::default();
        p.jacobi_iter = 0;
        assert!(p.validate().is_err());

        let mut p = SimParams::default();
        p.gravity_vec = GravityVec { x: 0.0, y: 0.0, z: 0.0 };
        assert!(p.validate().is_err());

        let mut p = SimParams::default();
        p.viscosity = f64::NAN;
        assert!(p.validate().is_err());
    }
}
