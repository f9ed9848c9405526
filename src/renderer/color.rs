/// Colour palette per panel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ColorMap {
    /// Ocean & Lava: deep blue -> blue -> white -> orange -> red. Light fluid
    /// reads blue, heavy fluid red, the mixing layer white.
    OceanLava,
    /// Blue-White-Red diverging map for signed velocity components.
    BlueWhiteRed,
    /// Tokyo Night: navy -> blue -> purple -> pink -> orange, for pressure.
    TokyoNight,
}

const OCEAN_LAVA_STOPS: [(f64, f64, f64); 5] = [
    (10.0, 30.0, 120.0),   // deep ocean blue      (0.00)
    (20.0, 90.0, 200.0),   // medium blue          (0.25)
    (250.0, 250.0, 240.0), // white interface      (0.50)
    (220.0, 80.0, 10.0),   // medium orange        (0.75)
    (160.0, 20.0, 20.0),   // deep lava red        (1.00)
];

const BLUE_WHITE_RED_STOPS: [(f64, f64, f64); 5] = [
    (10.0, 30.0, 150.0),   // deep blue
    (80.0, 130.0, 230.0),  // medium blue
    (245.0, 245.0, 245.0), // near white
    (230.0, 100.0, 70.0),  // medium red
    (150.0, 20.0, 20.0),   // deep red
];

const TOKYO_NIGHT_STOPS: [(f64, f64, f64); 5] = [
    (26.0, 27.0, 38.0),    // #1a1b26 navy
    (122.0, 162.0, 247.0), // #7aa2f7 blue
    (187.0, 154.0, 247.0), // #bb9af7 purple
    (247.0, 118.0, 142.0), // #f7768e pink
    (255.0, 158.0, 100.0), // #ff9e64 orange
];

/// Masked (solid) cells.
pub(crate) const NAN_GREY: [u8; 4] = [0x55, 0x55, 0x55, 255];

/// Convert a [0.0, 1.0] value to RGBA using the specified color map.
pub fn map_to_rgba(t: f64, colormap: ColorMap) -> [u8; 4] {
    let stops = match colormap {
        ColorMap::OceanLava => &OCEAN_LAVA_STOPS,
        ColorMap::BlueWhiteRed => &BLUE_WHITE_RED_STOPS,
        ColorMap::TokyoNight => &TOKYO_NIGHT_STOPS,
    };

    let t = t.clamp(0.0, 1.0);
    let seg = t * 4.0;
    let i = (seg as usize).min(3);
    let s = seg - i as f64;

    let (r0, g0, b0) = stops[i];
    let (r1, g1, b1) = stops[i + 1];

    [
        (r0 + s * (r1 - r0)) as u8,
        (g0 + s * (g1 - g0)) as u8,
        (b0 + s * (b1 - b0)) as u8,
        255,
    ]
}

/// Finite min/max of a field. NaN cells are ignored.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldRange {
    pub min: f64,
    pub max: f64,
}

impl FieldRange {
    /// `None` when the field has no finite value.
    pub fn of(values: &[f64]) -> Option<Self> {
        let mut range: Option<Self> = None;
        for &v in values.iter().filter(|v| v.is_finite()) {
            range = Some(match range {
                None => Self { min: v, max: v },
                Some(r) => Self { min: r.min.min(v), max: r.max.max(v) },
            });
        }
        range
    }

    /// Map `v` into [0, 1]; a flat field maps to the middle.
    pub fn normalize(&self, v: f64) -> f64 {
        let span = self.max - self.min;
        if span <= 0.0 {
            0.5
        } else {
            (v - self.min) / span
        }
    }
}

/// Colour of one field value, grey when masked.
pub fn value_to_rgba(v: f64, range: Option<FieldRange>, colormap: ColorMap) -> [u8; 4] {
    match range {
        Some(r) if v.is_finite() => map_to_rgba(r.normalize(v), colormap),
        _ => NAN_GREY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_match_stops() {
        assert_eq!(map_to_rgba(0.0, ColorMap::OceanLava), [10, 30, 120, 255]);
        assert_eq!(map_to_rgba(1.0, ColorMap::OceanLava), [160, 20, 20, 255]);
        assert_eq!(map_to_rgba(0.5, ColorMap::BlueWhiteRed), [245, 245, 245, 255]);
        assert_eq!(map_to_rgba(0.0, ColorMap::TokyoNight), [26, 27, 38, 255]);
    }

    #[test]
    fn test_clamp() {
        for map in [ColorMap::OceanLava, ColorMap::BlueWhiteRed, ColorMap::TokyoNight] {
            assert_eq!(map_to_rgba(-1.0, map), map_to_rgba(0.0, map));
            assert_eq!(map_to_rgba(2.0, map), map_to_rgba(1.0, map));
        }
    }

    #[test]
    fn test_gradient_continuity() {
        let steps = 256;
        for map in [ColorMap::OceanLava, ColorMap::BlueWhiteRed, ColorMap::TokyoNight] {
            for i in 1..steps {
                let t0 = (i - 1) as f64 / (steps - 1) as f64;
                let t1 = i as f64 / (steps - 1) as f64;
                let c0 = map_to_rgba(t0, map);
                let c1 = map_to_rgba(t1, map);
                for ch in 0..3 {
                    let diff = (c1[ch] as i32 - c0[ch] as i32).abs();
                    assert!(diff <= 5, "{:?} channel {} jumped by {} at t={}", map, ch, diff, t1);
                }
            }
        }
    }

    #[test]
    fn test_range_skips_nan() {
        let r = FieldRange::of(&[f64::NAN, 2.0, -1.0, f64::NAN, 5.0]).unwrap();
        assert_eq!((r.min, r.max), (-1.0, 5.0));
        assert!(FieldRange::of(&[f64::NAN, f64::NAN]).is_none());
        assert_eq!(r.normalize(2.0), 0.5);
    }

    #[test]
    fn test_flat_field_maps_to_middle() {
        let r = FieldRange::of(&[3.0, 3.0]).unwrap();
        assert_eq!(r.normalize(3.0), 0.5);
    }

    #[test]
    fn test_nan_is_grey() {
        let r = FieldRange::of(&[0.0, 1.0]);
        assert_eq!(value_to_rgba(f64::NAN, r, ColorMap::OceanLava), NAN_GREY);
        assert_ne!(value_to_rgba(0.3, r, ColorMap::OceanLava), NAN_GREY);
        assert_eq!(value_to_rgba(0.3, None, ColorMap::OceanLava), NAN_GREY);
    }
}
