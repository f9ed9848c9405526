//! Learned pressure operator.
//!
//! The network topology is fixed at compile time: a stack of 3x3,
//! zero-padded, stride-1 convolutions with ReLU between layers. Only the
//! weights come from disk (`weights.json`):
//!
//! ```json
//! { "layers": [ { "in_channels": 2, "out_channels": 8,
//!                 "weights": [[[[..3..], ..3..], ..in..], ..out..],
//!                 "bias": [..out..] } ] }
//! ```
//!
//! Kernel row `ky = 0` looks one cell down (`y - 1`), column `kx = 0` one
//! cell left (`x - 1`).

use std::fs;
use std::path::Path;

use log::{debug, info};
use serde::Deserialize;

use crate::error::{SimError, SimResult};
use crate::state::{idx_inner, GridState};

use super::core::velocity_divergence;
use super::params::SimParams;
use super::projection::{apply_pressure, Projected, Projection};

const KERNEL: usize = 3;
const INPUT_CHANNELS: usize = 2;

#[derive(Deserialize)]
struct LayerFile {
    in_channels: usize,
    out_channels: usize,
    weights: Vec<Vec<Vec<Vec<f64>>>>,
    bias: Vec<f64>,
}

#[derive(Deserialize)]
struct ModelFile {
    layers: Vec<LayerFile>,
}

/// One compiled convolution. Kernel is flattened as `[out][in][ky][kx]`.
#[derive(Clone, Debug)]
struct ConvLayer {
    in_channels: usize,
    out_channels: usize,
    kernel: Vec<f64>,
    bias: Vec<f64>,
}

impl ConvLayer {
    fn compile(index: usize, layer: LayerFile, origin: &Path) -> SimResult<Self> {
        let bad = |reason: String| SimError::corrupt(origin, format!("layer {}: {}", index, reason));
        if layer.in_channels == 0 || layer.out_channels == 0 {
            return Err(bad("channel counts must be positive".into()));
        }
        if layer.bias.len() != layer.out_channels {
            return Err(bad(format!("{} biases for {} outputs", layer.bias.len(), layer.out_channels)));
        }
        if layer.weights.len() != layer.out_channels {
            return Err(bad(format!("{} kernels for {} outputs", layer.weights.len(), layer.out_channels)));
        }
        let mut kernel = Vec::with_capacity(layer.out_channels * layer.in_channels * KERNEL * KERNEL);
        for per_out in &layer.weights {
            if per_out.len() != layer.in_channels {
                return Err(bad(format!("kernel has {} inputs, expected {}", per_out.len(), layer.in_channels)));
            }
            for rows in per_out {
                if rows.len() != KERNEL || rows.iter().any(|r| r.len() != KERNEL) {
                    return Err(bad("kernels must be 3x3".into()));
                }
                for row in rows {
                    kernel.extend_from_slice(row);
                }
            }
        }
        if kernel.iter().chain(layer.bias.iter()).any(|w| !w.is_finite()) {
            return Err(bad("non-finite weight".into()));
        }
        Ok(Self {
            in_channels: layer.in_channels,
            out_channels: layer.out_channels,
            kernel,
            bias: layer.bias,
        })
    }

    /// Channel-major input `[in][cell]` to channel-major output `[out][cell]`.
    fn forward(&self, input: &[f64], nx: usize, ny: usize, relu: bool) -> Vec<f64> {
        let cells = nx * ny;
        let mut out = vec![0.0; self.out_channels * cells];
        for o in 0..self.out_channels {
            let dst = &mut out[o * cells..(o + 1) * cells];
            dst.fill(self.bias[o]);
            for c in 0..self.in_channels {
                let src = &input[c * cells..(c + 1) * cells];
                let base = (o * self.in_channels + c) * KERNEL * KERNEL;
                let w = &self.kernel[base..base + KERNEL * KERNEL];
                for y in 0..ny {
                    for x in 0..nx {
                        let mut acc = 0.0;
                        for ky in 0..KERNEL {
                            let sy = y + ky;
                            if sy < 1 || sy > ny {
                                continue;
                            }
                            for kx in 0..KERNEL {
                                let sx = x + kx;
                                if sx < 1 || sx > nx {
                                    continue;
                                }
                                acc += w[ky * KERNEL + kx] * src[idx_inner(sx - 1, sy - 1, nx)];
                            }
                        }
                        dst[idx_inner(x, y, nx)] += acc;
                    }
                }
            }
            if relu {
                for v in dst.iter_mut() {
                    *v = v.max(0.0);
                }
            }
        }
        out
    }
}

/// Convolutional stand-in for the pressure solve.
#[derive(Clone, Debug)]
pub struct LearnedProjection {
    layers: Vec<ConvLayer>,
}

impl LearnedProjection {
    /// Read and compile `weights.json`.
    pub fn load(path: &Path) -> SimResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| SimError::from_io(path, e))?;
        let model = Self::parse(&text, path)?;
        info!("Loaded learned projection from {} ({} layers)", path.display(), model.layer_count());
        Ok(model)
    }

    /// Compile weights from JSON text. `origin` is used in error messages.
    pub fn parse(text: &str, origin: &Path) -> SimResult<Self> {
        let file: ModelFile =
            serde_json::from_str(text).map_err(|e| SimError::corrupt(origin, format!("malformed weights: {}", e)))?;
        if file.layers.is_empty() {
            return Err(SimError::corrupt(origin, "no layers"));
        }
        let layers = file
            .layers
            .into_iter()
            .enumerate()
            .map(|(i, l)| ConvLayer::compile(i, l, origin))
            .collect::<SimResult<Vec<_>>>()?;

        for pair in layers.windows(2) {
            if pair[0].out_channels != pair[1].in_channels {
                return Err(SimError::corrupt(
                    origin,
                    format!("layer emits {} channels but next takes {}", pair[0].out_channels, pair[1].in_channels),
                ));
            }
        }
        let first_in = layers[0].in_channels;
        let last_out = layers[layers.len() - 1].out_channels;
        if first_in != INPUT_CHANNELS || last_out != 1 {
            return Err(SimError::Configuration(format!(
                "learned projection must map {} input channels to 1 output, got {} -> {}",
                INPUT_CHANNELS, first_in, last_out
            )));
        }
        Ok(Self { layers })
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Pressure predicted from the current divergence and solid mask.
    pub fn infer_pressure(&self, state: &GridState) -> Vec<f64> {
        let (nx, ny) = (state.res_x, state.res_y);
        let cells = nx * ny;
        let div = velocity_divergence(&state.ux, &state.uy, &state.flags, nx, ny);

        let fluid: Vec<f64> = div.iter().zip(&state.flags).filter(|(_, f)| f.is_fluid()).map(|(d, _)| *d).collect();
        let scale = std_dev(&fluid);
        let scale = if scale > 0.0 { scale } else { 1.0 };
        debug!("learned: divergence std {:.3e}", scale);

        let mut x = Vec::with_capacity(INPUT_CHANNELS * cells);
        x.extend(div.iter().map(|d| d / scale));
        x.extend(state.flags.iter().map(|f| if f.is_solid() { 1.0 } else { 0.0 }));

        let last = self.layers.len() - 1;
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(&x, nx, ny, i < last);
        }

        for (p, f) in x.iter_mut().zip(&state.flags) {
            *p = if f.is_fluid() { *p * scale } else { 0.0 };
        }
        x
    }
}

fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n).sqrt()
}

impl Projection for LearnedProjection {
    fn name(&self) -> &str {
        "learned"
    }

    fn project(&self, state: &GridState, _params: &SimParams) -> SimResult<Projected> {
        Ok(apply_pressure(state, self.infer_pressure(state)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kernel_json(center: f64) -> String {
        format!("[[0,0,0],[0,{},0],[0,0,0]]", center)
    }

    fn zero_kernel() -> String {
        kernel_json(0.0)
    }

    /// Single layer passing the divergence channel straight through.
    fn identity_model() -> String {
        format!(
            r#"{{"layers":[{{"in_channels":2,"out_channels":1,"weights":[[{},{}]],"bias":[0]}}]}}"#,
            kernel_json(1.0),
            zero_kernel()
        )
    }

    fn state_with_flow() -> GridState {
        let mut state = GridState::new_empty(10, 10);
        for y in 2..8 {
            for x in 2..8 {
                let ii = state.idx(x, y);
                state.ux[ii] = (x as f64 - 5.0) * 0.1;
                state.uy[ii] = (y as f64 * 0.3).sin() * 0.2;
            }
        }
        state
    }

    #[test]
    fn test_identity_layer_returns_divergence() {
        let model = LearnedProjection::parse(&identity_model(), Path::new("w.json")).unwrap();
        let state = state_with_flow();
        let p = model.infer_pressure(&state);
        let div = velocity_divergence(&state.ux, &state.uy, &state.flags, 10, 10);
        for i in 0..100 {
            if state.flags[i].is_fluid() {
                assert!((p[i] - div[i]).abs() < 1e-12, "cell {}: {} vs {}", i, p[i], div[i]);
            } else {
                assert_eq!(p[i], 0.0);
            }
        }
    }

    #[test]
    fn test_projection_is_deterministic() {
        let model = LearnedProjection::parse(&identity_model(), Path::new("w.json")).unwrap();
        let state = state_with_flow();
        let a = model.project(&state, &SimParams::default()).unwrap();
        let b = model.project(&state, &SimParams::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_relu_between_layers() {
        let json = format!(
            r#"{{"layers":[
                {{"in_channels":2,"out_channels":1,"weights":[[{},{}]],"bias":[0]}},
                {{"in_channels":1,"out_channels":1,"weights":[[{}]],"bias":[0]}}
            ]}}"#,
            kernel_json(-1.0),
            zero_kernel(),
            kernel_json(1.0)
        );
        let model = LearnedProjection::parse(&json, Path::new("w.json")).unwrap();
        assert_eq!(model.layer_count(), 2);
        let state = state_with_flow();
        let p = model.infer_pressure(&state);
        let div = velocity_divergence(&state.ux, &state.uy, &state.flags, 10, 10);
        for i in 0..100 {
            if state.flags[i].is_fluid() {
                assert!((p[i] - (-div[i]).max(0.0)).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_zero_padding_at_edges() {
        // All-ones kernel on the solid mask counts solid neighbours
        let json = format!(
            r#"{{"layers":[{{"in_channels":2,"out_channels":1,"weights":[[{},[[1,1,1],[1,1,1],[1,1,1]]]],"bias":[0]}}]}}"#,
            zero_kernel()
        );
        let model = LearnedProjection::parse(&json, Path::new("w.json")).unwrap();
        let state = GridState::new_empty(6, 6);
        let p = model.infer_pressure(&state);
        // Interior corner cell (1, 1) sees 5 solid neighbours
        assert_eq!(p[state.idx(1, 1)], 5.0);
        assert_eq!(p[state.idx(2, 2)], 0.0);
    }

    #[test]
    fn test_rejects_malformed_json() {
        let err = LearnedProjection::parse("{ layers: ", Path::new("w.json")).unwrap_err();
        assert!(matches!(err, SimError::CorruptData { .. }));
    }

    #[test]
    fn test_rejects_bad_kernel_shape() {
        let json = r#"{"layers":[{"in_channels":2,"out_channels":1,"weights":[[[[1,2],[3,4]],[[1,2],[3,4]]]],"bias":[0]}]}"#;
        let err = LearnedProjection::parse(json, Path::new("w.json")).unwrap_err();
        assert!(matches!(err, SimError::CorruptData { .. }));
    }

    #[test]
    fn test_rejects_channel_mismatch_between_layers() {
        let json = format!(
            r#"{{"layers":[
                {{"in_channels":2,"out_channels":1,"weights":[[{z},{z}]],"bias":[0]}},
                {{"in_channels":2,"out_channels":1,"weights":[[{z},{z}]],"bias":[0]}}
            ]}}"#,
            z = zero_kernel()
        );
        let err = LearnedProjection::parse(&json, Path::new("w.json")).unwrap_err();
        assert!(matches!(err, SimError::CorruptData { .. }));
    }

    #[test]
    fn test_rejects_wrong_io_channels() {
        let json = format!(
            r#"{{"layers":[{{"in_channels":1,"out_channels":1,"weights":[[{}]],"bias":[0]}}]}}"#,
            zero_kernel()
        );
        let err = LearnedProjection::parse(&json, Path::new("w.json")).unwrap_err();
        assert!(matches!(err, SimError::Configuration(_)));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.json");
        fs::write(&path, identity_model()).unwrap();
        let model = LearnedProjection::load(&path).unwrap();
        assert_eq!(model.name(), "learned");
        assert!(matches!(
            LearnedProjection::load(&dir.path().join("missing.json")),
            Err(SimError::NotFound(_))
        ));
    }
}
