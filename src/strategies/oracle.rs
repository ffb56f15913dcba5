//! Gaussian-mixture HMM regime oracle
//!
//! The model is a JSON document with a `format_version`, initial state
//! probabilities, a transition matrix and one diagonal-covariance mixture per
//! hidden state. Decoding is Viterbi in log space.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::core::{Error, FeatureVector, RegimeOracle, Result};

pub const MODEL_FORMAT_VERSION: u32 = 1;

const PROB_TOLERANCE: f64 = 1e-6;
const LN_2PI: f64 = 1.837_877_066_409_345_5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixtureComponent {
    pub weight: f64,
    pub mean: [f64; FeatureVector::DIM],
    pub var: [f64; FeatureVector::DIM],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateEmission {
    pub components: Vec<MixtureComponent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HmmModel {
    pub format_version: u32,
    pub start_prob: Vec<f64>,
    pub trans_mat: Vec<Vec<f64>>,
    pub states: Vec<StateEmission>,
}

impl HmmModel {
    pub fn n_states(&self) -> usize {
        self.start_prob.len()
    }

    pub fn validate(&self) -> Result<()> {
        if self.format_version != MODEL_FORMAT_VERSION {
            return Err(Error::Model(format!(
                "unsupported format_version {} (expected {})",
                self.format_version, MODEL_FORMAT_VERSION
            )));
        }
        let n = self.n_states();
        if n == 0 {
            return Err(Error::Model("model has no states".into()));
        }
        check_distribution("start_prob", &self.start_prob)?;
        if self.trans_mat.len() != n {
            return Err(Error::Model(format!(
                "trans_mat has {} rows for {} states",
                self.trans_mat.len(),
                n
            )));
        }
        for (i, row) in self.trans_mat.iter().enumerate() {
            if row.len() != n {
                return Err(Error::Model(format!("trans_mat row {} has {} columns", i, row.len())));
            }
            check_distribution(&format!("trans_mat row {}", i), row)?;
        }
        if self.states.len() != n {
            return Err(Error::Model(format!(
                "{} emission states for {} hidden states",
                self.states.len(),
                n
            )));
        }
        for (i, state) in self.states.iter().enumerate() {
            if state.components.is_empty() {
                return Err(Error::Model(format!("state {} has no mixture components", i)));
            }
            let weights: Vec<f64> = state.components.iter().map(|c| c.weight).collect();
            check_distribution(&format!("state {} weights", i), &weights)?;
            for c in &state.components {
                if c.var.iter().any(|v| !(v.is_finite() && *v > 0.0)) {
                    return Err(Error::Model(format!("state {} has a non-positive variance", i)));
                }
                if c.mean.iter().any(|m| !m.is_finite()) {
                    return Err(Error::Model(format!("state {} has a non-finite mean", i)));
                }
            }
        }
        Ok(())
    }
}

fn check_distribution(what: &str, probs: &[f64]) -> Result<()> {
    if probs.iter().any(|p| !p.is_finite() || *p < 0.0) {
        return Err(Error::Model(format!("{} contains an invalid probability", what)));
    }
    let sum: f64 = probs.iter().sum();
    if (sum - 1.0).abs() > PROB_TOLERANCE {
        return Err(Error::Model(format!("{} sums to {}, not 1", what, sum)));
    }
    Ok(())
}

fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

impl MixtureComponent {
    fn log_density(&self, x: &[f64; FeatureVector::DIM]) -> f64 {
        let mut acc = 0.0;
        for d in 0..FeatureVector::DIM {
            let diff = x[d] - self.mean[d];
            acc -= 0.5 * (LN_2PI + self.var[d].ln() + diff * diff / self.var[d]);
        }
        acc
    }
}

/// Regime oracle backed by a Gaussian-mixture HMM
pub struct GaussianHmmOracle {
    log_start: Vec<f64>,
    log_trans: Vec<Vec<f64>>,
    states: Vec<StateEmission>,
}

impl GaussianHmmOracle {
    pub fn new(model: HmmModel) -> Result<Self> {
        model.validate()?;
        Ok(Self {
            log_start: model.start_prob.iter().map(|p| p.ln()).collect(),
            log_trans: model
                .trans_mat
                .iter()
                .map(|row| row.iter().map(|p| p.ln()).collect())
                .collect(),
            states: model.states,
        })
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let model: HmmModel = serde_json::from_str(content)
            .map_err(|e| Error::Model(format!("malformed model: {}", e)))?;
        Self::new(model)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Model(format!("cannot read {}: {}", path.display(), e)))?;
        let oracle = Self::from_json(&content)?;
        info!(
            "Loaded regime model {} ({} states)",
            path.display(),
            oracle.n_states()
        );
        Ok(oracle)
    }

    pub fn n_states(&self) -> usize {
        self.log_start.len()
    }

    fn emission_log_prob(&self, state: usize, x: &[f64; FeatureVector::DIM]) -> f64 {
        let terms: Vec<f64> = self.states[state]
            .components
            .iter()
            .map(|c| c.weight.ln() + c.log_density(x))
            .collect();
        log_sum_exp(&terms)
    }

    /// Most likely hidden state sequence
    fn viterbi(&self, features: &[FeatureVector]) -> Vec<usize> {
        let n = self.n_states();
        let t_len = features.len();
        if t_len == 0 {
            return Vec::new();
        }

        let mut delta: Vec<f64> = (0..n)
            .map(|j| self.log_start[j] + self.emission_log_prob(j, &features[0].as_array()))
            .collect();
        let mut backptr: Vec<Vec<usize>> = Vec::with_capacity(t_len);

        for fv in &features[1..] {
            let x = fv.as_array();
            let mut next = vec![f64::NEG_INFINITY; n];
            let mut ptr = vec![0usize; n];
            for j in 0..n {
                let scores: Vec<f64> = (0..n).map(|i| delta[i] + self.log_trans[i][j]).collect();
                let best = argmax(&scores);
                ptr[j] = best;
                next[j] = scores[best] + self.emission_log_prob(j, &x);
            }
            backptr.push(ptr);
            delta = next;
        }

        let mut path = vec![0usize; t_len];
        path[t_len - 1] = argmax(&delta);
        for t in (1..t_len).rev() {
            path[t - 1] = backptr[t - 1][path[t]];
        }
        path
    }
}

impl RegimeOracle for GaussianHmmOracle {
    fn predict(&self, features: &[FeatureVector]) -> Result<Vec<usize>> {
        Ok(self.viterbi(features))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(log_return: f64) -> MixtureComponent {
        MixtureComponent {
            weight: 1.0,
            mean: [log_return, 1.0, 1.0, 1.0],
            var: [2.5e-5, 1e-4, 1e-4, 1e-4],
        }
    }

    fn two_state_model() -> HmmModel {
        HmmModel {
            format_version: MODEL_FORMAT_VERSION,
            start_prob: vec![0.5, 0.5],
            trans_mat: vec![vec![0.9, 0.1], vec![0.1, 0.9]],
            states: vec![
                StateEmission { components: vec![component(0.01)] },
                StateEmission { components: vec![component(-0.01)] },
            ],
        }
    }

    fn fv(log_return: f64) -> FeatureVector {
        FeatureVector {
            log_return,
            high_over_open: 1.0,
            low_over_open: 1.0,
            close_over_open: 1.0,
        }
    }

    #[test]
    fn test_viterbi_tracks_regime_switch() {
        let oracle = GaussianHmmOracle::new(two_state_model()).unwrap();
        let features: Vec<_> = [0.01, 0.012, 0.009, -0.01, -0.011, -0.008]
            .iter()
            .map(|r| fv(*r))
            .collect();
        let labels = oracle.predict(&features).unwrap();
        assert_eq!(labels, vec![0, 0, 0, 1, 1, 1]);
    }

    #[test]
    fn test_output_length_matches_input() {
        let oracle = GaussianHmmOracle::new(two_state_model()).unwrap();
        assert!(oracle.predict(&[]).unwrap().is_empty());
        assert_eq!(oracle.predict(&[fv(-0.02)]).unwrap(), vec![1]);
        let long: Vec<_> = (0..50).map(|i| fv(if i % 7 == 0 { -0.01 } else { 0.01 })).collect();
        assert_eq!(oracle.predict(&long).unwrap().len(), 50);
    }

    #[test]
    fn test_mixture_component_weights() {
        let mut model = two_state_model();
        model.states[0].components = vec![
            MixtureComponent { weight: 0.5, ..component(0.01) },
            MixtureComponent { weight: 0.5, ..component(0.03) },
        ];
        let oracle = GaussianHmmOracle::new(model).unwrap();
        assert_eq!(oracle.predict(&[fv(0.03)]).unwrap(), vec![0]);
    }

    #[test]
    fn test_invalid_models_rejected() {
        let mut model = two_state_model();
        model.format_version = 2;
        assert!(matches!(GaussianHmmOracle::new(model), Err(Error::Model(_))));

        let mut model = two_state_model();
        model.trans_mat[1] = vec![0.5, 0.6];
        assert!(matches!(GaussianHmmOracle::new(model), Err(Error::Model(_))));

        let mut model = two_state_model();
        model.trans_mat.pop();
        assert!(GaussianHmmOracle::new(model).is_err());

        let mut model = two_state_model();
        model.states[1].components[0].var[2] = 0.0;
        assert!(GaussianHmmOracle::new(model).is_err());

        let mut model = two_state_model();
        model.states.pop();
        assert!(GaussianHmmOracle::new(model).is_err());
    }

    #[test]
    fn test_from_json() {
        let json = serde_json::to_string(&two_state_model()).unwrap();
        let oracle = GaussianHmmOracle::from_json(&json).unwrap();
        assert_eq!(oracle.n_states(), 2);

        let bad = r#"{"format_version":1,"start_prob":[1.0],"trans_mat":[[1.0]],
                      "states":[{"components":[{"weight":1.0,"mean":[0,1,1],"var":[1,1,1]}]}]}"#;
        assert!(matches!(GaussianHmmOracle::from_json(bad), Err(Error::Model(_))));
    }

    #[test]
    fn test_example_model_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("models/example.json");
        let oracle = GaussianHmmOracle::load(path).unwrap();
        assert_eq!(oracle.n_states(), 2);
        let labels = oracle.predict(&[fv(0.0008), fv(-0.0009)]).unwrap();
        assert_eq!(labels.len(), 2);
    }
}
