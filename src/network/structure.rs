use num::{Float, NumCast};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{ConfigError, Error},
    network::{IoPayload, LayerSpec},
};

#[inline]
pub(crate) fn cast<F: Float>(v: f64) -> F {
    <F as NumCast>::from(v).unwrap_or_else(F::nan)
}

#[inline]
pub(crate) fn to_f64<F: Float>(v: F) -> f64 {
    v.to_f64().unwrap_or(f64::NAN)
}

/// One layer of nodes.
/// `io` is set for the input and output layers built from [`LayerSpec::Io`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer<F = f64> {
    pub charges: Vec<F>,
    pub errors: Vec<F>,
    pub io: Option<Vec<IoPayload>>,
}

impl<F: Float> Layer<F> {
    fn new(spec: LayerSpec) -> Self {
        let width = spec.width();
        let io = match spec {
            LayerSpec::Hidden(_) => None,
            LayerSpec::Io(payloads) => Some(payloads),
        };
        Self {
            charges: vec![F::zero(); width],
            errors: vec![F::zero(); width],
            io,
        }
    }

    pub fn len(&self) -> usize {
        self.charges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.charges.is_empty()
    }

    pub fn payloads(&self) -> &[IoPayload] {
        self.io.as_deref().unwrap_or(&[])
    }
}

/// Dense links between two adjacent layers.
/// `weights[o * inputs + i]` joins input node `i` to output node `o`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection<F = f64> {
    pub inputs: usize,
    pub outputs: usize,
    pub weights: Vec<F>,
}

impl<F: Float> Connection<F> {
    fn new(inputs: usize, outputs: usize, init: &mut impl FnMut() -> F) -> Self {
        let weights = (0..inputs * outputs).map(|_| init()).collect();
        Self { inputs, outputs, weights }
    }

    #[inline]
    pub fn weight(&self, output: usize, input: usize) -> F {
        self.weights[output * self.inputs + input]
    }

    /// Incoming weights of one output node
    #[inline]
    pub fn row(&self, output: usize) -> &[F] {
        &self.weights[output * self.inputs..(output + 1) * self.inputs]
    }
}

/// Structure
/// A multilayer perceptron: layers in order (input first, output last) and
/// one dense connection between each adjacent pair.
///
/// The topology is fixed at construction; only charges, errors and weights
/// change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Structure<F = f64> {
    layers: Vec<Layer<F>>,
    connections: Vec<Connection<F>>,
}

impl<F: Float> Structure<F> {
    /// Build from layer specs, drawing every initial weight from `init`.
    pub fn build(specs: Vec<LayerSpec>, mut init: impl FnMut() -> F) -> Result<Self, ConfigError> {
        if specs.len() < 2 {
            return Err(ConfigError::TooFewLayers(specs.len()));
        }
        if let Some(empty) = specs.iter().position(|s| s.width() == 0) {
            return Err(ConfigError::EmptyLayer(empty));
        }
        let layers: Vec<Layer<F>> = specs.into_iter().map(Layer::new).collect();
        let connections = layers
            .windows(2)
            .map(|pair| Connection::new(pair[0].len(), pair[1].len(), &mut init))
            .collect();
        let structure = Self { layers, connections };
        debug!(widths = ?structure.widths(), "built network structure");
        Ok(structure)
    }

    /// Weights uniform in `range`; a seed makes them reproducible
    pub fn uniform(specs: Vec<LayerSpec>, range: (f64, f64), seed: Option<u64>) -> Result<Self, ConfigError> {
        let (lo, hi) = range;
        if !(lo.is_finite() && hi.is_finite()) || lo > hi {
            return Err(ConfigError::WeightRange(lo, hi));
        }
        let mut rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self::build(specs, || cast(rng.gen_range(lo..=hi)))
    }

    pub fn layers(&self) -> &[Layer<F>] {
        &self.layers
    }

    pub fn connections(&self) -> &[Connection<F>] {
        &self.connections
    }

    pub fn widths(&self) -> Vec<usize> {
        self.layers.iter().map(Layer::len).collect()
    }

    pub fn input(&self) -> &Layer<F> {
        &self.layers[0]
    }

    pub fn output(&self) -> &Layer<F> {
        &self.layers[self.layers.len() - 1]
    }

    /// Set the input charges and propagate them forward.
    ///
    /// Input nodes whose payload is in `active` get `charge.1`, every other
    /// input node `charge.0`. Each later node becomes
    /// `tanh(sum(upstream charge * weight))`.
    pub fn feedforward(&mut self, active: &[IoPayload], (inactive, on): (F, F)) {
        let input = &mut self.layers[0];
        let payloads = input.io.as_deref().unwrap_or(&[]);
        for (n, charge) in input.charges.iter_mut().enumerate() {
            let hit = payloads.get(n).is_some_and(|p| active.iter().any(|a| p.matches(a)));
            *charge = if hit { on } else { inactive };
        }
        for (i, conn) in self.connections.iter().enumerate() {
            let (head, tail) = self.layers.split_at_mut(i + 1);
            let (up, down) = (&head[i], &mut tail[0]);
            for (o, charge) in down.charges.iter_mut().enumerate() {
                let sum = conn
                    .row(o)
                    .iter()
                    .zip(&up.charges)
                    .fold(F::zero(), |acc, (&w, &c)| acc + w * c);
                *charge = sum.tanh();
            }
        }
    }

    /// One gradient step against the charges left by the last `feedforward`.
    ///
    /// Output targets are 1 for nodes whose payload is in `targets` and 0
    /// otherwise. All errors are computed before any weight moves. Returns
    /// the half squared error over the output layer.
    pub fn backpropagate(&mut self, targets: &[IoPayload], rate: F) -> F {
        let last = self.layers.len() - 1;
        let half = cast::<F>(0.5);
        let mut loss = F::zero();

        let output = &mut self.layers[last];
        let payloads = output.io.as_deref().unwrap_or(&[]);
        for (n, (error, &charge)) in output.errors.iter_mut().zip(&output.charges).enumerate() {
            let hit = payloads.get(n).is_some_and(|p| targets.iter().any(|t| p.matches(t)));
            let target = if hit { F::one() } else { F::zero() };
            let diff = target - charge;
            *error = (F::one() - charge * charge) * diff;
            loss = loss + half * diff * diff;
        }

        for l in (1..last).rev() {
            let conn = &self.connections[l];
            let (head, tail) = self.layers.split_at_mut(l + 1);
            let (layer, down) = (&mut head[l], &tail[0]);
            for (h, (error, &charge)) in layer.errors.iter_mut().zip(&layer.charges).enumerate() {
                let sum = (0..conn.outputs).fold(F::zero(), |acc, o| acc + down.errors[o] * conn.weight(o, h));
                *error = (F::one() - charge * charge) * sum;
            }
        }

        for (i, conn) in self.connections.iter_mut().enumerate().rev() {
            let (up, down) = (&self.layers[i], &self.layers[i + 1]);
            for (o, &error) in down.errors.iter().enumerate() {
                let step = rate * error;
                let row = &mut conn.weights[o * conn.inputs..(o + 1) * conn.inputs];
                for (w, &c) in row.iter_mut().zip(&up.charges) {
                    *w = *w + step * c;
                }
            }
        }
        loss
    }

    /// CBOR encoding
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error>
    where
        F: Serialize,
    {
        Ok(serde_cbor::to_vec(self)?)
    }

    /// Decode and check that every connection fits the layers it joins
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error>
    where
        F: DeserializeOwned,
    {
        let structure: Self = serde_cbor::from_slice(bytes)?;
        structure.check_shape()?;
        Ok(structure)
    }

    fn check_shape(&self) -> Result<(), ConfigError> {
        if self.layers.len() < 2 {
            return Err(ConfigError::TooFewLayers(self.layers.len()));
        }
        if self.connections.len() != self.layers.len() - 1 {
            return Err(ConfigError::Invalid {
                name: "connections",
                reason: format!("{} connections for {} layers", self.connections.len(), self.layers.len()),
            });
        }
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.is_empty() {
                return Err(ConfigError::EmptyLayer(i));
            }
            let io_ok = layer.io.as_ref().map_or(true, |io| io.len() == layer.len());
            if layer.errors.len() != layer.len() || !io_ok {
                return Err(ConfigError::Invalid {
                    name: "layer",
                    reason: format!("layer {i} has mismatched node vectors"),
                });
            }
        }
        for (i, conn) in self.connections.iter().enumerate() {
            let fits = conn.inputs == self.layers[i].len()
                && conn.outputs == self.layers[i + 1].len()
                && conn.weights.len() == conn.inputs * conn.outputs;
            if !fits {
                return Err(ConfigError::Invalid {
                    name: "connections",
                    reason: format!("connection {i} does not fit its layers"),
                });
            }
        }
        Ok(())
    }
}
