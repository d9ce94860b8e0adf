//! Multilayer perceptron over tagged input/output nodes.
//!
//! Input and output nodes carry an [`IoPayload`]: usually a stored sequence,
//! sometimes an arbitrary JSON value. Activating a set of payloads lights
//! the matching input nodes; the output charges, paired with their payloads,
//! become a [`Rank`].

pub mod structure;

use std::fmt;

use num::Float;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{
    config::NetworkConfig,
    entity::{SeqId, SeqRecord},
    error::ConfigError,
    evaluate::{Rank, Score},
    store::Reader,
};

pub use structure::{Connection, Layer, Structure};

use structure::{cast, to_f64};

/// Domain object attached to an input or output node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IoPayload {
    /// A node with no object. It never matches anything, itself included.
    Empty,
    Sequence(SeqId),
    Literal(serde_json::Value),
}

impl IoPayload {
    /// Identity test used for activation and targets
    pub fn matches(&self, other: &IoPayload) -> bool {
        match (self, other) {
            (IoPayload::Empty, _) | (_, IoPayload::Empty) => false,
            (a, b) => a == b,
        }
    }

    /// The stored sequence behind a `Sequence` payload
    pub fn resolve(&self, reader: &dyn Reader) -> Option<SeqRecord> {
        match self {
            IoPayload::Sequence(id) => reader.seq(*id),
            _ => None,
        }
    }
}

impl From<SeqId> for IoPayload {
    fn from(id: SeqId) -> Self {
        IoPayload::Sequence(id)
    }
}

impl From<serde_json::Value> for IoPayload {
    fn from(value: serde_json::Value) -> Self {
        IoPayload::Literal(value)
    }
}

impl fmt::Display for IoPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoPayload::Empty => f.write_str("-"),
            IoPayload::Sequence(id) => write!(f, "{id}"),
            IoPayload::Literal(value) => write!(f, "{value}"),
        }
    }
}

/// One layer of a network to build.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerSpec {
    /// bare nodes
    Hidden(usize),
    /// one node per payload, in order
    Io(Vec<IoPayload>),
}

impl LayerSpec {
    pub fn width(&self) -> usize {
        match self {
            LayerSpec::Hidden(n) => *n,
            LayerSpec::Io(payloads) => payloads.len(),
        }
    }

    /// IO layer over stored sequences
    pub fn seqs(ids: impl IntoIterator<Item = SeqId>) -> Self {
        LayerSpec::Io(ids.into_iter().map(IoPayload::Sequence).collect())
    }
}

impl From<usize> for LayerSpec {
    fn from(n: usize) -> Self {
        LayerSpec::Hidden(n)
    }
}

/// A training pattern: the active inputs and the outputs that should light up.
pub type Pattern = (Vec<IoPayload>, Vec<IoPayload>);

/// NeuralNetwork
/// Owns one [`Structure`] and the charges/learning rate used to drive it.
///
/// Training is sequential: every step reads the charges left by the
/// previous one. Independent networks may train in parallel.
///
/// # Examples
/// ```
/// use seqdex::config::NetworkConfig;
/// use seqdex::network::{IoPayload, LayerSpec, NeuralNetwork};
/// use serde_json::json;
///
/// let (a, b, x) = (IoPayload::from(json!("a")), IoPayload::from(json!("b")), IoPayload::from(json!("x")));
/// let config = NetworkConfig { seed: Some(1), ..Default::default() };
/// let mut net: NeuralNetwork = NeuralNetwork::new(
///     vec![LayerSpec::Io(vec![a.clone(), b.clone()]), LayerSpec::Hidden(2), LayerSpec::Io(vec![x.clone()])],
///     config,
/// ).unwrap();
/// let out = net.activate(&[a]);
/// assert_eq!(out.len(), 1);
/// assert!(out[0].1.abs() < 1.0);
/// ```
#[derive(Debug, Clone)]
pub struct NeuralNetwork<F = f64> {
    structure: Structure<F>,
    config: NetworkConfig,
}

impl<F: Float> NeuralNetwork<F> {
    /// Build with uniform random weights from `config`
    pub fn new(specs: Vec<LayerSpec>, config: NetworkConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let structure = Structure::uniform(specs, config.weight_range, config.seed)?;
        Ok(Self { structure, config })
    }

    /// Wrap an existing structure, e.g. one loaded with `Structure::from_bytes`
    pub fn from_structure(structure: Structure<F>, config: NetworkConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { structure, config })
    }

    pub fn structure(&self) -> &Structure<F> {
        &self.structure
    }

    pub fn into_structure(self) -> Structure<F> {
        self.structure
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    fn charges(&self) -> (F, F) {
        (cast(self.config.inactive), cast(self.config.active))
    }

    /// Feedforward; the output charges paired with their payloads.
    /// A bare output layer reports every node as `IoPayload::Empty`.
    pub fn activate(&mut self, inputs: &[IoPayload]) -> Vec<(IoPayload, f64)> {
        let charges = self.charges();
        self.structure.feedforward(inputs, charges);
        let output = self.structure.output();
        let payloads = output.payloads();
        output
            .charges
            .iter()
            .enumerate()
            .map(|(i, &c)| (payloads.get(i).cloned().unwrap_or(IoPayload::Empty), to_f64(c)))
            .collect()
    }

    /// One feedforward + backpropagation step at the configured rate.
    /// Returns the half squared error before the update.
    pub fn train(&mut self, inputs: &[IoPayload], targets: &[IoPayload]) -> f64 {
        self.train_with_rate(inputs, targets, self.config.learning_rate)
    }

    pub fn train_with_rate(&mut self, inputs: &[IoPayload], targets: &[IoPayload], rate: f64) -> f64 {
        let charges = self.charges();
        self.structure.feedforward(inputs, charges);
        to_f64(self.structure.backpropagate(targets, cast(rate)))
    }

    /// Train on every pattern once per epoch; returns the mean loss of each epoch.
    #[instrument(skip_all, fields(patterns = patterns.len(), epochs = epochs))]
    pub fn train_epochs(&mut self, patterns: &[Pattern], epochs: usize) -> Vec<f64> {
        let mut losses = Vec::with_capacity(epochs);
        if patterns.is_empty() {
            return losses;
        }
        for epoch in 0..epochs {
            let total: f64 = patterns.iter().map(|(inputs, targets)| self.train(inputs, targets)).sum();
            let mean = total / patterns.len() as f64;
            if epoch % 100 == 0 {
                debug!(epoch, loss = mean, "training");
            }
            losses.push(mean);
        }
        losses
    }

    /// Output payloads ranked by charge, strongest first
    pub fn predict(&mut self, inputs: &[IoPayload]) -> Rank<IoPayload> {
        let scores = self
            .activate(inputs)
            .into_iter()
            .map(|(payload, charge)| Score::new(payload, charge))
            .collect();
        let mut rank = Rank::new(scores);
        rank.sort_by_score_desc();
        rank
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::IndexerConfig,
        entity::DocumentMeta,
        index::Indexer,
        store::{MemoryStore, Store},
    };
    use serde_json::json;

    fn lit(name: &str) -> IoPayload {
        IoPayload::Literal(json!(name))
    }

    fn seeded(seed: u64) -> NetworkConfig {
        NetworkConfig { seed: Some(seed), ..Default::default() }
    }

    fn letters() -> Vec<LayerSpec> {
        vec![
            LayerSpec::Io(vec![lit("a"), lit("b"), lit("c")]),
            LayerSpec::Hidden(3),
            LayerSpec::Io(vec![lit("e"), lit("f")]),
        ]
    }

    #[test]
    fn empty_never_matches() {
        assert!(!IoPayload::Empty.matches(&IoPayload::Empty));
        assert!(!IoPayload::Empty.matches(&lit("a")));
        assert!(lit("a").matches(&lit("a")));
        assert!(!IoPayload::Sequence(SeqId(1)).matches(&lit("seq#1")));
    }

    #[test]
    fn layer_count_is_checked_up_front() {
        assert_eq!(
            NeuralNetwork::<f64>::new(vec![], seeded(1)).unwrap_err(),
            ConfigError::TooFewLayers(0)
        );
        assert_eq!(
            NeuralNetwork::<f64>::new(vec![LayerSpec::Hidden(2)], seeded(1)).unwrap_err(),
            ConfigError::TooFewLayers(1)
        );
        assert!(NeuralNetwork::<f64>::new(vec![LayerSpec::Hidden(2), LayerSpec::Hidden(2)], seeded(1)).is_ok());
    }

    #[test]
    fn feedforward_is_deterministic() {
        let mut net: NeuralNetwork = NeuralNetwork::new(letters(), seeded(5)).unwrap();
        let first = net.activate(&[lit("a"), lit("c")]);
        let second = net.activate(&[lit("a"), lit("c")]);
        assert_eq!(first, second);

        let mut twin: NeuralNetwork = NeuralNetwork::new(letters(), seeded(5)).unwrap();
        assert_eq!(twin.activate(&[lit("a"), lit("c")]), first);
    }

    fn patterns() -> Vec<Pattern> {
        vec![
            (vec![lit("a"), lit("b")], vec![lit("f")]),
            (vec![lit("c")], vec![lit("e")]),
        ]
    }

    #[test]
    fn training_learns_the_patterns() {
        for rate in [0.2, 0.3] {
            let config = NetworkConfig { learning_rate: rate, ..seeded(42) };
            let mut net: NeuralNetwork = NeuralNetwork::new(letters(), config).unwrap();
            let losses = net.train_epochs(&patterns(), 60);
            let sampled: Vec<f64> = losses.iter().step_by(10).copied().collect();
            assert_eq!(sampled.len(), 6);
            assert!(
                sampled.windows(2).all(|w| w[1] < w[0]),
                "loss not strictly decreasing at rate {rate}: {sampled:?}"
            );

            assert_eq!(net.predict(&[lit("a"), lit("b")]).best().map(|s| s.key.clone()), Some(lit("f")));
            assert_eq!(net.predict(&[lit("c")]).best().map(|s| s.key.clone()), Some(lit("e")));
        }
    }

    #[test]
    fn longer_training_keeps_lowering_the_loss() {
        let mut net: NeuralNetwork = NeuralNetwork::new(letters(), seeded(42)).unwrap();
        let losses = net.train_epochs(&patterns(), 300);
        assert!(losses[losses.len() - 1] < losses[0] * 0.5);
    }

    #[test]
    fn bare_output_layer_still_reports_its_charges() {
        let specs = vec![LayerSpec::Io(vec![lit("a")]), LayerSpec::Hidden(2)];
        let mut net: NeuralNetwork = NeuralNetwork::new(specs, seeded(4)).unwrap();
        let out = net.activate(&[lit("a")]);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|(payload, charge)| *payload == IoPayload::Empty && charge.abs() < 1.0));
        assert_eq!(net.predict(&[lit("a")]).len(), 2);
    }

    #[test]
    fn f32_networks_train_too() {
        let mut net = NeuralNetwork::<f32>::new(letters(), seeded(3)).unwrap();
        let before = net.train(&[lit("c")], &[lit("e")]);
        for _ in 0..50 {
            net.train(&[lit("c")], &[lit("e")]);
        }
        assert!(net.train(&[lit("c")], &[lit("e")]) < before);
    }

    #[test]
    fn sequence_payloads_resolve_through_the_store() {
        let store = MemoryStore::new();
        Indexer::new(&store, IndexerConfig::default())
            .unwrap()
            .index_text("red apple green pear", DocumentMeta::default())
            .unwrap();
        let ids: Vec<SeqId> = ["red", "green", "apple", "pear"]
            .iter()
            .map(|w| store.read(|r| r.word(w)).unwrap().id)
            .collect();
        let mut net: NeuralNetwork =
            NeuralNetwork::new(vec![LayerSpec::seqs(ids[..2].to_vec()), LayerSpec::seqs(ids[2..].to_vec())], seeded(9))
                .unwrap();
        for _ in 0..200 {
            net.train(&[ids[0].into()], &[ids[2].into()]);
            net.train(&[ids[1].into()], &[ids[3].into()]);
        }
        let best = net.predict(&[ids[0].into()]).best().map(|s| s.key.clone()).unwrap();
        let record = store.read(|r| best.resolve(r)).unwrap();
        assert_eq!(record.seq.text(), "apple");
    }
}
