use std::fmt::{self, Debug, Display};

/// One candidate and its score
#[derive(Debug, Clone, PartialEq)]
pub struct Score<K> {
    pub key: K,
    pub value: f64,
}

impl<K> Score<K> {
    pub fn new(key: K, value: f64) -> Self {
        Score { key, value }
    }
}

/// Structure to store ranked results
pub struct Rank<K> {
    pub list: Vec<Score<K>>,
}

impl<K> Rank<K> {
    /// Create a new Rank instance (unsorted)
    pub fn new(list: Vec<Score<K>>) -> Self {
        Rank { list }
    }

    /// Sort results by descending score
    pub fn sort_by_score_desc(&mut self) -> &mut Self {
        // Remove NaN scores
        self.list.retain(|s| !s.value.is_nan());
        // Stable, so equal scores keep insertion order
        self.list.sort_by(|a, b| b.value.total_cmp(&a.value));
        self
    }

    /// Sort results by ascending score
    pub fn sort_by_score_asc(&mut self) -> &mut Self {
        self.list.retain(|s| !s.value.is_nan());
        self.list.sort_by(|a, b| a.value.total_cmp(&b.value));
        self
    }

    /// Highest entry, assuming the list is sorted descending
    pub fn best(&self) -> Option<&Score<K>> {
        self.list.first()
    }

    pub fn top(&self, n: usize) -> &[Score<K>] {
        &self.list[..n.min(self.list.len())]
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.list.iter().map(|s| &s.key)
    }

    pub fn get(&self, key: &K) -> Option<f64>
    where
        K: PartialEq,
    {
        self.list.iter().find(|s| &s.key == key).map(|s| s.value)
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Rescale the scores to [0, 1] (see [`normalize_values`])
    pub fn normalize(&mut self) -> &mut Self {
        let values = self.list.iter().map(|s| s.value).collect();
        let (normalized, _, _) = normalize_values(values);
        for (score, v) in self.list.iter_mut().zip(normalized) {
            score.value = v;
        }
        self
    }
}

impl<K> Debug for Rank<K>
where
    K: Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            // Pretty print with alternate formatting: each entry on a new line
            writeln!(f, "Rank [")?;
            for s in &self.list {
                writeln!(f, "    {:?}: {:.6}", s.key, s.value)?;
            }
            write!(f, "]")
        } else {
            f.debug_list().entries(self.list.iter().map(|s| (&s.key, s.value))).finish()
        }
    }
}

impl<K> Display for Rank<K>
where
    K: Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for s in &self.list {
            writeln!(f, "{:.6}\t{}", s.value, s.key)?;
        }
        Ok(())
    }
}

/// Safe min-max normalization to [0, 1].
///
/// Returns the normalized values with the observed min and max.
/// - non-finite inputs map to 0.0
/// - a constant column maps to 0.5, decreasing by 1e-15 per position so
///   the original order survives sorting
/// - several values tied at the maximum get 1.0, 1.0 - 1e-12, ... in order
pub fn normalize_values(mut vals: Vec<f64>) -> (Vec<f64>, f64, f64) {
    let mut min_v = f64::INFINITY;
    let mut max_v = f64::NEG_INFINITY;
    for &v in &vals {
        if !v.is_finite() { continue; }
        if v < min_v { min_v = v; }
        if v > max_v { max_v = v; }
    }
    if !min_v.is_finite() {
        // nothing finite
        for v in &mut vals { *v = 0.5; }
        return (vals, f64::NAN, f64::NAN);
    }
    let range = max_v - min_v;
    // relative tolerance, stable at large magnitudes
    let tol = (max_v.abs().max(min_v.abs())) * 1e-12 + 1e-15;
    if !range.is_finite() || range <= tol {
        for (i, v) in vals.iter_mut().enumerate() {
            *v = 0.5 - (i as f64) * 1e-15;
        }
        return (vals, min_v, max_v);
    }
    let inv = 1.0 / range;
    for v in &mut vals {
        if v.is_finite() {
            *v = (*v - min_v) * inv;
        } else {
            *v = 0.0;
        }
    }
    let max_indices: Vec<usize> = vals.iter().enumerate().filter(|(_, v)| **v >= 1.0).map(|(i, _)| i).collect();
    if max_indices.len() > 1 {
        for (rank, &idx) in max_indices.iter().enumerate() {
            vals[idx] = 1.0 - (rank as f64) * 1e-12;
        }
    }
    (vals, min_v, max_v)
}

type Comparison<'a, T> = Box<dyn Fn(&T) -> f64 + Send + Sync + 'a>;

/// Ranker
/// Combines several weighted comparison functions into one ordering.
///
/// Every comparison is evaluated over all candidates, min-max normalized
/// on its own, then the normalized columns are summed with their weights
/// and divided by the total weight.
///
/// # Examples
/// ```
/// use seqdex::evaluate::scoring::Ranker;
///
/// let ranker = Ranker::new()
///     .compare(2.0, |s: &&str| s.len() as f64)
///     .compare(1.0, |s: &&str| s.matches('e').count() as f64);
/// let rank = ranker.rank(vec![("short", "ab"), ("long", "abcdefgh"), ("banana", "banana")]);
/// assert_eq!(rank.best().unwrap().key, "long");
/// ```
pub struct Ranker<'a, T> {
    comparisons: Vec<(f64, Comparison<'a, T>)>,
}

impl<T> Default for Ranker<'_, T> {
    fn default() -> Self {
        Self { comparisons: Vec::new() }
    }
}

impl<'a, T> Ranker<'a, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a comparison; non-positive or non-finite weights are ignored
    pub fn compare<F>(mut self, weight: f64, f: F) -> Self
    where
        F: Fn(&T) -> f64 + Send + Sync + 'a,
    {
        if weight.is_finite() && weight > 0.0 {
            self.comparisons.push((weight, Box::new(f)));
        }
        self
    }

    /// Score and sort `(key, candidate)` pairs, best first
    pub fn rank<K, I>(&self, candidates: I) -> Rank<K>
    where
        I: IntoIterator<Item = (K, T)>,
    {
        let (keys, items): (Vec<K>, Vec<T>) = candidates.into_iter().unzip();
        let total: f64 = self.comparisons.iter().map(|(w, _)| w).sum();
        let mut combined = vec![0.0; items.len()];
        for (weight, f) in &self.comparisons {
            let raw = items.iter().map(|item| f(item)).collect();
            let (normalized, _, _) = normalize_values(raw);
            for (acc, v) in combined.iter_mut().zip(normalized) {
                *acc += weight * v;
            }
        }
        if total > 0.0 {
            for v in &mut combined {
                *v /= total;
            }
        }
        let mut rank = Rank::new(keys.into_iter().zip(combined).map(|(k, v)| Score::new(k, v)).collect());
        rank.sort_by_score_desc();
        rank
    }
}
