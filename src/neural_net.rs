/// Binary MLP classifier
/// Logistic units, Adam optimizer, L2 penalty and early stopping

use crate::analysis::config::MlpConfig;
use crate::classifier::BinaryModel;
use ndarray::{Array, Array1, Array2, ArrayView1, ArrayView2, Axis, Dimension, Zip};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

const EPSILON: f64 = 1e-8;
const PROB_CLIP: f64 = 1e-15;

pub struct MLPClassifier {
    #[allow(dead_code)]
    input_dim: usize,
    #[allow(dead_code)]
    hidden_dims: Vec<usize>,

    // Weights are (n_in, n_out); the last layer has one output unit
    weights: Vec<Array2<f64>>,
    biases: Vec<Array1<f64>>,

    n_iter: usize,
}

/// Adam optimizer state
struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    timestep: i32,
    m_weights: Vec<Array2<f64>>,
    v_weights: Vec<Array2<f64>>,
    m_biases: Vec<Array1<f64>>,
    v_biases: Vec<Array1<f64>>,
}

impl Adam {
    fn new(weights: &[Array2<f64>], biases: &[Array1<f64>], learning_rate: f64) -> Self {
        let zeros_w: Vec<Array2<f64>> = weights.iter().map(|w| Array2::zeros(w.raw_dim())).collect();
        let zeros_b: Vec<Array1<f64>> = biases.iter().map(|b| Array1::zeros(b.raw_dim())).collect();
        Adam {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            timestep: 0,
            m_weights: zeros_w.clone(),
            v_weights: zeros_w,
            m_biases: zeros_b.clone(),
            v_biases: zeros_b,
        }
    }

    fn step(
        &mut self,
        weights: &mut [Array2<f64>],
        biases: &mut [Array1<f64>],
        weight_grads: &[Array2<f64>],
        bias_grads: &[Array1<f64>],
    ) {
        self.timestep += 1;
        let lr = self.learning_rate * (1.0 - self.beta2.powi(self.timestep)).sqrt()
            / (1.0 - self.beta1.powi(self.timestep));
        let (beta1, beta2) = (self.beta1, self.beta2);

        for layer in 0..weights.len() {
            adam_update(
                &mut weights[layer],
                &mut self.m_weights[layer],
                &mut self.v_weights[layer],
                &weight_grads[layer],
                lr,
                beta1,
                beta2,
            );
            adam_update(
                &mut biases[layer],
                &mut self.m_biases[layer],
                &mut self.v_biases[layer],
                &bias_grads[layer],
                lr,
                beta1,
                beta2,
            );
        }
    }
}

fn adam_update<D: Dimension>(
    param: &mut Array<f64, D>,
    m: &mut Array<f64, D>,
    v: &mut Array<f64, D>,
    grad: &Array<f64, D>,
    lr: f64,
    beta1: f64,
    beta2: f64,
) {
    Zip::from(param)
        .and(m)
        .and(v)
        .and(grad)
        .for_each(|p, m, v, &g| {
            *m = beta1 * *m + (1.0 - beta1) * g;
            *v = beta2 * *v + (1.0 - beta2) * g * g;
            *p -= lr * *m / (v.sqrt() + EPSILON);
        });
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Hold out `fraction` of the rows, stratified when both classes can spare one.
///
/// Returns `None` when no usable split exists.
fn validation_split(
    y: ArrayView1<u8>,
    fraction: f64,
    rng: &mut StdRng,
) -> Option<(Vec<usize>, Vec<usize>)> {
    if fraction <= 0.0 {
        return None;
    }
    let n = y.len();
    let n_val = (fraction * n as f64).ceil() as usize;
    if n_val == 0 || n_val >= n {
        return None;
    }

    let (positives, negatives): (Vec<usize>, Vec<usize>) = (0..n).partition(|&i| y[i] == 1);
    let mut train = Vec::with_capacity(n);
    let mut val = Vec::with_capacity(n_val);

    if positives.len() >= 2 && negatives.len() >= 2 {
        for mut group in [positives, negatives] {
            group.shuffle(rng);
            let share = (n_val as f64 * group.len() as f64 / n as f64).round() as usize;
            let take = share.clamp(1, group.len() - 1);
            val.extend_from_slice(&group[..take]);
            train.extend_from_slice(&group[take..]);
        }
    } else {
        let mut all: Vec<usize> = (0..n).collect();
        all.shuffle(rng);
        val.extend_from_slice(&all[..n_val]);
        train.extend_from_slice(&all[n_val..]);
    }

    train.sort_unstable();
    val.sort_unstable();
    Some((train, val))
}

impl MLPClassifier {
    /// Glorot-uniform initialisation with the logistic gain.
    ///
    /// # Arguments
    ///
    /// * `input_dim` - Number of input features
    /// * `hidden_dims` - Hidden layer sizes
    /// * `rng` - Seeded generator for reproducible weights
    pub fn new(input_dim: usize, hidden_dims: &[usize], rng: &mut StdRng) -> Self {
        let mut layer_sizes = vec![input_dim];
        layer_sizes.extend_from_slice(hidden_dims);
        layer_sizes.push(1);

        let mut weights = Vec::with_capacity(layer_sizes.len() - 1);
        let mut biases = Vec::with_capacity(layer_sizes.len() - 1);
        for pair in layer_sizes.windows(2) {
            let (n_in, n_out) = (pair[0], pair[1]);
            let limit = (2.0 / (n_in + n_out) as f64).sqrt();
            weights.push(Array2::from_shape_fn((n_in, n_out), |_| {
                rng.gen_range(-limit..limit)
            }));
            biases.push(Array1::from_shape_fn(n_out, |_| rng.gen_range(-limit..limit)));
        }

        MLPClassifier {
            input_dim,
            hidden_dims: hidden_dims.to_vec(),
            weights,
            biases,
            n_iter: 0,
        }
    }

    /// Train on one label column.
    ///
    /// With a positive `validation_fraction` training stops once validation
    /// accuracy stalls and the best weights seen are restored; otherwise it
    /// stops once the training loss stalls.
    pub fn fit(x: ArrayView2<f64>, y: ArrayView1<u8>, config: &MlpConfig, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut model = MLPClassifier::new(x.ncols(), &config.hidden_layers, &mut rng);

        let (train, val) = match validation_split(y, config.validation_fraction, &mut rng) {
            Some((train, val)) => (train, Some(val)),
            None => ((0..x.nrows()).collect(), None),
        };
        let x_train = x.select(Axis(0), &train);
        let y_train = y.select(Axis(0), &train);
        let validation = val.map(|rows| (x.select(Axis(0), &rows), y.select(Axis(0), &rows)));

        let batch_size = config.batch_size.clamp(1, train.len().max(1));
        let mut adam = Adam::new(&model.weights, &model.biases, config.learning_rate);
        let mut order: Vec<usize> = (0..train.len()).collect();

        let mut best_loss = f64::INFINITY;
        let mut best_score = f64::NEG_INFINITY;
        let mut best_params: Option<(Vec<Array2<f64>>, Vec<Array1<f64>>)> = None;
        let mut no_improvement = 0usize;

        for epoch in 0..config.max_iter {
            order.shuffle(&mut rng);
            for chunk in order.chunks(batch_size) {
                let x_batch = x_train.select(Axis(0), chunk);
                let y_batch = y_train
                    .select(Axis(0), chunk)
                    .mapv(f64::from)
                    .insert_axis(Axis(1));
                let activations = model.forward(x_batch.view());
                let (weight_grads, bias_grads) =
                    model.gradients(&activations, &y_batch, config.alpha);
                adam.step(&mut model.weights, &mut model.biases, &weight_grads, &bias_grads);
            }
            model.n_iter = epoch + 1;

            match &validation {
                Some((x_val, y_val)) => {
                    let score = model.accuracy(x_val.view(), y_val.view());
                    if score < best_score + config.tol {
                        no_improvement += 1;
                    } else {
                        no_improvement = 0;
                    }
                    if score > best_score {
                        best_score = score;
                        best_params = Some((model.weights.clone(), model.biases.clone()));
                    }
                }
                None => {
                    let loss = model.loss(x_train.view(), y_train.view(), config.alpha);
                    if loss > best_loss - config.tol {
                        no_improvement += 1;
                    } else {
                        no_improvement = 0;
                    }
                    best_loss = best_loss.min(loss);
                }
            }

            if no_improvement > config.n_iter_no_change {
                log::debug!("MLP stopped after {} epochs", model.n_iter);
                break;
            }
        }

        if model.n_iter == config.max_iter {
            log::debug!("MLP reached max_iter={} without converging", config.max_iter);
        }
        if let Some((weights, biases)) = best_params {
            model.weights = weights;
            model.biases = biases;
        }
        model
    }

    /// Activations of every layer, input first.
    fn forward(&self, x: ArrayView2<f64>) -> Vec<Array2<f64>> {
        let mut activations = Vec::with_capacity(self.weights.len() + 1);
        activations.push(x.to_owned());
        for (w, b) in self.weights.iter().zip(&self.biases) {
            let next = (activations[activations.len() - 1].dot(w) + b).mapv(sigmoid);
            activations.push(next);
        }
        activations
    }

    /// Log-loss gradients averaged over the batch, L2 penalty included.
    fn gradients(
        &self,
        activations: &[Array2<f64>],
        target: &Array2<f64>,
        alpha: f64,
    ) -> (Vec<Array2<f64>>, Vec<Array1<f64>>) {
        let n = target.nrows() as f64;
        let layers = self.weights.len();
        let mut delta = &activations[layers] - target;
        let mut weight_grads = Vec::with_capacity(layers);
        let mut bias_grads = Vec::with_capacity(layers);

        for layer in (0..layers).rev() {
            let penalty = &self.weights[layer] * alpha;
            weight_grads.push((activations[layer].t().dot(&delta) + &penalty) / n);
            bias_grads.push(delta.sum_axis(Axis(0)) / n);

            if layer > 0 {
                // Logistic derivative
                let slope = activations[layer].mapv(|a| a * (1.0 - a));
                delta = delta.dot(&self.weights[layer].t()) * &slope;
            }
        }

        weight_grads.reverse();
        bias_grads.reverse();
        (weight_grads, bias_grads)
    }

    /// Mean log loss plus `alpha / 2n` times the squared weights.
    fn loss(&self, x: ArrayView2<f64>, y: ArrayView1<u8>, alpha: f64) -> f64 {
        let n = y.len().max(1) as f64;
        let proba = self.predict_proba(x);
        let log_loss: f64 = proba
            .iter()
            .zip(y.iter())
            .map(|(&p, &t)| {
                let p = p.clamp(PROB_CLIP, 1.0 - PROB_CLIP);
                if t == 1 {
                    -p.ln()
                } else {
                    -(1.0 - p).ln()
                }
            })
            .sum();
        let squared: f64 = self.weights.iter().map(|w| w.iter().map(|v| v * v).sum::<f64>()).sum();
        log_loss / n + 0.5 * alpha * squared / n
    }

    fn accuracy(&self, x: ArrayView2<f64>, y: ArrayView1<u8>) -> f64 {
        if y.is_empty() {
            return 0.0;
        }
        let predictions = BinaryModel::predict(self, x);
        let correct = predictions.iter().zip(y.iter()).filter(|(p, t)| p == t).count();
        correct as f64 / y.len() as f64
    }

    /// Probability of the positive class for each row.
    pub fn predict_proba(&self, x: ArrayView2<f64>) -> Array1<f64> {
        let mut activations = self.forward(x);
        match activations.pop() {
            Some(output) => output.column(0).to_owned(),
            None => Array1::zeros(x.nrows()),
        }
    }

    /// Epochs run by the last fit.
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }
}

impl BinaryModel for MLPClassifier {
    fn predict(&self, x: ArrayView2<f64>) -> Array1<u8> {
        self.predict_proba(x).mapv(|p| u8::from(p > 0.5))
    }
}
