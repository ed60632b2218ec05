//! Correlation and least-squares regression for the similarity analysis.
//!
//! Significance levels use the Student t and F distributions, evaluated
//! through the regularized incomplete beta function.

use crate::error::{AnalysisError, Result};
use ndarray::{Array1, Array2};
use ndarray_linalg::{Eigh, UPLO};
use std::f64::consts::PI;
use std::fmt;

const LANCZOS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        // Reflection
        return (PI / (PI * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let t = x + 7.5;
    let series = LANCZOS[1..]
        .iter()
        .enumerate()
        .fold(LANCZOS[0], |acc, (i, c)| acc + c / (x + i as f64 + 1.0));
    0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + series.ln()
}

fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITER: usize = 300;
    const EPS: f64 = 3e-16;
    const FPMIN: f64 = 1e-300;
    let guard = |v: f64| if v.abs() < FPMIN { FPMIN } else { v };

    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;
    let mut c = 1.0;
    let mut d = 1.0 / guard(1.0 - qab * x / qap);
    let mut h = d;

    for m in 1..=MAX_ITER {
        let m = m as f64;
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 / guard(1.0 + aa * d);
        c = guard(1.0 + aa / c);
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 / guard(1.0 + aa * d);
        c = guard(1.0 + aa / c);
        let delta = d * c;
        h *= delta;
        if (delta - 1.0).abs() < EPS {
            break;
        }
    }
    h
}

/// Regularized incomplete beta function `I_x(a, b)`.
fn incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let front =
        (ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln()).exp();
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

/// Two-sided p-value of a Student t statistic.
pub fn t_two_sided_p(t: f64, df: f64) -> f64 {
    if t.is_nan() {
        return f64::NAN;
    }
    if !t.is_finite() {
        return 0.0;
    }
    incomplete_beta(df / 2.0, 0.5, df / (df + t * t))
}

/// Upper-tail probability of an F statistic.
pub fn f_upper_p(f: f64, df_num: f64, df_den: f64) -> f64 {
    if f.is_nan() {
        return f64::NAN;
    }
    if !f.is_finite() {
        return 0.0;
    }
    if f <= 0.0 {
        return 1.0;
    }
    incomplete_beta(df_den / 2.0, df_num / 2.0, df_den / (df_den + df_num * f))
}

/// Pearson correlation with its two-sided significance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correlation {
    pub r: f64,
    pub p_value: f64,
    pub n: usize,
}

impl fmt::Display for Correlation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r = {:.4}, p = {:.4e} (n = {})", self.r, self.p_value, self.n)
    }
}

/// Pearson product-moment correlation of two equally long series.
///
/// A constant series has no defined correlation; `r` and `p_value` are NaN.
pub fn pearson(x: &[f64], y: &[f64]) -> Result<Correlation> {
    if x.len() != y.len() {
        return Err(AnalysisError::DegenerateRegression(format!(
            "series lengths differ ({} vs {})",
            x.len(),
            y.len()
        )));
    }
    if x.len() < 3 {
        return Err(AnalysisError::DegenerateRegression(format!(
            "correlation needs at least 3 observations, got {}",
            x.len()
        )));
    }

    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let (mut num, mut denom_x, mut denom_y) = (0.0, 0.0, 0.0);
    for (&xx, &yy) in x.iter().zip(y) {
        let dx = xx - mean_x;
        let dy = yy - mean_y;
        num += dx * dy;
        denom_x += dx * dx;
        denom_y += dy * dy;
    }

    let denom = denom_x.sqrt() * denom_y.sqrt();
    if denom == 0.0 {
        log::warn!("Correlation of a constant series is undefined");
        return Ok(Correlation {
            r: f64::NAN,
            p_value: f64::NAN,
            n: x.len(),
        });
    }

    let r = (num / denom).clamp(-1.0, 1.0);
    let df = n - 2.0;
    let p_value = if r.abs() >= 1.0 {
        0.0
    } else {
        t_two_sided_p(r * (df / (1.0 - r * r)).sqrt(), df)
    };
    Ok(Correlation {
        r,
        p_value,
        n: x.len(),
    })
}

/// Ordinary least squares fit with an intercept.
#[derive(Debug, Clone, PartialEq)]
pub struct OlsFit {
    pub response: String,
    /// `const` followed by the regressor names
    pub names: Vec<String>,
    pub coefficients: Vec<f64>,
    pub std_errors: Vec<f64>,
    pub t_values: Vec<f64>,
    pub p_values: Vec<f64>,
    pub r_squared: f64,
    pub adj_r_squared: f64,
    pub f_statistic: f64,
    pub f_p_value: f64,
    pub n_obs: usize,
    pub df_model: usize,
    pub df_resid: usize,
}

impl OlsFit {
    pub fn formula(&self) -> String {
        format!("{} ~ {}", self.response, self.names[1..].join(" + "))
    }
}

impl fmt::Display for OlsFit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(66);
        writeln!(f, "OLS Regression Results: {}", self.formula())?;
        writeln!(f, "{rule}")?;
        writeln!(
            f,
            "{:<20}{:>10}    {:<20}{:>12.4}",
            "No. Observations:", self.n_obs, "R-squared:", self.r_squared
        )?;
        writeln!(
            f,
            "{:<20}{:>10}    {:<20}{:>12.4}",
            "Df Residuals:", self.df_resid, "Adj. R-squared:", self.adj_r_squared
        )?;
        writeln!(
            f,
            "{:<20}{:>10}    {:<20}{:>12.4}",
            "Df Model:", self.df_model, "F-statistic:", self.f_statistic
        )?;
        writeln!(f, "{:<34}{:<20}{:>12.4e}", "", "Prob (F-statistic):", self.f_p_value)?;
        writeln!(f, "{}", "-".repeat(66))?;
        writeln!(
            f,
            "{:<16}{:>12}{:>12}{:>12}{:>12}",
            "", "coef", "std err", "t", "P>|t|"
        )?;
        for i in 0..self.names.len() {
            writeln!(
                f,
                "{:<16}{:>12.4}{:>12.4}{:>12.3}{:>12.3}",
                self.names[i],
                self.coefficients[i],
                self.std_errors[i],
                self.t_values[i],
                self.p_values[i]
            )?;
        }
        write!(f, "{rule}")
    }
}

/// Moore-Penrose inverse of a symmetric matrix, with its numerical rank.
///
/// Eigenvalues within `1e-10` of the largest one (relative) are treated as zero.
fn pseudo_inverse(matrix: &Array2<f64>) -> Result<(Array2<f64>, usize)> {
    let (eigvals, eigvecs) = matrix.eigh(UPLO::Lower)?;
    let largest = eigvals.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    let cutoff = 1e-10 * largest;

    let mut d_plus = Array1::<f64>::zeros(eigvals.len());
    let mut rank = 0;
    for (i, &eig) in eigvals.iter().enumerate() {
        if eig.abs() > cutoff {
            d_plus[i] = 1.0 / eig;
            rank += 1;
        }
    }
    Ok((eigvecs.dot(&Array2::from_diag(&d_plus)).dot(&eigvecs.t()), rank))
}

/// Regress `response` on the named regressors plus a constant.
///
/// # Arguments
///
/// * `response` - Name and values of the dependent variable
/// * `regressors` - Names and values of the explanatory variables
pub fn ols(response: (&str, &[f64]), regressors: &[(&str, &[f64])]) -> Result<OlsFit> {
    let (response_name, y) = response;
    let n = y.len();
    if let Some((name, _)) = regressors.iter().find(|(_, values)| values.len() != n) {
        return Err(AnalysisError::DegenerateRegression(format!(
            "regressor {name} does not match the {n} observations of {response_name}"
        )));
    }

    let k = regressors.len() + 1;
    if n <= k {
        return Err(AnalysisError::DegenerateRegression(format!(
            "{n} observations leave no residual degrees of freedom for {k} parameters"
        )));
    }

    let design = Array2::from_shape_fn((n, k), |(row, col)| {
        if col == 0 {
            1.0
        } else {
            regressors[col - 1].1[row]
        }
    });
    let y = Array1::from(y.to_vec());

    let (xtx_pinv, rank) = pseudo_inverse(&design.t().dot(&design))?;
    if rank < k {
        log::warn!(
            "{} has a rank-deficient design ({rank} of {k} columns); using the minimum-norm fit",
            response_name
        );
    }
    let beta = xtx_pinv.dot(&design.t().dot(&y));

    let residuals = &y - &design.dot(&beta);
    let ssr = residuals.dot(&residuals);
    let mean_y = y.mean().unwrap_or(0.0);
    let sst: f64 = y.iter().map(|v| (v - mean_y).powi(2)).sum();

    let df_model = rank.saturating_sub(1);
    let df_resid = n - rank;
    let sigma2 = ssr / df_resid as f64;

    let diag = xtx_pinv.diag();
    let largest_diag = diag.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    let std_errors: Vec<f64> = diag
        .iter()
        .map(|&v| {
            // a column the pseudo-inverse dropped has no standard error
            if v.abs() <= f64::EPSILON * largest_diag {
                f64::NAN
            } else {
                (v * sigma2).max(0.0).sqrt()
            }
        })
        .collect();
    let t_values: Vec<f64> = beta
        .iter()
        .zip(&std_errors)
        .map(|(&b, &se)| {
            if se.is_nan() {
                f64::NAN
            } else if se > 0.0 {
                b / se
            } else if b == 0.0 {
                0.0
            } else {
                f64::INFINITY.copysign(b)
            }
        })
        .collect();
    let p_values = t_values
        .iter()
        .map(|&t| t_two_sided_p(t, df_resid as f64))
        .collect();

    let (r_squared, f_statistic) = if sst == 0.0 || df_model == 0 {
        let r_squared = if sst == 0.0 { f64::NAN } else { 1.0 - ssr / sst };
        (r_squared, f64::NAN)
    } else if ssr > 0.0 {
        (1.0 - ssr / sst, ((sst - ssr) / df_model as f64) / sigma2)
    } else {
        (1.0, f64::INFINITY)
    };
    let adj_r_squared = 1.0 - (1.0 - r_squared) * (n - 1) as f64 / df_resid as f64;

    let mut names = vec!["const".to_string()];
    names.extend(regressors.iter().map(|(name, _)| name.to_string()));

    Ok(OlsFit {
        response: response_name.to_string(),
        names,
        coefficients: beta.to_vec(),
        std_errors,
        t_values,
        p_values,
        r_squared,
        adj_r_squared,
        f_statistic,
        f_p_value: f_upper_p(f_statistic, df_model as f64, df_resid as f64),
        n_obs: n,
        df_model,
        df_resid,
    })
}
