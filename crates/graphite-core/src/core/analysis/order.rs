use crate::core::models::graph::Graph;
use nalgebra::{Complex, Vector3};
use std::f64::consts::PI;
use tracing::instrument;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Steinhardt bond-orientational order of one atom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BondOrder {
    /// Rotation-invariant magnitude `q_l`.
    pub q: f64,
    /// Normalized third-order invariant `w_l` (the `W_l hat` of the literature).
    pub w: f64,
}

/// Per-atom Steinhardt order parameters `q_l` and `w_l`.
///
/// `q_lm(i)` is the mean of the orthonormal spherical harmonics `Y_lm` over the
/// bond directions of atom `i`; with `second_shell` it is further averaged over
/// the neighbors of `i`. Then
///
/// ```text
/// q_l = sqrt(4 pi / (2l + 1) * sum_m |q_lm|^2)
/// w_l = sum_{m1+m2+m3=0} (l l l; m1 m2 m3) q_lm1 q_lm2 q_lm3 / (sum_m |q_lm|^2)^(3/2)
/// ```
///
/// `q_l` carries the `4 pi / (2l + 1)` factor once, which gives the usual
/// values (0.76376 and 0.35355 for `l = 4, 6` in a simple cubic crystal). Atoms
/// without neighbors get `q_l = w_l = 0`.
#[instrument(skip_all, name = "steinhardt", fields(l = l, second_shell = second_shell))]
pub fn steinhardt(graph: &Graph, l: u32, second_shell: bool) -> Vec<BondOrder> {
    let harmonics = bond_harmonics(graph, l);
    let couplings = Couplings::new(l);

    #[cfg(not(feature = "parallel"))]
    let iterator = 0..graph.num_nodes();

    #[cfg(feature = "parallel")]
    let iterator = (0..graph.num_nodes()).into_par_iter();

    iterator
        .map(|atom| {
            let q_lm = if second_shell {
                second_shell_average(&harmonics, atom, l)
            } else {
                harmonics[atom].mean.clone()
            };
            couplings.order(l, &q_lm)
        })
        .collect()
}

/// Orthonormal spherical harmonics `Y_lm(u)` for `m = -l..=l`, with the
/// Condon-Shortley phase. `u` need not be normalized.
pub fn spherical_harmonics(l: u32, u: &Vector3<f64>) -> Vec<Complex<f64>> {
    let l = l as i64;
    let norm = u.norm();
    let cos_theta = if norm > 0.0 {
        (u.z / norm).clamp(-1.0, 1.0)
    } else {
        1.0
    };
    let phi = u.y.atan2(u.x);

    let mut out = vec![Complex::new(0.0, 0.0); (2 * l + 1) as usize];
    for m in 0..=l {
        let ratio: f64 = ((l - m + 1)..=(l + m)).map(|k| 1.0 / k as f64).product();
        let scale = ((2 * l + 1) as f64 / (4.0 * PI) * ratio).sqrt();
        let value =
            Complex::from_polar(scale * associated_legendre(l, m, cos_theta), m as f64 * phi);
        out[(l + m) as usize] = value;
        let sign = if m % 2 == 0 { 1.0 } else { -1.0 };
        out[(l - m) as usize] = value.conj() * sign;
    }
    out
}

/// Wigner 3j symbol `(j1 j2 j3; m1 m2 m3)` for integer arguments (Racah formula).
pub fn wigner_3j(j: [i64; 3], m: [i64; 3]) -> f64 {
    let [j1, j2, j3] = j;
    let [m1, m2, m3] = m;
    if m1 + m2 + m3 != 0
        || m1.abs() > j1
        || m2.abs() > j2
        || m3.abs() > j3
        || j3 < (j1 - j2).abs()
        || j3 > j1 + j2
    {
        return 0.0;
    }

    let k_min = 0.max(j2 - j3 - m1).max(j1 - j3 + m2);
    let k_max = (j1 + j2 - j3).min(j1 - m1).min(j2 + m2);
    let sum: f64 = (k_min..=k_max)
        .map(|k| {
            let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
            sign / (factorial(k)
                * factorial(j3 - j2 + k + m1)
                * factorial(j3 - j1 + k - m2)
                * factorial(j1 + j2 - j3 - k)
                * factorial(j1 - k - m1)
                * factorial(j2 - k + m2))
        })
        .sum();

    let triangle = factorial(j1 + j2 - j3) * factorial(j1 - j2 + j3) * factorial(j2 + j3 - j1)
        / factorial(j1 + j2 + j3 + 1);
    let prefactor = (triangle
        * factorial(j1 + m1)
        * factorial(j1 - m1)
        * factorial(j2 + m2)
        * factorial(j2 - m2)
        * factorial(j3 + m3)
        * factorial(j3 - m3))
    .sqrt();
    let phase = if (j1 - j2 - m3).rem_euclid(2) == 0 {
        1.0
    } else {
        -1.0
    };
    phase * prefactor * sum
}

fn factorial(n: i64) -> f64 {
    (2..=n).map(|k| k as f64).product()
}

/// `P_l^m(x)` for `0 <= m <= l`, including the Condon-Shortley phase.
fn associated_legendre(l: i64, m: i64, x: f64) -> f64 {
    let sine = (1.0 - x * x).max(0.0).sqrt();
    let mut p_mm = 1.0;
    for i in 1..=m {
        p_mm *= -((2 * i - 1) as f64) * sine;
    }
    if l == m {
        return p_mm;
    }
    let mut p_next = x * (2 * m + 1) as f64 * p_mm;
    for ll in (m + 2)..=l {
        let p = ((2 * ll - 1) as f64 * x * p_next - (ll + m - 1) as f64 * p_mm) / (ll - m) as f64;
        p_mm = p_next;
        p_next = p;
    }
    p_next
}

struct AtomHarmonics {
    neighbors: Vec<usize>,
    /// Mean `Y_lm` over the bonds of the atom, zero without bonds.
    mean: Vec<Complex<f64>>,
}

fn bond_harmonics(graph: &Graph, l: u32) -> Vec<AtomHarmonics> {
    let width = 2 * l as usize + 1;
    let mut atoms: Vec<AtomHarmonics> = (0..graph.num_nodes())
        .map(|_| AtomHarmonics {
            neighbors: Vec::new(),
            mean: vec![Complex::new(0.0, 0.0); width],
        })
        .collect();
    for (edge, vector) in graph.edges().iter().zip(graph.edge_vectors()) {
        if vector.norm() > 0.0 {
            let entry = &mut atoms[edge.source];
            entry.neighbors.push(edge.target);
            for (sum, y) in entry.mean.iter_mut().zip(spherical_harmonics(l, vector)) {
                *sum += y;
            }
        }
    }
    for atom in &mut atoms {
        let count = atom.neighbors.len().max(1) as f64;
        atom.mean.iter_mut().for_each(|v| *v /= count);
    }
    atoms
}

fn second_shell_average(atoms: &[AtomHarmonics], atom: usize, l: u32) -> Vec<Complex<f64>> {
    let neighbors = &atoms[atom].neighbors;
    let mut out = vec![Complex::new(0.0, 0.0); 2 * l as usize + 1];
    for &n in neighbors {
        for (sum, v) in out.iter_mut().zip(&atoms[n].mean) {
            *sum += v;
        }
    }
    let count = neighbors.len().max(1) as f64;
    out.iter_mut().for_each(|v| *v /= count);
    out
}

/// Non-zero `(l l l; m1 m2 m3)` symbols, stored by index `m + l`.
struct Couplings {
    terms: Vec<(usize, usize, usize, f64)>,
}

impl Couplings {
    fn new(l: u32) -> Self {
        let l = l as i64;
        let mut terms = Vec::new();
        for m1 in -l..=l {
            for m2 in -l..=l {
                let m3 = -m1 - m2;
                if m3.abs() > l {
                    continue;
                }
                let symbol = wigner_3j([l; 3], [m1, m2, m3]);
                if symbol != 0.0 {
                    terms.push(((m1 + l) as usize, (m2 + l) as usize, (m3 + l) as usize, symbol));
                }
            }
        }
        Self { terms }
    }

    fn order(&self, l: u32, q_lm: &[Complex<f64>]) -> BondOrder {
        let power: f64 = q_lm.iter().map(|v| v.norm_sqr()).sum();
        if power <= 0.0 {
            return BondOrder { q: 0.0, w: 0.0 };
        }
        let cubic: Complex<f64> = self
            .terms
            .iter()
            .map(|&(a, b, c, symbol)| q_lm[a] * q_lm[b] * q_lm[c] * symbol)
            .sum();
        BondOrder {
            q: (4.0 * PI / (2 * l + 1) as f64 * power).sqrt(),
            w: cubic.re / power.powf(1.5),
        }
    }
}
