use super::layers::{EquivariantLayer, InvariantLayer, MessagePassingLayer};
use super::linear::{Linear, Mlp};
use super::{NnError, check_shape};
use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

/// Hyperparameters that fix the shape of every weight matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Architecture {
    pub feature_width: usize,
    pub num_layers: usize,
    pub num_species: usize,
    pub num_radial_basis: usize,
    pub equivariant: bool,
    pub update_edges: bool,
    #[serde(default)]
    pub node_attr_width: usize,
    #[serde(default)]
    pub edge_attr_width: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightsHeader {
    pub name: String,
    pub version: String,
    pub architecture: Architecture,
    /// Cutoff the radial basis was trained with.
    pub cutoff_radius: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderWeights {
    /// `num_species x F`, one row per species identifier.
    pub species_embedding: DMatrix<f64>,
    /// Added to every node as `ln(sigma) * noise_embedding`.
    pub noise_embedding: DVector<f64>,
    pub edge_encoder: Linear,
    pub node_attr_projection: Option<Linear>,
    pub edge_attr_projection: Option<Linear>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadoutWeights {
    pub scalar_mlp: Mlp,
    /// Channel weights for vector outputs (`F -> 1`, no bias).
    pub vector_head: Linear,
}

/// A complete, immutable set of model parameters.
///
/// Weight sets are shared between models and threads through `Arc`; nothing
/// in the crate mutates them after loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelWeights {
    pub header: WeightsHeader,
    pub encoder: EncoderWeights,
    pub layers: Vec<MessagePassingLayer>,
    pub readout: ReadoutWeights,
}

impl ModelWeights {
    /// Random, untrained weights with the shapes implied by `architecture`.
    pub fn initialize(
        name: &str,
        architecture: &Architecture,
        cutoff_radius: f64,
        rng: &mut impl Rng,
    ) -> Self {
        let f = architecture.feature_width;
        let encoder = EncoderWeights {
            species_embedding: DMatrix::from_fn(architecture.num_species, f, |_, _| {
                StandardNormal.sample(&mut *rng)
            }),
            noise_embedding: DVector::from_fn(f, |_, _| {
                let z: f64 = StandardNormal.sample(&mut *rng);
                0.1 * z
            }),
            edge_encoder: Linear::initialize(architecture.num_radial_basis, f, true, rng),
            node_attr_projection: (architecture.node_attr_width > 0)
                .then(|| Linear::initialize(architecture.node_attr_width, f, false, rng)),
            edge_attr_projection: (architecture.edge_attr_width > 0)
                .then(|| Linear::initialize(architecture.edge_attr_width, f, false, rng)),
        };

        let layers = (0..architecture.num_layers)
            .map(|_| {
                if architecture.equivariant {
                    MessagePassingLayer::Equivariant(EquivariantLayer::initialize(
                        f,
                        architecture.update_edges,
                        rng,
                    ))
                } else {
                    MessagePassingLayer::Invariant(InvariantLayer::initialize(f, rng))
                }
            })
            .collect();

        let readout = ReadoutWeights {
            scalar_mlp: Mlp::initialize(&[f, f, 1], rng),
            vector_head: Linear::initialize(f, 1, false, rng),
        };

        Self {
            header: WeightsHeader {
                name: name.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                architecture: *architecture,
                cutoff_radius,
            },
            encoder,
            layers,
            readout,
        }
    }

    pub fn name(&self) -> &str {
        &self.header.name
    }

    pub fn architecture(&self) -> &Architecture {
        &self.header.architecture
    }

    pub fn cutoff_radius(&self) -> f64 {
        self.header.cutoff_radius
    }

    /// Checks every matrix shape against the header.
    pub fn validate(&self) -> Result<(), NnError> {
        let arch = self.architecture();
        let f = arch.feature_width;

        check_shape(
            "species embedding",
            (arch.num_species, f),
            self.encoder.species_embedding.shape(),
        )?;
        check_shape(
            "noise embedding",
            (f, 1),
            self.encoder.noise_embedding.shape(),
        )?;
        self.encoder
            .edge_encoder
            .validate("edge encoder", arch.num_radial_basis, f)?;
        validate_projection(
            "node attribute projection",
            self.encoder.node_attr_projection.as_ref(),
            arch.node_attr_width,
            f,
        )?;
        validate_projection(
            "edge attribute projection",
            self.encoder.edge_attr_projection.as_ref(),
            arch.edge_attr_width,
            f,
        )?;

        check_shape("layer count", (arch.num_layers, 1), (self.layers.len(), 1))?;
        for (idx, layer) in self.layers.iter().enumerate() {
            if layer.is_equivariant() != arch.equivariant {
                return Err(NnError::IncompatibleModel {
                    field: "layer kind",
                    expected: variant_name(arch.equivariant).to_string(),
                    found: variant_name(layer.is_equivariant()).to_string(),
                });
            }
            layer.validate(&format!("layer {idx}"), f, arch.update_edges)?;
        }

        self.readout
            .scalar_mlp
            .validate("readout scalar MLP", &[f, f, 1])?;
        self.readout.vector_head.validate("readout vector head", f, 1)
    }

    /// Checks that the weights were built for the requested model.
    pub fn check_compatible(
        &self,
        expected: &Architecture,
        cutoff_radius: f64,
    ) -> Result<(), NnError> {
        let found = self.architecture();
        let fields: [(&'static str, String, String); 8] = [
            (
                "feature_width",
                expected.feature_width.to_string(),
                found.feature_width.to_string(),
            ),
            (
                "num_layers",
                expected.num_layers.to_string(),
                found.num_layers.to_string(),
            ),
            (
                "num_species",
                expected.num_species.to_string(),
                found.num_species.to_string(),
            ),
            (
                "num_radial_basis",
                expected.num_radial_basis.to_string(),
                found.num_radial_basis.to_string(),
            ),
            (
                "variant",
                variant_name(expected.equivariant).to_string(),
                variant_name(found.equivariant).to_string(),
            ),
            (
                "update_edges",
                expected.update_edges.to_string(),
                found.update_edges.to_string(),
            ),
            (
                "node_attr_width",
                expected.node_attr_width.to_string(),
                found.node_attr_width.to_string(),
            ),
            (
                "edge_attr_width",
                expected.edge_attr_width.to_string(),
                found.edge_attr_width.to_string(),
            ),
        ];
        for (field, expected, found) in fields {
            if expected != found {
                return Err(NnError::IncompatibleModel {
                    field,
                    expected,
                    found,
                });
            }
        }

        let tolerance = 1e-9 * cutoff_radius.abs().max(1.0);
        if (self.cutoff_radius() - cutoff_radius).abs() > tolerance {
            return Err(NnError::IncompatibleModel {
                field: "cutoff_radius",
                expected: cutoff_radius.to_string(),
                found: self.cutoff_radius().to_string(),
            });
        }
        Ok(())
    }
}

fn variant_name(equivariant: bool) -> &'static str {
    if equivariant {
        "equivariant"
    } else {
        "invariant"
    }
}

fn validate_projection(
    context: &str,
    projection: Option<&Linear>,
    width: usize,
    features: usize,
) -> Result<(), NnError> {
    match projection {
        Some(linear) => linear.validate(context, width, features),
        None if width == 0 => Ok(()),
        None => Err(NnError::ShapeMismatch {
            context: context.to_string(),
            expected: (features, width),
            found: (0, 0),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn architecture(equivariant: bool) -> Architecture {
        Architecture {
            feature_width: 6,
            num_layers: 2,
            num_species: 10,
            num_radial_basis: 4,
            equivariant,
            update_edges: true,
            node_attr_width: 0,
            edge_attr_width: 2,
        }
    }

    #[test]
    fn initialized_weights_pass_validation() {
        for equivariant in [false, true] {
            let mut rng = StdRng::seed_from_u64(1);
            let weights =
                ModelWeights::initialize("fixture", &architecture(equivariant), 4.0, &mut rng);
            assert!(weights.validate().is_ok());
            assert!(weights.check_compatible(&architecture(equivariant), 4.0).is_ok());
        }
    }

    #[test]
    fn corrupted_matrix_is_a_shape_mismatch() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut weights = ModelWeights::initialize("fixture", &architecture(false), 4.0, &mut rng);
        weights.encoder.species_embedding = DMatrix::zeros(10, 5);
        assert_eq!(
            weights.validate(),
            Err(NnError::ShapeMismatch {
                context: "species embedding".to_string(),
                expected: (10, 6),
                found: (10, 5),
            })
        );
    }

    #[test]
    fn header_disagreement_is_incompatible() {
        let mut rng = StdRng::seed_from_u64(3);
        let weights = ModelWeights::initialize("fixture", &architecture(true), 4.0, &mut rng);
        let mut requested = architecture(true);
        requested.feature_width = 8;
        assert!(matches!(
            weights.check_compatible(&requested, 4.0),
            Err(NnError::IncompatibleModel {
                field: "feature_width",
                ..
            })
        ));
        assert!(matches!(
            weights.check_compatible(&architecture(false), 4.0),
            Err(NnError::IncompatibleModel { field: "variant", .. })
        ));
        assert!(matches!(
            weights.check_compatible(&architecture(true), 5.0),
            Err(NnError::IncompatibleModel {
                field: "cutoff_radius",
                ..
            })
        ));
    }

    #[test]
    fn weights_survive_a_json_round_trip() {
        let mut rng = StdRng::seed_from_u64(4);
        let weights = ModelWeights::initialize("fixture", &architecture(true), 4.0, &mut rng);
        let json = serde_json::to_string(&weights).unwrap();
        let restored: ModelWeights = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.header, weights.header);
        assert!(restored.validate().is_ok());
    }
}
