use itertools::{merge_join_by, EitherOrBoth};
use ndarray::Array2;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Beta, Distribution};

use crate::demux::barcodes::BarcodeSet;
use crate::demux::counts::CountMatrix;
use crate::demux::error::{DemuxError, Result};
use crate::demux::variants::VariantRegistry;

/// Clamp band applied to genotype probabilities before taking logarithms,
/// keeping them strictly inside (0,1)
pub const GENOTYPE_EPS: f64 = 1e-6;

/// Model state for reference-free genotype demultiplexing: per-cluster
/// alt-allele probability vectors, per-barcode cluster likelihoods and
/// posteriors, and the final assignment buckets.
///
/// The registry, barcode set and count matrices are fixed inputs; the
/// genotype, likelihood and posterior arrays are the only mutable state and
/// are rewritten in full on each EM round.
#[derive(Debug)]
pub struct GenotypeModel {
    num_clusters: usize,
    variants: VariantRegistry,
    barcodes: BarcodeSet,
    ref_counts: CountMatrix,
    alt_counts: CountMatrix,

    /// Alt-allele probability per (cluster, variant); None until the first
    /// initialization
    genotypes: Option<Array2<f64>>,
    /// Unnormalized P(c|s), one row per barcode, one column per cluster
    likelihood: Array2<f64>,
    /// Row-normalized P(s|c) under equal cluster priors
    posterior: Array2<f64>,
    /// One sorted barcode bucket per cluster; barcodes below the confidence
    /// threshold appear in no bucket
    assigned: Vec<Vec<String>>,
}

impl GenotypeModel {
    /// All containers are constructed fresh here; count matrices must match
    /// the registry and barcode set dimensions.
    pub fn new(
        num_clusters: usize,
        variants: VariantRegistry,
        barcodes: BarcodeSet,
        ref_counts: CountMatrix,
        alt_counts: CountMatrix,
    ) -> Result<Self> {
        if num_clusters == 0 {
            return Err(DemuxError::InvalidClusterCount(num_clusters));
        }
        let expected = (variants.len(), barcodes.len());
        for m in [&ref_counts, &alt_counts] {
            let found = (m.n_variants(), m.n_barcodes());
            if found != expected {
                return Err(DemuxError::ShapeMismatch {
                    expected: format!("{} variants x {} barcodes", expected.0, expected.1),
                    found: format!("{} variants x {} barcodes", found.0, found.1),
                });
            }
        }
        let n_barcodes = barcodes.len();
        Ok(Self {
            num_clusters,
            variants,
            barcodes,
            ref_counts,
            alt_counts,
            genotypes: None,
            likelihood: Array2::zeros((n_barcodes, num_clusters)),
            posterior: Array2::zeros((n_barcodes, num_clusters)),
            assigned: vec![Vec::new(); num_clusters],
        })
    }

    pub fn has_genotypes(&self) -> bool {
        self.genotypes.is_some()
    }

    /// Draw initial genotype vectors from a Beta prior parameterized by the
    /// global alt/ref count totals. One crude shared prior for every
    /// (cluster, variant) pair; it only exists to break symmetry before the
    /// first true re-estimation. No-op if genotypes already exist.
    pub fn initialize_genotypes(&mut self, seed: u64) -> Result<()> {
        if self.genotypes.is_some() {
            return Ok(());
        }
        let alpha = (self.alt_counts.total() as f64).max(1.0);
        let beta = (self.ref_counts.total() as f64).max(1.0);
        let prior =
            Beta::new(alpha, beta).map_err(|_| DemuxError::BetaParams { alpha, beta })?;

        let mut rng = SmallRng::seed_from_u64(seed);
        let mut genotypes = Array2::zeros((self.num_clusters, self.variants.len()));
        for g in genotypes.iter_mut() {
            *g = prior.sample(&mut rng);
        }
        self.genotypes = Some(genotypes);
        Ok(())
    }

    /// M-step. For every variant v and cluster n, accumulate the
    /// posterior-weighted alt count A and total count T over all barcodes,
    /// then set the genotype to the Laplace-smoothed estimate (A+1)/(T+2),
    /// which stays strictly inside (0,1) for any input counts.
    ///
    /// The accumulators are full (variant x cluster) arrays zeroed on every
    /// call; each pair is scoped to its own (v, n) cell.
    pub fn reestimate_genotypes(&mut self) -> Result<()> {
        if self.genotypes.is_none() {
            return Err(DemuxError::GenotypesNotInitialized);
        }
        let n_variants = self.variants.len();
        let k = self.num_clusters;

        let mut alt_weighted = Array2::<f64>::zeros((n_variants, k));
        let mut total_weighted = Array2::<f64>::zeros((n_variants, k));
        for (&count, (v, c)) in self.alt_counts.iter() {
            let count = count as f64;
            for n in 0..k {
                let w = self.posterior[[c, n]];
                alt_weighted[[v, n]] += w * count;
                total_weighted[[v, n]] += w * count;
            }
        }
        for (&count, (v, c)) in self.ref_counts.iter() {
            let count = count as f64;
            for n in 0..k {
                total_weighted[[v, n]] += self.posterior[[c, n]] * count;
            }
        }

        let Some(genotypes) = self.genotypes.as_mut() else {
            return Err(DemuxError::GenotypesNotInitialized);
        };
        for v in 0..n_variants {
            for n in 0..k {
                genotypes[[n, v]] =
                    (alt_weighted[[v, n]] + 1.0) / (total_weighted[[v, n]] + 2.0);
            }
        }
        Ok(())
    }

    /// E-step. For each barcode, walk only the variants it actually covers
    /// (uncovered variants carry no evidence), accumulate the per-cluster
    /// log2-likelihood, exponentiate into P(c|s), and row-normalize into
    /// P(s|c) under equal cluster priors.
    ///
    /// A barcode with zero covered variants gets all-zero rows in both
    /// matrices instead of an error; it stays below any positive assignment
    /// threshold. Normalization is done on max-shifted exponentials so a
    /// heavily covered cell cannot underflow its whole row to 0/0.
    pub fn compute_cell_likelihood(&mut self) -> Result<()> {
        let Some(genotypes) = self.genotypes.as_ref() else {
            return Err(DemuxError::GenotypesNotInitialized);
        };
        let k = self.num_clusters;

        for c in 0..self.barcodes.len() {
            let ref_col = self.ref_counts.barcode_col(c)?;
            let alt_col = self.alt_counts.barcode_col(c)?;
            // (variant, ref count, alt count) for covered variants only
            let covered: Vec<(usize, u32, u32)> =
                merge_join_by(ref_col.iter(), alt_col.iter(), |a, b| a.0.cmp(&b.0))
                    .map(|pair| match pair {
                        EitherOrBoth::Both((v, &rc), (_, &ac)) => (v, rc, ac),
                        EitherOrBoth::Left((v, &rc)) => (v, rc, 0),
                        EitherOrBoth::Right((v, &ac)) => (v, 0, ac),
                    })
                    .collect();

            if covered.is_empty() {
                for n in 0..k {
                    self.likelihood[[c, n]] = 0.0;
                    self.posterior[[c, n]] = 0.0;
                }
                continue;
            }

            let mut log_lik = vec![0.0f64; k];
            for n in 0..k {
                let mut ll = 0.0;
                for &(v, ref_count, alt_count) in &covered {
                    let g = genotypes[[n, v]].clamp(GENOTYPE_EPS, 1.0 - GENOTYPE_EPS);
                    ll += alt_count as f64 * g.log2() + ref_count as f64 * (1.0 - g).log2();
                }
                log_lik[n] = ll;
                self.likelihood[[c, n]] = ll.exp2();
            }

            let max_ll = log_lik.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let shifted: Vec<f64> = log_lik.iter().map(|&ll| (ll - max_ll).exp2()).collect();
            let norm: f64 = shifted.iter().sum();
            for n in 0..k {
                self.posterior[[c, n]] = shifted[n] / norm;
            }
        }
        Ok(())
    }

    /// Hard assignment: a barcode enters the bucket of its best cluster only
    /// if that posterior reaches the confidence threshold. Buckets are
    /// rebuilt from scratch and sorted for deterministic output.
    pub fn assign_cells(&mut self, threshold: f64) {
        self.assigned = vec![Vec::new(); self.num_clusters];
        for c in 0..self.barcodes.len() {
            let mut best = 0;
            let mut best_p = f64::NEG_INFINITY;
            for n in 0..self.num_clusters {
                let p = self.posterior[[c, n]];
                if p > best_p {
                    best = n;
                    best_p = p;
                }
            }
            if best_p >= threshold {
                if let Some(name) = self.barcodes.get(c) {
                    self.assigned[best].push(name.to_string());
                }
            }
        }
        for bucket in &mut self.assigned {
            bucket.sort();
        }
    }

    /// Total log-likelihood over all cells and clusters, the per-round
    /// diagnostic recorded in the trace. All-zero rows (zero-coverage
    /// barcodes) contribute nothing, so the trace tracks only cells that
    /// carry evidence; remaining entries are floored at the smallest
    /// positive float so an underflowed row stays finite.
    pub fn total_log_likelihood(&self) -> f64 {
        self.likelihood
            .outer_iter()
            .filter(|row| row.iter().any(|&p| p > 0.0))
            .map(|row| {
                row.iter()
                    .map(|&p| p.max(f64::MIN_POSITIVE).ln())
                    .sum::<f64>()
            })
            .sum()
    }

    pub fn num_clusters(&self) -> usize {
        self.num_clusters
    }

    pub fn variants(&self) -> &VariantRegistry {
        &self.variants
    }

    pub fn barcodes(&self) -> &BarcodeSet {
        &self.barcodes
    }

    /// Final per-cluster genotype vectors, (cluster, variant)
    pub fn genotypes(&self) -> Option<&Array2<f64>> {
        self.genotypes.as_ref()
    }

    /// Unnormalized P(c|s), (barcode, cluster)
    pub fn likelihood(&self) -> &Array2<f64> {
        &self.likelihood
    }

    /// Row-normalized P(s|c), (barcode, cluster)
    pub fn posterior(&self) -> &Array2<f64> {
        &self.posterior
    }

    /// One sorted barcode list per cluster
    pub fn assignments(&self) -> &[Vec<String>] {
        &self.assigned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 2 variants x 3 barcodes, K=2. CELL_A is pure alt at chr1:100 and pure
    /// ref at chr1:200, CELL_B is the exact inverse, CELL_C covers nothing.
    fn test_model(num_clusters: usize) -> GenotypeModel {
        let mut variants = VariantRegistry::new();
        variants.register("chr1:100").unwrap();
        variants.register("chr1:200").unwrap();
        let barcodes = BarcodeSet::from_names(
            ["CELL_A", "CELL_B", "CELL_C"].map(String::from),
        )
        .unwrap();
        let ref_counts = CountMatrix::from_triplets(2, 3, &[(1, 0, 10), (0, 1, 10)]);
        let alt_counts = CountMatrix::from_triplets(2, 3, &[(0, 0, 10), (1, 1, 10)]);
        GenotypeModel::new(num_clusters, variants, barcodes, ref_counts, alt_counts)
            .unwrap()
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let mut variants = VariantRegistry::new();
        variants.register("chr1:100").unwrap();
        let barcodes = BarcodeSet::from_names(["CELL_A".to_string()]).unwrap();
        let ref_counts = CountMatrix::from_triplets(2, 1, &[]);
        let alt_counts = CountMatrix::from_triplets(2, 1, &[]);
        let e = GenotypeModel::new(2, variants, barcodes, ref_counts, alt_counts)
            .unwrap_err();
        assert!(matches!(e, DemuxError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_initialize_is_seeded_and_idempotent() {
        let mut m1 = test_model(2);
        let mut m2 = test_model(2);
        m1.initialize_genotypes(7).unwrap();
        m2.initialize_genotypes(7).unwrap();
        assert_eq!(m1.genotypes().unwrap(), m2.genotypes().unwrap());

        // second call must not redraw
        let before = m1.genotypes().unwrap().clone();
        m1.initialize_genotypes(99).unwrap();
        assert_eq!(m1.genotypes().unwrap(), &before);
    }

    #[test]
    fn test_ops_require_initialization() {
        let mut model = test_model(2);
        assert_eq!(
            model.reestimate_genotypes().unwrap_err(),
            DemuxError::GenotypesNotInitialized
        );
        assert_eq!(
            model.compute_cell_likelihood().unwrap_err(),
            DemuxError::GenotypesNotInitialized
        );
    }

    #[test]
    fn test_posterior_rows_sum_to_one() {
        let mut model = test_model(2);
        model.initialize_genotypes(1).unwrap();
        model.compute_cell_likelihood().unwrap();
        model.reestimate_genotypes().unwrap();
        model.compute_cell_likelihood().unwrap();

        // covered barcodes normalize exactly, the uncovered one stays zero
        for c in [0, 1] {
            let row_sum: f64 = model.posterior().row(c).sum();
            assert!((row_sum - 1.0).abs() < 1e-12, "row {} sums to {}", c, row_sum);
        }
        assert_eq!(model.posterior().row(2).sum(), 0.0);
        assert_eq!(model.likelihood().row(2).sum(), 0.0);
    }

    #[test]
    fn test_reestimated_genotypes_stay_open_interval() {
        let mut model = test_model(2);
        model.initialize_genotypes(3).unwrap();
        model.compute_cell_likelihood().unwrap();
        model.reestimate_genotypes().unwrap();
        for &g in model.genotypes().unwrap().iter() {
            assert!(g > 0.0 && g < 1.0, "genotype {} not in (0,1)", g);
        }
    }

    #[test]
    fn test_smoothing_with_empty_posterior() {
        // all-zero posterior weights: every estimate collapses to 1/2
        let mut model = test_model(2);
        model.initialize_genotypes(5).unwrap();
        model.reestimate_genotypes().unwrap();
        for &g in model.genotypes().unwrap().iter() {
            assert!((g - 0.5).abs() < 1e-12);
        }
    }

    #[test]
    fn test_trace_ignores_zero_coverage_rows() {
        let mut with_empty = test_model(2);
        with_empty.initialize_genotypes(13).unwrap();
        with_empty.compute_cell_likelihood().unwrap();

        // same run without the uncovered cell; same seed, count totals and
        // genotype shape give the same prior draw, so the totals must agree
        let mut variants = VariantRegistry::new();
        variants.register("chr1:100").unwrap();
        variants.register("chr1:200").unwrap();
        let barcodes =
            BarcodeSet::from_names(["CELL_A", "CELL_B"].map(String::from)).unwrap();
        let ref_counts = CountMatrix::from_triplets(2, 2, &[(1, 0, 10), (0, 1, 10)]);
        let alt_counts = CountMatrix::from_triplets(2, 2, &[(0, 0, 10), (1, 1, 10)]);
        let mut covered_only =
            GenotypeModel::new(2, variants, barcodes, ref_counts, alt_counts).unwrap();
        covered_only.initialize_genotypes(13).unwrap();
        covered_only.compute_cell_likelihood().unwrap();

        let diff =
            (with_empty.total_log_likelihood() - covered_only.total_log_likelihood()).abs();
        assert!(diff < 1e-9, "zero-coverage row shifted the trace by {}", diff);
    }

    #[test]
    fn test_zero_coverage_barcode_unassigned() {
        let mut model = test_model(2);
        model.initialize_genotypes(11).unwrap();
        model.compute_cell_likelihood().unwrap();
        model.assign_cells(0.8);
        for bucket in model.assignments() {
            assert!(!bucket.iter().any(|b| b == "CELL_C"));
        }
    }

    #[test]
    fn test_assignment_buckets_disjoint_and_thresholded() {
        let mut model = test_model(2);
        model.initialize_genotypes(2).unwrap();
        for _ in 0..6 {
            model.compute_cell_likelihood().unwrap();
            model.reestimate_genotypes().unwrap();
        }
        model.compute_cell_likelihood().unwrap();

        // impossible threshold leaves everything unassigned
        model.assign_cells(1.1);
        assert!(model.assignments().iter().all(|b| b.is_empty()));

        model.assign_cells(0.8);
        let mut seen = Vec::new();
        for bucket in model.assignments() {
            for barcode in bucket {
                assert!(!seen.contains(barcode), "{} in two buckets", barcode);
                seen.push(barcode.clone());
            }
        }
    }
}
