use crate::demux::error::Result;
use crate::demux::genotype::GenotypeModel;

/// Number of EM rounds; fixed, never derived from a convergence test
pub const DEFAULT_ROUNDS: usize = 6;
/// Minimum posterior for a barcode to enter an assignment bucket
pub const DEFAULT_ASSIGN_THRESHOLD: f64 = 0.8;
pub const DEFAULT_SEED: u64 = 0;

/// Tuning knobs for one EM run. Cluster count lives in the model itself.
#[derive(Debug, Clone)]
pub struct EmParams {
    pub rounds: usize,
    pub seed: u64,
    pub assign_threshold: f64,
}

impl Default for EmParams {
    fn default() -> Self {
        Self {
            rounds: DEFAULT_ROUNDS,
            seed: DEFAULT_SEED,
            assign_threshold: DEFAULT_ASSIGN_THRESHOLD,
        }
    }
}

/// Fixed-round EM orchestration: each round re-estimates the genotype
/// vectors (round 1 consumes the freshly drawn Beta prior instead) and
/// recomputes the cell likelihoods, recording the total log-likelihood.
/// The trace is a monitoring signal only and never controls the loop; the
/// loop always runs its configured length, then assigns cells exactly once.
pub struct EmDriver {
    params: EmParams,
    trace: Vec<f64>,
}

impl EmDriver {
    pub fn new(params: EmParams) -> Self {
        Self {
            params,
            trace: Vec::new(),
        }
    }

    pub fn run(&mut self, model: &mut GenotypeModel) -> Result<()> {
        self.trace.clear();
        for round in 1..=self.params.rounds {
            if model.has_genotypes() {
                model.reestimate_genotypes()?;
            } else {
                model.initialize_genotypes(self.params.seed)?;
            }
            model.compute_cell_likelihood()?;

            let log_likelihood = model.total_log_likelihood();
            log::info!(
                "EM round {}/{}: total log-likelihood {:.4}",
                round,
                self.params.rounds,
                log_likelihood
            );
            self.trace.push(log_likelihood);
        }
        model.assign_cells(self.params.assign_threshold);
        Ok(())
    }

    /// Per-round total log-likelihood, in round order
    pub fn trace(&self) -> &[f64] {
        &self.trace
    }

    pub fn params(&self) -> &EmParams {
        &self.params
    }
}
