use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use crate::demux::{EmDriver, EmParams, GenotypeModel, VariantRegistry};
use crate::demux::em::{DEFAULT_ASSIGN_THRESHOLD, DEFAULT_ROUNDS, DEFAULT_SEED};
use crate::fileformat::{read_barcode_list_file, read_count_matrix_file, write_demux_results};

pub const DEFAULT_NUM_CLUSTERS: usize = 2;

/// Commandline option: demultiplex a pooled run into donor genotype
/// clusters from ref/alt allele count matrices, without a reference panel
#[derive(Args)]
pub struct DemuxCMD {
    // Reference-allele count matrix (CSV)
    #[arg(short = 'r', value_parser = clap::value_parser!(PathBuf))]
    pub path_ref: PathBuf,

    // Alternate-allele count matrix (CSV)
    #[arg(short = 'a', value_parser = clap::value_parser!(PathBuf))]
    pub path_alt: PathBuf,

    // File with a list of validated cell barcodes
    #[arg(short = 'b', value_parser = clap::value_parser!(PathBuf))]
    pub path_barcodes: PathBuf,

    // Output directory for all result tables
    #[arg(short = 'o', value_parser = clap::value_parser!(PathBuf))]
    pub path_out: PathBuf,

    // Number of donor genotype clusters to model
    #[arg(short = 'k', long = "clusters", default_value_t = DEFAULT_NUM_CLUSTERS)]
    pub num_clusters: usize,

    // Number of EM rounds; always run in full, never cut short
    #[arg(long = "rounds", default_value_t = DEFAULT_ROUNDS)]
    pub rounds: usize,

    // Minimum posterior for a cell to be assigned to a cluster
    #[arg(long = "threshold", default_value_t = DEFAULT_ASSIGN_THRESHOLD)]
    pub assign_threshold: f64,

    // Seed for the genotype initialization draw
    #[arg(long = "seed", default_value_t = DEFAULT_SEED)]
    pub seed: u64,
}

impl DemuxCMD {
    /// Run the commandline option
    pub fn try_execute(&mut self) -> Result<()> {
        println!("Reading barcode list");
        let barcodes = read_barcode_list_file(&self.path_barcodes)?;

        let mut registry = VariantRegistry::new();
        println!("Reading reference matrix");
        let ref_counts = read_count_matrix_file(&self.path_ref, &mut registry, &barcodes)?;
        println!("Reading alternate matrix");
        let alt_counts = read_count_matrix_file(&self.path_alt, &mut registry, &barcodes)?;
        log::info!(
            "{} variants, {} barcodes, modelling {} clusters",
            registry.len(),
            barcodes.len(),
            self.num_clusters
        );

        let mut model = GenotypeModel::new(
            self.num_clusters,
            registry,
            barcodes,
            ref_counts,
            alt_counts,
        )?;
        let mut driver = EmDriver::new(EmParams {
            rounds: self.rounds,
            seed: self.seed,
            assign_threshold: self.assign_threshold,
        });

        let em = driver.params();
        log::info!(
            "EM configuration: {} rounds, seed {}, assignment threshold {}",
            em.rounds,
            em.seed,
            em.assign_threshold
        );

        println!("Commencing E-M");
        driver.run(&mut model)?;

        write_demux_results(&self.path_out, &model, driver.trace())?;

        for (n, bucket) in model.assignments().iter().enumerate() {
            println!("cluster {}: {} cells assigned", n, bucket.len());
        }
        log::info!("demux has finished successfully");
        Ok(())
    }
}
