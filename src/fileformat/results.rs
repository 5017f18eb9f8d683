use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{bail, Context};
use ndarray::Array2;

use crate::demux::GenotypeModel;

/// Write every result table of a finished run under one output directory:
/// per-cluster barcode lists (`barcodes_<n>.csv`), per-cluster genotype
/// vectors (`genotypes_<n>.csv`), the unnormalized likelihood matrix
/// (`likelihood.csv`), the posterior matrix (`posterior.csv`) and the
/// per-round log-likelihood trace (`trace.csv`).
pub fn write_demux_results(
    outdir: &Path,
    model: &GenotypeModel,
    trace: &[f64],
) -> anyhow::Result<()> {
    let Some(genotypes) = model.genotypes() else {
        bail!("model has no genotype vectors; run the EM driver first");
    };
    create_dir_all(outdir)
        .with_context(|| format!("failed to create output directory {}", outdir.display()))?;

    for n in 0..model.num_clusters() {
        write_cluster_barcodes(
            &outdir.join(format!("barcodes_{}.csv", n)),
            &model.assignments()[n],
        )?;

        let mut wtr = csv::Writer::from_path(outdir.join(format!("genotypes_{}.csv", n)))?;
        wtr.write_record(["variant", "alt_prob"])?;
        for (v, variant) in model.variants().ordered_positions().enumerate() {
            wtr.write_record([variant.key(), genotypes[[n, v]].to_string()])?;
        }
        wtr.flush()?;
    }

    write_cell_matrix(&outdir.join("likelihood.csv"), model, model.likelihood())?;
    write_cell_matrix(&outdir.join("posterior.csv"), model, model.posterior())?;

    let mut wtr = csv::Writer::from_path(outdir.join("trace.csv"))?;
    wtr.write_record(["round", "log_likelihood"])?;
    for (round, ll) in trace.iter().enumerate() {
        wtr.write_record([(round + 1).to_string(), ll.to_string()])?;
    }
    wtr.flush()?;

    Ok(())
}

/// One barcode per line, already sorted by the assignment step
fn write_cluster_barcodes(path: &Path, bucket: &[String]) -> anyhow::Result<()> {
    let f = File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut bw = BufWriter::new(f);
    for barcode in bucket {
        writeln!(bw, "{}", barcode)?;
    }
    bw.flush()?;
    Ok(())
}

/// Barcode x cluster matrix with a "barcode" key column and one column per
/// cluster index
fn write_cell_matrix(
    path: &Path,
    model: &GenotypeModel,
    matrix: &Array2<f64>,
) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    let mut header = vec!["barcode".to_string()];
    header.extend((0..model.num_clusters()).map(|n| n.to_string()));
    wtr.write_record(&header)?;

    for (c, name) in model.barcodes().names().iter().enumerate() {
        let mut record = vec![name.clone()];
        record.extend(matrix.row(c).iter().map(|p| p.to_string()));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}
