use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use clustering::KMeans;
use config::{Backend, InitMethod, KMeansConfig};
use datasets::{load_csv, load_iris, make_blobs, BlobsConfig};
use log::info;
use ndarray::{Array1, Array2};
use utils::cluster_metrics::v_measure_score;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fit a model and print (or write) it as JSON.
    #[clap(name = "fit")]
    Fit(FitArgs),

    /// Fit the accelerated and the reference implementation on synthetic blobs and compare them.
    #[clap(name = "compare")]
    Compare(CompareArgs),
}

#[derive(Args, Debug)]
struct FitArgs {
    /// `iris`, `blobs`, or the path of a CSV file
    #[arg(long, default_value = "iris")]
    dataset: String,

    /// YAML file with the estimator configuration. Flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    n_clusters: Option<usize>,

    #[arg(long)]
    n_devices: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    /// Fit with the sequential reference implementation.
    #[arg(long, default_value_t = false)]
    reference: bool,

    /// Samples generated for `--dataset blobs`
    #[arg(long, default_value_t = 10000)]
    n_samples: usize,

    /// Centers generated for `--dataset blobs`
    #[arg(long, default_value_t = 8)]
    centers: usize,

    /// Where to write the fitted model. Printed to stdout when absent.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CompareArgs {
    #[arg(long, default_value_t = 100000)]
    n_samples: usize,

    #[arg(long, default_value_t = 10)]
    centers: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[arg(long)]
    n_devices: Option<usize>,
}

fn load_dataset(args: &FitArgs) -> Result<Array2<f64>> {
    match args.dataset.as_str() {
        "iris" => Ok(load_iris()?.data),
        "blobs" => {
            let (x, _) = make_blobs(&BlobsConfig::new(
                args.n_samples,
                args.centers,
                args.seed.unwrap_or(0),
            ))?;
            Ok(x)
        }
        path => load_csv(path),
    }
}

fn build_config(args: &FitArgs) -> Result<KMeansConfig> {
    let mut config = match &args.config {
        Some(path) => KMeansConfig::from_yaml_file(path)?,
        None => KMeansConfig::default(),
    };
    if let Some(n_clusters) = args.n_clusters {
        config.n_clusters = n_clusters;
    }
    if args.n_devices.is_some() {
        config.n_devices = args.n_devices;
    }
    if args.seed.is_some() {
        config.random_state = args.seed;
    }
    if args.reference {
        config.backend = Backend::Reference;
    }
    config.validate()?;
    Ok(config)
}

fn run_fit(args: &FitArgs) -> Result<()> {
    let x = load_dataset(args)?;
    let config = build_config(args)?;
    info!(
        "Loaded dataset {}: {} samples, {} features",
        args.dataset,
        x.nrows(),
        x.ncols()
    );

    let mut kmeans = KMeans::new(config);
    kmeans.fit(x.view())?;
    let model = kmeans
        .fitted()
        .context("Fit finished without a fitted model")?;
    match &args.output {
        Some(path) => {
            model.to_json_file(path)?;
            info!("Model written to {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(model)?),
    }
    Ok(())
}

struct Comparison {
    backend: Backend,
    v_measure: f64,
    elapsed: Duration,
}

fn fit_and_score(
    config: KMeansConfig,
    x: &Array2<f64>,
    true_labels: &Array1<usize>,
) -> Result<Comparison> {
    let backend = config.backend;
    let mut kmeans = KMeans::new(config);
    let start = Instant::now();
    kmeans.fit(x.view())?;
    let elapsed = start.elapsed();
    let v_measure = v_measure_score(&true_labels.to_vec(), &kmeans.labels()?.to_vec())?;
    Ok(Comparison {
        backend,
        v_measure,
        elapsed,
    })
}

fn compare(args: &CompareArgs) -> Result<Vec<Comparison>> {
    let (x, true_labels) = make_blobs(&BlobsConfig::new(args.n_samples, args.centers, args.seed))?;
    let accelerated = KMeansConfig::new(args.centers)
        .with_n_devices(args.n_devices)
        .with_random_state(args.seed);
    let reference = KMeansConfig::new(args.centers)
        .with_random_state(args.seed)
        .with_init(InitMethod::Random)
        .with_backend(Backend::Reference);
    Ok(vec![
        fit_and_score(accelerated, &x, &true_labels)?,
        fit_and_score(reference, &x, &true_labels)?,
    ])
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Fit(args) => run_fit(&args),
        Command::Compare(args) => {
            let results = compare(&args)?;
            for result in results.iter() {
                println!(
                    "{:<12} v-measure {:.4} in {:.3}s",
                    result.backend.to_string(),
                    result.v_measure,
                    result.elapsed.as_secs_f64()
                );
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use clustering::FittedModel;

    use super::*;

    fn fit_args(argv: &[&str]) -> FitArgs {
        let cli = Cli::parse_from(argv);
        match cli.command {
            Command::Fit(args) => args,
            other => panic!("Expected fit, got {:?}", other),
        }
    }

    #[test]
    fn test_flags_override_config_file() {
        let temp_dir =
            tempdir::TempDir::new("cli_test").expect("Failed to create temporary directory");
        let config_path = temp_dir.path().join("kmeans.yaml");
        KMeansConfig::new(5)
            .with_random_state(3)
            .with_n_init(4)
            .to_yaml_file(&config_path)
            .unwrap();

        let args = fit_args(&[
            "kmeans",
            "fit",
            "--config",
            config_path.to_str().unwrap(),
            "--n-clusters",
            "3",
            "--reference",
        ]);
        let config = build_config(&args).unwrap();
        assert_eq!(config.n_clusters, 3);
        assert_eq!(config.random_state, Some(3));
        assert_eq!(config.n_init, 4);
        assert_eq!(config.backend, Backend::Reference);
    }

    #[test]
    fn test_fit_writes_model() {
        let temp_dir =
            tempdir::TempDir::new("cli_test").expect("Failed to create temporary directory");
        let output = temp_dir.path().join("model.json");
        let args = fit_args(&[
            "kmeans",
            "fit",
            "--dataset",
            "iris",
            "--n-clusters",
            "3",
            "--seed",
            "7",
            "--output",
            output.to_str().unwrap(),
        ]);
        run_fit(&args).unwrap();

        let model = FittedModel::from_json_file(&output).unwrap();
        assert_eq!(model.cluster_centers.dim(), (3, 4));
        assert_eq!(model.labels.len(), 150);
    }

    #[test]
    fn test_csv_dataset() {
        let temp_dir =
            tempdir::TempDir::new("cli_test").expect("Failed to create temporary directory");
        let path = temp_dir.path().join("points.csv");
        std::fs::write(&path, "x,y\n0,0\n0,1\n10,10\n10,11\n").unwrap();
        let args = fit_args(&["kmeans", "fit", "--dataset", path.to_str().unwrap()]);
        assert_eq!(load_dataset(&args).unwrap().dim(), (4, 2));
    }

    #[test]
    fn test_compare_small() {
        let args = CompareArgs {
            n_samples: 2000,
            centers: 4,
            seed: 42,
            n_devices: Some(2),
        };
        let results = compare(&args).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].backend, Backend::Accelerated);
        assert_eq!(results[1].backend, Backend::Reference);
        assert!(results[0].v_measure - results[1].v_measure >= -0.1);
    }
}
