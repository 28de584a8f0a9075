use std::path::Path;

use anyhow::{anyhow, Context, Result};
use log::debug;
use ndarray::{Array1, Array2};

use crate::data_home::data_home;

const IRIS_FILE_NAME: &str = "iris.csv";
const BUNDLED_IRIS: &str = include_str!("../data/iris.csv");

const IRIS_FEATURE_NAMES: [&str; 4] = [
    "sepal length (cm)",
    "sepal width (cm)",
    "petal length (cm)",
    "petal width (cm)",
];

/// A labelled dataset.
#[derive(Debug, Clone)]
pub struct Bunch {
    /// Shape (n_samples, n_features).
    pub data: Array2<f64>,
    /// Class index per sample.
    pub target: Array1<usize>,
    pub feature_names: Vec<String>,
    pub target_names: Vec<String>,
}

/// Loads the Iris dataset (150 samples, 4 features, 3 classes).
///
/// `iris.csv` under the data home takes precedence; otherwise the bundled copy is used.
pub fn load_iris() -> Result<Bunch> {
    load_iris_from(&data_home())
}

pub fn load_iris_from(dir: &Path) -> Result<Bunch> {
    let path = dir.join(IRIS_FILE_NAME);
    if path.is_file() {
        debug!("Loading iris from {}", path.display());
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        parse_labelled_csv(&content, &IRIS_FEATURE_NAMES)
            .with_context(|| format!("Malformed dataset file {}", path.display()))
    } else {
        debug!("{} not found, using bundled iris", path.display());
        parse_labelled_csv(BUNDLED_IRIS, &IRIS_FEATURE_NAMES)
    }
}

/// Parses the labelled CSV layout: a header `n_samples,n_features,<target names...>`, then one
/// row per sample with the features followed by the integer class.
fn parse_labelled_csv(content: &str, feature_names: &[&str]) -> Result<Bunch> {
    let mut lines = content.lines().filter(|line| !line.trim().is_empty());
    let header = lines.next().ok_or_else(|| anyhow!("Empty dataset file"))?;
    let header: Vec<&str> = header.split(',').map(str::trim).collect();
    if header.len() < 2 {
        return Err(anyhow!("Header must start with n_samples,n_features"));
    }
    let n_samples: usize = header[0].parse().context("Invalid n_samples in header")?;
    let n_features: usize = header[1].parse().context("Invalid n_features in header")?;
    let target_names: Vec<String> = header[2..].iter().map(|name| name.to_string()).collect();

    let mut data = Vec::with_capacity(n_samples * n_features);
    let mut target = Vec::with_capacity(n_samples);
    for (row_idx, line) in lines.enumerate() {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != n_features + 1 {
            return Err(anyhow!(
                "Row {} has {} fields, expected {}",
                row_idx,
                fields.len(),
                n_features + 1
            ));
        }
        for field in &fields[..n_features] {
            let value: f64 = field
                .parse()
                .with_context(|| format!("Invalid value {:?} in row {}", field, row_idx))?;
            data.push(value);
        }
        let class: usize = fields[n_features]
            .parse()
            .with_context(|| format!("Invalid class in row {}", row_idx))?;
        if !target_names.is_empty() && class >= target_names.len() {
            return Err(anyhow!("Class {} in row {} has no name", class, row_idx));
        }
        target.push(class);
    }

    if target.len() != n_samples {
        return Err(anyhow!(
            "Header announces {} samples but file has {}",
            n_samples,
            target.len()
        ));
    }

    Ok(Bunch {
        data: Array2::from_shape_vec((n_samples, n_features), data)?,
        target: Array1::from_vec(target),
        feature_names: feature_names.iter().map(|name| name.to_string()).collect(),
        target_names,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_bundled_iris() {
        let temp_dir = tempdir::TempDir::new("iris_missing").expect("Failed to create temp dir");
        let iris = load_iris_from(temp_dir.path()).expect("Bundled iris should parse");
        assert_eq!(iris.data.dim(), (150, 4));
        assert_eq!(iris.target.len(), 150);
        assert_eq!(iris.target_names, vec!["setosa", "versicolor", "virginica"]);
        assert_eq!(iris.feature_names.len(), 4);
        assert_eq!(iris.data.row(0).to_vec(), vec![5.1, 3.5, 1.4, 0.2]);
        assert_eq!(iris.target[0], 0);
        assert_eq!(iris.target[149], 2);

        let means = iris.data.mean_axis(ndarray::Axis(0)).unwrap();
        assert!((means[0] - 5.843333).abs() < 1e-5);
        assert!((means[2] - 3.758).abs() < 1e-5);
    }

    #[test]
    fn test_load_iris_from_data_home() {
        let temp_dir = tempdir::TempDir::new("iris_home").expect("Failed to create temp dir");
        std::fs::write(
            temp_dir.path().join(IRIS_FILE_NAME),
            "2,4,a,b\n1.0,2.0,3.0,4.0,0\n5.0,6.0,7.0,8.0,1\n",
        )
        .expect("Failed to write file");

        let iris = load_iris_from(temp_dir.path()).expect("Custom iris should parse");
        assert_eq!(iris.data.dim(), (2, 4));
        assert_eq!(iris.target.to_vec(), vec![0, 1]);
        assert_eq!(iris.target_names, vec!["a", "b"]);
    }

    #[test]
    fn test_malformed_files() {
        assert!(parse_labelled_csv("", &IRIS_FEATURE_NAMES).is_err());
        assert!(parse_labelled_csv("2,2,a\n1.0,2.0,0\n", &IRIS_FEATURE_NAMES).is_err());
        assert!(parse_labelled_csv("1,2,a\n1.0,0\n", &IRIS_FEATURE_NAMES).is_err());
        assert!(parse_labelled_csv("1,2,a\n1.0,x,0\n", &IRIS_FEATURE_NAMES).is_err());
        assert!(parse_labelled_csv("1,2,a\n1.0,2.0,3\n", &IRIS_FEATURE_NAMES).is_err());
    }
}
